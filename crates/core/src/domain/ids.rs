use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Platform identity of a user (ticket owner or staff member).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

/// Platform identity of a group: either the home community or a staff role.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketId(pub u64);

impl TicketId {
    pub fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl FromStr for UserId {
    type Err = std::num::ParseIntError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        value.trim().parse::<u64>().map(Self)
    }
}

impl FromStr for GroupId {
    type Err = std::num::ParseIntError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        value.trim().parse::<u64>().map(Self)
    }
}

impl FromStr for TicketId {
    type Err = std::num::ParseIntError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        value.trim().trim_start_matches('#').parse::<u64>().map(Self)
    }
}

/// Owner ids are written as strings in the tickets file but older files
/// sometimes carry them as bare numbers.
pub(crate) mod user_id_string {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::UserId;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawUserId {
        Text(String),
        Number(u64),
    }

    pub fn serialize<S>(value: &UserId, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.0.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<UserId, D::Error>
    where
        D: Deserializer<'de>,
    {
        match RawUserId::deserialize(deserializer)? {
            RawUserId::Number(value) => Ok(UserId(value)),
            RawUserId::Text(value) => value.parse().map_err(|_| {
                serde::de::Error::custom(format!("user id `{value}` is not a numeric identity"))
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{TicketId, UserId};

    #[test]
    fn ticket_id_display_uses_hash_prefix() {
        assert_eq!(TicketId(7).to_string(), "#7");
        assert_eq!("#7".parse::<TicketId>().expect("parse"), TicketId(7));
    }

    #[test]
    fn user_id_parses_surrounding_whitespace() {
        assert_eq!(" 42 ".parse::<UserId>().expect("parse"), UserId(42));
        assert!("alice".parse::<UserId>().is_err());
    }
}
