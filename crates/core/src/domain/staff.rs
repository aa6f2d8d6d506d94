use serde::{Deserialize, Serialize};

use crate::domain::ids::GroupId;
use crate::errors::StaffConfigError;

/// Which community the bot serves and whose members may claim tickets.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffConfig {
    #[serde(rename = "guild_id", default)]
    pub home_group_id: Option<GroupId>,
    #[serde(rename = "staff_role_ids", default)]
    pub staff_group_ids: Vec<GroupId>,
}

impl StaffConfig {
    /// Staff notifications and the staff check need both a home group and at
    /// least one staff group.
    pub fn is_configured(&self) -> bool {
        self.home_group_id.is_some() && !self.staff_group_ids.is_empty()
    }

    pub fn contains(&self, group: GroupId) -> bool {
        self.staff_group_ids.contains(&group)
    }

    pub fn configure(
        &mut self,
        home_group_id: GroupId,
        groups: impl IntoIterator<Item = GroupId>,
    ) -> Result<(), StaffConfigError> {
        let mut staff_group_ids = Vec::new();
        for group in groups {
            if !staff_group_ids.contains(&group) {
                staff_group_ids.push(group);
            }
        }
        if staff_group_ids.is_empty() {
            return Err(StaffConfigError::NoGroups);
        }

        self.home_group_id = Some(home_group_id);
        self.staff_group_ids = staff_group_ids;
        Ok(())
    }

    pub fn add_group(&mut self, group: GroupId) -> Result<(), StaffConfigError> {
        if self.contains(group) {
            return Err(StaffConfigError::AlreadyStaffGroup(group));
        }
        self.staff_group_ids.push(group);
        Ok(())
    }

    pub fn remove_group(&mut self, group: GroupId) -> Result<(), StaffConfigError> {
        let before = self.staff_group_ids.len();
        self.staff_group_ids.retain(|existing| *existing != group);
        if self.staff_group_ids.len() == before {
            return Err(StaffConfigError::NotStaffGroup(group));
        }
        Ok(())
    }
}
