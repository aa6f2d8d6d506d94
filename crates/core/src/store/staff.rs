use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use super::{read_json, write_json_atomic, StoreError};
use crate::domain::ids::GroupId;
use crate::domain::staff::StaffConfig;
use crate::errors::StaffConfigError;

#[derive(Debug, Error)]
pub enum StaffUpdateError {
    #[error(transparent)]
    Rejected(#[from] StaffConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Persisted staff configuration. Starts empty on first boot.
#[derive(Debug)]
pub struct StaffConfigStore {
    path: Option<PathBuf>,
    config: StaffConfig,
}

impl StaffConfigStore {
    pub fn in_memory(config: StaffConfig) -> Self {
        Self { path: None, config }
    }

    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let config: StaffConfig = read_json(&path)?.unwrap_or_default();
        info!(
            event_name = "store.staff_config.loaded",
            path = %path.display(),
            configured = config.is_configured(),
            staff_groups = config.staff_group_ids.len(),
            "staff configuration loaded"
        );
        Ok(Self { path: Some(path), config })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn snapshot(&self) -> &StaffConfig {
        &self.config
    }

    pub fn configure(
        &mut self,
        home_group_id: GroupId,
        groups: Vec<GroupId>,
    ) -> Result<StaffConfig, StaffUpdateError> {
        self.update(|config| config.configure(home_group_id, groups))
    }

    pub fn add_group(&mut self, group: GroupId) -> Result<StaffConfig, StaffUpdateError> {
        self.update(|config| config.add_group(group))
    }

    pub fn remove_group(&mut self, group: GroupId) -> Result<StaffConfig, StaffUpdateError> {
        self.update(|config| config.remove_group(group))
    }

    fn update<F>(&mut self, change: F) -> Result<StaffConfig, StaffUpdateError>
    where
        F: FnOnce(&mut StaffConfig) -> Result<(), StaffConfigError>,
    {
        let mut next = self.config.clone();
        change(&mut next)?;
        if let Some(path) = &self.path {
            write_json_atomic(path, &next)?;
        }
        self.config = next;
        Ok(self.config.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::{StaffConfigStore, StaffUpdateError};
    use crate::domain::ids::GroupId;
    use crate::domain::staff::StaffConfig;
    use crate::errors::StaffConfigError;
    use crate::store::StoreError;

    #[test]
    fn first_boot_starts_empty() {
        let dir = TempDir::new().expect("tempdir");
        let store = StaffConfigStore::open(dir.path().join("config.json")).expect("open");
        assert_eq!(store.snapshot(), &StaffConfig::default());
    }

    #[test]
    fn mutations_persist_in_config_file_layout() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("config.json");

        let mut store = StaffConfigStore::open(&path).expect("open");
        store.configure(GroupId(1), vec![GroupId(10), GroupId(11)]).expect("configure");
        store.add_group(GroupId(12)).expect("add");
        store.remove_group(GroupId(10)).expect("remove");

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).expect("read")).expect("json");
        assert_eq!(raw, serde_json::json!({ "guild_id": 1, "staff_role_ids": [11, 12] }));

        let reloaded = StaffConfigStore::open(&path).expect("reload");
        assert_eq!(reloaded.snapshot().staff_group_ids, vec![GroupId(11), GroupId(12)]);
    }

    #[test]
    fn rejected_update_leaves_state_untouched() {
        let mut store = StaffConfigStore::in_memory(StaffConfig::default());
        store.add_group(GroupId(3)).expect("add");

        let error = store.add_group(GroupId(3)).expect_err("duplicate");
        assert!(matches!(
            error,
            StaffUpdateError::Rejected(StaffConfigError::AlreadyStaffGroup(GroupId(3)))
        ));
        assert_eq!(store.snapshot().staff_group_ids, vec![GroupId(3)]);
    }

    #[test]
    fn malformed_config_fails_to_open() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"guild_id": "not a number"}"#).expect("write");

        assert!(matches!(StaffConfigStore::open(&path), Err(StoreError::Corrupt { .. })));
    }
}
