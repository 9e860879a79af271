use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{info, instrument};

use super::snapshot::SnapshotStore;
use super::SetError;
use crate::model::Set;
use crate::query::Query;

/// Longest accepted set name.
pub const MAX_SET_NAME_LEN: usize = 64;

/// Names double as OAI `setSpec` values and URL path segments, so they are
/// limited to RFC 3986 unreserved characters.
pub fn validate_name(name: &str) -> Result<(), SetError> {
    let ok = !name.is_empty()
        && name.len() <= MAX_SET_NAME_LEN
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '~'));
    if ok {
        Ok(())
    } else {
        Err(SetError::InvalidName(name.to_string()))
    }
}

/// Parses a definition, rejecting blank ones.
pub fn validate_definition(definition: &str) -> Result<Query, SetError> {
    Query::parse(definition).map_err(|source| SetError::InvalidDefinition {
        definition: definition.to_string(),
        source,
    })
}

/// Named set definitions.
///
/// Entries stay in creation order. A deleted set keeps its entry (flagged
/// `deleted`) until its snapshot purge completes, so the name cannot be
/// reused before then.
#[derive(Debug)]
pub struct SetRegistry {
    entries: RwLock<Vec<Set>>,
    snapshots: Arc<SnapshotStore>,
}

impl SetRegistry {
    pub fn new(snapshots: Arc<SnapshotStore>) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            snapshots,
        }
    }

    pub fn snapshots(&self) -> &Arc<SnapshotStore> {
        &self.snapshots
    }

    #[instrument(skip(self, definition, description))]
    pub fn create(
        &self,
        name: &str,
        definition: &str,
        description: Option<&str>,
    ) -> Result<Set, SetError> {
        validate_name(name)?;
        validate_definition(definition)?;

        let mut entries = self.write();
        if entries.iter().any(|s| s.name.eq_ignore_ascii_case(name)) {
            return Err(SetError::DuplicateSet(name.to_string()));
        }

        let set = Set {
            name: name.to_string(),
            definition: definition.to_string(),
            description: description.unwrap_or_default().to_string(),
            deleted: false,
        };
        entries.push(set.clone());
        info!(set = %name, "set created");
        Ok(set)
    }

    pub fn get(&self, name: &str) -> Result<Set, SetError> {
        self.read()
            .iter()
            .find(|s| s.name == name && !s.deleted)
            .cloned()
            .ok_or_else(|| SetError::NotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read().iter().any(|s| s.name == name && !s.deleted)
    }

    pub fn list(&self) -> Vec<Set> {
        self.read().iter().filter(|s| !s.deleted).cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.read().iter().all(|s| s.deleted)
    }

    /// The parsed definition of a live set.
    pub fn query(&self, name: &str) -> Result<Query, SetError> {
        let set = self.get(name)?;
        validate_definition(&set.definition)
    }

    /// Replaces definition and description. A changed definition flags the
    /// current snapshot stale; it is not rebuilt here.
    #[instrument(skip(self, definition, description))]
    pub fn update(
        &self,
        name: &str,
        definition: &str,
        description: Option<&str>,
    ) -> Result<Set, SetError> {
        validate_definition(definition)?;

        let mut entries = self.write();
        let set = entries
            .iter_mut()
            .find(|s| s.name == name && !s.deleted)
            .ok_or_else(|| SetError::NotFound(name.to_string()))?;

        let definition_changed = set.definition != definition;
        set.definition = definition.to_string();
        set.description = description.unwrap_or_default().to_string();
        let updated = set.clone();
        drop(entries);

        if definition_changed {
            self.snapshots.mark_stale(name);
            info!(set = %name, "set definition changed, snapshot marked stale");
        }
        Ok(updated)
    }

    /// Deletes a set and purges its snapshot. Returns once the name is free.
    #[instrument(skip(self))]
    pub async fn delete(&self, name: &str) -> Result<Set, SetError> {
        let deleted = {
            let mut entries = self.write();
            let set = entries
                .iter_mut()
                .find(|s| s.name == name && !s.deleted)
                .ok_or_else(|| SetError::NotFound(name.to_string()))?;
            set.deleted = true;
            set.clone()
        };

        self.snapshots.purge(name).await;

        self.write().retain(|s| !(s.name == name && s.deleted));
        info!(set = %name, "set deleted and purged");
        Ok(deleted)
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Set>> {
        match self.entries.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Set>> {
        match self.entries.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
