//! Migration hook table.
//!
//! Lifecycle `init`/`free` register and unregister a device's state
//! descriptor here. No snapshot/restore wire format is implemented; this
//! table only answers "is this device migratable, and under which
//! descriptor and alias". Grounded on the migration-manager pattern used by
//! real Rust machine emulators such as StratoVirt (see DESIGN.md).

use crate::introspect::StateDescriptor;
use std::collections::HashMap;
use std::sync::RwLock;

/// An optional compatibility alias a device can register under, with the
/// minimum descriptor version required to accept a snapshot written for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationAlias {
    pub alias_id: u32,
    pub required_version: u32,
}

struct Entry {
    descriptor: &'static StateDescriptor,
    alias: Option<MigrationAlias>,
}

/// Process-wide (well: `Machine`-wide) table of migratable device instances,
/// keyed by the device's tree-assigned numeric id.
#[derive(Default)]
pub struct MigrationTable {
    entries: RwLock<HashMap<u64, Entry>>,
}

impl MigrationTable {
    pub fn new() -> Self {
        MigrationTable { entries: RwLock::new(HashMap::new()) }
    }

    /// Registers `descriptor` for `device_id`. Called exactly once, by `init`,
    /// right after a successful transition to `Initialised`.
    pub fn register(&self, device_id: u64, descriptor: &'static StateDescriptor, alias: Option<MigrationAlias>) {
        self.entries.write().unwrap().insert(device_id, Entry { descriptor, alias });
    }

    /// Removes `device_id`'s entry, if any. Called by `free`.
    pub fn unregister(&self, device_id: u64) {
        self.entries.write().unwrap().remove(&device_id);
    }

    pub fn is_registered(&self, device_id: u64) -> bool {
        self.entries.read().unwrap().contains_key(&device_id)
    }

    pub fn descriptor_for(&self, device_id: u64) -> Option<&'static StateDescriptor> {
        self.entries.read().unwrap().get(&device_id).map(|e| e.descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::introspect::StateDescriptor;

    static DESC: StateDescriptor = StateDescriptor { version_id: 1, pre_save_hook: None, fields: &[] };

    #[test]
    fn register_then_unregister_clears_entry() {
        let table = MigrationTable::new();
        table.register(7, &DESC, None);
        assert!(table.is_registered(7));
        table.unregister(7);
        assert!(!table.is_registered(7));
    }
}
