//! Device-kind and bus-kind registries: name-keyed lookup tables of
//! statically-known schemas, the composition-time counterpart to the
//! driver registry a device tree binds at probe time.
//!
//! Responsibilities:
//! - Own every registered [DeviceKind] and [BusKind] for the lifetime of the
//!   process, so that `&'static` references to them can be stored on tree
//!   nodes and handed out from [find_device_kind] / [find_bus_kind].
//! - Allow concurrent lookups via the `find_*` functions and synchronized
//!   registration via [register_device_kind] / [register_bus_kind].
//!
//! Notes:
//! - Kinds are registered once, generally at process start, and never
//!   unregistered; [Box::leak] is the simplest way to get a `'static`
//!   reference out of a value built at runtime. Registering a name twice is
//!   rejected (see [register_device_kind]) rather than silently replacing
//!   the previous entry.

use crate::error::RegistryError;
use crate::introspect::StateDescriptor;
use crate::migration::MigrationAlias;
use crate::property::PropertyDescriptor;
use crate::tree::{Bus, Device};
use std::collections::HashMap;
use std::sync::RwLock;

/// Runs a device's kind-specific construction; failure rolls the device
/// back. Takes only `&Device` (no `Machine` access): a kind that hosts
/// children opens its child bus from board/setup code after `device_add`
/// returns, not from within its own `init` (see `monitor`'s toy-bridge).
pub type InitHook = fn(&Device) -> Result<(), String>;
pub type ExitHook = fn(&Device);
/// Returns nonzero to halt a reset walk with that code.
pub type ResetHook = fn(&Device) -> i32;
/// Optional pre-removal notification (quiescing, flushing, ...) run before
/// `lifecycle::unplug` frees the device itself; absence just skips straight
/// to removal.
pub type UnplugHook = fn(&Device);
pub type BusResetHook = fn(&Bus) -> i32;
/// A bus-kind's extension to `info tree`'s per-device line.
pub type PrintDevHook = fn(&Device) -> String;
/// A bus-kind's contribution to a device's firmware path segment.
pub type FirmwarePathHook = fn(&Device) -> String;

/// A device kind's identity, storage shape, schema and lifecycle callbacks.
pub struct DeviceKind {
    pub name: &'static str,
    pub alias: Option<&'static str>,
    pub description: Option<&'static str>,
    pub user_creatable: bool,
    /// Name of the bus kind that may host instances of this kind.
    pub bus_kind: &'static str,
    /// Size in bytes of the zeroed backing buffer a device of this kind needs.
    pub instance_size: usize,
    pub properties: &'static [PropertyDescriptor],
    pub init: InitHook,
    pub exit: Option<ExitHook>,
    pub reset: Option<ResetHook>,
    pub unplug: Option<UnplugHook>,
    pub state_descriptor: Option<&'static StateDescriptor>,
    pub migration_alias: Option<MigrationAlias>,
}

/// A bus kind's identity and the property schema devices plugged into it inherit.
pub struct BusKind {
    pub name: &'static str,
    pub instance_size: usize,
    pub reset: Option<BusResetHook>,
    pub print_dev: Option<PrintDevHook>,
    pub get_firmware_path: Option<FirmwarePathHook>,
    pub properties: &'static [PropertyDescriptor],
}

static DEVICE_KINDS: RwLock<Option<HashMap<&'static str, &'static DeviceKind>>> = RwLock::new(None);
static BUS_KINDS: RwLock<Option<HashMap<&'static str, &'static BusKind>>> = RwLock::new(None);

/// Registers `kind`, leaking it to obtain a `'static` reference.
///
/// A kind must not already be linked under the same name: live devices may
/// hold `&'static DeviceKind` references into the existing entry, and
/// silently replacing it would leave those pointing at a kind no longer
/// reachable by name while new lookups resolve to a different one.
pub fn register_device_kind(kind: DeviceKind) -> Result<&'static DeviceKind, RegistryError> {
    let min_size = kind
        .properties
        .iter()
        .map(|p| p.offset + p.kind.element_size())
        .max()
        .unwrap_or(0);
    debug_assert!(
        kind.instance_size >= min_size,
        "instance_size too small for declared properties"
    );
    let mut guard = DEVICE_KINDS.write().unwrap();
    let map = guard.get_or_insert_with(HashMap::new);
    if map.contains_key(kind.name) {
        return Err(RegistryError::DuplicateKind(kind.name.to_string()));
    }
    let leaked: &'static DeviceKind = Box::leak(Box::new(kind));
    map.insert(leaked.name, leaked);
    Ok(leaked)
}

/// Registers `kind`. See [register_device_kind] for why a duplicate name is
/// rejected rather than replacing the existing entry.
pub fn register_bus_kind(kind: BusKind) -> Result<&'static BusKind, RegistryError> {
    let mut guard = BUS_KINDS.write().unwrap();
    let map = guard.get_or_insert_with(HashMap::new);
    if map.contains_key(kind.name) {
        return Err(RegistryError::DuplicateKind(kind.name.to_string()));
    }
    let leaked: &'static BusKind = Box::leak(Box::new(kind));
    map.insert(leaked.name, leaked);
    Ok(leaked)
}

/// Finds a device kind by exact name, then falls back to matching `alias`,
/// optionally filtered to one hosted by `bus_kind`.
pub fn find_device_kind(bus_kind: Option<&str>, name: &str) -> Option<&'static DeviceKind> {
    let guard = DEVICE_KINDS.read().unwrap();
    let kinds = guard.as_ref()?;
    let matches = |k: &&&DeviceKind| bus_kind.map(|b| k.bus_kind == b).unwrap_or(true);
    if let Some(found) = kinds.get(name).filter(matches) {
        return Some(found);
    }
    kinds
        .values()
        .find(|k| k.alias == Some(name) && matches(&k))
        .copied()
}

pub fn find_bus_kind(name: &str) -> Option<&'static BusKind> {
    BUS_KINDS.read().unwrap().as_ref()?.get(name).copied()
}

/// Lists every registered device kind, sorted by name for stable `info` output.
pub fn list_device_kinds() -> Vec<&'static DeviceKind> {
    let guard = DEVICE_KINDS.read().unwrap();
    let mut kinds: Vec<&'static DeviceKind> = guard.as_ref().map(|m| m.values().copied().collect()).unwrap_or_default();
    kinds.sort_unstable_by_key(|k| k.name);
    kinds
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::PropertyKind;

    fn noop_init(_dev: &Device) -> Result<(), String> {
        Ok(())
    }

    #[test]
    fn registered_kind_is_found_by_name() {
        register_device_kind(DeviceKind {
            name: "registry-test-toaster",
            alias: None,
            description: None,
            user_creatable: true,
            bus_kind: "registry-test-bus",
            instance_size: 16,
            properties: &[],
            init: noop_init,
            exit: None,
            reset: None,
            unplug: None,
            state_descriptor: None,
            migration_alias: None,
        })
        .unwrap();
        let found = find_device_kind(None, "registry-test-toaster").unwrap();
        assert_eq!(found.instance_size, 16);
        assert!(list_device_kinds().iter().any(|k| k.name == "registry-test-toaster"));
    }

    #[test]
    fn alias_resolves_when_name_misses() {
        register_device_kind(DeviceKind {
            name: "registry-test-canonical",
            alias: Some("registry-test-alias"),
            description: None,
            user_creatable: true,
            bus_kind: "registry-test-bus",
            instance_size: 4,
            properties: &[PropertyDescriptor::new("rate", PropertyKind::Uint32, 0)],
            init: noop_init,
            exit: None,
            reset: None,
            unplug: None,
            state_descriptor: None,
            migration_alias: None,
        })
        .unwrap();
        let found = find_device_kind(None, "registry-test-alias").unwrap();
        assert_eq!(found.name, "registry-test-canonical");
    }

    #[test]
    fn unknown_kind_is_absent() {
        assert!(find_device_kind(None, "registry-test-no-such-kind").is_none());
    }

    #[test]
    fn duplicate_name_is_rejected_rather_than_replacing_the_existing_entry() {
        fn build(name: &'static str) -> DeviceKind {
            DeviceKind {
                name,
                alias: None,
                description: None,
                user_creatable: true,
                bus_kind: "registry-test-bus",
                instance_size: 0,
                properties: &[],
                init: noop_init,
                exit: None,
                reset: None,
                unplug: None,
                state_descriptor: None,
                migration_alias: None,
            }
        }
        let first = register_device_kind(build("registry-test-duplicate")).unwrap();
        assert!(matches!(
            register_device_kind(build("registry-test-duplicate")),
            Err(RegistryError::DuplicateKind(_))
        ));
        assert_eq!(find_device_kind(None, "registry-test-duplicate").unwrap().instance_size, first.instance_size);
    }
}
