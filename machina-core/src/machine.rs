//! [Machine] encapsulates every process-wide item the core needs: the root
//! bus, the hot-plug flag, the machine-modified latch, the migration table
//! and the reset-handler registry for stand-alone buses. Created once at
//! startup (typically in `main`); there are no bare module-level globals
//! for this state (the device-kind/bus-kind registries remain process-wide
//! in `registry.rs`, since `DeviceKind`/`BusKind` are immutable and `'static`
//! once registered and are shared by every `Machine` a process might ever
//! construct — see DESIGN.md).

use crate::error::QdevError;
use crate::introspect::StateDescriptor;
use crate::migration::MigrationTable;
use crate::registry::{register_bus_kind, BusKind, DeviceKind};
use crate::tree::{self, Bus, Device};
use machina_utils::Handle;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{OnceLock, RwLock};

/// Name of the synthetic root bus kind every `Machine`'s root bus uses.
/// Device kinds meant to live directly off the root (rather than behind a
/// bridge/controller device) declare this as their `bus_kind`.
pub const SYSTEM_BUS_KIND_NAME: &str = "main-system-bus";

fn system_bus_kind() -> &'static BusKind {
    static KIND: OnceLock<&'static BusKind> = OnceLock::new();
    *KIND.get_or_init(|| {
        register_bus_kind(BusKind {
            name: SYSTEM_BUS_KIND_NAME,
            instance_size: 0,
            reset: None,
            print_dev: None,
            get_firmware_path: None,
            properties: &[],
        })
        .expect("the system bus kind is registered exactly once, guarded by OnceLock")
    })
}

/// The single serialising guard this core runs under (see §5 of the design
/// notes): one `Machine` per emulated VM, owning the root bus, the two
/// process-wide flags, the migration table and the reset-handler registry.
pub struct Machine {
    root: RwLock<Option<Handle<Bus>>>,
    creation_done: AtomicBool,
    modified: AtomicBool,
    migration: MigrationTable,
    /// Stand-alone top-level reset targets: buses with no parent device,
    /// distinct from the root bus, registered at creation and deregistered
    /// at teardown (§4.5).
    reset_targets: RwLock<Vec<Handle<Bus>>>,
    global_defaults: RwLock<HashMap<(String, String), String>>,
}

impl Machine {
    pub fn new() -> Self {
        Machine {
            root: RwLock::new(None),
            creation_done: AtomicBool::new(false),
            modified: AtomicBool::new(false),
            migration: MigrationTable::new(),
            reset_targets: RwLock::new(Vec::new()),
            global_defaults: RwLock::new(HashMap::new()),
        }
    }

    /// The root bus, lazily created on first access and never freed.
    pub fn root(&self) -> Handle<Bus> {
        if let Some(existing) = self.root.read().unwrap().clone() {
            return existing;
        }
        let mut guard = self.root.write().unwrap();
        if let Some(existing) = guard.clone() {
            return existing;
        }
        let bus = tree::create_bus(system_bus_kind(), None, Some(SYSTEM_BUS_KIND_NAME.to_string()), false);
        *guard = Some(bus.clone());
        bus
    }

    pub fn migration(&self) -> &MigrationTable {
        &self.migration
    }

    /// Creates a bus. `parent = None` makes it a stand-alone top-level reset
    /// target (distinct from the root, which is only ever created by
    /// [Machine::root]); its reset hook, if any, is registered here and
    /// deregistered by [Machine::free_bus].
    pub fn create_bus(
        &self,
        kind: &'static BusKind,
        parent: Option<&Handle<Device>>,
        name: Option<String>,
        allow_hotplug: bool,
    ) -> Handle<Bus> {
        let bus = tree::create_bus(kind, parent, name, allow_hotplug);
        if parent.is_none() {
            log::debug!("registered reset handler for stand-alone bus '{}'", bus.name);
            self.reset_targets.write().unwrap().push(bus.clone());
        }
        bus
    }

    /// Recursively frees every device hosted on `bus` and, if `bus` is a
    /// stand-alone reset target, deregisters its reset hook. Never call this
    /// on the root bus: it is never freed (§5).
    pub fn free_bus(&self, bus: &Handle<Bus>) {
        let children: Vec<Handle<Device>> = bus.children.write().unwrap().drain(..).collect();
        for device in children {
            crate::lifecycle::free(&device, self);
        }
        if bus.parent_device().is_none() {
            self.reset_targets.write().unwrap().retain(|b| b != bus);
        }
    }

    /// Creates a device of `kind` on `bus`, applying the hot-plug gate and
    /// flipping `machine_modified` when the creation is in fact a hot-plug.
    pub fn create_device(&self, bus: &Handle<Bus>, kind: &'static DeviceKind) -> Result<Handle<Device>, QdevError> {
        let defaults = self.global_defaults.read().unwrap();
        let (device, hotplugged) =
            tree::create_device(bus, kind, self.creation_done.load(Ordering::SeqCst), &defaults)?;
        drop(defaults);
        if hotplugged {
            self.modified.store(true, Ordering::SeqCst);
            log::info!("hot-plugged device '{}' onto bus '{}'", kind.name, bus.name);
        }
        Ok(device)
    }

    /// Registers a process-wide default for `(kind_name, property)`, applied
    /// after a kind's own declared defaults and before any user override.
    pub fn set_global_default(&self, kind_name: impl Into<String>, property: impl Into<String>, value: impl Into<String>) {
        self.global_defaults.write().unwrap().insert((kind_name.into(), property.into()), value.into());
    }

    /// Declares machine creation finished: every subsequent device creation
    /// must pass the hot-plug gate.
    pub fn machine_creation_done(&self) {
        self.creation_done.store(true, Ordering::SeqCst);
        log::info!("machine creation done; hot-plug gate now active");
    }

    pub fn is_creation_done(&self) -> bool {
        self.creation_done.load(Ordering::SeqCst)
    }

    pub fn is_modified(&self) -> bool {
        self.modified.load(Ordering::SeqCst)
    }

    pub(crate) fn mark_modified(&self) {
        self.modified.store(true, Ordering::SeqCst);
    }

    /// Resets the whole machine: walks the root bus's subtree, then every
    /// stand-alone reset target, halting at the first non-zero callback.
    pub fn system_reset(&self) -> i32 {
        let code = crate::lifecycle::reset_bus(&self.root());
        if code != 0 {
            return code;
        }
        for bus in self.reset_targets.read().unwrap().iter() {
            let code = crate::lifecycle::reset_bus(bus);
            if code != 0 {
                return code;
            }
        }
        0
    }

    /// The state descriptor a migratable device registered under, if any.
    pub fn state_descriptor_for(&self, device: &Handle<Device>) -> Option<&'static StateDescriptor> {
        self.migration.descriptor_for(device.instance_id)
    }
}

impl Default for Machine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_is_lazily_created_once() {
        let machine = Machine::new();
        let a = machine.root();
        let b = machine.root();
        assert_eq!(a, b);
    }

    #[test]
    fn creation_done_latches_and_modified_starts_false() {
        let machine = Machine::new();
        assert!(!machine.is_creation_done());
        assert!(!machine.is_modified());
        machine.machine_creation_done();
        assert!(machine.is_creation_done());
        assert!(!machine.is_modified());
    }
}
