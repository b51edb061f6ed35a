//! [Device] is one node in the bus/device tree: an instance of a
//! [DeviceKind][crate::registry::DeviceKind] bound to exactly one parent bus.

use crate::gpio::GpioLines;
use crate::introspect::StateDescriptor;
use crate::migration::MigrationAlias;
use crate::registry::DeviceKind;
use crate::storage::Storage;
use crate::tree::bus::Bus;
use machina_utils::{Handle, HandleRef};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::RwLock;

/// Per-device lifecycle state: `Created` until `init` succeeds,
/// `Initialised` thereafter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Created,
    Initialised,
}

static NEXT_INSTANCE_ID: AtomicU64 = AtomicU64::new(1);

/// A device tree node.
pub struct Device {
    pub kind: &'static DeviceKind,
    /// Process-wide unique id, distinct from the user-assigned `id` below;
    /// used as the migration table's key.
    pub instance_id: u64,
    parent: RwLock<Option<HandleRef<Bus>>>,
    id: RwLock<Option<String>>,
    pub children_buses: RwLock<Vec<Handle<Bus>>>,
    state: RwLock<LifecycleState>,
    pub hotplugged: AtomicBool,
    pub gpio: GpioLines,
    pub storage: Storage,
    pub migration_alias: Option<MigrationAlias>,
    pub option_bag: RwLock<Option<HashMap<String, String>>>,
}

impl Device {
    pub(crate) fn new(kind: &'static DeviceKind, parent: &Handle<Bus>) -> Handle<Device> {
        Handle::from(Device {
            kind,
            instance_id: NEXT_INSTANCE_ID.fetch_add(1, Ordering::SeqCst),
            parent: RwLock::new(Some(parent.downgrade())),
            id: RwLock::new(None),
            children_buses: RwLock::new(Vec::new()),
            state: RwLock::new(LifecycleState::Created),
            hotplugged: AtomicBool::new(false),
            gpio: GpioLines::new(),
            storage: Storage::zeroed(kind.instance_size),
            migration_alias: kind.migration_alias,
            option_bag: RwLock::new(None),
        })
    }

    pub fn parent_bus(&self) -> Option<Handle<Bus>> {
        self.parent.read().unwrap().as_ref().and_then(|r| r.get())
    }

    pub(crate) fn clear_parent(&self) {
        *self.parent.write().unwrap() = None;
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.read().unwrap()
    }

    pub(crate) fn set_state(&self, state: LifecycleState) {
        *self.state.write().unwrap() = state;
    }

    pub fn id(&self) -> Option<String> {
        self.id.read().unwrap().clone()
    }

    pub(crate) fn set_id(&self, id: Option<String>) {
        *self.id.write().unwrap() = id;
    }

    pub fn state_descriptor(&self) -> Option<&'static StateDescriptor> {
        self.kind.state_descriptor
    }

    pub(crate) fn retain_option_bag(&self, bag: HashMap<String, String>) {
        *self.option_bag.write().unwrap() = Some(bag);
    }

    pub(crate) fn take_option_bag(&self) -> Option<HashMap<String, String>> {
        self.option_bag.write().unwrap().take()
    }

    /// This device's rank among its bus's children of the same kind, zero-based,
    /// used to render `"<kind>.<instance-no>"`.
    pub fn instance_number(&self) -> usize {
        let Some(parent) = self.parent_bus() else {
            return 0;
        };
        let children = parent.children.read().unwrap();
        children
            .iter()
            .filter(|d| d.kind.name == self.kind.name)
            .position(|d| std::ptr::eq(&**d, self))
            .unwrap_or(0)
    }
}
