//! [Bus] is a container node whose kind constrains which device kinds may
//! be hosted on it.

use crate::registry::BusKind;
use crate::tree::device::Device;
use machina_utils::{Handle, HandleRef};
use std::sync::RwLock;

pub struct Bus {
    pub kind: &'static BusKind,
    pub name: String,
    parent: Option<HandleRef<Device>>,
    pub children: RwLock<Vec<Handle<Device>>>,
    pub allow_hotplug: bool,
    /// Whether this bus is a stand-alone top-level reset target (no parent
    /// device) and therefore owns its own teardown/reset-handler lifecycle,
    /// as opposed to one embedded inside and torn down with a parent device.
    pub owned_allocation: bool,
}

impl Bus {
    pub(crate) fn new(
        kind: &'static BusKind,
        name: String,
        parent: Option<&Handle<Device>>,
        allow_hotplug: bool,
    ) -> Handle<Bus> {
        Handle::from(Bus {
            kind,
            name,
            parent: parent.map(|p| p.downgrade()),
            children: RwLock::new(Vec::new()),
            allow_hotplug,
            owned_allocation: parent.is_none(),
        })
    }

    pub fn parent_device(&self) -> Option<Handle<Device>> {
        self.parent.as_ref().and_then(|r| r.get())
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}
