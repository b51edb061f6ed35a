//! The bus/device tree: two mutually-referential node types forming a
//! rooted tree whose root is a synthetic main system bus.

pub mod bus;
pub mod device;

pub use bus::Bus;
pub use device::{Device, LifecycleState};

use crate::error::QdevError;
use crate::property::{apply_defaults, PropertyDescriptor};
use crate::registry::{BusKind, DeviceKind};
use crate::storage::Storage;
use machina_utils::Handle;
use std::collections::HashMap;
use std::sync::atomic::Ordering;

/// Creates a bus under `parent` (or the root, if `parent` is `None`).
///
/// `name` defaults to `"<parent.id>.<n>"` when the parent device has an
/// `id`, else `"<kind.name>.<n>"` lower-cased, where `n` is the parent's
/// current child-bus count. Inserts itself at the head of
/// `parent.children_buses`.
pub fn create_bus(
    kind: &'static BusKind,
    parent: Option<&Handle<Device>>,
    name: Option<String>,
    allow_hotplug: bool,
) -> Handle<Bus> {
    let n = parent.map(|p| p.children_buses.read().unwrap().len()).unwrap_or(0);
    let name = name.unwrap_or_else(|| match parent.and_then(|p| p.id()) {
        Some(id) => format!("{id}.{n}"),
        None => format!("{}.{n}", kind.name.to_lowercase()),
    });
    let bus = Bus::new(kind, name, parent, allow_hotplug);
    if let Some(p) = parent {
        p.children_buses.write().unwrap().insert(0, bus.clone());
    }
    bus
}

/// Creates a device of `kind` on `bus`.
///
/// Allocates zeroed storage of `kind.instance_size`, applies kind defaults
/// then bus-kind defaults then `global_defaults`, and inserts the new
/// device at the head of `bus.children`. `past_creation` gates hot-plug:
/// when true and `bus.allow_hotplug` is false, the call fails and nothing
/// is mutated. Returns the new device plus whether it was a hot-plug insertion.
pub fn create_device(
    bus: &Handle<Bus>,
    kind: &'static DeviceKind,
    past_creation: bool,
    global_defaults: &HashMap<(String, String), String>,
) -> Result<(Handle<Device>, bool), QdevError> {
    if bus.kind.name != kind.bus_kind {
        return Err(QdevError::BadBusForDevice {
            kind: kind.name.to_string(),
            bus_kind: bus.kind.name.to_string(),
        });
    }
    if past_creation && !bus.allow_hotplug {
        return Err(QdevError::BusNoHotplug(bus.name.clone()));
    }

    let device = Device::new(kind, bus);
    apply_defaults(kind.properties, &device.storage);
    apply_defaults(bus.kind.properties, &device.storage);
    apply_global_defaults(&device.storage, kind.name, kind.properties, global_defaults);
    apply_global_defaults(&device.storage, kind.name, bus.kind.properties, global_defaults);
    device.hotplugged.store(past_creation, Ordering::SeqCst);
    bus.children.write().unwrap().insert(0, device.clone());
    Ok((device, past_creation))
}

fn apply_global_defaults(
    storage: &Storage,
    kind_name: &str,
    schema: &[PropertyDescriptor],
    global_defaults: &HashMap<(String, String), String>,
) {
    for prop in schema {
        if let Some(text) = global_defaults.get(&(kind_name.to_string(), prop.name.to_string())) {
            let _ = prop.parse_and_write(storage, text);
        }
    }
}

/// Pre-order walk over every device in the subtree rooted at `bus`, visiting
/// `bus` itself first (as a bus has no payload of its own to visit, the walk
/// only calls `f` for devices, but still descends through every bus along
/// the way). Used to derive both `find_by_id` (see `path.rs`) and `reset`'s
/// traversal from one shared implementation.
pub fn walk_devices_preorder<F: FnMut(&Handle<Device>)>(bus: &Handle<Bus>, f: &mut F) {
    for device in bus.children.read().unwrap().iter() {
        f(device);
        for child_bus in device.children_buses.read().unwrap().iter() {
            walk_devices_preorder(child_bus, f);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::{PropertyDescriptor, PropertyKind, PropertyValue};
    use crate::registry::{register_bus_kind, register_device_kind};

    fn noop_init(_dev: &Device) -> Result<(), String> {
        Ok(())
    }

    fn test_bus_kind(name: &'static str) -> &'static BusKind {
        register_bus_kind(BusKind {
            name,
            instance_size: 0,
            reset: None,
            print_dev: None,
            get_firmware_path: None,
            properties: &[],
        })
        .unwrap()
    }

    fn test_device_kind(name: &'static str, bus_kind: &'static str) -> &'static DeviceKind {
        register_device_kind(DeviceKind {
            name,
            alias: None,
            description: None,
            user_creatable: true,
            bus_kind,
            instance_size: 8,
            properties: &[PropertyDescriptor::new("rate", PropertyKind::Uint32, 0).with_default(PropertyValue::Uint32(1000))],
            init: noop_init,
            exit: None,
            reset: None,
            unplug: None,
            state_descriptor: None,
            migration_alias: None,
        })
        .unwrap()
    }

    #[test]
    fn device_inherits_declared_default() {
        let bus_kind = test_bus_kind("tree-test-sys-a");
        let kind = test_device_kind("tree-test-blinker-a", "tree-test-sys-a");
        let root = create_bus(bus_kind, None, Some("root".into()), false);
        let (device, hotplugged) = create_device(&root, kind, false, &HashMap::new()).unwrap();
        assert!(!hotplugged);
        assert_eq!(
            kind.properties[0].read(&device.storage).unwrap(),
            PropertyValue::Uint32(1000)
        );
        assert_eq!(root.children.read().unwrap().len(), 1);
    }

    #[test]
    fn mismatched_bus_kind_is_rejected() {
        let bus_kind = test_bus_kind("tree-test-sys-b");
        let other_bus_kind = test_bus_kind("tree-test-other-b");
        let kind = test_device_kind("tree-test-blinker-b", "tree-test-sys-b");
        let root = create_bus(other_bus_kind, None, Some("root".into()), false);
        assert!(matches!(
            create_device(&root, kind, false, &HashMap::new()),
            Err(QdevError::BadBusForDevice { .. })
        ));
    }

    #[test]
    fn hotplug_after_creation_on_non_hotpluggable_bus_is_rejected() {
        let bus_kind = test_bus_kind("tree-test-sys-c");
        let kind = test_device_kind("tree-test-blinker-c", "tree-test-sys-c");
        let root = create_bus(bus_kind, None, Some("root".into()), false);
        assert!(matches!(
            create_device(&root, kind, true, &HashMap::new()),
            Err(QdevError::BusNoHotplug(_))
        ));
    }
}
