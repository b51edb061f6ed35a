//! The lifecycle manager: the per-device state machine
//! (`Created` → `Initialised` → unplugged), hot-plug gating, reset-walk and
//! teardown ordering described in §4.5.

use crate::error::QdevError;
use crate::machine::Machine;
use crate::tree::device::LifecycleState;
use crate::tree::{Bus, Device};
use machina_utils::Handle;

/// Runs `device.kind.init`. Precondition: `device.state() == Created`.
///
/// On failure the device is freed and `DeviceInitFailed` is returned. On
/// success, if the kind carries a state descriptor, it is registered with
/// `machine`'s migration table (under the device's optional migration
/// alias) before the device transitions to `Initialised`.
pub fn init(device: &Handle<Device>, machine: &Machine) -> Result<(), QdevError> {
    debug_assert_eq!(device.state(), LifecycleState::Created);
    match (device.kind.init)(device) {
        Ok(()) => {
            if let Some(descriptor) = device.kind.state_descriptor {
                machine.migration().register(device.instance_id, descriptor, device.migration_alias);
            }
            device.set_state(LifecycleState::Initialised);
            log::info!("initialised device '{}'", device.kind.name);
            Ok(())
        }
        Err(reason) => {
            log::warn!("init failed for device '{}': {reason}", device.kind.name);
            free(device, machine);
            Err(QdevError::DeviceInitFailed(device.kind.name.to_string()))
        }
    }
}

/// Like [init], but a failure terminates the process with a descriptive
/// message. Intended only for construction that happens before the machine
/// is considered ready to run (board/platform wiring in `main`), where
/// there is no sensible way to continue after a failed mandatory device.
pub fn init_or_abort(device: &Handle<Device>, machine: &Machine) {
    if let Err(err) = init(device, machine) {
        eprintln!("fatal: {err}");
        std::process::exit(1);
    }
}

/// Tears a device down.
///
/// If `Initialised`: recursively frees every hosted child bus depth-first,
/// unregisters migration state, invokes the kind's optional `exit`, and
/// drops the retained option bag. Then, regardless of state: unlinks the
/// device from its parent bus's child list, runs every property's `free`
/// (the device's own schema, then its host bus-kind's), and releases the
/// backing storage (dropped along with the last `Handle` reference).
pub fn free(device: &Handle<Device>, machine: &Machine) {
    if device.state() == LifecycleState::Initialised {
        let buses: Vec<Handle<Bus>> = device.children_buses.write().unwrap().drain(..).collect();
        for bus in buses {
            let children: Vec<Handle<Device>> = bus.children.write().unwrap().drain(..).collect();
            for child in children {
                free(&child, machine);
            }
        }
        machine.migration().unregister(device.instance_id);
        if let Some(exit) = device.kind.exit {
            exit(device);
        }
        let _ = device.take_option_bag();
    }

    let parent = device.parent_bus();
    if let Some(parent) = &parent {
        parent.children.write().unwrap().retain(|d| d != device);
    }
    for prop in device.kind.properties {
        prop.free(&device.storage);
    }
    if let Some(parent) = &parent {
        for prop in parent.kind.properties {
            prop.free(&device.storage);
        }
    }
    device.clear_parent();
    log::info!("freed device '{}'", device.kind.name);
}

/// Unplugs a device: fails with `BusNoHotplug` if its parent bus doesn't
/// allow it. If the kind declares an `unplug` hook, it runs first as a
/// pre-removal notification (quiescing, flushing, ...); the hook cannot
/// remove the device itself (`UnplugHook` carries no `Machine` handle), so
/// `unplug` always follows it with [free] to perform the actual removal.
/// `unplug` is therefore optional: a kind with none simply skips straight
/// to removal.
pub fn unplug(device: &Handle<Device>, machine: &Machine) -> Result<(), QdevError> {
    let parent = device.parent_bus().expect("device has no parent bus to unplug from");
    if !parent.allow_hotplug {
        return Err(QdevError::BusNoHotplug(parent.name.clone()));
    }
    if let Some(hook) = device.kind.unplug {
        hook(device);
    }
    free(device, machine);
    machine.mark_modified();
    log::info!("unplugged device '{}'", device.kind.name);
    Ok(())
}

/// Pre-order reset walk starting at `bus`: `bus`'s own reset hook first,
/// then for each hosted device its reset hook followed by a recursive walk
/// of its child buses. Halts at the first non-zero return. Both
/// `Machine::system_reset` and a device-rooted `reset` derive from this one
/// walk, per the "unused-segment loop" design note about not duplicating
/// recursive walks.
pub fn reset_bus(bus: &Handle<Bus>) -> i32 {
    if let Some(hook) = bus.kind.reset {
        let code = hook(bus);
        if code != 0 {
            return code;
        }
    }
    for device in bus.children.read().unwrap().iter() {
        if let Some(hook) = device.kind.reset {
            let code = hook(device);
            if code != 0 {
                return code;
            }
        }
        for child_bus in device.children_buses.read().unwrap().iter() {
            let code = reset_bus(child_bus);
            if code != 0 {
                return code;
            }
        }
    }
    0
}

/// Resets the subtree rooted at a single device: the device's own reset
/// hook, then each of its child buses via [reset_bus].
pub fn reset_device(device: &Handle<Device>) -> i32 {
    if let Some(hook) = device.kind.reset {
        let code = hook(device);
        if code != 0 {
            return code;
        }
    }
    for bus in device.children_buses.read().unwrap().iter() {
        let code = reset_bus(bus);
        if code != 0 {
            return code;
        }
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::{PropertyDescriptor, PropertyKind, PropertyValue};
    use crate::registry::{register_bus_kind, register_device_kind, BusKind, DeviceKind};

    fn noop_init(_dev: &Device) -> Result<(), String> {
        Ok(())
    }

    fn failing_init(_dev: &Device) -> Result<(), String> {
        Err("nope".to_string())
    }

    fn sys_bus_kind(name: &'static str) -> &'static BusKind {
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

    #[test]
    fn successful_init_transitions_to_initialised() {
        let bus_kind = sys_bus_kind("lifecycle-test-sys-a");
        let kind = register_device_kind(DeviceKind {
            name: "lifecycle-test-blinker-a",
            alias: None,
            description: None,
            user_creatable: true,
            bus_kind: "lifecycle-test-sys-a",
            instance_size: 4,
            properties: &[],
            init: noop_init,
            exit: None,
            reset: None,
            unplug: None,
            state_descriptor: None,
            migration_alias: None,
        })
        .unwrap();
        let machine = Machine::new();
        let root = machine.create_bus(bus_kind, None, Some("root".into()), false);
        let device = machine.create_device(&root, kind).unwrap();
        init(&device, &machine).unwrap();
        assert_eq!(device.state(), LifecycleState::Initialised);
    }

    #[test]
    fn failed_init_frees_the_device_and_unlinks_it() {
        let bus_kind = sys_bus_kind("lifecycle-test-sys-b");
        let kind = register_device_kind(DeviceKind {
            name: "lifecycle-test-blinker-b",
            alias: None,
            description: None,
            user_creatable: true,
            bus_kind: "lifecycle-test-sys-b",
            instance_size: 4,
            properties: &[],
            init: failing_init,
            exit: None,
            reset: None,
            unplug: None,
            state_descriptor: None,
            migration_alias: None,
        })
        .unwrap();
        let machine = Machine::new();
        let root = machine.create_bus(bus_kind, None, Some("root".into()), false);
        let device = machine.create_device(&root, kind).unwrap();
        assert!(matches!(init(&device, &machine), Err(QdevError::DeviceInitFailed(_))));
        assert_eq!(root.children.read().unwrap().len(), 0);
    }

    #[test]
    fn free_clears_a_str_propertys_heap_slot() {
        let bus_kind = sys_bus_kind("lifecycle-test-sys-c");
        let kind = register_device_kind(DeviceKind {
            name: "lifecycle-test-blinker-c",
            alias: None,
            description: None,
            user_creatable: true,
            bus_kind: "lifecycle-test-sys-c",
            instance_size: 16,
            properties: &[PropertyDescriptor::new("chardev", PropertyKind::Str, 0)],
            init: noop_init,
            exit: None,
            reset: None,
            unplug: None,
            state_descriptor: None,
            migration_alias: None,
        })
        .unwrap();
        let machine = Machine::new();
        let root = machine.create_bus(bus_kind, None, Some("root".into()), false);
        let device = machine.create_device(&root, kind).unwrap();
        kind.properties[0].parse_and_write(&device.storage, "serial0").unwrap();
        init(&device, &machine).unwrap();
        free(&device, &machine);
        assert_eq!(root.children.read().unwrap().len(), 0);
        assert!(kind.properties[0].read(&device.storage).unwrap_or(PropertyValue::Str(String::new())) == PropertyValue::Str(String::new()));
    }

    #[test]
    fn reset_halts_at_first_nonzero_callback() {
        fn fails(_d: &Device) -> i32 {
            7
        }
        let bus_kind = sys_bus_kind("lifecycle-test-sys-d");
        let kind = register_device_kind(DeviceKind {
            name: "lifecycle-test-blinker-d",
            alias: None,
            description: None,
            user_creatable: true,
            bus_kind: "lifecycle-test-sys-d",
            instance_size: 4,
            properties: &[],
            init: noop_init,
            exit: None,
            reset: Some(fails),
            unplug: None,
            state_descriptor: None,
            migration_alias: None,
        })
        .unwrap();
        let machine = Machine::new();
        let root = machine.create_bus(bus_kind, None, Some("root".into()), false);
        let device = machine.create_device(&root, kind).unwrap();
        init(&device, &machine).unwrap();
        assert_eq!(reset_bus(&root), 7);
    }
}
