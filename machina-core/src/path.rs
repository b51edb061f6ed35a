//! Path resolution: `"/bus/device[.n]/bus/..."` strings and recursive
//! name/id searches into tree nodes.

use crate::error::QdevError;
use crate::tree::{walk_devices_preorder, Bus, Device};
use machina_utils::Handle;

enum Node {
    Bus(Handle<Bus>),
    Device(Handle<Device>),
}

fn split_segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Shared recursive pre-order bus search, parameterised by a predicate so
/// name search (below) and kind search (`find_bus_of_kind`, used by the
/// factory) don't each carry their own walk.
fn find_bus_where(bus: &Handle<Bus>, pred: &impl Fn(&Bus) -> bool) -> Option<Handle<Bus>> {
    if pred(bus) {
        return Some(bus.clone());
    }
    for device in bus.children.read().unwrap().iter() {
        for child_bus in device.children_buses.read().unwrap().iter() {
            if let Some(found) = find_bus_where(child_bus, pred) {
                return Some(found);
            }
        }
    }
    None
}

/// Recursively finds the first bus (pre-order) whose name matches, starting
/// from `root`. Both an anchored leading-`/` first segment and an
/// unanchored one resolve this way, since there is exactly one tree root.
fn find_bus_recursive(bus: &Handle<Bus>, name: &str) -> Option<Handle<Bus>> {
    find_bus_where(bus, &|b| b.name == name)
}

/// Pre-order search for the first bus whose *kind* matches `bus_kind`, used
/// by the factory when a `device_add` call doesn't specify an explicit
/// `bus=` target.
pub fn find_bus_of_kind(bus: &Handle<Bus>, bus_kind: &str) -> Option<Handle<Bus>> {
    find_bus_where(bus, &|b| b.kind.name == bus_kind)
}

/// Splits `"name.n"` into `("name", n)`, defaulting `n` to `0` when there is
/// no numeric suffix.
fn parse_instance_qualifier(segment: &str) -> (&str, usize) {
    if let Some(idx) = segment.rfind('.') {
        let (name, suffix) = segment.split_at(idx);
        if let Ok(n) = suffix[1..].parse::<usize>() {
            return (name, n);
        }
    }
    (segment, 0)
}

fn find_device_in_bus(bus: &Handle<Bus>, segment: &str) -> Result<Handle<Device>, QdevError> {
    let (name, n) = parse_instance_qualifier(segment);
    let children = bus.children.read().unwrap();
    if let Some(found) = children.iter().filter(|d| d.kind.name == name).nth(n) {
        return Ok(found.clone());
    }
    children
        .iter()
        .filter(|d| d.kind.alias == Some(name))
        .nth(n)
        .cloned()
        .ok_or_else(|| QdevError::DeviceNotFound(segment.to_string()))
}

/// Resolves a device segment ending a path down to its sole child bus.
/// Fails with `DeviceNoBus` for zero child buses, `DeviceMultipleBuses` for
/// more than one; candidate names are only enumerated when `interactive`.
fn device_to_single_bus(device: &Handle<Device>, interactive: bool) -> Result<Handle<Bus>, QdevError> {
    let buses = device.children_buses.read().unwrap();
    match buses.len() {
        0 => Err(QdevError::DeviceNoBus(device.kind.name.to_string())),
        1 => Ok(buses[0].clone()),
        _ => {
            let candidates = if interactive {
                buses.iter().map(|b| b.name.clone()).collect()
            } else {
                Vec::new()
            };
            Err(QdevError::DeviceMultipleBuses { name: device.kind.name.to_string(), candidates })
        }
    }
}

fn resolve_segments(root: &Handle<Bus>, segments: &[&str]) -> Result<Node, QdevError> {
    if segments.is_empty() {
        return Ok(Node::Bus(root.clone()));
    }
    let mut node = Node::Bus(
        find_bus_recursive(root, segments[0]).ok_or_else(|| QdevError::BusNotFound(segments[0].to_string()))?,
    );
    for seg in &segments[1..] {
        node = match node {
            Node::Bus(bus) => Node::Device(find_device_in_bus(&bus, seg)?),
            Node::Device(device) => {
                let found = device.children_buses.read().unwrap().iter().find(|b| b.name == *seg).cloned();
                Node::Bus(found.ok_or_else(|| QdevError::BusNotFound(seg.to_string()))?)
            }
        };
    }
    Ok(node)
}

/// Resolves `path` to a bus. When the path ends on a device segment, that
/// device's sole child bus is returned (see `device_to_single_bus`).
pub fn resolve_bus(root: &Handle<Bus>, path: &str, interactive: bool) -> Result<Handle<Bus>, QdevError> {
    match resolve_segments(root, &split_segments(path))? {
        Node::Bus(bus) => Ok(bus),
        Node::Device(device) => device_to_single_bus(&device, interactive),
    }
}

/// Resolves `path` to a device. A path with no `/` is tried as a tree-wide
/// id first; otherwise it is resolved as an ordinary path ending on a
/// device segment.
pub fn resolve_device(root: &Handle<Bus>, path: &str) -> Result<Handle<Device>, QdevError> {
    if !path.contains('/') {
        if let Some(found) = find_by_id(root, path) {
            return Ok(found);
        }
    }
    match resolve_segments(root, &split_segments(path))? {
        Node::Device(device) => Ok(device),
        Node::Bus(_) => Err(QdevError::DeviceNotFound(path.to_string())),
    }
}

/// Pre-order search of the whole tree for the first device whose `id` matches.
pub fn find_by_id(root: &Handle<Bus>, id: &str) -> Option<Handle<Device>> {
    let mut found = None;
    walk_devices_preorder(root, &mut |d| {
        if found.is_none() && d.id().as_deref() == Some(id) {
            found = Some(d.clone());
        }
    });
    found
}

/// Pre-order listing of every device in the tree, derived from the same
/// walk as `find_by_id`.
pub fn iterate(root: &Handle<Bus>) -> Vec<Handle<Device>> {
    let mut all = Vec::new();
    walk_devices_preorder(root, &mut |d| all.push(d.clone()));
    all
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{register_bus_kind, register_device_kind, BusKind, DeviceKind};
    use crate::tree::create_device;
    use std::collections::HashMap;

    fn noop_init(_dev: &Device) -> Result<(), String> {
        Ok(())
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

    fn blinker_kind(name: &'static str, bus_kind: &'static str) -> &'static DeviceKind {
        register_device_kind(DeviceKind {
            name,
            alias: None,
            description: None,
            user_creatable: true,
            bus_kind,
            instance_size: 4,
            properties: &[],
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
    fn empty_path_resolves_to_root() {
        let root = crate::tree::create_bus(sys_bus_kind("path-test-sys-a"), None, Some("root".into()), false);
        let resolved = resolve_bus(&root, "/", false).unwrap();
        assert_eq!(resolved, root);
    }

    #[test]
    fn unknown_bus_segment_is_not_found() {
        let root = crate::tree::create_bus(sys_bus_kind("path-test-sys-b"), None, Some("root".into()), false);
        assert!(matches!(resolve_bus(&root, "/pci.0", false), Err(QdevError::BusNotFound(_))));
    }

    #[test]
    fn device_is_found_by_id() {
        let root = crate::tree::create_bus(sys_bus_kind("path-test-sys-c"), None, Some("root".into()), false);
        let kind = blinker_kind("path-test-blinker-c", "path-test-sys-c");
        let (device, _) = create_device(&root, kind, false, &HashMap::new()).unwrap();
        device.set_id(Some("led0".to_string()));
        let found = resolve_device(&root, "led0").unwrap();
        assert_eq!(found, device);
    }
}
