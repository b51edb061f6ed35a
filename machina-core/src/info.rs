//! Read-only `info` commands: `info tree` and `info device-list` (§6). Pure
//! presentation over a live [Machine] or the kind registry — no new
//! invariants, no mutation.

use crate::machine::Machine;
use crate::registry::list_device_kinds;
use crate::tree::Bus;
use machina_utils::Handle;

/// `info device-list`: one line per registered kind.
pub fn device_list() -> String {
    list_device_kinds()
        .into_iter()
        .map(|kind| {
            let mut line = format!("name \"{}\", bus {}", kind.name, kind.bus_kind);
            if let Some(alias) = kind.alias {
                line.push_str(&format!(", alias \"{alias}\""));
            }
            if let Some(desc) = kind.description {
                line.push_str(&format!(", desc \"{desc}\""));
            }
            if !kind.user_creatable {
                line.push_str(", no-user");
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// `info tree`: pretty-prints the bus/device tree rooted at `machine`'s root
/// bus, with per-device property listings, GPIO line counts, and
/// bus-kind-specific extensions via `print_dev`.
pub fn tree(machine: &Machine) -> String {
    let mut out = String::new();
    render_bus(&machine.root(), 0, &mut out);
    out
}

fn render_bus(bus: &Handle<Bus>, depth: usize, out: &mut String) {
    let indent = "  ".repeat(depth);
    out.push_str(&format!("{indent}bus: {} ({})\n", bus.name, bus.kind.name));
    for device in bus.children.read().unwrap().iter() {
        let dindent = "  ".repeat(depth + 1);
        out.push_str(&format!(
            "{dindent}dev: {} (gpio-in={}, gpio-out={})\n",
            device.kind.name,
            device.gpio.input_len(),
            device.gpio.output_len()
        ));
        for prop in device.kind.properties {
            if let Some(value) = prop.print(&device.storage) {
                out.push_str(&format!("{dindent}  {} = {value}\n", prop.name));
            }
        }
        if let Some(print_dev) = bus.kind.print_dev {
            out.push_str(&format!("{dindent}  {}\n", print_dev(device)));
        }
        for child_bus in device.children_buses.read().unwrap().iter() {
            render_bus(child_bus, depth + 2, out);
        }
    }
}

/// `firmware_path(device)` (§4.9): walks root-to-leaf, calling each
/// ancestor bus-kind's optional `get_firmware_path` (falling back to the
/// device's kind-name), concatenating segments with `/` and trimming the
/// trailing slash.
pub fn firmware_path(device: &Handle<crate::tree::Device>) -> String {
    let mut chain = vec![device.clone()];
    let mut current = device.clone();
    while let Some(parent_device) = current.parent_bus().and_then(|bus| bus.parent_device()) {
        chain.push(parent_device.clone());
        current = parent_device;
    }
    chain.reverse();

    let segments: Vec<String> = chain
        .iter()
        .map(|dev| match dev.parent_bus().and_then(|bus| bus.kind.get_firmware_path) {
            Some(hook) => hook(dev),
            None => dev.kind.name.to_string(),
        })
        .collect();
    segments.join("/").trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{register_device_kind, DeviceKind};

    fn noop_init(_dev: &crate::tree::Device) -> Result<(), String> {
        Ok(())
    }

    #[test]
    fn device_list_marks_non_user_creatable_kinds() {
        register_device_kind(DeviceKind {
            name: "info-test-hidden",
            alias: None,
            description: None,
            user_creatable: false,
            bus_kind: "info-test-sys",
            instance_size: 0,
            properties: &[],
            init: noop_init,
            exit: None,
            reset: None,
            unplug: None,
            state_descriptor: None,
            migration_alias: None,
        })
        .unwrap();
        assert!(device_list().lines().any(|l| l.contains("info-test-hidden") && l.contains("no-user")));
    }

    #[test]
    fn firmware_path_falls_back_to_kind_name_without_a_hook() {
        let kind = register_device_kind(DeviceKind {
            name: "info-test-leaf",
            alias: None,
            description: None,
            user_creatable: true,
            bus_kind: crate::machine::SYSTEM_BUS_KIND_NAME,
            instance_size: 0,
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
        let device = machine.create_device(&machine.root(), kind).unwrap();
        assert_eq!(firmware_path(&device), "info-test-leaf");
    }
}
