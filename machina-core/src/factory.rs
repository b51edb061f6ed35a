//! The factory / option binder: `find kind → find/select bus → allocate →
//! apply properties → init`, as described in §4.6, plus the `device-del`
//! and `device-show` command bodies that share the same path-resolution and
//! lifecycle plumbing.

use crate::error::QdevError;
use crate::introspect::{self, StateFieldValue};
use crate::lifecycle;
use crate::machine::Machine;
use crate::path;
use crate::property::PropertyKind;
use crate::registry::{find_device_kind, list_device_kinds, DeviceKind};
use crate::tree::Device;
use machina_utils::Handle;
use std::collections::HashMap;

/// The option bag a `device-add` (or CLI front-end) call is built from:
/// `driver`, optional `bus`, optional `id`, plus whatever other keys name
/// properties of the resolved kind or its host bus-kind. A bare `"?"` key
/// (no meaningful value) requests property help instead of construction.
pub type OptionBag = HashMap<String, String>;

/// What `device_add` produced: either a live device, or one of the two help
/// listings `driver=?` / `?` trigger. Modelled as a distinct outcome rather
/// than a flag threaded through construction, per the design notes.
pub enum AddOutcome {
    Created(Handle<Device>),
    Help(HelpInfo),
}

pub enum HelpInfo {
    /// `driver=?`: every user-creatable kind.
    Kinds(Vec<&'static DeviceKind>),
    /// `driver=<kind>,?`: every printable property name of that kind (and,
    /// if a `bus=` was also given and resolves, its host bus-kind's).
    Properties { kind: &'static DeviceKind, properties: Vec<&'static str> },
}

const RESERVED_KEYS: [&str; 4] = ["driver", "bus", "id", "?"];

/// Runs the `device-add` command body described in §4.6.
pub fn device_add(machine: &Machine, bag: OptionBag) -> Result<AddOutcome, QdevError> {
    let driver = bag.get("driver").ok_or_else(|| QdevError::MissingParameter("driver".to_string()))?;
    if driver == "?" {
        let kinds = list_device_kinds().into_iter().filter(|k| k.user_creatable).collect();
        return Ok(AddOutcome::Help(HelpInfo::Kinds(kinds)));
    }

    let kind = find_device_kind(None, driver)
        .filter(|k| k.user_creatable)
        .ok_or_else(|| QdevError::InvalidParameterValue {
            name: "driver".to_string(),
            expected: "a registered, user-creatable device kind".to_string(),
        })?;

    let bus = match bag.get("bus") {
        Some(target) => {
            let bus = path::resolve_bus(&machine.root(), target, false)?;
            if bus.kind.name != kind.bus_kind {
                return Err(QdevError::BadBusForDevice {
                    kind: kind.name.to_string(),
                    bus_kind: bus.kind.name.to_string(),
                });
            }
            bus
        }
        None => path::find_bus_of_kind(&machine.root(), kind.bus_kind).ok_or_else(|| QdevError::NoBusForDevice {
            kind: kind.name.to_string(),
            bus_kind: kind.bus_kind.to_string(),
        })?,
    };

    if bag.contains_key("?") {
        let mut properties: Vec<&'static str> = printable_names(kind.properties);
        properties.extend(printable_names(bus.kind.properties));
        return Ok(AddOutcome::Help(HelpInfo::Properties { kind, properties }));
    }

    if machine.is_creation_done() && !bus.allow_hotplug {
        return Err(QdevError::BusNoHotplug(bus.name.clone()));
    }

    let device = machine.create_device(&bus, kind)?;

    if let Some(id) = bag.get("id") {
        if path::find_by_id(&machine.root(), id).is_some() {
            lifecycle::free(&device, machine);
            return Err(QdevError::InvalidParameterValue {
                name: "id".to_string(),
                expected: "an id not already used in the tree".to_string(),
            });
        }
        device.set_id(Some(id.clone()));
    }

    for (key, value) in bag.iter() {
        if RESERVED_KEYS.contains(&key.as_str()) {
            continue;
        }
        let prop = kind.properties.iter().chain(bus.kind.properties.iter()).find(|p| p.name == key);
        match prop {
            Some(prop) => {
                if let Err(err) = prop.parse_and_write(&device.storage, value) {
                    lifecycle::free(&device, machine);
                    return Err(err.into());
                }
            }
            None => {
                lifecycle::free(&device, machine);
                return Err(QdevError::InvalidParameterValue {
                    name: key.clone(),
                    expected: format!("a property of '{}'", kind.name),
                });
            }
        }
    }

    lifecycle::init(&device, machine)?;
    device.retain_option_bag(bag);
    Ok(AddOutcome::Created(device))
}

fn printable_names(schema: &'static [crate::property::PropertyDescriptor]) -> Vec<&'static str> {
    schema.iter().filter(|p| !matches!(p.kind, PropertyKind::LegacyReadOnly)).map(|p| p.name).collect()
}

/// Runs the `device-del` command body: resolves `id` and invokes
/// `lifecycle::unplug`, which runs the kind's optional `unplug` notification
/// hook and then removes the device itself, within this call.
pub fn device_del(machine: &Machine, id: &str) -> Result<(), QdevError> {
    let device = path::find_by_id(&machine.root(), id).ok_or_else(|| QdevError::DeviceNotFound(id.to_string()))?;
    lifecycle::unplug(&device, machine)
}

/// The structured object `device-show` returns (§6).
pub struct DeviceShow {
    pub device: String,
    pub id: String,
    pub version: u32,
    pub fields: Vec<StateFieldValue>,
}

/// Runs the `device-show` command body: resolves `path`, then consults
/// `machine`'s migration table (populated by `lifecycle::init`) for the
/// descriptor the device actually registered under, failing `DeviceNoState`
/// if it never did, and walks it with the introspector.
pub fn device_show(machine: &Machine, path_str: &str, full: bool) -> Result<DeviceShow, QdevError> {
    let device = path::resolve_device(&machine.root(), path_str)?;
    if !machine.migration().is_registered(device.instance_id) {
        return Err(QdevError::DeviceNoState(device.kind.name.to_string()));
    }
    let descriptor = machine
        .state_descriptor_for(&device)
        .ok_or_else(|| QdevError::DeviceNoState(device.kind.name.to_string()))?;
    let fields = introspect::introspect(descriptor, &device.storage, full)
        .map_err(|_| QdevError::DeviceNoState(device.kind.name.to_string()))?;
    Ok(DeviceShow {
        device: format!("{}.{}", device.kind.name, device.instance_number()),
        id: device.id().unwrap_or_default(),
        version: descriptor.version_id,
        fields,
    })
}
