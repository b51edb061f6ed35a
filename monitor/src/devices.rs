//! A couple of illustrative toy device kinds, registered once at start-up,
//! that the CLI's demo scripts exercise. Not a device catalogue.

use machina_core::introspect::{StateDescriptor, StateField};
use machina_core::property::{PropertyDescriptor, PropertyKind, PropertyValue};
use machina_core::registry::{register_bus_kind, register_device_kind, BusKind, DeviceKind};
use machina_core::tree::Device;
use machina_core::SYSTEM_BUS_KIND_NAME;
use std::sync::Once;

const RATE_PROPERTY: PropertyDescriptor =
    PropertyDescriptor::new("rate", PropertyKind::Uint32, 0).with_default(PropertyValue::Uint32(1000));

static TICKS_FIELD: StateField = StateField::scalar("ticks", 0, 4);
static BLINKER_STATE: StateDescriptor = StateDescriptor { version_id: 1, pre_save_hook: None, fields: &[TICKS_FIELD] };

fn blinker_init(_device: &Device) -> Result<(), String> {
    Ok(())
}

/// Name of the bus kind a `toy-bridge` device hosts its children on. The
/// bridge doesn't open this bus itself (`InitHook` carries no `Machine`
/// handle); `main` opens it explicitly right after the bridge is added.
pub const TOY_BRIDGE_BUS_KIND_NAME: &str = "toy-bridge-bus";

fn bridge_init(_device: &Device) -> Result<(), String> {
    Ok(())
}

fn child_init(_device: &Device) -> Result<(), String> {
    Ok(())
}

/// Registers the toy kinds. Idempotent: safe to call more than once in the
/// same process (a second call is a silent no-op past the first).
pub fn register() {
    static ONCE: Once = Once::new();
    ONCE.call_once(|| {
        register_device_kind(DeviceKind {
            name: "blinker",
            alias: Some("led"),
            description: Some("a toy device with a rate property and a ticks counter"),
            user_creatable: true,
            bus_kind: SYSTEM_BUS_KIND_NAME,
            instance_size: 4,
            properties: &[RATE_PROPERTY],
            init: blinker_init,
            exit: None,
            reset: None,
            unplug: None,
            state_descriptor: Some(&BLINKER_STATE),
            migration_alias: None,
        })
        .expect("toy kinds are registered exactly once, guarded by Once");

        register_bus_kind(BusKind {
            name: TOY_BRIDGE_BUS_KIND_NAME,
            instance_size: 0,
            reset: None,
            print_dev: None,
            get_firmware_path: None,
            properties: &[],
        })
        .expect("toy kinds are registered exactly once, guarded by Once");

        register_device_kind(DeviceKind {
            name: "toy-bridge",
            alias: None,
            description: Some("hosts a child toy-bridge-bus, opened by board setup code"),
            user_creatable: true,
            bus_kind: SYSTEM_BUS_KIND_NAME,
            instance_size: 0,
            properties: &[],
            init: bridge_init,
            exit: None,
            reset: None,
            unplug: None,
            state_descriptor: None,
            migration_alias: None,
        })
        .expect("toy kinds are registered exactly once, guarded by Once");

        register_device_kind(DeviceKind {
            name: "toy-child",
            alias: None,
            description: Some("lives behind a toy-bridge's child bus"),
            user_creatable: true,
            bus_kind: TOY_BRIDGE_BUS_KIND_NAME,
            instance_size: 0,
            properties: &[],
            init: child_init,
            exit: None,
            reset: None,
            unplug: None,
            state_descriptor: None,
            migration_alias: None,
        })
        .expect("toy kinds are registered exactly once, guarded by Once");
    });
}
