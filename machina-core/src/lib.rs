//! `machina-core`: the device composition core of a machine emulator.
//!
//! Presents a single abstract API by which device *kinds* are registered at
//! startup ([registry]), device *instances* are created, parameterised,
//! initialised, attached to buses and later removed ([tree], [property],
//! [lifecycle], [factory]), the resulting tree is traversed for reset and
//! path lookup ([path]), and a caller can introspect any live device's
//! persistent state using a declarative schema ([introspect]).
//!
//! [Machine] is the single value a process constructs to hold every piece
//! of process-wide state the core needs (root bus, hot-plug gate,
//! machine-modified latch, migration table); there are no bare
//! module-level globals for it. Device kinds and bus kinds remain
//! registered process-wide (see [registry]), since they are immutable and
//! `'static` once registered, independent of any one `Machine`.

pub mod error;
pub mod factory;
pub mod gpio;
pub mod info;
pub mod introspect;
pub mod lifecycle;
pub mod machine;
pub mod migration;
pub mod path;
pub mod property;
pub mod registry;
pub mod storage;
pub mod tree;

pub use error::{QdevError, RegistryError};
pub use factory::{device_add, device_del, device_show, AddOutcome, DeviceShow, HelpInfo, OptionBag};
pub use machine::{Machine, SYSTEM_BUS_KIND_NAME};
pub use registry::{register_bus_kind, register_device_kind, BusKind, DeviceKind};
pub use tree::{Bus, Device, LifecycleState};
