//! Error types for the device composition core.
//!
//! Plain enums with a hand-written [`std::fmt::Display`], in the style this
//! codebase has used throughout its device/driver layers rather than a
//! derive-macro error crate: callers that want `anyhow`-style chaining can
//! wrap these at their own boundary (see the `monitor` binary).

use std::fmt;

/// Errors raised while parsing or printing a property value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyError {
    /// The supplied text could not be parsed as the property's kind.
    ParseRejected { property: String, value: String },
    /// The raw storage slot backing the property is the wrong width for its kind.
    BadSlotWidth { property: String, expected: usize, found: usize },
}

impl fmt::Display for PropertyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyError::ParseRejected { property, value } => {
                write!(f, "property '{property}': rejected value '{value}'")
            }
            PropertyError::BadSlotWidth { property, expected, found } => {
                write!(
                    f,
                    "property '{property}': storage slot is {found} bytes, kind needs {expected}"
                )
            }
        }
    }
}

impl std::error::Error for PropertyError {}

/// Errors raised while reflecting over a device's raw backing storage
/// (used by both the property system and the state introspector).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReflectError {
    /// `offset + size` would run past the end of the backing buffer.
    OutOfBounds { offset: usize, size: usize, capacity: usize },
    /// A scalar field declared an `element_size` outside `{1, 2, 4, 8}`.
    UnsupportedElementSize(usize),
    /// A pointer-flavoured field's handle does not resolve to a live heap slot.
    DanglingHandle(u64),
}

impl fmt::Display for ReflectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReflectError::OutOfBounds { offset, size, capacity } => write!(
                f,
                "reflect: offset {offset} + size {size} exceeds backing storage of {capacity} bytes"
            ),
            ReflectError::UnsupportedElementSize(size) => {
                write!(f, "reflect: unsupported element size {size} (expected 1, 2, 4 or 8)")
            }
            ReflectError::DanglingHandle(handle) => {
                write!(f, "reflect: heap handle {handle} does not resolve to a live slot")
            }
        }
    }
}

impl std::error::Error for ReflectError {}

/// Errors raised while registering a device or bus kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A kind with this name is already registered; re-registering would
    /// silently invalidate `&'static` references other live devices may
    /// still hold into the previous entry.
    DuplicateKind(String),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::DuplicateKind(name) => write!(f, "kind '{name}' is already registered"),
        }
    }
}

impl std::error::Error for RegistryError {}

/// Errors surfaced at the device-add / device-del / device-show boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QdevError {
    MissingParameter(String),
    InvalidParameterValue { name: String, expected: String },
    BadBusForDevice { kind: String, bus_kind: String },
    NoBusForDevice { kind: String, bus_kind: String },
    BusNoHotplug(String),
    BusNotFound(String),
    DeviceNotFound(String),
    DeviceNoBus(String),
    DeviceMultipleBuses { name: String, candidates: Vec<String> },
    DeviceInitFailed(String),
    DeviceNoState(String),
    PropertyParseRejected { name: String, value: String },
}

impl fmt::Display for QdevError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QdevError::MissingParameter(name) => write!(f, "'{name}' is required"),
            QdevError::InvalidParameterValue { name, expected } => {
                write!(f, "'{name}' does not match {expected}")
            }
            QdevError::BadBusForDevice { kind, bus_kind } => {
                write!(f, "bus given for '{kind}' does not accept kind '{bus_kind}'")
            }
            QdevError::NoBusForDevice { kind, bus_kind } => {
                write!(f, "no bus of kind '{bus_kind}' found to host '{kind}'")
            }
            QdevError::BusNoHotplug(name) => write!(f, "bus '{name}' does not support hotplug"),
            QdevError::BusNotFound(name) => write!(f, "bus '{name}' not found"),
            QdevError::DeviceNotFound(name) => write!(f, "device '{name}' not found"),
            QdevError::DeviceNoBus(name) => write!(f, "device '{name}' has no child bus"),
            QdevError::DeviceMultipleBuses { name, candidates } => write!(
                f,
                "device '{name}' has multiple child buses: {}",
                candidates.join(", ")
            ),
            QdevError::DeviceInitFailed(kind) => write!(f, "initialization of device '{kind}' failed"),
            QdevError::DeviceNoState(kind) => write!(f, "device '{kind}' has no state descriptor"),
            QdevError::PropertyParseRejected { name, value } => {
                write!(f, "property '{name}': rejected value '{value}'")
            }
        }
    }
}

impl std::error::Error for QdevError {}

impl From<PropertyError> for QdevError {
    fn from(err: PropertyError) -> Self {
        match err {
            PropertyError::ParseRejected { property, value } => {
                QdevError::PropertyParseRejected { name: property, value }
            }
            PropertyError::BadSlotWidth { property, .. } => QdevError::PropertyParseRejected {
                name: property,
                value: String::from("<storage layout mismatch>"),
            },
        }
    }
}
