//! The property system: a declarative schema of named, typed,
//! defaultable slots within a device's backing storage.

pub mod kind;
pub mod value;

pub use kind::PropertyKind;
pub use value::{OnOffAuto, PropertyValue};

use crate::error::PropertyError;
use crate::storage::Storage;

/// One entry of a kind's (or bus-kind's) property schema.
#[derive(Debug, Clone)]
pub struct PropertyDescriptor {
    pub name: &'static str,
    pub kind: PropertyKind,
    /// Byte offset into the device's backing storage.
    pub offset: usize,
    pub default: Option<PropertyValue>,
}

impl PropertyDescriptor {
    pub const fn new(name: &'static str, kind: PropertyKind, offset: usize) -> Self {
        PropertyDescriptor { name, kind, offset, default: None }
    }

    pub const fn with_default(mut self, default: PropertyValue) -> Self {
        self.default = Some(default);
        self
    }

    /// Writes `value` into `storage` at this property's offset.
    pub fn write(&self, storage: &Storage, value: &PropertyValue) -> Result<(), PropertyError> {
        match value {
            PropertyValue::Bool(v) => storage.write_uint(self.offset, 1, *v as u64),
            PropertyValue::Uint8(v) => storage.write_uint(self.offset, 1, *v as u64),
            PropertyValue::Uint16(v) => storage.write_uint(self.offset, 2, *v as u64),
            PropertyValue::Uint32(v) => storage.write_uint(self.offset, 4, *v as u64),
            PropertyValue::Uint64(v) => storage.write_uint(self.offset, 8, *v),
            PropertyValue::Int32(v) => storage.write_uint(self.offset, 4, *v as u32 as u64),
            PropertyValue::Int64(v) => storage.write_uint(self.offset, 8, *v as u64),
            PropertyValue::Size(v) => storage.write_uint(self.offset, 8, *v),
            PropertyValue::MacAddr(mac) => storage.write_bytes(self.offset, mac),
            PropertyValue::OnOffAuto(v) => storage.write_uint(self.offset, 1, *v as u64),
            PropertyValue::Str(s) => {
                return storage
                    .alloc_handle(self.offset, Box::new(s.clone()))
                    .map_err(|_| self.bad_width());
            }
        }
        .map_err(|_| self.bad_width())
    }

    /// Reads the current value back out of `storage`.
    pub fn read(&self, storage: &Storage) -> Result<PropertyValue, PropertyError> {
        let bad = || self.bad_width();
        Ok(match self.kind {
            PropertyKind::Bool => PropertyValue::Bool(storage.read_uint(self.offset, 1).map_err(|_| bad())? != 0),
            PropertyKind::Uint8 => PropertyValue::Uint8(storage.read_uint(self.offset, 1).map_err(|_| bad())? as u8),
            PropertyKind::Uint16 => {
                PropertyValue::Uint16(storage.read_uint(self.offset, 2).map_err(|_| bad())? as u16)
            }
            PropertyKind::Uint32 => {
                PropertyValue::Uint32(storage.read_uint(self.offset, 4).map_err(|_| bad())? as u32)
            }
            PropertyKind::Uint64 => PropertyValue::Uint64(storage.read_uint(self.offset, 8).map_err(|_| bad())?),
            PropertyKind::Int32 => {
                PropertyValue::Int32(storage.read_uint(self.offset, 4).map_err(|_| bad())? as u32 as i32)
            }
            PropertyKind::Int64 => {
                PropertyValue::Int64(storage.read_uint(self.offset, 8).map_err(|_| bad())? as i64)
            }
            PropertyKind::Size => PropertyValue::Size(storage.read_uint(self.offset, 8).map_err(|_| bad())?),
            PropertyKind::MacAddr => {
                let bytes = storage.read_bytes(self.offset, 6).map_err(|_| bad())?;
                let mut mac = [0u8; 6];
                mac.copy_from_slice(&bytes);
                PropertyValue::MacAddr(mac)
            }
            PropertyKind::OnOffAuto => {
                let raw = storage.read_uint(self.offset, 1).map_err(|_| bad())?;
                PropertyValue::OnOffAuto(match raw {
                    0 => OnOffAuto::Off,
                    1 => OnOffAuto::On,
                    _ => OnOffAuto::Auto,
                })
            }
            PropertyKind::Str => PropertyValue::Str(storage.read_str_handle(self.offset).unwrap_or_default()),
            PropertyKind::LegacyReadOnly => {
                return Err(PropertyError::ParseRejected {
                    property: self.name.to_string(),
                    value: String::new(),
                })
            }
        })
    }

    /// Parses `text` and writes the result into `storage`.
    pub fn parse_and_write(&self, storage: &Storage, text: &str) -> Result<(), PropertyError> {
        let value = self.kind.parse(self.name, text)?;
        self.write(storage, &value)
    }

    /// Renders the current stored value, or `None` for a legacy (unprintable) kind.
    pub fn print(&self, storage: &Storage) -> Option<String> {
        let value = self.read(storage).ok()?;
        self.kind.print(&value)
    }

    /// Releases any heap-backed slot this property owns.
    pub fn free(&self, storage: &Storage) {
        if matches!(self.kind, PropertyKind::Str) {
            let _ = storage.free_handle(self.offset, 8);
        }
    }

    fn bad_width(&self) -> PropertyError {
        PropertyError::BadSlotWidth {
            property: self.name.to_string(),
            expected: self.kind.element_size(),
            found: self.kind.element_size(),
        }
    }
}

/// Applies every property's default value to `storage`, in schema order —
/// run before bus-kind defaults, which run before global defaults.
pub fn apply_defaults(schema: &[PropertyDescriptor], storage: &Storage) {
    for prop in schema {
        if let Some(default) = &prop.default {
            let _ = prop.write(storage, default);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_then_user_override_round_trips() {
        let schema = [PropertyDescriptor::new("rate", PropertyKind::Uint32, 0)
            .with_default(PropertyValue::Uint32(1000))];
        let storage = Storage::zeroed(8);
        apply_defaults(&schema, &storage);
        assert_eq!(schema[0].print(&storage).unwrap(), "1000");
        schema[0].parse_and_write(&storage, "500").unwrap();
        assert_eq!(schema[0].print(&storage).unwrap(), "500");
    }

    #[test]
    fn str_property_frees_its_heap_slot() {
        let prop = PropertyDescriptor::new("chardev", PropertyKind::Str, 0);
        let storage = Storage::zeroed(8);
        prop.parse_and_write(&storage, "serial0").unwrap();
        assert_eq!(prop.print(&storage).unwrap(), "serial0");
        prop.free(&storage);
        assert_eq!(prop.print(&storage).unwrap_or_default(), "");
    }
}
