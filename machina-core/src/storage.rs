//! Raw backing storage for a device instance.
//!
//! A device's persistent fields — both its declared properties and its
//! state-descriptor fields — live at fixed byte offsets inside one zeroed
//! buffer sized to `DeviceKind::instance_size`, reflected over the same way
//! a device-tree property reader walks a node's raw property bytes rather
//! than a typed enum. Variable-width values (`Str` properties,
//! `Pointer`/`ArrayOfPointer` state fields) cannot live inline, so the
//! offset instead stores a `u64` *handle* into a side table of heap-boxed
//! values — a safe-Rust stand-in for a literal embedded pointer.

use crate::error::ReflectError;
use std::any::Any;
use std::sync::RwLock;

/// Zeroed byte buffer plus a handle table for heap-backed slots.
pub struct Storage {
    bytes: RwLock<Vec<u8>>,
    heap: RwLock<Vec<Option<Box<dyn Any + Send + Sync>>>>,
}

impl Storage {
    pub fn zeroed(size: usize) -> Self {
        Storage {
            bytes: RwLock::new(vec![0u8; size]),
            heap: RwLock::new(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.read().unwrap().len()
    }

    /// Reads an unsigned integer of `size` bytes (one of 1, 2, 4, 8) at `offset`.
    pub fn read_uint(&self, offset: usize, size: usize) -> Result<u64, ReflectError> {
        let buf = self.bytes.read().unwrap();
        let slice = slice_at(&buf, offset, size)?;
        Ok(match size {
            1 => slice[0] as u64,
            2 => u16::from_ne_bytes(slice.try_into().unwrap()) as u64,
            4 => u32::from_ne_bytes(slice.try_into().unwrap()) as u64,
            8 => u64::from_ne_bytes(slice.try_into().unwrap()),
            other => return Err(ReflectError::UnsupportedElementSize(other)),
        })
    }

    /// Writes an unsigned integer of `size` bytes (one of 1, 2, 4, 8) at `offset`.
    pub fn write_uint(&self, offset: usize, size: usize, value: u64) -> Result<(), ReflectError> {
        let mut buf = self.bytes.write().unwrap();
        let cap = buf.len();
        if offset + size > cap {
            return Err(ReflectError::OutOfBounds { offset, size, capacity: cap });
        }
        let slot = &mut buf[offset..offset + size];
        match size {
            1 => slot[0] = value as u8,
            2 => slot.copy_from_slice(&(value as u16).to_ne_bytes()),
            4 => slot.copy_from_slice(&(value as u32).to_ne_bytes()),
            8 => slot.copy_from_slice(&value.to_ne_bytes()),
            other => return Err(ReflectError::UnsupportedElementSize(other)),
        }
        Ok(())
    }

    /// Reads a raw byte range at `offset`.
    pub fn read_bytes(&self, offset: usize, size: usize) -> Result<Vec<u8>, ReflectError> {
        let buf = self.bytes.read().unwrap();
        Ok(slice_at(&buf, offset, size)?.to_vec())
    }

    /// Writes a raw byte range at `offset`.
    pub fn write_bytes(&self, offset: usize, data: &[u8]) -> Result<(), ReflectError> {
        let mut buf = self.bytes.write().unwrap();
        let cap = buf.len();
        if offset + data.len() > cap {
            return Err(ReflectError::OutOfBounds { offset, size: data.len(), capacity: cap });
        }
        buf[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Stores a heap-backed value and writes its handle at `offset` (8 bytes).
    pub fn alloc_handle(&self, offset: usize, value: Box<dyn Any + Send + Sync>) -> Result<(), ReflectError> {
        let handle = {
            let mut heap = self.heap.write().unwrap();
            heap.push(Some(value));
            (heap.len() - 1) as u64
        };
        self.write_uint(offset, 8, handle)
    }

    /// Convenience accessor returning a clone of a `String` stored behind a handle at `offset`.
    pub fn read_str_handle(&self, offset: usize) -> Result<String, ReflectError> {
        let handle = self.read_uint(offset, 8)?;
        let heap = self.heap.read().unwrap();
        let slot = heap
            .get(handle as usize)
            .and_then(|slot| slot.as_ref())
            .ok_or(ReflectError::DanglingHandle(handle))?;
        Ok(slot
            .downcast_ref::<String>()
            .cloned()
            .unwrap_or_default())
    }

    /// Convenience accessor returning a clone of the byte buffer stored behind a handle
    /// at `offset`; used by the introspector to walk a `Pointer`/`ArrayOfPointer` field's
    /// pointee without ever forming a real raw pointer.
    pub fn read_buffer_handle(&self, offset: usize) -> Result<Vec<u8>, ReflectError> {
        let handle = self.read_uint(offset, 8)?;
        let heap = self.heap.read().unwrap();
        let slot = heap
            .get(handle as usize)
            .and_then(|slot| slot.as_ref())
            .ok_or(ReflectError::DanglingHandle(handle))?;
        Ok(slot
            .downcast_ref::<Vec<u8>>()
            .cloned()
            .unwrap_or_default())
    }

    /// Frees (tombstones) the heap slot referenced by the handle at `offset`, if any,
    /// and zeroes the slot bytes. Used by property `free` and device teardown.
    pub fn free_handle(&self, offset: usize, size: usize) -> Result<(), ReflectError> {
        let handle = self.read_uint(offset, size)?;
        let mut heap = self.heap.write().unwrap();
        if let Some(slot) = heap.get_mut(handle as usize) {
            *slot = None;
        }
        drop(heap);
        self.write_uint(offset, size, 0)
    }
}

fn slice_at(buf: &[u8], offset: usize, size: usize) -> Result<&[u8], ReflectError> {
    if offset + size > buf.len() {
        return Err(ReflectError::OutOfBounds { offset, size, capacity: buf.len() });
    }
    Ok(&buf[offset..offset + size])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_scalar_widths() {
        let storage = Storage::zeroed(16);
        storage.write_uint(0, 4, 0xDEAD_BEEF).unwrap();
        assert_eq!(storage.read_uint(0, 4).unwrap(), 0xDEAD_BEEF);
        storage.write_uint(8, 8, u64::MAX).unwrap();
        assert_eq!(storage.read_uint(8, 8).unwrap(), u64::MAX);
    }

    #[test]
    fn out_of_bounds_is_rejected() {
        let storage = Storage::zeroed(4);
        assert!(matches!(
            storage.write_uint(2, 4, 1),
            Err(ReflectError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn handle_round_trips_a_string() {
        let storage = Storage::zeroed(16);
        storage
            .alloc_handle(0, Box::new(String::from("virtio-net")))
            .unwrap();
        assert_eq!(storage.read_str_handle(0).unwrap(), "virtio-net");
        storage.free_handle(0, 8).unwrap();
        assert!(storage.read_str_handle(0).is_err());
    }
}
