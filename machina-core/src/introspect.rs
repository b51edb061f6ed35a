//! The state introspector: walks a declarative state descriptor over
//! a device's raw backing storage and produces a structured field tree,
//! the same shape `device-show` hands to the monitor.

use crate::error::ReflectError;
use crate::storage::Storage;
use bitflags::bitflags;
use serde::Serialize;

bitflags! {
    /// Orthogonal behaviours a field can combine (bitfield-ness is kept as
    /// its own `Option<BitField>` below rather than folded in here, since it
    /// carries data — a name and a mask — not just a switch).
    #[derive(Default)]
    pub struct FieldFlags: u32 {
        /// The slot holds a heap handle to its pointee, dereferenced once.
        const POINTER = 0b0000_0001;
        /// Each array element is itself a handle, dereferenced individually.
        const ARRAY_OF_POINTER = 0b0000_0010;
        /// Recurse into `nested_descriptor` over the same (or pointee) bytes.
        const STRUCT = 0b0000_0100;
        /// Emit a fixed-length raw byte buffer.
        const BUFFER = 0b0000_1000;
        /// Emit a variable-length raw byte buffer (length from `count`).
        const VAR_BUFFER = 0b0001_0000;
        /// Delegate rendering to the kind-supplied queue printer.
        const QUEUE = 0b0010_0000;
    }
}

/// How many elements (or, for buffer flags, how many bytes) a field covers.
#[derive(Debug, Clone, Copy)]
pub enum CountPolicy {
    Scalar,
    FixedArray(usize),
    /// Element/byte count lives in a 4-byte slot at this offset (relative to
    /// the same base as the field itself).
    VarArrayInt32(usize),
    /// Element/byte count lives in a 2-byte slot at this offset.
    VarArrayUint16(usize),
}

/// `{bit_field_name, bit_field_mask}` — replaces the field's on-screen name
/// and masks the raw integer down to `0`/`1`.
#[derive(Debug, Clone, Copy)]
pub struct BitField {
    pub name: &'static str,
    pub mask: u64,
}

/// Renders the elements of a `QUEUE`-flagged field from raw bytes at `offset`.
pub type QueuePrinter = fn(&Storage, usize) -> Vec<StateElem>;
/// Runs once before a descriptor's fields are walked.
pub type PreSaveHook = fn(&Storage);
/// Decides whether a field exists for the descriptor's current `version_id`.
pub type ExistencePredicate = fn(&Storage, u32) -> bool;

pub struct StateField {
    pub name: &'static str,
    pub offset: usize,
    pub element_size: usize,
    pub count: CountPolicy,
    pub flags: FieldFlags,
    pub predicate: Option<ExistencePredicate>,
    pub bitfield: Option<BitField>,
    pub nested: Option<&'static StateDescriptor>,
    pub queue_printer: Option<QueuePrinter>,
    /// Byte offset a pointer field's pointee walk should begin at.
    pub start: Option<u64>,
}

impl StateField {
    pub const fn scalar(name: &'static str, offset: usize, element_size: usize) -> Self {
        StateField {
            name,
            offset,
            element_size,
            count: CountPolicy::Scalar,
            flags: FieldFlags::empty(),
            predicate: None,
            bitfield: None,
            nested: None,
            queue_printer: None,
            start: None,
        }
    }
}

pub struct StateDescriptor {
    pub version_id: u32,
    pub pre_save_hook: Option<PreSaveHook>,
    pub fields: &'static [StateField],
}

#[derive(Debug, Clone, Serialize)]
pub struct StateFieldValue {
    pub name: String,
    pub size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<u64>,
    pub elems: Vec<StateElem>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum StateElem {
    Scalar(u64),
    Bytes(Vec<u8>),
    Nested(Vec<StateFieldValue>),
}

/// Walks `descriptor` over `storage`, returning the structured field tree.
/// `full` disables the 16-byte truncation of buffer fields.
pub fn introspect(
    descriptor: &StateDescriptor,
    storage: &Storage,
    full: bool,
) -> Result<Vec<StateFieldValue>, ReflectError> {
    walk(descriptor, storage, 0, full)
}

fn walk(
    descriptor: &StateDescriptor,
    storage: &Storage,
    base: usize,
    full: bool,
) -> Result<Vec<StateFieldValue>, ReflectError> {
    if let Some(hook) = descriptor.pre_save_hook {
        hook(storage);
    }
    let mut out = Vec::with_capacity(descriptor.fields.len());
    for field in descriptor.fields {
        if let Some(predicate) = field.predicate {
            if !predicate(storage, descriptor.version_id) {
                continue;
            }
        }
        out.push(render_field(field, storage, base, full)?);
    }
    Ok(out)
}

fn render_field(
    field: &StateField,
    storage: &Storage,
    base: usize,
    full: bool,
) -> Result<StateFieldValue, ReflectError> {
    let abs_offset = base + field.offset;
    let display_name = field.bitfield.map(|b| b.name).unwrap_or(field.name).to_string();

    if field.flags.contains(FieldFlags::QUEUE) {
        let printer = field.queue_printer.expect("QUEUE field without queue_printer");
        return Ok(StateFieldValue {
            name: display_name,
            size: field.element_size,
            start: field.start,
            elems: printer(storage, abs_offset),
        });
    }

    if field.flags.intersects(FieldFlags::BUFFER | FieldFlags::VAR_BUFFER) {
        let len = buffer_len(field, storage, base)?;
        let mut bytes = storage.read_bytes(abs_offset, len)?;
        if !full && bytes.len() > 16 {
            bytes.truncate(16);
        }
        return Ok(StateFieldValue {
            name: display_name,
            size: field.element_size,
            start: field.start,
            elems: vec![StateElem::Bytes(bytes)],
        });
    }

    let count = element_count(field, storage, base)?;
    let mut elems = Vec::with_capacity(count);
    for i in 0..count {
        let elem_offset = abs_offset + i * field.element_size;
        elems.push(render_element(field, storage, elem_offset, full)?);
    }
    Ok(StateFieldValue { name: display_name, size: field.element_size, start: field.start, elems })
}

fn render_element(
    field: &StateField,
    storage: &Storage,
    elem_offset: usize,
    full: bool,
) -> Result<StateElem, ReflectError> {
    if field.flags.intersects(FieldFlags::POINTER | FieldFlags::ARRAY_OF_POINTER) {
        let bytes = storage.read_buffer_handle(elem_offset)?;
        let pointee = Storage::zeroed(bytes.len());
        pointee.write_bytes(0, &bytes)?;
        let pointee_base = field.start.unwrap_or(0) as usize;
        return Ok(match field.nested {
            Some(nested) => StateElem::Nested(walk(nested, &pointee, pointee_base, full)?),
            None => StateElem::Scalar(pointee.read_uint(pointee_base, field.element_size)?),
        });
    }

    if field.flags.contains(FieldFlags::STRUCT) {
        let nested = field.nested.expect("STRUCT field without nested_descriptor");
        return Ok(StateElem::Nested(walk(nested, storage, elem_offset, full)?));
    }

    let raw = storage.read_uint(elem_offset, field.element_size)?;
    let value = match field.bitfield {
        Some(bf) => {
            if raw & bf.mask != 0 {
                1
            } else {
                0
            }
        }
        None => raw,
    };
    Ok(StateElem::Scalar(value))
}

fn element_count(field: &StateField, storage: &Storage, base: usize) -> Result<usize, ReflectError> {
    Ok(match field.count {
        CountPolicy::Scalar => 1,
        CountPolicy::FixedArray(n) => n,
        CountPolicy::VarArrayInt32(offset) => storage.read_uint(base + offset, 4)? as usize,
        CountPolicy::VarArrayUint16(offset) => storage.read_uint(base + offset, 2)? as usize,
    })
}

fn buffer_len(field: &StateField, storage: &Storage, base: usize) -> Result<usize, ReflectError> {
    Ok(match field.count {
        CountPolicy::Scalar => field.element_size,
        CountPolicy::FixedArray(n) => n,
        CountPolicy::VarArrayInt32(offset) => storage.read_uint(base + offset, 4)? as usize,
        CountPolicy::VarArrayUint16(offset) => storage.read_uint(base + offset, 2)? as usize,
    })
}
