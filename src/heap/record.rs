//! Record encoding and decoding.
//!
//! A record is laid out per [`TableMeta`]: a null bitmap (bit set = NOT
//! NULL) followed by one fixed-width slot per field at the offsets the
//! catalog assigned. NULL fields leave their slot zeroed. TEXT payloads are
//! appended to the table's arena and the slot stores the arena handle.

use crate::catalog::TableMeta;
use crate::datum::{date_from_i32, date_to_i32, Type, Value};

use super::error::HeapError;

/// Encodes one row of values into record bytes.
///
/// The value types must already match the schema (callers coerce first);
/// TEXT payloads are pushed into `arena` and referenced by handle.
pub fn encode_record(
    values: &[Value],
    meta: &TableMeta,
    arena: &mut Vec<String>,
) -> Result<Vec<u8>, HeapError> {
    if values.len() != meta.fields.len() {
        return Err(HeapError::ArityMismatch {
            expected: meta.fields.len(),
            found: values.len(),
        });
    }

    let mut buf = vec![0u8; meta.record_size];
    for (i, (value, field)) in values.iter().zip(&meta.fields).enumerate() {
        if value.is_null() {
            continue;
        }
        buf[i / 8] |= 1 << (i % 8);

        let slot = &mut buf[field.offset..field.offset + field.len];
        match (field.ty, value) {
            (Type::Int, Value::Int(n)) => slot.copy_from_slice(&n.to_le_bytes()),
            (Type::Float, Value::Float(n)) => slot.copy_from_slice(&n.to_le_bytes()),
            (Type::Date, Value::Date(d)) => slot.copy_from_slice(&date_to_i32(*d).to_le_bytes()),
            (Type::Chars, Value::Chars(s)) => {
                let bytes = s.as_bytes();
                if bytes.len() > field.len {
                    return Err(HeapError::StringTooLong {
                        field: field.name.clone(),
                        capacity: field.len,
                        len: bytes.len(),
                    });
                }
                slot[..bytes.len()].copy_from_slice(bytes);
            }
            (Type::Text, Value::Text(s)) => {
                let handle = arena.len() as u32;
                arena.push(s.clone());
                slot.copy_from_slice(&handle.to_le_bytes());
            }
            _ => {
                return Err(HeapError::FieldTypeMismatch {
                    field: field.name.clone(),
                })
            }
        }
    }
    Ok(buf)
}

/// Decodes record bytes back into one value per field.
pub fn decode_record(
    bytes: &[u8],
    meta: &TableMeta,
    arena: &[String],
) -> Result<Vec<Value>, HeapError> {
    if bytes.len() < meta.record_size {
        return Err(HeapError::RecordTooSmall {
            required: meta.record_size,
            available: bytes.len(),
        });
    }

    let mut values = Vec::with_capacity(meta.fields.len());
    for (i, field) in meta.fields.iter().enumerate() {
        if bytes[i / 8] & (1 << (i % 8)) == 0 {
            values.push(Value::Null);
            continue;
        }

        let slot = &bytes[field.offset..field.offset + field.len];
        let value = match field.ty {
            Type::Int => Value::Int(i32::from_le_bytes([slot[0], slot[1], slot[2], slot[3]])),
            Type::Float => Value::Float(f32::from_le_bytes([slot[0], slot[1], slot[2], slot[3]])),
            Type::Date => {
                let raw = i32::from_le_bytes([slot[0], slot[1], slot[2], slot[3]]);
                Value::Date(date_from_i32(raw).ok_or(HeapError::BadDate { raw })?)
            }
            Type::Chars => {
                let end = slot.iter().position(|&b| b == 0).unwrap_or(slot.len());
                Value::Chars(String::from_utf8_lossy(&slot[..end]).into_owned())
            }
            Type::Text => {
                let handle = u32::from_le_bytes([slot[0], slot[1], slot[2], slot[3]]);
                let text = arena
                    .get(handle as usize)
                    .ok_or(HeapError::BadTextHandle { handle })?;
                Value::Text(text.clone())
            }
        };
        values.push(value);
    }
    Ok(values)
}
