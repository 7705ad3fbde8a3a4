use std::cmp::Ordering;
use std::fmt::Write;

use crate::StorageError;

/// Attribute type tag. VarChar carries its declared maximum length in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrType {
    Int,
    Real,
    VarChar(u32),
}

#[derive(Debug, Clone)]
pub struct Attribute {
    pub name: String,
    pub attr_type: AttrType,
}

impl Attribute {
    pub fn new(name: &str, attr_type: AttrType) -> Self {
        Self {
            name: name.to_string(),
            attr_type,
        }
    }
}

/// A typed field value. The wire format stores Int and Real as 4 LE bytes and
/// VarChar as a 4-byte LE length prefix followed by the raw bytes.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i32),
    Real(f32),
    VarChar(String),
}

impl Value {
    pub fn wire_bytes(&self) -> Vec<u8> {
        match self {
            Value::Int(n) => n.to_le_bytes().to_vec(),
            Value::Real(r) => r.to_le_bytes().to_vec(),
            Value::VarChar(s) => {
                let mut out = Vec::with_capacity(4 + s.len());
                out.extend_from_slice(&(s.len() as u32).to_le_bytes());
                out.extend_from_slice(s.as_bytes());
                out
            }
        }
    }

    /// Decode one field value of the given type from its wire bytes.
    pub fn from_wire(attr_type: AttrType, bytes: &[u8]) -> Result<Self, StorageError> {
        match attr_type {
            AttrType::Int => {
                let raw: [u8; 4] = bytes.try_into().map_err(|_| StorageError::MalformedRecord)?;
                Ok(Value::Int(i32::from_le_bytes(raw)))
            }
            AttrType::Real => {
                let raw: [u8; 4] = bytes.try_into().map_err(|_| StorageError::MalformedRecord)?;
                Ok(Value::Real(f32::from_le_bytes(raw)))
            }
            AttrType::VarChar(_) => {
                if bytes.len() < 4 {
                    return Err(StorageError::MalformedRecord);
                }
                let len = u32::from_le_bytes(bytes[0..4].try_into().unwrap()) as usize;
                if bytes.len() != 4 + len {
                    return Err(StorageError::MalformedRecord);
                }
                Ok(Value::VarChar(
                    String::from_utf8_lossy(&bytes[4..]).into_owned(),
                ))
            }
        }
    }

    /// Ordering used by scan predicates: native numeric semantics for Int and
    /// Real, lexicographic byte comparison for VarChar. `None` for mismatched
    /// types or NaN.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Real(a), Value::Real(b)) => a.partial_cmp(b),
            (Value::VarChar(a), Value::VarChar(b)) => Some(a.as_bytes().cmp(b.as_bytes())),
            _ => None,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{n}"),
            Value::Real(r) => write!(f, "{r}"),
            Value::VarChar(s) => write!(f, "{s}"),
        }
    }
}

/// Number of leading null-bitmap bytes for `num_fields` fields.
pub fn null_bitmap_len(num_fields: usize) -> usize {
    (num_fields + 7) / 8
}

/// Decode the leading null bitmap. Bit `i`, MSB-first within its byte, set
/// means field `i` is null and contributes no value bytes.
pub fn decode_null_bitmap(data: &[u8], num_fields: usize) -> Result<Vec<bool>, StorageError> {
    let bitmap_len = null_bitmap_len(num_fields);
    if data.len() < bitmap_len {
        return Err(StorageError::MalformedRecord);
    }
    Ok((0..num_fields)
        .map(|i| data[i / 8] & (1 << (7 - i % 8)) != 0)
        .collect())
}

pub fn encode_null_bitmap(nulls: &[bool]) -> Vec<u8> {
    let mut bitmap = vec![0u8; null_bitmap_len(nulls.len())];
    for (i, &is_null) in nulls.iter().enumerate() {
        if is_null {
            bitmap[i / 8] |= 1 << (7 - i % 8);
        }
    }
    bitmap
}

/// Build the wire-format record for one row: null bitmap, then the
/// concatenated non-null field values. `None` marks a null field.
pub fn encode(fields: &[Attribute], values: &[Option<Value>]) -> Result<Vec<u8>, StorageError> {
    if fields.len() != values.len() {
        return Err(StorageError::MalformedRecord);
    }
    let nulls: Vec<bool> = values.iter().map(|v| v.is_none()).collect();
    let mut out = encode_null_bitmap(&nulls);
    for value in values.iter().flatten() {
        out.extend_from_slice(&value.wire_bytes());
    }
    Ok(out)
}

/// On-wire size of the value of one non-null field starting at `pos`.
fn field_wire_len(
    attr_type: AttrType,
    data: &[u8],
    pos: usize,
) -> Result<usize, StorageError> {
    let fixed = match attr_type {
        AttrType::Int | AttrType::Real => return Ok(4),
        AttrType::VarChar(_) => 4,
    };
    if pos + fixed > data.len() {
        return Err(StorageError::MalformedRecord);
    }
    let len = u32::from_le_bytes(data[pos..pos + 4].try_into().unwrap()) as usize;
    Ok(fixed + len)
}

/// Total wire length of a record without fully decoding it. Also validates
/// that every field the bitmap declares non-null is actually present.
pub fn record_size(fields: &[Attribute], data: &[u8]) -> Result<usize, StorageError> {
    let nulls = decode_null_bitmap(data, fields.len())?;
    let mut pos = null_bitmap_len(fields.len());
    for (field, &is_null) in fields.iter().zip(&nulls) {
        if is_null {
            continue;
        }
        pos += field_wire_len(field.attr_type, data, pos)?;
        if pos > data.len() {
            return Err(StorageError::MalformedRecord);
        }
    }
    Ok(pos)
}

/// Locate one field by name, skipping earlier fields by their on-wire size.
/// Returns `(is_null, value_bytes)`; the bytes are empty for a null field.
pub fn read_field(
    fields: &[Attribute],
    name: &str,
    data: &[u8],
) -> Result<(bool, Vec<u8>), StorageError> {
    let nulls = decode_null_bitmap(data, fields.len())?;
    let mut pos = null_bitmap_len(fields.len());
    for (field, &is_null) in fields.iter().zip(&nulls) {
        let len = if is_null {
            0
        } else {
            let len = field_wire_len(field.attr_type, data, pos)?;
            if pos + len > data.len() {
                return Err(StorageError::MalformedRecord);
            }
            len
        };
        if field.name == name {
            return Ok((is_null, data[pos..pos + len].to_vec()));
        }
        pos += len;
    }
    Err(StorageError::AttributeNotFound(name.to_string()))
}

/// Produce a new wire-format record holding only the named attributes, in the
/// order given, with a bitmap sized to the projection.
pub fn project(
    fields: &[Attribute],
    attribute_names: &[String],
    data: &[u8],
) -> Result<Vec<u8>, StorageError> {
    let mut nulls = Vec::with_capacity(attribute_names.len());
    let mut values = Vec::new();
    for name in attribute_names {
        let (is_null, bytes) = read_field(fields, name, data)?;
        nulls.push(is_null);
        values.extend_from_slice(&bytes);
    }
    let mut out = encode_null_bitmap(&nulls);
    out.extend_from_slice(&values);
    Ok(out)
}

/// Full decode, the inverse of `encode`.
pub fn decode(fields: &[Attribute], data: &[u8]) -> Result<Vec<Option<Value>>, StorageError> {
    let nulls = decode_null_bitmap(data, fields.len())?;
    let mut pos = null_bitmap_len(fields.len());
    let mut values = Vec::with_capacity(fields.len());
    for (field, &is_null) in fields.iter().zip(&nulls) {
        if is_null {
            values.push(None);
            continue;
        }
        let len = field_wire_len(field.attr_type, data, pos)?;
        if pos + len > data.len() {
            return Err(StorageError::MalformedRecord);
        }
        values.push(Some(Value::from_wire(field.attr_type, &data[pos..pos + len])?));
        pos += len;
    }
    Ok(values)
}

/// Debug formatter: `name: value, name: value` with `NULL` for null fields.
/// Human inspection only; there is no parser for this text.
pub fn print_record(fields: &[Attribute], data: &[u8]) -> Result<String, StorageError> {
    let values = decode(fields, data)?;
    let mut out = String::new();
    for (i, (field, value)) in fields.iter().zip(&values).enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        match value {
            Some(v) => write!(out, "{}: {}", field.name, v).unwrap(),
            None => write!(out, "{}: NULL", field.name).unwrap(),
        }
    }
    Ok(out)
}
