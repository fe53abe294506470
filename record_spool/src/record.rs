use std::fmt;

/// A single tagged scalar carried by a record slot.
///
/// Rendering through [`fmt::Display`] is the stable text form used by
/// encoders. It is pure and allocates nothing.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    F64(f64),
    I64(i64),
    U64(u64),
    I128(i128),
    U128(u128),
    Bool(bool),
}

impl Value {
    /// The unsigned reading of this value, if it has one.
    ///
    /// Count entries in a flattened buffer are stored as `U64`; decoding
    /// reads them back through here.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::U64(value) => Some(*value),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(value) => value.fmt(f),
            Value::F64(value) => value.fmt(f),
            Value::I64(value) => value.fmt(f),
            Value::U64(value) => value.fmt(f),
            Value::I128(value) => value.fmt(f),
            Value::U128(value) => value.fmt(f),
            Value::Bool(value) => value.fmt(f),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::F64(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::I64(value)
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Value::U64(value)
    }
}

impl From<i128> for Value {
    fn from(value: i128) -> Self {
        Value::I128(value)
    }
}

impl From<u128> for Value {
    fn from(value: u128) -> Self {
        Value::U128(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

/// Shape metadata for one kind of record: its name and the ordered ids of
/// its slots.
///
/// Producers build one descriptor per record shape up front and share it by
/// `Arc` across every record of that shape, so appending a record never
/// copies the shape strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordDescriptor {
    name: String,
    slot_ids: Vec<String>,
}

impl RecordDescriptor {
    pub fn new(
        name: impl Into<String>,
        slot_ids: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            name: name.into(),
            slot_ids: slot_ids.into_iter().map(Into::into).collect(),
        }
    }

    /// The record kind name. Written first on every encoded line.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of slots a record of this shape carries.
    pub fn slot_count(&self) -> usize {
        self.slot_ids.len()
    }

    /// Slot ids, in slot order.
    pub fn slot_ids(&self) -> &[String] {
        &self.slot_ids
    }
}
