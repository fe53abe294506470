use std::sync::Arc;

use thiserror::Error;

use crate::record::{RecordDescriptor, Value};

/// In-memory store for pending records: a queue of descriptors plus one
/// flattened buffer of [`Value`]s holding every pending record's per-slot
/// counts and values.
///
/// Layout, per record in arrival order: one `U64` count entry per slot,
/// immediately followed by each slot's values concatenated in slot order.
/// [`decode_records`] walks the layout back out.
pub struct RecordBuffer {
    descriptors: Vec<Arc<RecordDescriptor>>,
    data: Vec<Value>,
    can_grow: bool,
    record_capacity: usize,
    data_capacity: usize,
}

impl RecordBuffer {
    /// A buffer sized for `record_capacity` pending records and
    /// `data_capacity` flattened values. Both are reserved up front so the
    /// append path does not allocate until a bound is passed.
    pub fn new(can_grow: bool, record_capacity: usize, data_capacity: usize) -> Self {
        Self {
            descriptors: Vec::with_capacity(record_capacity),
            data: Vec::with_capacity(data_capacity),
            can_grow,
            record_capacity,
            data_capacity,
        }
    }

    /// Number of pending records.
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Number of flattened values pending, count entries included.
    pub fn data_len(&self) -> usize {
        self.data.len()
    }

    /// Appends one record if the sizing policy admits it.
    ///
    /// A record is admitted when the buffer may grow, or when both the
    /// record queue and the flattened buffer stay strictly below their
    /// capacities after the append. The strict comparison keeps one slot of
    /// headroom: with `record_capacity = n`, at most `n - 1` records are
    /// ever pending.
    ///
    /// `slots` must hold exactly [`RecordDescriptor::slot_count`] slices.
    /// Returns `false` without touching the buffer when the record is
    /// refused; the caller is expected to flush and then write the refused
    /// record through directly.
    pub fn try_append(&mut self, descriptor: &Arc<RecordDescriptor>, slots: &[&[Value]]) -> bool {
        let slot_count = descriptor.slot_count();
        debug_assert_eq!(slot_count, slots.len());
        // The descriptor is authoritative for slot count, so a mismatched
        // call cannot desync counts from values.
        let slot = |n: usize| slots.get(n).copied().unwrap_or(&[]);

        let total = slot_count + (0..slot_count).map(|n| slot(n).len()).sum::<usize>();
        let fits = self.descriptors.len() + 1 < self.record_capacity
            && self.data.len() + total < self.data_capacity;
        if !(self.can_grow || fits) {
            return false;
        }

        for n in 0..slot_count {
            self.data.push(Value::U64(slot(n).len() as u64));
        }
        for n in 0..slot_count {
            self.data.extend(slot(n).iter().cloned());
        }
        self.descriptors.push(Arc::clone(descriptor));
        true
    }

    /// Drops every pending record. Reserved capacity is kept for reuse.
    pub fn clear(&mut self) {
        self.descriptors.clear();
        self.data.clear();
    }

    /// The pending descriptor queue, in arrival order.
    pub fn descriptors(&self) -> &[Arc<RecordDescriptor>] {
        &self.descriptors
    }

    /// The flattened count-then-values buffer.
    pub fn data(&self) -> &[Value] {
        &self.data
    }

    /// Decodes every pending record, in arrival order.
    pub fn records(&self) -> DecodeRecords<'_> {
        decode_records(&self.descriptors, &self.data)
    }
}

/// One record read back out of a flattened buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedRecord<'a> {
    pub descriptor: &'a Arc<RecordDescriptor>,
    /// Per-slot value slices, in slot order. Count entries have already
    /// been consumed; `slots[n].len()` is the count that was stored.
    pub slots: Vec<&'a [Value]>,
}

/// Failure to decode a flattened buffer.
///
/// A buffer filled through [`RecordBuffer::try_append`] always decodes.
/// These arise only from hand-built or mangled input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("record {record}: buffer ends mid-record")]
    Truncated { record: usize },
    #[error("record {record}, slot {slot}: expected a count entry, found {found}")]
    BadCount {
        record: usize,
        slot: usize,
        found: String,
    },
    #[error("{remaining} values trail the last record")]
    TrailingData { remaining: usize },
}

/// Walks a descriptor queue and its flattened value buffer back into
/// per-record slot slices, in arrival order.
///
/// Decoding is pure: the iterator borrows its input and allocates only the
/// per-record slot vector. Record `i` consumes exactly its `slot_count`
/// count entries plus the values they announce; values left over after the
/// last descriptor are reported as [`DecodeError::TrailingData`]. The
/// iterator stops after the first error.
pub fn decode_records<'a>(
    descriptors: &'a [Arc<RecordDescriptor>],
    data: &'a [Value],
) -> DecodeRecords<'a> {
    DecodeRecords {
        descriptors: descriptors.iter().enumerate(),
        data,
        position: 0,
        done: false,
    }
}

pub struct DecodeRecords<'a> {
    descriptors: std::iter::Enumerate<std::slice::Iter<'a, Arc<RecordDescriptor>>>,
    data: &'a [Value],
    position: usize,
    done: bool,
}

impl<'a> DecodeRecords<'a> {
    fn fail(&mut self, error: DecodeError) -> Option<Result<DecodedRecord<'a>, DecodeError>> {
        self.done = true;
        Some(Err(error))
    }
}

impl<'a> Iterator for DecodeRecords<'a> {
    type Item = Result<DecodedRecord<'a>, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let (record, descriptor) = match self.descriptors.next() {
            Some(next) => next,
            None => {
                self.done = true;
                let remaining = self.data.len() - self.position;
                if remaining != 0 {
                    return Some(Err(DecodeError::TrailingData { remaining }));
                }
                return None;
            }
        };

        let slot_count = descriptor.slot_count();
        let counts_end = match self.position.checked_add(slot_count) {
            Some(end) if end <= self.data.len() => end,
            _ => return self.fail(DecodeError::Truncated { record }),
        };

        let mut slots = Vec::with_capacity(slot_count);
        let mut value_position = counts_end;
        for (slot, entry) in self.data[self.position..counts_end].iter().enumerate() {
            let count = match entry.as_u64().and_then(|count| usize::try_from(count).ok()) {
                Some(count) => count,
                None => {
                    return self.fail(DecodeError::BadCount {
                        record,
                        slot,
                        found: format!("{entry:?}"),
                    })
                }
            };
            let end = match value_position.checked_add(count) {
                Some(end) if end <= self.data.len() => end,
                _ => return self.fail(DecodeError::Truncated { record }),
            };
            slots.push(&self.data[value_position..end]);
            value_position = end;
        }
        self.position = value_position;
        Some(Ok(DecodedRecord { descriptor, slots }))
    }
}
