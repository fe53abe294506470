use std::sync::{Arc, OnceLock};
use std::time::Instant;

use record_spool::{RecordDescriptor, Value};
use tracing::{field::Visit, span::Attributes, Metadata};

/// Slot carrying the names of the spans open on the producing thread,
/// outermost first.
pub const SCOPE_SLOT: &str = "scope";

/// Slot carrying field ids, parallel to [`DATA_SLOT`].
pub const ATTR_SLOT: &str = "attr";

/// Slot carrying field values, parallel to [`ATTR_SLOT`].
pub const DATA_SLOT: &str = "data";

/// Field id a span record stores its span name under.
pub const SPAN_NAME_FIELD: &str = "name";

/// Field id a span record stores its open duration under, in nanoseconds.
pub const SPAN_DURATION_FIELD: &str = "time.duration.ns";

/// The shape of every record emitted for a `tracing` event.
///
/// Sinks can tell event records apart from span records by comparing
/// descriptors with `Arc::ptr_eq`.
pub fn event_descriptor() -> &'static Arc<RecordDescriptor> {
    static EVENT: OnceLock<Arc<RecordDescriptor>> = OnceLock::new();
    EVENT.get_or_init(|| {
        Arc::new(RecordDescriptor::new(
            "event",
            [SCOPE_SLOT, ATTR_SLOT, DATA_SLOT],
        ))
    })
}

/// The shape of every record emitted when a span closes.
pub fn span_descriptor() -> &'static Arc<RecordDescriptor> {
    static SPAN: OnceLock<Arc<RecordDescriptor>> = OnceLock::new();
    SPAN.get_or_init(|| {
        Arc::new(RecordDescriptor::new(
            "span",
            [SCOPE_SLOT, ATTR_SLOT, DATA_SLOT],
        ))
    })
}

/// Field capture for spans and events: parallel id and value lists, ready
/// to drop into the attr and data slots of a record.
///
/// Re-recording a field replaces its captured value in place, so a span
/// updated over its lifetime still emits each field once.
#[derive(Debug, Default)]
pub(crate) struct FieldSet {
    pub(crate) names: Vec<Value>,
    pub(crate) values: Vec<Value>,
}

impl FieldSet {
    fn put(&mut self, name: &str, value: Value) {
        let existing = self
            .names
            .iter()
            .position(|id| matches!(id, Value::String(text) if text == name));
        match existing {
            Some(position) => self.values[position] = value,
            None => {
                self.names.push(Value::from(name));
                self.values.push(value);
            }
        }
    }
}

impl<'a> From<&'a tracing::Event<'a>> for FieldSet {
    fn from(event: &'a tracing::Event<'a>) -> Self {
        let mut fields = Self::default();
        event.record(&mut fields);
        fields
    }
}

impl Visit for FieldSet {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.put(field.name(), Value::from(format!("{value:?}")));
    }

    fn record_f64(&mut self, field: &tracing::field::Field, value: f64) {
        self.put(field.name(), Value::F64(value));
    }

    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.put(field.name(), Value::I64(value));
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.put(field.name(), Value::U64(value));
    }

    fn record_i128(&mut self, field: &tracing::field::Field, value: i128) {
        self.put(field.name(), Value::I128(value));
    }

    fn record_u128(&mut self, field: &tracing::field::Field, value: u128) {
        self.put(field.name(), Value::U128(value));
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.put(field.name(), Value::Bool(value));
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.put(field.name(), Value::from(value));
    }

    fn record_error(
        &mut self,
        field: &tracing::field::Field,
        value: &(dyn std::error::Error + 'static),
    ) {
        self.put(field.name(), Value::from(format!("{value:?}")));
    }
}

/// Live state for one open span, held until the span closes and its record
/// is emitted.
pub(crate) struct SpanData {
    pub(crate) ref_count: usize,
    pub(crate) metadata: &'static Metadata<'static>,
    opened: Instant,
    pub(crate) fields: FieldSet,
}

impl SpanData {
    pub(crate) fn new(attributes: &Attributes<'_>) -> Self {
        let mut fields = FieldSet::default();
        attributes.values().record(&mut fields);
        Self {
            ref_count: 1, // new spans are always inserted with 1
            metadata: attributes.metadata(),
            opened: Instant::now(),
            fields,
        }
    }

    /// Folds the span's name and open duration into its field lists and
    /// hands back the finished attr and data slots for a span record.
    pub(crate) fn into_slots(self) -> (Vec<Value>, Vec<Value>) {
        let SpanData {
            metadata,
            opened,
            mut fields,
            ..
        } = self;
        fields.put(SPAN_NAME_FIELD, Value::from(metadata.name()));
        fields.put(
            SPAN_DURATION_FIELD,
            Value::U64(opened.elapsed().as_nanos() as u64),
        );
        (fields.names, fields.values)
    }
}
