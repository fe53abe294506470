use std::{
    collections::HashMap,
    sync::{atomic::AtomicU64, Mutex, MutexGuard, PoisonError},
};

use record_spool::{RecordSink, Value};
use thread_local::ThreadLocal;
use tracing::{metadata::LevelFilter, span, Level, Subscriber};

use crate::span_record::{event_descriptor, span_descriptor, FieldSet, SpanData};

/// A [`Subscriber`] that spools spans and events into a [`RecordSink`].
///
/// Every event emits one `event` record as it happens. Every span emits one
/// `span` record when it closes, with its name and open duration folded
/// into the field lists. Both carry the producing thread's open-span names
/// as their scope slot, so a flat record stream still reads as a tree.
///
/// The sink is never called while subscriber state is locked, and the
/// subscriber never emits records of its own.
pub struct SpoolSubscriber<Sink: RecordSink> {
    id_counter: AtomicU64,
    current_spans: Mutex<HashMap<span::Id, SpanData>>,
    level: Option<Level>,
    active_span_stack: ThreadLocal<Mutex<Vec<span::Id>>>,
    record_sink: Sink,
}

impl<Sink: RecordSink> SpoolSubscriber<Sink> {
    pub fn new(level: LevelFilter, sink: Sink) -> Self {
        Self {
            id_counter: Default::default(),
            current_spans: Default::default(),
            level: level.into_level(),
            active_span_stack: ThreadLocal::new(),
            record_sink: sink,
        }
    }

    /// The measurement session is over; drains the sink durably.
    ///
    /// Dropping the subscriber finishes too, which suits scoped
    /// `set_default` usage. A subscriber installed process-wide never
    /// drops, so call this before exit instead.
    pub fn finish(&self) {
        self.record_sink.finish();
    }

    fn lock_spans(&self) -> MutexGuard<'_, HashMap<span::Id, SpanData>> {
        // An instrumented thread that panicked mid-call must not wedge
        // tracing for every other thread.
        self.current_spans
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn use_span<T>(&self, id: &span::Id, use_it: impl FnOnce(&mut SpanData) -> T) -> Option<T> {
        self.lock_spans().get_mut(id).map(use_it)
    }

    fn possibly_remove_span(
        &self,
        id: &span::Id,
        use_it: impl FnOnce(&mut SpanData) -> bool,
    ) -> Option<SpanData> {
        let mut spans = self.lock_spans();
        match spans.get_mut(id).map(use_it) {
            Some(remove_it) => {
                if remove_it {
                    spans.remove(id)
                } else {
                    None
                }
            }
            None => None,
        }
    }

    /// Resolves the calling thread's open spans to names, outermost first.
    fn scope(&self) -> Vec<Value> {
        let spans = self.lock_spans();
        let stack = self
            .active_span_stack
            .get_or_default()
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        stack
            .iter()
            .filter_map(|id| spans.get(id))
            .map(|span| Value::from(span.metadata.name()))
            .collect()
    }
}

impl<Sink: RecordSink + 'static> Subscriber for SpoolSubscriber<Sink> {
    fn enabled(&self, metadata: &tracing::Metadata<'_>) -> bool {
        match &self.level {
            Some(level) => metadata.level() <= level,
            None => false,
        }
    }

    fn new_span(&self, attributes: &span::Attributes<'_>) -> span::Id {
        let mut id = self
            .id_counter
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        // tracing ids are not allowed to be 0, so skip it when the counter
        // wraps.
        while id == 0 {
            id = self
                .id_counter
                .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        }
        log::debug!("new span: {id} - {attributes:?}");

        let id = span::Id::from_u64(id);
        self.lock_spans()
            .insert(id.clone(), SpanData::new(attributes));
        id
    }

    fn record(&self, span: &span::Id, values: &span::Record<'_>) {
        self.use_span(span, |span| values.record(&mut span.fields));
    }

    fn record_follows_from(&self, _span: &span::Id, _follows: &span::Id) {}

    fn event(&self, event: &tracing::Event<'_>) {
        let scope = self.scope();
        let fields = FieldSet::from(event);
        self.record_sink
            .write_record(event_descriptor(), &[&scope, &fields.names, &fields.values]);
    }

    fn enter(&self, span: &span::Id) {
        let mut active_span_stack = self
            .active_span_stack
            .get_or_default()
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        log::trace!(
            "entering span. Current: {:?}, entering: {:?}",
            *active_span_stack,
            span
        );
        active_span_stack.push(span.clone());
    }

    fn exit(&self, span: &span::Id) {
        let mut active_span_stack = self
            .active_span_stack
            .get_or_default()
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if active_span_stack.last() == Some(span) {
            active_span_stack.pop();
        } else {
            log::trace!(
                "tried to exit non-active span. Current: {:?}, attempted: {:?}",
                *active_span_stack,
                span
            );
        }
    }

    fn current_span(&self) -> tracing_core::span::Current {
        let current = self
            .active_span_stack
            .get_or_default()
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned();

        match current {
            Some(span) => match self.use_span(&span, |data| data.metadata) {
                Some(metadata) => tracing_core::span::Current::new(span, metadata),
                None => tracing_core::span::Current::none(),
            },
            None => tracing_core::span::Current::none(),
        }
    }

    fn clone_span(&self, id: &span::Id) -> span::Id {
        self.use_span(id, |span| span.ref_count += 1);
        id.clone()
    }

    fn try_close(&self, id: span::Id) -> bool {
        let closed_span = self.possibly_remove_span(&id, |span| {
            span.ref_count = span.ref_count.saturating_sub(1);
            span.ref_count == 0
        });
        match closed_span {
            Some(closed_span) => {
                log::trace!("closing span: {:?}", closed_span.metadata.name());
                let scope = self.scope();
                let (names, values) = closed_span.into_slots();
                self.record_sink
                    .write_record(span_descriptor(), &[&scope, &names, &values]);
                true
            }
            None => false,
        }
    }
}

impl<Sink: RecordSink> Drop for SpoolSubscriber<Sink> {
    fn drop(&mut self) {
        self.record_sink.finish();
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use record_spool::{RecordDescriptor, RecordSink, Value};
    use tracing::Instrument;
    use tracing_core::dispatcher::DefaultGuard;

    use crate::span_record::{span_descriptor, SPAN_DURATION_FIELD, SPAN_NAME_FIELD};
    use crate::{event_descriptor, SpoolSubscriber};

    type Record = (Arc<RecordDescriptor>, Vec<Vec<Value>>);

    #[derive(Clone, Default)]
    struct TestSink {
        records: Arc<Mutex<Vec<Record>>>,
        finishes: Arc<AtomicUsize>,
    }

    impl RecordSink for TestSink {
        fn write_record(&self, descriptor: &Arc<RecordDescriptor>, slots: &[&[Value]]) {
            let slots = slots.iter().map(|slot| slot.to_vec()).collect();
            self.records
                .lock()
                .expect("local lock should work")
                .push((Arc::clone(descriptor), slots));
        }

        fn finish(&self) {
            self.finishes.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn set_up_tracing() -> (DefaultGuard, TestSink) {
        static INITIALIZE_LOGGER_ONCE: std::sync::Once = std::sync::Once::new();
        INITIALIZE_LOGGER_ONCE.call_once(|| {
            env_logger::builder().is_test(true).init();
        });
        let level = "debug".parse().expect("debug is a level filter");
        let sink = TestSink::default();
        let subscriber = SpoolSubscriber::new(level, sink.clone());
        (tracing::subscriber::set_default(subscriber), sink)
    }

    fn span_record<'a>(records: &'a [Record], name: &str) -> &'a Record {
        records
            .iter()
            .filter(|(descriptor, _)| Arc::ptr_eq(descriptor, span_descriptor()))
            .find(|(_, slots)| {
                slots[1]
                    .iter()
                    .zip(&slots[2])
                    .any(|(attr, data)| {
                        attr == &Value::from(SPAN_NAME_FIELD) && data == &Value::from(name)
                    })
            })
            .expect("there is a span record with that name")
    }

    fn field<'a>(slots: &'a [Vec<Value>], name: &str) -> &'a Value {
        let position = slots[1]
            .iter()
            .position(|id| id == &Value::from(name))
            .expect("the field was captured");
        &slots[2][position]
    }

    #[tokio::test]
    async fn contextual_spans() {
        let (_guard, sink) = set_up_tracing();

        {
            let outer = tracing::info_span!("a root");
            let _guard = outer.enter();

            let inner = tracing::info_span!("a subspan");
            let _g2 = inner.enter();
        }

        let records = sink.records.lock().expect("local mutex").clone();
        assert_eq!(2, records.len());

        let (_, inner_slots) = span_record(&records, "a subspan");
        assert_eq!(vec![Value::from("a root")], inner_slots[0]);

        let (_, outer_slots) = span_record(&records, "a root");
        assert!(outer_slots[0].is_empty());
    }

    #[tokio::test]
    async fn async_contextual_spans() {
        let (_guard, sink) = set_up_tracing();

        async {
            async {}.instrument(tracing::info_span!("a subspan")).await;
        }
        .instrument(tracing::info_span!("a root"))
        .await;

        let records = sink.records.lock().expect("local mutex").clone();
        assert_eq!(2, records.len());

        let (_, inner_slots) = span_record(&records, "a subspan");
        assert_eq!(vec![Value::from("a root")], inner_slots[0]);
    }

    #[tokio::test]
    async fn async_contextual_spans_sync_within_async() {
        let (_guard, sink) = set_up_tracing();

        async {
            {
                let inner_0 = tracing::info_span!("a synchronous subspan");
                let _inner_0_guard = inner_0.enter();
            }
            async {}.instrument(tracing::info_span!("a subspan")).await;
        }
        .instrument(tracing::info_span!("a root"))
        .await;

        let records = sink.records.lock().expect("local mutex").clone();
        assert_eq!(3, records.len());

        for name in ["a synchronous subspan", "a subspan"] {
            let (_, slots) = span_record(&records, name);
            assert_eq!(vec![Value::from("a root")], slots[0]);
        }
        let (_, root_slots) = span_record(&records, "a root");
        assert!(root_slots[0].is_empty());
    }

    #[tokio::test]
    async fn events_carry_scope_and_fields() {
        let (_guard, sink) = set_up_tracing();

        {
            let outer = tracing::info_span!("a root");
            let _guard = outer.enter();

            let inner = tracing::info_span!("a subspan");
            let _g2 = inner.enter();

            tracing::info!(code = 7, "boom");
        }

        let records = sink.records.lock().expect("local mutex").clone();
        let (descriptor, slots) = records
            .iter()
            .find(|(descriptor, _)| Arc::ptr_eq(descriptor, event_descriptor()))
            .expect("there is an event record");

        assert_eq!("event", descriptor.name());
        assert_eq!(
            vec![Value::from("a root"), Value::from("a subspan")],
            slots[0]
        );
        assert_eq!(&Value::from(7_i64), field(slots, "code"));
        assert_eq!(&Value::from("boom"), field(slots, "message"));
    }

    #[tokio::test]
    async fn span_records_carry_name_and_duration() {
        let (_guard, sink) = set_up_tracing();

        {
            let span = tracing::info_span!("timed", laps = 3_i64);
            let _guard = span.enter();
        }

        let records = sink.records.lock().expect("local mutex").clone();
        let (_, slots) = span_record(&records, "timed");

        assert_eq!(&Value::from(3_i64), field(slots, "laps"));
        assert!(matches!(
            field(slots, SPAN_DURATION_FIELD),
            Value::U64(_)
        ));
    }

    #[tokio::test]
    async fn recording_replaces_a_span_field() {
        let (_guard, sink) = set_up_tracing();

        {
            let span = tracing::info_span!("updated", state = "initial");
            let _guard = span.enter();
            span.record("state", "done");
        }

        let records = sink.records.lock().expect("local mutex").clone();
        let (_, slots) = span_record(&records, "updated");

        let state_fields = slots[1]
            .iter()
            .filter(|id| *id == &Value::from("state"))
            .count();
        assert_eq!(1, state_fields);
        assert_eq!(&Value::from("done"), field(slots, "state"));
    }

    #[tokio::test]
    async fn no_records_below_the_level() {
        let sink = TestSink::default();
        let subscriber = SpoolSubscriber::new(
            "info".parse().expect("info is a level filter"),
            sink.clone(),
        );
        let _guard = tracing::subscriber::set_default(subscriber);

        tracing::debug!(ignored = true, "too quiet to hear");
        {
            let span = tracing::debug_span!("also too quiet");
            let _entered = span.enter();
        }

        assert!(sink.records.lock().expect("local mutex").is_empty());
    }

    #[tokio::test]
    async fn dropping_the_subscriber_finishes_the_sink() {
        let sink = TestSink::default();
        {
            let subscriber = SpoolSubscriber::new(
                "debug".parse().expect("debug is a level filter"),
                sink.clone(),
            );
            let _guard = tracing::subscriber::set_default(subscriber);
            tracing::info!("one event");
        }

        assert_eq!(1, sink.finishes.load(Ordering::Relaxed));
        assert_eq!(1, sink.records.lock().expect("local mutex").len());
    }

    #[test]
    fn finish_forwards_to_the_sink() {
        let sink = TestSink::default();
        let subscriber = SpoolSubscriber::new(
            "debug".parse().expect("debug is a level filter"),
            sink.clone(),
        );

        subscriber.finish();
        assert_eq!(1, sink.finishes.load(Ordering::Relaxed));

        drop(subscriber);
        assert_eq!(2, sink.finishes.load(Ordering::Relaxed));
    }
}
