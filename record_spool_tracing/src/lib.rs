//! Spools [`tracing`] spans and events into a [`record_spool`] sink.
//!
//! [`SpoolSubscriber`] is a [`Subscriber`](tracing::Subscriber) that turns
//! instrumentation into records. Every event becomes one `event` record as
//! it happens, and every span becomes one `span` record when it closes.
//! Both shapes carry three slots:
//!
//! * `scope`: the names of the spans open on the producing thread,
//!   outermost first;
//! * `attr`: field ids, plus `name` and `time.duration.ns` on span records;
//! * `data`: field values, parallel to `attr`.
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use record_spool::{Recorder, RecorderConfig, RecordSink};
//! use record_spool_tracing::SpoolSubscriber;
//!
//! // Share the recorder between the subscriber and the shutdown path.
//! let recorder = Arc::new(Recorder::new(&RecorderConfig {
//!     filename: "stderr".to_owned(),
//!     ..RecorderConfig::default()
//! }));
//!
//! let level = "info".parse().expect("info is a level filter");
//! let subscriber = SpoolSubscriber::new(level, Arc::clone(&recorder));
//! tracing::subscriber::set_global_default(subscriber)
//!     .expect("I should be able to set the global trace subscriber");
//!
//! tracing::info!(answer = 42, "how many roads");
//!
//! // Nothing drains on a timer; flush when the session is over.
//! recorder.finish();
//! ```

mod span_record;
mod spool_subscriber;

pub use span_record::event_descriptor;
pub use span_record::span_descriptor;
pub use span_record::ATTR_SLOT;
pub use span_record::DATA_SLOT;
pub use span_record::SCOPE_SLOT;
pub use span_record::SPAN_DURATION_FIELD;
pub use span_record::SPAN_NAME_FIELD;
pub use spool_subscriber::SpoolSubscriber;
