//! A measured, convenient approach to streaming instrumentation records.
//!
//! [`record-spool`] is a buffered record sink. Producers hand it records,
//! each a named shape carrying zero or more values per slot, and it spools
//! them in one flattened in-memory buffer until a flush drains them as
//! csv-flavored text to a file, a standard stream, or nowhere at all.
//!
//! Nothing here runs in the background. Records leave the buffer when it
//! overflows, when you flush, and when the recorder finishes or drops.
//! While low overhead is a goal of record-spool, 0-overhead is not: the
//! hot path takes one lock and copies values into the buffer.
//!
//! # Examples
//!
//! ## Spooling to stderr
//! ```rust
//! use std::sync::Arc;
//!
//! use record_spool::{Recorder, RecorderConfig, RecordDescriptor, RecordSink, Value};
//!
//! // One descriptor per record shape, shared by reference.
//! let request = Arc::new(RecordDescriptor::new("request", ["path", "status"]));
//!
//! let recorder = Recorder::new(&RecorderConfig {
//!     filename: "stderr".to_owned(),
//!     ..RecorderConfig::default()
//! });
//!
//! let path = [Value::from("/health")];
//! let status = [Value::from(200_i64)];
//! recorder.write_record(&request, &[&path, &status]);
//!
//! // Nothing drains on a timer; flush when it suits you, or let the
//! // recorder flush itself when it drops.
//! recorder.finish();
//! ```
//!
//! ## Tallying records instead of writing them
//! ```rust
//! // Any RecordSink works where a Recorder does, so a pipeline can be
//! // pointed at something else entirely.
//! struct Tally {
//!     n: std::sync::atomic::AtomicUsize,
//! }
//! impl record_spool::RecordSink for Tally {
//!     fn write_record(
//!         &self,
//!         _descriptor: &std::sync::Arc<record_spool::RecordDescriptor>,
//!         _slots: &[&[record_spool::Value]],
//!     ) {
//!         self.n.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
//!     }
//! }
//! ```

mod encoder;
mod record;
mod recorder;
mod store;
mod stream;

pub use encoder::CsvEncoder;
pub use encoder::RecordEncoder;
pub use record::RecordDescriptor;
pub use record::Value;
pub use recorder::Recorder;
pub use recorder::RecorderConfig;
pub use recorder::RecordSink;
pub use store::decode_records;
pub use store::DecodeError;
pub use store::DecodeRecords;
pub use store::DecodedRecord;
pub use store::RecordBuffer;
pub use stream::StreamSpec;
