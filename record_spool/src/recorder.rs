use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::encoder::{CsvEncoder, RecordEncoder};
use crate::record::{RecordDescriptor, Value};
use crate::store::RecordBuffer;
use crate::stream::{RecordStream, StreamSpec};

/// Recorder settings, fixed for the life of the recorder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecorderConfig {
    /// Sink spec for the record stream: `stdout`, `stderr`, `none`, or a
    /// file path to create.
    pub filename: String,
    /// Pending records held before the buffer overflows.
    pub record_buffer_size: usize,
    /// Flattened values held, count entries included, before the buffer
    /// overflows.
    pub data_buffer_size: usize,
    /// Let the buffers grow past their sizes instead of overflowing.
    pub buffer_can_grow: bool,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            filename: "stdout".to_owned(),
            record_buffer_size: 8000,
            data_buffer_size: 60000,
            buffer_can_grow: true,
        }
    }
}

/// Where completed records go.
///
/// Producers may call `write_record` concurrently from any thread.
/// Implementations must not panic into the caller; a sink failure is the
/// sink's problem to log and swallow. Implementations also must not emit
/// records of their own while handling a call, or a contextual producer
/// like a trace subscriber will re-enter them.
pub trait RecordSink: Send + Sync {
    /// One completed record: its shape plus one value slice per slot, in
    /// slot order.
    fn write_record(&self, descriptor: &Arc<RecordDescriptor>, slots: &[&[Value]]);

    /// Drains anything buffered out to the stream. Blocks until the drain
    /// completes.
    fn flush(&self) {}

    /// The measurement session is over; drain durably. This is the one
    /// trigger a session guarantees to fire, so it is the durability
    /// backstop.
    fn finish(&self) {}
}

impl<T: RecordSink + ?Sized> RecordSink for Arc<T> {
    fn write_record(&self, descriptor: &Arc<RecordDescriptor>, slots: &[&[Value]]) {
        (**self).write_record(descriptor, slots)
    }

    fn flush(&self) {
        (**self).flush()
    }

    fn finish(&self) {
        (**self).finish()
    }
}

/// How `write_record` treats the buffer. Chosen once at construction and
/// never re-evaluated.
enum AppendMode {
    /// No buffering was configured; every record writes straight through.
    Direct,
    /// Records buffer until a flush trigger or until the buffer refuses one.
    Buffered,
}

/// A buffered [`RecordSink`] spooling records to one text stream.
///
/// One mutex covers the pending buffer, the stream handle and the encoder;
/// appends and flushes run entirely inside it, so records hit the stream in
/// the exact order their appends were admitted. Most appends are a few
/// vector pushes. The append that overflows a bounded buffer pays for the
/// whole drain: it encodes and writes every pending record, then writes its
/// own record through directly.
///
/// Nothing flushes on a timer. Records drain on overflow, on [`flush`],
/// on [`finish`], and when the recorder drops.
///
/// [`flush`]: RecordSink::flush
/// [`finish`]: RecordSink::finish
pub struct Recorder<E: RecordEncoder = CsvEncoder> {
    mode: AppendMode,
    inner: Mutex<Inner<E>>,
}

struct Inner<E> {
    buffer: RecordBuffer,
    stream: RecordStream,
    encoder: E,
}

impl Recorder {
    /// A recorder writing the stock csv-flavored encoding.
    pub fn new(config: &RecorderConfig) -> Self {
        Self::with_encoder(config, CsvEncoder::new())
    }
}

impl<E: RecordEncoder> Recorder<E> {
    /// A recorder writing through a custom encoder.
    ///
    /// The stream opens here and the append mode is chosen here, once:
    /// growth disabled with a zero record buffer size means no buffering
    /// was asked for, and every record will write straight through.
    pub fn with_encoder(config: &RecorderConfig, encoder: E) -> Self {
        let spec = StreamSpec::from(config.filename.as_str());
        let stream = RecordStream::open(&spec);
        if !stream.is_discard() {
            log::info!("recording to {}", config.filename);
        }

        let mode = if !config.buffer_can_grow && config.record_buffer_size == 0 {
            AppendMode::Direct
        } else {
            AppendMode::Buffered
        };
        let buffer = match mode {
            AppendMode::Direct => RecordBuffer::new(false, 0, 0),
            AppendMode::Buffered => RecordBuffer::new(
                config.buffer_can_grow,
                config.record_buffer_size,
                config.data_buffer_size,
            ),
        };

        Self {
            mode,
            inner: Mutex::new(Inner {
                buffer,
                stream,
                encoder,
            }),
        }
    }

    /// Number of records pending in the buffer.
    pub fn pending_records(&self) -> usize {
        self.lock().buffer.len()
    }

    fn lock(&self) -> MutexGuard<'_, Inner<E>> {
        // A panicked producer thread must not wedge every other producer.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<E: RecordEncoder> RecordSink for Recorder<E> {
    fn write_record(&self, descriptor: &Arc<RecordDescriptor>, slots: &[&[Value]]) {
        let mut inner = self.lock();
        if inner.stream.is_discard() {
            return;
        }
        match self.mode {
            AppendMode::Direct => inner.write_direct(descriptor, slots),
            AppendMode::Buffered => {
                if !inner.buffer.try_append(descriptor, slots) {
                    inner.flush_buffer();
                    inner.write_direct(descriptor, slots);
                }
            }
        }
    }

    fn flush(&self) {
        let mut inner = self.lock();
        inner.flush_buffer();
        inner.stream.flush();
    }

    fn finish(&self) {
        self.flush();
    }
}

impl<E: RecordEncoder> Inner<E> {
    fn write_direct(&mut self, descriptor: &RecordDescriptor, slots: &[&[Value]]) {
        let Inner {
            stream, encoder, ..
        } = self;
        let written = stream.with_writer(|out| encoder.encode(out, descriptor, slots));
        if let Some(Err(error)) = written {
            log::error!("could not write record: {error}");
        }
    }

    /// Encodes and writes every pending record, then clears the buffer.
    ///
    /// A write error abandons the pass; whatever did not make it out is
    /// dropped with the rest so the recorder keeps accepting records.
    fn flush_buffer(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let Inner {
            buffer,
            stream,
            encoder,
        } = self;
        let written = stream.with_writer(|out| {
            let mut written = 0_usize;
            for record in buffer.records() {
                let record = match record {
                    Ok(record) => record,
                    Err(error) => {
                        log::error!("undecodable record buffer, dropping the rest: {error}");
                        break;
                    }
                };
                encoder.encode(out, record.descriptor, &record.slots)?;
                written += 1;
            }
            Ok::<_, io::Error>(written)
        });
        match written {
            Some(Ok(written)) => log::debug!("wrote {written} records"),
            Some(Err(error)) => log::error!("could not write record stream: {error}"),
            None => {}
        }
        buffer.clear();
    }
}

impl<E: RecordEncoder> Drop for Recorder<E> {
    fn drop(&mut self) {
        let inner = self
            .inner
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        inner.flush_buffer();
        inner.stream.flush();
    }
}
