use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

/// Where a record stream goes, resolved once from the configured sink spec.
///
/// `none`, `stdout` and `stderr` select the obvious targets; any other
/// value is a file path to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamSpec {
    None,
    Stdout,
    Stderr,
    Path(PathBuf),
}

impl From<&str> for StreamSpec {
    fn from(spec: &str) -> Self {
        match spec {
            "none" => StreamSpec::None,
            "stdout" => StreamSpec::Stdout,
            "stderr" => StreamSpec::Stderr,
            path => StreamSpec::Path(PathBuf::from(path)),
        }
    }
}

/// The opened write handle, owned for the life of the recorder.
///
/// A file that cannot be created degrades to `Discard` after one logged
/// diagnostic, so a recorder pointed at an unwritable path stays alive and
/// simply records nothing.
pub(crate) enum RecordStream {
    Discard,
    Stdout(io::Stdout),
    Stderr(io::Stderr),
    File(BufWriter<File>),
}

impl RecordStream {
    pub(crate) fn open(spec: &StreamSpec) -> Self {
        match spec {
            StreamSpec::None => RecordStream::Discard,
            StreamSpec::Stdout => RecordStream::Stdout(io::stdout()),
            StreamSpec::Stderr => RecordStream::Stderr(io::stderr()),
            StreamSpec::Path(path) => match File::create(path) {
                Ok(file) => RecordStream::File(BufWriter::new(file)),
                Err(error) => {
                    log::error!("could not open record stream {}: {error}", path.display());
                    RecordStream::Discard
                }
            },
        }
    }

    pub(crate) fn is_discard(&self) -> bool {
        matches!(self, RecordStream::Discard)
    }

    /// Runs `write` against the underlying writer, locking a standard
    /// stream once for the whole pass. Returns `None` when discarding.
    pub(crate) fn with_writer<T>(
        &mut self,
        write: impl FnOnce(&mut dyn Write) -> T,
    ) -> Option<T> {
        match self {
            RecordStream::Discard => None,
            RecordStream::Stdout(handle) => Some(write(&mut handle.lock())),
            RecordStream::Stderr(handle) => Some(write(&mut handle.lock())),
            RecordStream::File(writer) => Some(write(writer)),
        }
    }

    /// Pushes anything buffered in the handle out to the operating system.
    pub(crate) fn flush(&mut self) {
        let result = match self {
            RecordStream::Discard => Ok(()),
            RecordStream::Stdout(handle) => handle.lock().flush(),
            RecordStream::Stderr(handle) => handle.lock().flush(),
            RecordStream::File(writer) => writer.flush(),
        };
        if let Err(error) = result {
            log::error!("could not flush record stream: {error}");
        }
    }
}
