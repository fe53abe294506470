use std::io::{self, Write};

use crate::record::{RecordDescriptor, Value};

/// Writes one record and its values to a stream.
///
/// Callers guarantee decode-consistent arguments: `slots` holds exactly one
/// slice per descriptor slot, in slot order.
pub trait RecordEncoder: Send {
    fn encode(
        &mut self,
        out: &mut dyn Write,
        descriptor: &RecordDescriptor,
        slots: &[&[Value]],
    ) -> io::Result<()>;
}

/// The csv-flavored text encoding: one line per record.
///
/// `__rec=<name>` leads the line, and every slot holding at least one value
/// follows as `,<slot id>=<value>=<value>...`. Slots with no values are
/// omitted entirely. Backslash, comma, equals and line breaks inside names,
/// slot ids and string values are escaped with a leading backslash, so a
/// line always splits cleanly on unescaped commas.
#[derive(Debug, Default, Clone, Copy)]
pub struct CsvEncoder;

impl CsvEncoder {
    pub fn new() -> Self {
        Self
    }
}

impl RecordEncoder for CsvEncoder {
    fn encode(
        &mut self,
        out: &mut dyn Write,
        descriptor: &RecordDescriptor,
        slots: &[&[Value]],
    ) -> io::Result<()> {
        out.write_all(b"__rec=")?;
        write_escaped(out, descriptor.name())?;
        for (id, values) in descriptor.slot_ids().iter().zip(slots) {
            if values.is_empty() {
                continue;
            }
            out.write_all(b",")?;
            write_escaped(out, id)?;
            for value in *values {
                out.write_all(b"=")?;
                match value {
                    Value::String(text) => write_escaped(out, text)?,
                    other => write!(out, "{other}")?,
                }
            }
        }
        out.write_all(b"\n")
    }
}

// The characters needing escapes are all ascii, so this can scan bytes and
// copy the clean runs between them whole.
fn write_escaped(out: &mut dyn Write, text: &str) -> io::Result<()> {
    let bytes = text.as_bytes();
    let mut start = 0;
    for (position, byte) in bytes.iter().enumerate() {
        let escaped: &[u8] = match byte {
            b'\\' => b"\\\\",
            b',' => b"\\,",
            b'=' => b"\\=",
            b'\n' => b"\\n",
            b'\r' => b"\\r",
            _ => continue,
        };
        out.write_all(&bytes[start..position])?;
        out.write_all(escaped)?;
        start = position + 1;
    }
    out.write_all(&bytes[start..])
}
