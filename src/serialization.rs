//! Output writers for records.
//!
//! Records (or any serializable pipeline output) are written either as
//! NDJSON, one document per line, or as a single JSON array.

use serde::Serialize;
use std::io::Write;

/// Error type for serialization operations
#[derive(Debug, thiserror::Error)]
pub enum SerializationError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// NDJSON (Newline Delimited JSON) writer
pub struct NdjsonWriter<W: Write> {
    writer: W,
    written: usize,
}

impl<W: Write> NdjsonWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, written: 0 }
    }

    /// Write a single record as an NDJSON line
    pub fn write<T: Serialize>(&mut self, record: &T) -> Result<(), SerializationError> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }

    pub fn write_all<T: Serialize>(&mut self, records: &[T]) -> Result<(), SerializationError> {
        for record in records {
            self.write(record)?;
        }
        Ok(())
    }

    /// Number of records written so far.
    pub fn written(&self) -> usize {
        self.written
    }

    pub fn flush(&mut self) -> Result<(), SerializationError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// JSON array writer
///
/// Opens the array on creation; [`JsonArrayWriter::finish`] closes it.
pub struct JsonArrayWriter<W: Write> {
    writer: W,
    first: bool,
    pretty: bool,
}

impl<W: Write> JsonArrayWriter<W> {
    pub fn new(writer: W) -> Result<Self, SerializationError> {
        Self::with_pretty(writer, false)
    }

    /// Indent elements (two spaces, one element per line).
    pub fn with_pretty(mut writer: W, pretty: bool) -> Result<Self, SerializationError> {
        write!(writer, "[")?;
        Ok(Self {
            writer,
            first: true,
            pretty,
        })
    }

    pub fn write<T: Serialize>(&mut self, record: &T) -> Result<(), SerializationError> {
        if !self.first {
            write!(self.writer, ",")?;
        }
        self.first = false;

        if self.pretty {
            let json = serde_json::to_string_pretty(record)?;
            write!(self.writer, "\n  {}", json.replace('\n', "\n  "))?;
        } else {
            serde_json::to_writer(&mut self.writer, record)?;
        }
        Ok(())
    }

    /// Close the bracket and flush.
    pub fn finish(mut self) -> Result<(), SerializationError> {
        if self.pretty && !self.first {
            writeln!(self.writer)?;
        }
        write!(self.writer, "]")?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Write a single document, pretty-printed or compact, followed by a newline.
pub fn write_document<W: Write, T: Serialize>(
    mut writer: W,
    document: &T,
    pretty: bool,
) -> Result<(), SerializationError> {
    if pretty {
        serde_json::to_writer_pretty(&mut writer, document)?;
    } else {
        serde_json::to_writer(&mut writer, document)?;
    }
    writeln!(writer)?;
    writer.flush()?;
    Ok(())
}
