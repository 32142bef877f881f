//! Request payload captured once and re-readable.
//!
//! The inbound body is read from the wire at most once. Every later consumer
//! (payload inspection, the resource handler) reads through its own cursor
//! over the same immutable buffer, so all of them observe identical bytes.

use std::io::{self, BufRead, Cursor, Read};

use bytes::Bytes;
use serde::de::DeserializeOwned;

/// An immutable, cheaply clonable request body.
///
/// # Example
///
/// ```
/// use std::io::Read;
/// use fhirgate_core::CachedBody;
///
/// let body = CachedBody::capture("hello");
///
/// let mut first = String::new();
/// body.reader().read_to_string(&mut first).unwrap();
/// let mut second = String::new();
/// body.reader().read_to_string(&mut second).unwrap();
///
/// assert_eq!(first, second);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CachedBody {
    bytes: Bytes,
}

impl CachedBody {
    /// Captures an already-collected payload.
    pub fn capture(bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    /// Returns a handle to the buffer. No bytes are copied.
    #[must_use]
    pub fn bytes(&self) -> Bytes {
        self.bytes.clone()
    }

    /// Returns a fresh, independent reader positioned at the start.
    #[must_use]
    pub fn reader(&self) -> BodyReader {
        BodyReader {
            inner: Cursor::new(self.bytes.clone()),
        }
    }

    /// Deserializes the payload as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.bytes)
    }

    /// Payload length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns true if the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// An independent cursor over a [`CachedBody`].
#[derive(Debug)]
pub struct BodyReader {
    inner: Cursor<Bytes>,
}

impl BodyReader {
    /// Returns true once every byte has been read.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.inner.position() >= self.inner.get_ref().len() as u64
    }
}

impl Read for BodyReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl BufRead for BodyReader {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.inner.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.inner.consume(amt);
    }
}
