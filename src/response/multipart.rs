//! Minimal `multipart/form-data` writer.
//!
//! # Framing
//!
//! ```text
//! --{boundary}\r\n
//! Content-Disposition: form-data; name="result"\r\n
//! Content-Type: application/json\r\n
//! \r\n
//! {...}\r\n
//! --{boundary}\r\n
//! ...
//! \r\n--{boundary}--\r\n
//! ```
//!
//! The boundary is fixed when the writer is created so the response content
//! type can be emitted before any part is written.

use std::io::{self, Read, Write};

use rand::RngCore;

/// Random bytes used to build a boundary (hex encoded to 60 characters).
const BOUNDARY_RANDOM_BYTES: usize = 30;

/// Longest boundary allowed by RFC 2046.
const MAX_BOUNDARY_LEN: usize = 70;

/// Streams multipart parts into an underlying writer.
pub struct MultipartWriter<W: Write> {
    inner: W,
    boundary: String,
    parts_written: usize,
}

impl<W: Write> MultipartWriter<W> {
    /// Create a writer with a random boundary.
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            boundary: generate_boundary(),
            parts_written: 0,
        }
    }

    /// Create a writer with an explicit boundary.
    ///
    /// Returns `InvalidInput` if the boundary is empty, longer than 70
    /// characters, or contains characters outside the RFC 2046 set.
    pub fn with_boundary(inner: W, boundary: impl Into<String>) -> io::Result<Self> {
        let boundary = boundary.into();
        if !is_valid_boundary(&boundary) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid multipart boundary: {:?}", boundary),
            ));
        }
        Ok(Self {
            inner,
            boundary,
            parts_written: 0,
        })
    }

    /// The boundary separating parts.
    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Value for the `Content-Type` header of the whole document.
    pub fn content_type(&self) -> String {
        multipart_content_type(&self.boundary)
    }

    /// Number of parts written so far.
    pub fn parts_written(&self) -> usize {
        self.parts_written
    }

    /// Write one complete part.
    pub fn write_part(&mut self, headers: &[(&str, &str)], body: &[u8]) -> io::Result<()> {
        self.begin_part(headers)?;
        self.inner.write_all(body)?;
        self.parts_written += 1;
        Ok(())
    }

    /// Write one part whose body is copied from `body` until EOF.
    ///
    /// Returns the number of body bytes written.
    pub fn write_part_from<R: Read + ?Sized>(
        &mut self,
        headers: &[(&str, &str)],
        body: &mut R,
    ) -> io::Result<u64> {
        self.begin_part(headers)?;
        let copied = io::copy(body, &mut self.inner)?;
        self.parts_written += 1;
        Ok(copied)
    }

    fn begin_part(&mut self, headers: &[(&str, &str)]) -> io::Result<()> {
        if self.parts_written == 0 {
            write!(self.inner, "--{}\r\n", self.boundary)?;
        } else {
            write!(self.inner, "\r\n--{}\r\n", self.boundary)?;
        }
        for (name, value) in headers {
            write!(self.inner, "{}: {}\r\n", name, value)?;
        }
        self.inner.write_all(b"\r\n")
    }

    /// Write the closing boundary and return the underlying writer.
    pub fn finish(mut self) -> io::Result<W> {
        if self.parts_written > 0 {
            self.inner.write_all(b"\r\n")?;
        }
        write!(self.inner, "--{}--\r\n", self.boundary)?;
        self.inner.flush()?;
        Ok(self.inner)
    }
}

/// Generate a random boundary.
pub fn generate_boundary() -> String {
    let mut bytes = [0u8; BOUNDARY_RANDOM_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// `Content-Type` value for a multipart document using `boundary`.
pub fn multipart_content_type(boundary: &str) -> String {
    format!("multipart/form-data; boundary={}", boundary)
}

/// Backslash-escape `\` and `"` for use inside a quoted header parameter.
pub fn escape_quotes(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if c == '\\' || c == '"' {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn is_valid_boundary(boundary: &str) -> bool {
    if boundary.is_empty() || boundary.len() > MAX_BOUNDARY_LEN || boundary.ends_with(' ') {
        return false;
    }
    boundary.chars().all(|c| {
        c.is_ascii_alphanumeric() || "'()+_,-./:=? ".contains(c)
    })
}
