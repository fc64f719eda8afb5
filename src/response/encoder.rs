//! Encoding of executor results into HTTP response bodies.
//!
//! The encoding is chosen from the result's `file` manifest:
//!
//! - **Single**: no manifest (or an empty one). The body is the result as
//!   JSON with the `file` key removed.
//! - **Multipart**: a non-empty manifest. The body is `multipart/form-data`
//!   with a `result` JSON part followed by one `application/octet-stream`
//!   part per output file, annotated with its SHA-256 digest.
//!
//! A multipart body is not produced up front. [`MultipartBody::write_to`]
//! writes it into any `Write`, loading one attachment at a time, so the
//! server can stream it while the content type is already known.
//!
//! Each attachment is copied once from its source into an anonymous spool
//! file while being hashed; the part body is then sent from the spool. The
//! announced `sha256sum` always describes the exact bytes in the part, even
//! if the source file changes concurrently.
//!
//! A file that cannot be read is skipped with a warning; the rest of the
//! response is still sent.

use std::fs::File;
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use super::checksum::copy_with_sha256;
use super::multipart::{escape_quotes, generate_boundary, multipart_content_type, MultipartWriter};
use crate::error::AttachmentError;
use crate::executor::{ResultMap, FILE_KEY};

/// Content type of JSON bodies and parts.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Content type of attachment parts.
pub const OCTET_STREAM_CONTENT_TYPE: &str = "application/octet-stream";

/// Name of the multipart part carrying the JSON result.
pub const RESULT_PART_NAME: &str = "result";

// =============================================================================
// Encoded Response
// =============================================================================

/// Which encoding was used for a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    /// Plain JSON document
    Single,
    /// JSON result part plus file parts
    Multipart,
}

/// An encoded response: content type plus a body that is either complete or
/// written on demand.
#[derive(Debug)]
pub struct EncodedResponse {
    /// Encoding used
    pub mode: ResponseMode,

    /// Value for the `Content-Type` header
    pub content_type: String,

    /// Response body
    pub body: ResponseBody,
}

impl EncodedResponse {
    /// Produce the whole body in memory.
    pub fn into_bytes(self) -> io::Result<Vec<u8>> {
        match self.body {
            ResponseBody::Full(bytes) => Ok(bytes),
            ResponseBody::Multipart(multipart) => multipart.write_to(Vec::new()),
        }
    }
}

/// Body of an [`EncodedResponse`].
#[derive(Debug)]
pub enum ResponseBody {
    /// Complete JSON document
    Full(Vec<u8>),
    /// Multipart document written while the response is sent
    Multipart(MultipartBody),
}

/// A multipart document whose boundary is fixed but whose parts have not
/// been written yet.
#[derive(Debug)]
pub struct MultipartBody {
    boundary: String,
    result: ResultMap,
    files: Map<String, Value>,
    run_dir: PathBuf,
}

impl MultipartBody {
    /// Boundary announced in the content type.
    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Write the document into `out` and return it.
    ///
    /// Attachment problems skip the part; only errors from `out` are returned.
    pub fn write_to<W: Write>(&self, out: W) -> io::Result<W> {
        let writer = MultipartWriter::with_boundary(out, self.boundary.as_str())?;
        write_multipart(writer, &self.result, &self.files, &self.run_dir)
    }
}

// =============================================================================
// Encoding
// =============================================================================

/// Encode an executor result.
///
/// No output file is touched here; multipart attachments are read when the
/// body is written.
///
/// # Arguments
///
/// * `result` - The executor's result map; its `file` entry is consumed
/// * `run_dir` - Base directory for relative file references
pub fn encode_result(mut result: ResultMap, run_dir: &Path) -> EncodedResponse {
    match take_file_manifest(&mut result) {
        Some(files) => encode_multipart(result, files, run_dir),
        None => encode_single(&result),
    }
}

/// Remove the `file` entry and return it if it is a non-empty object.
pub fn take_file_manifest(result: &mut ResultMap) -> Option<Map<String, Value>> {
    match result.shift_remove(FILE_KEY) {
        Some(Value::Object(files)) if !files.is_empty() => Some(files),
        _ => None,
    }
}

/// Encode a result (without `file`) as a single JSON document.
pub fn encode_single(result: &ResultMap) -> EncodedResponse {
    EncodedResponse {
        mode: ResponseMode::Single,
        content_type: JSON_CONTENT_TYPE.to_string(),
        body: ResponseBody::Full(encode_json(result)),
    }
}

/// Prepare a multipart response for a result (without `file`) and its files.
pub fn encode_multipart(
    result: ResultMap,
    files: Map<String, Value>,
    run_dir: &Path,
) -> EncodedResponse {
    let boundary = generate_boundary();
    EncodedResponse {
        mode: ResponseMode::Multipart,
        content_type: multipart_content_type(&boundary),
        body: ResponseBody::Multipart(MultipartBody {
            boundary,
            result,
            files,
            run_dir: run_dir.to_path_buf(),
        }),
    }
}

/// Write the `result` part and every readable file part.
///
/// Only errors from the underlying writer are returned; file problems are
/// logged and the part is skipped.
pub fn write_multipart<W: Write>(
    mut writer: MultipartWriter<W>,
    result: &ResultMap,
    files: &Map<String, Value>,
    run_dir: &Path,
) -> io::Result<W> {
    let result_disposition = format!("form-data; name=\"{}\"", RESULT_PART_NAME);
    writer.write_part(
        &[
            ("Content-Disposition", result_disposition.as_str()),
            ("Content-Type", JSON_CONTENT_TYPE),
        ],
        &encode_json(result),
    )?;

    for (name, reference) in files {
        let mut attachment = match Attachment::load(name, reference, run_dir) {
            Ok(attachment) => attachment,
            Err(e) => {
                warn!(name = %name, error = %e, "Skipping output file");
                continue;
            }
        };

        let disposition = attachment.content_disposition();
        writer.write_part_from(
            &[
                ("Content-Disposition", disposition.as_str()),
                ("Content-Type", OCTET_STREAM_CONTENT_TYPE),
            ],
            &mut attachment.spool,
        )?;

        info!(path = %attachment.path.display(), "Output file added successfully");
    }

    writer.finish()
}

/// Serialize a value as JSON, falling back to an error object.
///
/// The fallback guarantees the body is always valid JSON.
pub fn encode_json<T: Serialize + ?Sized>(value: &T) -> Vec<u8> {
    match serde_json::to_vec(value) {
        Ok(json) => json,
        Err(e) => {
            error!(error = %e, "Generate json result error");
            let fallback = error_object(format!("Generate json result error: {}", e));
            serde_json::to_vec(&fallback)
                .unwrap_or_else(|_| br#"{"error":"Generate json result error"}"#.to_vec())
        }
    }
}

/// Resolve a file reference against the run directory.
pub fn resolve_output_path(run_dir: &Path, reference: &str) -> PathBuf {
    let path = Path::new(reference);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        run_dir.join(path)
    }
}

fn error_object(message: String) -> ResultMap {
    let mut object = ResultMap::new();
    object.insert("error".to_string(), Value::String(message));
    object
}

// =============================================================================
// Attachments
// =============================================================================

/// An output file spooled and hashed, ready to be written as a part.
#[derive(Debug)]
struct Attachment {
    name: String,
    path: PathBuf,
    sha256: String,
    spool: File,
}

impl Attachment {
    /// Resolve one manifest entry, then copy and hash it into a spool file.
    ///
    /// The source is opened once. Any failure happens before the part is
    /// started, so the document never holds a truncated part.
    fn load(name: &str, reference: &Value, run_dir: &Path) -> Result<Self, AttachmentError> {
        let reference = reference
            .as_str()
            .ok_or_else(|| AttachmentError::InvalidReference(reference.clone()))?;
        let path = resolve_output_path(run_dir, reference);

        let mut source = File::open(&path).map_err(|source| AttachmentError::Read {
            path: path.clone(),
            source,
        })?;
        let mut spool = tempfile::tempfile().map_err(AttachmentError::Spool)?;

        let (size, digest) =
            copy_with_sha256(&mut source, &mut spool).map_err(|source| AttachmentError::Read {
                path: path.clone(),
                source,
            })?;
        spool
            .seek(SeekFrom::Start(0))
            .map_err(AttachmentError::Spool)?;

        debug!(name, path = %path.display(), size, "Loaded output file");

        Ok(Self {
            name: name.to_string(),
            path,
            sha256: hex::encode(digest),
            spool,
        })
    }

    fn filename(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    fn content_disposition(&self) -> String {
        format!(
            "form-data; name=\"{}\"; filename=\"{}\"; sha256sum=\"{}\"",
            escape_quotes(&self.name),
            escape_quotes(&self.filename()),
            self.sha256
        )
    }
}


// =============================================================================
// Tests
// =============================================================================
