//! Response encoding for executor results.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       encoder                                │
//! │   result map ──► file manifest? ──► single JSON | multipart  │
//! │                                          │                   │
//! │                 ┌────────────────────────┴──────────┐        │
//! │                 │  multipart (framing)  checksum    │        │
//! │                 └───────────────────────────────────┘        │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod checksum;
pub mod encoder;
pub mod multipart;

pub use checksum::{copy_with_sha256, sha256_file, sha256_file_hex};
pub use encoder::{
    encode_json, encode_multipart, encode_result, encode_single, resolve_output_path,
    take_file_manifest, write_multipart, EncodedResponse, MultipartBody, ResponseBody,
    ResponseMode, JSON_CONTENT_TYPE, OCTET_STREAM_CONTENT_TYPE, RESULT_PART_NAME,
};
pub use multipart::{escape_quotes, generate_boundary, multipart_content_type, MultipartWriter};
