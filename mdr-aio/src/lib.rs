//! Asynchronous IO operations for mdr (filesystem, json, checksums)

pub mod checksum;
pub mod fs;
pub mod json_io;

// Re-export the primary async functions
pub use checksum::{compute_hashes_async, hash_bytes, verify_checksum_async};
pub use fs::{atomic_write_file_async, read_if_exists_async, read_to_bytes_async, StagedFile};
pub use json_io::{read_json_async, write_json_async};
