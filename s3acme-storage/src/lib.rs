// Copyright 2024-2025 Tree xie.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use async_trait::async_trait;
use snafu::Snafu;

mod file_storage;
mod memory_storage;
mod s3_storage;

pub static LOG_TARGET: &str = "s3acme::storage";

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Blob not found {name}"))]
    NotFound { name: String },
    #[snafu(display("S3 error {source}, {key}"))]
    S3 {
        source: s3::error::S3Error,
        key: String,
    },
    #[snafu(display("Io error {source}, {file}"))]
    Io {
        source: std::io::Error,
        file: String,
    },
    #[snafu(display("Invalid error {message}"))]
    Invalid { message: String },
}

impl Error {
    /// Whether the error only means the blob does not exist yet
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Byte blobs addressed by name under a fixed prefix.
///
/// There is no locking and no versioning, the last writer wins.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Fetch the blob, `Error::NotFound` if it does not exist
    async fn get(&self, name: &str) -> Result<Vec<u8>>;

    /// Create or overwrite the blob
    async fn put(&self, name: &str, data: &[u8]) -> Result<()>;

    /// Names of all blobs under the prefix, relative to it
    async fn list(&self) -> Result<Vec<String>>;
}

/// Joins the prefix and the blob name into the backend key,
/// an empty prefix keeps the bare name.
pub fn join_key(prefix: &str, name: &str) -> String {
    let prefix = prefix.trim_matches('/');
    let name = name.trim_start_matches('/');
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}/{name}")
    }
}

/// Strips the prefix from a backend key, `None` if the key is outside of it.
pub(crate) fn strip_key<'a>(prefix: &str, key: &'a str) -> Option<&'a str> {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        return Some(key.trim_start_matches('/'));
    }
    key.strip_prefix(prefix)
        .and_then(|value| value.strip_prefix('/'))
        .filter(|value| !value.is_empty())
}

pub use file_storage::FileStorage;
pub use memory_storage::MemoryStorage;
pub use s3_storage::{S3Options, S3Storage};
