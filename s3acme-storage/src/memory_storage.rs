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

use super::{BlobStore, Error, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// In-process blob store, it also counts the reads and writes
/// so callers can assert how often the backend was touched.
#[derive(Default)]
pub struct MemoryStorage {
    blobs: Mutex<BTreeMap<String, Vec<u8>>>,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
    /// Number of `get` calls so far
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }
    /// Number of `put` calls so far
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }
    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, Vec<u8>>>> {
        self.blobs.lock().map_err(|e| Error::Invalid {
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl BlobStore for MemoryStorage {
    async fn get(&self, name: &str) -> Result<Vec<u8>> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.lock()?
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound {
                name: name.to_string(),
            })
    }

    async fn put(&self, name: &str, data: &[u8]) -> Result<()> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.lock()?.insert(name.to_string(), data.to_vec());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>> {
        Ok(self.lock()?.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::MemoryStorage;
    use crate::BlobStore;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_memory_storage() {
        let storage = MemoryStorage::new();
        assert!(storage.get("user.json").await.unwrap_err().is_not_found());
        storage.put("user.json", b"user").await.unwrap();
        assert_eq!(b"user".to_vec(), storage.get("user.json").await.unwrap());
        assert_eq!(vec!["user.json".to_string()], storage.list().await.unwrap());
        assert_eq!(2, storage.reads());
        assert_eq!(1, storage.writes());
    }
}
