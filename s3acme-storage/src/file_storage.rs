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

use super::{join_key, BlobStore, Error, Result, LOG_TARGET};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use walkdir::WalkDir;

/// Writes the file readable by the owner only, it holds private keys.
async fn write_private(file: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);
    let mut f = options.open(file).await?;
    // the mode only applies to new files
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        f.set_permissions(std::fs::Permissions::from_mode(0o600))
            .await?;
    }
    f.write_all(data).await?;
    f.flush().await
}

/// Blobs kept as files below a local directory,
/// the prefix becomes a sub directory.
pub struct FileStorage {
    path: PathBuf,
    prefix: String,
}

impl FileStorage {
    pub fn new(path: &Path, prefix: &str) -> Result<Self> {
        let dir = path.join(join_key(prefix, ""));
        std::fs::create_dir_all(&dir).map_err(|e| Error::Io {
            source: e,
            file: dir.to_string_lossy().to_string(),
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            prefix: prefix.to_string(),
        })
    }
    fn get_target_path(&self, name: &str) -> PathBuf {
        self.path.join(join_key(&self.prefix, name))
    }
}

#[async_trait]
impl BlobStore for FileStorage {
    async fn get(&self, name: &str) -> Result<Vec<u8>> {
        let file = self.get_target_path(name);
        match fs::read(&file).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(Error::NotFound {
                name: name.to_string(),
            }),
            Err(e) => Err(Error::Io {
                source: e,
                file: file.to_string_lossy().to_string(),
            }),
        }
    }

    async fn put(&self, name: &str, data: &[u8]) -> Result<()> {
        let file = self.get_target_path(name);
        if let Some(parent) = file.parent() {
            fs::create_dir_all(parent).await.map_err(|e| Error::Io {
                source: e,
                file: file.to_string_lossy().to_string(),
            })?;
        }
        write_private(&file, data).await.map_err(|e| Error::Io {
            source: e,
            file: file.to_string_lossy().to_string(),
        })?;
        debug!(
            target: LOG_TARGET,
            file = file.to_string_lossy().to_string(),
            "write blob file"
        );
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>> {
        let dir = self.get_target_path("");
        let mut names = vec![];
        for entry in WalkDir::new(&dir) {
            let entry = entry.map_err(|e| Error::Invalid {
                message: e.to_string(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            if let Ok(name) = entry.path().strip_prefix(&dir) {
                names.push(name.to_string_lossy().replace('\\', "/"));
            }
        }
        names.sort();
        Ok(names)
    }
}
