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

use crate::error::{Error, Result};
use s3acme_cache::CertificateEnvelope;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{error, info};

static LOG_TARGET: &str = "s3acme::output";

/// Writes the data to a temporary file in the same directory and renames it,
/// so a reader never sees a partial file. The file is only readable by the owner.
pub fn write_private_file(file: &str, data: &[u8]) -> Result<()> {
    let new_error = |source: std::io::Error| Error::OutputWrite {
        file: file.to_string(),
        source,
    };
    let path = Path::new(file);
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir).map_err(new_error)?;
    tmp.write_all(data).map_err(new_error)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(std::fs::Permissions::from_mode(0o600))
            .map_err(new_error)?;
    }
    tmp.as_file().sync_all().map_err(new_error)?;
    tmp.persist(path).map_err(|e| new_error(e.error))?;
    Ok(())
}

/// Writes the private key and the certificate chain to their files.
/// Both files are attempted, the first failure is returned.
pub fn write_certificate(
    key_file: &str,
    cert_file: &str,
    envelope: &CertificateEnvelope,
) -> Result<()> {
    let mut first_error = None;
    for (file, data) in [(key_file, &envelope.key), (cert_file, &envelope.certs)]
    {
        match write_private_file(file, data) {
            Ok(()) => {
                info!(
                    target: LOG_TARGET,
                    file,
                    size = data.len(),
                    "write file success"
                );
            },
            Err(e) => {
                error!(target: LOG_TARGET, error = %e, file, "write file fail");
                first_error.get_or_insert(e);
            },
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::{write_certificate, write_private_file};
    use pretty_assertions::assert_eq;
    use s3acme_cache::CertificateEnvelope;
    use tempfile::TempDir;

    #[test]
    fn test_write_private_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("example.key");
        let file = file.to_string_lossy().to_string();
        write_private_file(&file, b"first").unwrap();
        write_private_file(&file, b"second").unwrap();
        assert_eq!(b"second".to_vec(), std::fs::read(&file).unwrap());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&file).unwrap().permissions().mode();
            assert_eq!(0o600, mode & 0o777);
        }
        // only the output file is left
        assert_eq!(1, std::fs::read_dir(dir.path()).unwrap().count());
    }

    #[test]
    fn test_write_certificate() {
        let dir = TempDir::new().unwrap();
        let key_file = dir.path().join("example.key").to_string_lossy().to_string();
        let cert_file =
            dir.path().join("example.pem").to_string_lossy().to_string();
        let envelope =
            CertificateEnvelope::new(b"key".to_vec(), b"certs".to_vec());
        write_certificate(&key_file, &cert_file, &envelope).unwrap();
        assert_eq!(b"key".to_vec(), std::fs::read(&key_file).unwrap());
        assert_eq!(b"certs".to_vec(), std::fs::read(&cert_file).unwrap());

        let missing = dir.path().join("missing/example.key");
        let err = write_certificate(
            &missing.to_string_lossy(),
            &cert_file,
            &envelope,
        )
        .unwrap_err();
        assert!(err.to_string().starts_with("Write "));
    }

    #[test]
    fn test_write_certificate_continues_after_failure() {
        let dir = TempDir::new().unwrap();
        let key_file = dir
            .path()
            .join("missing/example.key")
            .to_string_lossy()
            .to_string();
        let cert_file =
            dir.path().join("example.pem").to_string_lossy().to_string();
        let envelope =
            CertificateEnvelope::new(b"key".to_vec(), b"certs".to_vec());

        let err = write_certificate(&key_file, &cert_file, &envelope)
            .unwrap_err();
        assert!(err.to_string().contains("missing/example.key"));
        // the chain is still written
        assert_eq!(b"certs".to_vec(), std::fs::read(&cert_file).unwrap());
    }
}
