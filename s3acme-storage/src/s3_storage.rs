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

use super::{join_key, strip_key, BlobStore, Error, Result, LOG_TARGET};
use async_trait::async_trait;
use s3::creds::Credentials;
use s3::error::S3Error;
use s3::{Bucket, Region};
use tracing::debug;

/// Connection settings of an S3 compatible object store
#[derive(Debug, Clone, Default, PartialEq)]
pub struct S3Options {
    pub endpoint: String,
    pub region: String,
    pub bucket: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub prefix: String,
    /// Use `endpoint/bucket/key` instead of `bucket.endpoint/key`
    pub path_style: bool,
}

pub struct S3Storage {
    bucket: Box<Bucket>,
    prefix: String,
}

impl S3Storage {
    pub fn new(opts: &S3Options) -> Result<Self> {
        let credentials = Credentials::new(
            Some(&opts.access_key_id),
            Some(&opts.secret_access_key),
            None,
            None,
            None,
        )
        .map_err(|e| Error::Invalid {
            message: e.to_string(),
        })?;
        let region = Region::Custom {
            region: opts.region.clone(),
            endpoint: opts.endpoint.clone(),
        };
        let mut bucket =
            Bucket::new(&opts.bucket, region, credentials).map_err(|e| {
                Error::S3 {
                    source: e,
                    key: opts.bucket.clone(),
                }
            })?;
        if opts.path_style {
            bucket = bucket.with_path_style();
        }
        Ok(Self {
            bucket,
            prefix: opts.prefix.clone(),
        })
    }
}

fn check_status(status: u16, name: &str, key: &str) -> Result<()> {
    match status {
        200..=299 => Ok(()),
        404 => Err(Error::NotFound {
            name: name.to_string(),
        }),
        _ => Err(Error::Invalid {
            message: format!("unexpected status {status} for {key}"),
        }),
    }
}

#[async_trait]
impl BlobStore for S3Storage {
    async fn get(&self, name: &str) -> Result<Vec<u8>> {
        let key = join_key(&self.prefix, name);
        let response =
            self.bucket.get_object(&key).await.map_err(|e| match e {
                S3Error::HttpFailWithBody(404, _) => Error::NotFound {
                    name: name.to_string(),
                },
                e => Error::S3 {
                    source: e,
                    key: key.clone(),
                },
            })?;
        check_status(response.status_code(), name, &key)?;
        debug!(target: LOG_TARGET, key, "get object from s3");
        Ok(response.bytes().to_vec())
    }

    async fn put(&self, name: &str, data: &[u8]) -> Result<()> {
        let key = join_key(&self.prefix, name);
        let response =
            self.bucket
                .put_object(&key, data)
                .await
                .map_err(|e| Error::S3 {
                    source: e,
                    key: key.clone(),
                })?;
        check_status(response.status_code(), name, &key)?;
        debug!(target: LOG_TARGET, key, size = data.len(), "put object to s3");
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>> {
        let prefix = join_key(&self.prefix, "");
        let results = self
            .bucket
            .list(prefix.clone(), None)
            .await
            .map_err(|e| Error::S3 {
                source: e,
                key: prefix,
            })?;
        let mut names = vec![];
        for result in results.iter() {
            for object in result.contents.iter() {
                if let Some(name) = strip_key(&self.prefix, &object.key) {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}
