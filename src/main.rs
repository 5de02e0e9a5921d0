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

use clap::Parser;
use config::{Args, Settings, StorageSettings};
use error::{Error, Result};
use lifecycle::Lifecycle;
use s3acme_acme::{new_dns_task, AcmeClient};
use s3acme_cache::DomainStore;
use s3acme_storage::{BlobStore, FileStorage, S3Storage};
use std::sync::Arc;
use tracing::{error, info};

mod config;
mod error;
mod lifecycle;
mod logger;
mod output;
mod util;

fn new_blob_store(storage: &StorageSettings) -> Result<Arc<dyn BlobStore>> {
    let store: Arc<dyn BlobStore> = match storage {
        StorageSettings::S3(opts) => {
            info!(
                endpoint = opts.endpoint,
                bucket = opts.bucket,
                prefix = opts.prefix,
                "use s3 storage"
            );
            Arc::new(S3Storage::new(opts)?)
        },
        StorageSettings::Dir { path, prefix } => {
            info!(
                path = %path.display(),
                prefix,
                "use local directory storage"
            );
            Arc::new(FileStorage::new(path, prefix)?)
        },
    };
    Ok(store)
}

async fn execute(settings: Settings) -> Result<()> {
    let store = DomainStore::new(new_blob_store(&settings.storage)?);
    if settings.list {
        for name in store.list().await? {
            println!("{name}");
        }
        return Ok(());
    }

    let dns = new_dns_task(
        settings.dns_provider,
        &settings.dns_token,
        settings.dns_endpoint.as_deref(),
    )?;
    let client =
        AcmeClient::new(&settings.directory_url, dns, settings.dns_wait);
    let lifecycle = Lifecycle::new(
        store,
        Box::new(client),
        &settings.email,
        settings.renew_days,
    );
    let envelope = lifecycle.run(&settings.domains).await?;
    output::write_certificate(
        &settings.key_file,
        &settings.cert_file,
        &envelope,
    )?;
    info!(
        domains = settings.domains.join(","),
        key_file = settings.key_file,
        cert_file = settings.cert_file,
        "certificate is ready"
    );
    Ok(())
}

fn run() -> Result<()> {
    let args = Args::parse();
    logger::logger_try_init(logger::LoggerParams {
        level: args.log_level.clone(),
        json: args.log_json,
    })?;
    let settings = args.into_settings()?;
    // every stage runs after the previous one, a single thread is enough
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| Error::Config {
            message: format!("build runtime fail, {e}"),
        })?;
    runtime.block_on(execute(settings))
}

fn main() {
    if let Err(e) = run() {
        error!(error = %e, "s3acme fail");
        eprintln!("{e}");
        std::process::exit(1);
    }
}
