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
use crate::util::{resolve_path, split_list};
use clap::Parser;
use s3acme_acme::{directory_url, DnsProvider};
use s3acme_storage::S3Options;
use std::path::PathBuf;
use std::time::Duration;

/// Issue and renew a certificate by dns-01, the account and the
/// certificate are kept in an object store between runs.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Contact email of the acme account
    #[arg(long, env = "S3A_EMAIL", default_value = "")]
    pub email: String,
    /// Domains of the certificate, comma separated, the first one is primary
    #[arg(long, env = "S3A_DOMAINS", default_value = "")]
    pub domains: String,
    /// Endpoint of the s3 compatible object store
    #[arg(long, env = "S3A_ENDPOINT")]
    pub endpoint: Option<String>,
    #[arg(long, env = "S3A_ID")]
    pub access_key_id: Option<String>,
    #[arg(long, env = "S3A_SECRET", hide_env_values = true)]
    pub secret_access_key: Option<String>,
    #[arg(long, env = "S3A_BUCKET")]
    pub bucket: Option<String>,
    /// Key prefix of all stored objects
    #[arg(long, env = "S3A_PREFIX", default_value = "")]
    pub prefix: String,
    #[arg(long, env = "S3A_REGION", default_value = "us-west-2")]
    pub region: String,
    /// Address the bucket as `endpoint/bucket` instead of a sub domain
    #[arg(long, env = "S3A_PATH_STYLE")]
    pub path_style: bool,
    /// Keep the objects in a local directory instead of the object store
    #[arg(long, env = "S3A_STORAGE_DIR")]
    pub storage_dir: Option<String>,
    /// Output file of the private key
    #[arg(long, env = "S3A_DESTKEYFILE", default_value = "")]
    pub key_file: String,
    /// Output file of the certificate chain
    #[arg(long, env = "S3A_DESTCERTFILE", default_value = "")]
    pub cert_file: String,
    /// Dns provider of the dns-01 challenge: digitalocean or cloudflare
    #[arg(long, env = "S3A_DNS_PROVIDER", default_value = "digitalocean")]
    pub dns_provider: DnsProvider,
    /// Api token of the dns provider
    #[arg(
        long,
        env = "S3A_DOAUTH",
        default_value = "",
        hide_env_values = true
    )]
    pub dns_token: String,
    /// Api address of the dns provider, only for a non default address
    #[arg(long, env = "S3A_DNS_ENDPOINT")]
    pub dns_endpoint: Option<String>,
    /// Wait time for the txt records to propagate
    #[arg(long, env = "S3A_DNS_WAIT", default_value = "20s", value_parser = humantime::parse_duration)]
    pub dns_wait: Duration,
    /// Use the staging directory unless the value is empty or 0
    #[arg(long, env = "S3A_STAGING", default_value = "")]
    pub staging: String,
    /// Acme directory url, it takes precedence over staging
    #[arg(long, env = "S3A_DIRECTORY_URL")]
    pub directory_url: Option<String>,
    /// Renew the certificate when no more than these days remain
    #[arg(long, env = "S3A_RENEW_DAYS", default_value_t = 15)]
    pub renew_days: u32,
    /// Log level or directives, e.g. `info,s3acme::acme=debug`
    #[arg(long, env = "S3A_LOG", default_value = "info")]
    pub log_level: String,
    #[arg(long, env = "S3A_LOG_JSON")]
    pub log_json: bool,
    /// Print the names of the stored objects and exit
    #[arg(long)]
    pub list: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StorageSettings {
    S3(S3Options),
    Dir { path: PathBuf, prefix: String },
}

/// Validated settings of one run
#[derive(Debug, Clone)]
pub struct Settings {
    pub email: String,
    pub domains: Vec<String>,
    pub storage: StorageSettings,
    pub key_file: String,
    pub cert_file: String,
    pub dns_provider: DnsProvider,
    pub dns_token: String,
    pub dns_endpoint: Option<String>,
    pub dns_wait: Duration,
    pub directory_url: String,
    pub renew_days: u32,
    pub list: bool,
}

fn is_staging(value: &str) -> bool {
    let value = value.trim();
    !value.is_empty() && value != "0"
}

fn required(name: &str, value: Option<String>) -> Result<String> {
    match value.map(|value| value.trim().to_string()) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(Error::Config {
            message: format!("{name} is required"),
        }),
    }
}

impl Args {
    fn storage_settings(&self) -> Result<StorageSettings> {
        if let Some(dir) = self.storage_dir.as_ref().filter(|dir| !dir.is_empty())
        {
            return Ok(StorageSettings::Dir {
                path: PathBuf::from(resolve_path(dir)),
                prefix: self.prefix.clone(),
            });
        }
        Ok(StorageSettings::S3(S3Options {
            endpoint: required("endpoint", self.endpoint.clone())?,
            region: self.region.clone(),
            bucket: required("bucket", self.bucket.clone())?,
            access_key_id: required(
                "access key id",
                self.access_key_id.clone(),
            )?,
            secret_access_key: required(
                "secret access key",
                self.secret_access_key.clone(),
            )?,
            prefix: self.prefix.clone(),
            path_style: self.path_style,
        }))
    }
    /// Validates the arguments, nothing is read or written before it.
    /// Listing the stored objects only needs the storage settings.
    pub fn into_settings(self) -> Result<Settings> {
        let storage = self.storage_settings()?;
        let directory_url =
            directory_url(is_staging(&self.staging), self.directory_url.as_deref());
        if self.list {
            return Ok(Settings {
                email: self.email,
                domains: split_list(&self.domains),
                storage,
                key_file: self.key_file,
                cert_file: self.cert_file,
                dns_provider: self.dns_provider,
                dns_token: self.dns_token,
                dns_endpoint: self.dns_endpoint,
                dns_wait: self.dns_wait,
                directory_url,
                renew_days: self.renew_days,
                list: true,
            });
        }
        let domains = split_list(&self.domains);
        if domains.is_empty() {
            return Err(Error::Config {
                message: "domains is required".to_string(),
            });
        }
        let email = required("email", Some(self.email))?;
        let dns_token = required("dns token", Some(self.dns_token))?;
        let key_file = resolve_path(&required("key file", Some(self.key_file))?);
        let cert_file =
            resolve_path(&required("cert file", Some(self.cert_file))?);
        if key_file == cert_file {
            return Err(Error::Config {
                message: "key file and cert file should be different"
                    .to_string(),
            });
        }
        Ok(Settings {
            email,
            domains,
            storage,
            key_file,
            cert_file,
            dns_provider: self.dns_provider,
            dns_token,
            dns_endpoint: self.dns_endpoint.filter(|value| !value.is_empty()),
            dns_wait: self.dns_wait,
            directory_url,
            renew_days: self.renew_days,
            list: false,
        })
    }
}
