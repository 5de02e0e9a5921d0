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
use s3acme_cache::{AccountKey, AccountRecord, CertificateEnvelope};
use snafu::Snafu;

pub static LOG_TARGET: &str = "s3acme::acme";

/// Errors that can occur during ACME operations
#[derive(Debug, Snafu)]
pub enum Error {
    /// Error from the instant-acme library
    #[snafu(display("ACME instant error: {source}, category: {category}"))]
    Instant {
        category: String,
        source: instant_acme::Error,
    },

    /// Challenge not found during verification
    #[snafu(display("ACME challenge not found: {message}"))]
    NotFound { message: String },

    /// General acme or dns operation failure
    #[snafu(display(
        "ACME operation failed: {message}, category: {category}"
    ))]
    Fail { category: String, message: String },
}

/// Convenience type alias for Results with our Error type
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Acme DNS task
#[async_trait]
pub trait AcmeDnsTask: Sync + Send {
    /// Add a DNS TXT record, `name` is the full record name
    async fn add_txt_record(&self, name: &str, value: &str) -> Result<()>;
    /// Task done, it will clean up all added dns txt records
    async fn done(&self) -> Result<()>;
}

/// The certificate authority as seen by the lifecycle.
#[async_trait]
pub trait IssuanceAuthority: Sync + Send {
    /// Creates a new account with a new key for the contact email
    async fn register(&self, email: &str) -> Result<AccountRecord>;
    /// Registers an account for a key that is already stored,
    /// the returned record keeps the same key.
    async fn register_key(
        &self,
        email: &str,
        key: &AccountKey,
    ) -> Result<AccountRecord>;
    /// Orders a certificate for all domains with the registered account,
    /// returns the private key and the chain as issued.
    async fn request_certificate(
        &self,
        domains: &[String],
        account: &AccountRecord,
    ) -> Result<CertificateEnvelope>;
}

mod client;
mod dns;
mod dns_cf;
mod dns_do;

pub use client::{directory_url, AcmeClient};
pub use dns::{new_dns_task, DnsProvider};
