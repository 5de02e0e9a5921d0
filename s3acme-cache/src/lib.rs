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

//! Idempotent account and certificate cache on top of a blob store.
//!
//! The account record lives in `user.json`, the certificate of a domain list
//! in `<primary domain>.pem`. Both are only written when something changed,
//! so running the same check repeatedly is cheap and safe as long as two
//! runs never overlap.

use async_trait::async_trait;
use snafu::Snafu;

mod account;
mod envelope;
mod store;

pub static LOG_TARGET: &str = "s3acme::cache";

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Storage error {source}"))]
    Storage { source: s3acme_storage::Error },
    #[snafu(display("Json error {source}, {name}"))]
    Json {
        source: serde_json::Error,
        name: String,
    },
    #[snafu(display("Base64 decode error {source}, {name}"))]
    Base64 {
        source: base64::DecodeError,
        name: String,
    },
    #[snafu(display("Account key decode error {message}"))]
    KeyDecode { message: String },
    #[snafu(display("Registration returned no account"))]
    InvalidUser,
    #[snafu(display("Domain list is empty"))]
    EmptyDomainList,
    #[snafu(display("Registration error {message}"))]
    Registration { message: String },
    #[snafu(display("Request certificate error {message}"))]
    Request { message: String },
    #[snafu(display("Validate certificate error {message}"))]
    Validate { message: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Establishes the account before a certificate can be requested.
#[async_trait]
pub trait AccountRegistrar: Send + Sync {
    /// Receives the stored record (if any) and returns the record to use.
    /// The key of an existing record must be kept.
    async fn register(
        &self,
        existing: Option<AccountRecord>,
    ) -> Result<Option<AccountRecord>>;
}

/// Decides whether a stored certificate chain can still be used.
pub trait CertificateValidator: Send + Sync {
    /// `Ok(false)` asks for a new certificate, an error aborts.
    fn is_valid(&self, certs: &[u8]) -> Result<bool>;
}

/// Obtains a fresh key and certificate chain for the domains.
#[async_trait]
pub trait CertificateRequester: Send + Sync {
    async fn request(&self, domains: &[String]) -> Result<CertificateEnvelope>;
}

pub use account::{AccountKey, AccountRecord, Registration};
pub use envelope::CertificateEnvelope;
pub use store::{DomainStore, USER_NAME};
