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

//! One check-and-refresh pass: reuse the stored certificate while it is
//! valid, otherwise make sure the account is registered and issue a new one.

use async_trait::async_trait;
use s3acme_acme::IssuanceAuthority;
use s3acme_cache::{
    AccountRecord, AccountRegistrar, CertificateEnvelope, CertificateRequester,
    CertificateValidator, DomainStore, Error as CacheError,
    Result as CacheResult,
};
use s3acme_certificate::{now_sec, parse_leaf_certificate};
use tracing::{info, warn};

static LOG_TARGET: &str = "s3acme::lifecycle";

/// Accepts a stored chain while more than `threshold_days` remain.
pub struct RenewalPolicy {
    domain: String,
    threshold_days: u32,
}

impl RenewalPolicy {
    pub fn new(domain: &str, threshold_days: u32) -> Self {
        Self {
            domain: domain.to_string(),
            threshold_days,
        }
    }
}

impl CertificateValidator for RenewalPolicy {
    fn is_valid(&self, certs: &[u8]) -> CacheResult<bool> {
        let certificate = match parse_leaf_certificate(certs) {
            Ok(certificate) => certificate,
            Err(e) => {
                warn!(
                    target: LOG_TARGET,
                    error = %e,
                    domain = self.domain,
                    "parse stored certificate fail, renew it"
                );
                return Ok(false);
            },
        };
        let renew = certificate
            .need_renewal(&self.domain, self.threshold_days, now_sec())
            .map_err(|e| CacheError::Validate {
                message: e.to_string(),
            })?;
        Ok(!renew)
    }
}

/// Registers a new account only when nothing is stored,
/// a stored account is always reused with its key, and one
/// without registration is registered again with that key.
struct AuthorityRegistrar<'a> {
    email: &'a str,
    authority: &'a dyn IssuanceAuthority,
}

#[async_trait]
impl AccountRegistrar for AuthorityRegistrar<'_> {
    async fn register(
        &self,
        existing: Option<AccountRecord>,
    ) -> CacheResult<Option<AccountRecord>> {
        if let Some(record) = existing {
            if record.registration.is_none() {
                info!(
                    target: LOG_TARGET,
                    email = %record.email,
                    "register stored account key"
                );
                let record = self
                    .authority
                    .register_key(&record.email, &record.key)
                    .await
                    .map_err(|e| CacheError::Registration {
                        message: e.to_string(),
                    })?;
                return Ok(Some(record));
            }
            if record.email != self.email {
                warn!(
                    target: LOG_TARGET,
                    stored = %record.email,
                    email = self.email,
                    "email differs from the stored account, keep the stored one"
                );
            }
            return Ok(Some(record));
        }
        info!(target: LOG_TARGET, email = self.email, "register new account");
        let record = self.authority.register(self.email).await.map_err(|e| {
            CacheError::Registration {
                message: e.to_string(),
            }
        })?;
        Ok(Some(record))
    }
}

struct AuthorityRequester<'a> {
    store: &'a DomainStore,
    registrar: AuthorityRegistrar<'a>,
    authority: &'a dyn IssuanceAuthority,
}

#[async_trait]
impl CertificateRequester for AuthorityRequester<'_> {
    async fn request(&self, domains: &[String]) -> CacheResult<CertificateEnvelope> {
        let account = self.store.get_or_register(&self.registrar).await?;
        self.authority
            .request_certificate(domains, &account)
            .await
            .map_err(|e| CacheError::Request {
                message: e.to_string(),
            })
    }
}

pub struct Lifecycle {
    store: DomainStore,
    authority: Box<dyn IssuanceAuthority>,
    email: String,
    renew_days: u32,
}

impl Lifecycle {
    pub fn new(
        store: DomainStore,
        authority: Box<dyn IssuanceAuthority>,
        email: &str,
        renew_days: u32,
    ) -> Self {
        Self {
            store,
            authority,
            email: email.to_string(),
            renew_days,
        }
    }
    /// Returns the certificate of the domains, issued only if the stored one
    /// is missing or due for renewal.
    pub async fn run(
        &self,
        domains: &[String],
    ) -> CacheResult<CertificateEnvelope> {
        let Some(primary) = domains.first() else {
            return Err(CacheError::EmptyDomainList);
        };
        let validator = RenewalPolicy::new(primary, self.renew_days);
        let requester = AuthorityRequester {
            store: &self.store,
            registrar: AuthorityRegistrar {
                email: &self.email,
                authority: self.authority.as_ref(),
            },
            authority: self.authority.as_ref(),
        };
        self.store
            .get_or_create(domains, &validator, &requester)
            .await
    }
}
