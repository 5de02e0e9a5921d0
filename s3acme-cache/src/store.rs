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

use super::{
    AccountRecord, AccountRegistrar, CertificateEnvelope,
    CertificateRequester, CertificateValidator, Error, Result, LOG_TARGET,
};
use s3acme_storage::BlobStore;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Storage name of the account record
pub static USER_NAME: &str = "user.json";

/// Account and certificate cache of one storage prefix
pub struct DomainStore {
    store: Arc<dyn BlobStore>,
}

impl DomainStore {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self { store }
    }

    /// Loads the stored account record.
    /// A missing, unreadable or malformed document is `None`,
    /// a key which can not be restored is an error.
    pub async fn load_account(&self) -> Result<Option<AccountRecord>> {
        let data = match self.store.get(USER_NAME).await {
            Ok(data) => data,
            Err(e) => {
                if !e.is_not_found() {
                    warn!(
                        target: LOG_TARGET,
                        error = %e,
                        "load account fail, treat it as absent"
                    );
                }
                return Ok(None);
            },
        };
        match AccountRecord::decode(&data) {
            Ok(record) => Ok(Some(record)),
            Err(e @ Error::Json { .. }) => {
                warn!(
                    target: LOG_TARGET,
                    error = %e,
                    "account document is malformed, treat it as absent"
                );
                Ok(None)
            },
            Err(e) => Err(e),
        }
    }

    /// Returns the account to use, registering it when necessary.
    ///
    /// The registrar is called exactly once. The record is only written
    /// if nothing was stored before or the registration url changed.
    pub async fn get_or_register(
        &self,
        registrar: &dyn AccountRegistrar,
    ) -> Result<AccountRecord> {
        let existing = self.load_account().await?;
        let prior_uri = existing
            .as_ref()
            .map(|record| record.registration_uri().map(str::to_string));

        let Some(record) = registrar.register(existing).await? else {
            return Err(Error::InvalidUser);
        };

        let changed = match &prior_uri {
            None => true,
            Some(Some(prior)) => record
                .registration_uri()
                .is_some_and(|uri| uri != prior.as_str()),
            Some(None) => false,
        };
        if changed {
            let data = record.encode()?;
            self.store
                .put(USER_NAME, &data)
                .await
                .map_err(|e| Error::Storage { source: e })?;
            info!(
                target: LOG_TARGET,
                email = record.email,
                uri = record.registration_uri().unwrap_or_default(),
                "save account"
            );
        }
        Ok(record)
    }

    async fn load_envelope(&self, name: &str) -> Option<CertificateEnvelope> {
        let data = match self.store.get(name).await {
            Ok(data) => data,
            Err(e) => {
                if !e.is_not_found() {
                    warn!(
                        target: LOG_TARGET,
                        error = %e,
                        name,
                        "load certificate fail, treat it as absent"
                    );
                }
                return None;
            },
        };
        CertificateEnvelope::decode(&data)
            .map_err(|e| {
                warn!(
                    target: LOG_TARGET,
                    error = %e,
                    name,
                    "certificate document is malformed, treat it as absent"
                );
            })
            .ok()
    }

    /// Returns the stored certificate of the domains while the validator
    /// accepts it, otherwise requests a new one and stores it.
    ///
    /// Nothing is written if the request fails.
    pub async fn get_or_create(
        &self,
        domains: &[String],
        validator: &dyn CertificateValidator,
        requester: &dyn CertificateRequester,
    ) -> Result<CertificateEnvelope> {
        let Some(primary) = domains.first() else {
            return Err(Error::EmptyDomainList);
        };
        let name = CertificateEnvelope::storage_name(primary);

        if let Some(envelope) = self.load_envelope(&name).await {
            if validator.is_valid(&envelope.certs)? {
                info!(
                    target: LOG_TARGET,
                    domain = primary,
                    "use the stored certificate"
                );
                return Ok(envelope);
            }
        }

        info!(
            target: LOG_TARGET,
            domains = domains.join(","),
            "request a new certificate"
        );
        let envelope = requester.request(domains).await?;
        let data = envelope.encode()?;
        self.store.put(&name, &data).await.map_err(|e| {
            error!(
                target: LOG_TARGET,
                error = %e,
                name,
                "save certificate fail"
            );
            Error::Storage { source: e }
        })?;
        info!(target: LOG_TARGET, name, "save certificate");
        Ok(envelope)
    }

    /// Names of everything stored under the prefix
    pub async fn list(&self) -> Result<Vec<String>> {
        self.store
            .list()
            .await
            .map_err(|e| Error::Storage { source: e })
    }
}
