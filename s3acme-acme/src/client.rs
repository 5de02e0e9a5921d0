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

use super::{AcmeDnsTask, Error, IssuanceAuthority, Result, LOG_TARGET};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine};
use instant_acme::{
    Account, AccountCredentials, AuthorizationStatus, ChallengeType,
    Identifier, Key, LetsEncrypt, NewAccount, NewOrder, Order, OrderStatus,
    RetryPolicy,
};
use rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};
use s3acme_cache::{
    AccountKey, AccountRecord, CertificateEnvelope, Registration,
};
use std::sync::Once;
use std::time::Duration;
use tracing::{error, info};

static CHALLENGE_PREFIX: &str = "_acme-challenge";

// Initialize crypto provider once
static INIT: Once = Once::new();

fn ensure_crypto_provider() {
    INIT.call_once(|| {
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    });
}

/// Directory url of let's encrypt, a custom url takes precedence.
pub fn directory_url(staging: bool, custom: Option<&str>) -> String {
    if let Some(url) = custom.filter(|url| !url.is_empty()) {
        return url.to_string();
    }
    if staging {
        LetsEncrypt::Staging.url().to_string()
    } else {
        LetsEncrypt::Production.url().to_string()
    }
}

fn instant_error(category: &str) -> impl FnOnce(instant_acme::Error) -> Error {
    let category = category.to_string();
    move |source| Error::Instant { category, source }
}

fn fail_error(category: &str, message: impl ToString) -> Error {
    Error::Fail {
        category: category.to_string(),
        message: message.to_string(),
    }
}

/// Extracts the pkcs8 der of the account key from the credentials.
fn account_key_from_credentials(
    credentials: &AccountCredentials,
) -> Result<AccountKey> {
    let value = serde_json::to_value(credentials)
        .map_err(|e| fail_error("account_credentials", e))?;
    let encoded = value
        .get("key_pkcs8")
        .and_then(|value| value.as_str())
        .ok_or_else(|| {
            fail_error("account_credentials", "key_pkcs8 is missing")
        })?;
    let der = general_purpose::URL_SAFE_NO_PAD
        .decode(encoded)
        .or_else(|_| general_purpose::STANDARD.decode(encoded))
        .map_err(|e| fail_error("account_credentials", e))?;
    AccountKey::decode(&der).map_err(|e| fail_error("account_key", e))
}

/// Rebuilds the credentials of a registered account for the directory.
fn restore_credentials(
    record: &AccountRecord,
    directory_url: &str,
) -> Result<AccountCredentials> {
    let Some(uri) = record.registration_uri().filter(|uri| !uri.is_empty())
    else {
        return Err(fail_error(
            "restore_account",
            format!("account of {} is not registered", record.email),
        ));
    };
    let value = serde_json::json!({
        "id": uri,
        "key_pkcs8": general_purpose::URL_SAFE_NO_PAD.encode(record.key.as_der()),
        "directory": directory_url,
    });
    serde_json::from_value(value).map_err(|e| fail_error("restore_account", e))
}

fn new_registration(email: &str, account: &Account) -> Registration {
    Registration {
        body: serde_json::json!({
            "status": "valid",
            "contact": [format!("mailto:{email}")],
            "termsOfServiceAgreed": true,
        }),
        uri: account.id().to_string(),
    }
}

/// The challenge record name of the authorized domain
fn challenge_record_name(domain: &str) -> String {
    let domain = domain.strip_prefix("*.").unwrap_or(domain);
    format!("{CHALLENGE_PREFIX}.{domain}")
}

fn dns_identifier(identifier: &Identifier) -> Result<String> {
    match identifier {
        Identifier::Dns(domain) => Ok(domain.to_string()),
        _ => Err(fail_error(
            "authorization",
            format!("unsupported identifier: {identifier:?}"),
        )),
    }
}

/// Acme client which proves the domain control by dns-01 challenges
pub struct AcmeClient {
    directory_url: String,
    dns: Box<dyn AcmeDnsTask>,
    dns_wait: Duration,
    timeout: Duration,
}

impl AcmeClient {
    pub fn new(
        directory_url: &str,
        dns: Box<dyn AcmeDnsTask>,
        dns_wait: Duration,
    ) -> Self {
        Self {
            directory_url: directory_url.to_string(),
            dns,
            dns_wait,
            timeout: Duration::from_secs(120),
        }
    }
    /// Publishes the txt record of every pending authorization,
    /// returns the count of published records.
    async fn publish_challenges(&self, order: &mut Order) -> Result<usize> {
        let mut count = 0;
        let mut authorizations = order.authorizations();
        while let Some(result) = authorizations.next().await {
            let mut authz = result.map_err(instant_error("authorizations"))?;
            match authz.status {
                AuthorizationStatus::Pending => {},
                AuthorizationStatus::Valid => continue,
                status => {
                    return Err(fail_error(
                        "authorizations",
                        format!("unexpected authorization status: {status:?}"),
                    ));
                },
            }
            let domain = dns_identifier(authz.identifier().identifier)?;
            let challenge =
                authz.challenge(ChallengeType::Dns01).ok_or_else(|| {
                    Error::NotFound {
                        message: format!("dns-01 challenge of {domain}"),
                    }
                })?;
            let name = challenge_record_name(&domain);
            self.dns
                .add_txt_record(&name, &challenge.key_authorization().dns_value())
                .await?;
            count += 1;
        }
        Ok(count)
    }
    /// Tells the authority every pending challenge can be validated
    async fn confirm_challenges(&self, order: &mut Order) -> Result<()> {
        let mut authorizations = order.authorizations();
        while let Some(result) = authorizations.next().await {
            let mut authz = result.map_err(instant_error("authorizations"))?;
            if !matches!(authz.status, AuthorizationStatus::Pending) {
                continue;
            }
            let mut challenge =
                authz.challenge(ChallengeType::Dns01).ok_or_else(|| {
                    Error::NotFound {
                        message: "dns-01 challenge".to_string(),
                    }
                })?;
            challenge
                .set_ready()
                .await
                .map_err(instant_error("set_challenge_ready"))?;
        }
        Ok(())
    }
    async fn issue(
        &self,
        domains: &[String],
        account: &Account,
    ) -> Result<CertificateEnvelope> {
        let identifiers = domains
            .iter()
            .map(|domain| Identifier::Dns(domain.to_owned()))
            .collect::<Vec<Identifier>>();
        let mut order = account
            .new_order(&NewOrder::new(&identifiers))
            .await
            .map_err(instant_error("new_order"))?;

        let count = self.publish_challenges(&mut order).await?;
        if count != 0 {
            info!(
                target: LOG_TARGET,
                count,
                wait = ?self.dns_wait,
                "wait for dns records to propagate"
            );
            tokio::time::sleep(self.dns_wait).await;
            self.confirm_challenges(&mut order).await?;
        }

        let retry = RetryPolicy::default().timeout(self.timeout);
        let status = order
            .poll_ready(&retry)
            .await
            .map_err(instant_error("poll_ready"))?;
        if status != OrderStatus::Ready {
            return Err(fail_error(
                "poll_ready",
                format!("unexpected order status: {status:?}"),
            ));
        }

        let private_key_pem =
            order.finalize().await.map_err(instant_error("finalize"))?;
        let cert_chain_pem = order
            .poll_certificate(&retry)
            .await
            .map_err(instant_error("poll_certificate"))?;
        Ok(CertificateEnvelope::new(
            private_key_pem.into_bytes(),
            cert_chain_pem.into_bytes(),
        ))
    }
}

#[async_trait]
impl IssuanceAuthority for AcmeClient {
    async fn register(&self, email: &str) -> Result<AccountRecord> {
        ensure_crypto_provider();
        let contact = format!("mailto:{email}");
        let (account, credentials) = Account::builder()
            .map_err(instant_error("create_account"))?
            .create(
                &NewAccount {
                    contact: &[contact.as_str()],
                    terms_of_service_agreed: true,
                    only_return_existing: false,
                },
                self.directory_url.clone(),
                None,
            )
            .await
            .map_err(instant_error("create_account"))?;
        let key = account_key_from_credentials(&credentials)?;
        info!(
            target: LOG_TARGET,
            email,
            uri = account.id(),
            "register acme account success"
        );
        Ok(AccountRecord::new(
            email,
            key,
            Some(new_registration(email, &account)),
        ))
    }
    async fn register_key(
        &self,
        email: &str,
        key: &AccountKey,
    ) -> Result<AccountRecord> {
        ensure_crypto_provider();
        let der = key.as_der().to_vec();
        let signer =
            Key::from_pkcs8_der(PrivatePkcs8KeyDer::from(der.as_slice()))
                .map_err(instant_error("account_key"))?;
        // new-account with a known key returns the account bound to it
        let (account, _) = Account::builder()
            .map_err(instant_error("create_account"))?
            .create_from_key(
                (signer, PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(der))),
                self.directory_url.clone(),
            )
            .await
            .map_err(instant_error("create_account"))?;
        info!(
            target: LOG_TARGET,
            email,
            uri = account.id(),
            "register stored acme account key success"
        );
        Ok(AccountRecord::new(
            email,
            key.clone(),
            Some(new_registration(email, &account)),
        ))
    }
    async fn request_certificate(
        &self,
        domains: &[String],
        account: &AccountRecord,
    ) -> Result<CertificateEnvelope> {
        ensure_crypto_provider();
        info!(
            target: LOG_TARGET,
            domains = domains.join(","),
            directory = self.directory_url,
            "request certificate from acme"
        );
        let credentials = restore_credentials(account, &self.directory_url)?;
        let account = Account::builder()
            .map_err(instant_error("restore_account"))?
            .from_credentials(credentials)
            .await
            .map_err(instant_error("restore_account"))?;

        let result = self.issue(domains, &account).await;
        // the txt records are removed whatever the order result is
        if let Err(e) = self.dns.done().await {
            error!(
                target: LOG_TARGET,
                error = %e,
                "clean up dns records fail"
            );
        }
        let envelope = result?;
        info!(
            target: LOG_TARGET,
            domains = domains.join(","),
            "certificate issued"
        );
        Ok(envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::{
        account_key_from_credentials, challenge_record_name, directory_url,
        restore_credentials, AcmeClient,
    };
    use crate::{AcmeDnsTask, IssuanceAuthority, Result};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use s3acme_cache::{AccountKey, AccountRecord, Registration};
    use std::time::Duration;

    struct NoopDnsTask;

    #[async_trait]
    impl AcmeDnsTask for NoopDnsTask {
        async fn add_txt_record(&self, _name: &str, _value: &str) -> Result<()> {
            Ok(())
        }
        async fn done(&self) -> Result<()> {
            Ok(())
        }
    }

    fn new_account_key() -> AccountKey {
        let key_pair = rcgen::KeyPair::generate().unwrap();
        AccountKey::decode(&key_pair.serialize_der()).unwrap()
    }

    #[test]
    fn test_directory_url() {
        assert_eq!(
            "https://acme-v02.api.letsencrypt.org/directory",
            directory_url(false, None)
        );
        assert_eq!(
            "https://acme-staging-v02.api.letsencrypt.org/directory",
            directory_url(true, None)
        );
        assert_eq!(
            "https://127.0.0.1:14000/dir",
            directory_url(true, Some("https://127.0.0.1:14000/dir"))
        );
        assert_eq!(
            "https://acme-v02.api.letsencrypt.org/directory",
            directory_url(false, Some(""))
        );
    }

    #[test]
    fn test_challenge_record_name() {
        assert_eq!(
            "_acme-challenge.example.com",
            challenge_record_name("example.com")
        );
        assert_eq!(
            "_acme-challenge.example.com",
            challenge_record_name("*.example.com")
        );
    }

    #[test]
    fn test_restore_credentials() {
        let key = new_account_key();
        let record = AccountRecord::new(
            "admin@example.com",
            key.clone(),
            Some(Registration {
                body: serde_json::Value::Null,
                uri: "https://acme.example.com/acct/1".to_string(),
            }),
        );
        let credentials =
            restore_credentials(&record, "https://acme.example.com/dir")
                .unwrap();
        assert_eq!(
            key.as_der(),
            account_key_from_credentials(&credentials).unwrap().as_der()
        );

        let value = serde_json::to_value(&credentials).unwrap();
        assert_eq!("https://acme.example.com/acct/1", value["id"]);
    }

    #[test]
    fn test_restore_unregistered_account() {
        let record =
            AccountRecord::new("admin@example.com", new_account_key(), None);
        let Err(err) =
            restore_credentials(&record, "https://acme.example.com/dir")
        else {
            panic!("unregistered account should not be restored");
        };
        assert_eq!(
            "ACME operation failed: account of admin@example.com is not registered, category: restore_account",
            err.to_string()
        );
    }

    #[tokio::test]
    async fn test_request_with_unregistered_account() {
        let client = AcmeClient::new(
            "https://127.0.0.1:1/dir",
            Box::new(NoopDnsTask),
            Duration::from_millis(1),
        );
        let record =
            AccountRecord::new("admin@example.com", new_account_key(), None);
        let result = client
            .request_certificate(&["example.com".to_string()], &record)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_register_key_without_directory() {
        let client = AcmeClient::new(
            "https://127.0.0.1:1/dir",
            Box::new(NoopDnsTask),
            Duration::from_millis(1),
        );
        let Err(err) = client
            .register_key("admin@example.com", &new_account_key())
            .await
        else {
            panic!("directory is not reachable");
        };
        assert!(err.to_string().contains("category: create_account"));
    }
}
