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

use super::{Error, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use p256::pkcs8::EncodePrivateKey;
use serde::{Deserialize, Serialize};
use std::fmt;

const CATEGORY_ACCOUNT: &str = "account";

/// Converts a SEC1 `EC PRIVATE KEY` of the P-256 curve to PKCS#8,
/// older documents keep the account key in this form.
fn sec1_to_pkcs8(der: &[u8]) -> Option<Vec<u8>> {
    let secret = p256::SecretKey::from_sec1_der(der).ok()?;
    let document = secret.to_pkcs8_der().ok()?;
    Some(document.as_bytes().to_vec())
}

/// PKCS#8 DER encoded private key of the acme account.
#[derive(Clone, PartialEq, Eq)]
pub struct AccountKey(Vec<u8>);

impl AccountKey {
    /// Checks that the bytes hold a usable private key,
    /// a SEC1 encoded key is converted to PKCS#8.
    pub fn decode(der: &[u8]) -> Result<Self> {
        let der = match rcgen::KeyPair::try_from(der) {
            Ok(_) => der.to_vec(),
            Err(e) => sec1_to_pkcs8(der).ok_or_else(|| Error::KeyDecode {
                message: e.to_string(),
            })?,
        };
        rcgen::KeyPair::try_from(der.as_slice()).map_err(|e| {
            Error::KeyDecode {
                message: e.to_string(),
            }
        })?;
        Ok(Self(der))
    }
    pub fn as_der(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for AccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountKey({} bytes)", self.0.len())
    }
}

/// Registration handle returned by the certificate authority
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Registration {
    /// Account object as returned by the authority
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub body: serde_json::Value,
    /// Url of the account
    #[serde(default)]
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AccountRecord {
    pub email: String,
    pub key: AccountKey,
    pub registration: Option<Registration>,
}

/// Stored layout, the key is kept as base64 of its der bytes
#[derive(Serialize, Deserialize)]
struct AccountDocument {
    #[serde(rename = "Email", default)]
    email: String,
    #[serde(rename = "Registration", default)]
    registration: Option<Registration>,
    #[serde(rename = "Key", default)]
    key: String,
}

impl AccountRecord {
    pub fn new(
        email: &str,
        key: AccountKey,
        registration: Option<Registration>,
    ) -> Self {
        Self {
            email: email.to_string(),
            key,
            registration,
        }
    }
    pub fn registration_uri(&self) -> Option<&str> {
        self.registration.as_ref().map(|item| item.uri.as_str())
    }
    pub fn encode(&self) -> Result<Vec<u8>> {
        let doc = AccountDocument {
            email: self.email.clone(),
            registration: self.registration.clone(),
            key: STANDARD.encode(self.key.as_der()),
        };
        serde_json::to_vec(&doc).map_err(|e| Error::Json {
            source: e,
            name: CATEGORY_ACCOUNT.to_string(),
        })
    }
    /// Malformed json is `Error::Json`, a key that can not be
    /// restored is `Error::Base64` or `Error::KeyDecode`.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let doc: AccountDocument =
            serde_json::from_slice(data).map_err(|e| Error::Json {
                source: e,
                name: CATEGORY_ACCOUNT.to_string(),
            })?;
        let der = STANDARD.decode(doc.key.as_bytes()).map_err(|e| {
            Error::Base64 {
                source: e,
                name: CATEGORY_ACCOUNT.to_string(),
            }
        })?;
        Ok(Self {
            email: doc.email,
            key: AccountKey::decode(&der)?,
            registration: doc.registration,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{AccountKey, AccountRecord, Registration};
    use crate::Error;
    use base64::{engine::general_purpose::STANDARD, Engine};
    use pretty_assertions::assert_eq;

    fn new_key() -> AccountKey {
        let key_pair = rcgen::KeyPair::generate().unwrap();
        AccountKey::decode(&key_pair.serialize_der()).unwrap()
    }

    #[test]
    fn test_account_record_round_trip() {
        let record = AccountRecord::new(
            "admin@example.com",
            new_key(),
            Some(Registration {
                body: serde_json::json!({
                    "status": "valid",
                    "contact": ["mailto:admin@example.com"],
                }),
                uri: "https://acme.test/acct/1".to_string(),
            }),
        );
        let data = record.encode().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&data).unwrap();
        assert_eq!("admin@example.com", value["Email"]);
        assert_eq!("https://acme.test/acct/1", value["Registration"]["uri"]);
        assert!(value["Key"].is_string());

        let decoded = AccountRecord::decode(&data).unwrap();
        assert_eq!(record.key.as_der(), decoded.key.as_der());
        assert_eq!(record, decoded);
        assert_eq!(Some("https://acme.test/acct/1"), decoded.registration_uri());
    }

    #[test]
    fn test_account_record_without_registration() {
        let record = AccountRecord::new("admin@example.com", new_key(), None);
        let data = record.encode().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&data).unwrap();
        assert!(value["Registration"].is_null());
        let decoded = AccountRecord::decode(&data).unwrap();
        assert_eq!(None, decoded.registration_uri());
        assert_eq!(record, decoded);
    }

    #[test]
    fn test_account_record_decode_error() {
        assert!(matches!(
            AccountRecord::decode(b"{").unwrap_err(),
            Error::Json { .. }
        ));
        assert!(matches!(
            AccountRecord::decode(br#"{"Email":"a@b.c","Key":"@@@"}"#)
                .unwrap_err(),
            Error::Base64 { .. }
        ));
        // valid base64 of bytes which are no private key
        assert!(matches!(
            AccountRecord::decode(br#"{"Email":"a@b.c","Key":"AQIDBA=="}"#)
                .unwrap_err(),
            Error::KeyDecode { .. }
        ));
    }

    #[test]
    fn test_decode_sec1_account_key() {
        // layout and key encoding of documents written by earlier tools
        let sec1 = "MHcCAQEEINN7qQSr4avsuTnksjzOvtzObddUMjXBb1+nkfE0gavHoAoGCCqGSM49AwEHoUQDQgAEOiBRU6u+zTdBEoi+5z44pJy1+Vl/vr/xiYlIB1DUv0dNUoamlWVWKfvDosVkbvkaa5tx89hnfRfPLNwsOMVUQA==";
        let data = format!(
            r#"{{"Email":"admin@example.com","Registration":{{"body":{{"status":"valid","contact":["mailto:admin@example.com"]}},"uri":"https://acme-v02.api.letsencrypt.org/acme/acct/123"}},"Key":"{sec1}"}}"#
        );
        let record = AccountRecord::decode(data.as_bytes()).unwrap();
        assert_eq!("admin@example.com", record.email);
        assert_eq!(
            Some("https://acme-v02.api.letsencrypt.org/acme/acct/123"),
            record.registration_uri()
        );

        // the key is kept as pkcs8 of the same key pair
        let key_pair =
            rcgen::KeyPair::try_from(record.key.as_der()).unwrap();
        let sec1_der = STANDARD.decode(sec1).unwrap();
        assert_eq!(
            &sec1_der[sec1_der.len() - 65..],
            key_pair.public_key_raw()
        );
        assert_eq!(record, AccountRecord::decode(&record.encode().unwrap()).unwrap());
    }

    #[test]
    fn test_account_key_debug() {
        let key = new_key();
        assert_eq!(
            format!("AccountKey({} bytes)", key.as_der().len()),
            format!("{key:?}")
        );
    }
}
