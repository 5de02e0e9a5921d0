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

use snafu::Snafu;
use std::sync::LazyLock;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;
use x509_parser::pem::Pem;

pub static LOG_TARGET: &str = "s3acme::certificate";

/// Number of seconds in a day
const SECONDS_PER_DAY: i64 = 24 * 3600;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("X509 error, category: {category}, {message}"))]
    X509 { category: String, message: String },
    #[snafu(display("Invalid error, category: {category}, {message}"))]
    Invalid { message: String, category: String },
    #[snafu(display(
        "certificate bundle of {domain} starts with a CA certificate"
    ))]
    CaCertificate { domain: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Seconds since the unix epoch
pub fn now_sec() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

/// The leaf of a certificate chain
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Certificate {
    /// Unix timestamp when the certificate expires
    pub not_after: i64,
    /// Distinguished name of the issuer
    pub issuer: String,
    /// Basic constraints mark it as a certificate authority
    pub is_ca: bool,
}

/// Parses the first certificate of a PEM chain (leaf first).
pub fn parse_leaf_certificate(chain: &[u8]) -> Result<Certificate> {
    let pem = Pem::iter_from_buffer(chain)
        .next()
        .ok_or_else(|| Error::Invalid {
            category: "certificate".to_string(),
            message: "no certificate in pem data".to_string(),
        })?
        .map_err(|e| Error::X509 {
            category: "parse_x509_pem".to_string(),
            message: e.to_string(),
        })?;
    let x509 = pem.parse_x509().map_err(|e| Error::X509 {
        category: "parse_x509".to_string(),
        message: e.to_string(),
    })?;

    let validity = x509.validity();

    Ok(Certificate {
        not_after: validity.not_after.timestamp(),
        issuer: x509.issuer().to_string(),
        is_ca: x509.is_ca(),
    })
}

impl Certificate {
    /// Extracts the common name from the issuer field
    pub fn get_issuer_common_name(&self) -> String {
        static CN_REGEX: LazyLock<Option<regex::Regex>> = LazyLock::new(|| {
            regex::Regex::new(r"CN=(?P<CN>[\S ]+?)($|,)").ok()
        });
        let Some(regex) = CN_REGEX.as_ref() else {
            return "".to_string();
        };

        regex
            .captures(&self.issuer)
            .and_then(|caps| caps.name("CN"))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default()
    }
    /// Whole days left until `not_after`, rounded down,
    /// so an expired certificate is always negative.
    pub fn days_remaining(&self, now: i64) -> i64 {
        (self.not_after - now).div_euclid(SECONDS_PER_DAY)
    }
    /// Whether the certificate has to be renewed, it has to be
    /// if no more than `threshold_days` remain.
    /// A CA certificate in leaf position is an error.
    pub fn need_renewal(
        &self,
        domain: &str,
        threshold_days: u32,
        now: i64,
    ) -> Result<bool> {
        if self.is_ca {
            return Err(Error::CaCertificate {
                domain: domain.to_string(),
            });
        }
        let days = self.days_remaining(now);
        if days > i64::from(threshold_days) {
            info!(
                target: LOG_TARGET,
                domain,
                days,
                threshold_days,
                issuer = self.get_issuer_common_name(),
                "certificate is still valid, no renewal"
            );
            return Ok(false);
        }
        info!(
            target: LOG_TARGET,
            domain, days, threshold_days, "certificate needs renewal"
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::{now_sec, parse_leaf_certificate, Error, SECONDS_PER_DAY};
    use pretty_assertions::assert_eq;

    fn new_pem(days: i64, ca: bool) -> String {
        let mut params = rcgen::CertificateParams::new(vec![
            "example.com".to_string(),
            "www.example.com".to_string(),
        ])
        .unwrap();
        let now = time::OffsetDateTime::now_utc();
        params.not_after = now + time::Duration::days(days);
        params.not_before = params.not_after - time::Duration::days(90);
        if ca {
            params.is_ca =
                rcgen::IsCa::Ca(rcgen::BasicConstraints::Unconstrained);
        }
        let key = rcgen::KeyPair::generate().unwrap();
        params.self_signed(&key).unwrap().pem()
    }

    #[test]
    fn test_parse_leaf_certificate() {
        // spellchecker:off
        let pem = r###"-----BEGIN CERTIFICATE-----
MIID/TCCAmWgAwIBAgIQJUGCkB1VAYha6fGExkx0KTANBgkqhkiG9w0BAQsFADBV
MR4wHAYDVQQKExVta2NlcnQgZGV2ZWxvcG1lbnQgQ0ExFTATBgNVBAsMDHZpY2Fu
c29AdHJlZTEcMBoGA1UEAwwTbWtjZXJ0IHZpY2Fuc29AdHJlZTAeFw0yNDA3MDYw
MjIzMzZaFw0yNjEwMDYwMjIzMzZaMEAxJzAlBgNVBAoTHm1rY2VydCBkZXZlbG9w
bWVudCBjZXJ0aWZpY2F0ZTEVMBMGA1UECwwMdmljYW5zb0B0cmVlMIIBIjANBgkq
hkiG9w0BAQEFAAOCAQ8AMIIBCgKCAQEAv5dbylSPQNARrpT/Rn7qZf6JmH3cueMp
YdOpctuPYeefT0Jdgp67bg17fU5pfyR2BWYdwyvHCNmKqLdYPx/J69hwTiVFMOcw
lVQJjbzSy8r5r2cSBMMsRaAZopRDnPy7Ls7Ji+AIT4vshUgL55eR7ACuIJpdtUYm
TzMx9PTA0BUDkit6z7bTMaEbjDmciIBDfepV4goHmvyBJoYMIjnAwnTFRGRs/QJN
d2ikFq999fRINzTDbRDP1K0Kk6+zYoFAiCMs9lEDymu3RmiWXBXpINR/Sv8CXtz2
9RTVwTkjyiMOPY99qBfaZTiy+VCjcwTGKPyus1axRMff4xjgOBewOwIDAQABo14w
XDAOBgNVHQ8BAf8EBAMCBaAwEwYDVR0lBAwwCgYIKwYBBQUHAwEwHwYDVR0jBBgw
FoAUhU5Igu3uLUabIqUhUpVXjk1JVtkwFAYDVR0RBA0wC4IJcGluZ2FwLmlvMA0G
CSqGSIb3DQEBCwUAA4IBgQDBimRKrqnEG65imKriM2QRCEfdB6F/eP9HYvPswuAP
tvQ6m19/74qbtkd6vjnf6RhMbj9XbCcAJIhRdnXmS0vsBrLDsm2q98zpg6D04F2E
L++xTiKU6F5KtejXcTHHe23ZpmD2XilwcVDeGFu5BEiFoRH9dmqefGZn3NIwnIeD
Yi31/cL7BoBjdWku5Qm2nCSWqy12ywbZtQCbgbzb8Me5XZajeGWKb8r6D0Nb+9I9
OG7dha1L3kxerI5VzVKSiAdGU0C+WcuxfsKAP8ajb1TLOlBaVyilfqmiF457yo/2
PmTYzMc80+cQWf7loJPskyWvQyfmAnSUX0DI56avXH8LlQ57QebllOtKgMiCo7cr
CCB2C+8hgRNG9ZmW1KU8rxkzoddHmSB8d6+vFqOajxGdyOV+aX00k3w6FgtHOoKD
Ztdj1N0eTfn02pibVcXXfwESPUzcjERaMAGg1hoH1F4Gxg0mqmbySAuVRqNLnXp5
CRVQZGgOQL6WDg3tUUDXYOs=
-----END CERTIFICATE-----"###;
        // spellchecker:on
        let cert = parse_leaf_certificate(pem.as_bytes()).unwrap();

        assert_eq!(
            "O=mkcert development CA, OU=vicanso@tree, CN=mkcert vicanso@tree",
            cert.issuer
        );
        assert_eq!(1791253416, cert.not_after);
        assert_eq!(false, cert.is_ca);
        assert_eq!("mkcert vicanso@tree", cert.get_issuer_common_name());

        // one day before expiry
        assert_eq!(1, cert.days_remaining(1791253416 - SECONDS_PER_DAY));
        assert_eq!(
            false,
            cert.need_renewal("pingap.io", 0, 1791253416 - SECONDS_PER_DAY)
                .unwrap()
        );
        assert_eq!(
            true,
            cert.need_renewal("pingap.io", 1, 1791253416 - SECONDS_PER_DAY)
                .unwrap()
        );
    }

    #[test]
    fn test_parse_invalid_certificate() {
        assert!(parse_leaf_certificate(b"").is_err());
        assert!(parse_leaf_certificate(b"not a certificate").is_err());
        assert!(parse_leaf_certificate(
            b"-----BEGIN CERTIFICATE-----\nAAAA\n-----END CERTIFICATE-----\n"
        )
        .is_err());
    }

    #[test]
    fn test_chain_uses_leaf() {
        let leaf = new_pem(100, false);
        let ca = new_pem(1000, true);
        let chain = format!("{leaf}\n{ca}");
        let cert = parse_leaf_certificate(chain.as_bytes()).unwrap();
        assert_eq!(false, cert.is_ca);
        let only_leaf = parse_leaf_certificate(leaf.as_bytes()).unwrap();
        assert_eq!(only_leaf, cert);
    }

    #[test]
    fn test_need_renewal_threshold() {
        let cert = parse_leaf_certificate(new_pem(100, false).as_bytes())
            .unwrap();
        let not_after = cert.not_after;

        // 16 whole days left
        let now = not_after - 16 * SECONDS_PER_DAY;
        assert_eq!(16, cert.days_remaining(now));
        assert_eq!(false, cert.need_renewal("example.com", 15, now).unwrap());

        // one second short of 16 days is 15 days
        let now = not_after - 16 * SECONDS_PER_DAY + 1;
        assert_eq!(15, cert.days_remaining(now));
        assert_eq!(true, cert.need_renewal("example.com", 15, now).unwrap());

        let now = not_after - 5 * SECONDS_PER_DAY;
        assert_eq!(true, cert.need_renewal("example.com", 15, now).unwrap());

        // expired
        let now = not_after + 1;
        assert_eq!(-1, cert.days_remaining(now));
        assert_eq!(true, cert.need_renewal("example.com", 0, now).unwrap());

        assert_eq!(
            false,
            cert.need_renewal("example.com", 15, now_sec()).unwrap()
        );
    }

    #[test]
    fn test_ca_certificate() {
        let cert =
            parse_leaf_certificate(new_pem(100, true).as_bytes()).unwrap();
        assert_eq!(true, cert.is_ca);
        let err = cert
            .need_renewal("example.com", 15, now_sec())
            .unwrap_err();
        assert!(matches!(err, Error::CaCertificate { .. }));
        assert_eq!(
            "certificate bundle of example.com starts with a CA certificate",
            err.to_string()
        );
    }
}
