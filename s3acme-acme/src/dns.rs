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

use super::dns_cf::CfDnsTask;
use super::dns_do::DoDnsTask;
use super::{AcmeDnsTask, Error, Result};
use strum::{Display, EnumString};
use url::Url;

/// Dns providers which can publish the dns-01 challenge
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
#[strum(ascii_case_insensitive)]
pub enum DnsProvider {
    #[strum(to_string = "digitalocean", serialize = "do")]
    DigitalOcean,
    #[strum(to_string = "cloudflare", serialize = "cf")]
    Cloudflare,
}

impl DnsProvider {
    fn default_endpoint(&self) -> &'static str {
        match self {
            DnsProvider::DigitalOcean => "https://api.digitalocean.com",
            DnsProvider::Cloudflare => "https://api.cloudflare.com",
        }
    }
}

/// Creates the dns task of the provider, authenticated by the api token.
/// The endpoint is only set to reach a non default api address.
pub fn new_dns_task(
    provider: DnsProvider,
    api_token: &str,
    endpoint: Option<&str>,
) -> Result<Box<dyn AcmeDnsTask>> {
    if api_token.is_empty() {
        return Err(Error::Fail {
            category: provider.to_string(),
            message: "token is required".to_string(),
        });
    }
    let endpoint = endpoint.unwrap_or(provider.default_endpoint());
    let endpoint = Url::parse(endpoint)
        .map_err(|e| Error::Fail {
            category: provider.to_string(),
            message: e.to_string(),
        })?
        .origin()
        .ascii_serialization();
    let task: Box<dyn AcmeDnsTask> = match provider {
        DnsProvider::DigitalOcean => Box::new(DoDnsTask::new(&endpoint, api_token)),
        DnsProvider::Cloudflare => Box::new(CfDnsTask::new(&endpoint, api_token)),
    };
    Ok(task)
}

/// Finds the zone of the record name, the longest zone wins.
pub(crate) fn find_zone<'a>(
    zones: impl IntoIterator<Item = &'a str>,
    name: &str,
) -> Option<&'a str> {
    let name = name.trim_end_matches('.');
    zones
        .into_iter()
        .filter(|zone| {
            let zone = zone.trim_end_matches('.');
            name == zone
                || name
                    .strip_suffix(zone)
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
        .max_by_key(|zone| zone.len())
}

/// The record name relative to its zone, `@` for the apex.
pub(crate) fn relative_name(name: &str, zone: &str) -> String {
    let name = name.trim_end_matches('.');
    let zone = zone.trim_end_matches('.');
    if name == zone {
        return "@".to_string();
    }
    name.strip_suffix(zone)
        .and_then(|prefix| prefix.strip_suffix('.'))
        .unwrap_or(name)
        .to_string()
}
