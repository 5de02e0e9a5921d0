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

use super::dns::find_zone;
use super::{AcmeDnsTask, Error, Result, LOG_TARGET};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{error, info};

// cloudflare accepts 60 as the lowest ttl of the free plan
const RECORD_TTL: u32 = 60;

#[derive(Deserialize, Debug)]
struct ApiResponse<T> {
    success: bool,
    result: T,
    #[serde(default)]
    errors: Vec<serde_json::Value>,
}
#[derive(Deserialize, Debug)]
struct Zone {
    id: String,
    name: String,
}
#[derive(Deserialize, Debug)]
struct DnsRecord {
    id: String,
}

fn new_error(err: impl ToString) -> Error {
    Error::Fail {
        category: "cloudflare".to_string(),
        message: err.to_string(),
    }
}

/// Unwraps the `result` of the cloudflare api envelope
async fn read_result<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.map_err(new_error)?;
        return Err(new_error(format!("API Error: {status} - {body}")));
    }
    let body: ApiResponse<T> = response.json().await.map_err(new_error)?;
    if !body.success {
        return Err(new_error(format!("API returned failure: {:?}", body.errors)));
    }
    Ok(body.result)
}

/// Zone id and record id of an added record
struct CfRecord {
    zone_id: String,
    record_id: String,
}

pub(crate) struct CfDnsTask {
    client: reqwest::Client,
    endpoint: String,
    api_token: String,
    records: Mutex<Vec<CfRecord>>,
}

impl CfDnsTask {
    pub fn new(endpoint: &str, api_token: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.to_string(),
            api_token: api_token.to_string(),
            records: Mutex::new(vec![]),
        }
    }
    fn zones_url(&self) -> String {
        format!("{}/client/v4/zones", self.endpoint)
    }
    /// Finds the zone holding the record name among the zones of the token
    async fn get_zone_id(&self, record_name: &str) -> Result<String> {
        let response = self
            .client
            .get(self.zones_url())
            .query(&[("per_page", "50")])
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(new_error)?;
        let zones: Vec<Zone> = read_result(response).await?;
        let name =
            find_zone(zones.iter().map(|zone| zone.name.as_str()), record_name)
                .ok_or_else(|| {
                    new_error(format!("not found zone for '{record_name}'"))
                })?;
        zones
            .iter()
            .find(|zone| zone.name == name)
            .map(|zone| zone.id.clone())
            .ok_or_else(|| new_error(format!("not found zone id of '{name}'")))
    }
    async fn delete_record(&self, record: &CfRecord) -> Result<()> {
        let url = format!(
            "{}/{}/dns_records/{}",
            self.zones_url(),
            record.zone_id,
            record.record_id
        );
        let response = self
            .client
            .delete(url)
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(new_error)?;
        let _: serde_json::Value = read_result(response).await?;
        Ok(())
    }
}

#[async_trait]
impl AcmeDnsTask for CfDnsTask {
    async fn add_txt_record(&self, name: &str, value: &str) -> Result<()> {
        let zone_id = self.get_zone_id(name).await?;
        let url = format!("{}/{zone_id}/dns_records", self.zones_url());
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_token)
            .json(&serde_json::json!({
                "type": "TXT",
                "name": name,
                "content": value,
                "ttl": RECORD_TTL,
            }))
            .send()
            .await
            .map_err(new_error)?;
        let record: DnsRecord = read_result(response).await?;
        info!(
            target: LOG_TARGET,
            name,
            record_id = %record.id,
            "add cloudflare txt record"
        );
        self.records.lock().await.push(CfRecord {
            zone_id,
            record_id: record.id,
        });
        Ok(())
    }
    async fn done(&self) -> Result<()> {
        let mut records = self.records.lock().await;
        let mut last_error = None;
        for record in records.drain(..) {
            if let Err(e) = self.delete_record(&record).await {
                error!(
                    target: LOG_TARGET,
                    error = %e,
                    record_id = %record.record_id,
                    "delete cloudflare txt record fail"
                );
                last_error = Some(e);
            }
        }
        match last_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
