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

use super::dns::{find_zone, relative_name};
use super::{AcmeDnsTask, Error, Result, LOG_TARGET};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{error, info};

// short ttl, the record only lives during the challenge
const RECORD_TTL: u32 = 30;

#[derive(Deserialize, Debug)]
struct DomainList {
    #[serde(default)]
    domains: Vec<Domain>,
}
#[derive(Deserialize, Debug)]
struct Domain {
    name: String,
}
#[derive(Deserialize, Debug)]
struct DomainRecordResponse {
    domain_record: DomainRecord,
}
#[derive(Deserialize, Debug)]
struct DomainRecord {
    id: u64,
}

fn new_error(err: impl ToString) -> Error {
    Error::Fail {
        category: "digitalocean".to_string(),
        message: err.to_string(),
    }
}

async fn check_response(
    response: reqwest::Response,
) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.map_err(new_error)?;
    Err(new_error(format!("API Error: {status} - {body}")))
}

fn new_record_body(name: &str, value: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "TXT",
        "name": name,
        "data": value,
        "ttl": RECORD_TTL,
    })
}

/// Domain name and record id of an added record
struct DoRecord {
    domain: String,
    id: u64,
}

pub(crate) struct DoDnsTask {
    client: reqwest::Client,
    endpoint: String,
    api_token: String,
    records: Mutex<Vec<DoRecord>>,
}

impl DoDnsTask {
    pub fn new(endpoint: &str, api_token: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.to_string(),
            api_token: api_token.to_string(),
            records: Mutex::new(vec![]),
        }
    }
    /// Get the managed domain which holds the record name
    async fn get_domain(&self, record_name: &str) -> Result<String> {
        let url = format!("{}/v2/domains", self.endpoint);
        let response = self
            .client
            .get(url)
            .query(&[("per_page", "200")])
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(new_error)?;
        let list: DomainList = check_response(response)
            .await?
            .json()
            .await
            .map_err(new_error)?;
        find_zone(
            list.domains.iter().map(|domain| domain.name.as_str()),
            record_name,
        )
        .map(|name| name.to_string())
        .ok_or_else(|| new_error(format!("not found domain for '{record_name}'")))
    }
    async fn delete_record(&self, record: &DoRecord) -> Result<()> {
        let url = format!(
            "{}/v2/domains/{}/records/{}",
            self.endpoint, record.domain, record.id
        );
        let response = self
            .client
            .delete(url)
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(new_error)?;
        check_response(response).await?;
        Ok(())
    }
}

#[async_trait]
impl AcmeDnsTask for DoDnsTask {
    async fn add_txt_record(&self, name: &str, value: &str) -> Result<()> {
        let domain = self.get_domain(name).await?;
        let url = format!("{}/v2/domains/{domain}/records", self.endpoint);
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_token)
            .json(&new_record_body(&relative_name(name, &domain), value))
            .send()
            .await
            .map_err(new_error)?;
        let created: DomainRecordResponse = check_response(response)
            .await?
            .json()
            .await
            .map_err(new_error)?;
        let id = created.domain_record.id;
        info!(
            target: LOG_TARGET,
            name,
            domain = %domain,
            id,
            "add digitalocean txt record"
        );
        self.records.lock().await.push(DoRecord { domain, id });
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
                    domain = %record.domain,
                    id = record.id,
                    "delete digitalocean txt record fail"
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
