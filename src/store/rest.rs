use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::header::ACCEPT;
use reqwest::{Client, Url};
use serde_json::{Map, Value};

use super::{FetchError, RecordStore, WatchTarget};
use crate::config::PollConfig;
use crate::types::Record;

/// Realtime-database style REST store: every path ends in `.json` and the
/// auth token travels as the `auth` query parameter.
pub struct RestStore {
    client: Client,
}

impl RestStore {
    pub fn new(request_timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(Self { client })
    }

    /// `{base}/{segments...}.json?auth={token}`
    fn url(config: &PollConfig, segments: &[&str]) -> Result<Url, FetchError> {
        let invalid = || FetchError::InvalidUrl(config.base_url.clone());
        let mut url = Url::parse(&config.base_url).map_err(|_| invalid())?;
        {
            let mut path = url.path_segments_mut().map_err(|_| invalid())?;
            path.pop_if_empty();
            if let Some((last, rest)) = segments.split_last() {
                path.extend(rest);
                path.push(&format!("{}.json", last));
            }
        }
        url.query_pairs_mut().append_pair("auth", &config.auth_token);
        Ok(url)
    }

    fn collection_url(config: &PollConfig) -> Result<Url, FetchError> {
        let mut url = Self::url(config, &[&config.collection])?;
        url.query_pairs_mut()
            .append_pair("orderBy", &format!("\"{}\"", config.presence.field))
            .append_pair("equalTo", &format!("\"{}\"", config.presence.available));
        Ok(url)
    }

    fn entity_url(config: &PollConfig, id: &str) -> Result<Url, FetchError> {
        Self::url(config, &[&config.collection, id])
    }

    async fn get(&self, url: Url) -> Result<String, FetchError> {
        debug!("GET {}", url.path());
        let response = self
            .client
            .get(url)
            .header(ACCEPT, "application/json")
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(FetchError::Protocol {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }
}

/// A JSON `null` or a blank body means nothing matched.
fn parse_collection(body: &str) -> Result<BTreeMap<String, Record>, FetchError> {
    if body.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    let parsed: Option<BTreeMap<String, Record>> = serde_json::from_str(body)?;
    Ok(parsed.unwrap_or_default())
}

fn parse_entity(id: &str, body: &str) -> Result<BTreeMap<String, Record>, FetchError> {
    if body.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    let parsed: Option<Record> = serde_json::from_str(body)?;
    Ok(parsed
        .map(|record| BTreeMap::from([(id.to_string(), record)]))
        .unwrap_or_default())
}

#[async_trait]
impl RecordStore for RestStore {
    async fn fetch(
        &self,
        config: &PollConfig,
        target: &WatchTarget,
    ) -> Result<BTreeMap<String, Record>, FetchError> {
        match target {
            WatchTarget::Available => {
                let body = self.get(Self::collection_url(config)?).await?;
                parse_collection(&body)
            }
            WatchTarget::Entity(id) => {
                let body = self.get(Self::entity_url(config, id)?).await?;
                parse_entity(id, &body)
            }
        }
    }

    async fn set_status(
        &self,
        config: &PollConfig,
        id: &str,
        value: &str,
    ) -> Result<(), FetchError> {
        let url = Self::entity_url(config, id)?;
        let mut body = Map::new();
        body.insert(config.presence.field.clone(), Value::String(value.to_string()));

        debug!("PATCH {} {}={}", url.path(), config.presence.field, value);
        let response = self
            .client
            .patch(url)
            .header(ACCEPT, "application/json")
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = match response.text().await {
                Ok(body) => body,
                Err(e) => {
                    debug!("Could not read error body for {}: {}", id, e);
                    "<unreadable body>".to_string()
                }
            };
            warn!("Status update for {} rejected with {}", id, status);
            return Err(FetchError::Protocol {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}
