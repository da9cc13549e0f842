use crate::alias::reading_from_status;
use crate::link::{DeviceLink, LinkError, SettingsPatch};
use serde_json::Value;
use std::time::Duration;
use thermal_core::Reading;
use tracing::debug;

const STATUS_ENDPOINTS: &[&str] = &["/api/system/status", "/api/status", "/api/v1/status"];
const SETTINGS_ENDPOINTS: &[&str] = &["/api/system/settings", "/api/settings", "/api/v1/settings"];

/// HTTP client for an AxeOS device. Endpoints moved between firmware
/// releases, so each call walks a fallback list.
#[derive(Debug, Clone)]
pub struct AxeOsClient {
    base: String,
    http: reqwest::Client,
}

impl AxeOsClient {
    pub fn new(host: &str, timeout: Duration) -> Result<Self, LinkError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base: format!("http://{host}"),
            http,
        })
    }

    pub async fn status(&self) -> Result<Value, LinkError> {
        let mut last = LinkError::Transport("no status endpoint tried".into());
        for ep in STATUS_ENDPOINTS {
            let url = format!("{}{}", self.base, ep);
            let attempt = async {
                let resp = self.http.get(&url).send().await?.error_for_status()?;
                Ok::<Value, reqwest::Error>(resp.json().await?)
            };
            match attempt.await {
                Ok(status) => return Ok(status),
                Err(e) => {
                    debug!(url = %url, error = %e, "status endpoint failed");
                    last = e.into();
                }
            }
        }
        Err(last)
    }

    pub async fn push_settings(&self, patch: SettingsPatch) -> Result<(), LinkError> {
        if patch.is_empty() {
            return Ok(());
        }
        let mut last = LinkError::Transport("no settings endpoint tried".into());
        for ep in SETTINGS_ENDPOINTS {
            let url = format!("{}{}", self.base, ep);
            let attempt = async {
                self.http
                    .post(&url)
                    .json(&patch)
                    .send()
                    .await?
                    .error_for_status()?;
                Ok::<(), reqwest::Error>(())
            };
            match attempt.await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    debug!(url = %url, error = %e, "settings endpoint failed");
                    last = e.into();
                }
            }
        }
        Err(last)
    }
}

impl DeviceLink for AxeOsClient {
    async fn fetch(&mut self) -> Result<Reading, LinkError> {
        let status = self.status().await?;
        reading_from_status(&status)
    }

    async fn apply(&mut self, patch: SettingsPatch) -> Result<(), LinkError> {
        self.push_settings(patch).await
    }
}
