//! Task-tracker adapter. Fetches the full current task list.

use super::types::{DevpadRaw, ProviderPayload};
use super::{classify_status, network_error, FetchResult, Provider, ProviderError};
use crate::models::Platform;
use crate::ratelimit::RateHeaders;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use std::time::Duration;

const API_URL: &str = "https://devpad.tools/api/v0";

pub struct DevpadProvider {
    client: Client,
    timeout: Duration,
}

impl DevpadProvider {
    pub fn new(timeout: Duration) -> Self {
        Self { client: Client::new(), timeout }
    }
}

#[async_trait]
impl Provider for DevpadProvider {
    fn platform(&self) -> Platform {
        Platform::Devpad
    }

    async fn fetch(&self, token: &str) -> Result<FetchResult, ProviderError> {
        let response = self
            .client
            .get(format!("{}/tasks", API_URL))
            .timeout(self.timeout)
            .header("Authorization", format!("Bearer {}", token))
            .send()
            .await
            .map_err(network_error)?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await.map_err(network_error)?;

        if !status.is_success() {
            return Err(classify_status(status, &headers, &body, Utc::now().timestamp()));
        }

        let tasks: Vec<serde_json::Value> = serde_json::from_str(&body)
            .map_err(|e| ProviderError::Parse { message: format!("task list: {}", e) })?;

        Ok(FetchResult {
            payload: ProviderPayload::Devpad(DevpadRaw {
                tasks,
                fetched_at: Some(Utc::now()),
            }),
            rate: RateHeaders::from_headers(&headers),
        })
    }
}
