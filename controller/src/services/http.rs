//! HTTP fetcher backed by reqwest

use std::time::Duration;

use async_trait::async_trait;

use crate::error::ControllerResult;
use crate::traits::HttpFetcher;

pub struct ReqwestFetcher {
    client: reqwest::Client,
}

impl ReqwestFetcher {
    pub fn new() -> ControllerResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("netproxy-controller/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpFetcher for ReqwestFetcher {
    async fn get_text(&self, url: &str, timeout: Duration) -> ControllerResult<String> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.text().await?)
    }
}
