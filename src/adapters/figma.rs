use anyhow::{Context, anyhow, bail};
use async_trait::async_trait;
use serde::Deserialize;

use crate::config::FigmaSection;
use crate::errors::StageError;
use crate::jobs::stages::{DesignFetcher, DesignTree};

/// Error body returned by the design API on non-2xx responses.
#[derive(Debug, Deserialize)]
struct FigmaErrorBody {
    status: Option<u16>,
    err: Option<String>,
}

/// Fetches design documents from the Figma REST API.
#[derive(Debug, Clone)]
pub struct FigmaClient {
    client: reqwest::Client,
    api_base: String,
    token: Option<String>,
}

impl FigmaClient {
    pub fn new(client: reqwest::Client, config: &FigmaSection) -> Self {
        Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        }
    }

    /// `<api_base>/files/<key>`, with the key escaped as one path segment.
    fn file_url(&self, key: &str) -> anyhow::Result<reqwest::Url> {
        let mut url = reqwest::Url::parse(&self.api_base)
            .with_context(|| format!("Invalid Figma API base URL: {}", self.api_base))?;
        url.path_segments_mut()
            .map_err(|()| anyhow!("Figma API base URL cannot be a base: {}", self.api_base))?
            .pop_if_empty()
            .push("files")
            .push(key);
        Ok(url)
    }

    async fn fetch(&self, key: &str) -> anyhow::Result<DesignTree> {
        let Some(ref token) = self.token else {
            bail!("FIGMA_TOKEN is not configured");
        };

        let resp = self
            .client
            .get(self.file_url(key)?)
            .header("X-Figma-Token", token)
            .send()
            .await
            .context("Failed to send request to Figma")?;

        let status = resp.status();
        if !status.is_success() {
            let detail = match resp.json::<FigmaErrorBody>().await {
                Ok(FigmaErrorBody { err: Some(err), .. }) => err,
                Ok(FigmaErrorBody {
                    status: Some(code), ..
                }) => code.to_string(),
                _ => status.as_u16().to_string(),
            };
            bail!("Figma API error: {} ({})", detail, status.as_u16());
        }

        let document = resp
            .json::<serde_json::Value>()
            .await
            .context("Failed to parse Figma response")?;
        Ok(DesignTree(document))
    }
}

#[async_trait]
impl DesignFetcher for FigmaClient {
    async fn fetch_design(&self, source_key: &str) -> Result<DesignTree, StageError> {
        self.fetch(source_key)
            .await
            .map_err(|e| StageError::Fetch(format!("{:#}", e)))
    }
}
