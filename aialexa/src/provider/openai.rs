//! OpenAI-compatible files API client.

use super::{ASSISTANTS_PURPOSE, LlmProvider, ProviderError, ProviderFile, ProviderFileRequest};
use crate::config::ProviderConfig;
use async_trait::async_trait;
use reqwest::{Client, StatusCode, multipart};
use tracing::{debug, instrument};
use url::Url;

pub struct OpenAiProvider {
    client: Client,
    base_url: Url,
}

/// Makes sure a url has a trailing slash, so `join` appends instead of replacing the last segment
fn ensure_slash(url: &Url) -> Url {
    if url.path().ends_with('/') {
        url.clone()
    } else {
        let mut new_url = url.clone();
        let path = format!("{}/", new_url.path());
        new_url.set_path(&path);
        new_url
    }
}

impl OpenAiProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            base_url: ensure_slash(&config.base_url),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ProviderError> {
        self.base_url
            .join(path)
            .map_err(|e| ProviderError::InvalidUrl(format!("{}{path}: {e}", self.base_url)))
    }
}

async fn error_for_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::Api {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    #[instrument(skip(self, api_key, request), fields(filename = %request.filename, size = request.content.len()), err)]
    async fn create_file(&self, api_key: &str, request: ProviderFileRequest) -> Result<ProviderFile, ProviderError> {
        let url = self.endpoint("files")?;

        let length = request.content.len() as u64;
        let part = multipart::Part::stream_with_length(request.content, length)
            .file_name(request.filename)
            .mime_str(&request.content_type)?;
        let form = multipart::Form::new()
            .text("purpose", ASSISTANTS_PURPOSE)
            .part("file", part);

        let response = self.client.post(url).bearer_auth(api_key).multipart(form).send().await?;
        let file: ProviderFile = error_for_status(response).await?.json().await?;

        debug!(file_id = %file.id, "Registered file with provider");
        Ok(file)
    }

    #[instrument(skip(self, api_key), err)]
    async fn delete_file(&self, api_key: &str, file_id: &str) -> Result<(), ProviderError> {
        let url = self.endpoint(&format!("files/{file_id}"))?;

        let response = self.client.delete(url).bearer_auth(api_key).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!("Provider file already gone");
            return Ok(());
        }
        error_for_status(response).await?;
        Ok(())
    }
}
