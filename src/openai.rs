//! # openai: HTTP implementation of [`VectorStoreFiles`]
//!
//! [`OpenAiClient`] talks to the OpenAI REST API (or anything exposing the same routes, such as a
//! local fake under `OPENAI_BASE_URL`):
//!
//! - `POST /files` (multipart, `purpose=assistants`) uploads the bytes.
//! - `POST /vector_stores/{id}/files` attaches the uploaded file to the store.
//! - `GET /vector_stores/{id}/files/{file_id}` is polled until processing ends.
//! - `POST /vector_stores/{id}/files/{file_id}` replaces the file's attributes.
//!
//! Every request goes through the same retry loop (see [`crate::retry`]).

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::attributes::Attributes;
use crate::config::ClientConfig;
use crate::contract::{FileStatus, FileUpload, VectorStoreFile, VectorStoreFiles};
use crate::retry::{should_retry, RetryPolicy};

/// Uploaded files are tagged with this purpose so vector stores can ingest them.
const FILE_PURPOSE: &str = "assistants";
/// Response header the service uses to ask for a specific polling interval.
const POLL_AFTER_HEADER: &str = "openai-poll-after-ms";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid client configuration: {0}")]
    Config(String),
    #[error("request {method} {url} failed: {source}")]
    Transport {
        method: Method,
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{method} {url} returned {status}: {body}")]
    Api {
        method: Method,
        url: String,
        status: StatusCode,
        body: String,
    },
    #[error("could not decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Deserialize)]
struct UploadedFile {
    id: String,
}

pub struct OpenAiClient {
    http: Client,
    base_url: String,
    retry: RetryPolicy,
    poll_interval: Duration,
}

impl OpenAiClient {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", config.api_key))
            .map_err(|_| ClientError::Config("OPENAI_API_KEY contains invalid characters".into()))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        if let Some(org) = &config.organization {
            let value = HeaderValue::from_str(org)
                .map_err(|_| ClientError::Config("OPENAI_ORG_ID contains invalid characters".into()))?;
            headers.insert("openai-organization", value);
        }
        if let Some(project) = &config.project {
            let value = HeaderValue::from_str(project).map_err(|_| {
                ClientError::Config("OPENAI_PROJECT_ID contains invalid characters".into())
            })?;
            headers.insert("openai-project", value);
        }

        let http = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ClientError::Config(e.to_string()))?;

        info!(
            base_url = %config.base_url,
            max_retries = config.max_retries,
            "Initialized vector store client"
        );

        Ok(OpenAiClient {
            http,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            retry: RetryPolicy::new(config.max_retries),
            poll_interval: config.poll_interval,
        })
    }

    /// Overrides the back-off delays. Mostly useful to keep tests fast.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Sends the request built by `build`, retrying transient failures.
    ///
    /// `build` is called once per attempt because multipart bodies cannot be replayed.
    async fn send<F>(&self, method: Method, url: &str, build: F) -> Result<Response, ClientError>
    where
        F: Fn(RequestBuilder) -> RequestBuilder,
    {
        let mut attempt = 0;
        loop {
            debug!(%method, url, attempt, "Sending request");
            let request = build(self.http.request(method.clone(), url));

            match request.send().await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let status = response.status();
                    let headers = response.headers().clone();
                    if should_retry(status, &headers) && self.retry.allows_retry(attempt) {
                        let delay = self.retry.delay(attempt, Some(&headers));
                        warn!(%method, url, %status, attempt, ?delay, "Retrying request");
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }
                    let body = response
                        .text()
                        .await
                        .unwrap_or_else(|_| String::from("<failed to read response body>"));
                    error!(%method, url, %status, attempt, body = %body, "Request failed");
                    return Err(ClientError::Api {
                        method,
                        url: url.to_owned(),
                        status,
                        body,
                    });
                }
                Err(e) => {
                    let transient = e.is_connect() || e.is_timeout() || e.is_request();
                    if transient && self.retry.allows_retry(attempt) {
                        let delay = self.retry.delay(attempt, None);
                        warn!(%method, url, error = %e, attempt, ?delay, "Retrying after transport error");
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }
                    error!(%method, url, error = %e, attempt, "Request could not be sent");
                    return Err(ClientError::Transport {
                        method,
                        url: url.to_owned(),
                        source: e,
                    });
                }
            }
        }
    }

    async fn decode<T: DeserializeOwned>(
        method: Method,
        url: &str,
        response: Response,
    ) -> Result<T, ClientError> {
        let bytes = response.bytes().await.map_err(|source| ClientError::Transport {
            method,
            url: url.to_owned(),
            source,
        })?;
        serde_json::from_slice(&bytes).map_err(|source| {
            error!(url, error = %source, "Response body did not match the expected shape");
            ClientError::Decode {
                url: url.to_owned(),
                source,
            }
        })
    }

    async fn upload_file(&self, file: FileUpload) -> Result<UploadedFile, ClientError> {
        let url = self.url("/files");
        let response = self
            .send(Method::POST, &url, |request| {
                let part = Part::bytes(file.bytes.clone()).file_name(file.file_name.clone());
                let form = Form::new().text("purpose", FILE_PURPOSE).part("file", part);
                request.multipart(form)
            })
            .await?;
        Self::decode(Method::POST, &url, response).await
    }

    async fn attach_file(
        &self,
        vector_store_id: &str,
        file_id: &str,
    ) -> Result<VectorStoreFile, ClientError> {
        let url = self.url(&format!("/vector_stores/{vector_store_id}/files"));
        let body = json!({ "file_id": file_id });
        let response = self
            .send(Method::POST, &url, |request| request.json(&body))
            .await?;
        Self::decode(Method::POST, &url, response).await
    }

    async fn poll_file(
        &self,
        vector_store_id: &str,
        mut record: VectorStoreFile,
    ) -> Result<VectorStoreFile, ClientError> {
        let url = self.url(&format!(
            "/vector_stores/{vector_store_id}/files/{}",
            record.id
        ));
        let mut interval = self.poll_interval;

        while !record.status.is_terminal() {
            debug!(file_id = %record.id, ?interval, "File still processing; polling");
            tokio::time::sleep(interval).await;

            let response = self.send(Method::GET, &url, |request| request).await?;
            if let Some(ms) = response
                .headers()
                .get(POLL_AFTER_HEADER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
            {
                interval = Duration::from_millis(ms);
            }
            record = Self::decode(Method::GET, &url, response).await?;
        }

        match &record.status {
            FileStatus::Completed => {
                info!(file_id = %record.id, usage_bytes = record.usage_bytes, "File processing completed")
            }
            status => warn!(
                file_id = %record.id,
                ?status,
                last_error = ?record.last_error,
                "File processing ended without completing"
            ),
        }
        Ok(record)
    }
}

#[async_trait]
impl VectorStoreFiles for OpenAiClient {
    async fn upload_and_poll(
        &self,
        vector_store_id: &str,
        file: FileUpload,
    ) -> Result<VectorStoreFile, ClientError> {
        info!(
            vector_store_id,
            file_name = %file.file_name,
            size = file.bytes.len(),
            "Uploading file"
        );
        let uploaded = self.upload_file(file).await?;
        info!(file_id = %uploaded.id, "File uploaded; attaching to vector store");

        let record = self.attach_file(vector_store_id, &uploaded.id).await?;
        self.poll_file(vector_store_id, record).await
    }

    async fn update_attributes(
        &self,
        vector_store_id: &str,
        file_id: &str,
        attributes: &Attributes,
    ) -> Result<VectorStoreFile, ClientError> {
        info!(
            vector_store_id,
            file_id,
            count = attributes.len(),
            "Updating file attributes"
        );
        let url = self.url(&format!("/vector_stores/{vector_store_id}/files/{file_id}"));
        let body = json!({ "attributes": attributes });
        let response = self
            .send(Method::POST, &url, |request| request.json(&body))
            .await?;
        Self::decode(Method::POST, &url, response).await
    }
}
