use std::path::Path;

use async_trait::async_trait;
use reqwest::{
    multipart::{Form, Part},
    Client, Response, StatusCode,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use shared::{
    domain::DocumentId,
    error::ApiErrorBody,
    protocol::{ChatRequest, ChatResponse, DocumentListing, IngestResponse},
};
use tracing::debug;

use crate::{
    config::{normalize_base_url, ClientSettings},
    error::ClientError,
};

const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// A local file selected for ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub file_name: String,
    pub mime_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let file_name = file_name.into();
        let mime_type = mime_guess::from_path(&file_name)
            .first_raw()
            .map(str::to_string);
        Self {
            file_name,
            mime_type,
            bytes,
        }
    }

    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, ClientError> {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("upload.bin")
            .to_string();
        let bytes = tokio::fs::read(path).await.map_err(|source| ClientError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Self::new(file_name, bytes))
    }
}

/// Network contract of the chat/document service.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn list_documents(&self) -> Result<DocumentListing, ClientError>;
    /// Returns the raw record of the ingested document; normalization is the
    /// caller's concern.
    async fn upload_document(&self, file: &UploadFile) -> Result<Value, ClientError>;
    async fn delete_document(&self, id: &DocumentId) -> Result<(), ClientError>;
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, ClientError>;
    async fn ingest_existing(&self) -> Result<IngestResponse, ClientError>;
}

pub struct HttpBackend {
    http: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn from_settings(settings: &ClientSettings) -> Result<Self, ClientError> {
        let base_url = normalize_base_url(&settings.api_base_url)?;
        let http = Client::builder()
            .timeout(settings.request_timeout())
            .build()?;
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl ChatBackend for HttpBackend {
    async fn list_documents(&self) -> Result<DocumentListing, ClientError> {
        let response = self.http.get(self.endpoint("documents/")).send().await?;
        decode_json(ensure_success(response).await?).await
    }

    async fn upload_document(&self, file: &UploadFile) -> Result<Value, ClientError> {
        let part = Part::bytes(file.bytes.clone())
            .file_name(file.file_name.clone())
            .mime_str(file.mime_type.as_deref().unwrap_or(DEFAULT_MIME_TYPE))?;
        let form = Form::new().part("file", part);
        let response = self
            .http
            .post(self.endpoint("documents/"))
            .multipart(form)
            .send()
            .await?;
        decode_json(ensure_success(response).await?).await
    }

    async fn delete_document(&self, id: &DocumentId) -> Result<(), ClientError> {
        let response = self
            .http
            .delete(self.endpoint(&format!("documents/{}/", id.as_str())))
            .send()
            .await?;
        let response = ensure_success(response).await?;
        if response.status() == StatusCode::NO_CONTENT {
            debug!(document_id = %id, "delete acknowledged with no content");
        }
        Ok(())
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, ClientError> {
        let response = self
            .http
            .post(self.endpoint("chat/"))
            .json(request)
            .send()
            .await?;
        let body: Value = decode_json(ensure_success(response).await?).await?;
        Ok(ChatResponse::from_body(body))
    }

    async fn ingest_existing(&self) -> Result<IngestResponse, ClientError> {
        let response = self
            .http
            .post(self.endpoint("documents/ingest/"))
            .send()
            .await?;
        decode_json(ensure_success(response).await?).await
    }
}

async fn ensure_success(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let detail = ApiErrorBody::parse(&body)
        .and_then(|parsed| parsed.message())
        .or_else(|| {
            let trimmed = body.trim();
            (!trimmed.is_empty()).then(|| trimmed.chars().take(200).collect())
        });
    Err(ClientError::BadResponse {
        status: status.as_u16(),
        detail,
    })
}

async fn decode_json<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let body = response.bytes().await?;
    serde_json::from_slice(&body).map_err(|err| ClientError::MalformedBody(err.to_string()))
}

#[cfg(test)]
#[path = "tests/backend_tests.rs"]
mod tests;
