//! REST API client — folders, documents, summaries, uploads, HTTP chat.
//!
//! DESIGN
//! ======
//! One `reqwest::Client` with request and connect timeouts, shared by every
//! call. URLs are built from the configured roots with path segments
//! percent-encoded, so folder names and titles with spaces are safe. The
//! summary route goes through `fetch_with_retry`; everything else is a
//! single attempt.
//!
//! ERROR HANDLING
//! ==============
//! Every call returns `Result<_, ApiError>`. Non-success statuses keep the
//! status code and body text. Local validation failures (blank folder name,
//! unsupported upload) are rejected before any request is made.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::ChatConfig;
use crate::net::retry::{RetryPolicy, fetch_with_retry};
use crate::net::transport::ChatFallback;
use crate::session::SessionIdentity;
use crate::upload::{UploadError, UploadRequest, UploadResponse};

const REQUEST_TIMEOUT_SECS: u64 = 60;
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Reply keys the HTTP chat route has been seen to use, in lookup order.
const CHAT_REPLY_KEYS: [&str; 3] = ["response", "message", "answer"];

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("failed to build HTTP client: {0}")]
    HttpClientBuild(String),
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid URL `{url}`")]
    InvalidUrl { url: String },
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("maximum retry attempts reached ({attempts}); last error: {last}")]
    RetriesExhausted { attempts: u32, last: String },
    #[error("folder name must not be empty")]
    EmptyFolderName,
    #[error("document `{title}` not found in folder `{folder}`")]
    DocumentNotFound { folder: String, title: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error(transparent)]
    Upload(#[from] UploadError),
}

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Folder {
    pub name: String,
    #[serde(default)]
    pub document_count: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct FoldersResponse {
    #[serde(default)]
    pub folders: Vec<Folder>,
    #[serde(default)]
    pub count: u64,
}

/// A stored document as listed under its folder.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub total_pages: Option<u32>,
    #[serde(default)]
    pub file_type: Option<String>,
    /// Key of the processed text; present once summarization can run.
    #[serde(default)]
    pub processed_key: Option<String>,
    #[serde(default, rename = "original_filename")]
    pub original_filename: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct DocumentsResponse {
    #[serde(default)]
    documents: Vec<Document>,
}

#[derive(Debug, Default, Deserialize)]
struct SummaryResponse {
    #[serde(default)]
    summary: Option<String>,
}

#[derive(Serialize)]
struct CreateFolderRequest<'a> {
    name: &'a str,
}

/// Everything the detail view needs to show a document next to its chat.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadedDocument {
    pub folder: String,
    pub document: Document,
    /// Direct URL of the originally uploaded file, when its name is known.
    pub original_url: Option<String>,
    pub summary: Option<String>,
    /// The summary exists but could not be fetched.
    pub summary_unavailable: bool,
}

impl LoadedDocument {
    /// Identity of the chat session for this document.
    #[must_use]
    pub fn identity(&self) -> Option<SessionIdentity> {
        SessionIdentity::new(&self.folder, &self.document.title)
    }
}

// =============================================================================
// CLIENT
// =============================================================================

pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    upload_url: String,
    bucket_url: String,
    retry: RetryPolicy,
}

impl ApiClient {
    /// Build a client from config.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &ChatConfig) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| ApiError::HttpClientBuild(e.to_string()))?;
        Ok(Self {
            http,
            base_url: config.api_base_url.clone(),
            upload_url: config.upload_url.clone(),
            bucket_url: config.document_bucket_url.clone(),
            retry: RetryPolicy::from_config(config),
        })
    }

    /// # Errors
    ///
    /// Transport failures and non-success statuses.
    pub async fn list_folders(&self) -> Result<FoldersResponse, ApiError> {
        let url = self.endpoint(&["folders"])?;
        let response = check_status(self.http.get(url).send().await?).await?;
        Ok(response.json().await?)
    }

    /// Create a folder. The name is trimmed; blank names never hit the wire.
    ///
    /// # Errors
    ///
    /// `ApiError::EmptyFolderName`, transport failures and non-success statuses.
    pub async fn create_folder(&self, name: &str) -> Result<Folder, ApiError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ApiError::EmptyFolderName);
        }

        let url = self.endpoint(&["folders"])?;
        let response = check_status(self.http.post(url).json(&CreateFolderRequest { name }).send().await?).await?;
        info!(folder = %name, "api: folder created");

        // Some deployments answer with an empty body; fall back to the request.
        let body = response.text().await?;
        Ok(serde_json::from_str(&body).unwrap_or_else(|_| Folder { name: name.to_owned(), document_count: 0 }))
    }

    /// # Errors
    ///
    /// Transport failures and non-success statuses.
    pub async fn list_documents(&self, folder: &str) -> Result<Vec<Document>, ApiError> {
        let url = self.endpoint(&["folders", folder, "documents"])?;
        let response = check_status(self.http.get(url).send().await?).await?;
        let body: DocumentsResponse = response.json().await?;
        Ok(body.documents)
    }

    /// First document in `folder` whose title equals `title`.
    ///
    /// # Errors
    ///
    /// `ApiError::DocumentNotFound` when no title matches.
    pub async fn find_document(&self, folder: &str, title: &str) -> Result<Document, ApiError> {
        self.list_documents(folder)
            .await?
            .into_iter()
            .find(|doc| doc.title == title)
            .ok_or_else(|| ApiError::DocumentNotFound { folder: folder.to_owned(), title: title.to_owned() })
    }

    /// Summary text for a processed document, retrying while the service
    /// reports itself unavailable.
    ///
    /// # Errors
    ///
    /// See [`fetch_with_retry`].
    pub async fn fetch_summary(&self, processed_key: &str) -> Result<Option<String>, ApiError> {
        let mut url = self.endpoint(&["ai_tutor_get_test"])?;
        url.query_pairs_mut().append_pair("document_id", processed_key);

        let response = fetch_with_retry(&self.http, url.as_str(), &self.retry).await?;
        let body: SummaryResponse = response.json().await?;
        Ok(body.summary.filter(|s| !s.is_empty()))
    }

    /// Find a document by title and gather its original URL and summary.
    ///
    /// A failed summary fetch does not fail the load; it sets
    /// `summary_unavailable` instead.
    ///
    /// # Errors
    ///
    /// Listing failures and `ApiError::DocumentNotFound`.
    pub async fn load_document(&self, folder: &str, title: &str) -> Result<LoadedDocument, ApiError> {
        let document = self.find_document(folder, title).await?;
        let original_url = self.document_url(folder, &document);

        let mut summary = None;
        let mut summary_unavailable = false;
        if let Some(key) = document.processed_key.as_deref() {
            match self.fetch_summary(key).await {
                Ok(text) => summary = text,
                Err(e) => {
                    warn!(%folder, %title, error = %e, "api: summary unavailable");
                    summary_unavailable = true;
                }
            }
        }

        info!(%folder, %title, has_summary = summary.is_some(), "api: document loaded");
        Ok(LoadedDocument { folder: folder.to_owned(), document, original_url, summary, summary_unavailable })
    }

    /// `{bucket}/{folder}/{id}/upload/{original_filename}`, when the original
    /// filename is known.
    #[must_use]
    pub fn document_url(&self, folder: &str, document: &Document) -> Option<String> {
        let filename = document.original_filename.as_deref()?;
        Some(format!(
            "{}/{folder}/{}/upload/{filename}",
            self.bucket_url.trim_end_matches('/'),
            document.id
        ))
    }

    /// Validate, encode and post a file to the upload route.
    ///
    /// # Errors
    ///
    /// `ApiError::Upload` for files rejected locally, `ApiError::InvalidResponse`
    /// when the route does not return a filename.
    pub async fn upload_document(&self, folder: &str, filename: &str, bytes: &[u8]) -> Result<UploadResponse, ApiError> {
        let request = UploadRequest::new(folder, filename, bytes)?;
        debug!(%folder, filename = %request.filename, size = bytes.len(), "api: uploading document");

        let response = check_status(self.http.post(&self.upload_url).json(&request).send().await?).await?;
        let body: Value = response.json().await?;
        let uploaded: UploadResponse = serde_json::from_value(body)
            .map_err(|_| ApiError::InvalidResponse("upload response is missing `filename`".into()))?;

        info!(%folder, filename = %uploaded.filename, "api: document uploaded");
        Ok(uploaded)
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let invalid = || ApiError::InvalidUrl { url: self.base_url.clone() };
        let mut url = Url::parse(&self.base_url).map_err(|_| invalid())?;
        url.path_segments_mut().map_err(|()| invalid())?.pop_if_empty().extend(segments);
        Ok(url)
    }
}

#[async_trait]
impl ChatFallback for ApiClient {
    async fn ask(&self, identity: &SessionIdentity, message: &str) -> Result<String, ApiError> {
        let mut url = self.endpoint(&["ai_tutor_chatbot"])?;
        url.query_pairs_mut()
            .append_pair("session_id", identity.session_id())
            .append_pair("user_message", message)
            .append_pair("document_path", &identity.document_path());

        let response = check_status(self.http.get(url).send().await?).await?;
        let body: Value = response.json().await?;
        chat_reply(&body).ok_or_else(|| ApiError::InvalidResponse("chat reply has no text".into()))
    }
}

/// Pull the reply text out of an HTTP chat response body.
fn chat_reply(body: &Value) -> Option<String> {
    if let Some(text) = body.as_str() {
        return Some(text.to_owned());
    }
    CHAT_REPLY_KEYS
        .iter()
        .find_map(|key| body.get(*key).and_then(Value::as_str))
        .map(str::to_owned)
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ApiError::Status { status: status.as_u16(), body })
}

#[cfg(test)]
#[path = "api_test.rs"]
mod tests;
