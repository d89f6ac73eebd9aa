//! # contract: interface to the remote vector store
//!
//! This module defines the [`VectorStoreFiles`] trait and the plain data types that cross it.
//! The pipeline in [`crate::upload`] only ever talks to the trait, so the real HTTP client
//! ([`crate::openai::OpenAiClient`]) and test doubles are interchangeable.
//!
//! ## Mocking & Testing
//! - The trait is annotated for `mockall`; `MockVectorStoreFiles` is exported under the
//!   default `test-export-mocks` feature so integration tests can script both remote calls.
//!
//! ## Record fidelity
//! - [`VectorStoreFile`] types the fields the tool reads and keeps every other field the
//!   service returns, so printing a record reproduces what the service sent.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::attributes::Attributes;
use crate::openai::ClientError;

/// Processing state of a file inside a vector store.
///
/// Statuses this crate does not know yet are kept verbatim in [`FileStatus::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FileStatus {
    InProgress,
    Completed,
    Cancelled,
    Failed,
    Other(String),
}

impl FileStatus {
    /// Whether the service has finished with the file, successfully or not.
    ///
    /// Unknown statuses count as finished so polling cannot spin forever on them.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, FileStatus::InProgress)
    }
}

impl From<String> for FileStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "in_progress" => FileStatus::InProgress,
            "completed" => FileStatus::Completed,
            "cancelled" => FileStatus::Cancelled,
            "failed" => FileStatus::Failed,
            _ => FileStatus::Other(value),
        }
    }
}

impl From<FileStatus> for String {
    fn from(status: FileStatus) -> Self {
        match status {
            FileStatus::InProgress => "in_progress".to_owned(),
            FileStatus::Completed => "completed".to_owned(),
            FileStatus::Cancelled => "cancelled".to_owned(),
            FileStatus::Failed => "failed".to_owned(),
            FileStatus::Other(value) => value,
        }
    }
}

/// Reason the service gave for a failed file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastError {
    pub code: String,
    pub message: String,
}

/// A file record inside a vector store, as returned by the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorStoreFile {
    pub id: String,
    #[serde(default = "default_object")]
    pub object: String,
    #[serde(default)]
    pub created_at: i64,
    pub vector_store_id: String,
    pub status: FileStatus,
    #[serde(default)]
    pub usage_bytes: u64,
    #[serde(default)]
    pub last_error: Option<LastError>,
    #[serde(default)]
    pub attributes: Option<Attributes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunking_strategy: Option<Value>,
    /// Any fields not typed above, kept verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_object() -> String {
    "vector_store.file".to_owned()
}

/// A file read from disk, ready to send.
#[derive(Debug, Clone, PartialEq)]
pub struct FileUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// The two operations the tool needs from a vector store service.
///
/// Implementors own transport, authentication, retries and polling.
#[cfg_attr(any(test, feature = "test-export-mocks"), mockall::automock)]
#[async_trait]
pub trait VectorStoreFiles: Send + Sync {
    /// Upload a file, attach it to the vector store, and wait until processing finishes.
    async fn upload_and_poll(
        &self,
        vector_store_id: &str,
        file: FileUpload,
    ) -> Result<VectorStoreFile, ClientError>;

    /// Replace the attributes of a file already in the vector store.
    async fn update_attributes(
        &self,
        vector_store_id: &str,
        file_id: &str,
        attributes: &Attributes,
    ) -> Result<VectorStoreFile, ClientError>;
}
