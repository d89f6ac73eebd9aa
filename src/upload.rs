//! High-level pipeline: validate inputs → upload-and-poll → update attributes.
//!
//! [`UploadRequest::prepare`] does all local checking (file exists, attributes are valid) so that
//! nothing reaches the network for bad input. [`upload_file`] then drives the two remote calls
//! through any [`VectorStoreFiles`] implementation.
//!
//! # Error Handling
//! Each step returns immediately with a typed error. There is no rollback: if the attribute
//! update fails, the uploaded file stays in the vector store and the error names its id.

use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::attributes::{
    default_attributes, merge_attributes, parse_attributes, validate_attributes, AttributeError,
    Attributes,
};
use crate::contract::{FileUpload, VectorStoreFile, VectorStoreFiles};
use crate::openai::ClientError;

#[derive(Debug, Error)]
pub enum InputError {
    #[error("File '{}' does not exist.", .0.display())]
    NotFound(PathBuf),
    #[error("'{}' is not a regular file.", .0.display())]
    NotAFile(PathBuf),
    #[error("Could not read metadata of '{}': {source}", .path.display())]
    Metadata {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Attributes(#[from] AttributeError),
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Could not read '{}': {source}", .path.display())]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Upload to vector store failed: {0}")]
    Upload(#[source] ClientError),
    #[error("Updating attributes of uploaded file '{file_id}' failed: {source}")]
    Update {
        file_id: String,
        #[source]
        source: ClientError,
    },
}

/// A validated upload: the file to send and the attributes to attach to it.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadRequest {
    pub path: PathBuf,
    pub attributes: Attributes,
}

impl UploadRequest {
    /// Checks the file and builds the final attribute map.
    ///
    /// Defaults come from the file; custom attributes, when given, are validated on their own,
    /// merged over the defaults, and the merged map is validated again.
    pub fn prepare(path: &Path, raw_attributes: Option<&str>) -> Result<Self, InputError> {
        if !path.exists() {
            debug!(path = %path.display(), "Input file does not exist");
            return Err(InputError::NotFound(path.to_path_buf()));
        }
        if !path.is_file() {
            debug!(path = %path.display(), "Input path is not a regular file");
            return Err(InputError::NotAFile(path.to_path_buf()));
        }

        let defaults = default_attributes(path).map_err(|source| InputError::Metadata {
            path: path.to_path_buf(),
            source,
        })?;

        let attributes = match raw_attributes {
            Some(raw) => {
                let custom = parse_attributes(raw)?;
                let merged = merge_attributes(defaults, custom);
                validate_attributes(&merged)?;
                merged
            }
            None => defaults,
        };

        info!(
            path = %path.display(),
            attribute_count = attributes.len(),
            "Upload request prepared"
        );
        Ok(UploadRequest {
            path: path.to_path_buf(),
            attributes,
        })
    }

    fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// Uploads the file, waits for processing, then attaches the request's attributes.
pub async fn upload_file<C>(
    client: &C,
    vector_store_id: &str,
    request: &UploadRequest,
) -> Result<VectorStoreFile, UploadError>
where
    C: VectorStoreFiles + ?Sized,
{
    // Read in one go; the handle is closed before any network I/O starts.
    let bytes = tokio::fs::read(&request.path)
        .await
        .map_err(|source| {
            error!(path = %request.path.display(), error = %source, "Failed to read input file");
            UploadError::ReadFile {
                path: request.path.clone(),
                source,
            }
        })?;
    let file = FileUpload {
        file_name: request.file_name(),
        bytes,
    };

    let uploaded = client
        .upload_and_poll(vector_store_id, file)
        .await
        .map_err(|e| {
            error!(error = %e, "Upload-and-poll failed");
            UploadError::Upload(e)
        })?;
    info!(
        file_id = %uploaded.id,
        vector_store_id = %uploaded.vector_store_id,
        status = ?uploaded.status,
        "File stored in vector store"
    );

    let updated = client
        .update_attributes(&uploaded.vector_store_id, &uploaded.id, &request.attributes)
        .await
        .map_err(|source| {
            error!(file_id = %uploaded.id, error = %source, "Attribute update failed; file left without attributes");
            UploadError::Update {
                file_id: uploaded.id.clone(),
                source,
            }
        })?;
    info!(file_id = %updated.id, "Attributes updated");

    Ok(updated)
}
