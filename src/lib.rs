#![doc = "vector-store-upload: push a local file into an OpenAI vector store with metadata attributes."]

//! The binary is a thin wrapper over [`cli::run`]. The pieces, in pipeline order:
//!
//! - [`config`]: environment-driven settings.
//! - [`attributes`]: attribute limits, defaults and merging.
//! - [`upload`]: request preparation and the upload → update pipeline.
//! - [`contract`]: the [`contract::VectorStoreFiles`] trait and record types.
//! - [`openai`]: the HTTP implementation of that trait, with [`retry`] policy.

pub mod attributes;
pub mod cli;
pub mod config;
pub mod contract;
pub mod openai;
pub mod retry;
pub mod upload;
