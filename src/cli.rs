//! CLI glue: argument definitions, the async entrypoint, and result printing.
//!
//! - [`Cli`] defines the two positional arguments.
//! - [`run`] loads configuration, builds the HTTP client and hands off to [`execute`].
//! - [`execute`] is generic over the client and the output sink so tests can drive it directly.
//!
//! All non-trivial logic lives in [`crate::upload`] and [`crate::attributes`].

use anyhow::Result;
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;

use crate::config::Config;
use crate::contract::{VectorStoreFile, VectorStoreFiles};
use crate::openai::OpenAiClient;
use crate::upload::{upload_file, UploadRequest};

/// Upload a file to an OpenAI vector store and tag it with attributes.
#[derive(Parser, Debug)]
#[clap(
    name = "vector-store-upload",
    version,
    about = "Upload a file to a vector store, attach metadata attributes, and print the stored record as JSON",
    after_help = "Example: vector-store-upload notes.md '{\"key1\": \"value1\", \"key2\": \"value2\"}'"
)]
pub struct Cli {
    /// Path of the file to upload
    pub file_path: PathBuf,

    /// JSON object of extra attributes (at most 16 keys; keys up to 64 characters;
    /// string values up to 512 characters)
    pub attributes: Option<String>,
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    let config = Config::from_env()?;
    let client = OpenAiClient::new(&config.client)?;

    let mut stdout = std::io::stdout();
    execute(&cli, &config.vector_store_id, &client, &mut stdout).await?;
    Ok(())
}

/// Validates the inputs, performs the upload and update, and prints the updated record.
pub async fn execute<C, W>(
    cli: &Cli,
    vector_store_id: &str,
    client: &C,
    out: &mut W,
) -> Result<VectorStoreFile>
where
    C: VectorStoreFiles + ?Sized,
    W: Write,
{
    let request = UploadRequest::prepare(&cli.file_path, cli.attributes.as_deref())?;
    tracing::info!(command = "upload", path = %request.path.display(), "Starting upload");

    let record = upload_file(client, vector_store_id, &request).await?;
    print_record(out, &record)?;

    tracing::info!(command = "upload", file_id = %record.id, "Upload complete");
    Ok(record)
}

/// Writes the record as a single line of JSON.
pub fn print_record<W: Write>(out: &mut W, record: &VectorStoreFile) -> Result<()> {
    serde_json::to_writer(&mut *out, record)?;
    writeln!(out)?;
    out.flush()?;
    Ok(())
}
