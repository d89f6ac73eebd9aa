use mockall::Sequence;
use reqwest::{Method, StatusCode};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{layer::Context, Layer, Registry};

use vector_store_upload::attributes::AttributeValue;
use vector_store_upload::cli::{execute, Cli};
use vector_store_upload::contract::{FileStatus, MockVectorStoreFiles, VectorStoreFile};
use vector_store_upload::openai::ClientError;
use vector_store_upload::upload::{upload_file, UploadError, UploadRequest};

fn stored_record(vector_store_id: &str, status: FileStatus) -> VectorStoreFile {
    serde_json::from_value(serde_json::json!({
        "id": "file-123",
        "object": "vector_store.file",
        "created_at": 1_700_000_000,
        "vector_store_id": vector_store_id,
        "status": status,
        "usage_bytes": 7,
        "last_error": null
    }))
    .expect("fixture record should deserialize")
}

fn write_input(name: &str, content: &[u8]) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join(name);
    std::fs::write(&path, content).expect("write input file");
    (dir, path)
}

#[tokio::test]
async fn uploads_then_updates_with_merged_attributes() {
    let (_dir, path) = write_input("notes.md", b"# hello");
    let request = UploadRequest::prepare(&path, Some(r#"{"key1": "value1"}"#))
        .expect("request should validate");

    let mut client = MockVectorStoreFiles::new();
    let mut seq = Sequence::new();

    client
        .expect_upload_and_poll()
        .times(1)
        .in_sequence(&mut seq)
        .withf(|vector_store_id, file| {
            vector_store_id == "vs_abc" && file.file_name == "notes.md" && file.bytes == b"# hello"
        })
        .returning(|vector_store_id, _file| Ok(stored_record(vector_store_id, FileStatus::Completed)));

    client
        .expect_update_attributes()
        .times(1)
        .in_sequence(&mut seq)
        .withf(|vector_store_id, file_id, attributes| {
            vector_store_id == "vs_abc"
                && file_id == "file-123"
                && attributes.len() == 3
                && attributes.get("key1") == Some(&AttributeValue::from("value1"))
                && attributes.get("source") == Some(&AttributeValue::from("notes.md"))
                && attributes.contains_key("upload_date")
        })
        .returning(|vector_store_id, _file_id, attributes| {
            let mut record = stored_record(vector_store_id, FileStatus::Completed);
            record.attributes = Some(attributes.clone());
            Ok(record)
        });

    let updated = upload_file(&client, "vs_abc", &request)
        .await
        .expect("pipeline should succeed");

    assert_eq!(updated.id, "file-123");
    let attributes = updated.attributes.expect("attributes echoed back");
    assert_eq!(attributes["key1"], AttributeValue::from("value1"));
}

#[tokio::test]
async fn upload_failure_skips_update() {
    let (_dir, path) = write_input("notes.md", b"# hello");
    let request = UploadRequest::prepare(&path, None).unwrap();

    let mut client = MockVectorStoreFiles::new();
    client.expect_upload_and_poll().times(1).returning(|_, _| {
        Err(ClientError::Api {
            method: Method::POST,
            url: "http://localhost/files".into(),
            status: StatusCode::BAD_GATEWAY,
            body: "upstream down".into(),
        })
    });
    client.expect_update_attributes().never();

    let err = upload_file(&client, "vs_abc", &request).await.unwrap_err();
    assert!(matches!(err, UploadError::Upload(_)), "{err:?}");
    assert!(err.to_string().contains("502"));
}

#[tokio::test]
async fn update_failure_names_the_orphaned_file() {
    let (_dir, path) = write_input("notes.md", b"# hello");
    let request = UploadRequest::prepare(&path, None).unwrap();

    let mut client = MockVectorStoreFiles::new();
    client
        .expect_upload_and_poll()
        .returning(|vector_store_id, _| Ok(stored_record(vector_store_id, FileStatus::Completed)));
    client.expect_update_attributes().times(1).returning(|_, _, _| {
        Err(ClientError::Api {
            method: Method::POST,
            url: "http://localhost/vector_stores/vs_abc/files/file-123".into(),
            status: StatusCode::BAD_REQUEST,
            body: "invalid attributes".into(),
        })
    });

    let err = upload_file(&client, "vs_abc", &request).await.unwrap_err();
    match &err {
        UploadError::Update { file_id, .. } => assert_eq!(file_id, "file-123"),
        other => panic!("expected update error, got {other:?}"),
    }
    assert!(err.to_string().contains("file-123"));
}

#[tokio::test]
async fn update_uses_ids_returned_by_upload() {
    let (_dir, path) = write_input("notes.md", b"# hello");
    let request = UploadRequest::prepare(&path, None).unwrap();

    let mut client = MockVectorStoreFiles::new();
    // The service reports the canonical store id; the follow-up call must use it.
    client
        .expect_upload_and_poll()
        .returning(|_, _| Ok(stored_record("vs_canonical", FileStatus::Completed)));
    client
        .expect_update_attributes()
        .withf(|vector_store_id, file_id, _| vector_store_id == "vs_canonical" && file_id == "file-123")
        .times(1)
        .returning(|vector_store_id, _, _| Ok(stored_record(vector_store_id, FileStatus::Completed)));

    upload_file(&client, "vs_alias", &request)
        .await
        .expect("pipeline should succeed");
}

#[tokio::test]
async fn execute_prints_updated_record_as_json() {
    let (_dir, path) = write_input("report.txt", b"quarterly numbers");
    let cli = Cli {
        file_path: path,
        attributes: None,
    };

    let mut client = MockVectorStoreFiles::new();
    client
        .expect_upload_and_poll()
        .returning(|vector_store_id, _| Ok(stored_record(vector_store_id, FileStatus::Completed)));
    client
        .expect_update_attributes()
        .withf(|_, _, attributes| {
            attributes.len() == 2 && attributes.get("source") == Some(&AttributeValue::from("report.txt"))
        })
        .returning(|vector_store_id, _, attributes| {
            let mut record = stored_record(vector_store_id, FileStatus::Completed);
            record.attributes = Some(attributes.clone());
            Ok(record)
        });

    let mut out = Vec::new();
    let record = execute(&cli, "vs_abc", &client, &mut out)
        .await
        .expect("execute should succeed");

    let printed = String::from_utf8(out).expect("utf-8 output");
    assert!(printed.ends_with('\n'));
    let value: serde_json::Value = serde_json::from_str(printed.trim()).expect("stdout is JSON");
    assert_eq!(value["id"], "file-123");
    assert_eq!(value["status"], "completed");
    assert_eq!(value["attributes"]["source"], "report.txt");
    assert_eq!(value, serde_json::to_value(&record).unwrap());
}

#[tokio::test]
async fn execute_rejects_invalid_attributes_without_remote_calls() {
    let (_dir, path) = write_input("report.txt", b"x");
    let cli = Cli {
        file_path: path,
        attributes: Some(format!(r#"{{"a": "{}"}}"#, "x".repeat(600))),
    };

    let mut client = MockVectorStoreFiles::new();
    client.expect_upload_and_poll().never();
    client.expect_update_attributes().never();

    let mut out = Vec::new();
    let err = execute(&cli, "vs_abc", &client, &mut out).await.unwrap_err();
    assert!(err.to_string().contains("512"), "{err}");
    assert!(out.is_empty());
}

/// Custom Layer to collect emitted event messages.
struct EventCollector {
    events: Arc<Mutex<Vec<String>>>,
}

impl<S> Layer<S> for EventCollector
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        self.events.lock().unwrap().push(format!("{:?}", event));
    }
}

#[tokio::test]
async fn emits_trace_events_for_each_step() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let collector = EventCollector {
        events: events.clone(),
    };
    let subscriber = Registry::default().with(collector);
    let _guard = tracing::subscriber::set_default(subscriber);

    let (_dir, path) = write_input("notes.md", b"# hello");
    let request = UploadRequest::prepare(&path, None).unwrap();

    let mut client = MockVectorStoreFiles::new();
    client
        .expect_upload_and_poll()
        .returning(|vector_store_id, _| Ok(stored_record(vector_store_id, FileStatus::Completed)));
    client
        .expect_update_attributes()
        .returning(|vector_store_id, _, _| Ok(stored_record(vector_store_id, FileStatus::Completed)));

    upload_file(&client, "vs_abc", &request).await.unwrap();

    let event_msgs = events.lock().unwrap();
    for expected in ["Upload request prepared", "File stored in vector store", "Attributes updated"] {
        assert!(
            event_msgs.iter().any(|msg| msg.contains(expected)),
            "Expected a '{expected}' trace event, got: {:?}",
            event_msgs
        );
    }
}
