#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

/// Full-stack HTTP tests: a real server on an ephemeral port, driven with a
/// blocking HTTP client, backed by deterministic provider stubs.
use anyhow::anyhow;
use async_trait::async_trait;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::mpsc;

use support_chat::config::Config;
use support_chat::dataset::{DatasetStore, QaEntry};
use support_chat::embeddings::EmbeddingProvider;
use support_chat::generation::ChatModelProvider;
use support_chat::server::router;
use support_chat::service::ChatService;

struct StubEmbedder {
    vectors: HashMap<String, Vec<f32>>,
}

impl StubEmbedder {
    fn canned() -> Self {
        let pairs: [(&str, [f32; 2]); 2] = [
            ("how do i write a cv", [1.0, 0.0]),
            ("what time does the gym open", [0.0, 1.0]),
        ];
        Self {
            vectors: pairs
                .iter()
                .map(|(text, vector)| ((*text).to_string(), vector.to_vec()))
                .collect(),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for StubEmbedder {
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        self.vectors
            .get(text)
            .cloned()
            .ok_or_else(|| anyhow!("no canned vector for {text:?}"))
    }

    async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }
}

struct StubModel;

#[async_trait]
impl ChatModelProvider for StubModel {
    async fn generate(&self, _prompt: &str) -> anyhow::Result<String> {
        Ok("Visit the CV guide.".to_string())
    }

    async fn generate_stream(
        &self,
        _prompt: &str,
    ) -> anyhow::Result<mpsc::Receiver<anyhow::Result<String>>> {
        let (sender, receiver) = mpsc::channel(8);
        for chunk in ["Visit the ", "CV guide."] {
            sender
                .send(Ok(chunk.to_string()))
                .await
                .map_err(|_| anyhow!("receiver dropped"))?;
        }
        Ok(receiver)
    }
}

/// Boot a server on an ephemeral port and return its base URL. The TempDir
/// must outlive the test body so the dataset and index stay on disk.
async fn spawn_server(dir: &TempDir) -> String {
    let config = Config::load_from(dir.path()).expect("config should load");
    DatasetStore::new(config.dataset_path())
        .save(&[QaEntry {
            id: 1,
            category: "CV".to_string(),
            questions: vec!["How do I write a CV?".to_string()],
            answer: "Visit the CV guide.".to_string(),
        }])
        .expect("seed dataset should save");

    let service = ChatService::with_providers(
        config,
        Arc::new(StubEmbedder::canned()),
        Arc::new(StubModel),
    )
    .await
    .expect("service should build");

    let app = router(Arc::new(service));
    let addr: SocketAddr = "127.0.0.1:0".parse().expect("loopback address");
    let server = axum::Server::bind(&addr).serve(app.into_make_service());
    let local_addr = server.local_addr();
    tokio::spawn(server);

    format!("http://{local_addr}")
}

async fn get_json(url: String) -> serde_json::Value {
    tokio::task::spawn_blocking(move || {
        let mut response = ureq::get(&url).call().expect("request should succeed");
        let body = response
            .body_mut()
            .read_to_string()
            .expect("body should read");
        serde_json::from_str(&body).expect("body should be JSON")
    })
    .await
    .expect("blocking task should finish")
}

async fn post_json(url: String, payload: serde_json::Value) -> serde_json::Value {
    tokio::task::spawn_blocking(move || {
        let mut response = ureq::post(&url)
            .header("Content-Type", "application/json")
            .send(&payload.to_string())
            .expect("request should succeed");
        let body = response
            .body_mut()
            .read_to_string()
            .expect("body should read");
        serde_json::from_str(&body).expect("body should be JSON")
    })
    .await
    .expect("blocking task should finish")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn ask_then_history_then_reset_round_trip() {
    let dir = TempDir::new().expect("tempdir");
    let base = spawn_server(&dir).await;

    let answer = post_json(
        format!("{base}/chat/ask"),
        serde_json::json!({ "user_id": "alice", "question": "How do I write a CV?" }),
    )
    .await;
    assert_eq!(answer["answer"], "Visit the CV guide.");
    assert_eq!(answer["category"], "CV");

    let history = get_json(format!("{base}/chat/history?user_id=alice")).await;
    assert_eq!(history[0]["question"], "How do I write a CV?");

    let removed = post_json(
        format!("{base}/chat/reset"),
        serde_json::json!({ "user_id": "alice" }),
    )
    .await;
    assert_eq!(removed.as_array().map(Vec::len), Some(1));

    let after = get_json(format!("{base}/chat/history?user_id=alice")).await;
    assert!(after.is_null());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn streamed_answer_arrives_as_plain_text() {
    let dir = TempDir::new().expect("tempdir");
    let base = spawn_server(&dir).await;

    let body = tokio::task::spawn_blocking(move || {
        let mut response = ureq::post(&format!("{base}/chat/stream"))
            .header("Content-Type", "application/json")
            .send(
                &serde_json::json!({ "user_id": "bob", "question": "How do I write a CV?" })
                    .to_string(),
            )
            .expect("request should succeed");
        response
            .body_mut()
            .read_to_string()
            .expect("body should read")
    })
    .await
    .expect("blocking task should finish");

    assert_eq!(body, "Visit the CV guide.");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn most_relevant_reports_the_raw_distance() {
    let dir = TempDir::new().expect("tempdir");
    let base = spawn_server(&dir).await;

    let best = get_json(format!(
        "{base}/chat/most_relevant?question=How%20do%20I%20write%20a%20CV%3F"
    ))
    .await;
    assert_eq!(best["document"], "how do i write a cv");
    assert!(best["distance"].as_f64().expect("distance") < 0.01);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dataset_crud_over_http() {
    let dir = TempDir::new().expect("tempdir");
    let base = spawn_server(&dir).await;

    // Create with the wrong next id is rejected.
    let error = tokio::task::spawn_blocking({
        let base = base.clone();
        move || {
            let result = ureq::post(&format!("{base}/chat/qa"))
                .header("Content-Type", "application/json")
                .send(
                    &serde_json::json!({
                        "id": 5,
                        "category": "Jobs",
                        "questions": ["Where are jobs posted?"],
                        "answer": "On the board."
                    })
                    .to_string(),
                );
            match result {
                Err(ureq::Error::StatusCode(status)) => status,
                _ => 0,
            }
        }
    })
    .await
    .expect("blocking task should finish");
    assert_eq!(error, 400);

    // List still shows the single seed entry.
    let entries = get_json(format!("{base}/chat/qa")).await;
    assert_eq!(entries.as_array().map(Vec::len), Some(1));
    assert_eq!(entries[0]["id"], 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn category_listing_over_http() {
    let dir = TempDir::new().expect("tempdir");
    let base = spawn_server(&dir).await;

    let categories = get_json(format!("{base}/category/list")).await;
    let labels: Vec<String> =
        serde_json::from_value(categories).expect("categories should deserialize");
    assert!(labels.contains(&"CV".to_string()));

    let updated = post_json(
        format!("{base}/category/update"),
        serde_json::json!({ "category": "Visa" }),
    )
    .await;
    let labels: Vec<String> = serde_json::from_value(updated).expect("labels");
    assert!(labels.contains(&"Visa".to_string()));
}
