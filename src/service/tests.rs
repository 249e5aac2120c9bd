use super::*;
use anyhow::anyhow;
use async_trait::async_trait;
use std::collections::HashMap;
use tempfile::TempDir;

use crate::SupportError;

/// Embedder returning canned vectors per (normalized) input text.
struct StubEmbedder {
    vectors: HashMap<String, Vec<f32>>,
}

impl StubEmbedder {
    fn canned() -> Self {
        let pairs: [(&str, [f32; 4]); 5] = [
            ("how do i write a cv", [1.0, 0.0, 0.0, 0.0]),
            ("cv writing tips", [1.0, 0.0, 0.0, 0.0]),
            ("what time does the gym open", [0.0, 1.0, 0.0, 0.0]),
            ("where are jobs posted", [0.0, 0.0, 1.0, 0.0]),
            ("how do i book an appointment", [0.0, 0.0, 0.0, 1.0]),
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

/// Model returning a fixed answer, or failing on demand.
struct StubModel {
    answer: String,
    fail: bool,
}

impl StubModel {
    fn answering(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            fail: false,
        }
    }

    fn failing() -> Self {
        Self {
            answer: String::new(),
            fail: true,
        }
    }
}

#[async_trait]
impl ChatModelProvider for StubModel {
    async fn generate(&self, _prompt: &str) -> anyhow::Result<String> {
        if self.fail {
            return Err(anyhow!("model unavailable"));
        }
        Ok(self.answer.clone())
    }

    async fn generate_stream(
        &self,
        _prompt: &str,
    ) -> anyhow::Result<mpsc::Receiver<anyhow::Result<String>>> {
        if self.fail {
            return Err(anyhow!("model unavailable"));
        }
        let (sender, receiver) = mpsc::channel(8);
        for word in self.answer.split_inclusive(' ') {
            sender
                .send(Ok(word.to_string()))
                .await
                .map_err(|_| anyhow!("receiver dropped"))?;
        }
        Ok(receiver)
    }
}

fn entry(id: u64, category: &str, questions: &[&str], answer: &str) -> QaEntry {
    QaEntry {
        id,
        category: category.to_string(),
        questions: questions.iter().map(|q| (*q).to_string()).collect(),
        answer: answer.to_string(),
    }
}

fn seed_entries() -> Vec<QaEntry> {
    vec![
        entry(
            1,
            "CV",
            &["How do I write a CV?", "CV writing tips?"],
            "Visit the CV guide.",
        ),
        entry(
            2,
            "Appointment",
            &["How do I book an appointment?"],
            "Use the booking page.",
        ),
    ]
}

async fn service_with_model(dir: &TempDir, model: StubModel) -> Arc<ChatService> {
    let config = Config::load_from(dir.path()).expect("config should load");
    DatasetStore::new(config.dataset_path())
        .save(&seed_entries())
        .expect("seed dataset should save");

    let service = ChatService::with_providers(
        config,
        Arc::new(StubEmbedder::canned()),
        Arc::new(model),
    )
    .await
    .expect("service should build");
    Arc::new(service)
}

#[tokio::test]
async fn ask_answers_and_records_the_turn() {
    let dir = TempDir::new().expect("tempdir");
    let service = service_with_model(&dir, StubModel::answering("Here is the CV guide.")).await;

    let response = service
        .ask("alice", "How do I write a CV?")
        .await
        .expect("ask should succeed");
    assert_eq!(response.answer, "Here is the CV guide.");
    assert_eq!(response.category, "CV");

    let history = service.history("alice").await.expect("session should exist");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].question, "How do I write a CV?");
    assert_eq!(history[0].answer, "Here is the CV guide.");
}

#[tokio::test]
async fn unrelated_question_gets_no_category() {
    let dir = TempDir::new().expect("tempdir");
    let service = service_with_model(&dir, StubModel::answering("I don't know")).await;

    let response = service
        .ask("alice", "What time does the gym open?")
        .await
        .expect("ask should succeed");
    assert_eq!(response.category, "");
    assert_eq!(response.answer, "I don't know");
}

#[tokio::test]
async fn model_failure_degrades_to_fallback_without_recording() {
    let dir = TempDir::new().expect("tempdir");
    let service = service_with_model(&dir, StubModel::failing()).await;

    let response = service
        .ask("alice", "How do I write a CV?")
        .await
        .expect("ask should degrade, not fail");
    assert_eq!(response.answer, FALLBACK_ANSWER);
    assert_eq!(response.category, "CV");

    // Failed turns never reach the transcript.
    assert!(service.history("alice").await.is_none());
}

#[tokio::test]
async fn streamed_answer_reassembles_and_records() {
    let dir = TempDir::new().expect("tempdir");
    let service = service_with_model(&dir, StubModel::answering("Visit the CV guide.")).await;

    let mut receiver = service.ask_stream("alice", "How do I write a CV?").await;
    let mut answer = String::new();
    while let Some(chunk) = receiver.recv().await {
        answer.push_str(&chunk);
    }
    assert_eq!(answer, "Visit the CV guide.");

    let history = service.history("alice").await.expect("session should exist");
    assert_eq!(history[0].answer, "Visit the CV guide.");
}

#[tokio::test]
async fn stream_failure_emits_the_fallback_chunk() {
    let dir = TempDir::new().expect("tempdir");
    let service = service_with_model(&dir, StubModel::failing()).await;

    let mut receiver = service.ask_stream("alice", "How do I write a CV?").await;
    let mut chunks = Vec::new();
    while let Some(chunk) = receiver.recv().await {
        chunks.push(chunk);
    }
    assert_eq!(chunks, [FALLBACK_ANSWER]);
    assert!(service.history("alice").await.is_none());
}

#[tokio::test]
async fn reset_clears_the_transcript() {
    let dir = TempDir::new().expect("tempdir");
    let service = service_with_model(&dir, StubModel::answering("ok")).await;

    service
        .ask("alice", "How do I write a CV?")
        .await
        .expect("ask should succeed");
    let removed = service.reset("alice").await.expect("reset should return turns");
    assert_eq!(removed.len(), 1);
    assert!(service.history("alice").await.is_none());
    assert!(service.reset("alice").await.is_none());
}

#[tokio::test]
async fn create_entry_enforces_the_next_sequence_id() {
    let dir = TempDir::new().expect("tempdir");
    let service = service_with_model(&dir, StubModel::answering("ok")).await;

    let wrong_id = entry(7, "Jobs", &["Where are jobs posted?"], "On the board.");
    let result = service.create_entry(wrong_id).await;
    assert!(matches!(result, Err(SupportError::Validation(_))));

    let entries = service
        .create_entry(entry(3, "Jobs", &["Where are jobs posted?"], "On the board."))
        .await
        .expect("create with next id should succeed");
    assert_eq!(entries.len(), 3);

    // The new paraphrase is matchable immediately.
    let response = service
        .ask("alice", "Where are jobs posted?")
        .await
        .expect("ask should succeed");
    assert_eq!(response.category, "Jobs");
}

#[tokio::test]
async fn delete_entry_renumbers_and_stops_matching() {
    let dir = TempDir::new().expect("tempdir");
    let service = service_with_model(&dir, StubModel::answering("ok")).await;

    let entries = service
        .delete_entry(1)
        .await
        .expect("delete should succeed");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].id, 1);
    assert_eq!(entries[0].category, "Appointment");

    // The deleted entry's paraphrases are gone from the rebuilt corpus.
    let response = service
        .ask("alice", "How do I write a CV?")
        .await
        .expect("ask should succeed");
    assert_eq!(response.category, "");
}

#[tokio::test]
async fn most_relevant_reports_raw_distance_without_threshold() {
    let dir = TempDir::new().expect("tempdir");
    let service = service_with_model(&dir, StubModel::answering("ok")).await;

    let best = service
        .most_relevant("What time does the gym open?")
        .await
        .expect("lookup should succeed")
        .expect("a nonempty index always has a nearest document");
    // Orthogonal vectors: rejected by the matcher but still reported here.
    assert!(best.distance > 0.9);
}

#[tokio::test]
async fn rebuild_index_reports_document_count() {
    let dir = TempDir::new().expect("tempdir");
    let service = service_with_model(&dir, StubModel::answering("ok")).await;

    let indexed = service.rebuild_index().await.expect("rebuild should succeed");
    // Three paraphrases across the two seed entries.
    assert_eq!(indexed, 3);
    assert_eq!(service.indexed_documents().await.expect("count"), 3);
}
