use super::*;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(uri: &str) -> Config {
    let url = Url::parse(uri).expect("mock server uri should parse");
    let mut config = Config::default();
    config.ollama.host = url.host_str().expect("mock uri has host").to_string();
    config.ollama.port = url.port().expect("mock uri has port");
    config
}

#[tokio::test]
async fn generate_returns_full_answer() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_partial_json(serde_json::json!({
            "model": "llama3:latest",
            "stream": false,
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "response": "Visit the CV guide.",
            "done": true,
        })))
        .mount(&server)
        .await;

    let generator =
        OllamaGenerator::new(&config_for(&server.uri())).expect("Failed to create generator");
    let answer = generator
        .generate("How do I write a CV?")
        .await
        .expect("generate should succeed");
    assert_eq!(answer, "Visit the CV guide.");
}

#[tokio::test]
async fn generate_stream_yields_chunks_in_order() {
    let server = MockServer::start().await;
    let body = concat!(
        "{\"response\":\"Visit \",\"done\":false}\n",
        "{\"response\":\"the CV \",\"done\":false}\n",
        "{\"response\":\"guide.\",\"done\":true}\n",
    );
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(body, "application/x-ndjson"),
        )
        .mount(&server)
        .await;

    let generator =
        OllamaGenerator::new(&config_for(&server.uri())).expect("Failed to create generator");
    let mut receiver = generator
        .generate_stream("How do I write a CV?")
        .await
        .expect("stream should start");

    let mut answer = String::new();
    while let Some(chunk) = receiver.recv().await {
        answer.push_str(&chunk.expect("chunk should be ok"));
    }
    assert_eq!(answer, "Visit the CV guide.");
}

#[tokio::test]
async fn generate_surfaces_upstream_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let generator =
        OllamaGenerator::new(&config_for(&server.uri())).expect("Failed to create generator");
    assert!(generator.generate("anything").await.is_err());
}
