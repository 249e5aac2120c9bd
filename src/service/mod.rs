// Service module
// Process-wide state and the conversational flow built on top of it

#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, warn};

use crate::classifier::CategoryClassifier;
use crate::config::Config;
use crate::database::{IndexedDocument, QuestionIndex};
use crate::dataset::{CategoryStore, DatasetStore, QaEntry};
use crate::embeddings::{EmbeddingProvider, OllamaClient};
use crate::generation::{ChatModelProvider, OllamaGenerator};
use crate::matcher::{MatchResult, Matcher};
use crate::sessions::{ChatTurn, SessionStore};
use crate::Result;

/// Prompt assembled for every model invocation. Retrieved Q&A context is
/// reference material, never part of the transcript; the model is told to
/// admit ignorance rather than invent answers.
const PROMPT_TEMPLATE: &str = "\
You are a helpful assistant. Your main job is to act as customer service, \
helping users resolve issues they encounter on career platforms.
I will provide some common questions and answers for reference. Do not take \
them as the user's chat history; they are reference material only.
Use the conversation history and the common questions and answers to answer \
the user's latest question.
If the provided common questions and answers are unrelated to the user's \
question and you do not know how to answer, just say \"I don't know\".
--Conversation history: {chat_history}
--Common questions: {context}
--User's question: {question}
";

/// Answer returned when the model provider fails. Upstream failures on the
/// conversational path degrade to this string instead of propagating.
pub const FALLBACK_ANSWER: &str =
    "Sorry, I am having trouble answering right now. Please try again later.";

const STREAM_CHANNEL_CAPACITY: usize = 32;

/// What the conversational endpoint returns for one question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatAnswer {
    pub answer: String,
    pub category: String,
}

/// Owns every long-lived component: configuration, dataset, matcher,
/// classifier, sessions, and the chat model. One instance is built at
/// startup and shared behind an `Arc` by all request handlers.
pub struct ChatService {
    config: Config,
    dataset: DatasetStore,
    matcher: Matcher,
    classifier: CategoryClassifier,
    sessions: SessionStore,
    model: Arc<dyn ChatModelProvider>,
}

impl ChatService {
    /// Build the service with Ollama-backed providers.
    #[inline]
    pub async fn new(config: Config) -> Result<Self> {
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(OllamaClient::new(&config)?);
        let model: Arc<dyn ChatModelProvider> = Arc::new(OllamaGenerator::new(&config)?);
        Self::with_providers(config, embedder, model).await
    }

    /// Build the service with explicit providers.
    #[inline]
    pub async fn with_providers(
        config: Config,
        embedder: Arc<dyn EmbeddingProvider>,
        model: Arc<dyn ChatModelProvider>,
    ) -> Result<Self> {
        let dataset = DatasetStore::new(config.dataset_path());
        let categories = CategoryStore::new(config.categories_path());
        let index = QuestionIndex::new(config.vector_database_path()).await?;

        let matcher = Matcher::new(
            Arc::clone(&embedder),
            index,
            DatasetStore::new(config.dataset_path()),
            &config.matcher,
        );
        let classifier =
            CategoryClassifier::new(embedder, categories, config.matcher.category_threshold);

        Ok(Self {
            config,
            dataset,
            matcher,
            classifier,
            sessions: SessionStore::new(),
            model,
        })
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Answer a question for a user session.
    ///
    /// Retrieval and generation failures both degrade to the fixed fallback
    /// answer; the turn is only recorded in the session after a successful
    /// model invocation.
    #[inline]
    pub async fn ask(&self, user_id: &str, question: &str) -> Result<ChatAnswer> {
        let matched = match self
            .matcher
            .match_question(question, self.config.matcher.top_k)
            .await
        {
            Ok(matched) => matched,
            Err(e) => {
                error!("Retrieval failed, degrading to fallback answer: {e}");
                return Ok(ChatAnswer {
                    answer: FALLBACK_ANSWER.to_string(),
                    category: String::new(),
                });
            }
        };

        let prompt = self.build_prompt(user_id, &matched, question).await;

        match self.model.generate(&prompt).await {
            Ok(answer) => {
                self.sessions
                    .append(user_id, question.to_string(), answer.clone())
                    .await;
                Ok(ChatAnswer {
                    answer,
                    category: matched.category,
                })
            }
            Err(e) => {
                error!("Generation failed, degrading to fallback answer: {e}");
                Ok(ChatAnswer {
                    answer: FALLBACK_ANSWER.to_string(),
                    category: matched.category,
                })
            }
        }
    }

    /// Answer a question as a stream of text chunks.
    ///
    /// The transcript is appended once the stream completes cleanly; a
    /// failure at any point emits the fallback answer as a final chunk and
    /// records nothing.
    #[inline]
    pub async fn ask_stream(
        self: &Arc<Self>,
        user_id: &str,
        question: &str,
    ) -> mpsc::Receiver<String> {
        let (sender, receiver) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        let service = Arc::clone(self);
        let user_id = user_id.to_string();
        let question = question.to_string();

        tokio::spawn(async move {
            let matched = match service
                .matcher
                .match_question(&question, service.config.matcher.top_k)
                .await
            {
                Ok(matched) => matched,
                Err(e) => {
                    error!("Retrieval failed, degrading to fallback answer: {e}");
                    let _ = sender.send(FALLBACK_ANSWER.to_string()).await;
                    return;
                }
            };

            let prompt = service.build_prompt(&user_id, &matched, &question).await;

            let mut chunks = match service.model.generate_stream(&prompt).await {
                Ok(chunks) => chunks,
                Err(e) => {
                    error!("Generation failed, degrading to fallback answer: {e}");
                    let _ = sender.send(FALLBACK_ANSWER.to_string()).await;
                    return;
                }
            };

            let mut answer = String::new();
            while let Some(chunk) = chunks.recv().await {
                match chunk {
                    Ok(text) => {
                        answer.push_str(&text);
                        if sender.send(text).await.is_err() {
                            // Receiver dropped, stop generating.
                            return;
                        }
                    }
                    Err(e) => {
                        error!("Stream failed mid-answer, degrading to fallback: {e}");
                        let _ = sender.send(FALLBACK_ANSWER.to_string()).await;
                        return;
                    }
                }
            }

            service.sessions.append(&user_id, question, answer).await;
        });

        receiver
    }

    /// The single most similar stored question with its raw distance,
    /// unfiltered by the admission threshold.
    #[inline]
    pub async fn most_relevant(&self, question: &str) -> Result<Option<IndexedDocument>> {
        self.matcher.most_relevant(question).await
    }

    /// A user's transcript, or `None` for an unknown user.
    #[inline]
    pub async fn history(&self, user_id: &str) -> Option<Vec<ChatTurn>> {
        self.sessions.history(user_id).await
    }

    /// Drop a user's transcript, returning what was removed.
    #[inline]
    pub async fn reset(&self, user_id: &str) -> Option<Vec<ChatTurn>> {
        self.sessions.reset(user_id).await
    }

    // Dataset administration. Each mutation writes the dataset file first,
    // then rebuilds corpus and index; a crash between the two leaves them
    // inconsistent until the next administrative write.

    /// The current dataset snapshot.
    #[inline]
    pub fn list_entries(&self) -> Result<Vec<QaEntry>> {
        self.dataset.load()
    }

    /// Create an entry; its id must be the next sequence value.
    #[inline]
    pub async fn create_entry(&self, entry: QaEntry) -> Result<Vec<QaEntry>> {
        let entries = self.dataset.create(entry)?;
        self.matcher.rebuild(&entries).await?;
        Ok(entries)
    }

    /// Replace an existing entry in place.
    #[inline]
    pub async fn update_entry(&self, entry: QaEntry) -> Result<Vec<QaEntry>> {
        let entries = self.dataset.update(entry)?;
        self.matcher.rebuild(&entries).await?;
        Ok(entries)
    }

    /// Delete an entry and renumber the survivors contiguously.
    #[inline]
    pub async fn delete_entry(&self, id: u64) -> Result<Vec<QaEntry>> {
        let entries = self.dataset.delete(id)?;
        self.matcher.rebuild(&entries).await?;
        Ok(entries)
    }

    /// Rebuild corpus and index from the dataset on disk.
    #[inline]
    pub async fn rebuild_index(&self) -> Result<usize> {
        let entries = self.dataset.load()?;
        self.matcher.rebuild(&entries).await?;
        self.matcher.indexed_documents().await
    }

    /// Number of documents currently in the index.
    #[inline]
    pub async fn indexed_documents(&self) -> Result<usize> {
        self.matcher.indexed_documents().await
    }

    // Category administration and classification. Bulk operations run over
    // every paraphrase in the dataset.

    #[inline]
    pub fn categories(&self) -> Result<Vec<String>> {
        self.classifier.categories()
    }

    #[inline]
    pub fn add_category(&self, name: &str) -> Result<Vec<String>> {
        self.classifier.add_category(name)
    }

    /// Classify a single question.
    #[inline]
    pub async fn classify(&self, question: &str) -> Result<String> {
        self.classifier.classify(question).await
    }

    /// Classify every dataset paraphrase, in dataset order.
    #[inline]
    pub async fn classify_dataset(&self) -> Result<Vec<String>> {
        let questions = self.dataset_questions()?;
        self.classifier.classify_all(&questions).await
    }

    /// Per-category counts over the dataset paraphrases.
    #[inline]
    pub async fn category_counts(&self) -> Result<std::collections::HashMap<String, usize>> {
        let questions = self.dataset_questions()?;
        self.classifier.category_counts(&questions).await
    }

    /// How many dataset paraphrases belong to one category.
    #[inline]
    pub async fn category_count(&self, category: &str) -> Result<usize> {
        let questions = self.dataset_questions()?;
        self.classifier.count_in_category(category, &questions).await
    }

    /// The subset of `questions` belonging to `category`.
    #[inline]
    pub async fn questions_belonging_to(
        &self,
        category: &str,
        questions: &[String],
    ) -> Result<Vec<String>> {
        self.classifier.questions_belonging_to(category, questions).await
    }

    fn dataset_questions(&self) -> Result<Vec<String>> {
        let entries = self.dataset.load()?;
        Ok(entries
            .into_iter()
            .flat_map(|entry| entry.questions)
            .collect())
    }

    async fn build_prompt(&self, user_id: &str, matched: &MatchResult, question: &str) -> String {
        let history = self.sessions.history(user_id).await.unwrap_or_default();
        let transcript = history
            .iter()
            .map(|turn| format!("user: {}\nassistant: {}", turn.question, turn.answer))
            .collect::<Vec<_>>()
            .join("\n");

        let context = if matched.is_empty() {
            warn!("No confident match for question, prompting without context");
            String::new()
        } else {
            matched.answer.clone()
        };

        PROMPT_TEMPLATE
            .replace("{chat_history}", &transcript)
            .replace("{context}", &context)
            .replace("{question}", question)
    }
}
