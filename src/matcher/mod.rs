// Matcher module
// The retrieval core: normalize, embed, nearest-neighbor search, threshold


pub mod corpus;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::MatcherConfig;
use crate::database::{IndexRecord, IndexedDocument, QuestionIndex};
use crate::dataset::{DatasetStore, QaEntry};
use crate::embeddings::EmbeddingProvider;
use crate::text::{normalize, token_count};
use crate::{Result, SupportError};

pub use corpus::{Corpus, CorpusEntry};

/// The outcome of a similarity match. Empty strings mean "no confident
/// match"; the chat flow treats that as "answer from the model alone".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    pub category: String,
    pub answer: String,
}

impl MatchResult {
    #[inline]
    #[must_use]
    pub fn empty() -> Self {
        Self {
            category: String::new(),
            answer: String::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.category.is_empty() && self.answer.is_empty()
    }
}

/// Length-dependent admission policy over cosine distances.
///
/// Short queries are lexically ambiguous, so they must clear a stricter
/// (lower) distance bound than longer queries. A best distance equal to the
/// bound is rejected: ties go to "no match".
#[derive(Debug, Clone, Copy)]
pub struct ThresholdPolicy {
    short_question_tokens: usize,
    short_question_threshold: f32,
    long_question_threshold: f32,
}

impl ThresholdPolicy {
    #[inline]
    #[must_use]
    pub fn new(config: &MatcherConfig) -> Self {
        Self {
            short_question_tokens: config.short_question_tokens,
            short_question_threshold: config.short_question_threshold,
            long_question_threshold: config.long_question_threshold,
        }
    }

    /// The admission bound applying to a normalized query.
    #[inline]
    #[must_use]
    pub fn threshold_for(&self, normalized_question: &str) -> f32 {
        if token_count(normalized_question) < self.short_question_tokens {
            self.short_question_threshold
        } else {
            self.long_question_threshold
        }
    }

    /// Pick the admissible best candidate, or `None` when nothing clears
    /// the bound. Candidates at exactly the bound are rejected.
    #[inline]
    #[must_use]
    pub fn admit<'a>(
        &self,
        hits: &'a [IndexedDocument],
        normalized_question: &str,
    ) -> Option<&'a IndexedDocument> {
        let best = hits.iter().min_by(|a, b| a.distance.total_cmp(&b.distance))?;
        let threshold = self.threshold_for(normalized_question);

        if best.distance >= threshold {
            debug!(
                "Best distance {} rejected by threshold {}",
                best.distance, threshold
            );
            return None;
        }

        Some(best)
    }
}

/// Similarity-based question matcher.
///
/// Owns the corpus and its paired vector index. The corpus is initialized
/// lazily from the dataset on first use and fully replaced on every rebuild;
/// the write lock serializes rebuilds against concurrent matches, so a
/// request never observes a half-replaced corpus/index pair.
pub struct Matcher {
    embedder: Arc<dyn EmbeddingProvider>,
    index: QuestionIndex,
    dataset: DatasetStore,
    corpus: RwLock<Option<Corpus>>,
    policy: ThresholdPolicy,
}

impl Matcher {
    #[inline]
    #[must_use]
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index: QuestionIndex,
        dataset: DatasetStore,
        config: &MatcherConfig,
    ) -> Self {
        Self {
            embedder,
            index,
            dataset,
            corpus: RwLock::new(None),
            policy: ThresholdPolicy::new(config),
        }
    }

    /// Match a free-text question against the corpus.
    ///
    /// Returns the empty result for blank input, when no candidate clears
    /// the threshold, or when the index returns a document the corpus no
    /// longer knows (index/corpus drift). Provider and index failures
    /// propagate; this is a single-attempt operation.
    #[inline]
    pub async fn match_question(&self, question: &str, k: usize) -> Result<MatchResult> {
        let normalized = normalize(question);
        if normalized.is_empty() {
            debug!("Empty question after normalization, no match");
            return Ok(MatchResult::empty());
        }

        self.ensure_ready().await?;

        let guard = self.corpus.read().await;
        let Some(corpus) = guard.as_ref() else {
            return Ok(MatchResult::empty());
        };
        if corpus.is_empty() {
            debug!("Corpus is empty, no match");
            return Ok(MatchResult::empty());
        }

        let vector = self
            .embedder
            .embed(&normalized)
            .await
            .map_err(|e| SupportError::Embedding(e.to_string()))?;
        let hits = self.index.search(&vector, k).await?;

        let Some(best) = self.policy.admit(&hits, &normalized) else {
            return Ok(MatchResult::empty());
        };

        match corpus.lookup(&best.document) {
            Some(entry) => Ok(MatchResult {
                category: entry.category.clone(),
                answer: entry.answer.clone(),
            }),
            None => {
                warn!(
                    "Index returned document absent from corpus: {:?}",
                    best.document
                );
                Ok(MatchResult::empty())
            }
        }
    }

    /// Return the single most relevant document with its raw distance,
    /// without applying the admission threshold.
    #[inline]
    pub async fn most_relevant(&self, question: &str) -> Result<Option<IndexedDocument>> {
        let normalized = normalize(question);
        if normalized.is_empty() {
            return Ok(None);
        }

        self.ensure_ready().await?;

        let ready = {
            let guard = self.corpus.read().await;
            guard.as_ref().is_some_and(|corpus| !corpus.is_empty())
        };
        if !ready {
            return Ok(None);
        }

        let vector = self
            .embedder
            .embed(&normalized)
            .await
            .map_err(|e| SupportError::Embedding(e.to_string()))?;
        let mut hits = self.index.search(&vector, 1).await?;

        if hits.is_empty() {
            return Ok(None);
        }
        Ok(Some(hits.remove(0)))
    }

    /// Rebuild the corpus and the index from a dataset snapshot.
    ///
    /// Full replace: the previous corpus and index contents are discarded,
    /// never merged. The write lock is held across the index swap.
    #[inline]
    pub async fn rebuild(&self, entries: &[QaEntry]) -> Result<()> {
        let mut guard = self.corpus.write().await;
        self.rebuild_locked(&mut guard, entries).await
    }

    /// Number of documents currently indexed.
    #[inline]
    pub async fn indexed_documents(&self) -> Result<usize> {
        if self.index.exists().await? {
            Ok(self.index.count().await?)
        } else {
            Ok(0)
        }
    }

    /// Lazily initialize corpus and index from the dataset on first use.
    ///
    /// A populated index surviving from a previous run is reused as-is; the
    /// corpus is always rebuilt from the current dataset. Any resulting
    /// drift resolves as "no match" until the next administrative rebuild.
    async fn ensure_ready(&self) -> Result<()> {
        {
            let guard = self.corpus.read().await;
            if guard.is_some() {
                return Ok(());
            }
        }

        let mut guard = self.corpus.write().await;
        // Double-check after re-acquiring: another request may have won.
        if guard.is_some() {
            return Ok(());
        }

        let entries = self.dataset.load()?;
        if self.index.exists().await? {
            info!("Reusing existing question index, rebuilding corpus only");
            *guard = Some(Corpus::rebuild(&entries));
            return Ok(());
        }

        info!("Corpus/index not initialized yet, rebuilding from dataset");
        self.rebuild_locked(&mut guard, &entries).await
    }

    async fn rebuild_locked(
        &self,
        guard: &mut Option<Corpus>,
        entries: &[QaEntry],
    ) -> Result<()> {
        let corpus = Corpus::rebuild(entries);
        let documents = corpus.documents().to_vec();

        let records = if documents.is_empty() {
            Vec::new()
        } else {
            let vectors = self
                .embedder
                .embed_batch(&documents)
                .await
                .map_err(|e| SupportError::Embedding(e.to_string()))?;

            let created_at = Utc::now().to_rfc3339();
            documents
                .into_iter()
                .zip(vectors)
                .map(|(document, vector)| IndexRecord {
                    id: Uuid::new_v4().to_string(),
                    vector,
                    document,
                    created_at: created_at.clone(),
                })
                .collect()
        };

        self.index.rebuild(&records).await?;
        *guard = Some(corpus);

        info!(
            "Matcher rebuilt: {} documents indexed from {} entries",
            records.len(),
            entries.len()
        );
        Ok(())
    }
}
