// Classifier module
// Embedding-similarity category classification over a fixed label set


use itertools::Itertools;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::dataset::CategoryStore;
use crate::embeddings::EmbeddingProvider;
use crate::{Result, SupportError};

/// Label reported when no category clears the acceptance threshold.
pub const UNKNOWN_CATEGORY: &str = "unknown";

/// Cosine similarity between two vectors; zero-norm inputs score 0.
#[inline]
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Pick the arg-max category when its similarity clears the threshold.
///
/// Acceptance is `similarity >= threshold`; anything below yields
/// [`UNKNOWN_CATEGORY`].
#[inline]
#[must_use]
pub fn pick_category<'a>(categories: &'a [String], similarities: &[f32], threshold: f32) -> &'a str {
    let best = categories
        .iter()
        .zip(similarities.iter())
        .max_by(|a, b| a.1.total_cmp(b.1));

    match best {
        Some((category, similarity)) if *similarity >= threshold => category,
        _ => UNKNOWN_CATEGORY,
    }
}

/// Classifies questions into the configured category set by comparing
/// question embeddings against category-label embeddings.
pub struct CategoryClassifier {
    embedder: Arc<dyn EmbeddingProvider>,
    categories: CategoryStore,
    threshold: f32,
}

impl CategoryClassifier {
    #[inline]
    #[must_use]
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        categories: CategoryStore,
        threshold: f32,
    ) -> Self {
        Self {
            embedder,
            categories,
            threshold,
        }
    }

    /// The configured category labels.
    #[inline]
    pub fn categories(&self) -> Result<Vec<String>> {
        self.categories.load()
    }

    /// Add a category label, rejecting duplicates and empty names.
    #[inline]
    pub fn add_category(&self, name: &str) -> Result<Vec<String>> {
        self.categories.add(name)
    }

    /// Classify a single question.
    #[inline]
    pub async fn classify(&self, question: &str) -> Result<String> {
        let labels = self.classify_all(&[question.to_string()]).await?;
        labels
            .into_iter()
            .next()
            .ok_or_else(|| SupportError::Embedding("classification produced no label".to_string()))
    }

    /// Classify every question, preserving order.
    #[inline]
    pub async fn classify_all(&self, questions: &[String]) -> Result<Vec<String>> {
        if questions.is_empty() {
            return Ok(Vec::new());
        }

        let categories = self.categories.load()?;
        if categories.is_empty() {
            return Err(SupportError::Validation(
                "no categories configured".to_string(),
            ));
        }

        let category_vectors = self
            .embedder
            .embed_batch(&categories)
            .await
            .map_err(|e| SupportError::Embedding(e.to_string()))?;
        let question_vectors = self
            .embedder
            .embed_batch(questions)
            .await
            .map_err(|e| SupportError::Embedding(e.to_string()))?;

        let labels = question_vectors
            .iter()
            .map(|question_vector| {
                let similarities: Vec<f32> = category_vectors
                    .iter()
                    .map(|category_vector| cosine_similarity(question_vector, category_vector))
                    .collect();
                pick_category(&categories, &similarities, self.threshold).to_string()
            })
            .collect();

        debug!("Classified {} questions", questions.len());
        Ok(labels)
    }

    /// Count questions per assigned category, including "unknown".
    #[inline]
    pub async fn category_counts(&self, questions: &[String]) -> Result<HashMap<String, usize>> {
        let labels = self.classify_all(questions).await?;
        Ok(labels.into_iter().counts())
    }

    /// How many of `questions` belong to `category`.
    #[inline]
    pub async fn count_in_category(&self, category: &str, questions: &[String]) -> Result<usize> {
        Ok(self
            .questions_belonging_to(category, questions)
            .await?
            .len())
    }

    /// The subset of `questions` whose similarity to `category` clears the
    /// threshold, preserving order.
    #[inline]
    pub async fn questions_belonging_to(
        &self,
        category: &str,
        questions: &[String],
    ) -> Result<Vec<String>> {
        if questions.is_empty() {
            return Ok(Vec::new());
        }

        let category_vector = self
            .embedder
            .embed(category)
            .await
            .map_err(|e| SupportError::Embedding(e.to_string()))?;
        let question_vectors = self
            .embedder
            .embed_batch(questions)
            .await
            .map_err(|e| SupportError::Embedding(e.to_string()))?;

        let members = questions
            .iter()
            .zip(question_vectors.iter())
            .filter(|(_, vector)| cosine_similarity(vector, &category_vector) >= self.threshold)
            .map(|(question, _)| question.clone())
            .collect();
        Ok(members)
    }
}
