
use std::collections::HashMap;

use crate::dataset::QaEntry;
use crate::text::normalize;

/// What a matched document resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusEntry {
    pub category: String,
    pub answer: String,
}

/// The flattened, normalized question corpus.
///
/// Every paraphrase of every dataset entry becomes one document keyed by its
/// normalized form. The corpus is only ever built whole from a dataset
/// snapshot; there is no incremental patching, which keeps it impossible for
/// stale paraphrases to survive an edit.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    documents: Vec<String>,
    map: HashMap<String, CorpusEntry>,
}

impl Corpus {
    /// Build a corpus from a dataset snapshot.
    ///
    /// Paraphrases that normalize to the empty string are skipped. When two
    /// paraphrases normalize identically the later one wins the mapping;
    /// both still contribute a document.
    #[inline]
    #[must_use]
    pub fn rebuild(entries: &[QaEntry]) -> Self {
        let mut documents = Vec::new();
        let mut map = HashMap::new();

        for entry in entries {
            for question in &entry.questions {
                let document = normalize(question);
                if document.is_empty() {
                    continue;
                }

                map.insert(
                    document.clone(),
                    CorpusEntry {
                        category: entry.category.clone(),
                        answer: entry.answer.clone(),
                    },
                );
                documents.push(document);
            }
        }

        Self { documents, map }
    }

    /// The normalized documents, in dataset order.
    #[inline]
    #[must_use]
    pub fn documents(&self) -> &[String] {
        &self.documents
    }

    /// Resolve a normalized document back to its category and answer.
    #[inline]
    #[must_use]
    pub fn lookup(&self, document: &str) -> Option<&CorpusEntry> {
        self.map.get(document)
    }

    /// Number of distinct normalized documents in the mapping.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
