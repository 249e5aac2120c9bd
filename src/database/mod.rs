// Vector database module
// LanceDB-backed nearest-neighbor index over normalized question embeddings

pub mod question_index;

pub use question_index::{IndexRecord, IndexedDocument, QuestionIndex};
