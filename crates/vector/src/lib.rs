//! QHSE question answering
//!
//! Response table lookup with a nearest-neighbour fallback over an embedded
//! QA corpus.

mod corpus;
mod engine;
mod index;
mod responses;
mod similarity;

pub use corpus::{default_qa_pairs, load_qa_pairs, QaPair};
pub use engine::{Answer, AnswerSource, QaEngine, FALLBACK_RESPONSE};
pub use index::{corpus_fingerprint, EmbeddedCorpus, EmbeddingIndex, IndexEntry};
pub use responses::ResponseTable;
pub use similarity::{best_match, cosine_similarity, rank, BestMatch};
