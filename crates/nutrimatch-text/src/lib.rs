//! nutrimatch-text
//!
//! Lexical ranking of food names: the persisted TokenizedCorpus and a BM25
//! ranker over it backed by an in-memory tantivy index.

pub mod tantivy_utils;
pub mod corpus;
pub mod ranker;

pub use corpus::TokenizedCorpus;
pub use ranker::Bm25Ranker;
