//! nutrimatch-vector
//!
//! The persisted Reference Index: a LanceDB table of food rows with their
//! embeddings, the manifest that pins the encoder, and two vector search
//! backends over it (LanceDB cosine search and an exact in-memory scan).

pub mod flat;
pub mod manifest;
pub mod reader;
pub mod schema;
pub mod search;
pub mod table;
pub mod writer;

pub use flat::FlatVectorIndex;
pub use manifest::{IndexManifest, MANIFEST_FILE};
pub use reader::{read_reference_rows, ReferenceRow};
pub use search::LanceVectorSearch;
pub use writer::ReferenceIndexWriter;
