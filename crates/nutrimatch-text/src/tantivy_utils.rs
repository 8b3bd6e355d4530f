use tantivy::schema::{Schema, TextFieldIndexing, TextOptions, IndexRecordOption, FAST, STORED};
use tantivy::tokenizer::{TextAnalyzer, WhitespaceTokenizer};
use tantivy::Index;

pub const FIELD_POSITION: &str = "position";
pub const FIELD_TOKENS: &str = "tokens";
pub const TOKENIZER_NAME: &str = "food_whitespace";

/// Documents are pre-tokenized by `nutrimatch_core::tokenize` and joined with
/// single spaces, so the analyzer only has to split them back apart.
pub fn build_schema() -> Schema {
	let mut schema_builder = Schema::builder();
	let _position_field = schema_builder.add_u64_field(FIELD_POSITION, FAST | STORED);
	let tokens_indexing = TextFieldIndexing::default().set_tokenizer(TOKENIZER_NAME).set_index_option(IndexRecordOption::WithFreqs);
	let tokens_options = TextOptions::default().set_indexing_options(tokens_indexing);
	let _tokens_field = schema_builder.add_text_field(FIELD_TOKENS, tokens_options);
	schema_builder.build()
}

pub fn register_tokenizer(index: &Index) {
	let tokenizer = TextAnalyzer::builder(WhitespaceTokenizer::default()).build();
	index.tokenizers().register(TOKENIZER_NAME, tokenizer);
}
