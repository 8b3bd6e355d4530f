use anyhow::{anyhow, bail, Result};
use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, Occur, Query, TermQuery};
use tantivy::schema::{Field, IndexRecordOption};
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, Term};

use nutrimatch_core::tokenize;
use nutrimatch_core::traits::LexicalRanker;

use crate::corpus::TokenizedCorpus;
use crate::tantivy_utils::{build_schema, register_tokenizer, FIELD_POSITION, FIELD_TOKENS};

const WRITER_HEAP_BYTES: usize = 50_000_000;

/// BM25 ranking (tantivy defaults: k1 = 1.2, b = 0.75) over an in-RAM index
/// built from the tokenized corpus.
///
/// Each tantivy document stores its corpus position in a fast field, so the
/// position -> id mapping never depends on segment layout. Documents sharing
/// no term with the query score 0.
pub struct Bm25Ranker {
	reader: IndexReader,
	tokens_field: Field,
	num_docs: usize,
}

impl Bm25Ranker {
	pub fn build(corpus: &TokenizedCorpus) -> Result<Self> {
		let schema = build_schema();
		let index = Index::create_in_ram(schema.clone());
		register_tokenizer(&index);
		let position_field = schema.get_field(FIELD_POSITION)?;
		let tokens_field = schema.get_field(FIELD_TOKENS)?;

		let mut writer: IndexWriter = index.writer_with_num_threads(1, WRITER_HEAP_BYTES)?;
		for (position, tokens) in corpus.documents().iter().enumerate() {
			writer.add_document(doc!(
				position_field => position as u64,
				tokens_field => tokens.join(" "),
			))?;
		}
		writer.commit()?;

		let reader = index.reader_builder().reload_policy(ReloadPolicy::Manual).try_into()?;
		tracing::info!(documents = corpus.len(), "BM25 ranker built");
		Ok(Self { reader, tokens_field, num_docs: corpus.len() })
	}

	fn query_for(&self, tokens: &[String]) -> BooleanQuery {
		let clauses: Vec<(Occur, Box<dyn Query>)> = tokens
			.iter()
			.map(|t| {
				let term = Term::from_field_text(self.tokens_field, t);
				(Occur::Should, Box::new(TermQuery::new(term, IndexRecordOption::WithFreqs)) as Box<dyn Query>)
			})
			.collect();
		BooleanQuery::new(clauses)
	}
}

impl LexicalRanker for Bm25Ranker {
	fn len(&self) -> usize {
		self.num_docs
	}

	fn scores(&self, query: &str) -> Result<Vec<f32>> {
		let mut scores = vec![0.0f32; self.num_docs];
		let tokens = tokenize(query);
		if tokens.is_empty() {
			tracing::warn!(query, "query has no lexical tokens; every document scores 0");
			return Ok(scores);
		}
		if self.num_docs == 0 {
			return Ok(scores);
		}

		let searcher = self.reader.searcher();
		let mut positions = Vec::with_capacity(searcher.segment_readers().len());
		for segment_reader in searcher.segment_readers() {
			positions.push(segment_reader.fast_fields().u64(FIELD_POSITION)?);
		}

		let matched = searcher.search(&self.query_for(&tokens), &TopDocs::with_limit(self.num_docs))?;
		for (score, address) in matched {
			let position = positions
				.get(address.segment_ord as usize)
				.and_then(|column| column.first(address.doc_id))
				.ok_or_else(|| anyhow!("document {:?} has no corpus position", address))? as usize;
			match scores.get_mut(position) {
				Some(slot) => *slot = score,
				None => bail!("corpus position {} out of range ({} documents)", position, self.num_docs),
			}
		}
		Ok(scores)
	}
}
