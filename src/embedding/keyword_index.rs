/// Tantivy keyword index for BM25 search over chunk text
use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::*;
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyError};
use thiserror::Error;

/// Writer heap budget
const WRITER_HEAP_BYTES: usize = 50_000_000;

#[derive(Error, Debug)]
pub enum KeywordIndexError {
    #[error("Index initialization failed: {0}")]
    InitializationError(String),

    #[error("Insert failed: {0}")]
    InsertError(String),

    #[error("Search failed: {0}")]
    SearchError(String),

    #[error("Tantivy error: {0}")]
    TantivyError(#[from] TantivyError),
}

/// Search result with ID and relevance score
#[derive(Debug, Clone)]
pub struct KeywordSearchResult {
    /// Chunk id
    pub id: u64,
    /// BM25 relevance score
    pub score: f32,
}

/// Tantivy keyword index wrapper
///
/// Lives in RAM and is rebuilt from the persisted chunks at startup, so
/// it can never disagree with the vector store about which chunks exist.
pub struct KeywordIndex {
    index: Index,
    reader: IndexReader,
    writer: IndexWriter,
    id_field: Field,
    text_field: Field,
}

impl KeywordIndex {
    /// Create an empty in-memory index
    pub fn new() -> Result<Self, KeywordIndexError> {
        let mut schema_builder = Schema::builder();
        let id_field = schema_builder.add_u64_field("id", INDEXED | STORED);
        let text_field = schema_builder.add_text_field("text", TEXT);
        let schema = schema_builder.build();

        let index = Index::create_in_ram(schema);

        let writer = index
            .writer(WRITER_HEAP_BYTES)
            .map_err(|e| KeywordIndexError::InitializationError(e.to_string()))?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .map_err(|e| KeywordIndexError::InitializationError(e.to_string()))?;

        Ok(Self {
            index,
            reader,
            writer,
            id_field,
            text_field,
        })
    }

    /// Stage a document; visible to searches after [`commit`](Self::commit)
    pub fn insert(&mut self, id: u64, text: &str) -> Result<(), KeywordIndexError> {
        self.writer
            .add_document(doc!(
                self.id_field => id,
                self.text_field => text,
            ))
            .map_err(|e| KeywordIndexError::InsertError(e.to_string()))?;
        Ok(())
    }

    /// Insert multiple documents in batch
    pub fn insert_batch<'a>(
        &mut self,
        items: impl IntoIterator<Item = (u64, &'a str)>,
    ) -> Result<(), KeywordIndexError> {
        for (id, text) in items {
            self.insert(id, text)?;
        }
        Ok(())
    }

    /// Commit all pending changes and make them searchable
    pub fn commit(&mut self) -> Result<(), KeywordIndexError> {
        self.writer
            .commit()
            .map_err(|e| KeywordIndexError::InsertError(e.to_string()))?;

        self.reader
            .reload()
            .map_err(|e| KeywordIndexError::SearchError(e.to_string()))?;

        Ok(())
    }

    /// BM25 search
    ///
    /// The query is treated as a bag of words: query-language syntax is
    /// stripped so user punctuation ("§", quotes, colons) cannot produce
    /// parse errors.
    pub fn search(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<KeywordSearchResult>, KeywordIndexError> {
        let terms = sanitize_query(query);
        if terms.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let searcher = self.reader.searcher();
        let query_parser = QueryParser::for_index(&self.index, vec![self.text_field]);
        let query = query_parser
            .parse_query(&terms)
            .map_err(|e| KeywordIndexError::SearchError(e.to_string()))?;

        let top_docs = searcher
            .search(&query, &TopDocs::with_limit(limit))
            .map_err(|e| KeywordIndexError::SearchError(e.to_string()))?;

        let mut results = Vec::with_capacity(top_docs.len());
        for (score, doc_address) in top_docs {
            let retrieved: TantivyDocument = searcher
                .doc(doc_address)
                .map_err(|e| KeywordIndexError::SearchError(e.to_string()))?;

            let id = retrieved
                .get_first(self.id_field)
                .and_then(|v| v.as_u64())
                .ok_or_else(|| {
                    KeywordIndexError::SearchError("Missing or invalid ID field".to_string())
                })?;

            results.push(KeywordSearchResult { id, score });
        }

        Ok(results)
    }

    /// Get the number of documents in the index
    pub fn len(&self) -> u64 {
        self.reader.searcher().num_docs()
    }

    /// Check if index is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Lowercased alphanumeric words joined by spaces
fn sanitize_query(query: &str) -> String {
    query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}
