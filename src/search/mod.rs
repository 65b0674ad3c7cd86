//! Tantivy-based search index module.
//!
//! Provides full-text search over photo descriptions, tags and owners with field boosting.

use std::path::Path;
use std::sync::Arc;
use tantivy::collector::{Count, TopDocs};
use tantivy::query::{BooleanQuery, BoostQuery, Occur, QueryParser};
use tantivy::schema::{Field, Schema, Value, STORED, STRING, TEXT};
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument};
use tokio::sync::RwLock;

use crate::errors::AppError;
use crate::models::Photo;

const BOOST_TAGS: f32 = 8.0;
const BOOST_DESCRIPTION: f32 = 5.0;
const BOOST_OWNER: f32 = 2.0;

/// Deepest offset a search may page to.
pub const MAX_SEARCH_OFFSET: usize = 10_000;

/// Search result with photo ID and relevance score.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub photo_id: String,
    pub score: f32,
}

/// One page of search hits plus the number of matching photos.
#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    pub hits: Vec<SearchResult>,
    pub total: usize,
}

/// Search index schema fields.
struct SearchFields {
    photo_id: Field,
    description: Field,
    tags: Field,
    owner: Field,
}

/// Tantivy search index for photos.
pub struct SearchIndex {
    index: Index,
    reader: IndexReader,
    writer: Arc<RwLock<IndexWriter>>,
    fields: SearchFields,
}

impl SearchIndex {
    /// Create or open a search index at the specified path.
    pub fn open(index_path: &Path) -> Result<Self, AppError> {
        std::fs::create_dir_all(index_path)
            .map_err(|e| AppError::Search(format!("Failed to create index directory: {}", e)))?;

        let mut schema_builder = Schema::builder();
        // STRING keeps the id as one untokenized term so it can be deleted by term
        let photo_id = schema_builder.add_text_field("photo_id", STRING | STORED);
        let description = schema_builder.add_text_field("description", TEXT);
        let tags = schema_builder.add_text_field("tags", TEXT);
        let owner = schema_builder.add_text_field("owner", TEXT);
        let schema = schema_builder.build();

        let fields = SearchFields {
            photo_id,
            description,
            tags,
            owner,
        };

        // Try to open existing index or create new one
        let index = Index::open_in_dir(index_path)
            .or_else(|_| Index::create_in_dir(index_path, schema.clone()))
            .map_err(|e| AppError::Search(format!("Failed to open/create index: {}", e)))?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::OnCommitWithDelay)
            .try_into()
            .map_err(|e| AppError::Search(format!("Failed to create reader: {}", e)))?;

        let writer = index
            .writer(50_000_000) // 50MB buffer
            .map_err(|e| AppError::Search(format!("Failed to create writer: {}", e)))?;

        Ok(Self {
            index,
            reader,
            writer: Arc::new(RwLock::new(writer)),
            fields,
        })
    }

    /// Rebuild the entire index from photos.
    pub async fn rebuild(&self, photos: &[Photo]) -> Result<(), AppError> {
        let mut writer = self.writer.write().await;

        writer.delete_all_documents()?;
        for photo in photos {
            writer.add_document(self.create_document(photo))?;
        }
        writer.commit()?;

        // Reload reader to see new documents
        self.reader.reload()?;

        tracing::info!("Search index rebuilt with {} photos", photos.len());
        Ok(())
    }

    /// Index or re-index a single photo.
    pub async fn index_photo(&self, photo: &Photo) -> Result<(), AppError> {
        let mut writer = self.writer.write().await;

        let term = tantivy::Term::from_field_text(self.fields.photo_id, &photo.id);
        writer.delete_term(term);
        writer.add_document(self.create_document(photo))?;
        writer.commit()?;

        self.reader.reload()?;

        Ok(())
    }

    /// Remove a photo from the index.
    pub async fn remove_photo(&self, photo_id: &str) -> Result<(), AppError> {
        let mut writer = self.writer.write().await;

        let term = tantivy::Term::from_field_text(self.fields.photo_id, photo_id);
        writer.delete_term(term);
        writer.commit()?;

        self.reader.reload()?;

        Ok(())
    }

    /// Search for photos matching the query.
    pub fn search(
        &self,
        query_str: &str,
        limit: usize,
        offset: usize,
    ) -> Result<SearchPage, AppError> {
        if offset > MAX_SEARCH_OFFSET {
            return Err(AppError::Validation(format!(
                "Search offset must not exceed {}",
                MAX_SEARCH_OFFSET
            )));
        }
        if query_str.trim().is_empty() {
            return Ok(SearchPage::default());
        }

        let searcher = self.reader.searcher();

        let query_parser = QueryParser::for_index(
            &self.index,
            vec![self.fields.tags, self.fields.description, self.fields.owner],
        );

        let base_query = query_parser
            .parse_query(query_str)
            .map_err(|e| AppError::Validation(format!("Invalid search query: {}", e)))?;

        // Create field-specific boosted queries
        let mut subqueries: Vec<(Occur, Box<dyn tantivy::query::Query>)> = Vec::new();

        let field_queries = [
            (self.fields.tags, BOOST_TAGS),
            (self.fields.description, BOOST_DESCRIPTION),
            (self.fields.owner, BOOST_OWNER),
        ];

        for (field, boost) in field_queries {
            let field_parser = QueryParser::for_index(&self.index, vec![field]);
            if let Ok(field_query) = field_parser.parse_query(query_str) {
                subqueries.push((Occur::Should, Box::new(BoostQuery::new(field_query, boost))));
            }
        }

        // Combine with OR semantics
        let combined_query = if subqueries.is_empty() {
            base_query
        } else {
            Box::new(BooleanQuery::new(subqueries))
        };

        // TopDocs rejects a zero limit, so an empty page only counts
        if limit == 0 {
            let total = searcher
                .search(&combined_query, &Count)
                .map_err(|e| AppError::Search(format!("Search failed: {}", e)))?;
            return Ok(SearchPage {
                hits: Vec::new(),
                total,
            });
        }

        let (top_docs, total) = searcher
            .search(
                &combined_query,
                &(TopDocs::with_limit(limit.saturating_add(offset)), Count),
            )
            .map_err(|e| AppError::Search(format!("Search failed: {}", e)))?;

        let hits: Vec<SearchResult> = top_docs
            .into_iter()
            .skip(offset)
            .take(limit)
            .filter_map(|(score, doc_address)| {
                let doc: TantivyDocument = searcher.doc(doc_address).ok()?;
                let photo_id = doc.get_first(self.fields.photo_id)?.as_str()?.to_string();
                Some(SearchResult { photo_id, score })
            })
            .collect();

        Ok(SearchPage { hits, total })
    }

    fn create_document(&self, photo: &Photo) -> TantivyDocument {
        doc!(
            self.fields.photo_id => photo.id.clone(),
            self.fields.description => photo.description.clone().unwrap_or_default(),
            self.fields.tags => photo.tags.join(" "),
            self.fields.owner => photo.owner_username.clone()
        )
    }
}
