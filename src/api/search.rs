//! Search API endpoints.

use axum::extract::{Query, State};
use serde::{Deserialize, Serialize};

use super::{success, ApiResult};
use crate::models::Photo;
use crate::AppState;

/// Search query parameters.
#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    /// Search query string.
    pub q: String,
    /// Maximum number of results (default: 20).
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Offset for pagination (default: 0).
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    20
}

/// One page of search results; `total` counts every matching photo.
#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResultItem>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

/// Single search result item.
#[derive(Debug, Serialize)]
pub struct SearchResultItem {
    pub photo: Photo,
    pub score: f32,
}

/// Maximum number of search results allowed.
const MAX_SEARCH_LIMIT: usize = 100;

/// GET /api/search - Full-text search over photos.
pub async fn search_photos(
    State(state): State<AppState>,
    Query(params): Query<SearchQuery>,
) -> ApiResult<SearchResponse> {
    let limit = params.limit.clamp(1, MAX_SEARCH_LIMIT);

    let page = state.search.search(&params.q, limit, params.offset)?;

    // Fetch full photo data for each hit; hits deleted since indexing are skipped
    let mut results = Vec::new();
    for hit in page.hits {
        if let Some(photo) = state.repo.get_photo(&hit.photo_id).await? {
            results.push(SearchResultItem {
                photo,
                score: hit.score,
            });
        }
    }

    success(SearchResponse {
        results,
        total: page.total,
        limit,
        offset: params.offset,
    })
}
