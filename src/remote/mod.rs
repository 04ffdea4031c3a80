pub mod client;

use async_trait::async_trait;

use crate::error::Result;
use crate::news::{Article, ArticleQuery, InteractionRow};

pub use client::{RestClient, RestClientConfig};

/// Hosted backend holding the article and analytics tables
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Published articles, newest first, filtered by `query`
    async fn fetch_articles(&self, query: &ArticleQuery) -> Result<Vec<Article>>;

    /// Single article with its category joined in
    async fn fetch_article(&self, id: &str) -> Result<Option<Article>>;

    /// Server-side `increment_view_count(article_id)` procedure
    async fn increment_view_count(&self, article_id: &str) -> Result<()>;

    /// Insert one analytics row
    async fn insert_interaction(&self, row: &InteractionRow) -> Result<()>;
}
