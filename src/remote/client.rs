use std::time::Duration;
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use tokio::time::timeout;
use tracing::debug;
use url::Url;

use crate::error::{Error, Result};
use crate::news::{Article, ArticleQuery, InteractionRow};
use crate::remote::RemoteSource;

const ARTICLES_TABLE: &str = "articles";
const INTERACTIONS_TABLE: &str = "article_interactions";
const INCREMENT_VIEW_RPC: &str = "rpc/increment_view_count";

#[derive(Debug, Clone)]
pub struct RestClientConfig {
    /// Project URL, e.g. `https://project.supabase.co`
    pub base_url: String,
    /// Anonymous (public) API key sent as `apikey` and bearer token
    pub api_key: String,
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for RestClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:54321".to_string(),
            api_key: String::new(),
            timeout: Duration::from_secs(30),
            user_agent: format!("edushorts-news/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// PostgREST client for the article backend
#[derive(Debug, Clone)]
pub struct RestClient {
    client: Client,
    rest_url: Url,
    api_key: String,
    timeout_duration: Duration,
    user_agent: String,
}

impl RestClient {
    pub fn new(config: RestClientConfig) -> Result<Self> {
        let rest_url = Url::parse(&format!("{}/rest/v1/", config.base_url.trim_end_matches('/')))
            .map_err(|_| Error::InvalidUrl(config.base_url.clone()))?;

        if !matches!(rest_url.scheme(), "http" | "https") {
            return Err(Error::InvalidUrl(format!(
                "Backend URL must use http or https: {}", config.base_url
            )));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .gzip(true)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            rest_url,
            api_key: config.api_key,
            timeout_duration: config.timeout,
            user_agent: config.user_agent,
        })
    }

    pub fn rest_url(&self) -> &Url {
        &self.rest_url
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.rest_url
            .join(path)
            .map_err(|e| Error::InvalidUrl(format!("{}{}: {}", self.rest_url, path, e)))
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let mut builder = self
            .client
            .request(method, url)
            .header("User-Agent", &self.user_agent)
            .header("Accept", "application/json");

        if !self.api_key.is_empty() {
            builder = builder
                .header("apikey", &self.api_key)
                .header("Authorization", format!("Bearer {}", self.api_key));
        }

        builder
    }

    async fn send(&self, builder: RequestBuilder, what: &str) -> Result<Response> {
        let response = timeout(self.timeout_duration, builder.send())
            .await
            .map_err(|_| Error::Timeout(format!("{} timed out", what)))?;

        check_status(response?).await
    }

    async fn fetch_rows(&self, params: &[(&str, String)], what: &str) -> Result<Vec<Article>> {
        let url = self.endpoint(ARTICLES_TABLE)?;
        let response = self.send(self.request(Method::GET, url).query(params), what).await?;

        let body = response
            .text()
            .await
            .map_err(|e| Error::HttpError(format!("Failed to read response body: {}", e)))?;

        let rows: Vec<Article> = serde_json::from_str(&body)?;
        debug!("{} returned {} rows", what, rows.len());
        Ok(rows)
    }
}

/// Map non-2xx responses onto errors; 4xx other than 408/429 will not
/// succeed on retry.
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = format!(
        "HTTP {} {}: {}",
        status.as_u16(),
        status.canonical_reason().unwrap_or("Unknown error"),
        body.trim()
    );

    let retryable = matches!(status, StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS);
    if status.is_client_error() && !retryable {
        Err(Error::Rejected(message))
    } else {
        Err(Error::HttpError(message))
    }
}

fn article_query_params(query: &ArticleQuery) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("select", "*".to_string()),
        ("status", "eq.published".to_string()),
        ("order", "created_at.desc".to_string()),
    ];

    if let Some(category_id) = &query.category_id {
        params.push(("category_id", format!("eq.{}", category_id)));
    }

    if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        params.push(("title", format!("ilike.%{}%", search)));
    }

    if let Some(limit) = query.limit {
        params.push(("limit", limit.to_string()));
    }

    params
}

#[async_trait]
impl RemoteSource for RestClient {
    async fn fetch_articles(&self, query: &ArticleQuery) -> Result<Vec<Article>> {
        self.fetch_rows(&article_query_params(query), "Article listing").await
    }

    async fn fetch_article(&self, id: &str) -> Result<Option<Article>> {
        let params = [
            ("select", "*,category:categories(*)".to_string()),
            ("id", format!("eq.{}", id)),
            ("limit", "1".to_string()),
        ];

        let rows = self.fetch_rows(&params, "Article lookup").await?;
        Ok(rows.into_iter().next())
    }

    async fn increment_view_count(&self, article_id: &str) -> Result<()> {
        let url = self.endpoint(INCREMENT_VIEW_RPC)?;
        let body = serde_json::json!({ "article_id": article_id });

        self.send(self.request(Method::POST, url).json(&body), "View count update").await?;
        debug!("Incremented view count for {}", article_id);
        Ok(())
    }

    async fn insert_interaction(&self, row: &InteractionRow) -> Result<()> {
        let url = self.endpoint(INTERACTIONS_TABLE)?;
        let builder = self
            .request(Method::POST, url)
            .header("Prefer", "return=minimal")
            .json(row);

        self.send(builder, "Interaction insert").await?;
        debug!("Recorded {:?} interaction for {}", row.interaction_type, row.article_id);
        Ok(())
    }
}
