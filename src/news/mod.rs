use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Article row as served by the backend. Everything except `id` and `title`
/// may be missing from partial selects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub category_id: Option<String>,
    /// Populated only by lookups that join the categories table.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub view_count: u64,
    #[serde(flatten)]
    pub source: ArticleSource,
    #[serde(default)]
    pub image_path: Option<String>,
}

/// Counter columns may come back as `null` for rows never updated
fn null_as_zero<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<u64>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ArticleSource {
    #[serde(default, rename = "source_name")]
    pub name: Option<String>,
    #[serde(default, rename = "source_url")]
    pub url: Option<String>,
    #[serde(default, rename = "source_icon")]
    pub icon: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
}

impl Article {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            summary: None,
            content: None,
            category_id: None,
            category: None,
            created_at: None,
            view_count: 0,
            source: ArticleSource::default(),
            image_path: None,
        }
    }

    /// One-line listing used by the CLI.
    pub fn headline(&self) -> String {
        let mut line = self.title.clone();

        if let Some(name) = &self.source.name {
            line.push_str(&format!(" ({})", name));
        }

        if let Some(created) = &self.created_at {
            line.push_str(&format!(" - {}", created.format("%Y-%m-%d %H:%M")));
        }

        line
    }

    pub fn to_text(&self) -> String {
        let mut text = String::new();

        text.push_str(&format!("Title: {}\n", self.title));

        if let Some(category) = &self.category {
            text.push_str(&format!("Category: {}\n", category.name));
        } else if let Some(category_id) = &self.category_id {
            text.push_str(&format!("Category: {}\n", category_id));
        }

        if let Some(created) = &self.created_at {
            text.push_str(&format!("Published: {}\n", created.format("%Y-%m-%d %H:%M:%S UTC")));
        }

        if let Some(name) = &self.source.name {
            text.push_str(&format!("Source: {}\n", name));
        }

        if let Some(url) = &self.source.url {
            text.push_str(&format!("Link: {}\n", url));
        }

        text.push_str(&format!("Views: {}\n", self.view_count));
        text.push_str("\n---\n\n");

        if let Some(content) = &self.content {
            text.push_str(content);
        } else if let Some(summary) = &self.summary {
            text.push_str(summary);
        } else {
            text.push_str("No content available.");
        }

        text
    }
}

/// Filters for article listings. Only applied to remote queries; cached
/// snapshots are returned as stored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArticleQuery {
    pub category_id: Option<String>,
    pub search: Option<String>,
    pub limit: Option<usize>,
}

impl ArticleQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_category(mut self, category_id: impl Into<String>) -> Self {
        self.category_id = Some(category_id.into());
        self
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionType {
    View,
    Share,
    Bookmark,
    Click,
}

impl std::str::FromStr for InteractionType {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> crate::error::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "view" => Ok(InteractionType::View),
            "share" => Ok(InteractionType::Share),
            "bookmark" => Ok(InteractionType::Bookmark),
            "click" => Ok(InteractionType::Click),
            other => Err(crate::error::Error::Invalid(format!(
                "Unknown interaction type '{}'", other
            ))),
        }
    }
}

/// A user interaction as captured by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub article_id: String,
    #[serde(rename = "type")]
    pub kind: InteractionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl Interaction {
    pub fn new(article_id: impl Into<String>, kind: InteractionType) -> Self {
        Self {
            article_id: article_id.into(),
            kind,
            duration: None,
            metadata: None,
        }
    }

    pub fn with_duration(mut self, duration: u64) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Analytics row inserted for an interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionRow {
    pub article_id: String,
    pub interaction_type: InteractionType,
    pub duration: Option<u64>,
    pub metadata: Option<serde_json::Value>,
}

impl From<&Interaction> for InteractionRow {
    fn from(interaction: &Interaction) -> Self {
        Self {
            article_id: interaction.article_id.clone(),
            interaction_type: interaction.kind,
            duration: interaction.duration,
            metadata: interaction.metadata.clone(),
        }
    }
}
