//! Durable article store: atomic dedup on URL plus read queries.

use crate::error::{Error, Result};
use crate::model::{Article, StoredArticle};
use crate::telemetry::metrics;
use opentelemetry::KeyValue;
use uuid::Uuid;

/// Result of writing an article to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// New row created under this URL.
    Inserted(Uuid),
    /// A row with this URL already existed; nothing was written.
    AlreadyExists,
}

/// One page of stored articles, newest first.
#[derive(Debug)]
pub struct ArticlePage {
    pub items: Vec<StoredArticle>,
    pub total: i64,
}

impl super::Db {
    /// Insert an article unless its URL is already present.
    ///
    /// A single INSERT .. ON CONFLICT DO NOTHING, so two consumers
    /// racing on the same URL cannot both insert: exactly one wins and
    /// the other observes `AlreadyExists`. Existing rows are never
    /// modified. Stamps the topic and the consumption time.
    pub async fn upsert_if_absent(&self, article: &Article, topic: &str) -> Result<UpsertOutcome> {
        let id = Uuid::new_v4();
        let now = chrono::Utc::now();

        let inserted: Option<(Uuid,)> = sqlx::query_as(
            "INSERT INTO articles (id, title, description, url, image, published_at, source, content, topic, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             ON CONFLICT (url) DO NOTHING
             RETURNING id",
        )
        .bind(id)
        .bind(&article.title)
        .bind(&article.description)
        .bind(&article.url)
        .bind(&article.image)
        .bind(article.published_at)
        .bind(&article.source)
        .bind(&article.content)
        .bind(topic)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        let outcome = match inserted {
            Some((id,)) => UpsertOutcome::Inserted(id),
            None => UpsertOutcome::AlreadyExists,
        };

        metrics::articles_stored().add(
            1,
            &[
                KeyValue::new("source", article.source.clone()),
                KeyValue::new(
                    "outcome",
                    match outcome {
                        UpsertOutcome::Inserted(_) => "stored",
                        UpsertOutcome::AlreadyExists => "duplicate",
                    },
                ),
            ],
        );

        Ok(outcome)
    }

    /// List stored articles, newest publication first. Articles with
    /// no publication date sort last. `page` is 1-based.
    pub async fn list_articles(&self, page: u32, page_size: u32) -> Result<ArticlePage> {
        let page = page.max(1) as i64;
        let page_size = page_size.max(1) as i64;
        // Saturate rather than overflow i64 for absurd page numbers.
        let offset = (page - 1).saturating_mul(page_size);

        let rows: Vec<StoredArticleRow> = sqlx::query_as(
            "SELECT id, title, description, url, image, published_at, source, content, topic, created_at
             FROM articles
             ORDER BY published_at DESC NULLS LAST, created_at DESC
             LIMIT $1 OFFSET $2",
        )
        .bind(page_size)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM articles")
            .fetch_one(&self.pool)
            .await?;

        Ok(ArticlePage {
            items: rows.into_iter().map(StoredArticle::from).collect(),
            total: total.0,
        })
    }

    /// Fetch a single stored article by id.
    pub async fn get_article(&self, id: Uuid) -> Result<StoredArticle> {
        let row: Option<StoredArticleRow> = sqlx::query_as(
            "SELECT id, title, description, url, image, published_at, source, content, topic, created_at
             FROM articles WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(StoredArticle::from)
            .ok_or_else(|| Error::NotFound(format!("article {id}")))
    }

    /// Distinct provider tags present in the store.
    pub async fn list_sources(&self) -> Result<Vec<String>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT DISTINCT source FROM articles ORDER BY source")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(s,)| s).collect())
    }
}

#[derive(sqlx::FromRow)]
struct StoredArticleRow {
    id: Uuid,
    title: Option<String>,
    description: Option<String>,
    url: String,
    image: Option<String>,
    published_at: Option<chrono::DateTime<chrono::Utc>>,
    source: String,
    content: Option<String>,
    topic: String,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl From<StoredArticleRow> for StoredArticle {
    fn from(row: StoredArticleRow) -> Self {
        StoredArticle {
            id: row.id,
            title: row.title,
            description: row.description,
            url: row.url,
            image: row.image,
            published_at: row.published_at,
            source: row.source,
            content: row.content,
            topic: row.topic,
            created_at: row.created_at,
        }
    }
}
