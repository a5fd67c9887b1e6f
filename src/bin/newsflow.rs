//! newsflow CLI — operator interface to the ingestion pipeline.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use newsflow::config::Config;
use newsflow::consumer::{ConsumerConfig, DedupConsumer};
use newsflow::db::Db;
use newsflow::model::Article;
use newsflow::publisher::{ArticleSink, TopicLogPublisher};
use newsflow::scheduler::state::{ScheduleState, StateLock};
use newsflow::scheduler::{PollConfig, Poller};
use newsflow::sources::adapters_from_config;
use newsflow::telemetry::{TelemetryConfig, init_telemetry};
use secrecy::ExposeSecret;
use tokio::sync::Notify;

#[derive(Parser)]
#[command(name = "newsflow", about = "News ingestion pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the provider pollers
    Poll {
        /// Only poll these providers (repeatable; default: all with keys)
        #[arg(long = "provider")]
        providers: Vec<String>,
    },
    /// Run the dedup consumer
    Consume,
    /// Publish a single article to a topic
    Publish {
        /// Topic to publish to
        topic: String,
        /// Article URL (the dedup key)
        #[arg(long)]
        url: String,
        /// Provider tag to stamp
        #[arg(long, default_value = "manual")]
        source: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        image: Option<String>,
        /// RFC 3339 publication timestamp
        #[arg(long)]
        published_at: Option<String>,
        #[arg(long)]
        content: Option<String>,
    },
    /// Stored article operations
    News {
        #[command(subcommand)]
        action: NewsAction,
    },
}

#[derive(Subcommand)]
enum NewsAction {
    /// List stored articles, newest publication first
    List {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 10)]
        page_size: u32,
    },
    /// Show a stored article
    Show {
        /// Article ID (full UUID or prefix)
        id: String,
    },
    /// List distinct provider tags in the store
    Sources,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Command::Poll { providers } => cmd_poll(providers).await,
        Command::Consume => cmd_consume().await,
        Command::Publish {
            topic,
            url,
            source,
            title,
            description,
            image,
            published_at,
            content,
        } => {
            cmd_publish(
                topic,
                url,
                source,
                title,
                description,
                image,
                published_at,
                content,
            )
            .await
        }
        Command::News { action } => {
            let config = Config::from_env()?;
            let db = Db::connect(config.database_url.expose_secret()).await?;
            db.migrate().await?;

            match action {
                NewsAction::List { page, page_size } => cmd_news_list(&db, page, page_size).await,
                NewsAction::Show { id } => cmd_news_show(&db, id).await,
                NewsAction::Sources => cmd_news_sources(&db).await,
            }
        }
    }
}

async fn cmd_poll(providers: Vec<String>) -> anyhow::Result<()> {
    let config = Config::from_env()?;
    if config.topics.is_empty() {
        anyhow::bail!("NEWS_TOPICS is empty, nothing to poll");
    }

    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "newsflow-poll".to_string(),
        log_level: config.log_level.clone(),
    })?;

    let db = Arc::new(
        Db::connect_with_backoff(
            config.database_url.expose_secret(),
            config.retry_interval_secs,
        )
        .await,
    );
    db.migrate().await?;
    for topic in &config.topics {
        db.ensure_topic(topic).await?;
    }

    let adapters = adapters_from_config(&config)?;
    let adapters: Vec<_> = adapters
        .into_iter()
        .filter(|a| {
            providers.is_empty()
                || providers
                    .iter()
                    .any(|p| p.eq_ignore_ascii_case(a.provider()))
        })
        .collect();
    if adapters.is_empty() {
        anyhow::bail!("no matching providers with API keys configured");
    }

    let sink: Arc<dyn ArticleSink> = Arc::new(TopicLogPublisher::new(Arc::clone(&db)));
    let poll_config = PollConfig::from(&config);

    let mut shutdown_handles = Vec::new();
    let mut tasks = Vec::new();
    for adapter in adapters {
        let state_dir = config.state_dir.join(adapter.provider().to_lowercase());
        let lock = StateLock::acquire(&state_dir)?;
        let state = ScheduleState::load(&state_dir).await?;

        let shutdown = Arc::new(Notify::new());
        shutdown_handles.push(Arc::clone(&shutdown));

        let mut poller = Poller::new(
            adapter,
            Arc::clone(&sink),
            config.topics.clone(),
            poll_config,
            state,
            shutdown,
        );
        tasks.push(tokio::spawn(async move {
            // Hold the state lock for the task's lifetime.
            let _lock = lock;
            poller.run().await
        }));
    }

    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        for shutdown in &shutdown_handles {
            shutdown.notify_one();
        }
    });

    for task in tasks {
        task.await??;
    }
    Ok(())
}

async fn cmd_consume() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    if config.topics.is_empty() {
        anyhow::bail!("NEWS_TOPICS is empty, nothing to consume");
    }

    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "newsflow-consume".to_string(),
        log_level: config.log_level.clone(),
    })?;

    let db = Arc::new(
        Db::connect_with_backoff(
            config.database_url.expose_secret(),
            config.retry_interval_secs,
        )
        .await,
    );
    db.migrate().await?;

    let shutdown = Arc::new(Notify::new());
    let consumer = DedupConsumer::new(
        db,
        config.topics.clone(),
        ConsumerConfig::from(&config),
        Arc::clone(&shutdown),
    );

    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        shutdown.notify_one();
    });

    consumer.run().await?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn cmd_publish(
    topic: String,
    url: String,
    source: String,
    title: Option<String>,
    description: Option<String>,
    image: Option<String>,
    published_at: Option<String>,
    content: Option<String>,
) -> anyhow::Result<()> {
    let config = Config::from_env()?;
    let db = Arc::new(Db::connect(config.database_url.expose_secret()).await?);
    db.migrate().await?;
    db.ensure_topic(&topic).await?;

    let mut article = Article::new(url, source);
    article.title = title;
    article.description = description;
    article.image = image;
    article.content = content;
    if let Some(raw) = published_at {
        let at = chrono::DateTime::parse_from_rfc3339(&raw)
            .map_err(|e| anyhow::anyhow!("invalid --published-at: {e}"))?;
        article.published_at = Some(at.with_timezone(&chrono::Utc));
    }

    let publisher = TopicLogPublisher::new(db);
    publisher.publish(&topic, &article).await?;
    println!("Published {} to '{topic}'", article.url);
    Ok(())
}

async fn cmd_news_list(db: &Db, page: u32, page_size: u32) -> anyhow::Result<()> {
    let listing = db.list_articles(page, page_size).await?;

    if listing.items.is_empty() {
        println!("No articles stored.");
        return Ok(());
    }

    println!(
        "{:<8}  {:<10}  {:<50}  PUBLISHED",
        "ID", "SOURCE", "TITLE"
    );
    println!("{}", "-".repeat(100));

    for article in &listing.items {
        let short_id = &article.id.to_string()[..8];
        let title = article.title.as_deref().unwrap_or("-");
        let title_display: String = title.chars().take(50).collect();
        let published = article
            .published_at
            .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<8}  {:<10}  {:<50}  {}",
            short_id, article.source, title_display, published
        );
    }

    println!("\n{} of {} article(s)", listing.items.len(), listing.total);
    Ok(())
}

async fn cmd_news_show(db: &Db, id_str: String) -> anyhow::Result<()> {
    // Support prefix matching — find the article whose ID starts with
    // the given string.
    let id = if id_str.len() < 36 {
        let listing = db.list_articles(1, 100).await?;
        let matches: Vec<_> = listing
            .items
            .iter()
            .filter(|a| a.id.to_string().starts_with(&id_str))
            .collect();
        match matches.len() {
            0 => anyhow::bail!("no article matching prefix '{id_str}'"),
            1 => matches[0].id,
            n => anyhow::bail!("{n} articles match prefix '{id_str}' — be more specific"),
        }
    } else {
        uuid::Uuid::parse_str(&id_str)?
    };

    let article = db.get_article(id).await?;

    println!("ID:           {}", article.id);
    println!("URL:          {}", article.url);
    println!("Source:       {}", article.source);
    println!("Topic:        {}", article.topic);
    println!("Title:        {}", article.title.as_deref().unwrap_or("-"));
    println!(
        "Description:  {}",
        article.description.as_deref().unwrap_or("-")
    );
    println!("Image:        {}", article.image.as_deref().unwrap_or("-"));
    println!(
        "Published:    {}",
        article
            .published_at
            .map(|at| at.to_string())
            .unwrap_or_else(|| "-".to_string())
    );
    println!("Stored:       {}", article.created_at);
    if let Some(ref content) = article.content {
        println!("---");
        println!("{content}");
    }
    Ok(())
}

async fn cmd_news_sources(db: &Db) -> anyhow::Result<()> {
    let sources = db.list_sources().await?;
    if sources.is_empty() {
        println!("No articles stored.");
        return Ok(());
    }
    for source in sources {
        println!("{source}");
    }
    Ok(())
}
