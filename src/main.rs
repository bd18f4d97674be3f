use std::{io::Write, process, sync::Arc};

use feedline::{
    application::{
        candidates::{BoostPolicy, CandidateResolver},
        error::AppError,
        feed::{FeedFilter, FeedLimits, FeedRequest, FeedService},
        overlay::OverlayMerger,
        pipeline::FeedPipeline,
        repos::{CandidateRepo, HealthRepo, OverlaySource, SearchRepo},
    },
    cache::{
        CacheClient, CacheConfig, ChildSource, Collection, Invalidator, PageBuffer,
        SnapshotLoader, SnapshotSource,
    },
    config,
    domain::entities::{CommentRecord, PostOverlay, PostSnapshot, ReplyRecord},
    infra::{db::PostgresRepositories, error::InfraError, telemetry},
};
use serde::Serialize;
use serde_json::json;
use tokio::join;
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(i32::from(error.exit_code()));
    }
}

fn report_application_error(error: &AppError) {
    let messages = error.messages();
    if dispatcher::has_been_set() {
        error!(error = %error, causes = ?messages, "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_max_level(Level::ERROR)
        .with_writer(std::io::stderr)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, causes = ?messages, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;
    telemetry::init(&settings.logging)?;

    match cli_args.command {
        config::Command::Migrate(_) => run_migrate(&settings).await,
        config::Command::Feed(args) => run_feed(&settings, args).await,
        config::Command::Comments(args) => run_comments(&settings, args).await,
        config::Command::Replies(args) => run_replies(&settings, args).await,
        config::Command::Invalidate(args) => run_invalidate(&settings, args).await,
        config::Command::Health(_) => run_health(&settings).await,
    }
}

struct AppContext {
    repositories: PostgresRepositories,
    cache: CacheClient,
    feed: FeedService,
}

async fn init_repositories(settings: &config::Settings) -> Result<PostgresRepositories, AppError> {
    let pool = PostgresRepositories::connect(&settings.database).await?;
    Ok(PostgresRepositories::new(pool))
}

async fn build_application_context(settings: &config::Settings) -> Result<AppContext, AppError> {
    let repositories = init_repositories(settings).await?;
    let cache_config = CacheConfig::from(&settings.cache);
    let cache = CacheClient::connect(&cache_config).await?;

    let candidates: Arc<dyn CandidateRepo> = Arc::new(repositories.clone());
    let search: Arc<dyn SearchRepo> = Arc::new(repositories.clone());
    let snapshots: Arc<dyn SnapshotSource<PostSnapshot>> = Arc::new(repositories.clone());
    let overlays: Arc<dyn OverlaySource<PostOverlay>> = Arc::new(repositories.clone());
    let comment_source: Arc<dyn ChildSource<CommentRecord>> = Arc::new(repositories.clone());
    let reply_source: Arc<dyn ChildSource<ReplyRecord>> = Arc::new(repositories.clone());

    let feed_settings = &settings.feed;
    let resolver = CandidateResolver::new(
        candidates,
        Some(search),
        BoostPolicy {
            limit: feed_settings.boost_limit,
            first_page_only: feed_settings.boost_first_page_only,
        },
    );
    let pipeline = FeedPipeline::new(
        resolver,
        SnapshotLoader::new(cache.clone(), snapshots, cache_config.snapshot_ttl()),
        OverlayMerger::new(overlays, feed_settings.record_views),
    );

    let comments = Arc::new(PageBuffer::new(
        cache.clone(),
        comment_source,
        Collection::COMMENTS,
        feed_settings.comment_page_size.get(),
        cache_config.page_ttl(),
    ));
    let replies = Arc::new(PageBuffer::new(
        cache.clone(),
        reply_source,
        Collection::REPLIES,
        feed_settings.reply_page_size.get(),
        cache_config.page_ttl(),
    ));

    let feed = FeedService::new(
        pipeline,
        comments,
        replies,
        FeedLimits {
            default_page_size: feed_settings.page_size.get(),
            max_page_size: feed_settings.max_page_size.get(),
        },
    );

    Ok(AppContext {
        repositories,
        cache,
        feed,
    })
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), AppError> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|err| AppError::unexpected(format!("failed to encode output: {err}")))?;
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{rendered}").map_err(InfraError::from)?;
    Ok(())
}

async fn run_migrate(settings: &config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(settings).await?;
    PostgresRepositories::run_migrations(repositories.pool()).await?;
    info!(target = "feedline::migrate", "Migrations applied");
    Ok(())
}

async fn run_feed(settings: &config::Settings, args: config::FeedArgs) -> Result<(), AppError> {
    let app = build_application_context(settings).await?;

    let filter = match (args.author, args.tag) {
        (Some(author), _) => FeedFilter::Author(author),
        (None, Some(tag)) => FeedFilter::Tag(tag),
        (None, None) => FeedFilter::All,
    };
    let page = app
        .feed
        .feed(FeedRequest {
            viewer: args.viewer,
            filter,
            sort: args.sort.into(),
            search: args.search,
            page: args.page,
            page_size: args.page_size,
        })
        .await?;

    info!(
        target = "feedline::feed",
        page = page.page,
        items = page.items.len(),
        has_more = page.has_more,
        "Feed page assembled"
    );
    print_json(&page)?;
    app.feed.drain().await;
    Ok(())
}

async fn run_comments(
    settings: &config::Settings,
    args: config::CommentsArgs,
) -> Result<(), AppError> {
    let app = build_application_context(settings).await?;
    let page = app.feed.comments(args.post, args.page).await?;
    print_json(&page)
}

async fn run_replies(
    settings: &config::Settings,
    args: config::RepliesArgs,
) -> Result<(), AppError> {
    let app = build_application_context(settings).await?;
    let page = app.feed.replies(args.comment, args.page).await?;
    print_json(&page)
}

async fn run_invalidate(
    settings: &config::Settings,
    args: config::InvalidateArgs,
) -> Result<(), AppError> {
    let cache = CacheClient::connect(&CacheConfig::from(&settings.cache)).await?;
    let report = Invalidator::new(cache)
        .invalidate_parent(Collection::COMMENTS, args.post, Some(Collection::POSTS))
        .await?;
    print_json(&json!({
        "post": args.post,
        "swept": report.swept,
        "deleted": report.deleted,
    }))
}

async fn run_health(settings: &config::Settings) -> Result<(), AppError> {
    let app = build_application_context(settings).await?;
    let (database, cache) = join!(app.repositories.ping(), app.cache.ping());

    print_json(&json!({
        "database": database.as_ref().map(|_| "ok").unwrap_or("unavailable"),
        "cache": cache.as_ref().map(|_| "ok").unwrap_or("unavailable"),
    }))?;

    database?;
    cache?;
    Ok(())
}
