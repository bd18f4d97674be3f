use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum, builder::BoolishValueParser};
use uuid::Uuid;

use crate::domain::types::FeedSort;

/// Command-line arguments for the Feedline binary.
#[derive(Debug, Parser)]
#[command(name = "feedline", version, about = "Feedline feed assembly engine")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "FEEDLINE_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Apply pending database migrations.
    Migrate(MigrateArgs),
    /// Print an assembled feed page as JSON.
    Feed(FeedArgs),
    /// Print a page of comments under a post as JSON.
    Comments(CommentsArgs),
    /// Print a page of replies under a comment as JSON.
    Replies(RepliesArgs),
    /// Drop the cached snapshot and comment pages of a post.
    Invalidate(InvalidateArgs),
    /// Check datastore and cache connectivity.
    Health(HealthArgs),
}

impl Command {
    pub fn overrides(&self) -> &RuntimeOverrides {
        match self {
            Command::Migrate(args) => &args.overrides,
            Command::Feed(args) => &args.overrides,
            Command::Comments(args) => &args.overrides,
            Command::Replies(args) => &args.overrides,
            Command::Invalidate(args) => &args.overrides,
            Command::Health(args) => &args.overrides,
        }
    }
}

#[derive(Debug, Args, Default, Clone)]
pub struct RuntimeOverrides {
    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Override the Redis connection URL.
    #[arg(long = "redis-url", value_name = "URL")]
    pub redis_url: Option<String>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,
}

#[derive(Debug, Args, Clone)]
pub struct MigrateArgs {
    #[command(flatten)]
    pub overrides: RuntimeOverrides,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SortArg {
    Recent,
    Engagement,
}

impl From<SortArg> for FeedSort {
    fn from(value: SortArg) -> Self {
        match value {
            SortArg::Recent => FeedSort::Recent,
            SortArg::Engagement => FeedSort::Engagement,
        }
    }
}

#[derive(Debug, Args, Clone)]
pub struct FeedArgs {
    #[command(flatten)]
    pub overrides: RuntimeOverrides,

    /// Viewer the overlay fields are computed for.
    #[arg(long, value_name = "UUID")]
    pub viewer: Option<Uuid>,

    #[arg(long, default_value_t = 1)]
    pub page: u32,

    /// Defaults to `feed.page_size`.
    #[arg(long = "page-size", value_name = "COUNT")]
    pub page_size: Option<u32>,

    /// Rank by search relevance instead of the general feed.
    #[arg(long, value_name = "QUERY")]
    pub search: Option<String>,

    /// Restrict to one author.
    #[arg(long, value_name = "UUID", conflicts_with = "tag")]
    pub author: Option<Uuid>,

    /// Restrict to one tag.
    #[arg(long, value_name = "TAG")]
    pub tag: Option<String>,

    #[arg(long, value_enum, default_value_t = SortArg::Recent)]
    pub sort: SortArg,
}

#[derive(Debug, Args, Clone)]
pub struct CommentsArgs {
    #[command(flatten)]
    pub overrides: RuntimeOverrides,

    #[arg(long, value_name = "UUID")]
    pub post: Uuid,

    #[arg(long, default_value_t = 1)]
    pub page: u32,
}

#[derive(Debug, Args, Clone)]
pub struct RepliesArgs {
    #[command(flatten)]
    pub overrides: RuntimeOverrides,

    #[arg(long, value_name = "UUID")]
    pub comment: Uuid,

    #[arg(long, default_value_t = 1)]
    pub page: u32,
}

#[derive(Debug, Args, Clone)]
pub struct InvalidateArgs {
    #[command(flatten)]
    pub overrides: RuntimeOverrides,

    #[arg(long, value_name = "UUID")]
    pub post: Uuid,
}

#[derive(Debug, Args, Clone)]
pub struct HealthArgs {
    #[command(flatten)]
    pub overrides: RuntimeOverrides,
}
