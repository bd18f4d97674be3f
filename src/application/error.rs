use std::error::Error as StdError;

use thiserror::Error;

use crate::application::content::ContentError;
use crate::application::feed::FeedError;
use crate::application::repos::RepoError;
use crate::cache::CacheError;
use crate::config::LoadError;
use crate::domain::error::DomainError;
use crate::infra::error::InfraError;

/// Top-level error reported by the binary.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] LoadError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Feed(#[from] FeedError),
    #[error(transparent)]
    Content(#[from] ContentError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    /// Process exit code for this failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            AppError::Config(_) | AppError::Infra(InfraError::MissingSetting { .. }) => 78,
            AppError::Domain(_) | AppError::Feed(FeedError::InvalidPage(_)) => 65,
            AppError::Repo(err) | AppError::Feed(FeedError::Repo(err)) if err.is_retryable() => 75,
            AppError::Infra(InfraError::Database { .. }) | AppError::Cache(_) => 69,
            _ => 1,
        }
    }

    /// The error and its chain of sources, outermost first.
    pub fn messages(&self) -> Vec<String> {
        let mut messages = vec![self.to_string()];
        let mut current = self.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        messages
    }
}
