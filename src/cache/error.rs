use thiserror::Error;

/// Failures raised by a key-value store backend.
///
/// Read paths never surface these to callers; they are logged and treated as
/// misses. Mutation paths (invalidation, page appends) return them so the
/// caller can decide how to react.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),
    #[error("cache operation `{op}` timed out")]
    Timeout { op: &'static str },
    #[error("cache payload encoding failed: {0}")]
    Encode(String),
    #[error("cache script returned an unexpected reply: {0}")]
    Script(String),
}

impl CacheError {
    pub fn backend(err: impl std::fmt::Display) -> Self {
        Self::Backend(err.to_string())
    }

    pub fn encode(err: impl std::fmt::Display) -> Self {
        Self::Encode(err.to_string())
    }
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_timeout() {
            Self::Timeout { op: "redis" }
        } else {
            Self::backend(err)
        }
    }
}
