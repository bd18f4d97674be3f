use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("domain entity `{entity}` not found")]
    NotFound { entity: &'static str },
    #[error("domain validation failed: {message}")]
    Validation { message: String },
}

impl DomainError {
    pub fn not_found(entity: &'static str) -> Self {
        Self::NotFound { entity }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}

/// Maximum accepted length, in characters, of a comment or reply body.
pub const MAX_COMMENT_CHARS: usize = 4000;

/// Validate a user-supplied comment or reply body, returning the trimmed text.
pub fn validate_comment_body(body: &str) -> Result<&str, DomainError> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation("comment body must not be empty"));
    }
    if trimmed.chars().count() > MAX_COMMENT_CHARS {
        return Err(DomainError::validation(format!(
            "comment body exceeds {MAX_COMMENT_CHARS} characters"
        )));
    }
    Ok(trimmed)
}
