//! Shared domain enumerations aligned with persisted database enums.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "media_kind", rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
    Audio,
}

/// Ordering applied by the general ranked candidate source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedSort {
    #[default]
    Recent,
    Engagement,
}

impl FeedSort {
    pub fn as_str(self) -> &'static str {
        match self {
            FeedSort::Recent => "recent",
            FeedSort::Engagement => "engagement",
        }
    }
}

impl fmt::Display for FeedSort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for FeedSort {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "recent" => Ok(FeedSort::Recent),
            "engagement" => Ok(FeedSort::Engagement),
            _ => Err(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feed_sort_parses_its_own_names() {
        for sort in [FeedSort::Recent, FeedSort::Engagement] {
            assert_eq!(FeedSort::try_from(sort.as_str()), Ok(sort));
        }
        assert!(FeedSort::try_from("popular").is_err());
    }

    #[test]
    fn media_kind_serializes_snake_case() {
        let json = serde_json::to_string(&MediaKind::Video).expect("serialize");
        assert_eq!(json, "\"video\"");
    }
}
