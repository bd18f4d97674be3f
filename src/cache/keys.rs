//! Cache key definitions.
//!
//! Every key the engine reads or writes is produced here. The shapes are part
//! of the wire contract with anything else that inspects the store directly:
//!
//! - static snapshot: `{collection}:{id}`
//! - page bucket: `{collection}:{parent}:page:{n}`
//! - page cursor: `{collection}:{parent}:lastPage`

use std::fmt;

/// Name of a cached collection, used as the first key segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Collection(&'static str);

impl Collection {
    /// Post static snapshots.
    pub const POSTS: Collection = Collection("posts");
    /// Comment pages under a post.
    pub const COMMENTS: Collection = Collection("comments");
    /// Reply pages under a comment.
    pub const REPLIES: Collection = Collection("replies");

    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

const PAGE_SEGMENT: &str = "page";
const CURSOR_SEGMENT: &str = "lastPage";

pub fn snapshot_key(collection: Collection, id: impl fmt::Display) -> String {
    format!("{collection}:{id}")
}

pub fn page_key(collection: Collection, parent: impl fmt::Display, page: u32) -> String {
    format!("{collection}:{parent}:{PAGE_SEGMENT}:{page}")
}

/// Prefix of every page bucket for a parent; the page number is appended to it.
pub fn page_key_prefix(collection: Collection, parent: impl fmt::Display) -> String {
    format!("{collection}:{parent}:{PAGE_SEGMENT}:")
}

pub fn page_cursor_key(collection: Collection, parent: impl fmt::Display) -> String {
    format!("{collection}:{parent}:{CURSOR_SEGMENT}")
}

/// Glob pattern matching every key nested under a parent.
pub fn parent_pattern(collection: Collection, parent: impl fmt::Display) -> String {
    format!("{collection}:{parent}:*")
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    #[test]
    fn snapshot_key_shape() {
        assert_eq!(snapshot_key(Collection::POSTS, 42), "posts:42");
    }

    #[test]
    fn page_keys_share_prefix() {
        let parent = Uuid::nil();
        let key = page_key(Collection::COMMENTS, parent, 3);
        assert_eq!(
            key,
            "comments:00000000-0000-0000-0000-000000000000:page:3"
        );
        assert_eq!(
            format!("{}3", page_key_prefix(Collection::COMMENTS, parent)),
            key
        );
    }

    #[test]
    fn cursor_key_shape() {
        assert_eq!(page_cursor_key(Collection::REPLIES, 7), "replies:7:lastPage");
    }

    #[test]
    fn parent_pattern_excludes_snapshot_key() {
        assert_eq!(parent_pattern(Collection::COMMENTS, 9), "comments:9:*");
        assert_ne!(parent_pattern(Collection::POSTS, 9), snapshot_key(Collection::POSTS, 9));
    }

    #[test]
    fn custom_collection_displays_its_name() {
        let collection = Collection::new("stories");
        assert_eq!(collection.to_string(), "stories");
        assert_eq!(collection.as_str(), "stories");
    }
}
