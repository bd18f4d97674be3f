//! Feed cache-assembly engine.
//!
//! Resolves candidate ids, loads viewer-independent snapshots through a
//! cache-aside layer, merges live overlays, and keeps append-only pages of
//! comments and replies in the cache.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
