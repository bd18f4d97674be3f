//! Application services: candidate resolution, assembly and mutations.

pub mod assembler;
pub mod candidates;
pub mod content;
pub mod error;
pub mod feed;
pub mod overlay;
pub mod pagination;
pub mod pipeline;
pub mod repos;
