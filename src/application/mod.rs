//! Application services layer.

pub mod auth;
pub mod comments;
pub mod error;
pub mod feed;
pub mod follows;
pub mod forms;
pub mod groups;
pub mod media;
pub mod metadata;
pub mod pagination;
pub mod posts;
pub mod repos;
