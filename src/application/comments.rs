use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use crate::application::auth::CurrentUser;
use crate::application::repos::{CommentsRepo, CreateCommentParams, PostsRepo, RepoError};
use crate::domain::entities::CommentRecord;
use crate::domain::posts::normalize_text;

#[derive(Debug, Error)]
pub enum CommentError {
    #[error("unknown post")]
    UnknownPost,
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug)]
pub enum CommentOutcome {
    Created(CommentRecord),
    /// The submission failed validation and was discarded.
    Dropped,
}

#[derive(Clone)]
pub struct CommentService {
    posts: Arc<dyn PostsRepo>,
    comments: Arc<dyn CommentsRepo>,
}

impl CommentService {
    pub fn new(posts: Arc<dyn PostsRepo>, comments: Arc<dyn CommentsRepo>) -> Self {
        Self { posts, comments }
    }

    pub async fn add_comment(
        &self,
        post_id: i64,
        author: &CurrentUser,
        raw_text: &str,
    ) -> Result<CommentOutcome, CommentError> {
        let post = self
            .posts
            .find_post(post_id)
            .await?
            .ok_or(CommentError::UnknownPost)?;

        let text = match normalize_text(raw_text) {
            Ok(text) => text,
            Err(reason) => {
                debug!(
                    target = "scrivo::comments",
                    post_id = post.id,
                    author = %author.username,
                    reason,
                    "comment submission dropped"
                );
                return Ok(CommentOutcome::Dropped);
            }
        };

        let comment = self
            .comments
            .create_comment(CreateCommentParams {
                post_id: post.id,
                author_id: author.id,
                text,
            })
            .await?;

        info!(
            target = "scrivo::comments",
            post_id = post.id,
            comment_id = comment.id,
            "comment added"
        );
        Ok(CommentOutcome::Created(comment))
    }
}
