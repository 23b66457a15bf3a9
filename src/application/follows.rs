//! Follow edges between readers and authors.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::application::auth::CurrentUser;
use crate::application::repos::{FollowsRepo, RepoError, UsersRepo};

#[derive(Debug, Error)]
pub enum FollowError {
    #[error("unknown author")]
    UnknownAuthor,
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowOutcome {
    Followed,
    AlreadyFollowing,
    /// Following oneself is skipped silently.
    SelfFollow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnfollowOutcome {
    Unfollowed,
    NotFollowing,
}

#[derive(Clone)]
pub struct FollowService {
    users: Arc<dyn UsersRepo>,
    follows: Arc<dyn FollowsRepo>,
}

impl FollowService {
    pub fn new(users: Arc<dyn UsersRepo>, follows: Arc<dyn FollowsRepo>) -> Self {
        Self { users, follows }
    }

    pub async fn follow(
        &self,
        follower: &CurrentUser,
        username: &str,
    ) -> Result<FollowOutcome, FollowError> {
        let author_id = self.author_id(username).await?;
        if author_id == follower.id {
            return Ok(FollowOutcome::SelfFollow);
        }

        let created = self.follows.follow(follower.id, author_id).await?;
        if created {
            info!(
                target = "scrivo::follows",
                follower = %follower.username,
                author = username,
                "follow edge created"
            );
            Ok(FollowOutcome::Followed)
        } else {
            Ok(FollowOutcome::AlreadyFollowing)
        }
    }

    /// Remove the edge; a missing edge is a no-op.
    pub async fn unfollow(
        &self,
        follower: &CurrentUser,
        username: &str,
    ) -> Result<UnfollowOutcome, FollowError> {
        let author_id = self.author_id(username).await?;
        if self.follows.unfollow(follower.id, author_id).await? {
            info!(
                target = "scrivo::follows",
                follower = %follower.username,
                author = username,
                "follow edge removed"
            );
            Ok(UnfollowOutcome::Unfollowed)
        } else {
            Ok(UnfollowOutcome::NotFollowing)
        }
    }

    async fn author_id(&self, username: &str) -> Result<i64, FollowError> {
        self.users
            .find_by_username(username)
            .await?
            .map(|user| user.id)
            .ok_or(FollowError::UnknownAuthor)
    }
}
