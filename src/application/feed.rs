//! Read side: paginated post listings and the post detail view.

use std::sync::Arc;

use thiserror::Error;

use crate::application::auth::CurrentUser;
use crate::application::pagination::{Page, PageNumber, Paginator};
use crate::application::repos::{
    CommentsRepo, FollowsRepo, GroupsRepo, PostQueryFilter, PostsRepo, RepoError, UsersRepo,
};
use crate::domain::entities::{CommentRecord, GroupRecord, PostRecord, UserRecord};

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("unknown group")]
    UnknownGroup,
    #[error("unknown author")]
    UnknownAuthor,
    #[error("unknown post")]
    UnknownPost,
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone)]
pub struct GroupListing {
    pub group: GroupRecord,
    pub page: Page<PostRecord>,
}

#[derive(Debug, Clone)]
pub struct ProfileListing {
    pub author: UserRecord,
    pub page: Page<PostRecord>,
    pub post_count: u64,
    /// Whether the requesting user follows `author`. Always false for
    /// anonymous requests and for one's own profile.
    pub following: bool,
}

#[derive(Debug, Clone)]
pub struct PostDetail {
    pub post: PostRecord,
    pub author_post_count: u64,
    pub comments: Vec<CommentRecord>,
    pub can_edit: bool,
}

#[derive(Clone)]
pub struct FeedService {
    posts: Arc<dyn PostsRepo>,
    groups: Arc<dyn GroupsRepo>,
    users: Arc<dyn UsersRepo>,
    follows: Arc<dyn FollowsRepo>,
    comments: Arc<dyn CommentsRepo>,
}

impl FeedService {
    pub fn new(
        posts: Arc<dyn PostsRepo>,
        groups: Arc<dyn GroupsRepo>,
        users: Arc<dyn UsersRepo>,
        follows: Arc<dyn FollowsRepo>,
        comments: Arc<dyn CommentsRepo>,
    ) -> Self {
        Self {
            posts,
            groups,
            users,
            follows,
            comments,
        }
    }

    /// Every post, newest first.
    pub async fn index(&self, page: PageNumber) -> Result<Page<PostRecord>, FeedError> {
        self.paginate(&PostQueryFilter::all(), page).await
    }

    pub async fn group(&self, slug: &str, page: PageNumber) -> Result<GroupListing, FeedError> {
        let group = self
            .groups
            .find_by_slug(slug)
            .await?
            .ok_or(FeedError::UnknownGroup)?;
        let page = self.paginate(&PostQueryFilter::group(group.id), page).await?;
        Ok(GroupListing { group, page })
    }

    pub async fn profile(
        &self,
        username: &str,
        page: PageNumber,
        viewer: Option<&CurrentUser>,
    ) -> Result<ProfileListing, FeedError> {
        let author = self
            .users
            .find_by_username(username)
            .await?
            .ok_or(FeedError::UnknownAuthor)?;
        let page = self
            .paginate(&PostQueryFilter::author(author.id), page)
            .await?;
        let post_count = page.total_count;

        let following = match viewer {
            Some(viewer) if viewer.id != author.id => {
                self.follows.is_following(viewer.id, author.id).await?
            }
            _ => false,
        };

        Ok(ProfileListing {
            author,
            page,
            post_count,
            following,
        })
    }

    /// Posts by authors the viewer follows.
    pub async fn follow_feed(
        &self,
        viewer: &CurrentUser,
        page: PageNumber,
    ) -> Result<Page<PostRecord>, FeedError> {
        self.paginate(&PostQueryFilter::followed_by(viewer.id), page)
            .await
    }

    pub async fn post_detail(
        &self,
        post_id: i64,
        viewer: Option<&CurrentUser>,
    ) -> Result<PostDetail, FeedError> {
        let post = self
            .posts
            .find_post(post_id)
            .await?
            .ok_or(FeedError::UnknownPost)?;
        let author_post_count = self
            .posts
            .count_posts(&PostQueryFilter::author(post.author_id))
            .await?;
        let comments = self.comments.list_for_post(post.id).await?;
        let can_edit = viewer.is_some_and(|viewer| viewer.id == post.author_id);

        Ok(PostDetail {
            post,
            author_post_count,
            comments,
            can_edit,
        })
    }

    async fn paginate(
        &self,
        filter: &PostQueryFilter,
        requested: PageNumber,
    ) -> Result<Page<PostRecord>, FeedError> {
        let total = self.posts.count_posts(filter).await?;
        let paginator = Paginator::posts(total);
        let number = paginator.clamp(requested);
        let items = if total == 0 {
            Vec::new()
        } else {
            self.posts
                .list_posts(filter, paginator.request(number))
                .await?
        };
        Ok(paginator.page(number, items))
    }
}
