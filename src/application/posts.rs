//! Creating and editing posts from the web forms.

use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;
use tracing::{info, warn};

use crate::application::auth::CurrentUser;
use crate::application::forms::FormErrors;
use crate::application::media::{MediaError, MediaStore};
use crate::application::metadata::probe_image;
use crate::application::repos::{
    CreatePostParams, GroupsRepo, PostsRepo, PostsWriteRepo, RepoError, UpdatePostParams,
};
use crate::domain::entities::{GroupRecord, PostRecord};
use crate::domain::posts::normalize_text;

pub const INVALID_CHOICE_MESSAGE: &str =
    "Select a valid choice. That choice is not one of the available choices.";
pub const INVALID_IMAGE_MESSAGE: &str = "Upload a valid image. The file you uploaded was either not an image or a corrupted image.";
pub const CONFLICTING_IMAGE_MESSAGE: &str =
    "Please either submit a file or check the clear checkbox, not both.";

#[derive(Debug, Error)]
pub enum PostError {
    #[error("unknown post")]
    UnknownPost,
    #[error("only the author may edit this post")]
    NotAuthor,
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Media(#[from] MediaError),
}

#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub data: Bytes,
}

/// Raw values submitted through the post form.
#[derive(Debug, Clone, Default)]
pub struct PostSubmission {
    pub text: String,
    /// Group id as typed into the select; empty means "no group".
    pub group: String,
    pub image: Option<ImageUpload>,
    pub clear_image: bool,
}

#[derive(Debug)]
pub enum PostFormOutcome {
    Saved(PostRecord),
    Invalid(FormErrors),
}

enum ImageChange {
    Keep,
    Clear,
    Replace(ImageUpload),
}

struct ValidatedPost {
    text: String,
    group_id: Option<i64>,
    image: ImageChange,
}

#[derive(Clone)]
pub struct PostService {
    posts: Arc<dyn PostsRepo>,
    writer: Arc<dyn PostsWriteRepo>,
    groups: Arc<dyn GroupsRepo>,
    media: Arc<dyn MediaStore>,
}

impl PostService {
    pub fn new(
        posts: Arc<dyn PostsRepo>,
        writer: Arc<dyn PostsWriteRepo>,
        groups: Arc<dyn GroupsRepo>,
        media: Arc<dyn MediaStore>,
    ) -> Self {
        Self {
            posts,
            writer,
            groups,
            media,
        }
    }

    pub async fn group_choices(&self) -> Result<Vec<GroupRecord>, PostError> {
        Ok(self.groups.list_groups().await?)
    }

    /// Create a post authored by `author`. Any author supplied by the client is ignored.
    pub async fn create(
        &self,
        author: &CurrentUser,
        submission: PostSubmission,
    ) -> Result<PostFormOutcome, PostError> {
        let validated = match self.validate(submission).await? {
            Ok(validated) => validated,
            Err(errors) => return Ok(PostFormOutcome::Invalid(errors)),
        };

        let stored = match validated.image {
            ImageChange::Replace(upload) => Some(self.store_image(upload).await?),
            ImageChange::Keep | ImageChange::Clear => None,
        };

        let written = self
            .writer
            .create_post(CreatePostParams {
                author_id: author.id,
                text: validated.text,
                group_id: validated.group_id,
                image: stored.clone(),
            })
            .await;
        let post = self.discard_image_on_error(written, stored.as_deref()).await?;

        info!(
            target = "scrivo::posts",
            post_id = post.id,
            author = %author.username,
            "post created"
        );
        Ok(PostFormOutcome::Saved(post))
    }

    /// Load a post for editing, enforcing that `editor` wrote it.
    pub async fn editable(&self, post_id: i64, editor: &CurrentUser) -> Result<PostRecord, PostError> {
        let post = self
            .posts
            .find_post(post_id)
            .await?
            .ok_or(PostError::UnknownPost)?;
        if post.author_id != editor.id {
            return Err(PostError::NotAuthor);
        }
        Ok(post)
    }

    /// Rewrite text, group and image of an existing post. `pub_date` is kept.
    pub async fn update(
        &self,
        post_id: i64,
        editor: &CurrentUser,
        submission: PostSubmission,
    ) -> Result<PostFormOutcome, PostError> {
        let current = self.editable(post_id, editor).await?;

        let validated = match self.validate(submission).await? {
            Ok(validated) => validated,
            Err(errors) => return Ok(PostFormOutcome::Invalid(errors)),
        };

        let (image, stored) = match validated.image {
            ImageChange::Keep => (current.image, None),
            ImageChange::Clear => (None, None),
            ImageChange::Replace(upload) => {
                let stored = self.store_image(upload).await?;
                (Some(stored.clone()), Some(stored))
            }
        };

        let written = self
            .writer
            .update_post(UpdatePostParams {
                id: current.id,
                text: validated.text,
                group_id: validated.group_id,
                image,
            })
            .await;
        let post = self.discard_image_on_error(written, stored.as_deref()).await?;

        info!(
            target = "scrivo::posts",
            post_id = post.id,
            author = %editor.username,
            "post updated"
        );
        Ok(PostFormOutcome::Saved(post))
    }

    async fn store_image(&self, upload: ImageUpload) -> Result<String, PostError> {
        Ok(self
            .media
            .store_post_image(&upload.file_name, upload.data)
            .await?)
    }

    /// A failed row write must not leave a freshly stored image behind.
    async fn discard_image_on_error(
        &self,
        written: Result<PostRecord, RepoError>,
        stored: Option<&str>,
    ) -> Result<PostRecord, PostError> {
        let err = match written {
            Ok(post) => return Ok(post),
            Err(err) => err,
        };
        if let Some(path) = stored
            && let Err(remove_err) = self.media.remove_post_image(path).await
        {
            warn!(
                target = "scrivo::posts",
                stored_path = path,
                error = %remove_err,
                "could not remove image of failed post write"
            );
        }
        Err(err.into())
    }

    async fn validate(
        &self,
        submission: PostSubmission,
    ) -> Result<Result<ValidatedPost, FormErrors>, PostError> {
        let mut errors = FormErrors::new();

        let text = normalize_text(&submission.text).unwrap_or_else(|message| {
            errors.add("text", message);
            String::new()
        });

        let group_id = match self.resolve_group(&submission.group).await? {
            Ok(group_id) => group_id,
            Err(message) => {
                errors.add("group", message);
                None
            }
        };

        let image = match (submission.image, submission.clear_image) {
            (Some(_), true) => {
                errors.add("image", CONFLICTING_IMAGE_MESSAGE);
                ImageChange::Keep
            }
            (Some(upload), false) => {
                if probe_image(&upload.data).is_ok() {
                    ImageChange::Replace(upload)
                } else {
                    errors.add("image", INVALID_IMAGE_MESSAGE);
                    ImageChange::Keep
                }
            }
            (None, true) => ImageChange::Clear,
            (None, false) => ImageChange::Keep,
        };

        Ok(errors.into_result().map(|()| ValidatedPost {
            text,
            group_id,
            image,
        }))
    }

    async fn resolve_group(&self, raw: &str) -> Result<Result<Option<i64>, &'static str>, PostError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(Ok(None));
        }
        let Ok(id) = raw.parse::<i64>() else {
            return Ok(Err(INVALID_CHOICE_MESSAGE));
        };
        match self.groups.find_group(id).await? {
            Some(group) => Ok(Ok(Some(group.id))),
            None => Ok(Err(INVALID_CHOICE_MESSAGE)),
        }
    }
}
