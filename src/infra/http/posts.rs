//! Post create/edit forms and comment submission.

use axum::{
    Form,
    extract::{Path, State, rejection::FormRejection},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::{Multipart, multipart::MultipartError};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::{
    application::{
        auth::CurrentUser,
        comments::CommentOutcome,
        error::HttpError,
        forms::FormErrors,
        posts::{ImageUpload, PostError, PostFormOutcome, PostSubmission},
    },
    domain::entities::PostRecord,
    presentation::views::{
        LayoutChrome, LayoutContext, PostFormTemplate, PostFormView, post_href, profile_href,
        render_error_response, render_not_found_response, render_template_response,
    },
};

use super::{auth::Viewer, public::HttpState, public::parse_id};

const SOURCE: &str = "infra::http::posts";
const CREATE_ACTION: &str = "/create/";

#[derive(Debug)]
enum PostPayloadError {
    TooLarge,
    Invalid(MultipartError),
}

impl From<PostPayloadError> for HttpError {
    fn from(error: PostPayloadError) -> Self {
        match error {
            PostPayloadError::TooLarge => HttpError::new(
                SOURCE,
                StatusCode::PAYLOAD_TOO_LARGE,
                "Uploaded file is too large",
                "Multipart body exceeded the configured limit",
            ),
            PostPayloadError::Invalid(err) => HttpError::from_error(
                SOURCE,
                StatusCode::BAD_REQUEST,
                "Form data was invalid",
                &err,
            ),
        }
    }
}

/// Collect the post form fields. Unknown fields, an `author` included, are skipped.
async fn read_post_submission(
    multipart: &mut Multipart,
) -> Result<PostSubmission, PostPayloadError> {
    let mut submission = PostSubmission::default();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => return Err(classify_multipart_error(err)),
        };

        match field.name() {
            Some("text") => {
                submission.text = field.text().await.map_err(classify_multipart_error)?;
            }
            Some("group") => {
                submission.group = field.text().await.map_err(classify_multipart_error)?;
            }
            Some("image-clear") => {
                let value = field.text().await.map_err(classify_multipart_error)?;
                submission.clear_image = matches!(
                    value.trim().to_ascii_lowercase().as_str(),
                    "on" | "true" | "1"
                );
            }
            Some("image") => {
                let file_name = field
                    .file_name()
                    .map(str::to_string)
                    .filter(|name| !name.trim().is_empty());
                let data = field.bytes().await.map_err(classify_multipart_error)?;
                // A file input left blank still posts an empty part.
                if let Some(file_name) = file_name
                    && !data.is_empty()
                {
                    submission.image = Some(ImageUpload { file_name, data });
                }
            }
            _ => continue,
        }
    }

    Ok(submission)
}

fn classify_multipart_error(err: MultipartError) -> PostPayloadError {
    match err.status() {
        StatusCode::PAYLOAD_TOO_LARGE => PostPayloadError::TooLarge,
        _ => PostPayloadError::Invalid(err),
    }
}

struct FormState<'a> {
    action: String,
    is_edit: bool,
    text: &'a str,
    group: &'a str,
    current_image: Option<&'a str>,
    errors: FormErrors,
}

async fn form_page(
    state: &HttpState,
    chrome: LayoutChrome,
    form: FormState<'_>,
) -> Response {
    let groups = match state.posts.group_choices().await {
        Ok(groups) => groups,
        Err(err) => return render_error_response(chrome, err.into()),
    };

    let title = if form.is_edit { "Edit post" } else { "New post" };
    let view = LayoutContext::new(
        chrome,
        title,
        PostFormView::new(
            form.action,
            form.is_edit,
            form.text,
            form.group,
            &groups,
            form.current_image,
            form.errors,
        ),
    );
    render_template_response(PostFormTemplate { view }, StatusCode::OK)
}

fn group_value(post: &PostRecord) -> String {
    post.group
        .as_ref()
        .map(|group| group.id.to_string())
        .unwrap_or_default()
}

pub(super) async fn create_form(State(state): State<HttpState>, viewer: Viewer) -> Response {
    if let Err(redirect) = viewer.require_user() {
        return redirect;
    }

    form_page(
        &state,
        viewer.chrome(),
        FormState {
            action: CREATE_ACTION.to_string(),
            is_edit: false,
            text: "",
            group: "",
            current_image: None,
            errors: FormErrors::new(),
        },
    )
    .await
}

pub(super) async fn create_submit(
    State(state): State<HttpState>,
    viewer: Viewer,
    mut multipart: Multipart,
) -> Response {
    let user = match viewer.require_user() {
        Ok(user) => user,
        Err(redirect) => return redirect,
    };

    let submission = match read_post_submission(&mut multipart).await {
        Ok(submission) => submission,
        Err(err) => return render_error_response(viewer.chrome(), err.into()),
    };
    let text = submission.text.clone();
    let group = submission.group.clone();

    match state.posts.create(user, submission).await {
        Ok(PostFormOutcome::Saved(_)) => Redirect::to(&profile_href(&user.username)).into_response(),
        Ok(PostFormOutcome::Invalid(errors)) => {
            form_page(
                &state,
                viewer.chrome(),
                FormState {
                    action: CREATE_ACTION.to_string(),
                    is_edit: false,
                    text: &text,
                    group: &group,
                    current_image: None,
                    errors,
                },
            )
            .await
        }
        Err(err) => render_error_response(viewer.chrome(), err.into()),
    }
}

/// Resolve the post for an edit request.
///
/// Anonymous users go to login and non-authors back to the post page.
async fn load_editable(
    state: &HttpState,
    viewer: &Viewer,
    raw_id: &str,
) -> Result<(PostRecord, CurrentUser), Response> {
    let user = viewer.require_user()?.clone();
    let Some(post_id) = parse_id(raw_id) else {
        return Err(render_not_found_response(viewer.chrome()));
    };

    match state.posts.editable(post_id, &user).await {
        Ok(post) => Ok((post, user)),
        Err(PostError::NotAuthor) => Err(Redirect::to(&post_href(post_id)).into_response()),
        Err(err) => Err(render_error_response(viewer.chrome(), err.into())),
    }
}

pub(super) async fn edit_form(
    State(state): State<HttpState>,
    viewer: Viewer,
    Path(raw_id): Path<String>,
) -> Response {
    let (post, _) = match load_editable(&state, &viewer, &raw_id).await {
        Ok(found) => found,
        Err(response) => return response,
    };

    let group = group_value(&post);
    form_page(
        &state,
        viewer.chrome(),
        FormState {
            action: format!("{}edit/", post_href(post.id)),
            is_edit: true,
            text: &post.text,
            group: &group,
            current_image: post.image.as_deref(),
            errors: FormErrors::new(),
        },
    )
    .await
}

pub(super) async fn edit_submit(
    State(state): State<HttpState>,
    viewer: Viewer,
    Path(raw_id): Path<String>,
    mut multipart: Multipart,
) -> Response {
    let (post, user) = match load_editable(&state, &viewer, &raw_id).await {
        Ok(found) => found,
        Err(response) => return response,
    };

    let submission = match read_post_submission(&mut multipart).await {
        Ok(submission) => submission,
        Err(err) => return render_error_response(viewer.chrome(), err.into()),
    };
    let text = submission.text.clone();
    let group = submission.group.clone();

    match state.posts.update(post.id, &user, submission).await {
        Ok(PostFormOutcome::Saved(saved)) => Redirect::to(&post_href(saved.id)).into_response(),
        Ok(PostFormOutcome::Invalid(errors)) => {
            form_page(
                &state,
                viewer.chrome(),
                FormState {
                    action: format!("{}edit/", post_href(post.id)),
                    is_edit: true,
                    text: &text,
                    group: &group,
                    current_image: post.image.as_deref(),
                    errors,
                },
            )
            .await
        }
        Err(PostError::NotAuthor) => Redirect::to(&post_href(post.id)).into_response(),
        Err(err) => render_error_response(viewer.chrome(), err.into()),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct CommentForm {
    text: String,
}

pub(super) async fn add_comment(
    State(state): State<HttpState>,
    viewer: Viewer,
    Path(raw_id): Path<String>,
    form: Result<Form<CommentForm>, FormRejection>,
) -> Response {
    // Authentication comes before body decoding.
    let user = match viewer.require_user() {
        Ok(user) => user,
        Err(redirect) => return redirect,
    };
    let Some(post_id) = parse_id(&raw_id) else {
        return render_not_found_response(viewer.chrome());
    };
    let form = form.unwrap_or_else(|rejection| {
        debug!(
            target = "scrivo::http::comments",
            post_id,
            error = %rejection,
            "undecodable comment body treated as blank"
        );
        Form(CommentForm::default())
    });
    let Form(form) = form;

    match state.comments.add_comment(post_id, user, &form.text).await {
        Ok(CommentOutcome::Created(_)) | Ok(CommentOutcome::Dropped) => {
            Redirect::to(&post_href(post_id)).into_response()
        }
        Err(err) => {
            warn!(
                target = "scrivo::http::comments",
                post_id,
                error = %err,
                "comment submission failed"
            );
            render_error_response(viewer.chrome(), err.into())
        }
    }
}
