use std::{io::ErrorKind, sync::Arc};

use axum::{
    Router,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use tracing::error;

use crate::{
    application::{
        auth::AuthService,
        comments::CommentService,
        error::HttpError,
        feed::FeedService,
        follows::FollowService,
        pagination::PageNumber,
        posts::PostService,
    },
    cache::{ListingCache, ListingKey},
    domain::posts::display_title,
    infra::{
        assets::{build_response, serve_static_asset},
        uploads::{UploadStorage, UploadStorageError},
    },
    presentation::views::{
        FollowTemplate, GroupPageView, GroupTemplate, IndexTemplate, LayoutChrome, LayoutContext,
        ListingView, PostDetailTemplate, PostDetailView, PostListPartial, ProfilePageView,
        ProfileTemplate, profile_href, render_error_response, render_fragment,
        render_not_found_response, render_template_response,
    },
};

use super::{
    HealthProbe,
    auth::{self, Viewer},
    db_health_response, follows,
    middleware::{log_responses, set_request_context},
    posts,
};

const INDEX_HEADING: &str = "Latest updates on the site";
const FOLLOW_HEADING: &str = "Posts from authors you follow";

#[derive(Clone)]
pub struct HttpState {
    pub feed: Arc<FeedService>,
    pub posts: Arc<PostService>,
    pub comments: Arc<CommentService>,
    pub follows: Arc<FollowService>,
    pub auth: Arc<AuthService>,
    pub listing_cache: Arc<ListingCache>,
    pub uploads: Arc<UploadStorage>,
    pub health: Arc<dyn HealthProbe>,
    pub secure_cookie: bool,
    pub upload_body_limit: usize,
}

pub fn build_router(state: HttpState) -> Router {
    let upload_body_limit = state.upload_body_limit;

    Router::new()
        .route("/", get(index))
        .route("/group/{slug}/", get(group_listing))
        .route("/profile/{username}/", get(profile))
        .route("/profile/{username}/follow/", get(follows::follow_author))
        .route("/profile/{username}/unfollow/", get(follows::unfollow_author))
        .route("/follow/", get(follow_index))
        .route("/posts/{id}/", get(post_detail))
        .route(
            "/posts/{id}/edit/",
            get(posts::edit_form)
                .post(posts::edit_submit)
                .layer(DefaultBodyLimit::max(upload_body_limit)),
        )
        .route("/posts/{id}/comment/", post(posts::add_comment))
        .route(
            "/create/",
            get(posts::create_form)
                .post(posts::create_submit)
                .layer(DefaultBodyLimit::max(upload_body_limit)),
        )
        .route(
            "/auth/signup/",
            get(auth::signup_form).post(auth::signup_submit),
        )
        .route("/auth/login/", get(auth::login_form).post(auth::login_submit))
        .route("/auth/logout/", get(auth::logout))
        .route("/media/{*path}", get(serve_media))
        .route("/static/{*path}", get(serve_static_asset))
        .route("/_health/db", get(public_health))
        .fallback(fallback)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::resolve_session,
        ))
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct PageQuery {
    page: Option<String>,
}

impl PageQuery {
    fn number(&self) -> PageNumber {
        PageNumber::parse(self.page.as_deref())
    }
}

/// Path ids that are not integers behave like unknown ids.
pub(super) fn parse_id(raw: &str) -> Option<i64> {
    raw.parse::<i64>().ok().filter(|id| *id > 0)
}

async fn index(
    State(state): State<HttpState>,
    viewer: Viewer,
    Query(query): Query<PageQuery>,
) -> Response {
    let chrome = viewer.chrome();
    let requested = query.number();
    let key = ListingKey::index(u64::try_from(requested.get().max(1)).unwrap_or(1));

    let posts_html = match state.listing_cache.get(&key) {
        Some(html) => html.to_string(),
        None => {
            let page = match state.feed.index(requested).await {
                Ok(page) => page,
                Err(err) => return render_error_response(chrome, err.into()),
            };
            let html = match render_fragment(PostListPartial::from_page(&page, true)) {
                Ok(html) => html,
                Err(err) => return render_error_response(chrome, err),
            };
            state.listing_cache.put(key, html.as_str());
            html
        }
    };

    listing_response(chrome, "Latest posts", INDEX_HEADING, posts_html, false)
}

async fn follow_index(
    State(state): State<HttpState>,
    viewer: Viewer,
    Query(query): Query<PageQuery>,
) -> Response {
    let user = match viewer.require_user() {
        Ok(user) => user,
        Err(redirect) => return redirect,
    };
    let chrome = viewer.chrome();

    let page = match state.feed.follow_feed(user, query.number()).await {
        Ok(page) => page,
        Err(err) => return render_error_response(chrome, err.into()),
    };
    match render_fragment(PostListPartial::from_page(&page, true)) {
        Ok(posts_html) => listing_response(chrome, "Following", FOLLOW_HEADING, posts_html, true),
        Err(err) => render_error_response(chrome, err),
    }
}

fn listing_response(
    chrome: LayoutChrome,
    title: &str,
    heading: &str,
    posts_html: String,
    follow_page: bool,
) -> Response {
    let view = LayoutContext::new(
        chrome,
        title,
        ListingView {
            heading: heading.to_string(),
            posts_html,
        },
    );
    if follow_page {
        render_template_response(FollowTemplate { view }, StatusCode::OK)
    } else {
        render_template_response(IndexTemplate { view }, StatusCode::OK)
    }
}

async fn group_listing(
    State(state): State<HttpState>,
    viewer: Viewer,
    Path(slug): Path<String>,
    Query(query): Query<PageQuery>,
) -> Response {
    let chrome = viewer.chrome();
    let listing = match state.feed.group(&slug, query.number()).await {
        Ok(listing) => listing,
        Err(err) => return render_error_response(chrome, err.into()),
    };
    let posts_html = match render_fragment(PostListPartial::from_page(&listing.page, false)) {
        Ok(html) => html,
        Err(err) => return render_error_response(chrome, err),
    };

    let view = LayoutContext::new(
        chrome,
        listing.group.title.clone(),
        GroupPageView {
            title: listing.group.title,
            description: listing.group.description,
            posts_html,
        },
    );
    render_template_response(GroupTemplate { view }, StatusCode::OK)
}

async fn profile(
    State(state): State<HttpState>,
    viewer: Viewer,
    Path(username): Path<String>,
    Query(query): Query<PageQuery>,
) -> Response {
    let chrome = viewer.chrome();
    let listing = match state
        .feed
        .profile(&username, query.number(), viewer.user.as_ref())
        .await
    {
        Ok(listing) => listing,
        Err(err) => return render_error_response(chrome, err.into()),
    };
    let posts_html = match render_fragment(PostListPartial::from_page(&listing.page, true)) {
        Ok(html) => html,
        Err(err) => return render_error_response(chrome, err),
    };

    let author = listing.author.username;
    let can_follow = viewer
        .user
        .as_ref()
        .is_some_and(|user| user.id != listing.author.id);
    let base = profile_href(&author);
    let view = LayoutContext::new(
        chrome,
        format!("Profile of {author}"),
        ProfilePageView {
            follow_href: format!("{base}follow/"),
            unfollow_href: format!("{base}unfollow/"),
            username: author,
            post_count: listing.post_count,
            following: listing.following,
            can_follow,
            posts_html,
        },
    );
    render_template_response(ProfileTemplate { view }, StatusCode::OK)
}

async fn post_detail(
    State(state): State<HttpState>,
    viewer: Viewer,
    Path(raw_id): Path<String>,
) -> Response {
    let chrome = viewer.chrome();
    let Some(post_id) = parse_id(&raw_id) else {
        return render_not_found_response(chrome);
    };

    match state.feed.post_detail(post_id, viewer.user.as_ref()).await {
        Ok(detail) => {
            let title = display_title(&detail.post.text);
            let content = PostDetailView::new(&detail, viewer.user.is_some());
            let view = LayoutContext::new(chrome, title, content);
            render_template_response(PostDetailTemplate { view }, StatusCode::OK)
        }
        Err(err) => render_error_response(chrome, err.into()),
    }
}

async fn serve_media(State(state): State<HttpState>, Path(path): Path<String>) -> Response {
    const SOURCE: &str = "infra::http::public::serve_media";

    match state.uploads.read(&path).await {
        Ok(bytes) => build_response(bytes, mime_guess::from_path(&path).first_or_octet_stream()),
        Err(UploadStorageError::InvalidPath) => HttpError::new(
            SOURCE,
            StatusCode::NOT_FOUND,
            "Media not found",
            "Rejected media path",
        )
        .into_response(),
        Err(UploadStorageError::Io(err)) if err.kind() == ErrorKind::NotFound => HttpError::new(
            SOURCE,
            StatusCode::NOT_FOUND,
            "Media not found",
            "The requested media file is not available",
        )
        .into_response(),
        Err(err) => {
            error!(
                target = SOURCE,
                path = %path,
                error = %err,
                "failed to read stored media"
            );
            HttpError::new(
                SOURCE,
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to read media file",
                err.to_string(),
            )
            .into_response()
        }
    }
}

async fn public_health(State(state): State<HttpState>) -> Response {
    db_health_response(state.health.ping().await)
}

async fn fallback(viewer: Viewer) -> Response {
    render_not_found_response(viewer.chrome())
}
