use crate::application::{
    auth::CurrentUser,
    error::{ErrorReport, HttpError},
    feed::PostDetail,
    forms::FormErrors,
    pagination::Page,
};
use crate::domain::{
    entities::{CommentRecord, GroupRecord, PostRecord},
    posts::{display_title, format_human_date},
};
use askama::{Error as AskamaError, Template};
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("{public_message}")]
pub struct TemplateRenderError {
    pub(crate) source: &'static str,
    pub(crate) public_message: &'static str,
    #[source]
    pub(crate) error: AskamaError,
}

impl TemplateRenderError {
    pub fn new(source: &'static str, public_message: &'static str, error: AskamaError) -> Self {
        Self {
            source,
            public_message,
            error,
        }
    }
}

impl From<TemplateRenderError> for HttpError {
    fn from(err: TemplateRenderError) -> Self {
        let TemplateRenderError {
            source,
            public_message,
            error,
        } = err;

        HttpError::from_error(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            public_message,
            &error,
        )
    }
}

pub fn render_template<T: Template>(template: T) -> Result<Html<String>, HttpError> {
    render_fragment(template).map(Html)
}

/// Render a template to a bare string, for fragments embedded in other pages.
pub fn render_fragment<T: Template>(template: T) -> Result<String, HttpError> {
    template.render().map_err(|err| {
        TemplateRenderError::new(
            "presentation::views::render_template",
            "Template rendering failed",
            err,
        )
        .into()
    })
}

pub fn render_template_response<T: Template>(template: T, status: StatusCode) -> Response {
    match render_template(template) {
        Ok(html) => (status, html).into_response(),
        Err(err) => err.into_response(),
    }
}

pub fn render_not_found_response(chrome: LayoutChrome) -> Response {
    let view = LayoutContext::new(chrome, "Page not found", ErrorPageView::not_found());
    let mut response = render_template_response(ErrorTemplate { view }, StatusCode::NOT_FOUND);
    ErrorReport::from_message(
        "presentation::views::render_not_found_response",
        StatusCode::NOT_FOUND,
        "Resource not found",
    )
    .attach(&mut response);
    response
}

/// Render an [`HttpError`] as a full page, keeping its report for the response logger.
pub fn render_error_response(chrome: LayoutChrome, error: HttpError) -> Response {
    let status = error.status();
    let content = if status == StatusCode::NOT_FOUND {
        ErrorPageView::not_found()
    } else {
        ErrorPageView::from_status(status, error.public_message())
    };
    let view = LayoutContext::new(chrome, content.title.clone(), content);
    let mut response = render_template_response(ErrorTemplate { view }, status);
    error.into_report().attach(&mut response);
    response
}

/// Per-request page chrome: who is signed in and where they are.
#[derive(Clone, Debug, Default)]
pub struct LayoutChrome {
    pub user: Option<CurrentUser>,
    pub path: String,
}

impl LayoutChrome {
    pub fn new(user: Option<CurrentUser>, path: impl Into<String>) -> Self {
        Self {
            user,
            path: path.into(),
        }
    }

    pub fn username(&self) -> Option<&str> {
        self.user.as_ref().map(|user| user.username.as_str())
    }

    pub fn is_active(&self, href: &str) -> bool {
        self.path == href
    }
}

#[derive(Clone)]
pub struct LayoutContext<T> {
    pub chrome: LayoutChrome,
    pub title: String,
    pub content: T,
}

impl<T> LayoutContext<T> {
    pub fn new(chrome: LayoutChrome, title: impl Into<String>, content: T) -> Self {
        Self {
            chrome,
            title: title.into(),
            content,
        }
    }
}

#[derive(Clone, Debug)]
pub struct GroupLink {
    pub title: String,
    pub href: String,
}

#[derive(Clone, Debug)]
pub struct PostCard {
    pub id: i64,
    pub title: String,
    pub text: String,
    pub pub_date: String,
    pub author: String,
    pub author_href: String,
    pub href: String,
    pub image_url: Option<String>,
    pub group: Option<GroupLink>,
}

impl From<&PostRecord> for PostCard {
    fn from(post: &PostRecord) -> Self {
        Self {
            id: post.id,
            title: display_title(&post.text),
            text: post.text.clone(),
            pub_date: format_human_date(post.pub_date),
            author: post.author_username.clone(),
            author_href: profile_href(&post.author_username),
            href: post_href(post.id),
            image_url: post.image.as_deref().map(media_url),
            group: post.group.as_ref().map(|group| GroupLink {
                title: group.title.clone(),
                href: group_href(&group.slug),
            }),
        }
    }
}

/// Pages linked on either side of the current one.
const PAGER_WINDOW: u64 = 3;

#[derive(Clone, Debug)]
pub struct PaginationView {
    pub number: u64,
    pub num_pages: u64,
    pub previous: Option<u64>,
    pub next: Option<u64>,
    pub pages: Vec<u64>,
}

impl PaginationView {
    pub fn from_page<T>(page: &Page<T>) -> Self {
        Self {
            number: page.number,
            num_pages: page.num_pages,
            previous: page.previous_page_number(),
            next: page.next_page_number(),
            pages: pager_window(page.number, page.num_pages),
        }
    }

    pub fn is_paginated(&self) -> bool {
        self.num_pages > 1
    }

    pub fn is_current(&self, number: &u64) -> bool {
        *number == self.number
    }
}

fn pager_window(current: u64, num_pages: u64) -> Vec<u64> {
    let first = current.saturating_sub(PAGER_WINDOW).max(1);
    let last = current.saturating_add(PAGER_WINDOW).min(num_pages);
    (first..=last).collect()
}

/// The post-list fragment shared by every listing page. The global listing
/// caches its rendered output.
#[derive(Template)]
#[template(path = "partials/post_list.html")]
pub struct PostListPartial {
    pub posts: Vec<PostCard>,
    pub pagination: PaginationView,
    pub show_group_links: bool,
}

impl PostListPartial {
    pub fn from_page(page: &Page<PostRecord>, show_group_links: bool) -> Self {
        Self {
            posts: page.items.iter().map(PostCard::from).collect(),
            pagination: PaginationView::from_page(page),
            show_group_links,
        }
    }
}

pub struct ListingView {
    pub heading: String,
    pub posts_html: String,
}

#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub view: LayoutContext<ListingView>,
}

pub struct GroupPageView {
    pub title: String,
    pub description: String,
    pub posts_html: String,
}

#[derive(Template)]
#[template(path = "group.html")]
pub struct GroupTemplate {
    pub view: LayoutContext<GroupPageView>,
}

pub struct ProfilePageView {
    pub username: String,
    pub post_count: u64,
    pub following: bool,
    /// Signed in and looking at someone else's profile.
    pub can_follow: bool,
    pub follow_href: String,
    pub unfollow_href: String,
    pub posts_html: String,
}

#[derive(Template)]
#[template(path = "profile.html")]
pub struct ProfileTemplate {
    pub view: LayoutContext<ProfilePageView>,
}

#[derive(Template)]
#[template(path = "follow.html")]
pub struct FollowTemplate {
    pub view: LayoutContext<ListingView>,
}

#[derive(Clone, Debug)]
pub struct CommentView {
    pub author: String,
    pub author_href: String,
    pub text: String,
    pub created: String,
}

impl From<&CommentRecord> for CommentView {
    fn from(comment: &CommentRecord) -> Self {
        Self {
            author: comment.author_username.clone(),
            author_href: profile_href(&comment.author_username),
            text: comment.text.clone(),
            created: format_human_date(comment.created),
        }
    }
}

pub struct PostDetailView {
    pub post: PostCard,
    pub author_post_count: u64,
    pub comments: Vec<CommentView>,
    pub can_edit: bool,
    pub can_comment: bool,
    pub edit_href: String,
    pub comment_href: String,
}

impl PostDetailView {
    pub fn new(detail: &PostDetail, can_comment: bool) -> Self {
        Self {
            post: PostCard::from(&detail.post),
            author_post_count: detail.author_post_count,
            comments: detail.comments.iter().map(CommentView::from).collect(),
            can_edit: detail.can_edit,
            can_comment,
            edit_href: format!("/posts/{}/edit/", detail.post.id),
            comment_href: format!("/posts/{}/comment/", detail.post.id),
        }
    }
}

#[derive(Template)]
#[template(path = "post_detail.html")]
pub struct PostDetailTemplate {
    pub view: LayoutContext<PostDetailView>,
}

#[derive(Clone, Debug)]
pub struct GroupOption {
    pub id: i64,
    pub title: String,
    pub selected: bool,
}

pub struct PostFormView {
    pub is_edit: bool,
    pub action: String,
    pub text: String,
    pub groups: Vec<GroupOption>,
    pub no_group_selected: bool,
    pub current_image: Option<String>,
    pub errors: FormErrors,
}

impl PostFormView {
    /// `selected_group` is the raw submitted value, or the post's group id when pre-filling.
    pub fn new(
        action: impl Into<String>,
        is_edit: bool,
        text: impl Into<String>,
        selected_group: &str,
        groups: &[GroupRecord],
        current_image: Option<&str>,
        errors: FormErrors,
    ) -> Self {
        let selected_group = selected_group.trim();
        let groups: Vec<GroupOption> = groups
            .iter()
            .map(|group| GroupOption {
                id: group.id,
                title: group.title.clone(),
                selected: group.id.to_string() == selected_group,
            })
            .collect();
        let no_group_selected = !groups.iter().any(|option| option.selected);

        Self {
            is_edit,
            action: action.into(),
            text: text.into(),
            groups,
            no_group_selected,
            current_image: current_image.map(str::to_string),
            errors,
        }
    }

    pub fn current_image_url(&self) -> Option<String> {
        self.current_image.as_deref().map(media_url)
    }
}

#[derive(Template)]
#[template(path = "post_form.html")]
pub struct PostFormTemplate {
    pub view: LayoutContext<PostFormView>,
}

pub struct LoginFormView {
    pub username: String,
    pub next: Option<String>,
    pub errors: FormErrors,
}

#[derive(Template)]
#[template(path = "login.html")]
pub struct LoginTemplate {
    pub view: LayoutContext<LoginFormView>,
}

pub struct SignupFormView {
    pub username: String,
    pub errors: FormErrors,
}

#[derive(Template)]
#[template(path = "signup.html")]
pub struct SignupTemplate {
    pub view: LayoutContext<SignupFormView>,
}

#[derive(Clone, Debug)]
pub struct ErrorPageView {
    pub status_code: u16,
    pub title: String,
    pub message: String,
}

impl ErrorPageView {
    pub fn not_found() -> Self {
        Self {
            status_code: StatusCode::NOT_FOUND.as_u16(),
            title: "Page not found".to_string(),
            message: "The page you are looking for does not exist.".to_string(),
        }
    }

    pub fn from_status(status: StatusCode, message: &str) -> Self {
        Self {
            status_code: status.as_u16(),
            title: status
                .canonical_reason()
                .unwrap_or("Something went wrong")
                .to_string(),
            message: message.to_string(),
        }
    }
}

#[derive(Template)]
#[template(path = "error.html")]
pub struct ErrorTemplate {
    pub view: LayoutContext<ErrorPageView>,
}

pub fn profile_href(username: &str) -> String {
    format!("/profile/{username}/")
}

pub fn group_href(slug: &str) -> String {
    format!("/group/{slug}/")
}

pub fn post_href(id: i64) -> String {
    format!("/posts/{id}/")
}

pub fn media_url(path: &str) -> String {
    format!("/media/{}", path.trim_start_matches('/'))
}
