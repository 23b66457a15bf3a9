//! Cookie sessions, the `Viewer` extractor and the signup/login/logout pages.

use std::convert::Infallible;

use axum::{
    Form,
    body::Body,
    extract::{FromRequestParts, Query, State},
    http::{Request, StatusCode, request::Parts},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;
use tracing::{info, warn};
use url::form_urlencoded;

use crate::application::{
    auth::{
        AuthService, CurrentUser, INVALID_LOGIN_MESSAGE, SESSION_COOKIE, SignupOutcome,
        SignupSubmission, safe_next_path,
    },
    error::HttpError,
    forms::FormErrors,
};
use crate::domain::posts::REQUIRED_FIELD_MESSAGE;
use crate::presentation::views::{
    LayoutChrome, LayoutContext, LoginFormView, LoginTemplate, SignupFormView, SignupTemplate,
    render_error_response, render_template_response,
};

use super::public::HttpState;

const LOGIN_PATH: &str = "/auth/login/";
const SOURCE: &str = "infra::http::auth";

/// Who is asking and for which page. Extracting it never fails.
#[derive(Debug, Clone)]
pub struct Viewer {
    pub user: Option<CurrentUser>,
    pub path: String,
    /// Path plus query string, used as the post-login destination.
    pub full_path: String,
}

impl<S: Send + Sync> FromRequestParts<S> for Viewer {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let path = parts.uri.path().to_string();
        let full_path = parts
            .uri
            .path_and_query()
            .map(|value| value.as_str().to_string())
            .unwrap_or_else(|| path.clone());

        Ok(Self {
            user: parts.extensions.get::<CurrentUser>().cloned(),
            path,
            full_path,
        })
    }
}

impl Viewer {
    pub fn chrome(&self) -> LayoutChrome {
        LayoutChrome::new(self.user.clone(), self.path.clone())
    }

    /// The signed-in user, or a redirect to the login page that returns here.
    pub fn require_user(&self) -> Result<&CurrentUser, Response> {
        self.user
            .as_ref()
            .ok_or_else(|| login_redirect(&self.full_path))
    }
}

/// `/auth/login/?next=<path>`, keeping `/` readable in the query value.
pub fn login_redirect(next: &str) -> Response {
    let encoded: String = form_urlencoded::byte_serialize(next.as_bytes()).collect();
    let encoded = encoded.replace("%2F", "/");
    Redirect::to(&format!("{LOGIN_PATH}?next={encoded}")).into_response()
}

/// Resolve the session cookie into a [`CurrentUser`] request extension.
pub(super) async fn resolve_session(
    State(state): State<HttpState>,
    jar: CookieJar,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let mut current = None;
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        match state.auth.resolve(cookie.value()).await {
            Ok(user) => current = user,
            Err(err) => warn!(
                target = "scrivo::http::auth",
                error = %err,
                "session lookup failed; treating request as anonymous"
            ),
        }
    }

    if let Some(user) = current.clone() {
        request.extensions_mut().insert(user);
    }
    let mut response = next.run(request).await;
    if let Some(user) = current {
        response.extensions_mut().insert(user);
    }
    response
}

fn session_cookie(auth: &AuthService, token: String, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(auth.session_ttl())
        .build()
}

async fn start_session(
    state: &HttpState,
    jar: CookieJar,
    user: &CurrentUser,
    destination: &str,
) -> Result<Response, HttpError> {
    let issued = state.auth.open_session(user.id).await?;
    let cookie = session_cookie(&state.auth, issued.token, state.secure_cookie);
    info!(
        target = "scrivo::http::auth",
        user_id = user.id,
        expires_at = %issued.expires_at,
        "session opened"
    );
    Ok((jar.add(cookie), Redirect::to(destination)).into_response())
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct NextQuery {
    next: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct LoginForm {
    username: String,
    password: String,
    next: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct SignupForm {
    username: String,
    password1: String,
    password2: String,
}

fn login_page(
    viewer: &Viewer,
    username: String,
    next: Option<String>,
    errors: FormErrors,
) -> Response {
    let view = LayoutContext::new(
        viewer.chrome(),
        "Log in",
        LoginFormView {
            username,
            next,
            errors,
        },
    );
    render_template_response(LoginTemplate { view }, StatusCode::OK)
}

fn signup_page(viewer: &Viewer, username: String, errors: FormErrors) -> Response {
    let view = LayoutContext::new(
        viewer.chrome(),
        "Sign up",
        SignupFormView { username, errors },
    );
    render_template_response(SignupTemplate { view }, StatusCode::OK)
}

pub(super) async fn login_form(viewer: Viewer, Query(query): Query<NextQuery>) -> Response {
    let next = safe_next_path(query.next.as_deref());
    login_page(&viewer, String::new(), next, FormErrors::new())
}

pub(super) async fn login_submit(
    State(state): State<HttpState>,
    viewer: Viewer,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Response {
    let next = safe_next_path(form.next.as_deref());

    let mut errors = FormErrors::new();
    if form.username.trim().is_empty() {
        errors.add("username", REQUIRED_FIELD_MESSAGE);
    }
    if form.password.is_empty() {
        errors.add("password", REQUIRED_FIELD_MESSAGE);
    }
    if !errors.is_empty() {
        return login_page(&viewer, form.username, next, errors);
    }

    let user = match state.auth.authenticate(&form.username, &form.password).await {
        Ok(Some(user)) => CurrentUser::from(&user),
        Ok(None) => {
            let mut errors = FormErrors::new();
            errors.add_non_field(INVALID_LOGIN_MESSAGE);
            return login_page(&viewer, form.username, next, errors);
        }
        Err(err) => return render_error_response(viewer.chrome(), err.into()),
    };

    let destination = next.unwrap_or_else(|| "/".to_string());
    match start_session(&state, jar, &user, &destination).await {
        Ok(response) => response,
        Err(err) => render_error_response(viewer.chrome(), err),
    }
}

pub(super) async fn signup_form(viewer: Viewer) -> Response {
    signup_page(&viewer, String::new(), FormErrors::new())
}

pub(super) async fn signup_submit(
    State(state): State<HttpState>,
    viewer: Viewer,
    jar: CookieJar,
    Form(form): Form<SignupForm>,
) -> Response {
    let username = form.username.clone();
    let submission = SignupSubmission {
        username: form.username,
        password1: form.password1,
        password2: form.password2,
    };

    let user = match state.auth.signup(submission).await {
        Ok(SignupOutcome::Created(user)) => CurrentUser::from(&user),
        Ok(SignupOutcome::Invalid(errors)) => return signup_page(&viewer, username, errors),
        Err(err) => return render_error_response(viewer.chrome(), err.into()),
    };

    match start_session(&state, jar, &user, "/").await {
        Ok(response) => response,
        Err(err) => render_error_response(viewer.chrome(), err),
    }
}

pub(super) async fn logout(
    State(state): State<HttpState>,
    viewer: Viewer,
    jar: CookieJar,
) -> Response {
    if let Some(cookie) = jar.get(SESSION_COOKIE)
        && let Err(err) = state.auth.close_session(cookie.value()).await
    {
        return render_error_response(
            viewer.chrome(),
            HttpError::from_error(
                SOURCE,
                StatusCode::INTERNAL_SERVER_ERROR,
                "Could not end the session",
                &err,
            ),
        );
    }

    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    (jar, Redirect::to("/")).into_response()
}
