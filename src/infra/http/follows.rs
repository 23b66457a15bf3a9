use axum::{
    extract::{Path, State},
    response::{IntoResponse, Redirect, Response},
};

use crate::presentation::views::{profile_href, render_error_response};

use super::{auth::Viewer, public::HttpState};

pub(super) async fn follow_author(
    State(state): State<HttpState>,
    viewer: Viewer,
    Path(username): Path<String>,
) -> Response {
    let user = match viewer.require_user() {
        Ok(user) => user,
        Err(redirect) => return redirect,
    };

    match state.follows.follow(user, &username).await {
        Ok(_) => Redirect::to(&profile_href(&username)).into_response(),
        Err(err) => render_error_response(viewer.chrome(), err.into()),
    }
}

pub(super) async fn unfollow_author(
    State(state): State<HttpState>,
    viewer: Viewer,
    Path(username): Path<String>,
) -> Response {
    let user = match viewer.require_user() {
        Ok(user) => user,
        Err(redirect) => return redirect,
    };

    match state.follows.unfollow(user, &username).await {
        Ok(_) => Redirect::to(&profile_href(&username)).into_response(),
        Err(err) => render_error_response(viewer.chrome(), err.into()),
    }
}
