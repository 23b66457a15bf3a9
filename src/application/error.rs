use std::error::Error as StdError;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::{
    application::{
        auth::AuthError, comments::CommentError, feed::FeedError, follows::FollowError,
        groups::GroupError, posts::PostError,
    },
    config::LoadError,
    infra::error::InfraError,
};

#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = Vec::new();
        messages.push(error.to_string());
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn from_message(
        source: &'static str,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            status,
            messages: vec![message.into()],
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

#[derive(Debug)]
pub struct HttpError {
    status: StatusCode,
    public_message: &'static str,
    report: ErrorReport,
}

impl HttpError {
    pub fn new(
        source: &'static str,
        status: StatusCode,
        public_message: &'static str,
        detail: impl Into<String>,
    ) -> Self {
        let report = ErrorReport::from_message(source, status, detail);
        Self {
            status,
            public_message,
            report,
        }
    }

    pub fn from_error(
        source: &'static str,
        status: StatusCode,
        public_message: &'static str,
        error: &dyn StdError,
    ) -> Self {
        let report = ErrorReport::from_error(source, status, error);
        Self {
            status,
            public_message,
            report,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn public_message(&self) -> &'static str {
        self.public_message
    }

    pub fn into_report(self) -> ErrorReport {
        self.report
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let mut response = (self.status, self.public_message).into_response();
        self.report.attach(&mut response);
        response
    }
}

const SERVICE_ERROR_SOURCE: &str = "application::error::service_error";

pub(crate) fn internal(error: &dyn StdError) -> HttpError {
    HttpError::from_error(
        SERVICE_ERROR_SOURCE,
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal server error",
        error,
    )
}

pub(crate) fn not_found(detail: &'static str) -> HttpError {
    HttpError::new(
        SERVICE_ERROR_SOURCE,
        StatusCode::NOT_FOUND,
        "Resource not found",
        detail,
    )
}

impl From<FeedError> for HttpError {
    fn from(error: FeedError) -> Self {
        match error {
            FeedError::UnknownGroup => not_found("Group slug did not match any group"),
            FeedError::UnknownAuthor => not_found("Username did not match any user"),
            FeedError::UnknownPost => not_found("Post id did not match any post"),
            FeedError::Repo(err) => internal(&err),
        }
    }
}

impl From<PostError> for HttpError {
    fn from(error: PostError) -> Self {
        match error {
            PostError::UnknownPost => not_found("Post id did not match any post"),
            PostError::NotAuthor => HttpError::new(
                SERVICE_ERROR_SOURCE,
                StatusCode::FORBIDDEN,
                "Forbidden",
                "Only the author may edit this post",
            ),
            PostError::Repo(err) => internal(&err),
            PostError::Media(err) => internal(&err),
        }
    }
}

impl From<CommentError> for HttpError {
    fn from(error: CommentError) -> Self {
        match error {
            CommentError::UnknownPost => not_found("Post id did not match any post"),
            CommentError::Repo(err) => internal(&err),
        }
    }
}

impl From<FollowError> for HttpError {
    fn from(error: FollowError) -> Self {
        match error {
            FollowError::UnknownAuthor => not_found("Username did not match any user"),
            FollowError::Repo(err) => internal(&err),
        }
    }
}

impl From<AuthError> for HttpError {
    fn from(error: AuthError) -> Self {
        internal(&error)
    }
}

/// Process-level failure reported by the binary before exiting.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Config(#[from] LoadError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Groups(#[from] GroupError),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}
