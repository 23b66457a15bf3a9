//! Post and comment text rules shared by the feed and the forms.

use time::{OffsetDateTime, format_description::FormatItem, macros::format_description};

/// Number of characters of a post's text used as its display title.
pub const TITLE_CHARS: usize = 15;

pub const HUMAN_DATE_FORMAT: &[FormatItem<'static>] =
    format_description!("[day padding:none] [month repr:long] [year]");

pub const REQUIRED_FIELD_MESSAGE: &str = "This field is required.";

/// First [`TITLE_CHARS`] characters of the post text.
pub fn display_title(text: &str) -> String {
    text.chars().take(TITLE_CHARS).collect()
}

pub fn format_human_date(value: OffsetDateTime) -> String {
    value
        .format(HUMAN_DATE_FORMAT)
        .unwrap_or_else(|_| value.date().to_string())
}

/// Normalise submitted body text; blank input is rejected.
pub fn normalize_text(raw: &str) -> Result<String, &'static str> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(REQUIRED_FIELD_MESSAGE);
    }
    Ok(trimmed.to_string())
}
