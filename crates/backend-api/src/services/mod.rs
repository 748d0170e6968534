use cuid2::CuidConstructor;
use once_cell::sync::Lazy;

pub mod chat;
pub mod comment;
pub mod error;
pub mod expiry;
pub mod like;
pub mod media;
pub mod notification;
pub mod post;
pub mod reaction;
pub mod stats;
pub mod user;

#[cfg(test)]
pub mod test_utils;

pub use error::*;

static CUID: Lazy<CuidConstructor> = Lazy::new(CuidConstructor::new);

pub(crate) fn new_public_id() -> String {
    CUID.create_id()
}

/// Trim user input and treat whitespace-only strings as absent.
pub(crate) fn normalize_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|trimmed| !trimmed.is_empty())
        .map(str::to_owned)
}
