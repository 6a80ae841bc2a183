//! Identifier checks shared by the catalog and the filter parser.

use crate::error::{Error, Result};

pub const MAX_COLLECTION_NAME_LENGTH: usize = 64;
pub const MAX_FIELD_NAME_LENGTH: usize = 64;

/// Accepts `[A-Za-z_][A-Za-z0-9_-]*`, at most 64 characters.
pub fn validate_collection_name(name: &str) -> Result<&str> {
    if name.is_empty() {
        return Err(Error::validation("collection name cannot be empty"));
    }
    if name.chars().count() > MAX_COLLECTION_NAME_LENGTH {
        return Err(Error::validation(format!(
            "collection name too long (max {MAX_COLLECTION_NAME_LENGTH} characters)"
        )));
    }
    if !is_identifier(name, |ch| ch == '_' || ch == '-') {
        return Err(Error::validation(
            "collection name must start with a letter or underscore and contain only \
             alphanumeric characters, underscores, and hyphens",
        ));
    }
    Ok(name)
}

/// Accepts `[A-Za-z_][A-Za-z0-9_.-]*`, at most 64 characters.
pub fn validate_field_name(field: &str) -> Result<&str> {
    if field.is_empty() {
        return Err(Error::validation("filter field name cannot be empty"));
    }
    if field.chars().count() > MAX_FIELD_NAME_LENGTH {
        return Err(Error::validation(format!(
            "filter field name '{field}' too long (max {MAX_FIELD_NAME_LENGTH} characters)"
        )));
    }
    if !is_identifier(field, |ch| matches!(ch, '_' | '-' | '.')) {
        return Err(Error::validation(format!(
            "filter field name '{field}' must start with a letter or underscore and contain \
             only alphanumeric characters, underscores, hyphens, and dots"
        )));
    }
    Ok(field)
}

fn is_identifier(value: &str, extra: impl Fn(char) -> bool) -> bool {
    let mut chars = value.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|ch| ch.is_ascii_alphanumeric() || extra(ch))
}
