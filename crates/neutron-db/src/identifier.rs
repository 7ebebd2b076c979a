//! Identifier validation for table and column names.

use crate::error::DbError;

const MAX_IDENTIFIER_LEN: usize = 64;

/// Checks that `identifier` is safe to interpolate into SQL text.
///
/// Accepted identifiers start with an ASCII letter or underscore and contain
/// only ASCII letters, digits and underscores, up to 64 characters. The
/// same rule makes the identifier usable inside a named placeholder.
///
/// # Errors
///
/// Returns [`DbError::Validation`] describing the first violated rule.
pub fn validate_identifier(identifier: &str) -> Result<(), DbError> {
    let mut chars = identifier.chars();
    let first = chars
        .next()
        .ok_or_else(|| DbError::Validation("identifier must not be empty".to_string()))?;

    if identifier.len() > MAX_IDENTIFIER_LEN {
        return Err(DbError::Validation(format!(
            "identifier '{identifier}' exceeds {MAX_IDENTIFIER_LEN} characters"
        )));
    }

    if !(first.is_ascii_alphabetic() || first == '_') {
        return Err(DbError::Validation(format!(
            "identifier '{identifier}' must start with a letter or underscore"
        )));
    }

    if let Some(bad) = chars.find(|c| !(c.is_ascii_alphanumeric() || *c == '_')) {
        return Err(DbError::Validation(format!(
            "identifier '{identifier}' contains invalid character '{bad}'"
        )));
    }

    Ok(())
}

/// Wraps an already validated identifier in double quotes so reserved
/// words such as `order` or `group` can be used as table and column names.
pub fn quote_identifier(identifier: &str) -> String {
    format!("\"{identifier}\"")
}
