use agora_types::api::MAX_PAGE_SIZE;

use crate::error::ApiError;

pub const MAX_POST_LEN: usize = 5000;
pub const MAX_COMMENT_LEN: usize = 2000;
pub const MAX_MESSAGE_LEN: usize = 4000;
pub const MAX_NAME_LEN: usize = 100;
pub const MAX_PLACE_LEN: usize = 200;

pub const REACTION_TYPES: &[&str] = &["like", "love", "laugh", "wow", "sad", "angry"];

/// Trimmed text of 1..=`max` characters.
pub fn text(field: &str, value: &str, max: usize) -> Result<String, ApiError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ApiError::bad_request(format!("{} must not be empty", field)));
    }
    if trimmed.chars().count() > max {
        return Err(ApiError::bad_request(format!(
            "{} must be at most {} characters",
            field, max
        )));
    }
    Ok(trimmed.to_string())
}

/// Optional text: blank becomes `None`.
pub fn optional_text(field: &str, value: Option<&str>, max: usize) -> Result<Option<String>, ApiError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => text(field, v, max).map(Some),
        None => Ok(None),
    }
}

/// 3..=32 characters of letters, digits, `_` or `.`.
pub fn username(value: &str) -> Result<String, ApiError> {
    let value = value.trim();
    let len = value.chars().count();
    if !(3..=32).contains(&len) {
        return Err(ApiError::bad_request("username must be 3 to 32 characters"));
    }
    if !value
        .chars()
        .all(|c| c.is_alphanumeric() || c == '_' || c == '.')
    {
        return Err(ApiError::bad_request(
            "username may only contain letters, digits, '_' and '.'",
        ));
    }
    Ok(value.to_string())
}

pub fn reaction_type(value: &str) -> Result<String, ApiError> {
    let value = value.trim().to_ascii_lowercase();
    if !REACTION_TYPES.contains(&value.as_str()) {
        return Err(ApiError::bad_request(format!("unknown reaction type {}", value)));
    }
    Ok(value)
}

/// Clamp a requested page size to 1..=`MAX_PAGE_SIZE`.
pub fn page_limit(limit: u32) -> u32 {
    limit.clamp(1, MAX_PAGE_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_trims_and_bounds() {
        assert_eq!(text("content", "  hi  ", 10).unwrap(), "hi");
        assert!(text("content", "   ", 10).is_err());
        assert!(text("content", "abcdef", 5).is_err());
        // Length is counted in characters, not bytes.
        assert!(text("content", "ééééé", 5).is_ok());
    }

    #[test]
    fn optional_blank_is_none() {
        assert_eq!(optional_text("bio", Some("  "), 10).unwrap(), None);
        assert_eq!(optional_text("bio", None, 10).unwrap(), None);
        assert_eq!(optional_text("bio", Some(" x "), 10).unwrap().as_deref(), Some("x"));
    }

    #[test]
    fn usernames() {
        assert!(username("jo").is_err());
        assert!(username("jane.doe_99").is_ok());
        assert!(username("jane doe").is_err());
    }

    #[test]
    fn reactions_and_limits() {
        assert_eq!(reaction_type(" Love ").unwrap(), "love");
        assert!(reaction_type("meh").is_err());
        assert_eq!(page_limit(0), 1);
        assert_eq!(page_limit(1000), MAX_PAGE_SIZE);
    }
}
