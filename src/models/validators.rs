use std::{borrow::Cow, sync::LazyLock};

use regex::Regex;
use validator::ValidationError;

use super::UploadFile;

/// Regex for validating URL-friendly slugs (lowercase alphanumeric with hyphens).
/// Examples: "benchy", "voron-2-4", "tenant-123"
pub static SLUG_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$").unwrap());

/// Maximum length of a single tag
const MAX_TAG_LENGTH: usize = 48;

/// Maximum number of tags per model
pub const MAX_TAGS_COUNT: usize = 20;

/// Validate model tags.
///
/// Ensures that:
/// - No more than MAX_TAGS_COUNT tags are provided
/// - No tag is empty or whitespace-only
/// - No tag exceeds MAX_TAG_LENGTH characters
pub fn validate_tags(tags: &[String]) -> Result<(), ValidationError> {
    if tags.len() > MAX_TAGS_COUNT {
        let mut err = ValidationError::new("too_many_tags");
        err.message = Some(Cow::Owned(format!(
            "Maximum {} tags allowed",
            MAX_TAGS_COUNT
        )));
        return Err(err);
    }

    for tag in tags {
        let trimmed = tag.trim();
        if trimmed.is_empty() {
            let mut err = ValidationError::new("empty_tag");
            err.message = Some(Cow::Borrowed("Tags cannot be empty or whitespace-only"));
            return Err(err);
        }
        if trimmed.chars().count() > MAX_TAG_LENGTH {
            let mut err = ValidationError::new("tag_too_long");
            err.message = Some(Cow::Owned(format!(
                "Tags cannot exceed {} characters",
                MAX_TAG_LENGTH
            )));
            return Err(err);
        }
    }

    Ok(())
}

/// Maximum number of files in one model version
pub const MAX_FILES_COUNT: usize = 64;

/// Validate the file list of a new model: at least one file, at most
/// MAX_FILES_COUNT.
pub fn validate_files(files: &[UploadFile]) -> Result<(), ValidationError> {
    if files.is_empty() || files.len() > MAX_FILES_COUNT {
        let mut err = ValidationError::new("file_count");
        err.message = Some(Cow::Owned(format!(
            "A model needs between 1 and {} files",
            MAX_FILES_COUNT
        )));
        return Err(err);
    }
    Ok(())
}

/// Derive a URL slug from a display name.
///
/// Non-alphanumeric runs collapse to a single hyphen. Returns `None` when the
/// name contains no usable characters.
pub fn slugify(name: &str) -> Option<String> {
    let mut slug = String::with_capacity(name.len());
    let mut pending_hyphen = false;

    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_hyphen = true;
        }
    }

    slug.truncate(64);
    let slug = slug.trim_end_matches('-').to_string();
    (!slug.is_empty()).then_some(slug)
}
