//! Validated segment slug.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::SegmentationError;

/// Business key of a segment (e.g. `"AVITO_VOICE_MESSAGES"`).
///
/// A slug is non-empty and carries no leading or trailing whitespace. Case
/// is preserved and significant.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Slug(String);

impl Slug {
    /// Validates and wraps a slug.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentationError::InvalidRequest`] if the slug is empty or
    /// padded with whitespace.
    pub fn parse(raw: impl Into<String>) -> Result<Self, SegmentationError> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(SegmentationError::InvalidRequest(
                "slug must not be empty".to_string(),
            ));
        }
        if raw.trim() != raw {
            return Err(SegmentationError::InvalidRequest(format!(
                "slug \"{raw}\" must not start or end with whitespace"
            )));
        }
        Ok(Self(raw))
    }

    /// Returns the slug text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Slug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Slug {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Slug {
    type Error = SegmentationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Slug> for String {
    fn from(slug: Slug) -> Self {
        slug.0
    }
}
