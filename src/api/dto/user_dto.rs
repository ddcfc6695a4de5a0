//! User membership DTOs.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::domain::{SegmentAppend, Slug, UserId};
use crate::error::SegmentationError;

/// One entry of the `append` list.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppendSegmentDto {
    /// Segment to join.
    pub slug: String,
    /// Optional RFC 3339 expiry. Absent, `null` or the zero time means
    /// the membership never expires.
    #[serde(default, alias = "expires_at")]
    pub expires: Option<DateTime<Utc>>,
}

/// One entry of the `remove` list: either a bare slug or `{"slug": ...}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum RemoveSegmentDto {
    /// `"vip"`
    Slug(String),
    /// `{"slug": "vip"}`
    Object {
        /// Segment to leave.
        slug: String,
    },
}

impl RemoveSegmentDto {
    fn into_slug(self) -> String {
        match self {
            Self::Slug(slug) | Self::Object { slug } => slug,
        }
    }
}

/// Request body for `PATCH /users`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModifyUserRequest {
    /// User whose memberships change.
    pub id: i32,
    /// Segments to join.
    #[serde(default)]
    pub append: Vec<AppendSegmentDto>,
    /// Segments to leave.
    #[serde(default)]
    pub remove: Vec<RemoveSegmentDto>,
}

impl ModifyUserRequest {
    /// Validates every slug and converts the request into engine input.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentationError::InvalidRequest`] on the first invalid
    /// slug.
    pub fn into_parts(self) -> Result<(UserId, Vec<SegmentAppend>, Vec<Slug>), SegmentationError> {
        let appends = self
            .append
            .into_iter()
            .map(|a| -> Result<SegmentAppend, SegmentationError> {
                Ok(SegmentAppend {
                    slug: Slug::parse(a.slug)?,
                    expires_at: a.expires,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let removes = self
            .remove
            .into_iter()
            .map(|r| Slug::parse(r.into_slug()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((UserId::new(self.id), appends, removes))
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn parse(json: &str) -> ModifyUserRequest {
        match serde_json::from_str(json) {
            Ok(req) => req,
            Err(e) => panic!("request should parse: {e}"),
        }
    }

    #[test]
    fn accepts_both_remove_shapes() {
        let req = parse(r#"{"id": 3, "remove": ["a", {"slug": "b"}]}"#);
        let Ok((user, appends, removes)) = req.into_parts() else {
            panic!("valid request");
        };
        assert_eq!(user, UserId::new(3));
        assert!(appends.is_empty());
        let names: Vec<&str> = removes.iter().map(Slug::as_str).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn expiry_is_optional() {
        let req = parse(
            r#"{"id": 1, "append": [{"slug": "a"}, {"slug": "b", "expires": "2030-01-01T00:00:00Z"}]}"#,
        );
        let Ok((_, appends, _)) = req.into_parts() else {
            panic!("valid request");
        };
        assert_eq!(appends.len(), 2);
        assert!(appends.first().is_some_and(|a| a.expires_at.is_none()));
        assert!(appends.get(1).is_some_and(|a| a.expires_at.is_some()));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let result: Result<ModifyUserRequest, _> =
            serde_json::from_str(r#"{"id": 1, "segments": []}"#);
        assert!(result.is_err());
    }

    #[test]
    fn blank_slug_is_invalid() {
        let req = parse(r#"{"id": 1, "append": [{"slug": "  "}]}"#);
        assert!(matches!(
            req.into_parts(),
            Err(SegmentationError::InvalidRequest(_))
        ));
    }
}
