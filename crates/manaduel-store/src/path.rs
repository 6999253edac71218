//! Slash-separated logical paths into the shared store tree.

use std::fmt;

use crate::StoreError;

/// A location in the store tree, e.g. `room/arcana-7/participants/u1`.
///
/// The empty path addresses the root. Segments are never empty and never
/// contain `/`; [`StorePath::parse`] and [`StorePath::validate`] enforce
/// that, [`StorePath::child`] does not (it is checked by the store when the
/// path is used).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct StorePath {
    segments: Vec<String>,
}

impl StorePath {
    /// The root of the tree.
    pub fn root() -> Self {
        Self::default()
    }

    /// Parses `a/b/c`. Leading and trailing slashes are ignored.
    pub fn parse(raw: &str) -> Result<Self, StoreError> {
        let trimmed = raw.trim_matches('/');
        if trimmed.is_empty() {
            return Ok(Self::root());
        }
        let segments: Vec<String> =
            trimmed.split('/').map(str::to_owned).collect();
        let path = Self { segments };
        path.validate()?;
        Ok(path)
    }

    /// Returns a new path one level below this one.
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self { segments }
    }

    /// Checks every segment is non-empty and free of `/`.
    pub fn validate(&self) -> Result<(), StoreError> {
        for segment in &self.segments {
            if segment.is_empty() || segment.contains('/') {
                return Err(StoreError::InvalidPath(self.to_string()));
            }
        }
        Ok(())
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// `true` if `self` equals `other` or is one of its ancestors.
    pub fn is_prefix_of(&self, other: &StorePath) -> bool {
        other.segments.len() >= self.segments.len()
            && other.segments[..self.segments.len()] == self.segments[..]
    }

    /// `true` if a change at `self` can be observed from `other` or the
    /// other way round.
    pub fn overlaps(&self, other: &StorePath) -> bool {
        self.is_prefix_of(other) || other.is_prefix_of(self)
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.segments.join("/"))
    }
}
