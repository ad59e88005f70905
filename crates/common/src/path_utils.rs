//! Object path parsing and key-prefix utilities.
//!
//! Object paths have the form `gs://<bucket>/<key...>`. The bucket is the
//! host segment and everything after the first `/` that follows it is the key.
//! The bucket root has the empty key.

use std::fmt;

use crate::constants::{PATH_DELIMITER, SCHEME};
use crate::error::PathError;

/// A parsed `gs://bucket/key` location.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectPath {
    bucket: String,
    key: String,
}

impl ObjectPath {
    /// Create a path from an already split bucket and key.
    ///
    /// # Arguments
    /// * `bucket` - Bucket name
    /// * `key` - Object key (empty for the bucket root)
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Parse a `gs://` URI.
    ///
    /// # Arguments
    /// * `path` - URI to parse
    ///
    /// # Errors
    /// Returns `PathError::InvalidPath` if the scheme is not `gs`, the `://`
    /// separator is missing, or the bucket segment is empty.
    pub fn parse(path: &str) -> Result<Self, PathError> {
        let (scheme, rest) = path
            .split_once("://")
            .ok_or_else(|| PathError::invalid(path, "missing '://' separator"))?;

        if !scheme.eq_ignore_ascii_case(SCHEME) {
            return Err(PathError::invalid(
                path,
                format!("URI scheme must be '{}' but '{}'", SCHEME, scheme),
            ));
        }

        let (bucket, key) = match rest.split_once(PATH_DELIMITER) {
            Some((bucket, key)) => (bucket, key),
            None => (rest, ""),
        };

        if bucket.is_empty() {
            return Err(PathError::invalid(path, "bucket name is empty"));
        }

        Ok(Self::new(bucket, key))
    }

    /// Bucket name.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Object key within the bucket.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Split into owned `(bucket, key)`.
    pub fn into_parts(self) -> (String, String) {
        (self.bucket, self.key)
    }

    /// Whether this path names the bucket root.
    pub fn is_root(&self) -> bool {
        is_root_key(&self.key)
    }

    /// Key prefix under which the entries of this path, viewed as a
    /// directory, are stored. The root maps to the empty prefix.
    pub fn directory_prefix(&self) -> String {
        if self.is_root() {
            String::new()
        } else {
            add_path_delimiter(&self.key)
        }
    }

    /// The same location with a trailing delimiter on the key.
    pub fn as_directory(&self) -> Self {
        Self::new(self.bucket.clone(), self.directory_prefix())
    }
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}/{}", SCHEME, self.bucket, self.key)
    }
}

impl std::str::FromStr for ObjectPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Resolve a `gs://` URI into `(bucket, key)`.
///
/// # Arguments
/// * `path` - URI to resolve
///
/// # Errors
/// Returns `PathError::InvalidPath` for a wrong scheme or malformed path.
pub fn resolve(path: &str) -> Result<(String, String), PathError> {
    ObjectPath::parse(path).map(ObjectPath::into_parts)
}

/// Whether a key denotes the bucket root.
pub fn is_root_key(key: &str) -> bool {
    key.is_empty()
}

/// Append the path delimiter to a key unless it already ends with one.
///
/// # Arguments
/// * `key` - Key or path to extend
pub fn add_path_delimiter(key: &str) -> String {
    if key.ends_with(PATH_DELIMITER) {
        key.to_string()
    } else {
        format!("{}{}", key, PATH_DELIMITER)
    }
}

/// Join two key segments with exactly one delimiter between them.
///
/// # Arguments
/// * `prefix` - Leading segment (may be empty or end with `/`)
/// * `name` - Trailing segment (may start with `/`)
pub fn join_key(prefix: &str, name: &str) -> String {
    let prefix: &str = prefix.trim_end_matches(PATH_DELIMITER);
    let name: &str = name.trim_start_matches(PATH_DELIMITER);
    match (prefix.is_empty(), name.is_empty()) {
        (true, _) => name.to_string(),
        (false, true) => prefix.to_string(),
        (false, false) => format!("{}{}{}", prefix, PATH_DELIMITER, name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_bucket_and_key() {
        let (bucket, key) = resolve("gs://bucket/path/to/object").unwrap();
        assert_eq!(bucket, "bucket");
        assert_eq!(key, "path/to/object");
    }

    #[test]
    fn test_resolve_rejects_other_scheme() {
        let err: PathError = resolve("https://bucket/path/to/object").unwrap_err();
        assert!(matches!(err, PathError::InvalidPath { .. }));
        assert_eq!(err.path(), "https://bucket/path/to/object");
    }

    #[test]
    fn test_resolve_rejects_missing_separator() {
        assert!(resolve("bucket/path").is_err());
        assert!(resolve("gs:/bucket/path").is_err());
    }

    #[test]
    fn test_resolve_rejects_empty_bucket() {
        assert!(resolve("gs:///key").is_err());
        assert!(resolve("gs://").is_err());
    }

    #[test]
    fn test_scheme_is_case_insensitive() {
        let path: ObjectPath = ObjectPath::parse("GS://bucket/key").unwrap();
        assert_eq!(path.bucket(), "bucket");
        assert_eq!(path.key(), "key");
    }

    #[test]
    fn test_root_paths() {
        assert!(ObjectPath::parse("gs://bucket").unwrap().is_root());
        assert!(ObjectPath::parse("gs://bucket/").unwrap().is_root());
        assert!(!ObjectPath::parse("gs://bucket/a").unwrap().is_root());
    }

    #[test]
    fn test_trailing_delimiter_is_kept_in_key() {
        let path: ObjectPath = ObjectPath::parse("gs://bucket/dir/").unwrap();
        assert_eq!(path.key(), "dir/");
        assert_eq!(path.directory_prefix(), "dir/");
    }

    #[test]
    fn test_directory_prefix() {
        assert_eq!(ObjectPath::new("b", "a/b").directory_prefix(), "a/b/");
        assert_eq!(ObjectPath::new("b", "").directory_prefix(), "");
        assert_eq!(ObjectPath::new("b", "a").as_directory().key(), "a/");
    }

    #[test]
    fn test_display_round_trips() {
        let text: &str = "gs://bucket/path/to/object";
        assert_eq!(ObjectPath::parse(text).unwrap().to_string(), text);
        assert_eq!(ObjectPath::new("bucket", "").to_string(), "gs://bucket/");
    }

    #[test]
    fn test_add_path_delimiter() {
        assert_eq!(add_path_delimiter("a/b"), "a/b/");
        assert_eq!(add_path_delimiter("a/b/"), "a/b/");
    }

    #[test]
    fn test_join_key() {
        assert_eq!(join_key("bucket", "a/b.txt"), "bucket/a/b.txt");
        assert_eq!(join_key("bucket/", "/a/b.txt"), "bucket/a/b.txt");
        assert_eq!(join_key("", "a.txt"), "a.txt");
        assert_eq!(join_key("prefix", ""), "prefix");
    }
}
