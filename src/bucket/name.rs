//! Entry name validation.
//!
//! Every name that enters a bucket, from a file list or from an archive,
//! passes through [`is_safe_name`].

use crate::{BucketError, Result};

/// Characters treated as path separators on any platform.
const SEPARATORS: [char; 2] = ['/', '\\'];

/// Check that a name is a single, relative path component.
///
/// A safe name is non-empty, is neither `.` nor `..` and contains no path
/// separator, so it can never resolve outside the bucket root.
pub fn is_safe_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(SEPARATORS)
}

/// Validate a name, returning `InvalidName` for unsafe ones.
pub fn validate_name(name: &str) -> Result<()> {
    if is_safe_name(name) {
        Ok(())
    } else {
        Err(BucketError::InvalidName(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_names_are_safe() {
        assert!(is_safe_name("rose.flw"));
        assert!(is_safe_name("README"));
        assert!(is_safe_name(".hidden"));
        assert!(is_safe_name("..."));
        assert!(is_safe_name("a..b"));
        assert!(is_safe_name("日本語ファイル.txt"));
        assert!(is_safe_name("with space.txt"));
    }

    #[test]
    fn test_empty_name() {
        assert!(!is_safe_name(""));
    }

    #[test]
    fn test_dot_names() {
        assert!(!is_safe_name("."));
        assert!(!is_safe_name(".."));
    }

    #[test]
    fn test_separators() {
        assert!(!is_safe_name("iam/../bad"));
        assert!(!is_safe_name("/etc/passwd"));
        assert!(!is_safe_name("dir/"));
        assert!(!is_safe_name("a/b"));
        assert!(!is_safe_name("..\\windows"));
        assert!(!is_safe_name("c:\\boot.ini"));
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("daisy.flw").is_ok());

        match validate_name("iam/../bad") {
            Err(BucketError::InvalidName(name)) => assert_eq!(name, "iam/../bad"),
            other => panic!("Expected InvalidName, got {other:?}"),
        }
    }
}
