//! Allow-listing of payload entry scripts.

use std::ffi::OsStr;
use std::path::{Component, Path};

use crate::error::PathRejection;

/// Check that `path` names an entry script inside `root`.
///
/// - No `..` segments anywhere.
/// - Absolute and strictly below `root` (component-wise, so `/a/bc` is not under `/a/b`).
/// - File name equal to `entry_name`.
///
/// Existence is not checked here; that needs the filesystem.
pub fn validate_payload_path(
    path: &Path,
    root: &Path,
    entry_name: &str,
) -> Result<(), PathRejection> {
    if path
        .components()
        .any(|component| matches!(component, Component::ParentDir))
    {
        return Err(PathRejection::Traversal);
    }
    if !path.is_absolute() {
        return Err(PathRejection::NotAbsolute);
    }
    if path == root || !path.starts_with(root) {
        return Err(PathRejection::OutsideRoot);
    }
    if path.file_name() != Some(OsStr::new(entry_name)) {
        return Err(PathRejection::WrongEntry);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROOT: &str = "/root/payloads/user";
    const ENTRY: &str = "payload.sh";

    fn check(path: &str) -> Result<(), PathRejection> {
        validate_payload_path(Path::new(path), Path::new(ROOT), ENTRY)
    }

    #[test]
    fn accepts_entry_under_root() {
        assert_eq!(check("/root/payloads/user/demo/payload.sh"), Ok(()));
        assert_eq!(check("/root/payloads/user/recon/scan/payload.sh"), Ok(()));
    }

    #[test]
    fn rejects_traversal() {
        assert_eq!(
            check("/root/payloads/user/../../etc/passwd/payload.sh"),
            Err(PathRejection::Traversal)
        );
        assert_eq!(
            check("/root/payloads/user/demo/../payload.sh"),
            Err(PathRejection::Traversal)
        );
    }

    #[test]
    fn rejects_outside_root() {
        assert_eq!(check("/tmp/payload.sh"), Err(PathRejection::OutsideRoot));
        assert_eq!(
            check("/root/payloads/username/payload.sh"),
            Err(PathRejection::OutsideRoot)
        );
    }

    #[test]
    fn rejects_wrong_entry_name() {
        assert_eq!(
            check("/root/payloads/user/x/run.sh"),
            Err(PathRejection::WrongEntry)
        );
        assert_eq!(
            check("/root/payloads/user/x/payload.sh.bak"),
            Err(PathRejection::WrongEntry)
        );
    }

    #[test]
    fn rejects_relative_paths() {
        assert_eq!(check("demo/payload.sh"), Err(PathRejection::NotAbsolute));
        assert_eq!(check(""), Err(PathRejection::NotAbsolute));
    }
}
