//! Destination naming: partial-file paths and collision-free names.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Suffix marking an in-progress download.
pub const PARTIAL_SUFFIX: &str = ".part";

/// Returns `path` with [`PARTIAL_SUFFIX`] appended to its file name.
#[must_use]
pub fn partial_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_default();
    name.push(PARTIAL_SUFFIX);
    path.with_file_name(name)
}

/// Next name in the collision sequence for `path`.
///
/// `report.pdf` becomes `report(2).pdf`; `report(2).pdf` becomes
/// `report(3).pdf`. The extension is the text after the last `.`.
#[must_use]
pub fn collision_candidate(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let (stem, ext) = match file_name.rsplit_once('.') {
        Some((stem, ext)) => (stem, Some(ext)),
        None => (file_name.as_str(), None),
    };

    let (base, number) = match numbered_suffix(stem) {
        Some((base, n)) => (base, n.saturating_add(1)),
        None => (stem, 2),
    };

    let candidate = match ext {
        Some(ext) if !ext.is_empty() => format!("{base}({number}).{ext}"),
        _ => format!("{base}({number})"),
    };
    path.with_file_name(candidate)
}

/// Lowest free name in the collision sequence starting after `path`.
///
/// A name is free when nothing exists on disk under it and `in_use` rejects it.
///
/// # Errors
///
/// Returns the IO error if existence cannot be checked.
pub async fn next_available_path(
    path: &Path,
    in_use: impl Fn(&Path) -> bool,
) -> std::io::Result<PathBuf> {
    let mut candidate = collision_candidate(path);
    while in_use(&candidate) || tokio::fs::try_exists(&candidate).await? {
        candidate = collision_candidate(&candidate);
    }
    Ok(candidate)
}

/// Splits `name(N)` into `("name", N)`.
fn numbered_suffix(stem: &str) -> Option<(&str, u64)> {
    let inner = stem.strip_suffix(')')?;
    let open = inner.rfind('(')?;
    let digits = &inner[open + 1..];
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some((&inner[..open], digits.parse().ok()?))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_partial_path_appends_suffix() {
        assert_eq!(
            partial_path(Path::new("/out/a.pdf")),
            PathBuf::from("/out/a.pdf.part")
        );
    }

    #[test]
    fn test_collision_candidate_starts_at_two() {
        assert_eq!(
            collision_candidate(Path::new("/out/report.pdf")),
            PathBuf::from("/out/report(2).pdf")
        );
    }

    #[test]
    fn test_collision_candidate_increments_existing_suffix() {
        assert_eq!(
            collision_candidate(Path::new("/out/report(2).pdf")),
            PathBuf::from("/out/report(3).pdf")
        );
        assert_eq!(
            collision_candidate(Path::new("/out/report(9)")),
            PathBuf::from("/out/report(10)")
        );
    }

    #[test]
    fn test_collision_candidate_ignores_non_numeric_parens() {
        assert_eq!(
            collision_candidate(Path::new("/out/font (CE).ttf")),
            PathBuf::from("/out/font (CE)(2).ttf")
        );
    }

    #[test]
    fn test_collision_candidate_without_extension() {
        assert_eq!(
            collision_candidate(Path::new("/out/README")),
            PathBuf::from("/out/README(2)")
        );
    }

    #[test]
    fn test_collision_candidate_uses_last_dot() {
        assert_eq!(
            collision_candidate(Path::new("/out/archive.tar.gz")),
            PathBuf::from("/out/archive.tar(2).gz")
        );
    }

    #[tokio::test]
    async fn test_next_available_path_skips_taken_names() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path().join("report.pdf");
        std::fs::write(&base, b"1").unwrap();
        std::fs::write(temp_dir.path().join("report(2).pdf"), b"2").unwrap();

        let next = next_available_path(&base, |_| false).await.unwrap();
        assert_eq!(next, temp_dir.path().join("report(3).pdf"));
    }

    #[tokio::test]
    async fn test_next_available_path_first_free() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path().join("report.pdf");
        std::fs::write(&base, b"1").unwrap();

        let next = next_available_path(&base, |_| false).await.unwrap();
        assert_eq!(next, temp_dir.path().join("report(2).pdf"));
    }

    #[tokio::test]
    async fn test_next_available_path_skips_names_in_use() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path().join("report.pdf");
        std::fs::write(&base, b"1").unwrap();
        let claimed = temp_dir.path().join("report(2).pdf");

        let next = next_available_path(&base, |path| path == claimed)
            .await
            .unwrap();
        assert_eq!(next, temp_dir.path().join("report(3).pdf"));
    }
}
