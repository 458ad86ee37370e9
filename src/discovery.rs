use glob::Pattern;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// Extensions treated as raster images, matched case-insensitively.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "webp", "gif"];

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("invalid exclude pattern: {0}")]
    Pattern(#[from] glob::PatternError),
}

/// Options for the discovery walk. Defaults reproduce a plain recursive scan.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryOptions {
    pub max_depth: Option<usize>,
    /// Glob patterns matched against the full path; matching files are skipped.
    pub exclude_patterns: Vec<String>,
}

/// Recursively collects image files under `root`.
///
/// The result is fully materialized and sorted. Unreadable entries (permission
/// errors, broken symlinks) are skipped; the walk itself never aborts.
pub fn discover_images(root: &Path, options: &DiscoveryOptions) -> Result<Vec<PathBuf>, DiscoveryError> {
    let exclude: Vec<Pattern> = options
        .exclude_patterns
        .iter()
        .map(|p| Pattern::new(p))
        .collect::<Result<_, _>>()?;

    let walker = match options.max_depth {
        Some(depth) => WalkDir::new(root).follow_links(false).max_depth(depth),
        None => WalkDir::new(root).follow_links(false),
    };

    let mut images = Vec::new();
    for entry in walker.into_iter().filter_map(Result::ok) {
        let path = entry.path();
        if !entry.file_type().is_file() {
            continue;
        }
        let path_str = path.to_string_lossy();
        if exclude.iter().any(|pattern| pattern.matches(&path_str)) {
            continue;
        }
        if let Some(ext) = path.extension().and_then(|s| s.to_str()) {
            if IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()) {
                images.push(path.to_path_buf());
            }
        }
    }
    images.sort();
    Ok(images)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn finds_images_recursively() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("a/b");
        fs::create_dir_all(&nested).unwrap();
        fs::write(temp_dir.path().join("top.jpg"), b"x").unwrap();
        fs::write(nested.join("deep.png"), b"x").unwrap();

        let images = discover_images(temp_dir.path(), &DiscoveryOptions::default()).unwrap();
        assert_eq!(images.len(), 2);
    }

    #[test]
    fn extension_match_is_case_insensitive() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("upper.JPG"), b"x").unwrap();
        fs::write(temp_dir.path().join("mixed.WebP"), b"x").unwrap();

        let images = discover_images(temp_dir.path(), &DiscoveryOptions::default()).unwrap();
        assert_eq!(images.len(), 2);
    }

    #[test]
    fn non_images_are_skipped() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("photo.gif"), b"x").unwrap();
        fs::write(temp_dir.path().join("notes.txt"), b"x").unwrap();
        fs::write(temp_dir.path().join("noext"), b"x").unwrap();

        let images = discover_images(temp_dir.path(), &DiscoveryOptions::default()).unwrap();
        assert_eq!(images.len(), 1);
        assert!(images[0].ends_with("photo.gif"));
    }

    #[test]
    fn exclude_patterns_filter_matches() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("keep.jpg"), b"x").unwrap();
        fs::write(temp_dir.path().join("skip.tmp.jpg"), b"x").unwrap();

        let options = DiscoveryOptions {
            exclude_patterns: vec!["*.tmp.*".to_string()],
            ..Default::default()
        };
        let images = discover_images(temp_dir.path(), &options).unwrap();
        assert_eq!(images.len(), 1);
        assert!(images[0].ends_with("keep.jpg"));
    }

    #[test]
    fn max_depth_limits_the_walk() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("sub");
        fs::create_dir_all(&nested).unwrap();
        fs::write(temp_dir.path().join("top.jpg"), b"x").unwrap();
        fs::write(nested.join("deep.jpg"), b"x").unwrap();

        let options = DiscoveryOptions {
            max_depth: Some(1),
            ..Default::default()
        };
        let images = discover_images(temp_dir.path(), &options).unwrap();
        assert_eq!(images.len(), 1);
        assert!(images[0].ends_with("top.jpg"));
    }

    #[test]
    fn bad_exclude_pattern_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let options = DiscoveryOptions {
            exclude_patterns: vec!["[".to_string()],
            ..Default::default()
        };
        assert!(discover_images(temp_dir.path(), &options).is_err());
    }

    #[test]
    fn empty_directory_yields_empty_list() {
        let temp_dir = TempDir::new().unwrap();
        let images = discover_images(temp_dir.path(), &DiscoveryOptions::default()).unwrap();
        assert!(images.is_empty());
    }

    #[test]
    fn output_is_sorted() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("b.jpg"), b"x").unwrap();
        fs::write(temp_dir.path().join("a.jpg"), b"x").unwrap();
        fs::write(temp_dir.path().join("c.jpg"), b"x").unwrap();

        let images = discover_images(temp_dir.path(), &DiscoveryOptions::default()).unwrap();
        let mut sorted = images.clone();
        sorted.sort();
        assert_eq!(images, sorted);
    }
}
