//! Per-retailer persistent browser profile directories (§3 `BrowserProfile`).
//!
//! Treated as a single opaque resource: this module only computes the path
//! and guarantees it exists, it does not interpret the profile's contents.

use std::path::PathBuf;

use crate::error::{CrawlError, Result};

pub struct ProfileManager {
    root: PathBuf,
}

impl ProfileManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory for `retailer`'s persistent profile, creating it on first
    /// use. Each retailer gets exactly one directory, reused across runs so
    /// cookies and fingerprints survive process restarts.
    pub fn profile_dir(&self, retailer: &str) -> Result<PathBuf> {
        let dir = self.root.join(sanitize(retailer));
        std::fs::create_dir_all(&dir).map_err(|e| CrawlError::Fatal(format!("could not create browser profile dir: {e}")))?;
        Ok(dir)
    }
}

fn sanitize(retailer: &str) -> String {
    retailer
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_a_distinct_directory_per_retailer() {
        let tmp = std::env::temp_dir().join(format!("catalog-profile-test-{}", std::process::id()));
        let manager = ProfileManager::new(&tmp);
        let a = manager.profile_dir("revolve").unwrap();
        let b = manager.profile_dir("asos").unwrap();
        assert_ne!(a, b);
        assert!(a.exists());
        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn sanitizes_unsafe_path_characters() {
        assert_eq!(sanitize("urban/outfitters"), "urban_outfitters");
    }
}
