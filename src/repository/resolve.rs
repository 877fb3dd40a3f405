// src/repository/resolve.rs

//! Package path resolution
//!
//! Expands a user-supplied package reference (URL or local path) into a
//! local cabinet file: mirror substitution first, then either a streamed
//! download into a fresh temporary file or absolute-path expansion.

use super::client::Fetcher;
use super::Mirror;
use crate::db::StateDb;
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use tempfile::{NamedTempFile, TempPath};
use tracing::info;

/// A resolved local artifact.
///
/// When the artifact was downloaded, the temporary file lives exactly as
/// long as this value; dropping it deletes the download.
pub struct Resolved {
    path: PathBuf,
    temp: Option<TempPath>,
}

impl Resolved {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the local file is a staged download that dies with this value
    pub fn is_temp(&self) -> bool {
        self.temp.is_some()
    }

    pub fn into_parts(self) -> (PathBuf, Option<TempPath>) {
        (self.path, self.temp)
    }
}

/// Resolves user-supplied package references against mirrors and a fetcher
pub struct PathResolver<'a> {
    mirrors: Vec<Mirror>,
    fetcher: &'a dyn Fetcher,
}

impl<'a> PathResolver<'a> {
    /// Build a resolver from the state database's `[Mirrors]` section
    pub fn new(db: &StateDb, fetcher: &'a dyn Fetcher) -> Result<Self> {
        Ok(Self {
            mirrors: super::mirrors(db)?,
            fetcher,
        })
    }

    /// Resolver with no mirror rules
    pub fn without_mirrors(fetcher: &'a dyn Fetcher) -> Self {
        Self {
            mirrors: Vec::new(),
            fetcher,
        }
    }

    /// Apply the first matching mirror rule (case-insensitive prefix)
    pub fn apply_mirrors(&self, user_path: &str) -> String {
        let lower = user_path.to_ascii_lowercase();
        for mirror in &self.mirrors {
            let find = mirror.find.to_ascii_lowercase();
            if lower.starts_with(&find) {
                let rewritten = format!("{}{}", mirror.replace, &user_path[mirror.find.len()..]);
                println!("Mirror: {user_path} -> {rewritten}");
                info!("mirror rule '{}' rewrote {}", mirror.find, user_path);
                return rewritten;
            }
        }
        user_path.to_string()
    }

    /// Expand a package reference into a local cabinet file
    pub fn resolve(&self, user_path: &str) -> Result<Resolved> {
        let path = self.apply_mirrors(user_path);

        if self.fetcher.recognizes(&path) {
            println!("Downloading {path}...");
            let temp = NamedTempFile::new().map_err(|e| {
                Error::WriteFault(format!("failed to create temporary file: {e}"))
            })?;
            let temp = temp.into_temp_path();
            self.fetcher.fetch(&path, &temp)?;
            return Ok(Resolved {
                path: temp.to_path_buf(),
                temp: Some(temp),
            });
        }

        let abs = std::path::absolute(&path)
            .map_err(|e| Error::IoError(format!("failed to expand path {path}: {e}")))?;
        Ok(Resolved {
            path: abs,
            temp: None,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;

    /// Fetcher serving canned bodies from a URL map
    pub(crate) struct MapFetcher {
        pub bodies: HashMap<String, Vec<u8>>,
    }

    impl Fetcher for MapFetcher {
        fn recognizes(&self, path: &str) -> bool {
            path.to_ascii_lowercase().starts_with("http://")
        }

        fn fetch(&self, url: &str, dest: &Path) -> Result<()> {
            match self.bodies.get(url) {
                Some(body) => {
                    fs::write(dest, body)
                        .map_err(|e| Error::WriteFault(format!("write {}: {e}", dest.display())))
                }
                None => Err(Error::Network(format!("HTTP 404 from {url}"))),
            }
        }
    }

    fn resolver_with_mirror<'a>(fetcher: &'a dyn Fetcher, find: &str, replace: &str) -> PathResolver<'a> {
        PathResolver {
            mirrors: vec![Mirror {
                find: find.to_string(),
                replace: replace.to_string(),
            }],
            fetcher,
        }
    }

    #[test]
    fn test_mirror_prefix_substitution() {
        let fetcher = MapFetcher {
            bodies: HashMap::new(),
        };
        let resolver = resolver_with_mirror(&fetcher, "http://Slow.example/", "http://fast.example/");

        // Case-insensitive match on the prefix, remainder preserved.
        assert_eq!(
            resolver.apply_mirrors("http://slow.example/pkgs/ex.cab"),
            "http://fast.example/pkgs/ex.cab"
        );
        assert_eq!(
            resolver.apply_mirrors("http://other.example/ex.cab"),
            "http://other.example/ex.cab"
        );
    }

    #[test]
    fn test_resolve_url_downloads_to_temp() {
        let mut bodies = HashMap::new();
        bodies.insert("http://host/ex.cab".to_string(), b"cabinet bytes".to_vec());
        let fetcher = MapFetcher { bodies };
        let resolver = PathResolver::without_mirrors(&fetcher);

        let resolved = resolver.resolve("http://host/ex.cab").unwrap();
        assert!(resolved.is_temp());
        assert_eq!(fs::read(resolved.path()).unwrap(), b"cabinet bytes");

        let temp_path = resolved.path().to_path_buf();
        drop(resolved);
        assert!(!temp_path.exists());
    }

    #[test]
    fn test_resolve_local_path_is_not_temp() {
        let fetcher = MapFetcher {
            bodies: HashMap::new(),
        };
        let resolver = PathResolver::without_mirrors(&fetcher);

        let resolved = resolver.resolve("some/local/ex.cab").unwrap();
        assert!(!resolved.is_temp());
        assert!(resolved.path().is_absolute());
    }

    #[test]
    fn test_resolve_missing_url_fails() {
        let fetcher = MapFetcher {
            bodies: HashMap::new(),
        };
        let resolver = PathResolver::without_mirrors(&fetcher);
        assert!(matches!(
            resolver.resolve("http://host/absent.cab"),
            Err(Error::Network(_))
        ));
    }
}
