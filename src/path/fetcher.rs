//! Remote source fetchers.
//!
//! A fetcher materializes a remote module source into a local directory and
//! owns its own caching, keyed by a sanitized URI + ref digest. The
//! orchestrator only depends on the contract: given a URI, a location, and
//! arguments, return a local path.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::{PathError, Result};

/// One fetch invocation.
#[derive(Debug, Clone, Copy)]
pub struct FetchRequest<'a> {
    /// The remote URI.
    pub uri: &'a str,
    /// Sub-path within the fetched tree.
    pub location: &'a str,
    /// Parsed `?k=v` arguments.
    pub arguments: &'a BTreeMap<String, String>,
    /// Directory fetchers cache into.
    pub cache_dir: &'a Path,
}

/// A remote source fetcher keyed by source tag.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// The source key this fetcher serves (e.g. `git`).
    fn source(&self) -> &'static str;

    /// Materializes the request into a local directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be fetched or the requested
    /// location does not exist in the fetched tree.
    async fn fetch(&self, request: FetchRequest<'_>) -> Result<PathBuf>;
}

/// Registry of source fetchers keyed by source tag.
pub struct FetcherRegistry {
    fetchers: HashMap<&'static str, Arc<dyn SourceFetcher>>,
}

impl FetcherRegistry {
    /// Creates an empty registry with no fetchers.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            fetchers: HashMap::new(),
        }
    }

    /// Registers a fetcher, replacing any existing one for the same key.
    pub fn register(&mut self, fetcher: Arc<dyn SourceFetcher>) {
        self.fetchers.insert(fetcher.source(), fetcher);
    }

    /// Returns the fetcher for a source key.
    ///
    /// # Errors
    ///
    /// Returns [`PathError::UnknownSource`] when no fetcher is registered;
    /// an unknown source is a hard error, never a silent local fallback.
    pub fn get(&self, source: &str) -> Result<Arc<dyn SourceFetcher>> {
        self.fetchers.get(source).cloned().ok_or_else(|| {
            PathError::UnknownSource {
                source_key: source.to_string(),
            }
            .into()
        })
    }
}

impl Default for FetcherRegistry {
    /// Creates a registry with the built-in `git` fetcher.
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(GitFetcher));
        registry
    }
}

impl std::fmt::Debug for FetcherRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut sources: Vec<&str> = self.fetchers.keys().copied().collect();
        sources.sort_unstable();
        f.debug_struct("FetcherRegistry")
            .field("sources", &sources)
            .finish()
    }
}

/// Fetches module sources from git repositories.
///
/// Clones are cached per URI + ref under the cache directory; a second run
/// against the same source reuses the existing checkout.
#[derive(Debug, Default)]
pub struct GitFetcher;

#[async_trait]
impl SourceFetcher for GitFetcher {
    fn source(&self) -> &'static str {
        "git"
    }

    async fn fetch(&self, request: FetchRequest<'_>) -> Result<PathBuf> {
        let reference = request
            .arguments
            .get("commit")
            .or_else(|| request.arguments.get("tag"))
            .or_else(|| request.arguments.get("branch"))
            .map(String::as_str);

        let checkout = request.cache_dir.join(cache_key(request.uri, reference));

        if checkout.exists() {
            debug!("Using cached checkout: {}", checkout.display());
        } else {
            std::fs::create_dir_all(request.cache_dir)?;
            info!("Cloning {} into {}", request.uri, checkout.display());
            let checkout_path = checkout.to_string_lossy();
            run_git(&["clone", request.uri, checkout_path.as_ref()], request.uri).await?;

            if let Some(reference) = reference {
                run_git(
                    &["-C", checkout_path.as_ref(), "checkout", reference],
                    request.uri,
                )
                .await?;
            }
        }

        let root = if request.location.is_empty() {
            checkout
        } else {
            checkout.join(request.location)
        };

        if !root.is_dir() {
            return Err(PathError::fetch(
                "git",
                request.uri,
                format!("location '{}' not found in the fetched tree", request.location),
            )
            .into());
        }

        Ok(root)
    }
}

/// Runs a git subcommand, surfacing stderr on failure.
async fn run_git(args: &[&str], uri: &str) -> Result<()> {
    let output = tokio::process::Command::new("git")
        .args(args)
        .output()
        .await
        .map_err(|e| PathError::fetch("git", uri, format!("failed to run git: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(PathError::fetch("git", uri, stderr.trim().to_string()).into());
    }
    Ok(())
}

/// Builds a cache directory name from a sanitized URI stem plus a digest of
/// URI and ref, so distinct refs of one repository never collide.
fn cache_key(uri: &str, reference: Option<&str>) -> String {
    let stem = uri
        .rsplit('/')
        .next()
        .unwrap_or(uri)
        .trim_end_matches(".git");
    let sanitized: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();

    let mut hasher = Sha256::new();
    hasher.update(uri.as_bytes());
    hasher.update(b"@");
    hasher.update(reference.unwrap_or("HEAD").as_bytes());
    let digest = hex::encode(hasher.finalize());

    format!("{sanitized}-{}", &digest[..12])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_is_deterministic() {
        let a = cache_key("https://example.com/repo.git", Some("main"));
        let b = cache_key("https://example.com/repo.git", Some("main"));
        assert_eq!(a, b);
    }

    #[test]
    fn test_cache_key_varies_by_reference() {
        let a = cache_key("https://example.com/repo.git", Some("main"));
        let b = cache_key("https://example.com/repo.git", Some("v1.2.0"));
        assert_ne!(a, b);
        assert!(a.starts_with("repo-"));
        assert!(b.starts_with("repo-"));
    }

    #[test]
    fn test_cache_key_sanitizes_stem() {
        let key = cache_key("git://example.com/my.odd~repo.git", None);
        let stem = key.rsplit_once('-').map(|(s, _)| s).unwrap_or(&key);
        assert!(stem.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_registry_returns_registered_fetcher() {
        let registry = FetcherRegistry::default();
        assert!(registry.get("git").is_ok());
        assert!(registry.get("s3").is_err());
    }
}
