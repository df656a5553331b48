//! Module path parsing and resolution.
//!
//! A module's `path` field is either a local directory (relative to the
//! environment root) or a remote definition of the form
//! `source::uri//location?opt=val&opt2=val2`. Remote definitions are
//! materialized through a registered [`fetcher::SourceFetcher`]; the
//! parsed pieces and the fetch contract live here.

pub mod fetcher;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{PathError, Result};

pub use fetcher::{FetchRequest, FetcherRegistry, GitFetcher, SourceFetcher};

/// Source key used for plain filesystem paths.
pub const LOCAL_SOURCE: &str = "local";

/// A parsed module path definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModulePath {
    definition: String,
    source: String,
    uri: String,
    location: String,
    arguments: BTreeMap<String, String>,
    cache_dir: PathBuf,
}

impl ModulePath {
    /// Parses a path definition.
    ///
    /// A definition with no `::` separator, or one beginning with a
    /// path-like prefix (`/`, `./`, `.`), is local; the whole string is the
    /// location relative to the environment root. Anything else names a
    /// remote source: `source::uri//location?k=v&k2=v2`, where the `//`
    /// separating URI from location is the first one after the protocol
    /// separator if the URI carries one.
    ///
    /// # Errors
    ///
    /// Returns an error if the argument list cannot be parsed.
    pub fn parse(definition: &str) -> Result<Self> {
        let cache_dir = default_cache_dir();

        if definition.starts_with('/') || definition.starts_with('.') {
            return Ok(Self::local(definition, cache_dir));
        }
        let Some((source, rest)) = definition.split_once("::") else {
            return Ok(Self::local(definition, cache_dir));
        };

        let (addr, query) = rest
            .split_once('?')
            .map_or((rest, None), |(addr, query)| (addr, Some(query)));

        let arguments = query.map_or_else(|| Ok(BTreeMap::new()), |q| parse_arguments(definition, q))?;

        let (uri, location) = split_uri_location(addr);

        Ok(Self {
            definition: definition.to_string(),
            source: source.to_string(),
            uri: uri.to_string(),
            location: location.to_string(),
            arguments,
            cache_dir,
        })
    }

    /// Builds a local path definition.
    fn local(definition: &str, cache_dir: PathBuf) -> Self {
        Self {
            definition: definition.to_string(),
            source: LOCAL_SOURCE.to_string(),
            uri: String::new(),
            location: definition.to_string(),
            arguments: BTreeMap::new(),
            cache_dir,
        }
    }

    /// Overrides the cache directory used for remote fetches.
    #[must_use]
    pub fn with_cache_dir(mut self, cache_dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = cache_dir.into();
        self
    }

    /// Returns the raw definition string.
    #[must_use]
    pub fn definition(&self) -> &str {
        &self.definition
    }

    /// Returns the source key (`local` or a registered fetcher key).
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Returns the remote URI (empty for local paths).
    #[must_use]
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Returns the sub-path within the source tree.
    #[must_use]
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Returns the parsed `?k=v` arguments.
    #[must_use]
    pub const fn arguments(&self) -> &BTreeMap<String, String> {
        &self.arguments
    }

    /// Returns true for plain filesystem paths.
    #[must_use]
    pub fn is_local(&self) -> bool {
        self.source == LOCAL_SOURCE
    }

    /// Resolves the directory the module runs in.
    ///
    /// Local paths join the location onto `root_dir`; remote paths delegate
    /// to the fetcher registered for their source key.
    ///
    /// # Errors
    ///
    /// Returns [`PathError::UnknownSource`] for an unregistered source, or
    /// the fetcher's error if materialization fails.
    pub async fn module_root(
        &self,
        root_dir: &Path,
        fetchers: &FetcherRegistry,
    ) -> Result<PathBuf> {
        if self.is_local() {
            return Ok(root_dir.join(&self.location));
        }

        let fetcher = fetchers.get(&self.source)?;
        fetcher
            .fetch(FetchRequest {
                uri: &self.uri,
                location: &self.location,
                arguments: &self.arguments,
                cache_dir: &self.cache_dir,
            })
            .await
    }
}

/// Splits `uri//location`, tolerating protocol URIs that contain `//`.
fn split_uri_location(addr: &str) -> (&str, &str) {
    let search_from = addr.find("://").map_or(0, |idx| idx + 3);
    addr[search_from..].find("//").map_or((addr, ""), |offset| {
        let split_at = search_from + offset;
        (&addr[..split_at], &addr[split_at + 2..])
    })
}

/// Parses `k=v&k2=v2` trailing arguments.
fn parse_arguments(definition: &str, query: &str) -> Result<BTreeMap<String, String>> {
    let mut arguments = BTreeMap::new();
    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let Some((key, value)) = pair.split_once('=') else {
            return Err(PathError::InvalidDefinition {
                definition: definition.to_string(),
                message: format!("argument '{pair}' is not a key=value pair"),
            }
            .into());
        };
        arguments.insert(key.to_string(), value.to_string());
    }
    Ok(arguments)
}

/// Default cache directory for fetched sources.
fn default_cache_dir() -> PathBuf {
    dirs::cache_dir().map_or_else(|| PathBuf::from(".runway_cache"), |dir| dir.join("runway"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_git_definition() {
        let path = ModulePath::parse("git::git://example.com/repo.git//src/app?branch=main").unwrap();
        assert_eq!(path.source(), "git");
        assert_eq!(path.uri(), "git://example.com/repo.git");
        assert_eq!(path.location(), "src/app");
        assert_eq!(path.arguments().get("branch").map(String::as_str), Some("main"));
    }

    #[test]
    fn test_parse_multiple_arguments() {
        let path =
            ModulePath::parse("git::https://example.com/repo.git//infra?branch=main&depth=1")
                .unwrap();
        assert_eq!(path.uri(), "https://example.com/repo.git");
        assert_eq!(path.location(), "infra");
        assert_eq!(path.arguments().len(), 2);
        assert_eq!(path.arguments().get("depth").map(String::as_str), Some("1"));
    }

    #[test]
    fn test_parse_without_location() {
        let path = ModulePath::parse("git::https://example.com/repo.git").unwrap();
        assert_eq!(path.uri(), "https://example.com/repo.git");
        assert_eq!(path.location(), "");
    }

    #[test]
    fn test_shorthand_is_local() {
        let path = ModulePath::parse("sampleapp.cfn").unwrap();
        assert!(path.is_local());
        assert_eq!(path.location(), "sampleapp.cfn");
    }

    #[test]
    fn test_dotted_prefix_is_local() {
        for definition in ["./modules/app.tf", "../shared/app.tf", "/abs/path/app.tf", "."] {
            let path = ModulePath::parse(definition).unwrap();
            assert!(path.is_local(), "{definition} should be local");
            assert_eq!(path.location(), definition);
        }
    }

    #[test]
    fn test_malformed_argument_rejected() {
        let err = ModulePath::parse("git::https://example.com/r.git//app?branch").unwrap_err();
        assert!(err.to_string().contains("branch"));
    }

    #[tokio::test]
    async fn test_local_module_root_joins_root_dir() {
        let path = ModulePath::parse("sampleapp.tf").unwrap();
        let fetchers = FetcherRegistry::empty();
        let root = path
            .module_root(Path::new("/work/env"), &fetchers)
            .await
            .unwrap();
        assert_eq!(root, PathBuf::from("/work/env/sampleapp.tf"));
    }

    #[tokio::test]
    async fn test_unregistered_source_is_hard_error() {
        let path = ModulePath::parse("s3::bucket/key//app").unwrap();
        let fetchers = FetcherRegistry::empty();
        let err = path
            .module_root(Path::new("/work/env"), &fetchers)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::RunwayError::Path(PathError::UnknownSource { .. })
        ));
    }
}
