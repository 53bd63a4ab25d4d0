//! Public URLs for stored content.
//!
//! Pure string work: a URL can be built for any relpath whether or not the
//! content behind it exists.

use crate::address::Address;
use crate::config::HashFsConfig;
use crate::error::Result;

/// Builds URLs from the configured host and path prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlBuilder {
    host: Option<String>,
    path_prefix: String,
}

impl UrlBuilder {
    pub fn new(config: &HashFsConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            host: config.host.clone(),
            path_prefix: config.path_prefix.clone(),
        })
    }

    /// `host` (if configured) + `path_prefix` + `relpath`.
    pub fn url_for(&self, relpath: &str) -> String {
        match &self.host {
            Some(host) => join_url(&[host.as_str(), "/", self.path_prefix.as_str(), relpath]),
            None => self.relative_url_for(relpath),
        }
    }

    /// Host-relative URL, ignoring any configured host.
    pub fn relative_url_for(&self, relpath: &str) -> String {
        join_url(&["/", self.path_prefix.as_str(), relpath])
    }

    /// Absolute URL, falling back to `request_host` when no host is configured.
    pub fn external_url_for(&self, relpath: &str, request_host: &str) -> String {
        let host = self.host.as_deref().unwrap_or(request_host);
        join_url(&[host, "/", self.path_prefix.as_str(), relpath])
    }

    pub fn url_for_address(&self, address: &Address) -> String {
        self.url_for(&address.relpath)
    }
}

/// Join URL segments with exactly one `/` between them.
///
/// Empty segments are dropped. A lone segment comes back verbatim. Otherwise
/// the result keeps a leading `/` if the first segment had one and a
/// trailing `/` if the last did.
pub fn join_url(segments: &[&str]) -> String {
    let segments: Vec<&str> = segments.iter().copied().filter(|s| !s.is_empty()).collect();

    match segments.as_slice() {
        [] => String::new(),
        [only] => (*only).to_string(),
        [first, .., last] => {
            let leading = if first.starts_with('/') { "/" } else { "" };
            let trailing = if last.ends_with('/') { "/" } else { "" };
            let middle = segments
                .iter()
                .map(|s| s.trim_matches('/'))
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join("/");
            format!("{leading}{middle}{trailing}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder(host: Option<&str>, prefix: &str) -> UrlBuilder {
        let mut config = HashFsConfig::new("/srv").with_path_prefix(prefix);
        config.host = host.map(str::to_string);
        UrlBuilder::new(&config).unwrap()
    }

    #[test]
    fn test_join_url() {
        assert_eq!(join_url(&[""]), "");
        assert_eq!(join_url(&["/"]), "/");
        assert_eq!(join_url(&["", "/a"]), "/a");
        assert_eq!(join_url(&["a", "/"]), "a/");
        assert_eq!(join_url(&["", "/a", "", "", "b"]), "/a/b");
        assert_eq!(join_url(&["/a/", "b/", "/c", "d", "e/"]), "/a/b/c/d/e/");
        assert_eq!(join_url(&["a", "b", "c"]), "a/b/c");
        assert_eq!(join_url(&["a/b", "/c/d/", "/e/f"]), "a/b/c/d/e/f");
        assert_eq!(join_url(&["/", "a", "b", "c", "1", "/"]), "/a/b/c/1/");
        assert_eq!(join_url(&[]), "");
    }

    #[test]
    fn test_url_for_without_host_is_relative() {
        let urls = builder(None, "/uploads");
        assert_eq!(urls.url_for("a/b/c123"), "/uploads/a/b/c123");
        assert_eq!(builder(None, "").url_for("foo/bar/baz.txt"), "/foo/bar/baz.txt");
    }

    #[test]
    fn test_url_for_with_host() {
        let urls = builder(Some("https://s3.amazon.com/foobar"), "");
        assert_eq!(urls.url_for("qux"), "https://s3.amazon.com/foobar/qux");

        let urls = builder(Some("https://s3.amazon.com/foobar"), "/aaa");
        assert_eq!(urls.url_for("qux"), "https://s3.amazon.com/foobar/aaa/qux");
        assert_eq!(urls.relative_url_for("qux"), "/aaa/qux");
    }

    #[test]
    fn test_url_for_normalizes_slashes() {
        let urls = builder(Some("https://cdn.example.com/"), "/files/");
        assert_eq!(urls.url_for("/a/b/c"), "https://cdn.example.com/files/a/b/c");
    }

    #[test]
    fn test_external_url_falls_back_to_request_host() {
        let urls = builder(None, "");
        assert_eq!(
            urls.external_url_for("foo/bar/baz.txt", "http://localhost/"),
            "http://localhost/foo/bar/baz.txt"
        );

        let urls = builder(None, "/aaa");
        assert_eq!(
            urls.external_url_for("foo/bar/baz.txt", "http://localhost/"),
            "http://localhost/aaa/foo/bar/baz.txt"
        );

        let urls = builder(Some("https://s3.amazon.com/foobar"), "/aaa");
        assert_eq!(
            urls.external_url_for("qux", "http://localhost/"),
            "https://s3.amazon.com/foobar/aaa/qux"
        );
    }

    #[test]
    fn test_rejects_prefix_without_slash() {
        let config = HashFsConfig::new("/srv").with_path_prefix("foo");
        assert!(UrlBuilder::new(&config).is_err());
    }
}
