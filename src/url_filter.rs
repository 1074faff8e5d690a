//! URL canonicalization and allow/deny filtering.
//!
//! A pure function from a raw link string + base URL to either a canonical
//! `Url` or a rejection. Never panics; unresolvable or non-http(s) links are
//! simply rejected.

use regex::Regex;
use url::Url;

/// Resolve `href` against `base`, strip the fragment, and require an
/// `http`/`https` scheme with a non-empty host.
///
/// Idempotent: `normalize(base, normalize(base, href).as_str()) ==
/// normalize(base, href)` for any URL already in canonical form.
pub fn normalize(base: &Url, href: &str) -> Option<Url> {
    let mut resolved = base.join(href).ok()?;

    if resolved.scheme() != "http" && resolved.scheme() != "https" {
        return None;
    }
    if resolved.host_str().is_none() || resolved.host_str() == Some("") {
        return None;
    }

    resolved.set_fragment(None);
    Some(resolved)
}

/// Host + pattern based filtering, applied after normalization.
#[derive(Debug, Clone, Default)]
pub struct UrlFilter {
    allowed_domains: Vec<String>,
    include_patterns: Vec<Regex>,
    exclude_patterns: Vec<Regex>,
}

impl UrlFilter {
    pub fn new(
        allowed_domains: Vec<String>,
        include_patterns: Vec<Regex>,
        exclude_patterns: Vec<Regex>,
    ) -> Self {
        Self {
            allowed_domains,
            include_patterns,
            exclude_patterns,
        }
    }

    /// (a) host must suffix-match `allowed_domains` when non-empty; (b) no
    /// `exclude_patterns` match; (c) if `include_patterns` is non-empty, at
    /// least one must match.
    pub fn is_allowed(&self, url: &Url) -> bool {
        if !self.allowed_domains.is_empty() {
            let Some(host) = url.host_str() else {
                return false;
            };
            if !self.allowed_domains.iter().any(|d| host.ends_with(d.as_str())) {
                return false;
            }
        }

        let as_str = url.as_str();
        if self.exclude_patterns.iter().any(|re| re.is_match(as_str)) {
            return false;
        }

        if !self.include_patterns.is_empty() {
            return self.include_patterns.iter().any(|re| re.is_match(as_str));
        }

        true
    }

    /// Normalize `href` against `base` then apply the filter. Returns
    /// `None` for any rejection at either stage.
    pub fn normalize_and_filter(&self, base: &Url, href: &str) -> Option<Url> {
        let url = normalize(base, href)?;
        self.is_allowed(&url).then_some(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://example.com/page").unwrap()
    }

    #[test]
    fn resolves_relative_links() {
        let url = normalize(&base(), "/about").unwrap();
        assert_eq!(url.as_str(), "https://example.com/about");
    }

    #[test]
    fn strips_fragment() {
        let url = normalize(&base(), "/about#team").unwrap();
        assert_eq!(url.as_str(), "https://example.com/about");
    }

    #[test]
    fn rejects_non_http_schemes() {
        assert!(normalize(&base(), "mailto:hi@example.com").is_none());
        assert!(normalize(&base(), "javascript:void(0)").is_none());
    }

    #[test]
    fn normalize_is_idempotent() {
        let once = normalize(&base(), "/about#x").unwrap();
        let twice = normalize(&once.clone(), once.as_str()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn allowed_domains_suffix_match() {
        let filter = UrlFilter::new(vec!["example.com".into()], vec![], vec![]);
        assert!(filter.is_allowed(&Url::parse("https://sub.example.com/x").unwrap()));
        assert!(!filter.is_allowed(&Url::parse("https://other.org/x").unwrap()));
    }

    #[test]
    fn exclude_beats_include() {
        let filter = UrlFilter::new(
            vec![],
            vec![Regex::new("/public").unwrap()],
            vec![Regex::new("/public/secret").unwrap()],
        );
        assert!(filter.is_allowed(&Url::parse("https://example.com/public/page").unwrap()));
        assert!(!filter.is_allowed(&Url::parse("https://example.com/public/secret").unwrap()));
    }
}
