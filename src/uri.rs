// URL canonicalization and href splitting
//
// Every registry key and every fragment goes through these functions so the
// same document is never keyed under two spellings.
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use url::Url;

/// Split an href into its URL part and its percent-decoded fragment.
pub fn split_href(href: &str) -> (&str, Option<String>) {
    match href.find('#') {
        Some(pos) => (&href[..pos], Some(decode_fragment(&href[pos + 1..]))),
        None => (href, None),
    }
}

pub fn decode_fragment(fragment: &str) -> String {
    urlencoding::decode(fragment)
        .map(Cow::into_owned)
        .unwrap_or_else(|_| fragment.to_string())
}

/// Absolute, fragment-free form of `href` resolved against `base`.
///
/// Dot segments are collapsed and percent-encoding is normalized by the
/// `url` crate. Without a base, a non-URL is treated as a filesystem path.
pub fn canonicalize(base: Option<&str>, href: &str) -> Result<String, String> {
    let (location, _) = split_href(href.trim());
    let mut url = match base {
        Some(base) => {
            let base = Url::parse(base).map_err(|e| format!("invalid base URL {}: {}", base, e))?;
            base.join(location).map_err(|e| e.to_string())?
        }
        None => match Url::parse(location) {
            Ok(url) => url,
            Err(url::ParseError::RelativeUrlWithoutBase) => path_to_url(Path::new(location))?,
            Err(e) => return Err(e.to_string()),
        },
    };
    url.set_fragment(None);
    Ok(url.to_string())
}

fn path_to_url(path: &Path) -> Result<Url, String> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|e| e.to_string())?
            .join(path)
    };
    Url::from_file_path(&absolute).map_err(|_| format!("cannot convert {} to a URL", absolute.display()))
}

pub fn to_file_path(url: &str) -> Option<PathBuf> {
    Url::parse(url)
        .ok()
        .filter(|u| u.scheme() == "file")
        .and_then(|u| u.to_file_path().ok())
}

pub fn is_absolute_uri(value: &str) -> bool {
    !value.is_empty()
        && !value.chars().any(char::is_whitespace)
        && Url::parse(value).is_ok()
}

/// Naming authority of a URI: the host for hierarchical URIs, the
/// namespace identifier for URNs.
pub fn authority(uri: &str) -> Option<String> {
    let url = Url::parse(uri).ok()?;
    if let Some(host) = url.host_str() {
        return Some(host.to_ascii_lowercase());
    }
    if url.scheme() == "urn" {
        return url
            .path()
            .split(':')
            .next()
            .filter(|nid| !nid.is_empty())
            .map(str::to_ascii_lowercase);
    }
    None
}

/// Last path segment, for compact diagnostics.
pub fn file_name(url: &str) -> &str {
    url.rsplit('/').find(|s| !s.is_empty()).unwrap_or(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonicalize_collapses_dot_segments() {
        let a = canonicalize(Some("http://example.com/a/b/c.xsd"), "../d/./e.xsd").unwrap();
        let b = canonicalize(Some("http://example.com/a/x/y.xsd"), "/a/d/e.xsd#frag").unwrap();
        assert_eq!(a, "http://example.com/a/d/e.xsd");
        assert_eq!(a, b);
    }

    #[test]
    fn test_split_href_decodes_fragment() {
        let (url, fragment) = split_href("entry.xsd#ex%5FA");
        assert_eq!(url, "entry.xsd");
        assert_eq!(fragment.as_deref(), Some("ex_A"));
        assert_eq!(split_href("entry.xsd"), ("entry.xsd", None));
    }

    #[test]
    fn test_authority() {
        assert_eq!(authority("http://Example.com/ns").as_deref(), Some("example.com"));
        assert_eq!(authority("urn:ifrs:taxonomy").as_deref(), Some("ifrs"));
        assert_eq!(authority("relative/path"), None);
    }

    #[test]
    fn test_is_absolute_uri() {
        assert!(is_absolute_uri("http://example.com/role/x"));
        assert!(!is_absolute_uri("role/x"));
        assert!(!is_absolute_uri("http://example.com/a b"));
        assert!(!is_absolute_uri(""));
    }
}
