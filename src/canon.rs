//! URL canonicalization.
//!
//! Targets are deduplicated and grouped by host using the canonical form of
//! their URL: lowercase scheme and host, default ports dropped, fragment
//! dropped, query preserved verbatim, and a single trailing slash stripped
//! from non-root paths.

use thiserror::Error;
use url::Url;

/// Canonicalization failure: the input could not be parsed as an absolute URL.
#[derive(Error, Debug)]
pub enum CanonError {
    #[error(transparent)]
    Parse(#[from] url::ParseError),
}

/// Map a raw URL to its canonical form.
///
/// Scheme-agnostic: the API layer restricts creation to `http`/`https`, but
/// any parseable absolute URL canonicalizes. The parser itself lowercases
/// scheme and host and drops default ports; for special-scheme URLs it also
/// represents an empty path as `/`, so `https://example.com` and
/// `https://example.com/` share one canonical form.
pub fn canonicalize_url(raw: &str) -> Result<String, CanonError> {
    let mut parsed = Url::parse(raw)?;

    parsed.set_fragment(None);

    let path = parsed.path();
    if path != "/" && path.ends_with('/') {
        let trimmed = path[..path.len() - 1].to_string();
        parsed.set_path(&trimmed);
    }

    Ok(parsed.to_string())
}

/// Gate key for per-host serialization: the URL's host, keeping any explicit
/// port so two servers on one machine are gated independently.
pub fn host_key(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_canonicalize_url() {
        let cases = [
            ("https://Example.Com/path/", "https://example.com/path"),
            ("HTTP://EXAMPLE.COM:80/", "http://example.com/"),
            ("https://example.com:443/path", "https://example.com/path"),
            (
                "https://example.com/path?query=value#fragment",
                "https://example.com/path?query=value",
            ),
            ("https://example.com/", "https://example.com/"),
            ("https://example.com", "https://example.com/"),
            ("https://example.com:8443/path", "https://example.com:8443/path"),
            ("https://example.com/a//", "https://example.com/a/"),
            ("https://user:pw@example.com/x", "https://user:pw@example.com/x"),
            ("https://example.com/p?b=2&a=1", "https://example.com/p?b=2&a=1"),
        ];

        for (input, expected) in cases {
            let got = canonicalize_url(input).unwrap();
            assert_eq!(got, expected, "for input {input:?}");
        }
    }

    #[test]
    fn test_missing_scheme_is_rejected() {
        assert!(canonicalize_url("example.com").is_err());
        assert!(canonicalize_url("//example.com/path").is_err());
        assert!(canonicalize_url("").is_err());
    }

    #[test]
    fn test_non_http_schemes_canonicalize() {
        // The registry may hold any canonicalizable URL; only the API layer
        // restricts schemes.
        assert_eq!(canonicalize_url("ftp://Example.Com/dir/").unwrap(), "ftp://example.com/dir");
    }

    #[test]
    fn test_host_key() {
        let url = Url::parse("http://Example.com/a").unwrap();
        assert_eq!(host_key(&url).unwrap(), "example.com");

        let url = Url::parse("http://example.com:8080/a").unwrap();
        assert_eq!(host_key(&url).unwrap(), "example.com:8080");

        // Default port is dropped by the parser, so it never splits a host.
        let url = Url::parse("https://example.com:443/a").unwrap();
        assert_eq!(host_key(&url).unwrap(), "example.com");
    }

    proptest! {
        #[test]
        fn canonicalization_is_idempotent(
            scheme in prop_oneof![Just("http"), Just("https")],
            host in "[a-z][a-z0-9-]{0,10}\\.(com|org|net)",
            path in "(/[a-zA-Z0-9._~-]{1,8}){0,4}/?",
            query in proptest::option::of("[a-z]{1,5}=[a-z0-9]{1,5}(&[a-z]{1,5}=[a-z0-9]{1,5}){0,2}"),
        ) {
            let mut raw = format!("{scheme}://{host}{path}");
            if let Some(q) = &query {
                raw.push('?');
                raw.push_str(q);
            }
            let once = canonicalize_url(&raw).unwrap();
            let twice = canonicalize_url(&once).unwrap();
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn case_and_default_port_do_not_affect_canonical_form(
            host in "[a-z][a-z0-9]{0,10}\\.com",
            path in "(/[a-z0-9]{1,6}){1,3}",
        ) {
            let base = canonicalize_url(&format!("https://{host}{path}")).unwrap();
            let shouty = canonicalize_url(&format!("HTTPS://{}{path}/", host.to_uppercase())).unwrap();
            let with_port = canonicalize_url(&format!("https://{host}:443{path}")).unwrap();
            prop_assert_eq!(&base, &shouty);
            prop_assert_eq!(&base, &with_port);
        }
    }
}
