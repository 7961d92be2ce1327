use url::Url;

/// Resolves a possibly-relative link URL against a base URI.
///
/// An absolute `relative` is returned unchanged. Otherwise the result
/// takes the base's scheme, the relative's authority when it has one, and
/// the relative's path joined to the directory portion of the base path
/// when it is not absolute.
pub fn resolve(base: &Url, relative: &str) -> Result<Url, url::ParseError> {
    match Url::parse(relative) {
        Ok(absolute) => Ok(absolute),
        Err(url::ParseError::RelativeUrlWithoutBase) => base.join(relative),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("http://h/a/b").unwrap()
    }

    #[test]
    fn absolute_passes_through() {
        let resolved = resolve(&base(), "https://other/x?q=1").unwrap();
        assert_eq!(resolved.as_str(), "https://other/x?q=1");
    }

    #[test]
    fn relative_path_joins_base_directory() {
        let resolved = resolve(&base(), "x").unwrap();
        assert_eq!(resolved.as_str(), "http://h/a/x");
    }

    #[test]
    fn absolute_path_replaces_base_path() {
        let resolved = resolve(&base(), "/feed/unsub").unwrap();
        assert_eq!(resolved.as_str(), "http://h/feed/unsub");
    }

    #[test]
    fn authority_relative_keeps_base_scheme() {
        let resolved = resolve(&base(), "//other/x").unwrap();
        assert_eq!(resolved.as_str(), "http://other/x");
    }

    #[test]
    fn query_only_relative() {
        let resolved = resolve(&base(), "?p3sub-ts=2024-01-01T00:00:00.000000Z").unwrap();
        assert_eq!(
            resolved.as_str(),
            "http://h/a/b?p3sub-ts=2024-01-01T00:00:00.000000Z"
        );
    }
}
