use reqwest::Url;

use super::route::normalize_path;

/// A link the user activated
#[derive(Debug, Clone, Default)]
pub struct Link<'a> {
    pub href: &'a str,
    pub target: Option<&'a str>,
    pub download: bool,
}

impl<'a> Link<'a> {
    pub fn new(href: &'a str) -> Self {
        Self {
            href,
            ..Self::default()
        }
    }
}

/// Whether a link click is handled in place or left to the platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkDisposition {
    /// Navigate in place to this normalized path
    Intercept(String),
    Native,
}

const NATIVE_SCHEMES: &[&str] = &["mailto:", "tel:", "javascript:", "data:"];

/// Decide how to handle a link.
///
/// Same-origin links are intercepted. Hash-only links, downloads, links that
/// open another window, non-http schemes and cross-origin links are native.
pub fn link_disposition(link: &Link<'_>, origin: Option<&Url>) -> LinkDisposition {
    let href = link.href.trim();
    if href.is_empty() || href.starts_with('#') || link.download {
        return LinkDisposition::Native;
    }
    if link.target.is_some_and(|t| !t.eq_ignore_ascii_case("_self")) {
        return LinkDisposition::Native;
    }
    let lower = href.to_ascii_lowercase();
    if NATIVE_SCHEMES.iter().any(|scheme| lower.starts_with(scheme)) {
        return LinkDisposition::Native;
    }

    match Url::parse(href) {
        Ok(absolute) => match origin {
            Some(origin) if absolute.origin() == origin.origin() => {
                LinkDisposition::Intercept(path_and_query(&absolute))
            }
            _ => LinkDisposition::Native,
        },
        Err(_) if href.starts_with("//") => LinkDisposition::Native,
        Err(_) if href.starts_with('/') => LinkDisposition::Intercept(normalize_path(href)),
        Err(_) => match origin.and_then(|o| o.join(href).ok()) {
            Some(resolved) => LinkDisposition::Intercept(path_and_query(&resolved)),
            None => LinkDisposition::Native,
        },
    }
}

fn path_and_query(url: &Url) -> String {
    match url.query() {
        Some(query) => normalize_path(&format!("{}?{}", url.path(), query)),
        None => normalize_path(url.path()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> Url {
        Url::parse("https://stm.example.com/dashboard/").unwrap()
    }

    #[test]
    fn test_same_origin_links_are_intercepted() {
        let o = origin();
        assert_eq!(
            link_disposition(&Link::new("/sales-budget/"), Some(&o)),
            LinkDisposition::Intercept("/sales-budget".into())
        );
        assert_eq!(
            link_disposition(&Link::new("https://stm.example.com/reports/?y=2025"), Some(&o)),
            LinkDisposition::Intercept("/reports?y=2025".into())
        );
        assert_eq!(
            link_disposition(&Link::new("profile/"), Some(&o)),
            LinkDisposition::Intercept("/dashboard/profile".into())
        );
    }

    #[test]
    fn test_native_links() {
        let o = origin();
        for href in ["#top", "mailto:ops@stm.example.com", "tel:+2301234", "javascript:void(0)"] {
            assert_eq!(link_disposition(&Link::new(href), Some(&o)), LinkDisposition::Native, "{}", href);
        }
        assert_eq!(
            link_disposition(&Link::new("https://cdn.example.net/x"), Some(&o)),
            LinkDisposition::Native
        );
        assert_eq!(link_disposition(&Link::new("//cdn.example.net/x"), Some(&o)), LinkDisposition::Native);

        let download = Link {
            download: true,
            ..Link::new("/export/")
        };
        assert_eq!(link_disposition(&download, Some(&o)), LinkDisposition::Native);

        let blank = Link {
            target: Some("_blank"),
            ..Link::new("/reports/")
        };
        assert_eq!(link_disposition(&blank, Some(&o)), LinkDisposition::Native);
    }

    #[test]
    fn test_without_origin_only_absolute_paths_are_intercepted() {
        assert_eq!(
            link_disposition(&Link::new("/profile"), None),
            LinkDisposition::Intercept("/profile".into())
        );
        assert_eq!(link_disposition(&Link::new("profile"), None), LinkDisposition::Native);
    }
}
