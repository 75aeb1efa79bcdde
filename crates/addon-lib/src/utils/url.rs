use crate::dist::{DistError, Result};

/// Join a relative path onto a base URL, the way a browser resolves a link.
///
/// The base is treated as a directory: a missing trailing slash is added so
/// the last segment is kept. Empty path segments in `relative` are dropped,
/// so `("https://host/v1/", "/win-x64//node.lib")` yields
/// `https://host/v1/win-x64/node.lib`.
pub fn join_url(base: &str, relative: &str) -> Result<String> {
    let base_dir = if base.ends_with('/') {
        base.to_string()
    } else {
        format!("{}/", base)
    };
    let base_url = url::Url::parse(&base_dir).map_err(|source| DistError::InvalidUrl {
        url: base.to_string(),
        source,
    })?;
    let relative = relative
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/");
    base_url
        .join(&relative)
        .map(String::from)
        .map_err(|source| DistError::InvalidUrl {
            url: format!("{}{}", base_dir, relative),
            source,
        })
}
