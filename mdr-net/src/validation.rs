// mdr-net/src/validation.rs
use mdr_common::error::{MdrError, Result};
use tracing::warn;
use url::Url;

/// Remote repositories must be plain `http` or `https` URLs with a host.
pub fn validate_repository_url(url_str: &str) -> Result<()> {
    let url = Url::parse(url_str).map_err(|e| {
        MdrError::ValidationError(format!("Failed to parse URL '{url_str}': {e}"))
    })?;
    match url.scheme() {
        "https" => {}
        "http" => warn!("Repository {} is not served over https", url_str),
        other => {
            return Err(MdrError::ValidationError(format!(
                "Unsupported scheme '{other}' in repository URL: {url_str}"
            )))
        }
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(MdrError::ValidationError(format!(
            "Repository URL has no host: {url_str}"
        )));
    }
    Ok(())
}

/// Paths requested from a repository must stay inside it.
pub fn validate_relative_path(path: &str) -> Result<()> {
    if path.is_empty() || path.starts_with('/') || path.contains('\\') {
        return Err(MdrError::ValidationError(format!(
            "Invalid repository path: '{path}'"
        )));
    }
    if path.split('/').any(|segment| segment.is_empty() || segment == "." || segment == "..") {
        return Err(MdrError::ValidationError(format!(
            "Repository path '{path}' contains empty or relative segments"
        )));
    }
    Ok(())
}

/// Some repository managers answer a missing file with a 200 and an HTML error
/// page. Such a body is never a valid descriptor, artifact or checksum.
pub fn looks_like_html_page(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(256)];
    let text = String::from_utf8_lossy(head);
    let trimmed = text.trim_start().to_ascii_lowercase();
    trimmed.starts_with("<!doctype html") || trimmed.starts_with("<html")
}
