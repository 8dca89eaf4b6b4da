use thiserror::Error;
use url::Url;

/// Errors that can occur while validating a configured URL.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    /// The URL string could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    /// The URL has no host component.
    #[error("URL has no host")]
    MissingHost,
}

/// Validates a feed or API URL from the settings file.
///
/// Only `http` and `https` URLs with a host are accepted. Private and
/// loopback hosts are allowed.
///
/// # Examples
///
/// ```
/// use podcast_bot::util::validate_http_url;
///
/// let url = validate_http_url("https://feeds.example.com/show.xml").unwrap();
/// assert_eq!(url.host_str(), Some("feeds.example.com"));
///
/// assert!(validate_http_url("file:///etc/passwd").is_err());
/// ```
pub fn validate_http_url(url_str: &str) -> Result<Url, UrlValidationError> {
    let url = Url::parse(url_str.trim())?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }

    match url.host_str() {
        Some(host) if !host.is_empty() => {}
        _ => return Err(UrlValidationError::MissingHost),
    }

    Ok(url)
}
