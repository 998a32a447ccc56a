use thiserror::Error;
use url::Url;

/// Errors that can occur when turning a source path into a request URL.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    /// The URL string could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    /// The URL has no host to connect to.
    #[error("URL has no host")]
    MissingHost,
}

/// Validates the path of an HTTP source before it is requested.
///
/// Only `http` and `https` URLs with a host are accepted. Local and private
/// addresses are allowed since feeds are often served from the same machine.
///
/// # Examples
///
/// ```
/// use feedmux::util::validate_feed_url;
///
/// let url = validate_feed_url("https://xkcd.com/atom.xml").unwrap();
/// assert_eq!(url.host_str(), Some("xkcd.com"));
///
/// assert!(validate_feed_url("ftp://example.com/feed").is_err());
/// ```
pub fn validate_feed_url(url_str: &str) -> Result<Url, UrlValidationError> {
    let url = Url::parse(url_str.trim())?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(UrlValidationError::MissingHost);
    }

    Ok(url)
}
