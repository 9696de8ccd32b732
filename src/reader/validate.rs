use url::Url;

use crate::error::ReaderError;

/// Parse `input` as an absolute http(s) URL.
pub fn validate_url(input: &str) -> Result<Url, ReaderError> {
    let url = Url::parse(input.trim()).map_err(|_| ReaderError::InvalidUrl)?;
    match url.scheme() {
        "http" | "https" if url.host().is_some() => Ok(url),
        _ => Err(ReaderError::InvalidUrl),
    }
}
