use url::Url;

use crate::error::{LoggerError, Result};

/// Validate a logging endpoint URL.
///
/// The URL must parse, use `http` or `https`, name a host and carry no
/// embedded credentials. On success the input is returned unchanged.
pub fn validate_endpoint(endpoint: &str) -> Result<String> {
    if endpoint.is_empty() {
        return Err(LoggerError::Configuration(
            "endpoint URL is required".to_string(),
        ));
    }
    if endpoint.trim() != endpoint {
        return Err(LoggerError::Configuration(format!(
            "endpoint URL has surrounding whitespace: {endpoint:?}"
        )));
    }

    let url = Url::parse(endpoint).map_err(|e| {
        LoggerError::Configuration(format!("invalid endpoint URL '{endpoint}': {e}"))
    })?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(LoggerError::Configuration(format!(
            "unsupported endpoint scheme '{}': {endpoint}",
            url.scheme()
        )));
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(LoggerError::Configuration(format!(
            "endpoint URL has no host: {endpoint}"
        )));
    }

    if !url.username().is_empty() || url.password().is_some() {
        return Err(LoggerError::Configuration(
            "endpoint URL must not contain credentials".to_string(),
        ));
    }

    Ok(endpoint.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_endpoints_are_valid() {
        assert!(validate_endpoint(crate::types::DEFAULT_BASIC_EVENTS_URL).is_ok());
        assert!(validate_endpoint(crate::types::DEFAULT_EVENTS_URL).is_ok());
    }

    #[test]
    fn ipv6_literal_host_is_accepted() {
        assert!(validate_endpoint("http://[::1]:8083/log").is_ok());
    }

    #[test]
    fn rejects_unknown_scheme() {
        let err = validate_endpoint("ftp://example.com/log").unwrap_err();
        assert!(err.to_string().contains("scheme"));
    }

    #[test]
    fn rejects_surrounding_whitespace_instead_of_trimming() {
        assert!(validate_endpoint(" https://logs.example.com/log").is_err());
        assert!(validate_endpoint("https://logs.example.com/log\n").is_err());
    }

    #[test]
    fn returns_input_verbatim() {
        let raw = "HTTPS://Logs.Example.com:443/log?src=app";
        assert_eq!(validate_endpoint(raw).unwrap(), raw);
    }
}
