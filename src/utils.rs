use reqwest::Method;

use crate::error::ConfigError;
use crate::models::EndpointDescriptor;

/// Parse an endpoint definition like "GET /api/v1/users"
pub fn parse_endpoint(definition: &str) -> Result<EndpointDescriptor, ConfigError> {
    let parts: Vec<&str> = definition.trim().splitn(2, ' ').collect();
    if parts.len() != 2 {
        return Err(ConfigError::InvalidEndpoint(format!(
            "expected '<METHOD> <path>', got '{definition}'"
        )));
    }

    let method = Method::from_bytes(parts[0].to_ascii_uppercase().as_bytes())
        .map_err(|_| ConfigError::InvalidEndpoint(format!("invalid method '{}'", parts[0])))?;

    let path = parts[1].trim();
    if !path.starts_with('/') {
        return Err(ConfigError::InvalidEndpoint(format!(
            "path must start with '/': {path}"
        )));
    }

    Ok(EndpointDescriptor::new(method, path))
}

/// Parse a list of endpoint definitions, skipping empty entries
pub fn parse_endpoints(definitions: &[String]) -> Result<Vec<EndpointDescriptor>, ConfigError> {
    definitions
        .iter()
        .filter(|d| !d.trim().is_empty())
        .map(|d| parse_endpoint(d))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_method_and_path() {
        let ep = parse_endpoint("post /api/obs/sign-up").unwrap();
        assert_eq!(ep.method, Method::POST);
        assert_eq!(ep.path, "/api/obs/sign-up");
        assert!(!ep.login);
        assert!(ep.payload.is_none());
    }

    #[test]
    fn rejects_malformed_definitions() {
        assert!(parse_endpoint("/only/a/path").is_err());
        assert!(parse_endpoint("GET api/no-slash").is_err());
        assert!(parse_endpoint("G@T /x").is_err());
    }

    #[test]
    fn skips_blank_entries() {
        let eps = parse_endpoints(&["GET /a".to_string(), "  ".to_string()]).unwrap();
        assert_eq!(eps.len(), 1);
    }
}
