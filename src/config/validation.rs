//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check addresses, regexes and URLs parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServiceConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use regex::Regex;
use url::Url;

use crate::config::schema::ServiceConfig;

/// One rejected config value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let bind = &config.server.bind_address;
    if bind.is_empty() {
        errors.push(ValidationError::new("server.bind_address", "must not be empty"));
    } else if !bind.contains(':') {
        errors.push(ValidationError::new(
            "server.bind_address",
            format!("{bind:?} has no port"),
        ));
    }

    if let Some(tls) = &config.server.tls {
        if tls.cert_path.is_empty() || tls.key_path.is_empty() {
            errors.push(ValidationError::new(
                "server.tls",
                "cert_path and key_path are both required",
            ));
        }
    }

    if let Some(routes) = &config.access_log.ignore_routes {
        if let Err(e) = Regex::new(routes) {
            errors.push(ValidationError::new("access_log.ignore_routes", e.to_string()));
        }
    }

    let observability = &config.observability;
    if observability.metrics_enabled
        && observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("{:?} is not a socket address", observability.metrics_address),
        ));
    }

    match Url::parse(&config.client.base_url) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
        Ok(url) => errors.push(ValidationError::new(
            "client.base_url",
            format!("unsupported scheme {:?}", url.scheme()),
        )),
        Err(e) => errors.push(ValidationError::new("client.base_url", e.to_string())),
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::TlsConfig;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(validate_config(&ServiceConfig::default()), Ok(()));
    }

    #[test]
    fn collects_every_error() {
        let mut config = ServiceConfig::default();
        config.server.bind_address = "localhost".to_string();
        config.server.tls = Some(TlsConfig {
            cert_path: "cert.pem".to_string(),
            key_path: String::new(),
        });
        config.access_log.ignore_routes = Some("([".to_string());
        config.observability.metrics_enabled = true;
        config.observability.metrics_address = "nowhere".to_string();
        config.client.base_url = "ftp://files".to_string();

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            [
                "server.bind_address",
                "server.tls",
                "access_log.ignore_routes",
                "observability.metrics_address",
                "client.base_url",
            ]
        );
    }

    #[test]
    fn metrics_address_ignored_when_disabled() {
        let mut config = ServiceConfig::default();
        config.observability.metrics_address = "nowhere".to_string();
        assert!(validate_config(&config).is_ok());
    }
}
