//! Proxy configuration, built the way the rest of this codebase builds its
//! configuration structs: a plain data type constructed through a chained
//! builder and validated once at `build()` time rather than on every access.

use regex::Regex;
use std::fmt;

/// Parsed `upstream` target: a host and a port, scheme and trailing slash
/// already stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upstream {
    pub host: String,
    pub port: u16,
}

impl Upstream {
    /// Parses `host[:port]`, optionally prefixed with `http://` or
    /// `https://` and suffixed with a trailing `/`, per the `upstream`
    /// config key contract.
    fn parse(raw: &str) -> Result<Self, ConfigError> {
        let mut value = raw.trim();
        let mut scheme_port = 80u16;

        if let Some(rest) = value.strip_prefix("https://") {
            value = rest;
            scheme_port = 443;
        } else if let Some(rest) = value.strip_prefix("http://") {
            value = rest;
            scheme_port = 80;
        }

        let value = value.strip_suffix('/').unwrap_or(value);
        if value.is_empty() {
            return Err(ConfigError::EmptyUpstream);
        }

        match value.rsplit_once(':') {
            Some((host, port_str)) if !host.is_empty() => {
                let port = port_str
                    .parse::<u16>()
                    .map_err(|_| ConfigError::InvalidUpstreamPort(port_str.to_string()))?;
                Ok(Self {
                    host: host.to_string(),
                    port,
                })
            }
            _ => Ok(Self {
                host: value.to_string(),
                port: scheme_port,
            }),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    MissingPort,
    MissingCanonicalHost,
    MissingUpstream,
    EmptyUpstream,
    InvalidUpstreamPort(String),
    InvalidOriginPattern(regex::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingPort => write!(f, "config: `port` is required"),
            Self::MissingCanonicalHost => write!(f, "config: `canonical_host` is required"),
            Self::MissingUpstream => write!(f, "config: `upstream` is required"),
            Self::EmptyUpstream => write!(f, "config: `upstream` has no host component"),
            Self::InvalidUpstreamPort(p) => write!(f, "config: invalid upstream port `{p}`"),
            Self::InvalidOriginPattern(e) => write!(f, "config: origin pattern: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Fully resolved proxy configuration.
///
/// `origin_pattern` is the compiled permissive-origin matcher carried as an
/// explicit field rather than a process-wide global, per the "explicit
/// dependencies instead of singletons" redesign note: it is built once here
/// and handed to the dispatcher, which hands it to every connection task.
pub struct ProxyConfig {
    pub port: u16,
    pub canonical_host: String,
    pub upstream: Upstream,
    pub accept_all: bool,
    pub log_warnings: bool,
    origin_pattern: Regex,
}

impl fmt::Debug for ProxyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyConfig")
            .field("port", &self.port)
            .field("canonical_host", &self.canonical_host)
            .field("upstream", &self.upstream)
            .field("accept_all", &self.accept_all)
            .field("log_warnings", &self.log_warnings)
            .finish()
    }
}

impl ProxyConfig {
    pub fn builder() -> ProxyConfigBuilder {
        ProxyConfigBuilder::default()
    }

    /// Matches a `Host` header value against the canonical host: byte-exact
    /// except for an optional scheme prefix, an optional `www.` prefix, and
    /// an optional trailing slash.
    pub fn host_matches(&self, host: &str) -> bool {
        self.origin_pattern.is_match(host)
    }

    /// Where a host-mismatched client should be redirected.
    pub fn canonical_location(&self) -> &str {
        &self.canonical_host
    }
}

#[derive(Default)]
pub struct ProxyConfigBuilder {
    port: Option<u16>,
    canonical_host: Option<String>,
    upstream: Option<String>,
    accept_all: bool,
    log_warnings: bool,
}

impl ProxyConfigBuilder {
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn canonical_host(mut self, host: impl Into<String>) -> Self {
        self.canonical_host = Some(host.into());
        self
    }

    pub fn upstream(mut self, upstream: impl Into<String>) -> Self {
        self.upstream = Some(upstream.into());
        self
    }

    pub fn accept_all(mut self, accept_all: bool) -> Self {
        self.accept_all = accept_all;
        self
    }

    pub fn log_warnings(mut self, log_warnings: bool) -> Self {
        self.log_warnings = log_warnings;
        self
    }

    pub fn build(self) -> Result<ProxyConfig, ConfigError> {
        let port = self.port.ok_or(ConfigError::MissingPort)?;
        let canonical_host = self.canonical_host.ok_or(ConfigError::MissingCanonicalHost)?;
        let upstream_raw = self.upstream.ok_or(ConfigError::MissingUpstream)?;
        let upstream = Upstream::parse(&upstream_raw)?;

        let origin_pattern = compile_origin_pattern(&canonical_host)
            .map_err(ConfigError::InvalidOriginPattern)?;

        Ok(ProxyConfig {
            port,
            canonical_host,
            upstream,
            accept_all: self.accept_all,
            log_warnings: self.log_warnings,
            origin_pattern,
        })
    }
}

/// Builds the permissive origin matcher for one canonical host: optional
/// `http://`/`https://`, optional `www.`, the literal host, an optional
/// `:port` suffix carried verbatim inside the host header, and an optional
/// trailing slash.
fn compile_origin_pattern(canonical_host: &str) -> Result<Regex, regex::Error> {
    let escaped = regex::escape(canonical_host);
    let pattern = format!(r"(?i)^(https?://)?(www\.)?{escaped}(:[0-9]+)?/?$");
    Regex::new(&pattern)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_host_port() {
        let u = Upstream::parse("example.com:8080").unwrap();
        assert_eq!(u.host, "example.com");
        assert_eq!(u.port, 8080);
    }

    #[test]
    fn infers_port_from_scheme() {
        assert_eq!(Upstream::parse("https://example.com").unwrap().port, 443);
        assert_eq!(Upstream::parse("http://example.com").unwrap().port, 80);
    }

    #[test]
    fn strips_trailing_slash() {
        let u = Upstream::parse("http://example.com/").unwrap();
        assert_eq!(u.host, "example.com");
        assert_eq!(u.port, 80);
    }

    #[test]
    fn defaults_to_port_80_without_scheme_or_port() {
        assert_eq!(Upstream::parse("example.com").unwrap().port, 80);
    }

    #[test]
    fn origin_pattern_accepts_exact_and_permissive_forms() {
        let cfg = ProxyConfig::builder()
            .port(80)
            .canonical_host("example.com")
            .upstream("example.com:8080")
            .build()
            .unwrap();

        assert!(cfg.host_matches("example.com"));
        assert!(cfg.host_matches("example.com/"));
        assert!(cfg.host_matches("www.example.com"));
        assert!(cfg.host_matches("http://example.com"));
        assert!(cfg.host_matches("https://www.example.com/"));
        assert!(cfg.host_matches("example.com:8080"));
        assert!(!cfg.host_matches("other.com"));
        assert!(!cfg.host_matches("evilexample.com"));
    }

    #[test]
    fn build_fails_without_required_fields() {
        assert!(matches!(
            ProxyConfig::builder().build(),
            Err(ConfigError::MissingPort)
        ));
    }
}
