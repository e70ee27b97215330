//! LDAP URL decoding (RFC 4516).
//!
//! `scheme://host[:port]/<base dn>?<attributes>?<scope>?<filter>?<extensions>`
//!
//! Bind credentials travel in the `bindname` and `X-BINDPW` extensions.

use serde::Deserialize;
use thiserror::Error;
use url::Url;

/// Filter used when the URL does not carry one.
pub const DEFAULT_FILTER: &str = "(objectClass=*)";

/// Error while decoding an LDAP URL.
#[derive(Debug, Error)]
pub enum LdapUrlError {
    #[error("invalid LDAP URL: {0}")]
    Invalid(#[from] url::ParseError),

    #[error("unsupported LDAP URL scheme '{0}'")]
    UnsupportedScheme(String),

    #[error("LDAP URL has more than four '?' separated components")]
    TooManyComponents,

    #[error("invalid search scope '{0}'")]
    InvalidScope(String),

    #[error("unsupported critical extension '{0}'")]
    UnsupportedCriticalExtension(String),

    #[error("invalid percent-encoding in {component}")]
    InvalidEncoding {
        component: &'static str,
        #[source]
        source: std::string::FromUtf8Error,
    },
}

/// Search scope of the synchronization search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchScope {
    /// Only the base entry.
    Base,
    /// Immediate children of the base entry.
    OneLevel,
    /// The base entry and its whole subtree.
    #[default]
    Subtree,
}

impl SearchScope {
    fn parse(value: &str) -> Result<Self, LdapUrlError> {
        match value.to_ascii_lowercase().as_str() {
            "" | "sub" => Ok(SearchScope::Subtree),
            "one" => Ok(SearchScope::OneLevel),
            "base" => Ok(SearchScope::Base),
            _ => Err(LdapUrlError::InvalidScope(value.to_string())),
        }
    }
}

/// Decoded LDAP URL.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct LdapUrl {
    /// `ldap`, `ldaps` or `ldapi`.
    pub scheme: String,
    /// Host name, IP literal or percent-encoded socket path for `ldapi`.
    pub host: String,
    /// Explicit port, if any.
    pub port: Option<u16>,
    /// Base DN of the search.
    pub base_dn: String,
    /// Requested attributes (empty means all user attributes).
    pub attributes: Vec<String>,
    /// Search scope.
    pub scope: SearchScope,
    /// Search filter.
    pub filter: String,
    /// DN to bind as (`bindname` extension).
    pub bind_dn: Option<String>,
    /// Bind password (`X-BINDPW` extension).
    pub bind_password: Option<String>,
}

impl std::fmt::Debug for LdapUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LdapUrl")
            .field("scheme", &self.scheme)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("base_dn", &self.base_dn)
            .field("attributes", &self.attributes)
            .field("scope", &self.scope)
            .field("filter", &self.filter)
            .field("bind_dn", &self.bind_dn)
            .field(
                "bind_password",
                &self.bind_password.as_ref().map(|_| "***REDACTED***"),
            )
            .finish()
    }
}

fn decode(component: &'static str, raw: &str) -> Result<String, LdapUrlError> {
    urlencoding::decode(raw)
        .map(|s| s.into_owned())
        .map_err(|source| LdapUrlError::InvalidEncoding { component, source })
}

impl LdapUrl {
    /// Decode an LDAP URL.
    pub fn parse(input: &str) -> Result<Self, LdapUrlError> {
        let url = Url::parse(input.trim())?;

        let scheme = url.scheme().to_ascii_lowercase();
        if !matches!(scheme.as_str(), "ldap" | "ldaps" | "ldapi") {
            return Err(LdapUrlError::UnsupportedScheme(scheme));
        }

        let host = match url.host_str() {
            Some(host) if !host.is_empty() => host.to_string(),
            _ => "localhost".to_string(),
        };

        let base_dn = decode("base DN", url.path().trim_start_matches('/'))?;

        let query = url.query().unwrap_or("");
        let parts: Vec<&str> = query.split('?').collect();
        if parts.len() > 4 {
            return Err(LdapUrlError::TooManyComponents);
        }
        let part = |i: usize| parts.get(i).copied().unwrap_or("");

        let attributes = part(0)
            .split(',')
            .filter(|a| !a.is_empty())
            .map(|a| decode("attributes", a))
            .collect::<Result<Vec<_>, _>>()?;

        let scope = SearchScope::parse(&decode("scope", part(1))?)?;

        let filter = match decode("filter", part(2))? {
            f if f.is_empty() => DEFAULT_FILTER.to_string(),
            f => f,
        };

        let mut bind_dn = None;
        let mut bind_password = None;
        for raw in part(3).split(',').filter(|e| !e.is_empty()) {
            let (critical, raw) = match raw.strip_prefix('!') {
                Some(rest) => (true, rest),
                None => (false, raw),
            };
            let (name, value) = raw.split_once('=').unwrap_or((raw, ""));
            let value = decode("extensions", value)?;
            match name.to_ascii_lowercase().as_str() {
                "bindname" => bind_dn = Some(value),
                "x-bindpw" => bind_password = Some(value),
                _ if critical => {
                    return Err(LdapUrlError::UnsupportedCriticalExtension(name.to_string()))
                }
                _ => {}
            }
        }

        Ok(Self {
            scheme,
            host,
            port: url.port(),
            base_dn,
            attributes,
            scope,
            filter,
            bind_dn,
            bind_password,
        })
    }

    /// URL of the server only, as used to open the connection.
    pub fn server_url(&self) -> String {
        match self.port {
            Some(port) => format!("{}://{}:{}", self.scheme, self.host, port),
            None => format!("{}://{}", self.scheme, self.host),
        }
    }
}

impl TryFrom<String> for LdapUrl {
    type Error = LdapUrlError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl std::str::FromStr for LdapUrl {
    type Err = LdapUrlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
