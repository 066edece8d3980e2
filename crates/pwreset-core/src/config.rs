//! Configuration for the password reset gateway.
//!
//! Configuration is built once at startup, validated, and then shared read-only. Core logic never
//! reads the process environment itself: [`DirectoryConfig::from_env`] is meant for binaries,
//! everything else receives a ready-made [`DirectoryConfig`].

use crate::error::{Error, Result};
use crate::generator::{pool_size, GenerationOptions, DEFAULT_PASSWORD_LENGTH};
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;
use url::Url;
use validator::Validate;

/// Default connection timeout (seconds).
pub const DEFAULT_CONNECTION_TIMEOUT_SECS: u64 = 5;
/// Default operation timeout (seconds).
pub const DEFAULT_OPERATION_TIMEOUT_SECS: u64 = 5;
/// Default lookup filter; `{email}` is replaced by the escaped address.
pub const DEFAULT_USER_FILTER: &str = "(&(|(objectClass=person)(objectClass=user))(mail={email}))";
/// Placeholder substituted in the lookup filter template.
pub const EMAIL_PLACEHOLDER: &str = "{email}";
/// Default password attribute.
pub const DEFAULT_PASSWORD_ATTRIBUTE: &str = "unicodePwd";
/// Default attribute that receives a readable copy of the issued password.
pub const DEFAULT_AUDIT_ATTRIBUTE: &str = "info";
/// Default "must change password" marker attribute.
pub const DEFAULT_EXPIRY_ATTRIBUTE: &str = "pwdLastSet";
/// Marker value that forces a password change at next logon.
pub const EXPIRE_NOW_VALUE: &str = "0";

/// Environment variable names read by [`DirectoryConfig::from_env`].
pub mod env {
    /// Directory URL.
    pub const LDAP_URL: &str = "PWRESET_LDAP_URL";
    /// Service bind DN.
    pub const BIND_DN: &str = "PWRESET_BIND_DN";
    /// Service bind password.
    pub const BIND_PASSWORD: &str = "PWRESET_BIND_PASSWORD";
    /// Search base DN.
    pub const SEARCH_BASE: &str = "PWRESET_SEARCH_BASE";
    /// `strict` or `insecure`.
    pub const TLS_MODE: &str = "PWRESET_TLS_MODE";
    /// Extra trusted CA certificate (PEM).
    pub const TLS_CA_CERT: &str = "PWRESET_TLS_CA_CERT";
    /// Use StartTLS on `ldap://` URLs.
    pub const STARTTLS: &str = "PWRESET_STARTTLS";
    /// Connect timeout in seconds.
    pub const CONNECT_TIMEOUT_SECS: &str = "PWRESET_CONNECT_TIMEOUT_SECS";
    /// Per-operation timeout in seconds.
    pub const OPERATION_TIMEOUT_SECS: &str = "PWRESET_OPERATION_TIMEOUT_SECS";
    /// `base`, `one` or `sub`.
    pub const SEARCH_SCOPE: &str = "PWRESET_SEARCH_SCOPE";
    /// Lookup filter template.
    pub const USER_FILTER: &str = "PWRESET_USER_FILTER";
    /// Password attribute.
    pub const PASSWORD_ATTRIBUTE: &str = "PWRESET_PASSWORD_ATTRIBUTE";
    /// Audit attribute, `none` disables it.
    pub const AUDIT_ATTRIBUTE: &str = "PWRESET_AUDIT_ATTRIBUTE";
    /// Expiry marker attribute.
    pub const EXPIRY_ATTRIBUTE: &str = "PWRESET_EXPIRY_ATTRIBUTE";
    /// Generated password length.
    pub const PASSWORD_LENGTH: &str = "PWRESET_PASSWORD_LENGTH";
    /// `fail-closed` or `first-match`.
    pub const DUPLICATE_MATCHES: &str = "PWRESET_DUPLICATE_MATCHES";
}

/// Certificate validation policy for TLS connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TlsMode {
    /// Verify the server certificate chain and host name.
    #[default]
    Strict,
    /// Accept any certificate. Only for non-production directories.
    Insecure,
}

impl FromStr for TlsMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "insecure" => Ok(Self::Insecure),
            other => Err(Error::ConfigError(format!(
                "unknown TLS mode `{other}`, expected `strict` or `insecure`"
            ))),
        }
    }
}

/// Breadth of the account lookup search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchScope {
    /// Base object only.
    Base,
    /// One level below the base.
    OneLevel,
    /// Entire subtree.
    #[default]
    Subtree,
}

impl FromStr for SearchScope {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "base" => Ok(Self::Base),
            "one" | "onelevel" => Ok(Self::OneLevel),
            "sub" | "subtree" => Ok(Self::Subtree),
            other => Err(Error::ConfigError(format!(
                "unknown search scope `{other}`, expected `base`, `one` or `sub`"
            ))),
        }
    }
}

/// What to do when more than one entry carries the same email address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicateMatchPolicy {
    /// Treat the address as unknown and reset nothing.
    #[default]
    FailClosed,
    /// Reset the first entry the directory returns.
    FirstMatch,
}

impl FromStr for DuplicateMatchPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fail-closed" => Ok(Self::FailClosed),
            "first-match" => Ok(Self::FirstMatch),
            other => Err(Error::ConfigError(format!(
                "unknown duplicate match policy `{other}`, expected `fail-closed` or `first-match`"
            ))),
        }
    }
}

/// Service account used to bind and search.
#[derive(Clone, Validate)]
pub struct ServiceCredentials {
    #[validate(url)]
    server_address: String,
    #[validate(length(min = 1))]
    bind_identity: String,
    bind_secret: SecretString,
    #[validate(length(min = 1))]
    search_base: String,
}

impl ServiceCredentials {
    /// Creates a new set of service credentials.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if any field is empty, the address is not a URL, or the
    /// URL scheme is not `ldap`/`ldaps`.
    pub fn new(
        server_address: impl Into<String>,
        bind_identity: impl Into<String>,
        bind_secret: impl Into<String>,
        search_base: impl Into<String>,
    ) -> Result<Self> {
        let credentials = Self {
            server_address: server_address.into(),
            bind_identity: bind_identity.into(),
            bind_secret: SecretString::from(bind_secret.into()),
            search_base: search_base.into(),
        };

        credentials
            .validate()
            .map_err(|e| Error::ConfigError(format!("Invalid service credentials: {e}")))?;
        if credentials.bind_secret.expose_secret().is_empty() {
            return Err(Error::ConfigError("bind secret cannot be empty".to_string()));
        }

        let url = Url::parse(&credentials.server_address)?;
        if !matches!(url.scheme(), "ldap" | "ldaps") {
            return Err(Error::ConfigError(format!(
                "directory URL scheme must be ldap or ldaps, got `{}`",
                url.scheme()
            )));
        }

        Ok(credentials)
    }

    /// Directory server URL.
    #[must_use]
    pub fn server_address(&self) -> &str {
        &self.server_address
    }

    /// Bind DN of the service account.
    #[must_use]
    pub fn bind_identity(&self) -> &str {
        &self.bind_identity
    }

    /// Bind password of the service account.
    #[must_use]
    pub fn bind_secret(&self) -> &str {
        self.bind_secret.expose_secret()
    }

    /// Base DN for account lookups.
    #[must_use]
    pub fn search_base(&self) -> &str {
        &self.search_base
    }
}

impl fmt::Debug for ServiceCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceCredentials")
            .field("server_address", &self.server_address)
            .field("bind_identity", &self.bind_identity)
            .field("bind_secret", &"[REDACTED]")
            .field("search_base", &self.search_base)
            .finish()
    }
}

/// Attributes written by a reset and how the new password is generated.
#[derive(Debug, Clone, PartialEq, Eq, Validate)]
pub struct ResetPolicy {
    #[validate(length(min = 1))]
    password_attribute: String,
    audit_attribute: Option<String>,
    #[validate(length(min = 1))]
    expiry_attribute: String,
    #[validate(range(min = 4, max = 256))]
    password_length: usize,
    generation: GenerationOptions,
    duplicate_matches: DuplicateMatchPolicy,
}

impl ResetPolicy {
    /// Name of the password attribute.
    #[must_use]
    pub fn password_attribute(&self) -> &str {
        &self.password_attribute
    }

    /// Name of the attribute that receives the plaintext password, if enabled.
    #[must_use]
    pub fn audit_attribute(&self) -> Option<&str> {
        self.audit_attribute.as_deref()
    }

    /// Name of the "must change password" marker attribute.
    #[must_use]
    pub fn expiry_attribute(&self) -> &str {
        &self.expiry_attribute
    }

    /// Value written to the expiry attribute to force a change at next logon.
    #[must_use]
    pub const fn expiry_value(&self) -> &'static str {
        EXPIRE_NOW_VALUE
    }

    /// Length of issued passwords.
    #[must_use]
    pub const fn password_length(&self) -> usize {
        self.password_length
    }

    /// Character restrictions for issued passwords.
    #[must_use]
    pub const fn generation(&self) -> GenerationOptions {
        self.generation
    }

    /// Handling of ambiguous email matches.
    #[must_use]
    pub const fn duplicate_matches(&self) -> DuplicateMatchPolicy {
        self.duplicate_matches
    }
}

impl Default for ResetPolicy {
    fn default() -> Self {
        Self {
            password_attribute: DEFAULT_PASSWORD_ATTRIBUTE.to_string(),
            audit_attribute: Some(DEFAULT_AUDIT_ATTRIBUTE.to_string()),
            expiry_attribute: DEFAULT_EXPIRY_ATTRIBUTE.to_string(),
            password_length: DEFAULT_PASSWORD_LENGTH,
            generation: GenerationOptions::default(),
            duplicate_matches: DuplicateMatchPolicy::default(),
        }
    }
}

/// Complete configuration for the gateway.
#[derive(Debug, Clone, Validate)]
pub struct DirectoryConfig {
    #[validate(nested)]
    credentials: ServiceCredentials,
    tls_mode: TlsMode,
    tls_ca_cert: Option<PathBuf>,
    starttls: bool,
    #[validate(range(min = 1, max = 300))]
    connection_timeout_secs: u64,
    #[validate(range(min = 1, max = 300))]
    operation_timeout_secs: u64,
    search_scope: SearchScope,
    #[validate(length(min = 1))]
    user_filter_template: String,
    #[validate(nested)]
    reset: ResetPolicy,
}

impl DirectoryConfig {
    /// Creates a configuration with defaults for everything but the credentials.
    #[must_use]
    pub fn new(credentials: ServiceCredentials) -> Self {
        Self {
            credentials,
            tls_mode: TlsMode::default(),
            tls_ca_cert: None,
            starttls: false,
            connection_timeout_secs: DEFAULT_CONNECTION_TIMEOUT_SECS,
            operation_timeout_secs: DEFAULT_OPERATION_TIMEOUT_SECS,
            search_scope: SearchScope::default(),
            user_filter_template: DEFAULT_USER_FILTER.to_string(),
            reset: ResetPolicy::default(),
        }
    }

    /// Loads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] when a required variable is missing or any value is
    /// invalid.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads the configuration from an arbitrary key/value source.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] when a required key is missing or any value is invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let optional = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let required = |key: &str| {
            optional(key).ok_or_else(|| Error::ConfigError(format!("{key} must be set")))
        };

        // Secrets are taken verbatim; only emptiness is rejected.
        let bind_secret = lookup(env::BIND_PASSWORD)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| Error::ConfigError(format!("{} must be set", env::BIND_PASSWORD)))?;

        let credentials = ServiceCredentials::new(
            required(env::LDAP_URL)?,
            required(env::BIND_DN)?,
            bind_secret,
            required(env::SEARCH_BASE)?,
        )?;

        let mut config = Self::new(credentials);

        if let Some(mode) = optional(env::TLS_MODE) {
            config = config.with_tls_mode(mode.parse()?);
        }
        if let Some(path) = optional(env::TLS_CA_CERT) {
            config = config.with_tls_ca_cert(PathBuf::from(path));
        }
        if let Some(flag) = optional(env::STARTTLS) {
            config = config.with_starttls(parse_flag(env::STARTTLS, &flag)?);
        }
        if let Some(secs) = optional(env::CONNECT_TIMEOUT_SECS) {
            let secs = parse_number(env::CONNECT_TIMEOUT_SECS, &secs)?;
            config = config.with_connection_timeout_secs(secs);
        }
        if let Some(secs) = optional(env::OPERATION_TIMEOUT_SECS) {
            let secs = parse_number(env::OPERATION_TIMEOUT_SECS, &secs)?;
            config = config.with_operation_timeout_secs(secs);
        }
        if let Some(scope) = optional(env::SEARCH_SCOPE) {
            config = config.with_search_scope(scope.parse()?);
        }
        if let Some(template) = optional(env::USER_FILTER) {
            config = config.with_user_filter_template(template);
        }
        if let Some(attribute) = optional(env::PASSWORD_ATTRIBUTE) {
            config = config.with_password_attribute(attribute);
        }
        if let Some(attribute) = optional(env::AUDIT_ATTRIBUTE) {
            let attribute = (!attribute.eq_ignore_ascii_case("none")).then_some(attribute);
            config = config.with_audit_attribute(attribute);
        }
        if let Some(attribute) = optional(env::EXPIRY_ATTRIBUTE) {
            config = config.with_expiry_attribute(attribute);
        }
        if let Some(length) = optional(env::PASSWORD_LENGTH) {
            config = config.with_password_length(parse_number(env::PASSWORD_LENGTH, &length)?);
        }
        if let Some(policy) = optional(env::DUPLICATE_MATCHES) {
            config = config.with_duplicate_matches(policy.parse()?);
        }

        let config = config.validated()?;
        debug!(
            server = %config.credentials.server_address,
            search_base = %config.credentials.search_base,
            tls_mode = ?config.tls_mode,
            scope = ?config.search_scope,
            "directory configuration loaded"
        );
        Ok(config)
    }

    /// Validates the assembled configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] on out-of-range values, a filter template without
    /// `{email}`, or a password length the generator cannot satisfy.
    pub fn validated(self) -> Result<Self> {
        self.validate()
            .map_err(|e| Error::ConfigError(format!("Invalid configuration: {e}")))?;

        if !self.user_filter_template.contains(EMAIL_PLACEHOLDER) {
            return Err(Error::ConfigError(format!(
                "user filter template must contain {EMAIL_PLACEHOLDER}"
            )));
        }

        let generation = self.reset.generation;
        if generation.exclude_duplicates && self.reset.password_length > pool_size(generation) {
            return Err(Error::ConfigError(format!(
                "password length {} exceeds the {} unique characters available",
                self.reset.password_length,
                pool_size(generation)
            )));
        }

        Ok(self)
    }

    /// Returns the service credentials.
    #[must_use]
    pub const fn credentials(&self) -> &ServiceCredentials {
        &self.credentials
    }

    /// Returns the certificate validation policy.
    #[must_use]
    pub const fn tls_mode(&self) -> TlsMode {
        self.tls_mode
    }

    /// Optional custom CA certificate path.
    #[must_use]
    pub fn tls_ca_cert(&self) -> Option<&PathBuf> {
        self.tls_ca_cert.as_ref()
    }

    /// Returns whether `ldap://` connections are upgraded with StartTLS.
    #[must_use]
    pub const fn starttls(&self) -> bool {
        self.starttls
    }

    /// Returns the connection timeout duration.
    #[must_use]
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }

    /// Returns the operation timeout duration.
    #[must_use]
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }

    /// Returns the lookup search scope.
    #[must_use]
    pub const fn search_scope(&self) -> SearchScope {
        self.search_scope
    }

    /// Returns the filter template used for account lookups.
    #[must_use]
    pub fn user_filter_template(&self) -> &str {
        &self.user_filter_template
    }

    /// Returns the reset policy.
    #[must_use]
    pub const fn reset_policy(&self) -> &ResetPolicy {
        &self.reset
    }

    /// Sets the certificate validation policy.
    #[must_use]
    pub const fn with_tls_mode(mut self, mode: TlsMode) -> Self {
        self.tls_mode = mode;
        self
    }

    /// Sets the custom CA certificate path for TLS verification.
    #[must_use]
    pub fn with_tls_ca_cert(mut self, path: PathBuf) -> Self {
        self.tls_ca_cert = Some(path);
        self
    }

    /// Enables or disables StartTLS.
    #[must_use]
    pub const fn with_starttls(mut self, starttls: bool) -> Self {
        self.starttls = starttls;
        self
    }

    /// Overrides the connection timeout in seconds.
    #[must_use]
    pub const fn with_connection_timeout_secs(mut self, seconds: u64) -> Self {
        self.connection_timeout_secs = seconds;
        self
    }

    /// Overrides the operation timeout in seconds.
    #[must_use]
    pub const fn with_operation_timeout_secs(mut self, seconds: u64) -> Self {
        self.operation_timeout_secs = seconds;
        self
    }

    /// Overrides the lookup search scope.
    #[must_use]
    pub const fn with_search_scope(mut self, scope: SearchScope) -> Self {
        self.search_scope = scope;
        self
    }

    /// Overrides the lookup filter template.
    ///
    /// The string should contain `{email}` where the escaped address will be substituted.
    #[must_use]
    pub fn with_user_filter_template(mut self, template: impl Into<String>) -> Self {
        self.user_filter_template = template.into();
        self
    }

    /// Overrides the password attribute.
    #[must_use]
    pub fn with_password_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.reset.password_attribute = attribute.into();
        self
    }

    /// Sets or disables the plaintext audit attribute.
    #[must_use]
    pub fn with_audit_attribute(mut self, attribute: Option<String>) -> Self {
        self.reset.audit_attribute = attribute;
        self
    }

    /// Overrides the expiry marker attribute.
    #[must_use]
    pub fn with_expiry_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.reset.expiry_attribute = attribute.into();
        self
    }

    /// Overrides the issued password length.
    #[must_use]
    pub const fn with_password_length(mut self, length: usize) -> Self {
        self.reset.password_length = length;
        self
    }

    /// Overrides the password character restrictions.
    #[must_use]
    pub const fn with_generation_options(mut self, options: GenerationOptions) -> Self {
        self.reset.generation = options;
        self
    }

    /// Overrides the ambiguous match policy.
    #[must_use]
    pub const fn with_duplicate_matches(mut self, policy: DuplicateMatchPolicy) -> Self {
        self.reset.duplicate_matches = policy;
        self
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::ConfigError(format!("{key} must be a number, got `{value}`")))
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::ConfigError(format!(
            "{key} must be a boolean, got `{value}`"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base_env() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            (env::LDAP_URL, "ldaps://dc1.example.com:636"),
            (env::BIND_DN, "cn=svc-reset,ou=services,dc=example,dc=com"),
            (env::BIND_PASSWORD, "s3rvice secret"),
            (env::SEARCH_BASE, "ou=users,dc=example,dc=com"),
        ])
    }

    fn load(vars: &HashMap<&'static str, &'static str>) -> Result<DirectoryConfig> {
        DirectoryConfig::from_lookup(|key| vars.get(key).map(|value| (*value).to_string()))
    }

    #[test]
    fn loads_required_values_with_defaults() {
        let config = load(&base_env()).unwrap();

        let credentials = config.credentials();
        assert_eq!(credentials.server_address(), "ldaps://dc1.example.com:636");
        assert_eq!(
            credentials.bind_identity(),
            "cn=svc-reset,ou=services,dc=example,dc=com"
        );
        assert_eq!(credentials.bind_secret(), "s3rvice secret");
        assert_eq!(credentials.search_base(), "ou=users,dc=example,dc=com");

        assert_eq!(config.tls_mode(), TlsMode::Strict);
        assert!(!config.starttls());
        assert_eq!(config.connection_timeout(), Duration::from_secs(5));
        assert_eq!(config.operation_timeout(), Duration::from_secs(5));
        assert_eq!(config.search_scope(), SearchScope::Subtree);
        assert_eq!(config.user_filter_template(), DEFAULT_USER_FILTER);

        let policy = config.reset_policy();
        assert_eq!(policy.password_attribute(), "unicodePwd");
        assert_eq!(policy.audit_attribute(), Some("info"));
        assert_eq!(policy.expiry_attribute(), "pwdLastSet");
        assert_eq!(policy.password_length(), 8);
        assert_eq!(policy.generation(), GenerationOptions::default());
        assert_eq!(policy.duplicate_matches(), DuplicateMatchPolicy::FailClosed);
    }

    #[test]
    fn missing_required_value_names_the_variable() {
        for key in [env::LDAP_URL, env::BIND_DN, env::BIND_PASSWORD, env::SEARCH_BASE] {
            let mut vars = base_env();
            vars.remove(key);
            let err = load(&vars).unwrap_err();
            assert_eq!(err, Error::ConfigError(format!("{key} must be set")));
        }
    }

    #[test]
    fn blank_required_value_is_missing() {
        let mut vars = base_env();
        vars.insert(env::BIND_DN, "   ");
        assert!(matches!(load(&vars), Err(Error::ConfigError(_))));
    }

    #[test]
    fn rejects_non_ldap_scheme() {
        let mut vars = base_env();
        vars.insert(env::LDAP_URL, "https://dc1.example.com");
        assert!(matches!(load(&vars), Err(Error::ConfigError(_))));

        vars.insert(env::LDAP_URL, "not a url");
        assert!(matches!(load(&vars), Err(Error::ConfigError(_))));
    }

    #[test]
    fn optional_overrides() {
        let mut vars = base_env();
        vars.insert(env::LDAP_URL, "ldap://dc1.example.com");
        vars.insert(env::TLS_MODE, "insecure");
        vars.insert(env::STARTTLS, "true");
        vars.insert(env::TLS_CA_CERT, "/etc/pwreset/ca.pem");
        vars.insert(env::CONNECT_TIMEOUT_SECS, "3");
        vars.insert(env::OPERATION_TIMEOUT_SECS, "7");
        vars.insert(env::SEARCH_SCOPE, "one");
        vars.insert(env::USER_FILTER, "(&(objectClass=inetOrgPerson)(mail={email}))");
        vars.insert(env::AUDIT_ATTRIBUTE, "none");
        vars.insert(env::PASSWORD_LENGTH, "12");
        vars.insert(env::DUPLICATE_MATCHES, "first-match");

        let config = load(&vars).unwrap();
        assert_eq!(config.tls_mode(), TlsMode::Insecure);
        assert!(config.starttls());
        assert_eq!(
            config.tls_ca_cert(),
            Some(&PathBuf::from("/etc/pwreset/ca.pem"))
        );
        assert_eq!(config.connection_timeout(), Duration::from_secs(3));
        assert_eq!(config.operation_timeout(), Duration::from_secs(7));
        assert_eq!(config.search_scope(), SearchScope::OneLevel);
        assert_eq!(
            config.user_filter_template(),
            "(&(objectClass=inetOrgPerson)(mail={email}))"
        );
        assert_eq!(config.reset_policy().audit_attribute(), None);
        assert_eq!(config.reset_policy().password_length(), 12);
        assert_eq!(
            config.reset_policy().duplicate_matches(),
            DuplicateMatchPolicy::FirstMatch
        );
    }

    #[test]
    fn rejects_invalid_values() {
        let cases = [
            (env::TLS_MODE, "relaxed"),
            (env::STARTTLS, "maybe"),
            (env::CONNECT_TIMEOUT_SECS, "0"),
            (env::OPERATION_TIMEOUT_SECS, "ten"),
            (env::SEARCH_SCOPE, "everything"),
            (env::USER_FILTER, "(mail=static@example.com)"),
            (env::PASSWORD_LENGTH, "3"),
            (env::PASSWORD_LENGTH, "200"),
            (env::DUPLICATE_MATCHES, "random"),
        ];

        for (key, value) in cases {
            let mut vars = base_env();
            vars.insert(key, value);
            assert!(
                matches!(load(&vars), Err(Error::ConfigError(_))),
                "{key}={value} should be rejected"
            );
        }
    }

    #[test]
    fn debug_output_redacts_the_secret() {
        let config = load(&base_env()).unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("s3rvice secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn builder_overrides() {
        let credentials = ServiceCredentials::new(
            "ldaps://dc1.example.com",
            "cn=admin,dc=example,dc=com",
            "secret",
            "dc=example,dc=com",
        )
        .unwrap();

        let config = DirectoryConfig::new(credentials)
            .with_connection_timeout_secs(20)
            .with_operation_timeout_secs(30)
            .with_tls_mode(TlsMode::Insecure)
            .with_password_attribute("userPassword")
            .with_expiry_attribute("shadowLastChange")
            .with_generation_options(GenerationOptions::none())
            .validated()
            .unwrap();

        assert_eq!(config.connection_timeout(), Duration::from_secs(20));
        assert_eq!(config.operation_timeout(), Duration::from_secs(30));
        assert_eq!(config.tls_mode(), TlsMode::Insecure);
        assert_eq!(config.reset_policy().password_attribute(), "userPassword");
        assert_eq!(config.reset_policy().expiry_attribute(), "shadowLastChange");
        assert_eq!(config.reset_policy().generation(), GenerationOptions::none());
    }
}
