//! `ldap3`-backed directory sessions.

use async_trait::async_trait;
use ldap3::{
    LdapConnAsync, LdapConnSettings, LdapError, Mod, ResultEntry, Scope, SearchEntry, SearchStream,
};
use native_tls::{Certificate, TlsConnector};
use std::collections::HashSet;
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, instrument, warn};

use crate::modification::{DirectoryModification, ModificationRequest};
use crate::session::{DirectoryConnector, DirectoryEntry, DirectorySession, EntryStream};
use crate::Result;
use pwreset_core::config::{DirectoryConfig, SearchScope, TlsMode};
use pwreset_core::Error;

/// Opens real LDAP connections described by a [`DirectoryConfig`].
///
/// TLS material is loaded once, when the connector is built; every connection reuses it.
pub struct LdapConnector {
    config: Arc<DirectoryConfig>,
    tls: Option<TlsConnector>,
}

impl LdapConnector {
    /// Creates a connector and loads its TLS settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if the CA certificate cannot be read or parsed, or the TLS
    /// connector cannot be built.
    pub fn new(config: Arc<DirectoryConfig>) -> Result<Self> {
        let tls = tls_connector(&config)?;
        Ok(Self { config, tls })
    }

    fn settings(&self) -> LdapConnSettings {
        let mut settings = LdapConnSettings::new()
            .set_conn_timeout(self.config.connection_timeout())
            .set_starttls(self.config.starttls());
        if let Some(connector) = &self.tls {
            settings = settings.set_connector(connector.clone());
        }
        if self.config.tls_mode() == TlsMode::Insecure {
            settings = settings.set_no_tls_verify(true);
        }
        settings
    }
}

#[async_trait]
impl DirectoryConnector for LdapConnector {
    #[instrument(skip(self), fields(server = %self.config.credentials().server_address()))]
    async fn connect(&self) -> Result<Box<dyn DirectorySession>> {
        let server = self.config.credentials().server_address().to_string();
        let (conn, ldap) = LdapConnAsync::with_settings(self.settings(), &server)
            .await
            .map_err(|err| connection_error(&server, &err))?;

        let driver_server = server.clone();
        tokio::spawn(async move {
            if let Err(err) = conn.drive().await {
                warn!(server = %driver_server, error = %err, "directory connection driver stopped");
            }
        });
        debug!("directory connection established");

        Ok(Box::new(LdapSession {
            inner: ldap,
            server,
            operation_timeout: self.config.operation_timeout(),
        }))
    }
}

struct LdapSession {
    inner: ldap3::Ldap,
    server: String,
    operation_timeout: Duration,
}

#[async_trait]
impl DirectorySession for LdapSession {
    #[instrument(skip(self, secret), fields(server = %self.server))]
    async fn simple_bind(&mut self, identity: &str, secret: &str) -> Result<()> {
        let result = timeout(
            self.operation_timeout,
            self.inner.simple_bind(identity, secret),
        )
        .await
        .map_err(|_| Error::ConnectionError {
            server: self.server.clone(),
            message: "bind timed out".to_string(),
        })?
        .map_err(|err| connection_error(&self.server, &err))?;

        result.success().map_err(|err| Error::AuthenticationError {
            identity: identity.to_string(),
            message: err.to_string(),
        })?;
        Ok(())
    }

    #[instrument(skip(self, attributes), fields(server = %self.server))]
    async fn search(
        &mut self,
        base: &str,
        scope: SearchScope,
        filter: &str,
        attributes: &[&'static str],
    ) -> Result<Box<dyn EntryStream>> {
        let search_error = |message: String| Error::SearchError {
            base: base.to_string(),
            filter: filter.to_string(),
            message,
        };

        let stream = timeout(
            self.operation_timeout,
            self.inner
                .streaming_search(base, ldap_scope(scope), filter, attributes.to_vec()),
        )
        .await
        .map_err(|_| search_error("search timed out".to_string()))?
        .map_err(|err| search_error(err.to_string()))?;

        Ok(Box::new(LdapEntryStream {
            inner: stream,
            base: base.to_string(),
            filter: filter.to_string(),
            operation_timeout: self.operation_timeout,
            done: false,
        }))
    }

    #[instrument(skip(self, request), fields(server = %self.server, changes = request.len()))]
    async fn modify(&mut self, dn: &str, request: &ModificationRequest) -> Result<()> {
        let modify_error = |message: String| Error::ModifyError {
            dn: dn.to_string(),
            message,
        };

        let result = timeout(
            self.operation_timeout,
            self.inner.modify(dn, ldap_mods(request)),
        )
        .await
        .map_err(|_| modify_error("modify timed out".to_string()))?
        .map_err(|err| modify_error(err.to_string()))?;

        result
            .success()
            .map_err(|err| modify_error(err.to_string()))?;
        Ok(())
    }

    async fn unbind(&mut self) -> Result<()> {
        timeout(self.operation_timeout, self.inner.unbind())
            .await
            .map_err(|_| Error::ConnectionError {
                server: self.server.clone(),
                message: "unbind timed out".to_string(),
            })?
            .map_err(|err| connection_error(&self.server, &err))
    }
}

struct LdapEntryStream {
    inner: SearchStream<'static, &'static str, Vec<&'static str>>,
    base: String,
    filter: String,
    operation_timeout: Duration,
    done: bool,
}

impl LdapEntryStream {
    fn search_error(&self, message: String) -> Error {
        Error::SearchError {
            base: self.base.clone(),
            filter: self.filter.clone(),
            message,
        }
    }

    async fn next_result(&mut self) -> Result<Option<ResultEntry>> {
        match timeout(self.operation_timeout, self.inner.next()).await {
            Ok(Ok(entry)) => Ok(entry),
            Ok(Err(err)) => Err(self.search_error(err.to_string())),
            Err(_) => Err(self.search_error("search timed out".to_string())),
        }
    }
}

#[async_trait]
impl EntryStream for LdapEntryStream {
    async fn next_entry(&mut self) -> Result<Option<DirectoryEntry>> {
        if self.done {
            return Ok(None);
        }

        loop {
            let next = self.next_result().await;
            match next {
                Ok(Some(entry)) if entry.is_ref() || entry.is_intermediate() => continue,
                Ok(Some(entry)) => return Ok(Some(SearchEntry::construct(entry).into())),
                Ok(None) => {
                    self.done = true;
                    let result = self.inner.finish().await;
                    return match result.success() {
                        Ok(_) => Ok(None),
                        Err(err) => Err(self.search_error(err.to_string())),
                    };
                }
                Err(err) => {
                    self.done = true;
                    return Err(err);
                }
            }
        }
    }

    async fn abandon(&mut self) {
        if self.done {
            return;
        }
        self.done = true;

        let msgid = self.inner.ldap_handle().last_id();
        if let Err(err) = self.inner.ldap_handle().abandon(msgid).await {
            debug!(error = %err, "failed to abandon search");
            return;
        }
        // Drains the local side of the search once the server stops sending.
        if timeout(self.operation_timeout, self.inner.finish())
            .await
            .is_err()
        {
            debug!("abandoned search did not settle in time");
        }
    }
}

impl From<SearchEntry> for DirectoryEntry {
    fn from(entry: SearchEntry) -> Self {
        Self {
            dn: entry.dn,
            attributes: entry.attrs,
        }
    }
}

const fn ldap_scope(scope: SearchScope) -> Scope {
    match scope {
        SearchScope::Base => Scope::Base,
        SearchScope::OneLevel => Scope::OneLevel,
        SearchScope::Subtree => Scope::Subtree,
    }
}

fn ldap_mods(request: &ModificationRequest) -> Vec<Mod<Vec<u8>>> {
    request
        .changes()
        .iter()
        .map(|change| {
            let attribute = change.attribute().as_bytes().to_vec();
            let values = change.values().iter().cloned().collect::<HashSet<_>>();
            match change {
                DirectoryModification::Add { .. } => Mod::Add(attribute, values),
                DirectoryModification::Delete { .. } => Mod::Delete(attribute, values),
                DirectoryModification::Replace { .. } => Mod::Replace(attribute, values),
            }
        })
        .collect()
}

/// Custom TLS connector for the configured mode, or `None` to use the system defaults.
fn tls_connector(config: &DirectoryConfig) -> Result<Option<TlsConnector>> {
    if config.tls_mode() == TlsMode::Insecure {
        let connector = TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|err| {
                Error::ConfigError(format!("failed to construct TLS connector: {err}"))
            })?;
        return Ok(Some(connector));
    }

    let Some(cert_path) = config.tls_ca_cert() else {
        return Ok(None);
    };
    let pem = fs::read(cert_path).map_err(|err| {
        Error::ConfigError(format!(
            "failed to read directory CA certificate {}: {err}",
            cert_path.display()
        ))
    })?;
    let certificate = Certificate::from_pem(&pem)
        .map_err(|err| Error::ConfigError(format!("invalid directory CA certificate: {err}")))?;
    let connector = TlsConnector::builder()
        .add_root_certificate(certificate)
        .build()
        .map_err(|err| {
            Error::ConfigError(format!("failed to load directory CA certificate: {err}"))
        })?;
    Ok(Some(connector))
}

fn connection_error(server: &str, err: &LdapError) -> Error {
    Error::ConnectionError {
        server: server.to_string(),
        message: err.to_string(),
    }
}
