//! Directory session abstractions and scoped release.
//!
//! A session is one bound connection to the directory. It is owned by exactly one request and
//! released through [`SessionGuard`], which unbinds at most once on every exit path.

use async_trait::async_trait;
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::modification::ModificationRequest;
use crate::Result;
use pwreset_core::config::SearchScope;
use pwreset_core::Error;

/// Entry returned by a search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryEntry {
    /// Distinguished name of the entry.
    pub dn: String,
    /// Text attributes (values in server order).
    pub attributes: HashMap<String, Vec<String>>,
}

impl DirectoryEntry {
    /// Creates an entry with no attributes.
    #[must_use]
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            ..Self::default()
        }
    }
}

/// Lazily consumed search results.
#[async_trait]
pub trait EntryStream: Send {
    /// Returns the next entry, or `None` once the directory signalled completion.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SearchError`] when the directory reports an error while streaming or in
    /// its final result.
    async fn next_entry(&mut self) -> Result<Option<DirectoryEntry>>;

    /// Stops an unfinished search. Does nothing once the stream completed.
    async fn abandon(&mut self);
}

/// One connection to the directory server.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DirectorySession: Send {
    /// Authenticates the connection.
    async fn simple_bind(&mut self, identity: &str, secret: &str) -> Result<()>;

    /// Starts a search and returns its result stream.
    async fn search(
        &mut self,
        base: &str,
        scope: SearchScope,
        filter: &str,
        attributes: &[&'static str],
    ) -> Result<Box<dyn EntryStream>>;

    /// Applies all changes of `request` to `dn` as one operation.
    async fn modify(&mut self, dn: &str, request: &ModificationRequest) -> Result<()>;

    /// Unbinds and closes the connection.
    async fn unbind(&mut self) -> Result<()>;
}

/// Opens new directory sessions.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DirectoryConnector: Send + Sync {
    /// Opens a connection to the directory server.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionError`] when the server is unreachable and
    /// [`Error::ConfigError`] when TLS settings cannot be applied.
    async fn connect(&self) -> Result<Box<dyn DirectorySession>>;
}

/// Owns a session for the duration of one request and guarantees its release.
///
/// [`SessionGuard::release`] consumes the guard, so a session cannot be released twice. A guard
/// dropped without release (panic, cancelled future) hands the unbind to the current tokio
/// runtime.
pub struct SessionGuard {
    session: Box<dyn DirectorySession>,
    server: String,
    released: bool,
}

impl SessionGuard {
    /// Takes ownership of a freshly opened session.
    #[must_use]
    pub fn new(session: Box<dyn DirectorySession>, server: impl Into<String>) -> Self {
        Self {
            session,
            server: server.into(),
            released: false,
        }
    }

    /// Borrows the guarded session.
    pub fn session(&mut self) -> &mut (dyn DirectorySession + 'static) {
        self.session.as_mut()
    }

    /// Unbinds the session. Failures are logged and swallowed so they never replace the
    /// request's own result.
    pub async fn release(mut self) {
        self.released = true;
        match self.session.unbind().await {
            Ok(()) => debug!(server = %self.server, "directory session released"),
            Err(err) => warn!(
                server = %self.server,
                error = %err,
                "failed to release directory session"
            ),
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        let mut session = std::mem::replace(&mut self.session, Box::new(ReleasedSession));
        let server = std::mem::take(&mut self.server);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(err) = session.unbind().await {
                        warn!(
                            server = %server,
                            error = %err,
                            "failed to release abandoned directory session"
                        );
                    }
                });
            }
            Err(_) => warn!(
                server = %server,
                "directory session dropped outside a runtime; connection closes without unbind"
            ),
        }
    }
}

/// Stand-in left behind once a dropped guard hands its session to the runtime.
struct ReleasedSession;

impl ReleasedSession {
    fn error() -> Error {
        Error::ConnectionError {
            server: String::new(),
            message: "directory session already released".to_string(),
        }
    }
}

#[async_trait]
impl DirectorySession for ReleasedSession {
    async fn simple_bind(&mut self, _identity: &str, _secret: &str) -> Result<()> {
        Err(Self::error())
    }

    async fn search(
        &mut self,
        _base: &str,
        _scope: SearchScope,
        _filter: &str,
        _attributes: &[&'static str],
    ) -> Result<Box<dyn EntryStream>> {
        Err(Self::error())
    }

    async fn modify(&mut self, _dn: &str, _request: &ModificationRequest) -> Result<()> {
        Err(Self::error())
    }

    async fn unbind(&mut self) -> Result<()> {
        Ok(())
    }
}
