//! Directory access and the password reset flow.
//!
//! This crate owns everything that talks to the directory server: the session lifecycle, the
//! account lookup and the orchestration that ties lookup, generation, encoding and the atomic
//! modify together.

#![deny(missing_docs)]

mod dn;
mod ldap;
mod lookup;
mod modification;
mod reset;
mod session;

pub use dn::{DistinguishedName, DistinguishedNameError};
pub use ldap::LdapConnector;
pub use lookup::{LookupOutcome, UserLookup, LOOKUP_ATTRIBUTES};
pub use modification::{DirectoryModification, ModificationRequest, ModifyOperation};
pub use reset::{reset_modifications, PasswordResetService};
pub use session::{DirectoryConnector, DirectoryEntry, DirectorySession, EntryStream, SessionGuard};

/// Convenient result alias that reuses the core error type.
pub type Result<T> = pwreset_core::Result<T>;

impl From<DistinguishedNameError> for pwreset_core::Error {
    fn from(err: DistinguishedNameError) -> Self {
        Self::InvalidRequest(err.to_string())
    }
}
