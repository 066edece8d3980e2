//! Email to account resolution.

use tracing::{debug, info, instrument, warn};

use crate::dn::DistinguishedName;
use crate::session::DirectorySession;
use crate::Result;
use pwreset_core::config::{DirectoryConfig, DuplicateMatchPolicy, SearchScope, EMAIL_PLACEHOLDER};
use pwreset_core::Error;

/// Attributes requested by the lookup; the DN alone identifies the account.
pub const LOOKUP_ATTRIBUTES: &[&str] = &["distinguishedName"];

/// Result of resolving an email address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupOutcome {
    /// Exactly one account carries the address (or the first one, under
    /// [`DuplicateMatchPolicy::FirstMatch`]).
    Found(DistinguishedName),
    /// No account carries the address.
    NotFound,
    /// Several accounts carry the address and the policy refuses to pick one.
    Ambiguous,
}

/// Finds the account entry for an email address.
#[derive(Debug, Clone)]
pub struct UserLookup {
    base: DistinguishedName,
    scope: SearchScope,
    filter_template: String,
    duplicates: DuplicateMatchPolicy,
}

impl UserLookup {
    /// Creates a lookup rooted at `base`.
    #[must_use]
    pub fn new(
        base: DistinguishedName,
        scope: SearchScope,
        filter_template: impl Into<String>,
        duplicates: DuplicateMatchPolicy,
    ) -> Self {
        Self {
            base,
            scope,
            filter_template: filter_template.into(),
            duplicates,
        }
    }

    /// Builds the lookup described by the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if the search base is not a valid DN.
    pub fn from_config(config: &DirectoryConfig) -> Result<Self> {
        let base = DistinguishedName::parse(config.credentials().search_base())
            .map_err(|err| Error::ConfigError(format!("invalid search base: {err}")))?;
        Ok(Self::new(
            base,
            config.search_scope(),
            config.user_filter_template(),
            config.reset_policy().duplicate_matches(),
        ))
    }

    /// Filter selecting entries whose mail attribute equals `email`.
    ///
    /// The address is escaped, never normalised: matching follows the directory's own rules.
    #[must_use]
    pub fn filter_for(&self, email: &str) -> String {
        self.filter_template
            .replace(EMAIL_PLACEHOLDER, &ldap3::ldap_escape(email))
    }

    /// Resolves `email` to a distinguished name on an already bound session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SearchError`] when the search fails or the directory returns an entry
    /// whose DN cannot be parsed.
    #[instrument(skip(self, session, email), fields(base = %self.base))]
    pub async fn find_account_dn(
        &self,
        session: &mut dyn DirectorySession,
        email: &str,
    ) -> Result<LookupOutcome> {
        let filter = self.filter_for(email);
        let mut stream = session
            .search(self.base.as_str(), self.scope, &filter, LOOKUP_ATTRIBUTES)
            .await?;

        let Some(first) = stream.next_entry().await? else {
            info!("no account matched the lookup");
            return Ok(LookupOutcome::NotFound);
        };

        let dn = DistinguishedName::parse(&first.dn).map_err(|err| Error::SearchError {
            base: self.base.to_string(),
            filter: filter.clone(),
            message: format!("directory returned an invalid DN `{}`: {err}", first.dn),
        })?;

        match self.duplicates {
            DuplicateMatchPolicy::FirstMatch => {
                stream.abandon().await;
            }
            DuplicateMatchPolicy::FailClosed => {
                if let Some(second) = stream.next_entry().await? {
                    stream.abandon().await;
                    warn!(
                        first = %dn,
                        second = %second.dn,
                        "several accounts share the address; refusing to reset"
                    );
                    return Ok(LookupOutcome::Ambiguous);
                }
            }
        }

        debug!(dn = %dn, "account resolved");
        Ok(LookupOutcome::Found(dn))
    }
}
