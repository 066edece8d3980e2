//! End-to-end password reset flow.

use std::sync::Arc;
use tracing::{error, info, instrument, warn, Level};
use uuid::Uuid;

use crate::ldap::LdapConnector;
use crate::lookup::{LookupOutcome, UserLookup};
use crate::modification::{DirectoryModification, ModificationRequest};
use crate::session::{DirectoryConnector, SessionGuard};
use crate::Result;
use pwreset_core::codec::encode_password;
use pwreset_core::config::{DirectoryConfig, ResetPolicy, TlsMode};
use pwreset_core::generator::{PasswordCandidate, PasswordGenerator, RandomPasswordGenerator};
use pwreset_core::types::{ResetAccepted, ResetRequest, ResetResponse};
use pwreset_core::Error;

/// Resets directory passwords for email addresses.
///
/// Each call opens, binds and releases its own directory session; the service itself holds only
/// read-only configuration and can be shared freely between concurrent requests.
pub struct PasswordResetService {
    config: Arc<DirectoryConfig>,
    lookup: UserLookup,
    connector: Box<dyn DirectoryConnector>,
    generator: Box<dyn PasswordGenerator>,
}

impl PasswordResetService {
    /// Creates a service talking to the configured directory over LDAP.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if the search base is not a valid DN or the TLS settings
    /// cannot be loaded.
    pub fn new(config: Arc<DirectoryConfig>) -> Result<Self> {
        let connector = LdapConnector::new(Arc::clone(&config))?;
        Self::with_components(
            config,
            Box::new(connector),
            Box::new(RandomPasswordGenerator),
        )
    }

    /// Creates a service from explicit collaborators.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if the search base is not a valid DN.
    pub fn with_components(
        config: Arc<DirectoryConfig>,
        connector: Box<dyn DirectoryConnector>,
        generator: Box<dyn PasswordGenerator>,
    ) -> Result<Self> {
        let lookup = UserLookup::from_config(&config)?;

        if config.tls_mode() == TlsMode::Insecure {
            warn!(
                server = %config.credentials().server_address(),
                "TLS certificate verification is disabled; never use this against production"
            );
        }
        if let Some(attribute) = config.reset_policy().audit_attribute() {
            warn!(
                attribute,
                "issued passwords are also stored in plaintext in the audit attribute"
            );
        }

        Ok(Self {
            config,
            lookup,
            connector,
            generator,
        })
    }

    /// Resets the password of the account registered for `email`.
    ///
    /// Returns the same [`ResetAccepted`] whether or not an account matched.
    ///
    /// # Errors
    ///
    /// Returns the connection, bind, search, generation or modify failure that stopped the
    /// reset.
    pub async fn reset_password(&self, email: &str) -> Result<ResetAccepted> {
        self.run(email, &Uuid::new_v4().to_string()).await
    }

    /// Handles a caller request and maps the outcome to the external response shape.
    pub async fn handle(&self, request: &ResetRequest) -> ResetResponse {
        let request_id = Uuid::new_v4().to_string();
        match self.run(&request.email, &request_id).await {
            Ok(accepted) => accepted.into(),
            Err(err) => ResetResponse::failure(&err, Some(request_id)),
        }
    }

    #[instrument(name = "password_reset", skip_all, fields(request_id = %request_id))]
    async fn run(&self, email: &str, request_id: &str) -> Result<ResetAccepted> {
        let result = self.execute(email).await;
        if let Err(err) = &result {
            let level = failure_level(err);
            if level == Level::ERROR {
                error!(code = err.error_code(), error = %err, "directory operation failed");
            } else if level == Level::WARN {
                warn!(code = err.error_code(), error = %err, "password reset failed");
            } else {
                info!(code = err.error_code(), error = %err, "password reset rejected");
            }
        }
        result
    }

    async fn execute(&self, email: &str) -> Result<ResetAccepted> {
        let session = self.connector.connect().await?;
        let mut guard = SessionGuard::new(session, self.config.credentials().server_address());

        let result = self.reset_with(&mut guard, email).await;
        guard.release().await;
        result
    }

    async fn reset_with(&self, guard: &mut SessionGuard, email: &str) -> Result<ResetAccepted> {
        let credentials = self.config.credentials();
        let session = guard.session();
        session
            .simple_bind(credentials.bind_identity(), credentials.bind_secret())
            .await?;

        let dn = match self.lookup.find_account_dn(&mut *session, email).await? {
            LookupOutcome::Found(dn) => dn,
            LookupOutcome::NotFound | LookupOutcome::Ambiguous => return Ok(ResetAccepted),
        };

        let policy = self.config.reset_policy();
        let candidate = self
            .generator
            .generate(policy.password_length(), policy.generation())?;
        let request = reset_modifications(policy, &candidate)?;

        session.modify(dn.as_str(), &request).await?;
        info!(dn = %dn, changes = request.len(), "password reset applied");
        Ok(ResetAccepted)
    }
}

/// Directory failures are errors, local faults warnings and rejected input informational.
fn failure_level(err: &Error) -> Level {
    if err.is_infrastructure() {
        Level::ERROR
    } else if err.should_log() {
        Level::WARN
    } else {
        Level::INFO
    }
}

/// Builds the atomic change set issuing `candidate` under `policy`.
///
/// In order: the encoded password, the plaintext audit copy when enabled, and the expiry marker.
///
/// # Errors
///
/// Returns [`Error::InvalidModification`] if the policy names an empty attribute.
pub fn reset_modifications(
    policy: &ResetPolicy,
    candidate: &PasswordCandidate,
) -> Result<ModificationRequest> {
    let mut changes = vec![DirectoryModification::replace_binary(
        policy.password_attribute(),
        encode_password(candidate.expose()),
    )];
    if let Some(attribute) = policy.audit_attribute() {
        changes.push(DirectoryModification::replace_text(
            attribute,
            candidate.expose(),
        ));
    }
    changes.push(DirectoryModification::replace_text(
        policy.expiry_attribute(),
        policy.expiry_value(),
    ));
    ModificationRequest::new(changes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modification::ModifyOperation;
    use crate::session::testing::ScriptedStream;
    use crate::session::{MockDirectoryConnector, MockDirectorySession};
    use pwreset_core::config::{DuplicateMatchPolicy, ServiceCredentials};
    use pwreset_core::generator::GenerationOptions;
    use pwreset_core::types::{RESET_ACCEPTED_MESSAGE, STATUS_INTERNAL_ERROR, STATUS_OK};
    use std::path::PathBuf;
    use std::sync::Mutex;

    const SERVER: &str = "ldaps://dc1.example.com";
    const SERVICE_DN: &str = "cn=svc-reset,ou=services,dc=example,dc=com";
    const SERVICE_SECRET: &str = "s3rvice-secret";
    const BASE: &str = "ou=users,dc=example,dc=com";
    const JOHN: &str = "cn=john,ou=users,dc=example,dc=com";
    const PASSWORD: &str = "Ab3@xY9k";

    type Captured = Arc<Mutex<Vec<(String, ModificationRequest)>>>;

    struct FixedGenerator(&'static str);

    impl PasswordGenerator for FixedGenerator {
        fn generate(&self, _: usize, _: GenerationOptions) -> Result<PasswordCandidate> {
            Ok(PasswordCandidate::new(self.0))
        }
    }

    struct ExhaustedGenerator;

    impl PasswordGenerator for ExhaustedGenerator {
        fn generate(&self, length: usize, _: GenerationOptions) -> Result<PasswordCandidate> {
            Err(Error::GenerationExhausted {
                requested: length,
                available: 4,
            })
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum FailAt {
        Bind,
        Search,
        MidStream,
        Modify,
    }

    fn sample_config() -> DirectoryConfig {
        let credentials =
            ServiceCredentials::new(SERVER, SERVICE_DN, SERVICE_SECRET, BASE).unwrap();
        DirectoryConfig::new(credentials)
    }

    fn service_with(
        config: DirectoryConfig,
        connector: MockDirectoryConnector,
        generator: impl PasswordGenerator + 'static,
    ) -> PasswordResetService {
        PasswordResetService::with_components(
            Arc::new(config),
            Box::new(connector),
            Box::new(generator),
        )
        .unwrap()
    }

    fn connector_for(session: MockDirectorySession) -> MockDirectoryConnector {
        let mut connector = MockDirectoryConnector::new();
        connector
            .expect_connect()
            .times(1)
            .return_once(move || Ok(Box::new(session)));
        connector
    }

    fn bound_session(matches: &'static [&'static str]) -> MockDirectorySession {
        let mut session = MockDirectorySession::new();
        session
            .expect_simple_bind()
            .withf(|identity, secret| identity == SERVICE_DN && secret == SERVICE_SECRET)
            .times(1)
            .returning(|_, _| Ok(()));
        session
            .expect_search()
            .times(1)
            .return_once(move |_, _, _, _| Ok(Box::new(ScriptedStream::entries(matches))));
        session
    }

    fn capture_modify(session: &mut MockDirectorySession) -> Captured {
        let captured: Captured = Arc::default();
        let sink = Arc::clone(&captured);
        session
            .expect_modify()
            .times(1)
            .returning(move |dn, request| {
                sink.lock().unwrap().push((dn.to_string(), request.clone()));
                Ok(())
            });
        captured
    }

    fn session_failing_at(stage: FailAt) -> MockDirectorySession {
        let mut session = MockDirectorySession::new();
        session.expect_simple_bind().returning(move |identity, _| {
            if stage == FailAt::Bind {
                Err(Error::AuthenticationError {
                    identity: identity.to_string(),
                    message: "invalidCredentials".to_string(),
                })
            } else {
                Ok(())
            }
        });
        session.expect_search().returning(move |base, _, filter, _| {
            let search_error = Error::SearchError {
                base: base.to_string(),
                filter: filter.to_string(),
                message: "busy".to_string(),
            };
            match stage {
                FailAt::Search => Err(search_error),
                FailAt::MidStream => {
                    Ok(Box::new(ScriptedStream::entries(&[]).then_fail(search_error)))
                }
                FailAt::Bind | FailAt::Modify => Ok(Box::new(ScriptedStream::entries(&[JOHN]))),
            }
        });
        session.expect_modify().returning(|dn, _| {
            Err(Error::ModifyError {
                dn: dn.to_string(),
                message: "insufficientAccessRights".to_string(),
            })
        });
        session.expect_unbind().times(1).returning(|| Ok(()));
        session
    }

    #[tokio::test]
    async fn resets_a_matching_account() {
        let mut session = bound_session(&[JOHN]);
        let captured = capture_modify(&mut session);
        session.expect_unbind().times(1).returning(|| Ok(()));

        let service = service_with(
            sample_config(),
            connector_for(session),
            FixedGenerator(PASSWORD),
        );
        let response = service.handle(&ResetRequest::new("john@example.com")).await;

        assert_eq!(response.status, STATUS_OK);
        assert_eq!(response.message, RESET_ACCEPTED_MESSAGE);

        let captured = captured.lock().unwrap();
        assert_eq!(captured.len(), 1);
        let (dn, request) = &captured[0];
        assert_eq!(dn, JOHN);
        assert_eq!(request.len(), 3);

        let changes = request.changes();
        assert!(changes
            .iter()
            .all(|change| change.operation() == ModifyOperation::Replace));
        assert_eq!(changes[0].attribute(), "unicodePwd");
        assert_eq!(changes[0].values(), &[encode_password(PASSWORD)]);
        assert_eq!(changes[1].attribute(), "info");
        assert_eq!(changes[1].values(), &[PASSWORD.as_bytes().to_vec()]);
        assert_eq!(changes[2].attribute(), "pwdLastSet");
        assert_eq!(changes[2].values(), &[b"0".to_vec()]);
    }

    #[tokio::test]
    async fn unknown_address_is_indistinguishable() {
        let mut found = bound_session(&[JOHN]);
        found.expect_modify().times(1).returning(|_, _| Ok(()));
        found.expect_unbind().times(1).returning(|| Ok(()));
        let found_service = service_with(
            sample_config(),
            connector_for(found),
            FixedGenerator(PASSWORD),
        );

        let mut missing = bound_session(&[]);
        missing.expect_modify().times(0);
        missing.expect_unbind().times(1).returning(|| Ok(()));
        let missing_service = service_with(
            sample_config(),
            connector_for(missing),
            FixedGenerator(PASSWORD),
        );

        let found_response = found_service
            .handle(&ResetRequest::new("john@example.com"))
            .await;
        let missing_response = missing_service
            .handle(&ResetRequest::new("nobody@example.com"))
            .await;

        assert_eq!(found_response, missing_response);
        assert_eq!(
            serde_json::to_vec(&found_response).unwrap(),
            serde_json::to_vec(&missing_response).unwrap()
        );
    }

    #[tokio::test]
    async fn releases_exactly_once_whichever_step_fails() {
        for stage in [FailAt::Bind, FailAt::Search, FailAt::MidStream, FailAt::Modify] {
            let session = session_failing_at(stage);
            let service = service_with(
                sample_config(),
                connector_for(session),
                FixedGenerator(PASSWORD),
            );

            let err = service
                .reset_password("john@example.com")
                .await
                .unwrap_err();
            match stage {
                FailAt::Bind => assert!(matches!(err, Error::AuthenticationError { .. })),
                FailAt::Search | FailAt::MidStream => {
                    assert!(matches!(err, Error::SearchError { .. }));
                }
                FailAt::Modify => assert!(matches!(err, Error::ModifyError { .. })),
            }
        }
    }

    #[tokio::test]
    async fn failed_connect_has_nothing_to_release() {
        let mut connector = MockDirectoryConnector::new();
        connector.expect_connect().times(1).returning(|| {
            Err(Error::ConnectionError {
                server: SERVER.to_string(),
                message: "connection refused".to_string(),
            })
        });

        let service = service_with(sample_config(), connector, FixedGenerator(PASSWORD));
        let response = service.handle(&ResetRequest::new("john@example.com")).await;

        assert_eq!(response.status, STATUS_INTERNAL_ERROR);
        assert_eq!(response.message, "directory service is unavailable");
        assert!(response.request_id.is_some());
    }

    #[tokio::test]
    async fn generation_failure_still_releases() {
        let mut session = bound_session(&[JOHN]);
        session.expect_modify().times(0);
        session.expect_unbind().times(1).returning(|| Ok(()));

        let service = service_with(sample_config(), connector_for(session), ExhaustedGenerator);
        let err = service
            .reset_password("john@example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::GenerationExhausted { .. }));
    }

    #[tokio::test]
    async fn unbind_failure_does_not_mask_success() {
        let mut session = bound_session(&[JOHN]);
        session.expect_modify().times(1).returning(|_, _| Ok(()));
        session.expect_unbind().times(1).returning(|| {
            Err(Error::ConnectionError {
                server: SERVER.to_string(),
                message: "broken pipe".to_string(),
            })
        });

        let service = service_with(
            sample_config(),
            connector_for(session),
            FixedGenerator(PASSWORD),
        );
        assert_eq!(
            service.reset_password("john@example.com").await,
            Ok(ResetAccepted)
        );
    }

    #[tokio::test]
    async fn unbind_failure_does_not_mask_modify_error() {
        let mut session = bound_session(&[JOHN]);
        session.expect_modify().times(1).returning(|dn, _| {
            Err(Error::ModifyError {
                dn: dn.to_string(),
                message: "constraintViolation".to_string(),
            })
        });
        session.expect_unbind().times(1).returning(|| {
            Err(Error::ConnectionError {
                server: SERVER.to_string(),
                message: "broken pipe".to_string(),
            })
        });

        let service = service_with(
            sample_config(),
            connector_for(session),
            FixedGenerator(PASSWORD),
        );
        let err = service
            .reset_password("john@example.com")
            .await
            .unwrap_err();
        assert_eq!(
            err,
            Error::ModifyError {
                dn: JOHN.to_string(),
                message: "constraintViolation".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn ambiguous_address_resets_nothing() {
        let mut session = bound_session(&[JOHN, "cn=john2,ou=users,dc=example,dc=com"]);
        session.expect_modify().times(0);
        session.expect_unbind().times(1).returning(|| Ok(()));

        let service = service_with(
            sample_config(),
            connector_for(session),
            FixedGenerator(PASSWORD),
        );
        let response = service.handle(&ResetRequest::new("john@example.com")).await;
        assert_eq!(response, ResetResponse::accepted());
    }

    #[tokio::test]
    async fn first_match_policy_resets_the_first_entry() {
        let mut session = bound_session(&[JOHN, "cn=john2,ou=users,dc=example,dc=com"]);
        let captured = capture_modify(&mut session);
        session.expect_unbind().times(1).returning(|| Ok(()));

        let config = sample_config().with_duplicate_matches(DuplicateMatchPolicy::FirstMatch);
        let service = service_with(config, connector_for(session), FixedGenerator(PASSWORD));
        service.reset_password("john@example.com").await.unwrap();

        assert_eq!(captured.lock().unwrap()[0].0, JOHN);
    }

    #[tokio::test]
    async fn disabled_audit_attribute_writes_two_changes() {
        let mut session = bound_session(&[JOHN]);
        let captured = capture_modify(&mut session);
        session.expect_unbind().times(1).returning(|| Ok(()));

        let config = sample_config().with_audit_attribute(None);
        let service = service_with(config, connector_for(session), FixedGenerator(PASSWORD));
        service.reset_password("john@example.com").await.unwrap();

        let captured = captured.lock().unwrap();
        let attributes = captured[0].1.attributes().collect::<Vec<_>>();
        assert_eq!(attributes, vec!["unicodePwd", "pwdLastSet"]);
    }

    #[tokio::test]
    async fn concurrent_requests_use_separate_sessions() {
        let mut connector = MockDirectoryConnector::new();
        connector.expect_connect().times(3).returning(|| {
            let mut session = bound_session(&[]);
            session.expect_unbind().times(1).returning(|| Ok(()));
            Ok(Box::new(session))
        });

        let service = service_with(sample_config(), connector, FixedGenerator(PASSWORD));
        let (a, b, c) = tokio::join!(
            service.reset_password("a@example.com"),
            service.reset_password("b@example.com"),
            service.reset_password("c@example.com"),
        );
        assert_eq!(a, Ok(ResetAccepted));
        assert_eq!(b, Ok(ResetAccepted));
        assert_eq!(c, Ok(ResetAccepted));
    }

    #[test]
    fn invalid_search_base_is_rejected_up_front() {
        let credentials =
            ServiceCredentials::new(SERVER, SERVICE_DN, SERVICE_SECRET, "users").unwrap();
        let result = PasswordResetService::with_components(
            Arc::new(DirectoryConfig::new(credentials)),
            Box::new(MockDirectoryConnector::new()),
            Box::new(FixedGenerator(PASSWORD)),
        );
        assert!(matches!(result, Err(Error::ConfigError(_))));
    }

    #[test]
    fn unreadable_ca_certificate_fails_at_startup() {
        let config = sample_config().with_tls_ca_cert(PathBuf::from("/nonexistent/pwreset-ca.pem"));
        let result = PasswordResetService::new(Arc::new(config));
        assert!(matches!(
            result,
            Err(Error::ConfigError(ref message)) if message.contains("pwreset-ca.pem")
        ));
    }

    #[test]
    fn failure_levels() {
        let modify = Error::ModifyError {
            dn: JOHN.to_string(),
            message: "constraintViolation".to_string(),
        };
        let exhausted = Error::GenerationExhausted {
            requested: 64,
            available: 4,
        };
        assert_eq!(failure_level(&modify), Level::ERROR);
        assert_eq!(failure_level(&exhausted), Level::WARN);
        assert_eq!(
            failure_level(&Error::InvalidRequest("bad email".to_string())),
            Level::INFO
        );
    }

    #[test]
    fn modifications_follow_the_policy_order() {
        let policy = ResetPolicy::default();
        let request = reset_modifications(&policy, &PasswordCandidate::new(PASSWORD)).unwrap();
        assert_eq!(
            request.attributes().collect::<Vec<_>>(),
            vec!["unicodePwd", "info", "pwdLastSet"]
        );
    }
}
