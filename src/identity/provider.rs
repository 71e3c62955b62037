use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{ShellError, ShellResult};

use super::principal::{AuthOrigin, Identity};

/// Credential pair presented by a connection attempt. `peer` is informational
/// only (log lines); it never influences the decision.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub peer: Option<String>,
}

impl Credentials {
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            username: username.to_string(),
            password: password.to_string(),
            peer: None,
        }
    }
}

/// Validates a presented credential pair and yields the authenticated
/// identity. Exactly one provider is active per deployment; further
/// strategies plug in without touching any caller.
pub trait CredentialProvider: Send + Sync {
    fn authenticate(&self, creds: &Credentials) -> ShellResult<Identity>;
}

/// Single configured name/secret pair; both must match exactly. The yielded
/// identity carries the configured authority set verbatim.
pub struct FixedCredentialProvider {
    user: String,
    secret: String,
    authorities: Vec<String>,
}

impl FixedCredentialProvider {
    pub fn new<I, S>(user: &str, secret: &str, authorities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            user: user.to_string(),
            secret: secret.to_string(),
            authorities: authorities.into_iter().map(Into::into).collect(),
        }
    }
}

impl CredentialProvider for FixedCredentialProvider {
    fn authenticate(&self, creds: &Credentials) -> ShellResult<Identity> {
        if creds.username != self.user || creds.password != self.secret {
            debug!(target: "auth", "fixed credential rejected for user '{}'", creds.username);
            return Err(ShellError::AuthenticationFailure(
                "invalid credentials".to_string(),
            ));
        }
        info!(target: "auth", "fixed credential accepted for user '{}'", creds.username);
        Ok(Identity::new(
            &creds.username,
            self.authorities.iter().cloned(),
            AuthOrigin::Fixed,
        ))
    }
}

/// Granted access returned by an external authenticator on accept.
#[derive(Debug, Clone, Default)]
pub struct GrantedAccess {
    pub authorities: Vec<String>,
}

/// External authentication collaborator. Not part of the core; implementors
/// bridge to whatever user store the embedding system has. Rejections are
/// reported as a human-readable reason.
pub trait ExternalAuthenticator: Send + Sync {
    /// Stable label identifying the collaborator, recorded on the identity.
    fn label(&self) -> &str;
    fn verify(&self, creds: &Credentials) -> Result<GrantedAccess, String>;
}

/// Forwards the presented credentials to an external authenticator and maps
/// its decision onto an identity or an authentication failure.
pub struct DelegatedCredentialProvider {
    inner: Arc<dyn ExternalAuthenticator>,
}

impl DelegatedCredentialProvider {
    pub fn new(inner: Arc<dyn ExternalAuthenticator>) -> Self {
        Self { inner }
    }
}

impl CredentialProvider for DelegatedCredentialProvider {
    fn authenticate(&self, creds: &Credentials) -> ShellResult<Identity> {
        match self.inner.verify(creds) {
            Ok(granted) => {
                info!(
                    target: "auth",
                    "delegated authenticator '{}' accepted user '{}'",
                    self.inner.label(),
                    creds.username
                );
                Ok(Identity::new(
                    &creds.username,
                    granted.authorities,
                    AuthOrigin::Delegated {
                        authenticator: self.inner.label().to_string(),
                    },
                ))
            }
            Err(reason) => {
                warn!(
                    target: "auth",
                    "delegated authenticator '{}' rejected user '{}': {}",
                    self.inner.label(),
                    creds.username,
                    reason
                );
                Err(ShellError::AuthenticationFailure(reason))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_provider_exact_match_only() {
        let p = FixedCredentialProvider::new("ops", "s3cret", ["ADMIN", "AUDIT"]);
        let id = p.authenticate(&Credentials::new("ops", "s3cret")).unwrap();
        assert_eq!(id.name, "ops");
        assert_eq!(
            id.authorities.iter().cloned().collect::<Vec<_>>(),
            vec!["ADMIN".to_string(), "AUDIT".to_string()]
        );
        assert_eq!(id.origin, AuthOrigin::Fixed);

        for (u, pw) in [("ops", "wrong"), ("OPS", "s3cret"), ("", ""), ("ops", "")] {
            let err = p.authenticate(&Credentials::new(u, pw)).unwrap_err();
            assert_eq!(err.kind(), "auth");
        }
    }

    struct AllowListAuthenticator;

    impl ExternalAuthenticator for AllowListAuthenticator {
        fn label(&self) -> &str {
            "allow-list"
        }
        fn verify(&self, creds: &Credentials) -> Result<GrantedAccess, String> {
            if creds.username == "alice" && creds.password == "pw" {
                Ok(GrantedAccess {
                    authorities: vec!["AUDIT".to_string()],
                })
            } else {
                Err("not on the allow list".to_string())
            }
        }
    }

    #[test]
    fn delegated_provider_maps_decision_and_authorities() {
        let p = DelegatedCredentialProvider::new(Arc::new(AllowListAuthenticator));
        let id = p.authenticate(&Credentials::new("alice", "pw")).unwrap();
        assert!(id.has_authority("AUDIT"));
        assert_eq!(
            id.origin,
            AuthOrigin::Delegated {
                authenticator: "allow-list".to_string()
            }
        );

        let err = p.authenticate(&Credentials::new("mallory", "pw")).unwrap_err();
        assert_eq!(
            err,
            ShellError::AuthenticationFailure("not on the allow list".to_string())
        );
    }
}
