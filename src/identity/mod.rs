//! Authenticated identities and the per-command availability gate.
//! Keep the public surface thin and split implementation across sub-modules.

mod principal;
mod provider;
mod authorizer;

pub use principal::{AuthOrigin, Identity};
pub use provider::{
    CredentialProvider, Credentials, DelegatedCredentialProvider, ExternalAuthenticator,
    FixedCredentialProvider, GrantedAccess,
};
pub use authorizer::{availability, Availability, AuthorityRequirement};
