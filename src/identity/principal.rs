use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// How an identity was obtained. Carried opaquely so commands can report it
/// without the core interpreting it further.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum AuthOrigin {
    Fixed,
    Delegated { authenticator: String },
}

/// Authenticated principal for one session. Immutable once created; destroyed
/// with the session that owns it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    #[serde(default)]
    pub authorities: BTreeSet<String>,
    pub origin: AuthOrigin,
}

impl Identity {
    pub fn new<I, S>(name: &str, authorities: I, origin: AuthOrigin) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.to_string(),
            authorities: authorities.into_iter().map(Into::into).collect(),
            origin,
        }
    }

    pub fn has_authority(&self, label: &str) -> bool {
        self.authorities.contains(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authorities_are_deduplicated() {
        let id = Identity::new("ops", ["ADMIN", "ADMIN", "AUDIT"], AuthOrigin::Fixed);
        assert_eq!(id.authorities.len(), 2);
        assert!(id.has_authority("ADMIN"));
        assert!(id.has_authority("AUDIT"));
        assert!(!id.has_authority("admin"));
    }

    #[test]
    fn serializes_with_stable_order() {
        let id = Identity::new("ops", ["Z", "A"], AuthOrigin::Fixed);
        let v = serde_json::to_value(&id).unwrap();
        assert_eq!(v["authorities"], serde_json::json!(["A", "Z"]));
        assert_eq!(v["origin"]["strategy"], "fixed");
    }
}
