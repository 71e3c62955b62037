use std::collections::BTreeSet;

use super::principal::Identity;

/// Authority labels a command demands of the current identity. `match_all`
/// requires every label; otherwise any intersection satisfies the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorityRequirement {
    pub labels: BTreeSet<String>,
    pub match_all: bool,
}

impl AuthorityRequirement {
    pub fn any_of<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            labels: labels.into_iter().map(Into::into).collect(),
            match_all: false,
        }
    }

    pub fn all_of<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            labels: labels.into_iter().map(Into::into).collect(),
            match_all: true,
        }
    }
}

/// Decision returned by the availability gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Availability {
    Available,
    Unavailable(String),
}

impl Availability {
    pub fn is_available(&self) -> bool {
        matches!(self, Availability::Available)
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Availability::Available => None,
            Availability::Unavailable(r) => Some(r),
        }
    }
}

/// Availability gate. Pure function of (identity, requirement): callers use
/// it both to decide whether to advertise a command and to block execution,
/// and the two answers always agree.
pub fn availability(identity: &Identity, requirement: &AuthorityRequirement) -> Availability {
    if requirement.labels.is_empty() {
        return Availability::Available;
    }
    let held: Vec<&String> = requirement
        .labels
        .iter()
        .filter(|l| identity.authorities.contains(*l))
        .collect();
    let satisfied = if requirement.match_all {
        held.len() == requirement.labels.len()
    } else {
        !held.is_empty()
    };
    if satisfied {
        Availability::Available
    } else {
        let wanted = requirement
            .labels
            .iter()
            .cloned()
            .collect::<Vec<_>>()
            .join(", ");
        let mode = if requirement.match_all { "all of" } else { "one of" };
        Availability::Unavailable(format!(
            "requires {} the authorities [{}]",
            mode, wanted
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::AuthOrigin;

    fn ident(authorities: &[&str]) -> Identity {
        Identity::new("u", authorities.iter().copied(), AuthOrigin::Fixed)
    }

    #[test]
    fn empty_requirement_is_always_available() {
        let req = AuthorityRequirement::any_of(Vec::<String>::new());
        assert!(availability(&ident(&[]), &req).is_available());
    }

    #[test]
    fn any_of_needs_one_intersection() {
        let req = AuthorityRequirement::any_of(["ADMIN", "AUDIT"]);
        assert!(availability(&ident(&["AUDIT"]), &req).is_available());
        let denied = availability(&ident(&["USER"]), &req);
        assert!(!denied.is_available());
        assert_eq!(
            denied.reason(),
            Some("requires one of the authorities [ADMIN, AUDIT]")
        );
    }

    #[test]
    fn all_of_needs_full_containment() {
        let req = AuthorityRequirement::all_of(["ADMIN", "AUDIT"]);
        assert!(!availability(&ident(&["ADMIN"]), &req).is_available());
        assert!(availability(&ident(&["ADMIN", "AUDIT", "USER"]), &req).is_available());
    }

    #[test]
    fn gate_is_pure() {
        let req = AuthorityRequirement::any_of(["ADMIN"]);
        let id = ident(&["USER"]);
        let first = availability(&id, &req);
        for _ in 0..10 {
            assert_eq!(availability(&id, &req), first);
        }
    }
}
