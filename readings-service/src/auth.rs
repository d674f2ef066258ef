use std::collections::HashSet;

use crate::config::AuthConfig;

/// Capability check guarding reading deletion.
///
/// Injected into the ledger rather than compared inline against a literal
/// name, so deployments decide who may delete.
pub trait DeletePolicy: Send + Sync {
    fn may_delete(&self, user: &str) -> bool;
}

/// Policy backed by the configured set of privileged identities.
///
/// Matching is exact (case-sensitive); an empty set denies everyone.
#[derive(Debug, Default)]
pub struct PrivilegedUsers {
    identities: HashSet<String>,
}

impl PrivilegedUsers {
    pub fn new<I, S>(identities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            identities: identities.into_iter().map(Into::into).collect(),
        }
    }

    pub fn from_config(cfg: &AuthConfig) -> Self {
        Self::new(cfg.privileged_users.iter().cloned())
    }
}

impl DeletePolicy for PrivilegedUsers {
    fn may_delete(&self, user: &str) -> bool {
        self.identities.contains(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_set_denies_everyone() {
        let policy = PrivilegedUsers::default();
        assert!(!policy.may_delete("admin"));
        assert!(!policy.may_delete(""));
    }

    #[test]
    fn only_configured_identities_pass() {
        let policy = PrivilegedUsers::new(["admin", "ops"]);
        assert!(policy.may_delete("admin"));
        assert!(policy.may_delete("ops"));
        assert!(!policy.may_delete("alice"));
    }

    #[test]
    fn matching_is_case_sensitive() {
        let policy = PrivilegedUsers::new(["admin"]);
        assert!(!policy.may_delete("Admin"));
    }
}
