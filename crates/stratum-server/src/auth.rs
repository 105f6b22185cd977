//! ACL authorizer for the produce/consume surface.
//!
//! Authorization is a plain subject-to-actions table. The subject is
//! whatever identity the client presented at handshake; a connection that
//! never presented one has no subject and matches no rule.

use std::collections::{HashMap, HashSet};
use std::fmt::Display;
use std::path::Path;

use crate::error::{ServerError, ServerResult};

/// Actions a subject can be granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Produce,
    Consume,
}

impl Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Produce => write!(f, "produce"),
            Action::Consume => write!(f, "consume"),
        }
    }
}

/// Access-control list mapping subjects to permitted actions.
///
/// Unknown subjects, including the absent subject, are denied everything.
#[derive(Debug, Clone, Default)]
pub struct Acl {
    rules: HashMap<String, HashSet<Action>>,
}

impl Acl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grants `action` to `subject`.
    #[must_use]
    pub fn allow(mut self, subject: impl Into<String>, action: Action) -> Self {
        self.rules.entry(subject.into()).or_default().insert(action);
        self
    }

    /// Whether `subject` may perform `action`.
    pub fn is_allowed(&self, subject: Option<&str>, action: Action) -> bool {
        subject
            .and_then(|s| self.rules.get(s))
            .is_some_and(|actions| actions.contains(&action))
    }

    /// Loads an ACL from a policy file.
    ///
    /// One rule per line, `subject,action`, with `#` comments and blank
    /// lines ignored:
    ///
    /// ```text
    /// # subjects and their grants
    /// root,produce
    /// root,consume
    /// mirror,consume
    /// ```
    pub fn from_policy_file(path: impl AsRef<Path>) -> ServerResult<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let mut acl = Acl::new();

        for (number, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (subject, action) = line.split_once(',').ok_or_else(|| {
                ServerError::InvalidPolicy(format!("line {}: expected `subject,action`", number + 1))
            })?;

            let action = match action.trim() {
                "produce" => Action::Produce,
                "consume" => Action::Consume,
                other => {
                    return Err(ServerError::InvalidPolicy(format!(
                        "line {}: unknown action `{other}`",
                        number + 1
                    )));
                }
            };

            acl = acl.allow(subject.trim(), action);
        }

        Ok(acl)
    }
}

#[cfg(test)]
mod acl_tests {
    use super::*;

    #[test]
    fn grants_apply_per_subject_and_action() {
        let acl = Acl::new()
            .allow("root", Action::Produce)
            .allow("root", Action::Consume)
            .allow("mirror", Action::Consume);

        assert!(acl.is_allowed(Some("root"), Action::Produce));
        assert!(acl.is_allowed(Some("root"), Action::Consume));
        assert!(!acl.is_allowed(Some("mirror"), Action::Produce));
        assert!(acl.is_allowed(Some("mirror"), Action::Consume));
    }

    #[test]
    fn unknown_and_absent_subjects_are_denied() {
        let acl = Acl::new().allow("root", Action::Produce);

        assert!(!acl.is_allowed(Some("nobody"), Action::Produce));
        assert!(!acl.is_allowed(None, Action::Produce));
    }

    #[test]
    fn policy_file_parses_rules_and_skips_comments() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("policy.csv");
        std::fs::write(&path, "# grants\nroot,produce\nroot,consume\n\nmirror, consume\n")
            .unwrap();

        let acl = Acl::from_policy_file(&path).unwrap();
        assert!(acl.is_allowed(Some("root"), Action::Produce));
        assert!(acl.is_allowed(Some("mirror"), Action::Consume));
        assert!(!acl.is_allowed(Some("mirror"), Action::Produce));
    }

    #[test]
    fn malformed_policy_lines_are_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("policy.csv");

        std::fs::write(&path, "root produce\n").unwrap();
        assert!(matches!(
            Acl::from_policy_file(&path),
            Err(ServerError::InvalidPolicy(_))
        ));

        std::fs::write(&path, "root,delete\n").unwrap();
        assert!(matches!(
            Acl::from_policy_file(&path),
            Err(ServerError::InvalidPolicy(_))
        ));
    }
}
