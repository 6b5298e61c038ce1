use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub const GRADES_REOPEN: &str = "academic.grades.reopen";
pub const REOPEN_ROLES: [&str; 2] = ["REGISTRAR", "ADMIN"];

/// What the signed-in user may do, handed to the daemon by the shell.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    #[serde(default)]
    pub permissions: BTreeSet<String>,
    #[serde(default)]
    pub roles: BTreeSet<String>,
}

impl Capabilities {
    pub fn new<P, R>(permissions: P, roles: R) -> Self
    where
        P: IntoIterator,
        P::Item: Into<String>,
        R: IntoIterator,
        R::Item: Into<String>,
    {
        Self {
            permissions: permissions.into_iter().map(Into::into).collect(),
            roles: roles
                .into_iter()
                .map(|r| r.into().to_ascii_uppercase())
                .collect(),
        }
    }

    pub fn has_any(&self, perms: &[&str]) -> bool {
        perms.iter().any(|p| self.permissions.contains(*p))
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(&role.to_ascii_uppercase())
    }

    pub fn can_reopen_grades(&self) -> bool {
        self.has_any(&[GRADES_REOPEN]) || REOPEN_ROLES.iter().any(|r| self.has_role(r))
    }
}
