//! Role-based access control for the journal's contributor surface.
//! Four fixed roles, no custom role definitions — the reference
//! implementation's matrix is small enough to keep as a plain `match`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Operator,
    Agent,
    Curator,
    Tester,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    SubmitSignal,
    RegisterProducer,
    ReadJournal,
    ManageKillSwitch,
    ManageKarma,
}

impl Role {
    pub fn permissions(self) -> &'static [Permission] {
        use Permission::*;
        match self {
            Role::Operator => &[SubmitSignal, RegisterProducer, ReadJournal, ManageKillSwitch, ManageKarma],
            Role::Agent => &[SubmitSignal, RegisterProducer, ReadJournal],
            Role::Curator => &[SubmitSignal, ReadJournal],
            Role::Tester => &[SubmitSignal, ReadJournal],
        }
    }

    pub fn can(self, permission: Permission) -> bool {
        self.permissions().contains(&permission)
    }

    /// Testers get every other permission a curator does, but at reduced
    /// quota — that reduction lives in the rate limiter, not here.
    pub fn is_reduced_quota(self) -> bool {
        matches!(self, Role::Tester)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operator_has_every_permission() {
        for p in [
            Permission::SubmitSignal,
            Permission::RegisterProducer,
            Permission::ReadJournal,
            Permission::ManageKillSwitch,
            Permission::ManageKarma,
        ] {
            assert!(Role::Operator.can(p));
        }
    }

    #[test]
    fn curator_cannot_register_producers() {
        assert!(!Role::Curator.can(Permission::RegisterProducer));
    }

    #[test]
    fn tester_is_reduced_quota_but_still_read_and_submit() {
        assert!(Role::Tester.is_reduced_quota());
        assert!(Role::Tester.can(Permission::SubmitSignal));
        assert!(Role::Tester.can(Permission::ReadJournal));
    }
}
