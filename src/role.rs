//! The bit-flag set of principal kinds, drawn from `{admin, member, pro}`.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Role: i16 {
        const ADMIN = 1;
        const MEMBER = 2;
        const PRO = 4;
    }
}

impl Role {
    pub const ALL: Role = Role::ADMIN.union(Role::MEMBER).union(Role::PRO);
    pub const ADMIN_OR_PRO: Role = Role::ADMIN.union(Role::PRO);

    /// Decodes a raw stored value, rejecting anything outside the known bits.
    pub fn from_stored(raw: i16) -> Option<Role> {
        let role = Role::from_bits(raw)?;
        // Exactly one of the three tags must be set; a user record is never
        // multi-rooted at the storage layer.
        if role == Role::ADMIN || role == Role::MEMBER || role == Role::PRO {
            Some(role)
        } else {
            None
        }
    }

    pub fn key(self) -> &'static str {
        if self.contains(Role::ADMIN) {
            "admin"
        } else if self.contains(Role::MEMBER) {
            "member"
        } else {
            "pro"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_stored_accepts_known_tags() {
        assert_eq!(Role::from_stored(1), Some(Role::ADMIN));
        assert_eq!(Role::from_stored(2), Some(Role::MEMBER));
        assert_eq!(Role::from_stored(4), Some(Role::PRO));
    }

    #[test]
    fn from_stored_rejects_unknown_or_combined_values() {
        assert_eq!(Role::from_stored(0), None);
        assert_eq!(Role::from_stored(3), None);
        assert_eq!(Role::from_stored(8), None);
    }

    #[test]
    fn gate_checks() {
        assert!(Role::ALL.contains(Role::MEMBER));
        assert!(Role::ADMIN_OR_PRO.contains(Role::PRO));
        assert!(!Role::ADMIN_OR_PRO.contains(Role::MEMBER));
    }
}
