//! Privilege bit flags.
//!
//! A [`Privilege`] is a set over a closed vocabulary of primitive
//! capabilities. Composites are plain unions of primitives; adding a
//! primitive means deciding explicitly which composites it joins.
//!
//! Every component checks privileges through [`Privilege::has`].

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign, Sub};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{SecurityError, SecurityResult};

/// A set of privileges.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Privilege(u32);

impl Privilege {
    /// The empty set.
    pub const NONE: Privilege = Privilege(0);
    /// Read rows (SELECT).
    pub const READ: Privilege = Privilege(1 << 0);
    /// Insert rows.
    pub const INSERT: Privilege = Privilege(1 << 1);
    /// Update rows.
    pub const UPDATE: Privilege = Privilege(1 << 2);
    /// Delete rows.
    pub const DELETE: Privilege = Privilege(1 << 3);
    /// Create databases and tables.
    pub const CREATE: Privilege = Privilege(1 << 4);
    /// Drop databases and tables.
    pub const DROP: Privilege = Privilege(1 << 5);
    /// Alter table definitions.
    pub const ALTER: Privilege = Privilege(1 << 6);
    /// Create and drop indexes.
    pub const INDEX: Privilege = Privilege(1 << 7);
    /// Grant and revoke privileges.
    pub const GRANT: Privilege = Privilege(1 << 8);
    /// Super-user. Bypasses scoped resolution entirely.
    pub const ADMIN: Privilege = Privilege(1 << 9);

    /// Read access only.
    pub const READ_ONLY: Privilege = Self::READ;
    /// Row-level read and write.
    pub const READ_WRITE: Privilege = Privilege(
        Self::READ.0 | Self::INSERT.0 | Self::UPDATE.0 | Self::DELETE.0,
    );
    /// Schema changes.
    pub const DDL: Privilege =
        Privilege(Self::CREATE.0 | Self::DROP.0 | Self::ALTER.0 | Self::INDEX.0);
    /// Every primitive.
    pub const ALL: Privilege =
        Privilege(Self::READ_WRITE.0 | Self::DDL.0 | Self::GRANT.0 | Self::ADMIN.0);

    /// Primitives in canonical rendering order.
    const PRIMITIVES: [(Privilege, &'static str); 10] = [
        (Self::READ, "read"),
        (Self::INSERT, "insert"),
        (Self::UPDATE, "update"),
        (Self::DELETE, "delete"),
        (Self::CREATE, "create"),
        (Self::DROP, "drop"),
        (Self::ALTER, "alter"),
        (Self::INDEX, "index"),
        (Self::GRANT, "grant"),
        (Self::ADMIN, "admin"),
    ];

    /// Raw bit representation.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Build from raw bits, discarding bits outside the vocabulary.
    pub const fn from_bits_truncate(bits: u32) -> Self {
        Privilege(bits & Self::ALL.0)
    }

    /// Union of two sets.
    pub const fn union(self, other: Privilege) -> Self {
        Privilege(self.0 | other.0)
    }

    /// True iff every bit of `required` is present in `self`.
    pub const fn has(self, required: Privilege) -> bool {
        self.0 & required.0 == required.0
    }

    /// True if no privilege is set.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Iterate over the primitives contained in this set, in canonical order.
    pub fn primitives(self) -> impl Iterator<Item = Privilege> {
        Self::PRIMITIVES
            .into_iter()
            .filter(move |(p, _)| self.has(*p))
            .map(|(p, _)| p)
    }

    /// Parse a single privilege or composite name, case-insensitively.
    ///
    /// Unknown names yield [`Privilege::NONE`]. Use [`Privilege::is_known`]
    /// first when the input is untrusted.
    pub fn parse(name: &str) -> Privilege {
        Self::lookup(name).unwrap_or(Privilege::NONE)
    }

    /// Whether `name` is part of the vocabulary (primitives, aliases, composites).
    pub fn is_known(name: &str) -> bool {
        Self::lookup(name).is_some()
    }

    /// Parse a comma-separated list, rejecting any unknown name.
    pub fn parse_list(list: &str) -> SecurityResult<Privilege> {
        let mut set = Privilege::NONE;
        for name in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            match Self::lookup(name) {
                Some(p) => set |= p,
                None => return Err(SecurityError::InvalidPrivilege(name.to_string())),
            }
        }
        Ok(set)
    }

    fn lookup(name: &str) -> Option<Privilege> {
        let lowered = name.trim().to_ascii_lowercase();
        let p = match lowered.as_str() {
            "read" | "select" => Self::READ,
            "insert" => Self::INSERT,
            "update" => Self::UPDATE,
            "delete" => Self::DELETE,
            "create" => Self::CREATE,
            "drop" => Self::DROP,
            "alter" => Self::ALTER,
            "index" => Self::INDEX,
            "grant" => Self::GRANT,
            "admin" => Self::ADMIN,
            "none" => Self::NONE,
            "all" => Self::ALL,
            "read_only" | "readonly" => Self::READ_ONLY,
            "read_write" | "readwrite" => Self::READ_WRITE,
            "ddl" => Self::DDL,
            _ => return None,
        };
        Some(p)
    }
}

impl BitOr for Privilege {
    type Output = Privilege;

    fn bitor(self, rhs: Privilege) -> Privilege {
        self.union(rhs)
    }
}

impl BitOrAssign for Privilege {
    fn bitor_assign(&mut self, rhs: Privilege) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for Privilege {
    type Output = Privilege;

    fn bitand(self, rhs: Privilege) -> Privilege {
        Privilege(self.0 & rhs.0)
    }
}

impl Sub for Privilege {
    type Output = Privilege;

    /// Set difference.
    fn sub(self, rhs: Privilege) -> Privilege {
        Privilege(self.0 & !rhs.0)
    }
}

impl fmt::Display for Privilege {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "none");
        }
        if *self == Self::ALL {
            return write!(f, "all");
        }
        let mut first = true;
        for (p, name) in Self::PRIMITIVES {
            if self.has(p) {
                if !first {
                    write!(f, ",")?;
                }
                write!(f, "{}", name)?;
                first = false;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Privilege {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Privilege({})", self)
    }
}

impl Serialize for Privilege {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Privilege {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Privilege::parse_list(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_composites_are_unions() {
        assert_eq!(
            Privilege::READ_WRITE,
            Privilege::READ | Privilege::INSERT | Privilege::UPDATE | Privilege::DELETE
        );
        assert_eq!(
            Privilege::DDL,
            Privilege::CREATE | Privilege::DROP | Privilege::ALTER | Privilege::INDEX
        );
        let every = Privilege::PRIMITIVES
            .iter()
            .fold(Privilege::NONE, |acc, (p, _)| acc | *p);
        assert_eq!(every, Privilege::ALL);
    }

    #[test]
    fn test_has() {
        let set = Privilege::READ | Privilege::INSERT;
        assert!(set.has(Privilege::READ));
        assert!(set.has(Privilege::READ | Privilege::INSERT));
        assert!(!set.has(Privilege::READ | Privilege::DELETE));
        assert!(set.has(Privilege::NONE));
        assert!(!Privilege::NONE.has(Privilege::READ));
    }

    #[test]
    fn test_display() {
        assert_eq!(Privilege::NONE.to_string(), "none");
        assert_eq!(Privilege::ALL.to_string(), "all");
        assert_eq!(Privilege::READ.to_string(), "read");
        assert_eq!(
            (Privilege::DELETE | Privilege::READ).to_string(),
            "read,delete"
        );
        assert_eq!(
            (Privilege::ADMIN | Privilege::GRANT | Privilege::CREATE).to_string(),
            "create,grant,admin"
        );
    }

    #[test]
    fn test_parse_is_case_insensitive_and_total() {
        assert_eq!(Privilege::parse("SELECT"), Privilege::READ);
        assert_eq!(Privilege::parse("Insert"), Privilege::INSERT);
        assert_eq!(Privilege::parse("all"), Privilege::ALL);
        assert_eq!(Privilege::parse("ReadWrite"), Privilege::READ_WRITE);
        assert_eq!(Privilege::parse("truncate"), Privilege::NONE);
        assert!(!Privilege::is_known("truncate"));
        assert!(Privilege::is_known("DDL"));
    }

    #[test]
    fn test_parse_list() {
        assert_eq!(
            Privilege::parse_list("read, insert").unwrap(),
            Privilege::READ | Privilege::INSERT
        );
        assert!(matches!(
            Privilege::parse_list("read,bogus"),
            Err(SecurityError::InvalidPrivilege(name)) if name == "bogus"
        ));
    }

    #[test]
    fn test_serde_uses_canonical_names() {
        let json = serde_json::to_string(&(Privilege::READ | Privilege::UPDATE)).unwrap();
        assert_eq!(json, "\"read,update\"");
        let back: Privilege = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Privilege::READ | Privilege::UPDATE);
    }

    #[test]
    fn test_primitives_iteration() {
        let prims: Vec<_> = Privilege::DDL.primitives().collect();
        assert_eq!(
            prims,
            vec![
                Privilege::CREATE,
                Privilege::DROP,
                Privilege::ALTER,
                Privilege::INDEX
            ]
        );
    }

    proptest! {
        #[test]
        fn prop_has_matches_bit_subset(set in 0u32..1024, required in 0u32..1024) {
            let set = Privilege::from_bits_truncate(set);
            let required = Privilege::from_bits_truncate(required);
            prop_assert_eq!(set.has(required), set & required == required);
        }

        #[test]
        fn prop_display_parses_back(bits in 0u32..1024) {
            let p = Privilege::from_bits_truncate(bits);
            prop_assert_eq!(Privilege::parse_list(&p.to_string()).unwrap(), p);
        }
    }
}
