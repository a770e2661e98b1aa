//! Access-control entries.
//!
//! An [`Acl`] grants a set of [`AclRights`] to one identity in one scope.
//! Two entries are *equivalent* when identity type, name and scope match;
//! equivalent entries are merged rather than duplicated by the ACL set.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Kind of identity an ACL entry applies to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AclIdentityType {
    User,
    Group,
    World,
    Anonymous,
}

impl fmt::Display for AclIdentityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AclIdentityType::User => "user",
            AclIdentityType::Group => "group",
            AclIdentityType::World => "world",
            AclIdentityType::Anonymous => "anonymous",
        };
        f.write_str(s)
    }
}

impl FromStr for AclIdentityType {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "user" => Ok(AclIdentityType::User),
            "group" => Ok(AclIdentityType::Group),
            "world" => Ok(AclIdentityType::World),
            "anonymous" => Ok(AclIdentityType::Anonymous),
            _ => Err(TypeError::UnknownVariant {
                kind: "acl identity type",
                value: s.to_string(),
            }),
        }
    }
}

/// Whether an entry applies to the object itself or is inherited by children.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AclScope {
    Access,
    Default,
}

impl fmt::Display for AclScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AclScope::Access => f.write_str("ACCESS"),
            AclScope::Default => f.write_str("DEFAULT"),
        }
    }
}

/// A bit set of rights.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AclRights(u16);

impl AclRights {
    pub const NONE: AclRights = AclRights(0);
    pub const READ: AclRights = AclRights(1 << 0);
    pub const WRITE: AclRights = AclRights(1 << 1);
    pub const CREATE: AclRights = AclRights(1 << 2);
    pub const LIST: AclRights = AclRights(1 << 3);
    pub const DELETE: AclRights = AclRights(1 << 4);
    pub const READ_ACL: AclRights = AclRights(1 << 5);
    pub const WRITE_ACL: AclRights = AclRights(1 << 6);
    pub const ALL: AclRights = AclRights(0x7f);

    const LETTERS: [(char, AclRights); 7] = [
        ('r', AclRights::READ),
        ('w', AclRights::WRITE),
        ('c', AclRights::CREATE),
        ('l', AclRights::LIST),
        ('d', AclRights::DELETE),
        ('x', AclRights::READ_ACL),
        ('y', AclRights::WRITE_ACL),
    ];

    pub const fn bits(&self) -> u16 {
        self.0
    }

    pub const fn from_bits(bits: u16) -> Self {
        Self(bits & Self::ALL.0)
    }

    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Returns `true` if every right in `other` is also in `self`.
    pub const fn contains(&self, other: AclRights) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersects(&self, other: AclRights) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn union(self, other: AclRights) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn difference(self, other: AclRights) -> Self {
        Self(self.0 & !other.0)
    }
}

impl std::ops::BitOr for AclRights {
    type Output = AclRights;

    fn bitor(self, rhs: Self) -> Self::Output {
        self.union(rhs)
    }
}

impl fmt::Debug for AclRights {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AclRights({self})")
    }
}

/// Short form: `a` for all, `n` for none, otherwise one letter per right.
impl fmt::Display for AclRights {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == AclRights::ALL {
            return f.write_str("a");
        }
        if self.is_empty() {
            return f.write_str("n");
        }
        for (letter, right) in Self::LETTERS {
            if self.contains(right) {
                write!(f, "{letter}")?;
            }
        }
        Ok(())
    }
}

impl FromStr for AclRights {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut rights = AclRights::NONE;
        for ch in s.chars() {
            let right = match ch {
                'a' => AclRights::ALL,
                'n' => AclRights::NONE,
                other => Self::LETTERS
                    .iter()
                    .find(|(letter, _)| *letter == other)
                    .map(|(_, right)| *right)
                    .ok_or_else(|| TypeError::InvalidAcl(format!("unknown right '{other}' in {s}")))?,
            };
            rights = rights | right;
        }
        Ok(rights)
    }
}

/// One access-control entry.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Acl {
    pub identity_type: AclIdentityType,
    /// Principal name. Empty for `World` and `Anonymous`.
    pub name: String,
    pub rights: AclRights,
    pub scope: AclScope,
}

impl Acl {
    pub fn new(
        identity_type: AclIdentityType,
        name: impl Into<String>,
        rights: AclRights,
        scope: AclScope,
    ) -> Self {
        Self {
            identity_type,
            name: name.into(),
            rights,
            scope,
        }
    }

    /// An access-scope entry for a user.
    pub fn user(name: impl Into<String>, rights: AclRights) -> Self {
        Self::new(AclIdentityType::User, name, rights, AclScope::Access)
    }

    /// An access-scope entry for a group.
    pub fn group(name: impl Into<String>, rights: AclRights) -> Self {
        Self::new(AclIdentityType::Group, name, rights, AclScope::Access)
    }

    /// An access-scope entry for everyone.
    pub fn world(rights: AclRights) -> Self {
        Self::new(AclIdentityType::World, "", rights, AclScope::Access)
    }

    /// Same identity and scope, regardless of rights.
    pub fn is_equivalent(&self, other: &Acl) -> bool {
        self.identity_type == other.identity_type
            && self.name == other.name
            && self.scope == other.scope
    }
}

/// `type:name:rights[SCOPE]`, e.g. `user:alice:rw[ACCESS]`.
impl fmt::Display for Acl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}[{}]",
            self.identity_type, self.name, self.rights, self.scope
        )
    }
}

impl FromStr for Acl {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (body, scope) = match s.split_once('[') {
            Some((body, rest)) => {
                let scope = match rest.strip_suffix(']') {
                    Some("ACCESS") => AclScope::Access,
                    Some("DEFAULT") => AclScope::Default,
                    _ => return Err(TypeError::InvalidAcl(s.to_string())),
                };
                (body, scope)
            }
            None => (s, AclScope::Access),
        };

        let parts: Vec<&str> = body.split(':').collect();
        if parts.len() != 3 {
            return Err(TypeError::InvalidAcl(s.to_string()));
        }
        let identity_type: AclIdentityType = parts[0].parse()?;
        let rights: AclRights = parts[2].parse()?;
        Ok(Acl::new(identity_type, parts[1], rights, scope))
    }
}
