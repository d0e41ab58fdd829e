use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Level of access a share grants on a calendar.
///
/// Variants are ordered so that `Edit > View`; an edit share implies view access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SharePermission {
    View,
    Edit,
}

impl SharePermission {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::View => "view",
            Self::Edit => "edit",
        }
    }

    /// Returns true if holding `self` satisfies a requirement of `required`.
    #[must_use]
    pub fn implies(self, required: SharePermission) -> bool {
        self >= required
    }

    #[must_use]
    pub fn can_edit(self) -> bool {
        self.implies(Self::Edit)
    }
}

impl fmt::Display for SharePermission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SharePermission {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "view" => Ok(Self::View),
            "edit" => Ok(Self::Edit),
            other => Err(Error::InvalidOperation(format!(
                "unknown permission level '{other}', expected 'view' or 'edit'"
            ))),
        }
    }
}

pub const ROLE_USER: &str = "user";
pub const ROLE_ADMIN: &str = "admin";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edit_implies_view() {
        assert!(SharePermission::Edit.implies(SharePermission::View));
        assert!(SharePermission::Edit.implies(SharePermission::Edit));
        assert!(SharePermission::View.implies(SharePermission::View));
        assert!(!SharePermission::View.implies(SharePermission::Edit));
    }

    #[test]
    fn test_can_edit_follows_ordering() {
        assert!(SharePermission::Edit.can_edit());
        assert!(!SharePermission::View.can_edit());
    }

    #[test]
    fn test_parse_permission() {
        assert_eq!("view".parse::<SharePermission>().unwrap(), SharePermission::View);
        assert_eq!("edit".parse::<SharePermission>().unwrap(), SharePermission::Edit);
    }

    #[test]
    fn test_parse_rejects_unknown_level() {
        let err = "admin".parse::<SharePermission>().unwrap_err();
        assert!(matches!(err, Error::InvalidOperation(_)));

        // Lookups are exact, no case folding.
        assert!("Edit".parse::<SharePermission>().is_err());
    }

    #[test]
    fn test_serde_lowercase() {
        let json = serde_json::to_string(&SharePermission::Edit).unwrap();
        assert_eq!(json, "\"edit\"");
        let parsed: SharePermission = serde_json::from_str("\"view\"").unwrap();
        assert_eq!(parsed, SharePermission::View);
    }
}
