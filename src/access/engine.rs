use crate::error::{Error, Result};
use crate::store::Store;
use crate::types::{Calendar, SharePermission};

/// Answers view/edit/ownership questions for a (calendar, user) pair.
///
/// Ownership is resolved before any share lookup: the owner always has full
/// access and never needs a share record.
pub struct AccessControl<'a> {
    store: &'a dyn Store,
}

impl<'a> AccessControl<'a> {
    #[must_use]
    pub fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    fn calendar(&self, calendar_id: &str) -> Result<Calendar> {
        self.store.get_calendar(calendar_id)?.ok_or(Error::NotFound)
    }

    /// Resolves the share level a non-owner holds, failing if the user is unknown.
    fn share_permission(&self, calendar_id: &str, user_id: &str) -> Result<Option<SharePermission>> {
        self.store.get_user(user_id)?.ok_or(Error::NotFound)?;
        Ok(self
            .store
            .find_share_by_pair(calendar_id, user_id)?
            .map(|share| share.permission))
    }

    pub fn is_owner(&self, calendar_id: &str, user_id: &str) -> Result<bool> {
        Ok(self.calendar(calendar_id)?.owner_id == user_id)
    }

    pub fn has_access(&self, calendar_id: &str, user_id: &str) -> Result<bool> {
        let calendar = self.calendar(calendar_id)?;
        if calendar.owner_id == user_id {
            return Ok(true);
        }

        self.store.get_user(user_id)?.ok_or(Error::NotFound)?;
        self.store.exists_share_by_pair(&calendar.id, user_id)
    }

    /// True for the owner, or for a grantee holding an `edit` share. A `view`
    /// share is a negative answer.
    pub fn can_edit(&self, calendar_id: &str, user_id: &str) -> Result<bool> {
        let calendar = self.calendar(calendar_id)?;
        if calendar.owner_id == user_id {
            return Ok(true);
        }

        Ok(self
            .share_permission(&calendar.id, user_id)?
            .is_some_and(SharePermission::can_edit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::ShareRegistry;
    use crate::access::fixtures::Fixture;

    #[test]
    fn test_owner_has_full_access_without_share() {
        let fx = Fixture::new();
        let access = AccessControl::new(&fx.store);

        assert!(access.is_owner("c1", "u1").unwrap());
        assert!(access.has_access("c1", "u1").unwrap());
        assert!(access.can_edit("c1", "u1").unwrap());
    }

    #[test]
    fn test_owner_short_circuit_skips_user_lookup() {
        let fx = Fixture::new();
        let access = AccessControl::new(&fx.store);

        // Any id equal to the owner id passes without resolving the user record.
        fx.store
            .connection()
            .execute_batch("PRAGMA foreign_keys = OFF; DELETE FROM users WHERE id = 'u1';")
            .unwrap();

        assert!(access.has_access("c1", "u1").unwrap());
        assert!(access.can_edit("c1", "u1").unwrap());
    }

    #[test]
    fn test_no_share_means_no_access() {
        let fx = Fixture::new();
        let access = AccessControl::new(&fx.store);

        assert!(!access.is_owner("c1", "u2").unwrap());
        assert!(!access.has_access("c1", "u2").unwrap());
        assert!(!access.can_edit("c1", "u2").unwrap());
    }

    #[test]
    fn test_view_share_grants_read_only() {
        let fx = Fixture::new();
        ShareRegistry::new(&fx.store)
            .grant("c1", "u2", SharePermission::View)
            .unwrap();
        let access = AccessControl::new(&fx.store);

        assert!(access.has_access("c1", "u2").unwrap());
        assert!(!access.can_edit("c1", "u2").unwrap());
        assert!(!access.is_owner("c1", "u2").unwrap());
    }

    #[test]
    fn test_edit_share_grants_read_write() {
        let fx = Fixture::new();
        ShareRegistry::new(&fx.store)
            .grant("c1", "u2", SharePermission::Edit)
            .unwrap();
        let access = AccessControl::new(&fx.store);

        assert!(access.has_access("c1", "u2").unwrap());
        assert!(access.can_edit("c1", "u2").unwrap());
    }

    #[test]
    fn test_share_on_other_calendar_does_not_leak() {
        let fx = Fixture::new();
        ShareRegistry::new(&fx.store)
            .grant("c2", "u2", SharePermission::Edit)
            .unwrap();
        let access = AccessControl::new(&fx.store);

        assert!(!access.has_access("c1", "u2").unwrap());
        assert!(access.has_access("c2", "u2").unwrap());
    }

    #[test]
    fn test_unknown_calendar_is_not_found() {
        let fx = Fixture::new();
        let access = AccessControl::new(&fx.store);

        assert!(matches!(access.has_access("missing", "u1"), Err(Error::NotFound)));
        assert!(matches!(access.can_edit("missing", "u1"), Err(Error::NotFound)));
        assert!(matches!(access.is_owner("missing", "u1"), Err(Error::NotFound)));
    }

    #[test]
    fn test_unknown_user_is_not_found_for_non_owner() {
        let fx = Fixture::new();
        let access = AccessControl::new(&fx.store);

        assert!(matches!(access.has_access("c1", "ghost"), Err(Error::NotFound)));
        assert!(matches!(access.can_edit("c1", "ghost"), Err(Error::NotFound)));
        assert!(!access.is_owner("c1", "ghost").unwrap());
    }

    #[test]
    fn test_shared_view_scenario() {
        let fx = Fixture::new();
        ShareRegistry::new(&fx.store)
            .grant("c1", "u2", SharePermission::View)
            .unwrap();
        let access = AccessControl::new(&fx.store);

        assert!(access.has_access("c1", "u2").unwrap());
        assert!(!access.can_edit("c1", "u2").unwrap());
        assert!(access.can_edit("c1", "u1").unwrap());
        assert!(!access.has_access("c1", "u3").unwrap());
    }

    #[test]
    fn test_grant_upgrade_revoke_scenario() {
        let fx = Fixture::new();
        let registry = ShareRegistry::new(&fx.store);
        let access = AccessControl::new(&fx.store);

        let share = registry.grant("c1", "u2", SharePermission::View).unwrap();
        assert!(!access.can_edit("c1", "u2").unwrap());

        registry
            .update_permission(&share.id, SharePermission::Edit)
            .unwrap();
        assert!(access.can_edit("c1", "u2").unwrap());

        registry.revoke_by_pair("c1", "u2").unwrap();
        assert!(!access.has_access("c1", "u2").unwrap());
        assert!(!access.can_edit("c1", "u2").unwrap());
    }

    #[test]
    fn test_owner_access_unaffected_by_shares() {
        let fx = Fixture::new();
        let registry = ShareRegistry::new(&fx.store);
        registry.grant("c1", "u2", SharePermission::View).unwrap();
        registry.grant("c1", "u3", SharePermission::Edit).unwrap();
        registry.revoke_by_pair("c1", "u3").unwrap();

        let access = AccessControl::new(&fx.store);
        assert!(access.is_owner("c1", "u1").unwrap());
        assert!(access.has_access("c1", "u1").unwrap());
        assert!(access.can_edit("c1", "u1").unwrap());
    }
}
