use chrono::Utc;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::store::Store;
use crate::types::{Share, SharePermission};

/// Share lifecycle operations with the grant invariants applied on top of the store.
///
/// Per (calendar, grantee) pair the lifecycle is
/// `Unshared -> Shared(view) <-> Shared(edit) -> Unshared`.
pub struct ShareRegistry<'a> {
    store: &'a dyn Store,
}

impl<'a> ShareRegistry<'a> {
    #[must_use]
    pub fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    /// Creates a share for a pair that is currently unshared.
    ///
    /// Fails with `NotFound` for an unknown calendar or grantee, `InvalidOperation`
    /// when the grantee owns the calendar, and `Conflict` when the pair is already
    /// shared. Changing the level of an existing share goes through
    /// [`ShareRegistry::update_permission`].
    pub fn grant(
        &self,
        calendar_id: &str,
        grantee_id: &str,
        permission: SharePermission,
    ) -> Result<Share> {
        let calendar = self.store.get_calendar(calendar_id)?.ok_or(Error::NotFound)?;
        let grantee = self.store.get_user(grantee_id)?.ok_or(Error::NotFound)?;

        if calendar.owner_id == grantee.id {
            return Err(Error::InvalidOperation(
                "cannot share a calendar with its owner".to_string(),
            ));
        }

        if self.store.exists_share_by_pair(&calendar.id, &grantee.id)? {
            return Err(Error::Conflict(
                "calendar is already shared with this user".to_string(),
            ));
        }

        let share = Share {
            id: Uuid::new_v4().to_string(),
            calendar_id: calendar.id,
            grantee_id: grantee.id,
            permission,
            created_at: Utc::now(),
        };

        // The unique (calendar_id, grantee_id) constraint settles a concurrent grant
        // that slipped past the existence check.
        self.store.create_share(&share)?;

        tracing::info!(
            share_id = %share.id,
            calendar_id = %share.calendar_id,
            grantee_id = %share.grantee_id,
            permission = %share.permission,
            "Calendar shared"
        );

        Ok(share)
    }

    pub fn get(&self, share_id: &str) -> Result<Option<Share>> {
        self.store.get_share(share_id)
    }

    pub fn list_by_calendar(&self, calendar_id: &str) -> Result<Vec<Share>> {
        self.store.list_shares_by_calendar(calendar_id)
    }

    pub fn list_by_grantee(&self, grantee_id: &str) -> Result<Vec<Share>> {
        self.store.list_shares_by_grantee(grantee_id)
    }

    pub fn find_by_pair(&self, calendar_id: &str, grantee_id: &str) -> Result<Option<Share>> {
        self.store.find_share_by_pair(calendar_id, grantee_id)
    }

    pub fn exists_by_pair(&self, calendar_id: &str, grantee_id: &str) -> Result<bool> {
        self.store.exists_share_by_pair(calendar_id, grantee_id)
    }

    /// Replaces the permission of an existing share. The id and creation time are kept.
    pub fn update_permission(&self, share_id: &str, permission: SharePermission) -> Result<Share> {
        let mut share = self.store.get_share(share_id)?.ok_or(Error::NotFound)?;

        if !self.store.update_share_permission(share_id, permission)? {
            // Deleted between the read and the update.
            return Err(Error::NotFound);
        }

        if share.permission != permission {
            tracing::info!(
                share_id = %share.id,
                calendar_id = %share.calendar_id,
                from = %share.permission,
                to = %permission,
                "Share permission changed"
            );
        }

        share.permission = permission;
        Ok(share)
    }

    /// Removes the share for a pair if there is one. Absence is not an error.
    pub fn revoke_by_pair(&self, calendar_id: &str, grantee_id: &str) -> Result<()> {
        if self.store.delete_share_by_pair(calendar_id, grantee_id)? {
            tracing::info!(calendar_id, grantee_id, "Share revoked");
        }
        Ok(())
    }

    pub fn delete_by_id(&self, share_id: &str) -> Result<()> {
        if !self.store.delete_share(share_id)? {
            return Err(Error::NotFound);
        }
        tracing::info!(share_id, "Share deleted");
        Ok(())
    }

    pub fn count_by_calendar(&self, calendar_id: &str) -> Result<u64> {
        self.store.count_shares_by_calendar(calendar_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::fixtures::Fixture;

    #[test]
    fn test_grant_creates_share() {
        let fx = Fixture::new();
        let registry = ShareRegistry::new(&fx.store);

        let share = registry.grant("c1", "u2", SharePermission::View).unwrap();
        assert_eq!(share.calendar_id, "c1");
        assert_eq!(share.grantee_id, "u2");
        assert_eq!(share.permission, SharePermission::View);

        assert_eq!(registry.get(&share.id).unwrap(), Some(share.clone()));
        assert_eq!(registry.find_by_pair("c1", "u2").unwrap(), Some(share));
        assert!(registry.exists_by_pair("c1", "u2").unwrap());
        assert_eq!(registry.count_by_calendar("c1").unwrap(), 1);
    }

    #[test]
    fn test_second_grant_for_pair_is_conflict() {
        let fx = Fixture::new();
        let registry = ShareRegistry::new(&fx.store);

        registry.grant("c1", "u2", SharePermission::View).unwrap();
        let result = registry.grant("c1", "u2", SharePermission::Edit);

        assert!(matches!(result, Err(Error::Conflict(_))));
        assert_eq!(registry.count_by_calendar("c1").unwrap(), 1);
        assert_eq!(
            registry.find_by_pair("c1", "u2").unwrap().unwrap().permission,
            SharePermission::View
        );
    }

    #[test]
    fn test_grant_to_owner_is_invalid() {
        let fx = Fixture::new();
        let registry = ShareRegistry::new(&fx.store);

        let result = registry.grant("c1", "u1", SharePermission::View);
        assert!(matches!(result, Err(Error::InvalidOperation(_))));
        assert_eq!(registry.count_by_calendar("c1").unwrap(), 0);
    }

    #[test]
    fn test_grant_unknown_entities_is_not_found() {
        let fx = Fixture::new();
        let registry = ShareRegistry::new(&fx.store);

        assert!(matches!(
            registry.grant("missing", "u2", SharePermission::View),
            Err(Error::NotFound)
        ));
        assert!(matches!(
            registry.grant("c1", "missing", SharePermission::View),
            Err(Error::NotFound)
        ));
    }

    #[test]
    fn test_update_permission_keeps_identity() {
        let fx = Fixture::new();
        let registry = ShareRegistry::new(&fx.store);

        let original = registry.grant("c1", "u2", SharePermission::View).unwrap();
        let updated = registry
            .update_permission(&original.id, SharePermission::Edit)
            .unwrap();

        assert_eq!(updated.id, original.id);
        assert_eq!(updated.created_at, original.created_at);
        assert_eq!(updated.permission, SharePermission::Edit);

        let stored = registry.get(&original.id).unwrap().unwrap();
        assert_eq!(stored, updated);
        assert_eq!(registry.count_by_calendar("c1").unwrap(), 1);

        let downgraded = registry
            .update_permission(&original.id, SharePermission::View)
            .unwrap();
        assert_eq!(downgraded.permission, SharePermission::View);
    }

    #[test]
    fn test_update_unknown_share_is_not_found() {
        let fx = Fixture::new();
        let registry = ShareRegistry::new(&fx.store);

        let result = registry.update_permission("missing", SharePermission::Edit);
        assert!(matches!(result, Err(Error::NotFound)));
    }

    #[test]
    fn test_revoke_by_pair_is_idempotent() {
        let fx = Fixture::new();
        let registry = ShareRegistry::new(&fx.store);

        registry.grant("c1", "u2", SharePermission::View).unwrap();

        registry.revoke_by_pair("c1", "u2").unwrap();
        registry.revoke_by_pair("c1", "u2").unwrap();
        assert!(!registry.exists_by_pair("c1", "u2").unwrap());

        // A revoked pair can be shared again.
        registry.grant("c1", "u2", SharePermission::Edit).unwrap();
    }

    #[test]
    fn test_delete_by_id_requires_existing_share() {
        let fx = Fixture::new();
        let registry = ShareRegistry::new(&fx.store);

        let share = registry.grant("c1", "u2", SharePermission::View).unwrap();
        registry.delete_by_id(&share.id).unwrap();

        assert!(registry.get(&share.id).unwrap().is_none());
        assert!(matches!(registry.delete_by_id(&share.id), Err(Error::NotFound)));

        // The calendar and grantee are untouched.
        assert!(fx.store.get_calendar("c1").unwrap().is_some());
        assert!(fx.store.get_user("u2").unwrap().is_some());
    }

    #[test]
    fn test_list_by_calendar_and_grantee() {
        let fx = Fixture::new();
        let registry = ShareRegistry::new(&fx.store);

        registry.grant("c1", "u2", SharePermission::View).unwrap();
        registry.grant("c1", "u3", SharePermission::Edit).unwrap();
        registry.grant("c2", "u2", SharePermission::Edit).unwrap();

        let on_c1 = registry.list_by_calendar("c1").unwrap();
        assert_eq!(on_c1.len(), 2);
        assert!(on_c1.iter().all(|s| s.calendar_id == "c1"));

        let for_u2 = registry.list_by_grantee("u2").unwrap();
        assert_eq!(for_u2.len(), 2);
        assert!(for_u2.iter().all(|s| s.grantee_id == "u2"));

        assert!(registry.list_by_grantee("u1").unwrap().is_empty());
    }
}
