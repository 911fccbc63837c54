//! Two-phase registration: `stage` parks a validated field set in the cache,
//! `confirm` turns it into a durable user, `rollback` abandons both sides.
//!
//! The cache is plain get/set/delete with a TTL, not a coordination
//! primitive: a concurrent confirm and rollback on the same email race and
//! the last cache writer wins. Accepted limitation.

use crate::{
    error::ApiError,
    schema::{PendingRegistration, RegistrationStatus},
};

use super::{email_validator, pending::PendingStore, users::UserStore};

/// Stages a registration behind the confirmation step. Re-staging the same
/// email overwrites the previous entry.
pub async fn stage<P: PendingStore>(
    pending: &P,
    req: PendingRegistration,
) -> crate::error::Result<RegistrationStatus> {
    if !email_validator(&req.email) {
        return Err(ApiError::InvalidRequest(format!("invalid email '{}'", req.email)).into());
    }
    pending.put(&req.email, &req).await?;
    tracing::debug!("Staged registration for {}", req.email);
    Ok(RegistrationStatus::Created)
}

/// Promotes a staged registration to a durable user. When a durable user
/// with the email already exists it is marked registered instead and the
/// now-obsolete staged entry is dropped. The staged entry is only removed
/// after the durable step succeeds, so a failed confirm can be retried.
pub async fn confirm<P: PendingStore, U: UserStore>(
    pending: &P,
    users: &U,
    email: &str,
) -> crate::error::Result<RegistrationStatus> {
    let Some(staged) = pending.get(email).await? else {
        return Err(ApiError::NotFound("User".to_string()).into());
    };
    match users.find_by_email(email).await? {
        Some(user) => {
            users.mark_registered(user).await?;
            pending.remove(email).await?;
            tracing::info!("Confirmed already-durable user {}", email);
            Ok(RegistrationStatus::AlreadyConfirmed)
        }
        None => {
            users.create(&staged).await?;
            pending.remove(email).await?;
            tracing::info!("Confirmed registration for {}", email);
            Ok(RegistrationStatus::Confirmed)
        }
    }
}

/// Abandons a registration: removes any staged entry and deletes any durable
/// user for the email, defending against a partially completed confirm.
/// Idempotent; reports `rolled_back` whether or not anything existed.
pub async fn rollback<P: PendingStore, U: UserStore>(
    pending: &P,
    users: &U,
    email: &str,
) -> crate::error::Result<RegistrationStatus> {
    pending.remove(email).await?;
    if users.delete_by_email(email).await? {
        tracing::info!("Rolled back durable user {}", email);
    }
    Ok(RegistrationStatus::RolledBack)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use sea_orm::prelude::TimeDateTimeWithTimeZone;

    use super::*;
    use crate::entity::users as User;
    use crate::error::{ApiError, Error};

    #[derive(Default)]
    struct MemPendingStore {
        entries: Mutex<HashMap<String, PendingRegistration>>,
    }

    impl PendingStore for MemPendingStore {
        async fn put(&self, email: &str, staged: &PendingRegistration) -> crate::error::Result<()> {
            self.entries
                .lock()
                .unwrap()
                .insert(email.to_string(), staged.clone());
            Ok(())
        }

        async fn get(&self, email: &str) -> crate::error::Result<Option<PendingRegistration>> {
            Ok(self.entries.lock().unwrap().get(email).cloned())
        }

        async fn remove(&self, email: &str) -> crate::error::Result<()> {
            self.entries.lock().unwrap().remove(email);
            Ok(())
        }
    }

    #[derive(Default)]
    struct MemUserStore {
        users: Mutex<HashMap<String, User::Model>>,
        fail_create: bool,
    }

    fn model(email: &str, staged: Option<&PendingRegistration>) -> User::Model {
        let now = TimeDateTimeWithTimeZone::now_utc();
        User::Model {
            id: 1,
            email: email.to_string(),
            is_active: staged.map(|s| s.is_active).unwrap_or(true),
            is_staff: staged.map(|s| s.is_staff).unwrap_or(false),
            is_registered: false,
            created_at: now,
            updated_at: now,
        }
    }

    impl UserStore for MemUserStore {
        async fn find_by_email(&self, email: &str) -> crate::error::Result<Option<User::Model>> {
            Ok(self.users.lock().unwrap().get(email).cloned())
        }

        async fn create(&self, staged: &PendingRegistration) -> crate::error::Result<User::Model> {
            if self.fail_create {
                return Err(Error::Custom("insert failed".to_string()));
            }
            let user = model(&staged.email, Some(staged));
            self.users
                .lock()
                .unwrap()
                .insert(staged.email.clone(), user.clone());
            Ok(user)
        }

        async fn mark_registered(&self, user: User::Model) -> crate::error::Result<User::Model> {
            let mut users = self.users.lock().unwrap();
            let user = users.get_mut(&user.email).expect("user exists");
            user.is_registered = true;
            Ok(user.clone())
        }

        async fn delete_by_email(&self, email: &str) -> crate::error::Result<bool> {
            Ok(self.users.lock().unwrap().remove(email).is_some())
        }
    }

    fn staged(email: &str) -> PendingRegistration {
        PendingRegistration {
            email: email.to_string(),
            is_staff: true,
            is_active: true,
        }
    }

    #[tokio::test]
    async fn test_stage_then_confirm_creates_user() {
        let pending = MemPendingStore::default();
        let users = MemUserStore::default();

        let status = stage(&pending, staged("a@b.org")).await.unwrap();
        assert_eq!(status, RegistrationStatus::Created);

        let status = confirm(&pending, &users, "a@b.org").await.unwrap();
        assert_eq!(status, RegistrationStatus::Confirmed);

        let user = users.find_by_email("a@b.org").await.unwrap().unwrap();
        assert!(user.is_staff);
        assert!(user.is_active);
        assert!(pending.get("a@b.org").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stage_overwrites_previous_entry() {
        let pending = MemPendingStore::default();

        stage(&pending, staged("a@b.org")).await.unwrap();
        let mut second = staged("a@b.org");
        second.is_staff = false;
        stage(&pending, second).await.unwrap();

        let entry = pending.get("a@b.org").await.unwrap().unwrap();
        assert!(!entry.is_staff);
    }

    #[tokio::test]
    async fn test_stage_rejects_invalid_email() {
        let pending = MemPendingStore::default();
        let res = stage(&pending, staged("not-an-email")).await;
        assert!(matches!(
            res,
            Err(Error::ApiError(ApiError::InvalidRequest(_)))
        ));
        assert!(pending.get("not-an-email").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_confirm_existing_user_reports_already_confirmed() {
        let pending = MemPendingStore::default();
        let users = MemUserStore::default();
        users
            .users
            .lock()
            .unwrap()
            .insert("a@b.org".to_string(), model("a@b.org", None));

        stage(&pending, staged("a@b.org")).await.unwrap();
        let status = confirm(&pending, &users, "a@b.org").await.unwrap();
        assert_eq!(status, RegistrationStatus::AlreadyConfirmed);

        let user = users.find_by_email("a@b.org").await.unwrap().unwrap();
        assert!(user.is_registered);
        assert!(pending.get("a@b.org").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_confirm_without_stage_is_not_found() {
        let pending = MemPendingStore::default();
        let users = MemUserStore::default();
        let res = confirm(&pending, &users, "a@b.org").await;
        assert!(matches!(res, Err(Error::ApiError(ApiError::NotFound(_)))));
    }

    #[tokio::test]
    async fn test_failed_create_keeps_pending_entry() {
        let pending = MemPendingStore::default();
        let users = MemUserStore {
            fail_create: true,
            ..Default::default()
        };

        stage(&pending, staged("a@b.org")).await.unwrap();
        assert!(confirm(&pending, &users, "a@b.org").await.is_err());
        // Still staged, so the caller may retry the confirm
        assert!(pending.get("a@b.org").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_rollback_is_idempotent() {
        let pending = MemPendingStore::default();
        let users = MemUserStore::default();

        stage(&pending, staged("a@b.org")).await.unwrap();
        confirm(&pending, &users, "a@b.org").await.unwrap();

        let status = rollback(&pending, &users, "a@b.org").await.unwrap();
        assert_eq!(status, RegistrationStatus::RolledBack);
        assert!(users.find_by_email("a@b.org").await.unwrap().is_none());
        assert!(pending.get("a@b.org").await.unwrap().is_none());

        // Second rollback sees nothing and still reports rolled_back
        let status = rollback(&pending, &users, "a@b.org").await.unwrap();
        assert_eq!(status, RegistrationStatus::RolledBack);
    }
}
