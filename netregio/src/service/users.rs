use sea_orm::{
    prelude::*, sea_query, ActiveValue::Set, DatabaseConnection, TransactionTrait,
};

use crate::{entity::users as User, error::Error, schema::PendingRegistration};

/// Durable user persistence behind the registration workflow.
pub trait UserStore {
    fn find_by_email(
        &self,
        email: &str,
    ) -> impl std::future::Future<Output = crate::error::Result<Option<User::Model>>>;
    fn create(
        &self,
        staged: &PendingRegistration,
    ) -> impl std::future::Future<Output = crate::error::Result<User::Model>>;
    fn mark_registered(
        &self,
        user: User::Model,
    ) -> impl std::future::Future<Output = crate::error::Result<User::Model>>;
    fn delete_by_email(
        &self,
        email: &str,
    ) -> impl std::future::Future<Output = crate::error::Result<bool>>;
}

impl UserStore for DatabaseConnection {
    async fn find_by_email(&self, email: &str) -> crate::error::Result<Option<User::Model>> {
        Ok(User::Entity::find()
            .filter(User::Column::Email.eq(email))
            .one(self)
            .await?)
    }

    async fn create(&self, staged: &PendingRegistration) -> crate::error::Result<User::Model> {
        let staged = staged.clone();
        let user = self
            .transaction::<_, User::Model, Error>(|txn| {
                Box::pin(async move {
                    let now = TimeDateTimeWithTimeZone::now_utc();
                    let user = User::ActiveModel {
                        email: Set(staged.email.clone()),
                        is_active: Set(staged.is_active),
                        is_staff: Set(staged.is_staff),
                        created_at: Set(now),
                        updated_at: Set(now),
                        ..Default::default()
                    };
                    let user = User::Entity::insert(user)
                        .on_conflict(
                            sea_query::OnConflict::column(User::Column::Email)
                                .do_nothing()
                                .to_owned(),
                        )
                        .exec_with_returning(txn)
                        .await?;
                    Ok(user)
                })
            })
            .await?;
        Ok(user)
    }

    async fn mark_registered(&self, user: User::Model) -> crate::error::Result<User::Model> {
        let user = User::ActiveModel {
            id: Set(user.id),
            is_registered: Set(true),
            updated_at: Set(TimeDateTimeWithTimeZone::now_utc()),
            ..Default::default()
        };
        Ok(user.update(self).await?)
    }

    async fn delete_by_email(&self, email: &str) -> crate::error::Result<bool> {
        let res = User::Entity::delete_many()
            .filter(User::Column::Email.eq(email))
            .exec(self)
            .await?;
        Ok(res.rows_affected > 0)
    }
}
