//! # User Repository
//!
//! Local mirror rows for auth-provider identities and account deletion.

use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, Set, TransactionTrait,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::RepositoryError;
use crate::models::connection::{self, Entity as Connection};
use crate::models::user::{self, Entity as User};

#[derive(Debug, Clone)]
pub struct UserRepository {
    pub db: Arc<DatabaseConnection>,
}

impl UserRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn find(&self, id: Uuid) -> Result<Option<user::Model>, RepositoryError> {
        Ok(User::find_by_id(id).one(&*self.db).await?)
    }

    /// Inserts the user row, or refreshes its email if it already exists.
    pub async fn ensure(&self, id: Uuid, email: &str) -> Result<user::Model, RepositoryError> {
        let now = Utc::now().fixed_offset();
        let row = user::ActiveModel {
            id: Set(id),
            email: Set(email.to_string()),
            created_at: Set(now),
            updated_at: Set(now),
        };

        User::insert(row)
            .on_conflict(
                OnConflict::column(user::Column::Id)
                    .update_columns([user::Column::Email, user::Column::UpdatedAt])
                    .to_owned(),
            )
            .exec_without_returning(&*self.db)
            .await?;

        self.find(id)
            .await?
            .ok_or(RepositoryError::NotFound("User"))
    }

    /// Deletes every connection of the user and then the user row, in one
    /// transaction. Returns the number of connections removed.
    ///
    /// A missing user row aborts and rolls back the transaction.
    pub async fn delete_account(&self, id: Uuid) -> Result<u64, RepositoryError> {
        let txn = self.db.begin().await?;

        let outcome = async {
            let connections = Connection::delete_many()
                .filter(connection::Column::OwnerId.eq(id))
                .exec(&txn)
                .await?;
            let users = User::delete_by_id(id).exec(&txn).await?;
            if users.rows_affected == 0 {
                return Err(DbErr::RecordNotFound(format!("user {id}")));
            }
            Ok(connections.rows_affected)
        }
        .await;

        match outcome {
            Ok(deleted) => {
                txn.commit().await?;
                Ok(deleted)
            }
            Err(err) => {
                if let Err(rollback_err) = txn.rollback().await {
                    tracing::error!(error = %rollback_err, "rollback after failed account deletion failed");
                }
                Err(RepositoryError::Database(err))
            }
        }
    }
}
