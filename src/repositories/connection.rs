//! Connection repository for database operations
//!
//! Every read and write takes the caller's id and puts it in the `WHERE`
//! clause, so another user's row behaves exactly like a missing one.

use chrono::Utc;
use rolodink_extension::profile::sanitize;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::RepositoryError;
use crate::models::connection::{self, Entity as Connection};

const CONNECTION: &str = "Connection";

/// Fields of a connection being created. `linkedin_url` is already normalized.
#[derive(Debug, Clone)]
pub struct NewConnection {
    pub owner_id: Uuid,
    pub name: String,
    pub linkedin_url: String,
    pub meeting_place: Option<String>,
    pub user_company_at_the_time: Option<String>,
    pub notes: Option<String>,
}

/// Partial update. `None` leaves a column alone; `Some(None)` clears an
/// optional column.
#[derive(Debug, Clone, Default)]
pub struct ConnectionChanges {
    pub name: Option<String>,
    pub meeting_place: Option<Option<String>>,
    pub user_company_at_the_time: Option<Option<String>>,
    pub notes: Option<Option<String>>,
}

impl ConnectionChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.meeting_place.is_none()
            && self.user_company_at_the_time.is_none()
            && self.notes.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameChange {
    pub id: Uuid,
    pub before: String,
    pub after: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanNamesReport {
    pub total: usize,
    pub changes: Vec<NameChange>,
}

#[derive(Debug, Clone)]
pub struct ConnectionRepository {
    pub db: Arc<DatabaseConnection>,
}

impl ConnectionRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn find_owned_by_url(
        &self,
        owner_id: Uuid,
        linkedin_url: &str,
    ) -> Result<Option<connection::Model>, RepositoryError> {
        Ok(Connection::find()
            .filter(connection::Column::OwnerId.eq(owner_id))
            .filter(connection::Column::LinkedinUrl.eq(linkedin_url))
            .one(&*self.db)
            .await?)
    }

    pub async fn find_owned(
        &self,
        owner_id: Uuid,
        id: Uuid,
    ) -> Result<Option<connection::Model>, RepositoryError> {
        Ok(Connection::find_by_id(id)
            .filter(connection::Column::OwnerId.eq(owner_id))
            .one(&*self.db)
            .await?)
    }

    /// All of the owner's connections, newest first.
    pub async fn list_owned(&self, owner_id: Uuid) -> Result<Vec<connection::Model>, RepositoryError> {
        Ok(Connection::find()
            .filter(connection::Column::OwnerId.eq(owner_id))
            .order_by_desc(connection::Column::CreatedAt)
            .order_by_desc(connection::Column::Id)
            .all(&*self.db)
            .await?)
    }

    pub async fn count_owned(&self, owner_id: Uuid) -> Result<u64, RepositoryError> {
        Ok(Connection::find()
            .filter(connection::Column::OwnerId.eq(owner_id))
            .count(&*self.db)
            .await?)
    }

    /// Inserts a connection unless the owner already saved this URL.
    ///
    /// A concurrent insert that slips past the existence check hits the
    /// unique index and surfaces as the same conflict.
    pub async fn create(&self, new: NewConnection) -> Result<connection::Model, RepositoryError> {
        if self
            .find_owned_by_url(new.owner_id, &new.linkedin_url)
            .await?
            .is_some()
        {
            return Err(RepositoryError::Conflict(
                "Connection already exists".to_string(),
            ));
        }

        let now = Utc::now().fixed_offset();
        let model = connection::ActiveModel {
            id: Set(Uuid::new_v4()),
            owner_id: Set(new.owner_id),
            name: Set(new.name),
            linkedin_url: Set(new.linkedin_url),
            meeting_place: Set(new.meeting_place),
            user_company_at_the_time: Set(new.user_company_at_the_time),
            notes: Set(new.notes),
            created_at: Set(now),
            updated_at: Set(now),
        };

        model.insert(&*self.db).await.map_err(|err| match RepositoryError::from(err) {
            RepositoryError::Conflict(_) => {
                RepositoryError::Conflict("Connection already exists".to_string())
            }
            other => other,
        })
    }

    /// Applies `changes` to the owner's connection `id`.
    pub async fn update_owned(
        &self,
        owner_id: Uuid,
        id: Uuid,
        changes: ConnectionChanges,
    ) -> Result<connection::Model, RepositoryError> {
        let mut update = Connection::update_many()
            .col_expr(
                connection::Column::UpdatedAt,
                Expr::value(Utc::now().fixed_offset()),
            )
            .filter(connection::Column::Id.eq(id))
            .filter(connection::Column::OwnerId.eq(owner_id));

        if let Some(name) = changes.name {
            update = update.col_expr(connection::Column::Name, Expr::value(name));
        }
        if let Some(meeting_place) = changes.meeting_place {
            update = update.col_expr(connection::Column::MeetingPlace, Expr::value(meeting_place));
        }
        if let Some(company) = changes.user_company_at_the_time {
            update = update.col_expr(
                connection::Column::UserCompanyAtTheTime,
                Expr::value(company),
            );
        }
        if let Some(notes) = changes.notes {
            update = update.col_expr(connection::Column::Notes, Expr::value(notes));
        }

        let result = update.exec(&*self.db).await?;
        if result.rows_affected == 0 {
            return Err(RepositoryError::NotFound(CONNECTION));
        }

        self.find_owned(owner_id, id)
            .await?
            .ok_or(RepositoryError::NotFound(CONNECTION))
    }

    pub async fn delete_owned(&self, owner_id: Uuid, id: Uuid) -> Result<(), RepositoryError> {
        let result = Connection::delete_many()
            .filter(connection::Column::Id.eq(id))
            .filter(connection::Column::OwnerId.eq(owner_id))
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(RepositoryError::NotFound(CONNECTION));
        }
        Ok(())
    }

    /// Re-runs the name sanitizer over every stored name of the owner.
    ///
    /// Names that would sanitize to nothing are left as they are.
    pub async fn clean_names(&self, owner_id: Uuid) -> Result<CleanNamesReport, RepositoryError> {
        let connections = Connection::find()
            .filter(connection::Column::OwnerId.eq(owner_id))
            .order_by_asc(connection::Column::CreatedAt)
            .all(&*self.db)
            .await?;

        let total = connections.len();
        let mut changes = Vec::new();

        for row in connections {
            let cleaned = sanitize(&row.name);
            if cleaned.is_empty() || cleaned == row.name {
                continue;
            }

            Connection::update_many()
                .col_expr(connection::Column::Name, Expr::value(cleaned.clone()))
                .col_expr(
                    connection::Column::UpdatedAt,
                    Expr::value(Utc::now().fixed_offset()),
                )
                .filter(connection::Column::Id.eq(row.id))
                .filter(connection::Column::OwnerId.eq(owner_id))
                .exec(&*self.db)
                .await?;

            changes.push(NameChange {
                id: row.id,
                before: row.name,
                after: cleaned,
            });
        }

        Ok(CleanNamesReport { total, changes })
    }

    /// Up to `limit` connections, oldest first, plus whether more exist.
    pub async fn export_owned(
        &self,
        owner_id: Uuid,
        limit: u64,
    ) -> Result<(Vec<connection::Model>, bool), RepositoryError> {
        let mut rows = Connection::find()
            .filter(connection::Column::OwnerId.eq(owner_id))
            .order_by_asc(connection::Column::CreatedAt)
            .order_by_asc(connection::Column::Id)
            .limit(limit.saturating_add(1))
            .all(&*self.db)
            .await?;

        let truncated = rows.len() as u64 > limit;
        rows.truncate(limit as usize);
        Ok((rows, truncated))
    }
}
