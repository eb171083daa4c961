//! Typed queries for notification rows.

use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
};
use uuid::Uuid;

use crate::entity::notification::{ActiveModel, Column, Entity as Notification};

use super::errors::Result;

/// Insert a notification row, ignoring the duplicate-key conflict on
/// `(user_id, package_name, new_version)`.
///
/// Returns true when a row was actually inserted, false when an identical
/// dispatch already happened — the idempotent re-dispatch path.
pub async fn insert_if_absent(db: &DatabaseConnection, model: ActiveModel) -> Result<bool> {
    let rows = Notification::insert(model)
        .on_conflict(
            OnConflict::columns([Column::UserId, Column::PackageName, Column::NewVersion])
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(db)
        .await?;

    Ok(rows > 0)
}

/// Mark a notification as read. The only permitted mutation of an
/// existing row.
pub async fn mark_read(db: &DatabaseConnection, id: Uuid) -> Result<bool> {
    let result = Notification::update_many()
        .col_expr(Column::Read, Expr::value(true))
        .filter(Column::Id.eq(id))
        .exec(db)
        .await?;

    Ok(result.rows_affected == 1)
}

/// Count a user's unread notifications.
pub async fn unread_count(db: &DatabaseConnection, user_id: Uuid) -> Result<u64> {
    let count = Notification::find()
        .filter(Column::UserId.eq(user_id))
        .filter(Column::Read.eq(false))
        .count(db)
        .await?;

    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::severity::Severity;
    use chrono::Utc;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult, Set};

    fn model() -> ActiveModel {
        ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(Uuid::new_v4()),
            package_name: Set("left-pad".to_string()),
            new_version: Set("2.0.0".to_string()),
            previous_version: Set(Some("1.3.0".to_string())),
            severity: Set(Severity::Important),
            is_security_update: Set(false),
            is_breaking_change: Set(true),
            changelog_snippet: Set(None),
            vulnerabilities_fixed: Set(serde_json::json!([])),
            read: Set(false),
            created_at: Set(Utc::now()),
        }
    }

    #[tokio::test]
    async fn insert_if_absent_reports_fresh_insert() {
        let db = MockDatabase::new(DatabaseBackend::Sqlite)
            .append_exec_results([MockExecResult {
                rows_affected: 1,
                last_insert_id: 0,
            }])
            .into_connection();

        assert!(insert_if_absent(&db, model()).await.expect("insert"));
    }

    #[tokio::test]
    async fn insert_if_absent_reports_conflict_as_noop() {
        let db = MockDatabase::new(DatabaseBackend::Sqlite)
            .append_exec_results([MockExecResult {
                rows_affected: 0,
                last_insert_id: 0,
            }])
            .into_connection();

        assert!(!insert_if_absent(&db, model()).await.expect("insert"));
    }

    #[tokio::test]
    async fn mark_read_reports_missing_rows() {
        let db = MockDatabase::new(DatabaseBackend::Sqlite)
            .append_exec_results([
                MockExecResult {
                    rows_affected: 1,
                    last_insert_id: 0,
                },
                MockExecResult {
                    rows_affected: 0,
                    last_insert_id: 0,
                },
            ])
            .into_connection();

        assert!(mark_read(&db, Uuid::new_v4()).await.expect("update"));
        assert!(!mark_read(&db, Uuid::new_v4()).await.expect("update"));
    }
}
