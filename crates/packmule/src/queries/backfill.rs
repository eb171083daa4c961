//! Typed queries for the backfill state row and the stored package
//! universe.
//!
//! The state row is the single piece of cross-process shared mutable
//! state; every write is a conditional update on the `version` token so a
//! lost race surfaces as `false` instead of a silent overwrite.

use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};

use crate::entity::backfill_package::{
    ActiveModel as PackageActiveModel, Column as PackageColumn, Entity as BackfillPackage,
};
use crate::entity::backfill_state::{
    Column, Entity as BackfillState, Model, SINGLETON_ID,
};

use super::errors::Result;

/// Load the singleton state row, creating it lazily on first access.
pub async fn load_or_init(db: &DatabaseConnection) -> Result<Model> {
    if let Some(model) = BackfillState::find_by_id(SINGLETON_ID).one(db).await? {
        return Ok(model);
    }

    let initial = Model::initial();
    let active = crate::entity::backfill_state::ActiveModel {
        id: Set(initial.id),
        status: Set(initial.status),
        total: Set(initial.total),
        offset: Set(initial.offset),
        started_at: Set(initial.started_at),
        rate: Set(initial.rate),
        error_message: Set(initial.error_message.clone()),
        version: Set(initial.version),
    };

    // Two workers may race on first access; the conflict-ignore makes the
    // loser a no-op and both observe the same initial row.
    BackfillState::insert(active)
        .on_conflict(OnConflict::column(Column::Id).do_nothing().to_owned())
        .exec_without_returning(db)
        .await?;

    Ok(initial)
}

/// Conditionally write `state`, succeeding only when the stored version
/// still equals `expected_version`. The stored version is bumped on
/// success.
///
/// Returns false when another writer got there first; the caller reloads
/// and re-decides instead of overwriting.
pub async fn compare_and_swap(
    db: &DatabaseConnection,
    expected_version: i64,
    state: &Model,
) -> Result<bool> {
    let result = BackfillState::update_many()
        .col_expr(Column::Status, Expr::value(state.status))
        .col_expr(Column::Total, Expr::value(state.total))
        .col_expr(Column::Offset, Expr::value(state.offset))
        .col_expr(Column::StartedAt, Expr::value(state.started_at))
        .col_expr(Column::Rate, Expr::value(state.rate))
        .col_expr(
            Column::ErrorMessage,
            Expr::value(state.error_message.clone()),
        )
        .col_expr(Column::Version, Expr::value(expected_version + 1))
        .filter(Column::Id.eq(SINGLETON_ID))
        .filter(Column::Version.eq(expected_version))
        .exec(db)
        .await?;

    Ok(result.rows_affected == 1)
}

/// Append a listing batch to the stored package universe.
///
/// Positions are assigned sequentially from `start_position` in listing
/// order. Re-running the same batch after a crash conflicts on position
/// and is ignored.
pub async fn append_packages(
    db: &DatabaseConnection,
    start_position: u64,
    names: &[String],
) -> Result<u64> {
    if names.is_empty() {
        return Ok(0);
    }

    let models: Vec<PackageActiveModel> = names
        .iter()
        .enumerate()
        .map(|(i, name)| PackageActiveModel {
            position: Set(start_position as i64 + i as i64),
            name: Set(name.clone()),
        })
        .collect();

    let count = models.len() as u64;
    BackfillPackage::insert_many(models)
        .on_conflict(
            OnConflict::column(PackageColumn::Position)
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(db)
        .await?;

    Ok(count)
}

/// Read the next `limit` package names from the stored universe starting
/// at `offset`, in listing order.
pub async fn package_slice(
    db: &DatabaseConnection,
    offset: u64,
    limit: u64,
) -> Result<Vec<String>> {
    let rows = BackfillPackage::find()
        .filter(PackageColumn::Position.gte(offset as i64))
        .order_by_asc(PackageColumn::Position)
        .limit(limit)
        .all(db)
        .await?;

    Ok(rows.into_iter().map(|row| row.name).collect())
}

/// Drop the stored universe (part of an operator reset).
pub async fn clear_packages(db: &DatabaseConnection) -> Result<u64> {
    let result = BackfillPackage::delete_many().exec(db).await?;
    Ok(result.rows_affected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::backfill_status::BackfillStatus;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    #[tokio::test]
    async fn load_or_init_returns_existing_row() {
        let mut existing = Model::initial();
        existing.status = BackfillStatus::Running;
        existing.version = 4;

        let db = MockDatabase::new(DatabaseBackend::Sqlite)
            .append_query_results([vec![existing.clone()]])
            .into_connection();

        let loaded = load_or_init(&db).await.expect("load should succeed");
        assert_eq!(loaded.status, BackfillStatus::Running);
        assert_eq!(loaded.version, 4);
    }

    #[tokio::test]
    async fn load_or_init_creates_the_singleton_lazily() {
        let db = MockDatabase::new(DatabaseBackend::Sqlite)
            .append_query_results([Vec::<Model>::new()])
            .append_exec_results([MockExecResult {
                rows_affected: 1,
                last_insert_id: 0,
            }])
            .into_connection();

        let loaded = load_or_init(&db).await.expect("init should succeed");
        assert_eq!(loaded, Model::initial());
    }

    #[tokio::test]
    async fn compare_and_swap_reports_success_and_loss() {
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

        let state = Model::initial();
        assert!(compare_and_swap(&db, 0, &state).await.expect("first CAS"));
        assert!(!compare_and_swap(&db, 0, &state).await.expect("second CAS"));
    }

    #[tokio::test]
    async fn append_packages_skips_empty_batches() {
        let db = MockDatabase::new(DatabaseBackend::Sqlite).into_connection();
        let count = append_packages(&db, 0, &[]).await.expect("empty append");
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn append_packages_returns_batch_size() {
        let db = MockDatabase::new(DatabaseBackend::Sqlite)
            .append_exec_results([MockExecResult {
                rows_affected: 2,
                last_insert_id: 0,
            }])
            .into_connection();

        let names = vec!["a".to_string(), "b".to_string()];
        let count = append_packages(&db, 10, &names).await.expect("append");
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn package_slice_maps_rows_to_names() {
        use crate::entity::backfill_package::Model as PackageModel;

        let db = MockDatabase::new(DatabaseBackend::Sqlite)
            .append_query_results([vec![
                PackageModel {
                    position: 5,
                    name: "left-pad".to_string(),
                },
                PackageModel {
                    position: 6,
                    name: "lodash".to_string(),
                },
            ]])
            .into_connection();

        let names = package_slice(&db, 5, 2).await.expect("slice");
        assert_eq!(names, vec!["left-pad", "lodash"]);
    }
}
