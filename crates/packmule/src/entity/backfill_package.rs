//! Stored package-name universe for the backfill.
//!
//! The lister appends every discovered name here in listing order; ticks
//! drain bounded slices by position. The table is what makes the backfill
//! resumable after a crash without re-listing the registry.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "backfill_packages")]
pub struct Model {
    /// Zero-based position in listing order.
    #[sea_orm(primary_key, auto_increment = false)]
    pub position: i64,

    pub name: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
