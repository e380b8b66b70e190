use serde::{Deserialize, Serialize};

use crate::cache_manager::region::Region;

/// Operation kinds that can trigger cache invalidation (§4.2 "Invalidation
/// policy"). `Ddl`/`Dml` are umbrella kinds a caller may pass directly when
/// it doesn't know (or care about) the specific statement kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvalidationKind {
    Create,
    Drop,
    Alter,
    Insert,
    Update,
    Delete,
    Ddl,
    Dml,
}

impl InvalidationKind {
    fn is_full_ddl(self) -> bool {
        matches!(self, InvalidationKind::Create | InvalidationKind::Drop | InvalidationKind::Ddl)
    }

    fn is_alter(self) -> bool {
        matches!(self, InvalidationKind::Alter)
    }

    fn is_dml(self) -> bool {
        matches!(
            self,
            InvalidationKind::Insert | InvalidationKind::Update | InvalidationKind::Delete | InvalidationKind::Dml
        )
    }
}

/// What an invalidation of `kind` against an optional `table` should do,
/// expressed as data so the cache manager can execute it without a long
/// match arm duplicated at the call site.
pub enum InvalidationPlan {
    /// `CREATE`/`DROP`/`DDL`: clear every region.
    ClearAll,
    /// `ALTER`: invalidate the table in these regions, plus query-cache
    /// entries referencing it.
    TableInRegions { table: String, regions: Vec<Region> },
    /// `INSERT`/`UPDATE`/`DELETE`/`DML`: same shape as `TableInRegions` but
    /// a wider region set.
    /// A table-specific kind that arrived without a table name clears the
    /// whole `QUERY_RESULT` region (§4.2).
    ClearQueryResult,
}

pub fn plan(kind: InvalidationKind, table: Option<&str>) -> InvalidationPlan {
    if kind.is_full_ddl() {
        return InvalidationPlan::ClearAll;
    }
    match table {
        Some(table) if kind.is_alter() => InvalidationPlan::TableInRegions {
            table: table.to_string(),
            regions: vec![Region::Schema, Region::Index],
        },
        Some(table) if kind.is_dml() => InvalidationPlan::TableInRegions {
            table: table.to_string(),
            regions: vec![Region::Schema, Region::TableExists, Region::Index],
        },
        None => InvalidationPlan::ClearQueryResult,
        Some(table) => InvalidationPlan::TableInRegions {
            table: table.to_string(),
            regions: vec![Region::Schema, Region::TableExists, Region::Index],
        },
    }
}
