// Entity Models - one record type per dump table kind
//
// Each entity:
// - Decodes from a DecodedRow by logical attribute name (both schema versions)
// - Stays immutable after decoding; enrichment works on copies
// - Has a Registry where cross-table lookups need one

pub mod assignment;
pub mod category;
pub mod end_user;
pub mod reseller;

pub use assignment::Assignment;
pub use category::{Category, CategoryRegistry};
pub use end_user::EndUser;
pub use reseller::{Reseller, ResellerRegistry};

use crate::schema::{DecodedRow, DecodedTables, TableKind};
use serde::{Deserialize, Serialize};

/// Id of the root/admin account in every dump
pub const ROOT_ID: i64 = 1;

/// Build a typed record from a decoded row
pub trait FromRow {
    fn from_row(row: &DecodedRow) -> Self;
}

/// Typed tables of one dump, in source order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DumpTables {
    pub categories: Vec<Category>,
    pub resellers: Vec<Reseller>,
    pub end_users: Vec<EndUser>,
    pub assignments: Vec<Assignment>,
}

impl DumpTables {
    pub fn from_decoded(tables: &DecodedTables) -> Self {
        DumpTables {
            categories: collect(tables, TableKind::Category),
            resellers: collect(tables, TableKind::Reseller),
            end_users: collect(tables, TableKind::EndUser),
            assignments: collect(tables, TableKind::Assignment),
        }
    }

    pub fn total_records(&self) -> usize {
        self.categories.len() + self.resellers.len() + self.end_users.len() + self.assignments.len()
    }
}

fn collect<T: FromRow>(tables: &DecodedTables, kind: TableKind) -> Vec<T> {
    tables.rows_of(kind).iter().map(T::from_row).collect()
}

/// Blank or the SQL literal NULL (dumps carry it unquoted)
pub fn is_blank(value: &str) -> bool {
    let v = value.trim();
    v.is_empty() || v.eq_ignore_ascii_case("NULL")
}
