// 🏷️ Category Entity - Plan/category rows looked up by sub id
//
// Records reference categories through `subid`, not `id`.
// Uniqueness of `subid` is assumed, not enforced: first match wins.

use super::FromRow;
use crate::schema::DecodedRow;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Name reported when no category matches a sub id
pub const CATEGORY_NOT_FOUND: &str = "category not found";

// ============================================================================
// CATEGORY ENTITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub sub_id: i64,
    pub name: String,
}

impl Category {
    pub fn new(id: i64, sub_id: i64, name: impl Into<String>) -> Self {
        Category {
            id,
            sub_id,
            name: name.into(),
        }
    }
}

impl FromRow for Category {
    fn from_row(row: &DecodedRow) -> Self {
        Category {
            id: row.int("id"),
            sub_id: row.int("sub_id"),
            name: row.text("name"),
        }
    }
}

// ============================================================================
// CATEGORY REGISTRY
// ============================================================================

/// One-time index over a dump's categories (sub_id → position).
///
/// Built once per conversion run so lookups stay O(1) while keeping the
/// first-match-wins behavior of a linear scan.
pub struct CategoryRegistry<'a> {
    categories: &'a [Category],
    by_sub_id: HashMap<i64, usize>,
}

impl<'a> CategoryRegistry<'a> {
    pub fn new(categories: &'a [Category]) -> Self {
        let mut by_sub_id = HashMap::with_capacity(categories.len());
        for (idx, category) in categories.iter().enumerate() {
            by_sub_id.entry(category.sub_id).or_insert(idx);
        }

        CategoryRegistry {
            categories,
            by_sub_id,
        }
    }

    /// Find category by sub id (first match)
    pub fn find_by_sub_id(&self, sub_id: i64) -> Option<&'a Category> {
        self.by_sub_id
            .get(&sub_id)
            .map(|&idx| &self.categories[idx])
    }

    /// Category name for a sub id; callers fall back to CATEGORY_NOT_FOUND
    pub fn name_for(&self, sub_id: i64) -> Option<&'a str> {
        self.find_by_sub_id(sub_id).map(|c| c.name.as_str())
    }

    /// Sub ids that appear on more than one category
    pub fn duplicate_sub_ids(&self) -> Vec<i64> {
        let mut seen: HashMap<i64, usize> = HashMap::new();
        for category in self.categories {
            *seen.entry(category.sub_id).or_insert(0) += 1;
        }

        let mut duplicates: Vec<i64> = seen
            .into_iter()
            .filter(|(_, count)| *count > 1)
            .map(|(sub_id, _)| sub_id)
            .collect();
        duplicates.sort_unstable();
        duplicates
    }

    pub fn count(&self) -> usize {
        self.categories.len()
    }
}

// ============================================================================
// TESTS
// ============================================================================
