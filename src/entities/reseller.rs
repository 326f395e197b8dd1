// 🏪 Reseller Entity - Parent-capable accounts (legacy `revenda`, final `accounts`)
//
// Hierarchy is self-referential through `parent_id`.
// The root/admin identity is id == ROOT_ID, or any record whose parent is ROOT_ID.

use super::{FromRow, ROOT_ID};
use crate::schema::DecodedRow;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Owner login reported for the root identity
pub const ROOT_OWNER: &str = "admin";

/// Owner login reported when the parent reference matches no reseller
pub const UNKNOWN_OWNER: &str = "unknown";

// ============================================================================
// RESELLER ENTITY
// ============================================================================

/// Reseller - union of the legacy and final layouts.
///
/// Columns a layout does not carry stay at their zero value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reseller {
    // ========================================================================
    // IDENTITY & HIERARCHY
    // ========================================================================
    pub id: i64,
    pub parent_id: i64,

    // ========================================================================
    // CREDENTIALS & CONTACT
    // ========================================================================
    pub login: String,
    pub password: String,
    pub name: String,
    pub contact: String,
    pub whatsapp: String,
    pub telegram: String,

    // ========================================================================
    // MONETARY & LIMITS (legacy)
    // ========================================================================
    pub value: f64,
    pub limit: i64,
    pub limit_used: i64,
    pub mode: String,
    pub expiry: String,
    pub category_id: i64,
    pub sub: i64,
    pub expired: i64,
    pub notified: i64,

    // ========================================================================
    // MESSAGES & TRIAL SETTINGS (legacy)
    // ========================================================================
    pub reseller_text: String,
    pub user_text: String,
    pub api_key: String,
    pub trial_text: String,
    pub trial_value: f64,
    pub trial_v2ray: i64,

    // ========================================================================
    // PANEL SETTINGS (final)
    // ========================================================================
    pub group_key: String,
    pub token: String,
    pub mb: String,
    pub access_token: String,
    pub user_price: String,
    pub reseller_price: String,
    pub duration: String,
    pub sale_token: String,
    pub payment_token: String,
    pub payment_method: String,
}

impl Reseller {
    /// The record is the root identity itself
    pub fn is_root(&self) -> bool {
        self.id == ROOT_ID
    }

    /// The record is root or hangs directly under root
    pub fn is_owned_by_root(&self) -> bool {
        self.is_root() || self.parent_id == ROOT_ID
    }
}

impl FromRow for Reseller {
    fn from_row(row: &DecodedRow) -> Self {
        Reseller {
            id: row.int("id"),
            parent_id: row.int("parent_id"),
            login: row.text("login"),
            password: row.text("password"),
            name: row.text("name"),
            contact: row.text("contact"),
            whatsapp: row.text("whatsapp"),
            telegram: row.text("telegram"),
            value: row.float("value"),
            limit: row.int("limit"),
            limit_used: row.int("limit_used"),
            mode: row.text("mode"),
            expiry: row.text("expiry"),
            category_id: row.int("category_id"),
            sub: row.int("sub"),
            expired: row.int("expired"),
            notified: row.int("notified"),
            reseller_text: row.text("reseller_text"),
            user_text: row.text("user_text"),
            api_key: row.text("api_key"),
            trial_text: row.text("trial_text"),
            trial_value: row.float("trial_value"),
            trial_v2ray: row.int("trial_v2ray"),
            group_key: row.text("group_key"),
            token: row.text("token"),
            mb: row.text("mb"),
            access_token: row.text("access_token"),
            user_price: row.text("user_price"),
            reseller_price: row.text("reseller_price"),
            duration: row.text("duration"),
            sale_token: row.text("sale_token"),
            payment_token: row.text("payment_token"),
            payment_method: row.text("payment_method"),
        }
    }
}

// ============================================================================
// RESELLER REGISTRY
// ============================================================================

/// One-time index id → reseller (first record with a given id wins)
pub struct ResellerRegistry<'a> {
    resellers: &'a [Reseller],
    by_id: HashMap<i64, usize>,
}

impl<'a> ResellerRegistry<'a> {
    pub fn new(resellers: &'a [Reseller]) -> Self {
        let mut by_id = HashMap::with_capacity(resellers.len());
        for (idx, reseller) in resellers.iter().enumerate() {
            by_id.entry(reseller.id).or_insert(idx);
        }

        ResellerRegistry { resellers, by_id }
    }

    pub fn find_by_id(&self, id: i64) -> Option<&'a Reseller> {
        self.by_id.get(&id).map(|&idx| &self.resellers[idx])
    }

    /// Resolve the owner login of a record given its own id and declared parent.
    ///
    /// Root identity (own id or parent id == ROOT_ID) → Some(ROOT_OWNER).
    /// Parent not found → None; callers report UNKNOWN_OWNER.
    pub fn owner_login(&self, id: i64, parent_id: i64) -> Option<&'a str> {
        if id == ROOT_ID || parent_id == ROOT_ID {
            return Some(ROOT_OWNER);
        }

        self.find_by_id(parent_id).map(|r| r.login.as_str())
    }

    pub fn count(&self) -> usize {
        self.resellers.len()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaVersion;

    fn reseller(id: i64, parent_id: i64, login: &str) -> Reseller {
        Reseller {
            id,
            parent_id,
            login: login.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_reseller_from_legacy_row() {
        let schema = SchemaVersion::Legacy.schema_for("revenda").unwrap();
        let fields: Vec<String> = [
            "2", "1", "ana", "secret", "5511999990000", "25.50", "30", " validade ",
            "2024-06-01", "3", "5", "0", "0",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        let r = Reseller::from_row(&schema.decode(&fields));

        assert_eq!(r.id, 2);
        assert_eq!(r.parent_id, 1);
        assert_eq!(r.login, "ana");
        assert_eq!(r.contact, "5511999990000");
        assert_eq!(r.value, 25.50);
        assert_eq!(r.limit, 30);
        assert_eq!(r.mode, "validade");
        assert_eq!(r.expiry, "2024-06-01");
        assert_eq!(r.category_id, 5);
        assert_eq!(r.api_key, "");
        assert_eq!(r.group_key, "");
    }

    #[test]
    fn test_reseller_from_final_row() {
        let schema = SchemaVersion::Final.schema_for("accounts").unwrap();
        let fields: Vec<String> = [
            "4", "Caio", "NULL", "caio", "tok", "100", "pw", "2", "123456", "at",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        let r = Reseller::from_row(&schema.decode(&fields));

        assert_eq!(r.id, 4);
        assert_eq!(r.parent_id, 2);
        assert_eq!(r.name, "Caio");
        assert_eq!(r.contact, "NULL");
        assert_eq!(r.group_key, "123456");
        assert_eq!(r.access_token, "at");
        assert_eq!(r.payment_method, "");
    }

    #[test]
    fn test_root_detection() {
        assert!(reseller(1, 0, "admin").is_root());
        assert!(reseller(2, 1, "ana").is_owned_by_root());
        assert!(!reseller(3, 2, "caio").is_owned_by_root());
    }

    #[test]
    fn test_owner_login_root_sentinel() {
        let resellers = vec![reseller(1, 0, "boss"), reseller(2, 1, "ana")];
        let registry = ResellerRegistry::new(&resellers);

        assert_eq!(registry.owner_login(1, 0), Some(ROOT_OWNER));
        assert_eq!(registry.owner_login(2, 1), Some(ROOT_OWNER));
    }

    #[test]
    fn test_owner_login_parent_lookup() {
        let resellers = vec![reseller(1, 0, "boss"), reseller(2, 1, "ana")];
        let registry = ResellerRegistry::new(&resellers);

        // A child of reseller 2 resolves to ana, not to the root sentinel
        assert_eq!(registry.owner_login(10, 2), Some("ana"));
    }

    #[test]
    fn test_owner_login_unknown_parent() {
        let resellers = vec![reseller(2, 1, "ana")];
        let registry = ResellerRegistry::new(&resellers);

        assert_eq!(registry.owner_login(3, 77), None);
        assert_eq!(registry.owner_login(3, 77).unwrap_or(UNKNOWN_OWNER), UNKNOWN_OWNER);
    }

    #[test]
    fn test_registry_first_id_wins() {
        let resellers = vec![reseller(2, 1, "first"), reseller(2, 1, "second")];
        let registry = ResellerRegistry::new(&resellers);
        assert_eq!(registry.find_by_id(2).unwrap().login, "first");
        assert_eq!(registry.count(), 2);
    }
}
