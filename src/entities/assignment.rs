// 🔗 Assignment Entity - Category/user/owner link rows (final `atribuidos`)

use super::FromRow;
use crate::schema::DecodedRow;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: i64,
    pub value: String,
    pub category_id: i64,
    pub user_id: i64,
    pub owner_id: i64,
    pub limit: i64,
    pub trial_limit: i64,
    pub mode: String,
    pub expiry: String,
    pub sub_reseller: i64,
    pub suspended: i64,
    pub monthly_value: String,
    pub notified: String,
}

impl FromRow for Assignment {
    fn from_row(row: &DecodedRow) -> Self {
        Assignment {
            id: row.int("id"),
            value: row.text("value"),
            category_id: row.int("category_id"),
            user_id: row.int("user_id"),
            owner_id: row.int("owner_id"),
            limit: row.int("limit"),
            trial_limit: row.int("trial_limit"),
            mode: row.text("mode"),
            expiry: row.text("expiry"),
            sub_reseller: row.int("sub_reseller"),
            suspended: row.int("suspended"),
            monthly_value: row.text("monthly_value"),
            notified: row.text("notified"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaVersion;
    use crate::splitter::split_fields;

    #[test]
    fn test_assignment_from_short_tuple() {
        // Older panels stop after `limite`
        let fields = split_fields("1,'10.00',5,2,1,30");
        let schema = SchemaVersion::Final.schema_for("atribuidos").unwrap();
        let a = Assignment::from_row(&schema.decode(&fields));

        assert_eq!(a.id, 1);
        assert_eq!(a.value, "10.00");
        assert_eq!(a.category_id, 5);
        assert_eq!(a.user_id, 2);
        assert_eq!(a.owner_id, 1);
        assert_eq!(a.limit, 30);
        assert_eq!(a.mode, "");
        assert_eq!(a.suspended, 0);
    }

    #[test]
    fn test_assignment_from_full_tuple() {
        let fields = split_fields("3,'0',6,4,2,10,2,'credito','2025-01-01 00:00:00',1,0,'5.00','0'");
        let schema = SchemaVersion::Final.schema_for("atribuidos").unwrap();
        let a = Assignment::from_row(&schema.decode(&fields));

        assert_eq!(a.trial_limit, 2);
        assert_eq!(a.mode, "credito");
        assert_eq!(a.expiry, "2025-01-01 00:00:00");
        assert_eq!(a.sub_reseller, 1);
        assert_eq!(a.monthly_value, "5.00");
        assert_eq!(a.notified, "0");
    }
}
