// 👤 EndUser Entity - Customer accounts (legacy `usuarios`, final `ssh_accounts`)
//
// References a Reseller through `parent_id` and a Category through `sub_id`.

use super::FromRow;
use crate::schema::DecodedRow;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EndUser {
    pub id: i64,
    pub parent_id: i64,
    /// Category reference (matches Category::sub_id)
    pub sub_id: i64,

    pub login: String,
    pub password: String,
    pub name: String,
    pub expiry: String,
    pub contact: String,
    pub whatsapp: String,
    pub telegram: String,
    /// External unique identifier (client UUID)
    pub uuid: String,

    pub value: f64,
    pub notified: i64,
    pub status: i64,
    pub limit: i64,
    pub suspended: i64,
    pub period: i64,
    pub trial: i64,

    // Final layout only
    pub by_credit: i64,
    pub group_key: String,
    pub last_view: String,
    pub monthly_value: String,
    pub device_id: String,
    pub device_active: String,
}

impl FromRow for EndUser {
    fn from_row(row: &DecodedRow) -> Self {
        EndUser {
            id: row.int("id"),
            parent_id: row.int("parent_id"),
            sub_id: row.int("sub_id"),
            login: row.text("login"),
            password: row.text("password"),
            name: row.text("name"),
            expiry: row.text("expiry"),
            contact: row.text("contact"),
            whatsapp: row.text("whatsapp"),
            telegram: row.text("telegram"),
            uuid: row.text("uuid"),
            value: row.float("value"),
            notified: row.int("notified"),
            status: row.int("status"),
            limit: row.int("limit"),
            suspended: row.int("suspended"),
            period: row.int("period"),
            trial: row.int("trial"),
            by_credit: row.int("by_credit"),
            group_key: row.text("group_key"),
            last_view: row.text("last_view"),
            monthly_value: row.text("monthly_value"),
            device_id: row.text("device_id"),
            device_active: row.text("device_active"),
        }
    }
}
