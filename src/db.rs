// 🗄️ Relational Sink - Snapshot → SQLite tables
//
// Four destination tables: categories, accounts, end_user_accounts, assignments.
// One load = one SQLite transaction; any failure rolls the whole load back.

use crate::enrichment::ROOT_GROUP_KEY;
use crate::entities::reseller::ROOT_OWNER;
use crate::export::{
    FinalSnapshot, LegacySnapshot, Snapshot, CONTACT_PLACEHOLDER, RESELLER_ACCESS_LEVEL,
    ROOT_ACCESS_LEVEL,
};
use anyhow::{Context, Result};
use rusqlite::{params, Connection, Transaction};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

/// Access level stored for end-user rows
pub const END_USER_ACCESS_LEVEL: i64 = 1;

/// Destination tables in load order
pub const SINK_TABLES: &[&str] = &["categories", "accounts", "end_user_accounts", "assignments"];

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // ==========================================================================
    // Categories
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS categories (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            sub_id INTEGER NOT NULL,
            name TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Accounts (resellers + root)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS accounts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            contact TEXT NOT NULL,
            email TEXT NOT NULL,
            login TEXT NOT NULL,
            password TEXT NOT NULL,
            parent_id INTEGER NOT NULL DEFAULT 0,
            group_key TEXT NOT NULL DEFAULT '0',
            access_token TEXT,
            user_price TEXT,
            reseller_price TEXT,
            access_level INTEGER NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // End-user accounts
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS end_user_accounts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            parent_id INTEGER NOT NULL DEFAULT 0,
            category_id INTEGER NOT NULL,
            user_limit INTEGER NOT NULL,
            login TEXT NOT NULL,
            name TEXT NOT NULL,
            password TEXT NOT NULL,
            group_key TEXT NOT NULL DEFAULT '0',
            expiry TEXT NOT NULL,
            uuid TEXT,
            contact TEXT NOT NULL,
            access_level INTEGER NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Assignments (category/user/owner links)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS assignments (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            value TEXT NOT NULL,
            category_id INTEGER NOT NULL,
            user_id INTEGER NOT NULL,
            owner_id INTEGER NOT NULL,
            user_limit INTEGER NOT NULL,
            trial_limit INTEGER NOT NULL,
            mode TEXT NOT NULL,
            expiry TEXT NOT NULL,
            sub_reseller INTEGER NOT NULL,
            suspended INTEGER
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_accounts_login ON accounts(login)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_end_users_parent ON end_user_accounts(parent_id)",
        [],
    )?;

    Ok(())
}

/// Rows written by one load
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadStats {
    pub categories: usize,
    pub accounts: usize,
    pub end_user_accounts: usize,
    pub assignments: usize,
}

impl LoadStats {
    pub fn total(&self) -> usize {
        self.categories + self.accounts + self.end_user_accounts + self.assignments
    }
}

/// Load a snapshot into the sink tables inside a single transaction
pub fn load_snapshot(conn: &mut Connection, snapshot: &Snapshot) -> Result<LoadStats> {
    let tx = conn.transaction().context("Failed to start load transaction")?;

    let stats = match snapshot {
        Snapshot::Legacy(s) => load_legacy(&tx, s)?,
        Snapshot::Final(s) => load_final(&tx, s)?,
    };

    tx.commit().context("Failed to commit load transaction")?;

    info!(
        shape = %snapshot.kind(),
        categories = stats.categories,
        accounts = stats.accounts,
        end_users = stats.end_user_accounts,
        assignments = stats.assignments,
        "snapshot loaded"
    );

    Ok(stats)
}

// ============================================================================
// LEGACY LOAD
// ============================================================================

/// Legacy rows carry no ids of their own: the sink assigns them.
/// Owners are resolved by login against rows inserted earlier in the same load.
fn load_legacy(tx: &Transaction, snapshot: &LegacySnapshot) -> Result<LoadStats> {
    let mut stats = LoadStats::default();

    tx.execute(
        "INSERT INTO accounts (name, contact, email, login, password, parent_id, group_key, access_level)
         VALUES ('Admin', ?1, 'admin@admin.com', ?2, ?2, 0, ?3, ?4)",
        params![CONTACT_PLACEHOLDER, ROOT_OWNER, ROOT_GROUP_KEY, ROOT_ACCESS_LEVEL],
    )
    .context("Failed to insert root account")?;
    let root_id = tx.last_insert_rowid();
    stats.accounts += 1;

    let mut login_to_id: HashMap<String, i64> = HashMap::new();
    login_to_id.insert(ROOT_OWNER.to_string(), root_id);

    for category in &snapshot.categories {
        tx.execute(
            "INSERT INTO categories (sub_id, name) VALUES (?1, ?2)",
            params![category.sub_id, category.name],
        )
        .with_context(|| format!("Failed to insert category {}", category.name))?;
        stats.categories += 1;
    }

    for reseller in &snapshot.resellers {
        let owner_id = login_to_id.get(&reseller.owner).copied().unwrap_or(root_id);

        tx.execute(
            "INSERT INTO accounts (name, contact, email, login, password, parent_id, group_key, access_level)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                reseller.name,
                reseller.contact,
                reseller.email,
                reseller.login,
                reseller.password,
                owner_id,
                reseller.group_key,
                RESELLER_ACCESS_LEVEL,
            ],
        )
        .with_context(|| format!("Failed to insert reseller {}", reseller.login))?;
        let account_id = tx.last_insert_rowid();
        login_to_id.insert(reseller.login.clone(), account_id);
        stats.accounts += 1;

        tx.execute(
            "INSERT INTO assignments (value, category_id, user_id, owner_id, user_limit, trial_limit, mode, expiry, sub_reseller, suspended)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5, ?6, ?7, ?8, NULL)",
            params![
                format!("{:.2}", reseller.value),
                reseller.category_id,
                account_id,
                owner_id,
                reseller.limit,
                reseller.mode,
                reseller.expiry,
                reseller.sub,
            ],
        )
        .with_context(|| format!("Failed to insert assignment for reseller {}", reseller.login))?;
        stats.assignments += 1;
    }

    for user in &snapshot.end_users {
        // Unknown owners are kept with parent 0 rather than dropped
        let owner_id = login_to_id.get(&user.owner).copied().unwrap_or(0);
        if owner_id == 0 {
            debug!(login = %user.login, owner = %user.owner, "end user without loaded owner");
        }

        tx.execute(
            "INSERT INTO end_user_accounts (parent_id, category_id, user_limit, login, name, password, group_key, expiry, uuid, contact, access_level)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                owner_id,
                user.category_id,
                user.limit,
                user.login,
                user.name,
                user.password,
                user.group_key,
                user.expiry,
                user.uuid,
                user.contact,
                END_USER_ACCESS_LEVEL,
            ],
        )
        .with_context(|| format!("Failed to insert end user {}", user.login))?;
        stats.end_user_accounts += 1;
    }

    Ok(stats)
}

// ============================================================================
// FINAL LOAD
// ============================================================================

/// Final rows keep the ids they had in the dump
fn load_final(tx: &Transaction, snapshot: &FinalSnapshot) -> Result<LoadStats> {
    let mut stats = LoadStats::default();

    for category in &snapshot.categories {
        tx.execute(
            "INSERT INTO categories (id, sub_id, name) VALUES (?1, ?2, ?3)",
            params![category.id, category.sub_id, category.name.trim()],
        )
        .with_context(|| format!("Failed to insert category {}", category.name))?;
        stats.categories += 1;
    }

    for account in &snapshot.resellers {
        tx.execute(
            "INSERT INTO accounts (id, name, contact, email, login, password, parent_id, group_key, access_token, user_price, reseller_price, access_level)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                account.id,
                account.name.trim(),
                account.contact.trim(),
                account.email.trim(),
                account.login.trim(),
                account.password.trim(),
                account.parent_id,
                account.group_key,
                account.access_token,
                account.user_price,
                account.reseller_price,
                account.access_level,
            ],
        )
        .with_context(|| format!("Failed to insert account {}", account.login))?;
        stats.accounts += 1;
    }

    for user in &snapshot.end_users {
        tx.execute(
            "INSERT INTO end_user_accounts (id, parent_id, category_id, user_limit, login, name, password, group_key, expiry, uuid, contact, access_level)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                user.id,
                user.parent_id,
                user.category_id,
                user.limit,
                user.login.trim(),
                user.name.trim(),
                user.password.trim(),
                user.group_key,
                user.expiry,
                user.uuid,
                user.contact,
                END_USER_ACCESS_LEVEL,
            ],
        )
        .with_context(|| format!("Failed to insert end user {}", user.login))?;
        stats.end_user_accounts += 1;
    }

    for assignment in &snapshot.assignments {
        tx.execute(
            "INSERT INTO assignments (id, value, category_id, user_id, owner_id, user_limit, trial_limit, mode, expiry, sub_reseller, suspended)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                assignment.id,
                assignment.value.trim(),
                assignment.category_id,
                assignment.user_id,
                assignment.owner_id,
                assignment.limit,
                assignment.trial_limit,
                assignment.mode,
                assignment.expiry,
                assignment.sub_reseller,
                assignment.suspended,
            ],
        )
        .with_context(|| format!("Failed to insert assignment for user {}", assignment.user_id))?;
        stats.assignments += 1;
    }

    Ok(stats)
}

// ============================================================================
// QUERIES
// ============================================================================

/// Row count of one sink table
pub fn count_rows(conn: &Connection, table: &str) -> Result<i64> {
    anyhow::ensure!(SINK_TABLES.contains(&table), "Unknown sink table: {}", table);

    let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
        row.get(0)
    })?;

    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::ShapeKind;
    use crate::pipeline::convert_str;
    use chrono::NaiveDate;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn snapshot(text: &str, kind: ShapeKind) -> Snapshot {
        let now = NaiveDate::from_ymd_opt(2025, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        convert_str(text, kind, now, &mut StdRng::seed_from_u64(1)).snapshot
    }

    fn open() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    #[test]
    fn test_setup_database_is_idempotent() {
        let conn = open();
        setup_database(&conn).unwrap();

        for table in SINK_TABLES {
            assert_eq!(count_rows(&conn, table).unwrap(), 0);
        }
        assert!(count_rows(&conn, "sqlite_master").is_err());
    }

    #[test]
    fn test_load_legacy() {
        let mut conn = open();
        let snap = snapshot(
            "INSERT INTO categorias VALUES (7,5,'Basic');\n\
             INSERT INTO revenda VALUES (2,1,'ana','pw','5511','10.5',30,'validade','2024-06-01',0,5,0);\n\
             INSERT INTO revenda VALUES (3,2,'caio','pw','5512','1',5,'credito','2024-06-01',0,5,0);\n\
             INSERT INTO usuarios VALUES (10,3,5,'bob','pw','Bob','2024-01-01',9.90,0,'','uuid1',1,100);\n\
             INSERT INTO usuarios VALUES (11,99,5,'eve','pw','Eve','2024-01-01',9.90,0,'','uuid2',1,1);",
            ShapeKind::Legacy,
        );

        let stats = load_snapshot(&mut conn, &snap).unwrap();
        assert_eq!(
            stats,
            LoadStats {
                categories: 1,
                accounts: 3,
                end_user_accounts: 2,
                assignments: 2,
            }
        );
        assert_eq!(stats.total(), 8);

        // Root first, then resellers in order
        let (root_id, root_level): (i64, i64) = conn
            .query_row("SELECT id, access_level FROM accounts WHERE login = 'admin'", [], |r| {
                Ok((r.get(0)?, r.get(1)?))
            })
            .unwrap();
        assert_eq!(root_level, ROOT_ACCESS_LEVEL);

        let ana_parent: i64 = conn
            .query_row("SELECT parent_id FROM accounts WHERE login = 'ana'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(ana_parent, root_id);

        let (caio_id, caio_parent): (i64, i64) = conn
            .query_row("SELECT id, parent_id FROM accounts WHERE login = 'caio'", [], |r| {
                Ok((r.get(0)?, r.get(1)?))
            })
            .unwrap();
        let ana_id: i64 = conn
            .query_row("SELECT id FROM accounts WHERE login = 'ana'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(caio_parent, ana_id);

        let bob_parent: i64 = conn
            .query_row("SELECT parent_id FROM end_user_accounts WHERE login = 'bob'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(bob_parent, caio_id);

        let eve_parent: i64 = conn
            .query_row("SELECT parent_id FROM end_user_accounts WHERE login = 'eve'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(eve_parent, 0);

        let value: String = conn
            .query_row("SELECT value FROM assignments WHERE user_id = ?1", [ana_id], |r| r.get(0))
            .unwrap();
        assert_eq!(value, "10.50");

        println!("✅ Legacy load PASSED");
    }

    #[test]
    fn test_load_final_keeps_ids() {
        let mut conn = open();
        let snap = snapshot(
            "INSERT INTO categorias VALUES (3,5,' Basic ');\n\
             INSERT INTO accounts VALUES (1,'','','root','','','pw',0),(8,'Ana','','ana','','','pw',1);\n\
             INSERT INTO ssh_accounts VALUES (40,8,5,1,0,'carla','pw','','2024-02-10','',0,'','0','','0');\n\
             INSERT INTO atribuidos VALUES (9,'10.00',5,40,8,30,0,'validade','2025-01-01',0,2,'','0');",
            ShapeKind::Final,
        );

        let stats = load_snapshot(&mut conn, &snap).unwrap();
        assert_eq!(stats.total(), 5);

        let name: String = conn
            .query_row("SELECT name FROM categories WHERE id = 3", [], |r| r.get(0))
            .unwrap();
        assert_eq!(name, "Basic");

        let level: i64 = conn
            .query_row("SELECT access_level FROM accounts WHERE id = 8", [], |r| r.get(0))
            .unwrap();
        assert_eq!(level, RESELLER_ACCESS_LEVEL);

        let uuid: Option<String> = conn
            .query_row("SELECT uuid FROM end_user_accounts WHERE id = 40", [], |r| r.get(0))
            .unwrap();
        assert_eq!(uuid, None);

        let suspended: Option<i64> = conn
            .query_row("SELECT suspended FROM assignments WHERE id = 9", [], |r| r.get(0))
            .unwrap();
        assert_eq!(suspended, Some(2));
    }

    #[test]
    fn test_failed_load_rolls_back() {
        let mut conn = open();
        let snap = snapshot(
            "INSERT INTO categorias VALUES (3,5,'Basic'),(3,6,'Dup');",
            ShapeKind::Final,
        );

        // Duplicate primary key aborts the load
        assert!(load_snapshot(&mut conn, &snap).is_err());
        assert_eq!(count_rows(&conn, "categories").unwrap(), 0);
    }
}
