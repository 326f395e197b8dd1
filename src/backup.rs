// 💾 Backup - SQL text dump of the sink database
//
// Output per table:
//   DROP TABLE IF EXISTS `t`;
//   <stored CREATE TABLE>;
//   INSERT INTO `t` VALUES (...),(...);

use crate::db::SINK_TABLES;
use anyhow::{Context, Result};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OptionalExtension};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::info;

/// Suffix added to the input stem for the backup file name
pub const BACKUP_SUFFIX: &str = "-converted.sql";

/// `<dir>/<input stem>-converted.sql`
pub fn backup_path_for(input: &Path, dir: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("dump");
    dir.join(format!("{}{}", stem, BACKUP_SUFFIX))
}

/// Render every sink table as SQL text
pub fn render_dump(conn: &Connection) -> Result<String> {
    let mut out = String::new();
    out.push_str("-- dump-convert backup\n");

    for table in SINK_TABLES {
        let create: Option<String> = conn
            .query_row(
                "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [table],
                |row| row.get(0),
            )
            .optional()?;

        let Some(create) = create else {
            continue;
        };

        let _ = writeln!(out, "\nDROP TABLE IF EXISTS `{}`;", table);
        let _ = writeln!(out, "{};", create);

        let rows = table_rows(conn, table)?;
        if !rows.is_empty() {
            let _ = writeln!(out, "INSERT INTO `{}` VALUES {};", table, rows.join(","));
        }
    }

    Ok(out)
}

fn table_rows(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare(&format!("SELECT * FROM {} ORDER BY rowid", table))
        .with_context(|| format!("Failed to read table {}", table))?;
    let columns = stmt.column_count();

    let rows = stmt
        .query_map([], |row| {
            let mut values = Vec::with_capacity(columns);
            for idx in 0..columns {
                values.push(sql_literal(row.get_ref(idx)?));
            }
            Ok(format!("({})", values.join(",")))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn sql_literal(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => "NULL".to_string(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(t) => format!("'{}'", String::from_utf8_lossy(t).replace('\'', "''")),
        ValueRef::Blob(b) => {
            let hex: String = b.iter().map(|byte| format!("{:02x}", byte)).collect();
            format!("X'{}'", hex)
        }
    }
}

/// Write the backup file, creating its directory if needed
pub fn dump_database(conn: &Connection, path: &Path) -> Result<PathBuf> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create backup directory: {}", parent.display()))?;
    }

    let sql = render_dump(conn)?;
    std::fs::write(path, sql)
        .with_context(|| format!("Failed to write backup: {}", path.display()))?;

    info!(path = %path.display(), "backup written");
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::setup_database;

    #[test]
    fn test_backup_path_for() {
        let path = backup_path_for(Path::new("/tmp/in/panel.sql"), Path::new("backups"));
        assert_eq!(path, PathBuf::from("backups/panel-converted.sql"));

        let path = backup_path_for(Path::new(""), Path::new("b"));
        assert_eq!(path, PathBuf::from("b/dump-converted.sql"));
    }

    #[test]
    fn test_sql_literal_escapes_quotes() {
        assert_eq!(sql_literal(ValueRef::Text(b"O'Brien")), "'O''Brien'");
        assert_eq!(sql_literal(ValueRef::Null), "NULL");
        assert_eq!(sql_literal(ValueRef::Integer(7)), "7");
        assert_eq!(sql_literal(ValueRef::Blob(&[0xab, 0x01])), "X'ab01'");
    }

    #[test]
    fn test_dump_database() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn.execute(
            "INSERT INTO categories (id, sub_id, name) VALUES (1, 5, 'Basic'), (2, 6, 'It''s')",
            [],
        )
        .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("panel-converted.sql");
        let written = dump_database(&conn, &path).unwrap();
        assert_eq!(written, path);

        let sql = std::fs::read_to_string(&path).unwrap();
        assert!(sql.contains("DROP TABLE IF EXISTS `categories`;"));
        assert!(sql.contains("CREATE TABLE"));
        assert!(sql.contains("sub_id INTEGER NOT NULL"));
        assert!(sql.contains("INSERT INTO `categories` VALUES (1,5,'Basic'),(2,6,'It''s');"));
        // Empty tables get schema but no INSERT
        assert!(sql.contains("DROP TABLE IF EXISTS `accounts`;"));
        assert!(!sql.contains("INSERT INTO `accounts`"));

        println!("✅ Backup dump PASSED");
    }
}
