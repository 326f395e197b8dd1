// 🚰 Conversion Pipeline - dump text → normalized snapshot + report
//
// text → RowSplitter → RawRow → decode_rows → DumpTables
//      → EnrichmentEngine (shape's contact policy) → ExportShape::assemble
//
// Only reading the input can fail. Everything downstream degrades to
// sentinels/defaults and is counted in the ConversionReport.

use crate::backup::{backup_path_for, dump_database};
use crate::db::{load_snapshot, setup_database, LoadStats};
use crate::enrichment::{enrich, EnrichmentStats};
use crate::entities::DumpTables;
use crate::export::{get_shape, ShapeKind, Snapshot};
use crate::schema::decode_rows;
use crate::splitter::split_dump;
use anyhow::{Context, Result};
use chrono::{Local, NaiveDateTime};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

// ============================================================================
// REPORT
// ============================================================================

/// Everything the run absorbed instead of failing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionReport {
    pub shape: Option<ShapeKind>,
    pub input_sha256: String,
    pub lines: usize,
    pub statements: usize,
    pub skipped_statements: usize,
    pub unterminated_statements: usize,
    pub header_rows_skipped: usize,
    pub rows_per_table: BTreeMap<String, usize>,
    pub synthesized_contacts: usize,
    pub placeholder_contacts: usize,
    pub blank_expiries: usize,
    pub unparseable_expiries: usize,
    pub unknown_owners: usize,
    pub missing_categories: usize,
    pub duplicate_category_sub_ids: Vec<i64>,
}

impl ConversionReport {
    /// Expiries that fell back to the processing time
    pub fn defaulted_expiries(&self) -> usize {
        self.blank_expiries + self.unparseable_expiries
    }

    pub fn total_rows(&self) -> usize {
        self.rows_per_table.values().sum()
    }

    /// Lines worth a warning; empty for a clean run
    pub fn warnings(&self) -> Vec<String> {
        let mut out = Vec::new();
        if self.unterminated_statements > 0 {
            out.push(format!("{} unterminated statements flushed best-effort", self.unterminated_statements));
        }
        if self.unknown_owners > 0 {
            out.push(format!("{} records with unknown owner", self.unknown_owners));
        }
        if self.missing_categories > 0 {
            out.push(format!("{} records with missing category", self.missing_categories));
        }
        if self.blank_expiries > 0 {
            out.push(format!("{} blank expiries defaulted to now", self.blank_expiries));
        }
        if self.unparseable_expiries > 0 {
            out.push(format!("{} unparseable expiries defaulted to now", self.unparseable_expiries));
        }
        if !self.duplicate_category_sub_ids.is_empty() {
            out.push(format!(
                "duplicate category sub ids {:?}, first match wins",
                self.duplicate_category_sub_ids
            ));
        }
        out
    }

    fn absorb(&mut self, stats: EnrichmentStats) {
        self.synthesized_contacts = stats.synthesized_contacts;
        self.placeholder_contacts = stats.placeholder_contacts;
        self.blank_expiries = stats.blank_expiries;
        self.unparseable_expiries = stats.unparseable_expiries;
        self.unknown_owners = stats.unknown_owners;
        self.missing_categories = stats.missing_categories;
        self.duplicate_category_sub_ids = stats.duplicate_category_sub_ids;
    }
}

/// Conversion - snapshot plus the report of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversion {
    pub snapshot: Snapshot,
    pub report: ConversionReport,
}

// ============================================================================
// ENTRY POINTS
// ============================================================================

/// SHA-256 of the raw input bytes, lowercase hex
pub fn fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Convert dump text already in memory
pub fn convert_str<R: Rng + ?Sized>(
    text: &str,
    kind: ShapeKind,
    now: NaiveDateTime,
    rng: &mut R,
) -> Conversion {
    let version = kind.schema_version();
    let shape = get_shape(kind);

    let (raw_rows, split) = split_dump(text, &version.table_names());
    let decoded = decode_rows(version, &raw_rows);
    let tables = DumpTables::from_decoded(&decoded);

    let enriched = enrich(&tables, shape.contact_policy(), now, rng);

    let mut report = ConversionReport {
        shape: Some(kind),
        input_sha256: fingerprint(text.as_bytes()),
        lines: split.lines,
        statements: split.statements,
        skipped_statements: split.skipped_statements,
        unterminated_statements: split.unterminated_statements,
        header_rows_skipped: decoded.header_rows_skipped,
        rows_per_table: decoded.rows_per_table.into_iter().collect(),
        ..Default::default()
    };
    report.absorb(enriched.stats.clone());

    let snapshot = shape.assemble(enriched);
    log_summary(&report);

    Conversion { snapshot, report }
}

/// Read a dump file and convert it. Invalid UTF-8 is replaced, not rejected.
pub fn convert_file<R: Rng + ?Sized>(
    path: &Path,
    kind: ShapeKind,
    now: NaiveDateTime,
    rng: &mut R,
) -> Result<Conversion> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read dump file: {}", path.display()))?;
    let text = String::from_utf8_lossy(&bytes);

    let mut conversion = convert_str(&text, kind, now, rng);
    // Hash what was on disk, not the lossy decoding
    conversion.report.input_sha256 = fingerprint(&bytes);

    Ok(conversion)
}

/// Seeded generator when a seed is given, entropy otherwise
pub fn seeded_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Processing time used for defaulted expiries
pub fn processing_time() -> NaiveDateTime {
    Local::now().naive_local()
}

// ============================================================================
// CONVERT + LOAD + BACKUP
// ============================================================================

/// What a full load run produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadOutcome {
    pub report: ConversionReport,
    pub loaded: LoadStats,
    pub database: PathBuf,
    pub backup: PathBuf,
}

/// Convert dump text, load the snapshot into `database`, then write the backup
/// named after `input_name` under `backup_dir`.
pub fn convert_and_load<R: Rng + ?Sized>(
    text: &str,
    input_name: &Path,
    kind: ShapeKind,
    database: &Path,
    backup_dir: &Path,
    rng: &mut R,
) -> Result<LoadOutcome> {
    let conversion = convert_str(text, kind, processing_time(), rng);

    let mut conn = Connection::open(database)
        .with_context(|| format!("Failed to open database: {}", database.display()))?;
    setup_database(&conn)?;
    let loaded = load_snapshot(&mut conn, &conversion.snapshot)?;

    let backup = dump_database(&conn, &backup_path_for(input_name, backup_dir))?;

    Ok(LoadOutcome {
        report: conversion.report,
        loaded,
        database: database.to_path_buf(),
        backup,
    })
}

fn log_summary(report: &ConversionReport) {
    info!(
        shape = ?report.shape,
        lines = report.lines,
        rows = report.total_rows(),
        "conversion finished"
    );

    for warning in report.warnings() {
        warn!("{}", warning);
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrichment::{CONTACT_COUNTRY_PREFIX, SYNTHESIZED_CONTACT_LEN};
    use crate::export::CONTACT_PLACEHOLDER;
    use chrono::NaiveDate;
    use std::io::Write;

    const LEGACY_DUMP: &str = "\
DROP TABLE IF EXISTS `categorias`;
CREATE TABLE `categorias` (`id` int, `subid` int, `nome` text);
INSERT INTO `categorias` VALUES (1,5,'Basic, (promo)'),(2,6,'Premium');
INSERT INTO `revenda` VALUES
(1,0,'boss','pw','','0.00',0,'validade','2030-01-01',0,5,0,0,'','','','0','','0.00',0),
(2,1,'ana','pw','5511900000000','10.00',30,'CREDITO','2024-06-01 12:00:00',0,5,0,0,'','','','0','','0.00',0),
(3,2,'caio','pw','','5.00',10,'validade','31/12/2024',0,6,0,0,'','','','0','','0.00',0);
INSERT INTO `usuarios` VALUES (10,2,5,'bob','pw','Bob','2024-01-01',9.90,0,'','uuid1',1,100,0,0,0,''),(11,3,9,'dan','pw','Dan','',1.00,0,'55','u2',1,1,0,0,0,''),(12,77,5,'eve','pw','Eve','2024-02-02',1.00,0,'55','u3',1,1,0,0,0,'');
";

    const FINAL_DUMP: &str = "\
INSERT INTO categorias VALUES (1,5,'Basic');
INSERT INTO accounts VALUES (1,'NULL','','admin','','','pw',0,'','','','','','','','','',''),(2,'Ana','','ana','','','pw',1,'','','','','','','','','','');
INSERT INTO ssh_accounts VALUES (20,2,5,1,0,'carla','pw','','2024-02-10 12:00:00','',0,'15.00','0','5511','0','dev','1');
INSERT INTO atribuidos VALUES (1,'10.00',5,2,1,30,0,'validade','2025-01-01',0,0,'','0');
";

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 6, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    fn run(text: &str, kind: ShapeKind, seed: u64) -> Conversion {
        convert_str(text, kind, now(), &mut StdRng::seed_from_u64(seed))
    }

    #[test]
    fn test_legacy_end_to_end() {
        let conversion = run(LEGACY_DUMP, ShapeKind::Legacy, 1);
        let Snapshot::Legacy(snapshot) = &conversion.snapshot else {
            panic!("expected legacy snapshot");
        };

        // Quoted comma and parentheses stay inside one field
        assert_eq!(snapshot.categories[0].name, "Basic, (promo)");
        assert_eq!(snapshot.categories.len(), 2);
        assert_eq!(snapshot.resellers.len(), 3);
        assert_eq!(snapshot.end_users.len(), 3);

        let bob = &snapshot.end_users[0];
        assert_eq!(bob.login, "bob");
        assert_eq!(bob.category_id, 5);
        assert_eq!(bob.expiry, "2024-01-01 00:00:00");
        assert_eq!(bob.owner, "ana");
        assert!(bob.contact.starts_with(CONTACT_COUNTRY_PREFIX));
        assert_eq!(bob.contact.len(), SYNTHESIZED_CONTACT_LEN);

        assert_eq!(snapshot.resellers[1].mode, "Credito");
        assert_eq!(snapshot.resellers[1].expiry, "2024-06-01 12:00:00");
        assert_eq!(snapshot.resellers[2].owner, "ana");
        assert_eq!(snapshot.resellers[2].expiry, "2025-06-01 08:00:00");
        assert_eq!(snapshot.end_users[1].category_name, "category not found");
        assert_eq!(snapshot.end_users[2].owner, "unknown");

        println!("✅ Legacy end-to-end PASSED");
    }

    #[test]
    fn test_legacy_report() {
        let report = run(LEGACY_DUMP, ShapeKind::Legacy, 1).report;

        assert_eq!(report.shape, Some(ShapeKind::Legacy));
        assert_eq!(report.input_sha256.len(), 64);
        assert_eq!(report.rows_per_table.get("categorias"), Some(&2));
        assert_eq!(report.rows_per_table.get("revenda"), Some(&3));
        assert_eq!(report.rows_per_table.get("usuarios"), Some(&3));
        assert_eq!(report.total_rows(), 8);
        assert_eq!(report.unknown_owners, 1);
        assert_eq!(report.missing_categories, 1);
        assert_eq!(report.blank_expiries, 1);
        assert_eq!(report.unparseable_expiries, 1);
        assert_eq!(report.defaulted_expiries(), 2);
        // boss, caio, bob
        assert_eq!(report.synthesized_contacts, 3);
        assert_eq!(report.unterminated_statements, 0);
    }

    #[test]
    fn test_report_warnings_cover_defaulted_expiries() {
        let warnings = run(LEGACY_DUMP, ShapeKind::Legacy, 1).report.warnings();

        assert!(warnings.contains(&"1 blank expiries defaulted to now".to_string()));
        assert!(warnings.contains(&"1 unparseable expiries defaulted to now".to_string()));
        assert!(warnings.contains(&"1 records with unknown owner".to_string()));
        assert!(warnings.contains(&"1 records with missing category".to_string()));

        assert!(ConversionReport::default().warnings().is_empty());
    }

    #[test]
    fn test_final_end_to_end() {
        let conversion = run(FINAL_DUMP, ShapeKind::Final, 3);
        let Snapshot::Final(snapshot) = &conversion.snapshot else {
            panic!("expected final snapshot");
        };

        assert_eq!(snapshot.resellers[0].name, "admin");
        assert_eq!(snapshot.resellers[0].group_key, "0");
        assert_eq!(snapshot.resellers[1].contact, CONTACT_PLACEHOLDER);

        let carla = &snapshot.end_users[0];
        assert_eq!(carla.status, 1);
        assert_eq!(carla.uuid, None);
        assert_eq!(carla.contact, CONTACT_PLACEHOLDER);
        assert_eq!(carla.group_key, snapshot.resellers[1].group_key);

        assert_eq!(snapshot.assignments[0].mode, "Validade");
        assert_eq!(snapshot.assignments[0].expiry, "2025-01-01 00:00:00");

        assert_eq!(conversion.report.placeholder_contacts, 3);
        assert_eq!(conversion.report.synthesized_contacts, 0);
    }

    #[test]
    fn test_same_seed_same_output() {
        let a = run(LEGACY_DUMP, ShapeKind::Legacy, 42);
        let b = run(LEGACY_DUMP, ShapeKind::Legacy, 42);
        assert_eq!(a, b);
        assert_eq!(
            serde_json::to_string(&a.snapshot).unwrap(),
            serde_json::to_string(&b.snapshot).unwrap()
        );
    }

    #[test]
    fn test_selector_decides_tables() {
        // A final-layout dump read as legacy yields only categories
        let conversion = run(FINAL_DUMP, ShapeKind::Legacy, 1);
        assert_eq!(conversion.snapshot.categories().len(), 1);
        assert_eq!(conversion.snapshot.reseller_count(), 0);
        assert_eq!(conversion.report.skipped_statements, 3);
    }

    #[test]
    fn test_malformed_input_still_terminates() {
        let text = "INSERT INTO usuarios VALUES (10,2,5,'bob','pw\n(11,3";
        let conversion = run(text, ShapeKind::Legacy, 1);
        assert_eq!(conversion.report.unterminated_statements, 1);
        // Whatever was recovered is still handed through
        assert!(conversion.snapshot.end_user_count() <= 1);
    }

    #[test]
    fn test_convert_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(LEGACY_DUMP.as_bytes()).unwrap();

        let conversion = convert_file(
            file.path(),
            ShapeKind::Legacy,
            now(),
            &mut StdRng::seed_from_u64(1),
        )
        .unwrap();

        assert_eq!(conversion.report.input_sha256, fingerprint(LEGACY_DUMP.as_bytes()));
        assert_eq!(conversion.snapshot.end_user_count(), 3);
    }

    #[test]
    fn test_convert_missing_file_is_error() {
        let result = convert_file(
            Path::new("/nonexistent/dump.sql"),
            ShapeKind::Final,
            now(),
            &mut StdRng::seed_from_u64(1),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_seeded_rng_repeats() {
        let a: u64 = seeded_rng(Some(5)).gen();
        let b: u64 = seeded_rng(Some(5)).gen();
        assert_eq!(a, b);
    }

    #[test]
    fn test_convert_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let database = dir.path().join("sink.db");
        let backups = dir.path().join("backups");

        let outcome = convert_and_load(
            LEGACY_DUMP,
            Path::new("panel.sql"),
            ShapeKind::Legacy,
            &database,
            &backups,
            &mut StdRng::seed_from_u64(1),
        )
        .unwrap();

        // Root account is added on top of the three resellers
        assert_eq!(outcome.loaded.accounts, 4);
        assert_eq!(outcome.loaded.end_user_accounts, 3);
        assert_eq!(outcome.loaded.assignments, 3);
        assert_eq!(outcome.backup, backups.join("panel-converted.sql"));
        assert!(outcome.backup.exists());
        assert_eq!(outcome.report.total_rows(), 8);

        println!("✅ Convert + load + backup PASSED");
    }
}
