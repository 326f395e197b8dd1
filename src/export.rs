// 📦 Export Assembler - Pluggable output shapes over one enrichment core
//
// The caller picks the shape; nothing is inferred from dump content.
// A shape decides two things:
// - which contact rule enrichment applies per table
// - how enriched records flatten into export records

use crate::enrichment::{
    synthesized_address, ContactPolicy, ContactRule, Enriched, EnrichedAssignment,
    EnrichedEndUser, EnrichedReseller,
};
use crate::entities::{is_blank, Category};
use crate::schema::SchemaVersion;
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fixed contact used by the final layout
pub const CONTACT_PLACEHOLDER: &str = "62999999999";

/// Account type tag of every final end-user row
pub const END_USER_KIND: &str = "xray";

/// Access level of the root identity in the final layout
pub const ROOT_ACCESS_LEVEL: i64 = 3;

/// Access level of every other reseller in the final layout
pub const RESELLER_ACCESS_LEVEL: i64 = 2;

// ============================================================================
// SHAPE SELECTOR
// ============================================================================

/// ShapeKind - explicit caller-supplied selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeKind {
    Legacy,
    Final,
}

impl ShapeKind {
    pub fn name(&self) -> &'static str {
        match self {
            ShapeKind::Legacy => "legacy",
            ShapeKind::Final => "final",
        }
    }

    /// Dump layout this shape reads
    pub fn schema_version(&self) -> SchemaVersion {
        match self {
            ShapeKind::Legacy => SchemaVersion::Legacy,
            ShapeKind::Final => SchemaVersion::Final,
        }
    }
}

impl fmt::Display for ShapeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ShapeKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "legacy" => Ok(ShapeKind::Legacy),
            "final" => Ok(ShapeKind::Final),
            other => bail!("Unknown shape '{}' (expected legacy or final)", other),
        }
    }
}

// ============================================================================
// LEGACY RECORDS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyReseller {
    pub login: String,
    pub password: String,
    pub contact: String,
    pub value: f64,
    pub limit: i64,
    pub mode: String,
    pub expiry: String,
    pub category_id: i64,
    pub sub: i64,
    pub owner: String,
    pub category_name: String,
    pub name: String,
    pub email: String,
    pub group_key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyEndUser {
    pub login: String,
    pub password: String,
    pub name: String,
    pub expiry: String,
    pub suspended: i64,
    pub owner: String,
    pub category_name: String,
    pub contact: String,
    pub category_id: i64,
    pub limit: i64,
    pub uuid: String,
    pub group_key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacySnapshot {
    pub categories: Vec<Category>,
    pub resellers: Vec<LegacyReseller>,
    pub end_users: Vec<LegacyEndUser>,
}

// ============================================================================
// FINAL RECORDS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalReseller {
    pub id: i64,
    pub name: String,
    pub contact: String,
    pub email: String,
    pub login: String,
    pub token: String,
    pub mb: String,
    pub password: String,
    pub parent_id: i64,
    pub group_key: String,
    pub access_token: String,
    pub user_price: String,
    pub reseller_price: String,
    pub telegram: String,
    pub duration: String,
    pub sale_token: String,
    pub payment_token: String,
    pub payment_method: String,
    pub whatsapp: String,
    pub access_level: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalEndUser {
    pub id: i64,
    pub parent_id: i64,
    pub category_id: i64,
    pub limit: i64,
    pub by_credit: i64,
    pub login: String,
    pub name: String,
    pub password: String,
    pub group_key: String,
    pub expiry: String,
    pub last_view: String,
    pub status: i64,
    pub monthly_value: String,
    pub notified: i64,
    pub whatsapp: String,
    pub uuid: Option<String>,
    pub device_id: String,
    pub device_active: String,
    pub contact: String,
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalAssignment {
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
    pub suspended: Option<i64>,
    pub monthly_value: String,
    pub notified: String,
    pub suspension_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalSnapshot {
    pub categories: Vec<Category>,
    pub resellers: Vec<FinalReseller>,
    pub end_users: Vec<FinalEndUser>,
    pub assignments: Vec<FinalAssignment>,
}

/// Snapshot - exactly one shape per run, tagged `"shape": "legacy" | "final"`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "lowercase")]
pub enum Snapshot {
    Legacy(LegacySnapshot),
    Final(FinalSnapshot),
}

impl Snapshot {
    pub fn kind(&self) -> ShapeKind {
        match self {
            Snapshot::Legacy(_) => ShapeKind::Legacy,
            Snapshot::Final(_) => ShapeKind::Final,
        }
    }

    pub fn categories(&self) -> &[Category] {
        match self {
            Snapshot::Legacy(s) => &s.categories,
            Snapshot::Final(s) => &s.categories,
        }
    }

    pub fn reseller_count(&self) -> usize {
        match self {
            Snapshot::Legacy(s) => s.resellers.len(),
            Snapshot::Final(s) => s.resellers.len(),
        }
    }

    pub fn end_user_count(&self) -> usize {
        match self {
            Snapshot::Legacy(s) => s.end_users.len(),
            Snapshot::Final(s) => s.end_users.len(),
        }
    }

    pub fn assignment_count(&self) -> usize {
        match self {
            Snapshot::Legacy(_) => 0,
            Snapshot::Final(s) => s.assignments.len(),
        }
    }
}

// ============================================================================
// SHAPE TRAIT
// ============================================================================

/// ExportShape - strategy plugged into the shared enrichment core
pub trait ExportShape: Send + Sync {
    fn kind(&self) -> ShapeKind;

    /// Contact rules enrichment must apply for this shape
    fn contact_policy(&self) -> ContactPolicy;

    /// Flatten enriched records into this shape's snapshot
    fn assemble(&self, enriched: Enriched) -> Snapshot;
}

/// Get shape strategy for a selector
pub fn get_shape(kind: ShapeKind) -> Box<dyn ExportShape> {
    match kind {
        ShapeKind::Legacy => Box::new(LegacyShape),
        ShapeKind::Final => Box::new(FinalShape),
    }
}

// ============================================================================
// LEGACY SHAPE
// ============================================================================

pub struct LegacyShape;

impl LegacyShape {
    fn reseller(r: EnrichedReseller) -> LegacyReseller {
        let email = synthesized_address(&r.record.login);
        LegacyReseller {
            name: r.record.login.clone(),
            email,
            login: r.record.login,
            password: r.record.password,
            contact: r.contact,
            value: r.record.value,
            limit: r.record.limit,
            mode: r.mode,
            expiry: r.expiry.text,
            category_id: r.record.category_id,
            sub: r.record.sub,
            owner: r.owner,
            category_name: r.category_name,
            group_key: r.group_key,
        }
    }

    fn end_user(u: EnrichedEndUser) -> LegacyEndUser {
        LegacyEndUser {
            login: u.record.login,
            password: u.record.password,
            name: u.record.name,
            expiry: u.expiry.text,
            suspended: u.record.suspended,
            owner: u.owner,
            category_name: u.category_name,
            contact: u.contact,
            category_id: u.record.sub_id,
            limit: u.record.limit,
            uuid: u.record.uuid,
            group_key: u.group_key,
        }
    }
}

impl ExportShape for LegacyShape {
    fn kind(&self) -> ShapeKind {
        ShapeKind::Legacy
    }

    fn contact_policy(&self) -> ContactPolicy {
        ContactPolicy {
            resellers: ContactRule::SynthesizeIfBlank,
            end_users: ContactRule::SynthesizeIfBlank,
        }
    }

    fn assemble(&self, enriched: Enriched) -> Snapshot {
        Snapshot::Legacy(LegacySnapshot {
            categories: enriched.categories,
            resellers: enriched.resellers.into_iter().map(Self::reseller).collect(),
            end_users: enriched.end_users.into_iter().map(Self::end_user).collect(),
        })
    }
}

// ============================================================================
// FINAL SHAPE
// ============================================================================

pub struct FinalShape;

/// Blank or literal zero identifiers become null
fn nullable_identifier(value: &str) -> Option<String> {
    let v = value.trim();
    if is_blank(v) || v == "0" {
        None
    } else {
        Some(v.to_string())
    }
}

impl FinalShape {
    fn reseller(r: EnrichedReseller) -> FinalReseller {
        let record = r.record;
        let name = if is_blank(&record.name) {
            record.login.clone()
        } else {
            record.name.clone()
        };
        let access_level = if record.id == crate::entities::ROOT_ID {
            ROOT_ACCESS_LEVEL
        } else {
            RESELLER_ACCESS_LEVEL
        };

        FinalReseller {
            id: record.id,
            name,
            contact: r.contact,
            email: synthesized_address(&record.login),
            login: record.login,
            token: record.token,
            mb: record.mb,
            password: record.password,
            parent_id: record.parent_id,
            group_key: r.group_key,
            access_token: record.access_token,
            user_price: record.user_price,
            reseller_price: record.reseller_price,
            telegram: record.telegram,
            duration: record.duration,
            sale_token: record.sale_token,
            payment_token: record.payment_token,
            payment_method: record.payment_method,
            whatsapp: record.whatsapp,
            access_level,
        }
    }

    fn end_user(u: EnrichedEndUser) -> FinalEndUser {
        let record = u.record;
        // Zero and blank both mean "active" in older panels
        let status = if record.status == 0 { 1 } else { record.status };

        FinalEndUser {
            id: record.id,
            parent_id: record.parent_id,
            category_id: record.sub_id,
            limit: record.limit,
            by_credit: record.by_credit,
            name: record.login.clone(),
            login: record.login,
            password: record.password,
            group_key: u.group_key,
            expiry: u.expiry.text,
            last_view: record.last_view,
            status,
            monthly_value: record.monthly_value,
            notified: record.notified,
            whatsapp: record.whatsapp,
            uuid: nullable_identifier(&record.uuid),
            device_id: record.device_id,
            device_active: record.device_active,
            contact: u.contact,
            kind: END_USER_KIND.to_string(),
        }
    }

    fn assignment(a: EnrichedAssignment) -> FinalAssignment {
        let record = a.record;
        FinalAssignment {
            id: record.id,
            value: record.value,
            category_id: record.category_id,
            user_id: record.user_id,
            owner_id: record.owner_id,
            limit: record.limit,
            trial_limit: record.trial_limit,
            mode: a.mode,
            expiry: a.expiry.text,
            sub_reseller: record.sub_reseller,
            suspended: (record.suspended != 0).then_some(record.suspended),
            monthly_value: record.monthly_value,
            notified: record.notified,
            suspension_id: None,
        }
    }
}

impl ExportShape for FinalShape {
    fn kind(&self) -> ShapeKind {
        ShapeKind::Final
    }

    fn contact_policy(&self) -> ContactPolicy {
        ContactPolicy {
            resellers: ContactRule::PlaceholderIfBlank(CONTACT_PLACEHOLDER),
            end_users: ContactRule::AlwaysPlaceholder(CONTACT_PLACEHOLDER),
        }
    }

    fn assemble(&self, enriched: Enriched) -> Snapshot {
        Snapshot::Final(FinalSnapshot {
            categories: enriched.categories,
            resellers: enriched.resellers.into_iter().map(Self::reseller).collect(),
            end_users: enriched.end_users.into_iter().map(Self::end_user).collect(),
            assignments: enriched
                .assignments
                .into_iter()
                .map(Self::assignment)
                .collect(),
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrichment::{enrich, ROOT_GROUP_KEY};
    use crate::entities::{Assignment, DumpTables, EndUser, Reseller};
    use chrono::{NaiveDate, NaiveDateTime};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn tables() -> DumpTables {
        DumpTables {
            categories: vec![Category::new(1, 5, "Basic")],
            resellers: vec![
                Reseller {
                    id: 1,
                    login: "boss".to_string(),
                    name: "NULL".to_string(),
                    ..Default::default()
                },
                Reseller {
                    id: 2,
                    parent_id: 1,
                    login: "ana".to_string(),
                    name: "Ana".to_string(),
                    contact: "5511900000000".to_string(),
                    mode: "validade".to_string(),
                    expiry: "2024-06-01".to_string(),
                    category_id: 5,
                    ..Default::default()
                },
            ],
            end_users: vec![EndUser {
                id: 10,
                parent_id: 2,
                sub_id: 5,
                login: "bob".to_string(),
                name: "Bob".to_string(),
                contact: "5511888".to_string(),
                uuid: "0".to_string(),
                expiry: "2024-01-01".to_string(),
                ..Default::default()
            }],
            assignments: vec![Assignment {
                id: 1,
                mode: "credito".to_string(),
                suspended: 0,
                ..Default::default()
            }],
        }
    }

    fn build(kind: ShapeKind) -> Snapshot {
        let shape = get_shape(kind);
        let enriched = enrich(
            &tables(),
            shape.contact_policy(),
            now(),
            &mut StdRng::seed_from_u64(4),
        );
        shape.assemble(enriched)
    }

    #[test]
    fn test_empty_final_snapshot_reads_back_as_final() {
        let snapshot = Snapshot::Final(FinalSnapshot {
            categories: vec![],
            resellers: vec![],
            end_users: vec![],
            assignments: vec![],
        });

        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("\"shape\":\"final\""));

        let back: Snapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back.kind(), ShapeKind::Final);
        assert_eq!(back, snapshot);
    }

    #[test]
    fn test_shape_kind_from_str() {
        assert_eq!("legacy".parse::<ShapeKind>().unwrap(), ShapeKind::Legacy);
        assert_eq!(" FINAL ".parse::<ShapeKind>().unwrap(), ShapeKind::Final);
        assert!("both".parse::<ShapeKind>().is_err());
        assert_eq!(ShapeKind::Final.to_string(), "final");
        assert_eq!(ShapeKind::Legacy.schema_version(), SchemaVersion::Legacy);
    }

    #[test]
    fn test_legacy_shape() {
        let snapshot = build(ShapeKind::Legacy);
        assert_eq!(snapshot.kind(), ShapeKind::Legacy);

        let Snapshot::Legacy(legacy) = snapshot else {
            panic!("expected legacy snapshot");
        };

        assert_eq!(legacy.categories, vec![Category::new(1, 5, "Basic")]);

        let ana = &legacy.resellers[1];
        assert_eq!(ana.owner, "admin");
        assert_eq!(ana.category_name, "Basic");
        assert_eq!(ana.name, "ana");
        assert_eq!(ana.email, "ana@gmail.com");
        assert_eq!(ana.mode, "Validade");
        assert_eq!(ana.expiry, "2024-06-01 00:00:00");
        assert_eq!(ana.contact, "5511900000000");

        let bob = &legacy.end_users[0];
        assert_eq!(bob.owner, "ana");
        assert_eq!(bob.contact, "5511888");
        assert_eq!(bob.uuid, "0");
        assert_eq!(bob.group_key, ana.group_key);

        // Root reseller had a blank contact → synthesized
        assert_eq!(legacy.resellers[0].contact.len(), 14);
        println!("✅ Legacy shape PASSED");
    }

    #[test]
    fn test_final_shape_resellers() {
        let Snapshot::Final(snapshot) = build(ShapeKind::Final) else {
            panic!("expected final snapshot");
        };

        let root = &snapshot.resellers[0];
        assert_eq!(root.name, "boss"); // NULL name → login
        assert_eq!(root.contact, CONTACT_PLACEHOLDER);
        assert_eq!(root.group_key, ROOT_GROUP_KEY);
        assert_eq!(root.access_level, ROOT_ACCESS_LEVEL);

        let ana = &snapshot.resellers[1];
        assert_eq!(ana.name, "Ana");
        assert_eq!(ana.contact, "5511900000000");
        assert_eq!(ana.access_level, RESELLER_ACCESS_LEVEL);
        assert_eq!(ana.group_key.len(), 6);
    }

    #[test]
    fn test_final_shape_end_users_and_assignments() {
        let Snapshot::Final(snapshot) = build(ShapeKind::Final) else {
            panic!("expected final snapshot");
        };

        let bob = &snapshot.end_users[0];
        assert_eq!(bob.name, "bob");
        assert_eq!(bob.contact, CONTACT_PLACEHOLDER); // always, even when present
        assert_eq!(bob.kind, END_USER_KIND);
        assert_eq!(bob.status, 1);
        assert_eq!(bob.uuid, None);
        assert_eq!(bob.group_key, snapshot.resellers[1].group_key);
        assert_eq!(bob.expiry, "2024-01-01 00:00:00");

        let assignment = &snapshot.assignments[0];
        assert_eq!(assignment.mode, "Credito");
        assert_eq!(assignment.suspended, None);
        assert_eq!(assignment.suspension_id, None);
        assert_eq!(assignment.expiry, "2025-01-01 00:00:00");
    }

    #[test]
    fn test_nullable_identifier() {
        assert_eq!(nullable_identifier(""), None);
        assert_eq!(nullable_identifier(" 0 "), None);
        assert_eq!(nullable_identifier("NULL"), None);
        assert_eq!(nullable_identifier("abc-1"), Some("abc-1".to_string()));
    }

    #[test]
    fn test_snapshot_counts() {
        let snapshot = build(ShapeKind::Final);
        assert_eq!(snapshot.categories().len(), 1);
        assert_eq!(snapshot.reseller_count(), 2);
        assert_eq!(snapshot.end_user_count(), 1);
        assert_eq!(snapshot.assignment_count(), 1);
        assert_eq!(build(ShapeKind::Legacy).assignment_count(), 0);
    }
}
