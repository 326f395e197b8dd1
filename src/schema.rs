// 📐 Schema Decoder - Positional row-tuples → typed values
// One generic decoder driven by a declarative column catalog per schema version
//
// Each column maps onto a logical attribute name shared by both versions,
// e.g. legacy `revenda.mainid` and final `accounts.byid` both land in `parent_id`.
// Entity types then read attributes by name (see entities::FromRow).

use crate::splitter::RawRow;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// FIELD SPECIFICATION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldKind {
    Int,
    Float,
    Text,
}

/// One column: source name in the dump, logical attribute it fills, type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub column: &'static str,
    pub attribute: &'static str,
    pub kind: FieldKind,
}

impl FieldSpec {
    pub const fn int(column: &'static str, attribute: &'static str) -> Self {
        FieldSpec { column, attribute, kind: FieldKind::Int }
    }

    pub const fn float(column: &'static str, attribute: &'static str) -> Self {
        FieldSpec { column, attribute, kind: FieldKind::Float }
    }

    pub const fn text(column: &'static str, attribute: &'static str) -> Self {
        FieldSpec { column, attribute, kind: FieldKind::Text }
    }
}

/// Which record type a table decodes into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TableKind {
    Category,
    Reseller,
    EndUser,
    Assignment,
}

impl TableKind {
    pub fn name(&self) -> &'static str {
        match self {
            TableKind::Category => "Category",
            TableKind::Reseller => "Reseller",
            TableKind::EndUser => "EndUser",
            TableKind::Assignment => "Assignment",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TableSchema {
    pub table: &'static str,
    pub kind: TableKind,
    pub fields: &'static [FieldSpec],
}

// ============================================================================
// SCHEMA CATALOG
// ============================================================================

const CATEGORIES: &[FieldSpec] = &[
    FieldSpec::int("id", "id"),
    FieldSpec::int("subid", "sub_id"),
    FieldSpec::text("nome", "name"),
];

const LEGACY_RESELLERS: &[FieldSpec] = &[
    FieldSpec::int("id", "id"),
    FieldSpec::int("mainid", "parent_id"),
    FieldSpec::text("login", "login"),
    FieldSpec::text("senha", "password"),
    FieldSpec::text("numero", "contact"),
    FieldSpec::float("valor", "value"),
    FieldSpec::int("limite", "limit"),
    FieldSpec::text("modo", "mode"),
    FieldSpec::text("data", "expiry"),
    FieldSpec::int("limite_use", "limit_used"),
    FieldSpec::int("categoria", "category_id"),
    FieldSpec::int("sub", "sub"),
    FieldSpec::int("expirado", "expired"),
    FieldSpec::text("textorev", "reseller_text"),
    FieldSpec::text("textouser", "user_text"),
    FieldSpec::text("apikey", "api_key"),
    FieldSpec::int("notificado", "notified"),
    FieldSpec::text("texto_teste", "trial_text"),
    FieldSpec::float("valor_teste", "trial_value"),
    FieldSpec::int("v2ray_teste", "trial_v2ray"),
];

const LEGACY_END_USERS: &[FieldSpec] = &[
    FieldSpec::int("id", "id"),
    FieldSpec::int("mainid", "parent_id"),
    FieldSpec::int("subid", "sub_id"),
    FieldSpec::text("login", "login"),
    FieldSpec::text("senha", "password"),
    FieldSpec::text("nome", "name"),
    FieldSpec::text("validade", "expiry"),
    FieldSpec::float("valor", "value"),
    FieldSpec::int("notificado", "notified"),
    FieldSpec::text("whatsapp", "contact"),
    FieldSpec::text("uuid", "uuid"),
    FieldSpec::int("status", "status"),
    FieldSpec::int("limite", "limit"),
    FieldSpec::int("suspenso", "suspended"),
    FieldSpec::int("periodo", "period"),
    FieldSpec::int("teste", "trial"),
    FieldSpec::text("telegram", "telegram"),
];

const FINAL_RESELLERS: &[FieldSpec] = &[
    FieldSpec::int("id", "id"),
    FieldSpec::text("nome", "name"),
    FieldSpec::text("contato", "contact"),
    FieldSpec::text("login", "login"),
    FieldSpec::text("token", "token"),
    FieldSpec::text("mb", "mb"),
    FieldSpec::text("senha", "password"),
    FieldSpec::int("byid", "parent_id"),
    FieldSpec::text("mainid", "group_key"),
    FieldSpec::text("accesstoken", "access_token"),
    FieldSpec::text("valorusuario", "user_price"),
    FieldSpec::text("valorrevenda", "reseller_price"),
    FieldSpec::text("idtelegram", "telegram"),
    FieldSpec::text("tempo", "duration"),
    FieldSpec::text("tokenvenda", "sale_token"),
    FieldSpec::text("tokenpaghiper", "payment_token"),
    FieldSpec::text("formadepag", "payment_method"),
    FieldSpec::text("whatsapp", "whatsapp"),
];

const FINAL_END_USERS: &[FieldSpec] = &[
    FieldSpec::int("id", "id"),
    FieldSpec::int("byid", "parent_id"),
    FieldSpec::int("categoriaid", "sub_id"),
    FieldSpec::int("limite", "limit"),
    FieldSpec::int("bycredit", "by_credit"),
    FieldSpec::text("login", "login"),
    FieldSpec::text("senha", "password"),
    FieldSpec::text("mainid", "group_key"),
    FieldSpec::text("expira", "expiry"),
    FieldSpec::text("lastview", "last_view"),
    FieldSpec::int("status", "status"),
    FieldSpec::text("valormensal", "monthly_value"),
    FieldSpec::int("notificado", "notified"),
    FieldSpec::text("whatsapp", "whatsapp"),
    FieldSpec::text("uuid", "uuid"),
    FieldSpec::text("deviceid", "device_id"),
    FieldSpec::text("deviceativo", "device_active"),
];

const FINAL_ASSIGNMENTS: &[FieldSpec] = &[
    FieldSpec::int("id", "id"),
    FieldSpec::text("valor", "value"),
    FieldSpec::int("categoriaid", "category_id"),
    FieldSpec::int("userid", "user_id"),
    FieldSpec::int("byid", "owner_id"),
    FieldSpec::int("limite", "limit"),
    FieldSpec::int("limitetest", "trial_limit"),
    FieldSpec::text("tipo", "mode"),
    FieldSpec::text("expira", "expiry"),
    FieldSpec::int("subrev", "sub_reseller"),
    FieldSpec::int("suspenso", "suspended"),
    FieldSpec::text("valormensal", "monthly_value"),
    FieldSpec::text("notificado", "notified"),
];

const LEGACY_TABLES: &[TableSchema] = &[
    TableSchema { table: "categorias", kind: TableKind::Category, fields: CATEGORIES },
    TableSchema { table: "revenda", kind: TableKind::Reseller, fields: LEGACY_RESELLERS },
    TableSchema { table: "usuarios", kind: TableKind::EndUser, fields: LEGACY_END_USERS },
];

const FINAL_TABLES: &[TableSchema] = &[
    TableSchema { table: "categorias", kind: TableKind::Category, fields: CATEGORIES },
    TableSchema { table: "accounts", kind: TableKind::Reseller, fields: FINAL_RESELLERS },
    TableSchema { table: "ssh_accounts", kind: TableKind::EndUser, fields: FINAL_END_USERS },
    TableSchema { table: "atribuidos", kind: TableKind::Assignment, fields: FINAL_ASSIGNMENTS },
];

/// Dump layout. Fixed per version, never inferred from content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchemaVersion {
    Legacy,
    Final,
}

impl SchemaVersion {
    pub fn tables(&self) -> &'static [TableSchema] {
        match self {
            SchemaVersion::Legacy => LEGACY_TABLES,
            SchemaVersion::Final => FINAL_TABLES,
        }
    }

    pub fn table_names(&self) -> Vec<&'static str> {
        self.tables().iter().map(|t| t.table).collect()
    }

    pub fn schema_for(&self, table: &str) -> Option<&'static TableSchema> {
        self.tables()
            .iter()
            .find(|t| t.table.eq_ignore_ascii_case(table))
    }
}

// ============================================================================
// DECODED VALUES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Int(i64),
    Float(f64),
    Text(String),
}

/// A row after positional decoding, addressable by logical attribute
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedRow {
    values: HashMap<&'static str, Value>,
}

impl DecodedRow {
    /// Integer attribute; absent or non-integer → 0
    pub fn int(&self, attribute: &str) -> i64 {
        match self.values.get(attribute) {
            Some(Value::Int(v)) => *v,
            Some(Value::Float(v)) => *v as i64,
            _ => 0,
        }
    }

    /// Float attribute; absent → 0.0
    pub fn float(&self, attribute: &str) -> f64 {
        match self.values.get(attribute) {
            Some(Value::Float(v)) => *v,
            Some(Value::Int(v)) => *v as f64,
            _ => 0.0,
        }
    }

    /// Text attribute; absent → ""
    pub fn text(&self, attribute: &str) -> String {
        match self.values.get(attribute) {
            Some(Value::Text(v)) => v.clone(),
            Some(Value::Int(v)) => v.to_string(),
            Some(Value::Float(v)) => v.to_string(),
            None => String::new(),
        }
    }
}

impl TableSchema {
    /// Decode one row of raw fields. Total: never fails.
    ///
    /// Rows shorter than the schema are padded with "", extra fields are ignored.
    pub fn decode(&self, fields: &[String]) -> DecodedRow {
        let mut values = HashMap::with_capacity(self.fields.len());

        for (idx, spec) in self.fields.iter().enumerate() {
            let raw = fields.get(idx).map(String::as_str).unwrap_or("");
            let value = match spec.kind {
                FieldKind::Int => Value::Int(parse_int_lenient(raw)),
                FieldKind::Float => Value::Float(parse_float_lenient(raw)),
                FieldKind::Text => Value::Text(raw.trim().to_string()),
            };
            values.insert(spec.attribute, value);
        }

        DecodedRow { values }
    }

    /// A tuple that mostly repeats this table's column names is a header, not data
    pub fn is_header_row(&self, fields: &[String]) -> bool {
        if fields.is_empty() {
            return false;
        }

        let matches = fields
            .iter()
            .filter(|f| {
                let name = f.trim_matches(|c: char| c.is_whitespace() || c == '`' || c == '\'' || c == '"');
                !name.is_empty()
                    && self
                        .fields
                        .iter()
                        .any(|spec| spec.column.eq_ignore_ascii_case(name))
            })
            .count();

        matches > fields.len() / 2
    }
}

// ============================================================================
// LENIENT NUMBER PARSING
// ============================================================================

/// Parse an integer the forgiving way dumps need:
/// full parse, else leading numeric prefix ("12abc" → 12, "9.90" → 9), else 0
pub fn parse_int_lenient(raw: &str) -> i64 {
    let s = raw.trim();
    if let Ok(v) = s.parse::<i64>() {
        return v;
    }

    let prefix = numeric_prefix(s, false);
    prefix.parse::<i64>().unwrap_or(0)
}

/// Same as parse_int_lenient, allowing one decimal point and exponent-free floats
pub fn parse_float_lenient(raw: &str) -> f64 {
    let s = raw.trim();
    if let Ok(v) = s.parse::<f64>() {
        if v.is_finite() {
            return v;
        }
    }

    let prefix = numeric_prefix(s, true);
    prefix.parse::<f64>().unwrap_or(0.0)
}

fn numeric_prefix(s: &str, allow_dot: bool) -> &str {
    let mut end = 0;
    let mut seen_digit = false;
    let mut seen_dot = false;

    for (idx, c) in s.char_indices() {
        let ok = match c {
            '+' | '-' => idx == 0,
            '0'..='9' => {
                seen_digit = true;
                true
            }
            '.' if allow_dot && !seen_dot => {
                seen_dot = true;
                true
            }
            _ => false,
        };
        if !ok {
            break;
        }
        end = idx + c.len_utf8();
    }

    if seen_digit {
        s[..end].trim_end_matches('.')
    } else {
        ""
    }
}

// ============================================================================
// TABLE-LEVEL DECODING
// ============================================================================

/// Decoded rows of one dump, grouped by record kind, in source order
#[derive(Debug, Clone, Default)]
pub struct DecodedTables {
    pub rows: HashMap<TableKind, Vec<DecodedRow>>,
    pub header_rows_skipped: usize,
    pub rows_per_table: HashMap<String, usize>,
}

impl DecodedTables {
    pub fn rows_of(&self, kind: TableKind) -> &[DecodedRow] {
        self.rows.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Decode every raw row against the schema version's catalog.
/// Rows for tables outside the catalog are ignored.
pub fn decode_rows(version: SchemaVersion, raw_rows: &[RawRow]) -> DecodedTables {
    let mut tables = DecodedTables::default();

    for raw in raw_rows {
        let Some(schema) = version.schema_for(&raw.table) else {
            continue;
        };

        if schema.is_header_row(&raw.fields) {
            tables.header_rows_skipped += 1;
            continue;
        }

        *tables.rows_per_table.entry(schema.table.to_string()).or_insert(0) += 1;
        tables
            .rows
            .entry(schema.kind)
            .or_default()
            .push(schema.decode(&raw.fields));
    }

    tables
}

// ============================================================================
// TESTS
// ============================================================================
