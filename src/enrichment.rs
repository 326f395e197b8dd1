// 🧩 Enrichment Engine - Cross-table resolution over a complete dump
//
// Needs every table decoded before it runs:
// 1. Owner resolution      (Reseller hierarchy, root sentinel, "unknown")
// 2. Category resolution   (by sub id, first match wins)
// 3. Contact normalization (placeholder phone-shaped value when blank)
// 4. Expiry normalization  (accepted formats → canonical timestamp, else now)
// 5. Group keys            (one per reseller, then propagated to end users)
// 6. Mode canonicalization (free text → fixed capitalized labels)
//
// Randomness comes only from the generator passed in.

use crate::entities::category::CATEGORY_NOT_FOUND;
use crate::entities::reseller::UNKNOWN_OWNER;
use crate::entities::{
    is_blank, Assignment, Category, CategoryRegistry, DumpTables, EndUser, Reseller,
    ResellerRegistry,
};
use chrono::{NaiveDate, NaiveDateTime};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Canonical timestamp text for every normalized expiry
pub const CANONICAL_TIMESTAMP: &str = "%Y-%m-%d %H:%M:%S";

/// Country prefix of synthesized contacts
pub const CONTACT_COUNTRY_PREFIX: &str = "55";

/// Mobile indicator digit placed after the area code
pub const CONTACT_MOBILE_DIGIT: char = '9';

/// Length of a synthesized contact: prefix(2) + area(2) + indicator(1) + subscriber(9)
pub const SYNTHESIZED_CONTACT_LEN: usize = 14;

/// Group key pinned to the root identity
pub const ROOT_GROUP_KEY: &str = "0";

/// Domain appended to logins to build an address
pub const ADDRESS_DOMAIN: &str = "@gmail.com";

/// Accepted expiry layouts, tried in order
const EXPIRY_TIMESTAMP_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];
const EXPIRY_DATE_FORMATS: &[&str] = &["%Y-%m-%d"];

/// Mode labels recognized case-insensitively
const MODE_LABELS: &[&str] = &["Validade", "Credito"];

// ============================================================================
// NORMALIZERS
// ============================================================================

/// Where a normalized expiry came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpirySource {
    /// Parsed from one of the accepted formats
    Parsed,
    /// Raw value was empty; processing time used
    Blank,
    /// Raw value matched no format; processing time used
    Unparseable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedExpiry {
    pub text: String,
    pub source: ExpirySource,
}

impl NormalizedExpiry {
    pub fn is_defaulted(&self) -> bool {
        self.source != ExpirySource::Parsed
    }
}

/// Parse an expiry against the accepted formats, falling back to `now`.
///
/// The fallback makes "malformed" and "expires now" look identical in the
/// output text; `source` keeps them apart.
pub fn normalize_expiry(raw: &str, now: NaiveDateTime) -> NormalizedExpiry {
    let value = raw.trim();

    if value.is_empty() {
        return NormalizedExpiry {
            text: now.format(CANONICAL_TIMESTAMP).to_string(),
            source: ExpirySource::Blank,
        };
    }

    let parsed = EXPIRY_TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .or_else(|| {
            EXPIRY_DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        });

    match parsed {
        Some(ts) => NormalizedExpiry {
            text: ts.format(CANONICAL_TIMESTAMP).to_string(),
            source: ExpirySource::Parsed,
        },
        None => NormalizedExpiry {
            text: now.format(CANONICAL_TIMESTAMP).to_string(),
            source: ExpirySource::Unparseable,
        },
    }
}

/// Placeholder phone-shaped contact: 55 + area [10,99] + 9 + 9 digits
pub fn synthesize_contact<R: Rng + ?Sized>(rng: &mut R) -> String {
    let area: u32 = rng.gen_range(10..=99);
    let subscriber: u32 = rng.gen_range(100_000_000..=999_999_999);
    format!(
        "{}{}{}{}",
        CONTACT_COUNTRY_PREFIX, area, CONTACT_MOBILE_DIGIT, subscriber
    )
}

/// 6-digit pseudo-random group key
pub fn generate_group_key<R: Rng + ?Sized>(rng: &mut R) -> String {
    rng.gen_range(100_000..=999_999u32).to_string()
}

/// Map a free-text mode onto a fixed label; anything else passes through trimmed
pub fn canonical_mode(raw: &str) -> String {
    let mode = raw.trim();
    MODE_LABELS
        .iter()
        .find(|label| label.eq_ignore_ascii_case(mode))
        .map(|label| label.to_string())
        .unwrap_or_else(|| mode.to_string())
}

/// login + fixed domain
pub fn synthesized_address(login: &str) -> String {
    format!("{}{}", login.trim(), ADDRESS_DOMAIN)
}

// ============================================================================
// CONTACT POLICY
// ============================================================================

/// How a table's contact field is filled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactRule {
    /// Keep non-blank values, synthesize a random placeholder otherwise
    SynthesizeIfBlank,
    /// Keep non-blank values, use a fixed placeholder otherwise
    PlaceholderIfBlank(&'static str),
    /// Ignore the source value, always use a fixed placeholder
    AlwaysPlaceholder(&'static str),
    /// Keep the source value, blank or not
    KeepAsIs,
}

/// Per-table contact rules, supplied by the export shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContactPolicy {
    pub resellers: ContactRule,
    pub end_users: ContactRule,
}

impl Default for ContactPolicy {
    fn default() -> Self {
        ContactPolicy {
            resellers: ContactRule::SynthesizeIfBlank,
            end_users: ContactRule::SynthesizeIfBlank,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContactSource {
    Original,
    Synthesized,
    Placeholder,
}

fn apply_contact_rule<R: Rng + ?Sized>(
    rule: ContactRule,
    raw: &str,
    rng: &mut R,
) -> (String, ContactSource) {
    match rule {
        ContactRule::AlwaysPlaceholder(p) => (p.to_string(), ContactSource::Placeholder),
        _ if !is_blank(raw) => (raw.trim().to_string(), ContactSource::Original),
        ContactRule::PlaceholderIfBlank(p) => (p.to_string(), ContactSource::Placeholder),
        ContactRule::SynthesizeIfBlank => (synthesize_contact(rng), ContactSource::Synthesized),
        ContactRule::KeepAsIs => (raw.trim().to_string(), ContactSource::Original),
    }
}

// ============================================================================
// ENRICHED RECORDS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedReseller {
    pub record: Reseller,
    pub owner: String,
    pub category_name: String,
    pub contact: String,
    pub contact_source: ContactSource,
    pub expiry: NormalizedExpiry,
    pub mode: String,
    pub group_key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedEndUser {
    pub record: EndUser,
    pub owner: String,
    pub category_name: String,
    pub contact: String,
    pub contact_source: ContactSource,
    pub expiry: NormalizedExpiry,
    /// Inherited from the owning reseller ("0" when it has none)
    pub group_key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedAssignment {
    pub record: Assignment,
    pub mode: String,
    pub expiry: NormalizedExpiry,
}

/// Counters of every condition that was absorbed instead of failing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentStats {
    pub synthesized_contacts: usize,
    pub placeholder_contacts: usize,
    pub blank_expiries: usize,
    pub unparseable_expiries: usize,
    pub unknown_owners: usize,
    pub missing_categories: usize,
    pub duplicate_category_sub_ids: Vec<i64>,
}

impl EnrichmentStats {
    fn count_contact(&mut self, source: ContactSource) {
        match source {
            ContactSource::Synthesized => self.synthesized_contacts += 1,
            ContactSource::Placeholder => self.placeholder_contacts += 1,
            ContactSource::Original => {}
        }
    }

    fn count_expiry(&mut self, expiry: &NormalizedExpiry) {
        match expiry.source {
            ExpirySource::Blank => self.blank_expiries += 1,
            ExpirySource::Unparseable => self.unparseable_expiries += 1,
            ExpirySource::Parsed => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enriched {
    pub categories: Vec<Category>,
    pub resellers: Vec<EnrichedReseller>,
    pub end_users: Vec<EnrichedEndUser>,
    pub assignments: Vec<EnrichedAssignment>,
    pub stats: EnrichmentStats,
}

// ============================================================================
// ENRICHMENT ENGINE
// ============================================================================

pub struct EnrichmentEngine<'a> {
    tables: &'a DumpTables,
    categories: CategoryRegistry<'a>,
    resellers: ResellerRegistry<'a>,
    policy: ContactPolicy,
    now: NaiveDateTime,
}

impl<'a> EnrichmentEngine<'a> {
    pub fn new(tables: &'a DumpTables, policy: ContactPolicy, now: NaiveDateTime) -> Self {
        EnrichmentEngine {
            tables,
            categories: CategoryRegistry::new(&tables.categories),
            resellers: ResellerRegistry::new(&tables.resellers),
            policy,
            now,
        }
    }

    fn owner_of(&self, id: i64, parent_id: i64, stats: &mut EnrichmentStats) -> String {
        match self.resellers.owner_login(id, parent_id) {
            Some(login) => login.to_string(),
            None => {
                warn!(id, parent_id, "owner not found");
                stats.unknown_owners += 1;
                UNKNOWN_OWNER.to_string()
            }
        }
    }

    fn category_of(&self, sub_id: i64, stats: &mut EnrichmentStats) -> String {
        match self.categories.name_for(sub_id) {
            Some(name) => name.to_string(),
            None => {
                warn!(sub_id, "category not found");
                stats.missing_categories += 1;
                CATEGORY_NOT_FOUND.to_string()
            }
        }
    }

    /// Run every pass. Resellers first (they mint group keys), then end users.
    pub fn run<R: Rng + ?Sized>(&self, rng: &mut R) -> Enriched {
        let mut stats = EnrichmentStats {
            duplicate_category_sub_ids: self.categories.duplicate_sub_ids(),
            ..Default::default()
        };

        // Pass 1: resellers, minting one group key each
        let mut group_keys: HashMap<i64, String> = HashMap::with_capacity(self.tables.resellers.len());
        let mut resellers = Vec::with_capacity(self.tables.resellers.len());

        for reseller in &self.tables.resellers {
            let owner = self.owner_of(reseller.id, reseller.parent_id, &mut stats);
            let category_name = self.category_of(reseller.category_id, &mut stats);
            let (contact, contact_source) =
                apply_contact_rule(self.policy.resellers, &reseller.contact, rng);
            stats.count_contact(contact_source);

            let expiry = normalize_expiry(&reseller.expiry, self.now);
            stats.count_expiry(&expiry);

            let group_key = if reseller.is_root() {
                ROOT_GROUP_KEY.to_string()
            } else {
                generate_group_key(rng)
            };
            group_keys
                .entry(reseller.id)
                .or_insert_with(|| group_key.clone());

            resellers.push(EnrichedReseller {
                record: reseller.clone(),
                owner,
                category_name,
                contact,
                contact_source,
                expiry,
                mode: canonical_mode(&reseller.mode),
                group_key,
            });
        }

        // Pass 2: end users inherit the key of their owning reseller.
        // Runs after every key exists; a child may precede its parent in the dump.
        let mut end_users = Vec::with_capacity(self.tables.end_users.len());

        for user in &self.tables.end_users {
            let owner = self.owner_of(user.id, user.parent_id, &mut stats);
            let category_name = self.category_of(user.sub_id, &mut stats);
            let rule = match self.policy.end_users {
                // Loginless rows are not real accounts; nothing to reach
                ContactRule::SynthesizeIfBlank if is_blank(&user.login) => ContactRule::KeepAsIs,
                rule => rule,
            };
            let (contact, contact_source) = apply_contact_rule(rule, &user.contact, rng);
            stats.count_contact(contact_source);

            let expiry = normalize_expiry(&user.expiry, self.now);
            stats.count_expiry(&expiry);

            let group_key = group_keys
                .get(&user.parent_id)
                .cloned()
                .unwrap_or_else(|| ROOT_GROUP_KEY.to_string());

            end_users.push(EnrichedEndUser {
                record: user.clone(),
                owner,
                category_name,
                contact,
                contact_source,
                expiry,
                group_key,
            });
        }

        let assignments = self
            .tables
            .assignments
            .iter()
            .map(|a| {
                let expiry = normalize_expiry(&a.expiry, self.now);
                stats.count_expiry(&expiry);
                EnrichedAssignment {
                    record: a.clone(),
                    mode: canonical_mode(&a.mode),
                    expiry,
                }
            })
            .collect();

        Enriched {
            categories: self.tables.categories.clone(),
            resellers,
            end_users,
            assignments,
            stats,
        }
    }
}

/// Convenience wrapper: build the engine and run it
pub fn enrich<R: Rng + ?Sized>(
    tables: &DumpTables,
    policy: ContactPolicy,
    now: NaiveDateTime,
    rng: &mut R,
) -> Enriched {
    EnrichmentEngine::new(tables, policy, now).run(rng)
}

// ============================================================================
// TESTS
// ============================================================================
