//! Financial and career outlook per stream.
//!
//! Loaded once at start and never mutated during a session. A recommended
//! stream without an entry is a legitimate outcome: the recommendation
//! stands, the financial section is omitted.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::stream::StreamLabel;

/// A role reachable from a stream and its typical yearly salary (INR).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CareerOutlook {
    pub role: String,
    pub average_salary: u64,
}

/// Cost and career record for one stream. Amounts are whole rupees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub stream: StreamLabel,
    pub description: String,
    /// 11th–12th coaching cost.
    pub coaching_fee: u64,
    /// Total college cost, lower bound.
    pub college_fee_min: u64,
    /// Total college cost, upper bound.
    pub college_fee_max: u64,
    pub careers: Vec<CareerOutlook>,
}

impl CatalogEntry {
    /// Coaching plus the cheapest college path. Always derived, never stored.
    pub fn min_investment(&self) -> u64 {
        self.coaching_fee.saturating_add(self.college_fee_min)
    }

    /// Coaching plus the most expensive college path.
    pub fn max_investment(&self) -> u64 {
        self.coaching_fee.saturating_add(self.college_fee_max)
    }
}

/// What the presentation layer receives: the entry plus derived figures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogView {
    #[serde(flatten)]
    pub entry: CatalogEntry,
    pub min_investment: u64,
    pub max_investment: u64,
}

impl From<&CatalogEntry> for CatalogView {
    fn from(entry: &CatalogEntry) -> Self {
        Self {
            entry: entry.clone(),
            min_investment: entry.min_investment(),
            max_investment: entry.max_investment(),
        }
    }
}

/// Outcome of a catalog lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogLookup {
    Found(CatalogView),
    /// Valid stream, no financial record.
    Missing,
}

impl CatalogLookup {
    pub fn into_view(self) -> Option<CatalogView> {
        match self {
            Self::Found(view) => Some(view),
            Self::Missing => None,
        }
    }
}

/// Read-only stream → entry map.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: HashMap<StreamLabel, CatalogEntry>,
}

impl Catalog {
    /// Build from entries. A later entry for the same stream replaces an
    /// earlier one.
    pub fn from_entries(entries: impl IntoIterator<Item = CatalogEntry>) -> Self {
        Self {
            entries: entries.into_iter().map(|e| (e.stream, e)).collect(),
        }
    }

    /// Pure keyed read.
    pub fn lookup(&self, stream: StreamLabel) -> Option<&CatalogEntry> {
        self.entries.get(&stream)
    }

    /// Lookup wrapped for presentation.
    pub fn view(&self, stream: StreamLabel) -> CatalogLookup {
        match self.lookup(stream) {
            Some(entry) => CatalogLookup::Found(CatalogView::from(entry)),
            None => CatalogLookup::Missing,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries ordered by `StreamLabel::ALL`.
    pub fn entries(&self) -> Vec<&CatalogEntry> {
        StreamLabel::ALL
            .iter()
            .filter_map(|s| self.entries.get(s))
            .collect()
    }

    /// The built-in seed data.
    pub fn builtin() -> Self {
        Self::from_entries(builtin_entries())
    }
}

fn career(role: &str, average_salary: u64) -> CareerOutlook {
    CareerOutlook {
        role: role.to_string(),
        average_salary,
    }
}

/// Seed entries, also used by the store's seeding migration.
pub fn builtin_entries() -> Vec<CatalogEntry> {
    vec![
        CatalogEntry {
            stream: StreamLabel::SciencePcm,
            description: "Engineering, Tech, Physics".to_string(),
            coaching_fee: 200_000,
            college_fee_min: 800_000,
            college_fee_max: 1_500_000,
            careers: vec![
                career("Software Engineer", 600_000),
                career("Data Scientist", 800_000),
            ],
        },
        CatalogEntry {
            stream: StreamLabel::SciencePcb,
            description: "Medicine, Biology, Life Sciences".to_string(),
            coaching_fee: 250_000,
            college_fee_min: 500_000,
            college_fee_max: 5_000_000,
            careers: vec![career("Doctor (MBBS)", 1_000_000), career("Pharmacist", 400_000)],
        },
        CatalogEntry {
            stream: StreamLabel::CommerceCa,
            description: "Chartered Accountancy, Audit, Taxation".to_string(),
            coaching_fee: 150_000,
            college_fee_min: 200_000,
            college_fee_max: 600_000,
            careers: vec![
                career("Chartered Accountant", 900_000),
                career("Tax Consultant", 650_000),
            ],
        },
        CatalogEntry {
            stream: StreamLabel::Commerce,
            description: "Business, Finance, Law".to_string(),
            coaching_fee: 80_000,
            college_fee_min: 400_000,
            college_fee_max: 1_000_000,
            careers: vec![
                career("Chartered Accountant", 750_000),
                career("Bank Manager", 600_000),
            ],
        },
        CatalogEntry {
            stream: StreamLabel::Arts,
            description: "Humanities, Design, Psychology".to_string(),
            coaching_fee: 60_000,
            college_fee_min: 300_000,
            college_fee_max: 800_000,
            careers: vec![
                career("Graphic Designer", 400_000),
                career("Psychologist", 500_000),
            ],
        },
    ]
}
