//! Market data model shared by the collectors, the aggregator, and the
//! report formatter.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod aggregate;
pub mod report;

pub use report::MarketReport;

/// One collected game: a popularity-listing entry merged with its detail
/// lookup (and an optional storefront release-date lookup). Immutable once
/// collected; derived stats are always recomputed from scratch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameRecord {
    pub name: String,
    /// Midpoint of the provider's ownership-range string.
    pub owners: u64,
    pub average_playtime_minutes: u32,
    pub release_year: Option<i32>,
    pub genres: Vec<String>,
    pub tags: Vec<String>,
    pub price_cents: u32,
}

/// Per-genre aggregate, recomputed each collection cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenreStat {
    pub genre: String,
    pub game_count: usize,
    pub total_owners: u64,
    pub avg_price: f64,
    pub avg_playtime: f64,
}

/// Per-tag aggregate; `co_occurring` lists the other tags sharing a record,
/// ranked by co-occurrence count descending.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagStat {
    pub tag: String,
    pub game_count: usize,
    pub total_owners: u64,
    pub avg_price: f64,
    pub co_occurring: Vec<(String, usize)>,
}

/// Price buckets used for tiered owner statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PriceTier {
    Free,
    UnderTen,
    TenToThirty,
    OverThirty,
}

impl PriceTier {
    /// Fixed report order.
    pub const ALL: [PriceTier; 4] = [
        PriceTier::Free,
        PriceTier::UnderTen,
        PriceTier::TenToThirty,
        PriceTier::OverThirty,
    ];

    /// The $30 boundary is inclusive: 3000 cents still counts as $10~$30.
    pub fn classify(price_cents: u32) -> Self {
        match price_cents {
            0 => PriceTier::Free,
            1..=999 => PriceTier::UnderTen,
            1000..=3000 => PriceTier::TenToThirty,
            _ => PriceTier::OverThirty,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PriceTier::Free => "free",
            PriceTier::UnderTen => "~$10",
            PriceTier::TenToThirty => "$10~$30",
            PriceTier::OverThirty => "$30+",
        }
    }
}

impl fmt::Display for PriceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceTierStat {
    pub tier: PriceTier,
    pub game_count: usize,
    pub avg_owners: f64,
}

/// The "recent years" filter window; participates in cache keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecencyWindow {
    pub year_min: i32,
    pub year_max: i32,
}

/// Target region for trends and prompt context. `Global` maps to an empty
/// geo code, matching the trends provider's convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Region {
    Kr,
    Us,
    Jp,
    Global,
}

impl Region {
    pub fn geo(&self) -> &'static str {
        match self {
            Region::Kr => "KR",
            Region::Us => "US",
            Region::Jp => "JP",
            Region::Global => "",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Region::Kr => "Korea",
            Region::Us => "United States",
            Region::Jp => "Japan",
            Region::Global => "Global",
        }
    }
}

impl FromStr for Region {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "kr" | "korea" => Ok(Region::Kr),
            "us" | "usa" => Ok(Region::Us),
            "jp" | "japan" => Ok(Region::Jp),
            "global" | "" => Ok(Region::Global),
            other => Err(anyhow::anyhow!(
                "unknown region {other:?} (expected kr, us, jp, or global)"
            )),
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Catalog-side row from the RAWG-shaped provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogGame {
    pub name: String,
    pub release_year: Option<i32>,
    pub rating: f64,
    pub metacritic: Option<i32>,
    pub platforms: Vec<String>,
    pub genres: Vec<String>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogGenre {
    pub name: String,
    pub games_count: u64,
}

/// Parse an ownership-range string like `"10,000 .. 20,000"` into its
/// midpoint. Malformed input yields 0, never an error.
pub fn parse_owners_range(raw: &str) -> u64 {
    let mut parts = raw.split("..");
    let lo = parse_grouped_u64(parts.next().unwrap_or(""));
    let hi = parse_grouped_u64(parts.next().unwrap_or(""));
    match (lo, hi) {
        (Some(lo), Some(hi)) => lo / 2 + hi / 2 + (lo % 2 + hi % 2) / 2,
        (Some(lo), None) if raw.trim().find("..").is_none() => lo,
        _ => 0,
    }
}

fn parse_grouped_u64(raw: &str) -> Option<u64> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| c.is_ascii_digit())
        .collect();
    if cleaned.is_empty() || raw.trim().chars().any(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    cleaned.parse().ok()
}
