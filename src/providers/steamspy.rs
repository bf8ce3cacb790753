//! SteamSpy-shaped popularity provider: top-100 listing, per-app details,
//! and genre/tag listings.
//!
//! The upstream rejects calls above a fixed request rate, so every request
//! goes through a pacer that enforces a hard-floor gap since the previous
//! request (not a backoff). Listings deserialize into `IndexMap` so document
//! order survives; that order defines fetch order for downstream tie-breaks.

use indexmap::IndexMap;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::util::env::{env_opt, env_parse};

use super::{build_client, default_timeout_secs, get_json_with_retries, Unavailable};

const PROVIDER: &str = "spy";
const DEFAULT_BASE_URL: &str = "https://steamspy.com/api.php";
const DEFAULT_REQUEST_GAP_MS: u64 = 1_000;

/// One row of an object-keyed listing (top-100, genre, tag).
#[derive(Debug, Clone, Deserialize)]
pub struct SpyEntry {
    pub name: String,
    #[serde(default)]
    pub owners: OwnersField,
}

/// Per-app detail payload. Fields are lenient: the upstream serves tags as a
/// map or an empty array, and price as a string, a number, or nothing.
#[derive(Debug, Clone, Deserialize)]
pub struct SpyDetails {
    pub name: String,
    #[serde(default)]
    pub owners: OwnersField,
    #[serde(default)]
    pub average_forever: u32,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub tags: TagsField,
    #[serde(default)]
    pub price: PriceField,
}

impl SpyDetails {
    /// Genre CSV split on commas and trimmed; empty entries dropped.
    pub fn genre_list(&self) -> Vec<String> {
        self.genre
            .as_deref()
            .unwrap_or("")
            .split(',')
            .map(str::trim)
            .filter(|g| !g.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Owners-range string, absent on some rows.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct OwnersField(pub Option<String>);

impl OwnersField {
    pub fn midpoint(&self) -> u64 {
        self.0
            .as_deref()
            .map(crate::market::parse_owners_range)
            .unwrap_or(0)
    }
}

/// Tag votes arrive as `{tag: votes}` or as `[]` when a game has none.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TagsField {
    Map(IndexMap<String, u32>),
    Empty(Vec<Value>),
}

impl Default for TagsField {
    fn default() -> Self {
        TagsField::Empty(Vec::new())
    }
}

impl TagsField {
    /// Tag names in document order.
    pub fn names(&self) -> Vec<String> {
        match self {
            TagsField::Map(map) => map.keys().cloned().collect(),
            TagsField::Empty(_) => Vec::new(),
        }
    }
}

/// Price in cents, string-encoded or numeric or absent; anything unparseable
/// reads as 0.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PriceField {
    Text(String),
    Number(u64),
    Missing(Option<()>),
}

impl Default for PriceField {
    fn default() -> Self {
        PriceField::Missing(None)
    }
}

impl PriceField {
    pub fn cents(&self) -> u32 {
        match self {
            PriceField::Text(raw) => raw.trim().parse().unwrap_or(0),
            PriceField::Number(n) => (*n).min(u32::MAX as u64) as u32,
            PriceField::Missing(_) => 0,
        }
    }
}

pub struct SteamSpy {
    http: Client,
    base_url: String,
    gap: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl SteamSpy {
    pub fn from_env() -> anyhow::Result<Self> {
        let base_url =
            env_opt("SPY_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let gap_ms = env_parse("SPY_REQUEST_GAP_MS", DEFAULT_REQUEST_GAP_MS);
        Ok(Self {
            http: build_client(default_timeout_secs())?,
            base_url,
            gap: Duration::from_millis(gap_ms),
            last_request: Mutex::new(None),
        })
    }

    /// Sleep until the configured gap since the previous request has fully
    /// elapsed, then stamp this request.
    async fn pace(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.gap {
                let wait = self.gap - elapsed;
                debug!(wait_ms = wait.as_millis() as u64, "spy: pacing request");
                tokio::time::sleep(wait).await;
            }
        }
        *last = Some(Instant::now());
    }

    async fn paced_get(&self, query: &[(&str, String)]) -> Result<Value, Unavailable> {
        self.pace().await;
        get_json_with_retries(&self.http, PROVIDER, &self.base_url, query).await
    }

    /// Top 100 games of the last two weeks, in document order.
    pub async fn top_games(&self) -> Result<IndexMap<String, SpyEntry>, Unavailable> {
        let value = self
            .paced_get(&[("request", "top100in2weeks".to_string())])
            .await?;
        serde_json::from_value(value).map_err(|e| {
            Unavailable::new(PROVIDER, format!("unexpected top-listing shape: {e}"))
        })
    }

    pub async fn app_details(&self, appid: &str) -> Result<SpyDetails, Unavailable> {
        let value = self
            .paced_get(&[
                ("request", "appdetails".to_string()),
                ("appid", appid.to_string()),
            ])
            .await?;
        serde_json::from_value(value).map_err(|e| {
            Unavailable::new(
                PROVIDER,
                format!("unexpected appdetails shape for {appid}: {e}"),
            )
        })
    }

    pub async fn genre_listing(
        &self,
        genre: &str,
    ) -> Result<IndexMap<String, SpyEntry>, Unavailable> {
        self.listing("genre", genre).await
    }

    pub async fn tag_listing(
        &self,
        tag: &str,
    ) -> Result<IndexMap<String, SpyEntry>, Unavailable> {
        self.listing("tag", tag).await
    }

    async fn listing(
        &self,
        request: &'static str,
        value: &str,
    ) -> Result<IndexMap<String, SpyEntry>, Unavailable> {
        let encoded = urlencoding::encode(value).into_owned();
        let body = self
            .paced_get(&[("request", request.to_string()), (request, encoded)])
            .await?;
        parse_listing(body, request, value)
    }
}

/// Genre and tag listings share the same object-keyed shape as the top
/// listing; the error names which listing failed to decode.
fn parse_listing(
    body: Value,
    request: &str,
    value: &str,
) -> Result<IndexMap<String, SpyEntry>, Unavailable> {
    serde_json::from_value(body).map_err(|e| {
        Unavailable::new(
            PROVIDER,
            format!("unexpected {request} listing shape for {value}: {e}"),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn details_parse_tags_map_and_string_price() {
        let raw = serde_json::json!({
            "name": "Dungeon Depths",
            "owners": "10,000 .. 20,000",
            "average_forever": 340,
            "genre": "Action, RPG",
            "tags": {"Roguelike": 812, "Pixel Graphics": 400},
            "price": "1999"
        });
        let details: SpyDetails = serde_json::from_value(raw).unwrap();
        assert_eq!(details.owners.midpoint(), 15_000);
        assert_eq!(details.genre_list(), ["Action", "RPG"]);
        assert_eq!(details.tags.names(), ["Roguelike", "Pixel Graphics"]);
        assert_eq!(details.price.cents(), 1999);
    }

    #[test]
    fn details_parse_empty_tags_array_and_numeric_price() {
        let raw = serde_json::json!({
            "name": "Quiet Game",
            "average_forever": 12,
            "tags": [],
            "price": 499
        });
        let details: SpyDetails = serde_json::from_value(raw).unwrap();
        assert!(details.tags.names().is_empty());
        assert_eq!(details.price.cents(), 499);
        assert_eq!(details.owners.midpoint(), 0);
        assert!(details.genre_list().is_empty());
    }

    #[test]
    fn details_parse_missing_price() {
        let raw = serde_json::json!({"name": "Bare", "tags": []});
        let details: SpyDetails = serde_json::from_value(raw).unwrap();
        assert_eq!(details.price.cents(), 0);
        assert_eq!(details.average_forever, 0);
    }

    #[test]
    fn listing_preserves_document_order() {
        let raw = r#"{
            "570": {"name": "First", "owners": "100 .. 200"},
            "730": {"name": "Second", "owners": "100 .. 200"},
            "10": {"name": "Third", "owners": "100 .. 200"}
        }"#;
        let listing: IndexMap<String, SpyEntry> = serde_json::from_str(raw).unwrap();
        let names: Vec<&str> = listing.values().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["First", "Second", "Third"]);
    }

    #[test]
    fn genre_and_tag_listings_decode_the_shared_shape() {
        let raw = serde_json::json!({
            "648800": {"name": "Raft", "owners": "2,000,000 .. 5,000,000"},
            "105600": {"name": "Terraria", "owners": "5,000,000 .. 10,000,000"}
        });
        let listing = parse_listing(raw, "genre", "Early Access").unwrap();
        assert_eq!(listing.len(), 2);
        assert_eq!(listing["648800"].name, "Raft");
        assert_eq!(listing["648800"].owners.midpoint(), 3_500_000);

        let err = parse_listing(serde_json::json!(["not", "a", "map"]), "tag", "Co-op")
            .unwrap_err();
        assert!(err.to_string().contains("tag listing shape for Co-op"), "{err}");
    }
}
