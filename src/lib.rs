//! Market analysis and AI game-planning pipeline.
//!
//! Leaves first: providers fetch raw payloads, the market module aggregates
//! them into stats and a plain-text report, the ai module turns reports and
//! keywords into ideas, design documents, surveys, and recommendations, and
//! the session module gates the multi-step flow. This file holds the glue
//! that wires providers into `MarketData` and `MarketReport`.

pub mod ai;
pub mod market;
pub mod providers;
pub mod session;

pub mod util {
    pub mod env;
}

use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Utc;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use market::aggregate::{
    blue_ocean_genres, genre_stats, keyword_overlaps, missing_tag_pairs, platform_counts,
    price_tier_stats, tag_stats,
};
use market::report::TOP_TAGS_SHOWN;
use market::{CatalogGame, CatalogGenre, GameRecord, MarketReport, RecencyWindow};
use providers::rawg::RawgCatalog;
use providers::steamspy::{SpyDetails, SteamSpy};
use providers::storefront::Storefront;
use session::{FilterParams, TtlCache};

/// Catalog page size used against the RAWG-shaped provider.
const CATALOG_PAGE_SIZE: u32 = 40;

/// Everything one collection cycle fetched, plus the warnings accumulated
/// while degrading around unavailable sources.
#[derive(Debug, Clone, Serialize)]
pub struct MarketData {
    pub records: Vec<GameRecord>,
    pub catalog_games: Vec<CatalogGame>,
    pub catalog_genres: Vec<CatalogGenre>,
    pub warnings: Vec<String>,
}

/// Top listing → per-app details (sequential, paced) → release years
/// (pooled, cancellable) → optional catalog fetch. Every `Unavailable`
/// becomes a warning and the pipeline continues with reduced data. Results
/// are cached under the filter params; a fresh cache hit skips the network
/// entirely.
pub async fn collect_market_data(
    spy: &SteamSpy,
    store: &Storefront,
    catalog: Option<&RawgCatalog>,
    filters: &FilterParams,
    cache: &mut TtlCache<MarketData>,
    cancel: &CancellationToken,
) -> MarketData {
    if let Some(cached) = cache.get(filters) {
        info!(records = cached.records.len(), "collect: serving cached market data");
        return cached;
    }

    let mut warnings: Vec<String> = Vec::new();

    let listing = match spy.top_games().await {
        Ok(listing) => listing,
        Err(e) => {
            warn!(%e, "collect: top listing unavailable");
            warnings.push(e.to_string());
            Default::default()
        }
    };

    // Details sequentially; the spy client paces itself.
    let mut details: Vec<(String, SpyDetails)> = Vec::with_capacity(filters.top_n);
    for appid in listing.keys().take(filters.top_n) {
        if cancel.is_cancelled() {
            warnings.push("collection cancelled before all details were fetched".into());
            break;
        }
        match spy.app_details(appid).await {
            Ok(d) => details.push((appid.clone(), d)),
            Err(e) => {
                warn!(appid = %appid, %e, "collect: details unavailable");
                warnings.push(e.to_string());
            }
        }
    }

    let appids: Vec<String> = details.iter().map(|(id, _)| id.clone()).collect();
    let years = store.release_years(&appids, cancel).await;

    let mut records: Vec<GameRecord> = Vec::with_capacity(details.len());
    for (appid, d) in details {
        let year = years.get(&appid).copied().flatten();
        match assemble_record(d, year) {
            Some(rec) => records.push(rec),
            None => warn!(appid = %appid, "collect: dropping record with zero playtime"),
        }
    }

    let mut catalog_games: Vec<CatalogGame> = Vec::new();
    let mut catalog_genres: Vec<CatalogGenre> = Vec::new();
    if let Some(rawg) = catalog {
        let pages = (filters.sample_size as u32).div_ceil(CATALOG_PAGE_SIZE).max(1);
        match rawg.top_rated(filters.window, pages, CATALOG_PAGE_SIZE).await {
            Ok(games) => catalog_games = games,
            Err(e) => {
                warn!(%e, "collect: catalog games unavailable");
                warnings.push(e.to_string());
            }
        }
        match rawg.genres().await {
            Ok(genres) => catalog_genres = genres,
            Err(e) => {
                warn!(%e, "collect: catalog genres unavailable");
                warnings.push(e.to_string());
            }
        }
    }

    info!(
        records = records.len(),
        catalog = catalog_games.len(),
        warnings = warnings.len(),
        "collect: cycle complete"
    );
    let data = MarketData {
        records,
        catalog_games,
        catalog_genres,
        warnings,
    };
    if worth_caching(&data, cancel.is_cancelled()) {
        cache.put(filters.clone(), data.clone());
    } else {
        warn!("collect: incomplete cycle; result not cached");
    }
    data
}

/// A cancelled cycle holds a truncated detail set, and a cycle that produced
/// no records while warning about provider failures holds nothing useful;
/// serving either from cache for a full TTL would present partial data as a
/// complete collection.
fn worth_caching(data: &MarketData, cancelled: bool) -> bool {
    if cancelled {
        return false;
    }
    !(data.records.is_empty() && !data.warnings.is_empty())
}

/// Zero playtime means the provider had no data for the game, not that
/// nobody plays it; such rows are dropped rather than skewing averages.
fn assemble_record(details: SpyDetails, release_year: Option<i32>) -> Option<GameRecord> {
    if details.average_forever == 0 {
        return None;
    }
    Some(GameRecord {
        name: details.name.clone(),
        owners: details.owners.midpoint(),
        average_playtime_minutes: details.average_forever,
        release_year,
        genres: details.genre_list(),
        tags: details.tags.names(),
        price_cents: details.price.cents(),
    })
}

/// Pure aggregation over already-collected data.
pub fn build_market_report(
    data: &MarketData,
    trend_keywords: Vec<String>,
    live_trends: bool,
    window: RecencyWindow,
) -> MarketReport {
    let tag_stats = tag_stats(&data.records);
    let missing_pairs = missing_tag_pairs(&tag_stats, TOP_TAGS_SHOWN);
    let keyword_overlaps = keyword_overlaps(&trend_keywords, &data.records);
    MarketReport {
        window,
        genre_stats: genre_stats(&data.records),
        price_tiers: price_tier_stats(&data.records),
        platform_counts: platform_counts(&data.catalog_games),
        blue_ocean: blue_ocean_genres(&data.catalog_genres, &data.catalog_games),
        catalog_genres: data.catalog_genres.clone(),
        records: data.records.clone(),
        tag_stats,
        missing_pairs,
        trend_keywords,
        keyword_overlaps,
        live_trends,
    }
}

/// Writes a timestamped JSON snapshot and the rendered report text into
/// `dir`, returning both paths.
pub fn export_snapshot(dir: &Path, report: &MarketReport) -> anyhow::Result<(PathBuf, PathBuf)> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("creating export directory {}", dir.display()))?;
    let stamp = Utc::now().format("%Y%m%dT%H%M%SZ");

    let json_path = dir.join(format!("market_snapshot_{stamp}.json"));
    let json = serde_json::to_string_pretty(report).context("serializing market snapshot")?;
    std::fs::write(&json_path, json)
        .with_context(|| format!("writing {}", json_path.display()))?;

    let text_path = dir.join(format!("market_report_{stamp}.txt"));
    std::fs::write(&text_path, report.render())
        .with_context(|| format!("writing {}", text_path.display()))?;

    Ok((json_path, text_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::steamspy::{OwnersField, PriceField, TagsField};

    fn details(avg: u32) -> SpyDetails {
        SpyDetails {
            name: "Sample".into(),
            owners: OwnersField(Some("10,000 .. 20,000".into())),
            average_forever: avg,
            genre: Some("RPG, Indie".into()),
            tags: TagsField::default(),
            price: PriceField::default(),
        }
    }

    #[test]
    fn zero_playtime_records_are_dropped() {
        assert!(assemble_record(details(0), Some(2024)).is_none());
        let rec = assemble_record(details(95), Some(2024)).unwrap();
        assert_eq!(rec.owners, 15_000);
        assert_eq!(rec.genres, ["RPG", "Indie"]);
        assert_eq!(rec.release_year, Some(2024));
    }

    fn market_data(records: Vec<GameRecord>, warnings: Vec<String>) -> MarketData {
        MarketData {
            records,
            catalog_games: Vec::new(),
            catalog_genres: Vec::new(),
            warnings,
        }
    }

    #[test]
    fn cancelled_or_failed_cycles_are_not_cached() {
        let rec = assemble_record(details(95), Some(2024)).unwrap();

        let complete = market_data(vec![rec], Vec::new());
        assert!(worth_caching(&complete, false));
        // cancellation truncated the detail loop mid-flight
        assert!(!worth_caching(&complete, true));

        // every provider failed: warnings but no records
        let failed = market_data(Vec::new(), vec!["spy: gave up after 3 attempts".into()]);
        assert!(!worth_caching(&failed, false));

        // genuinely empty but warning-free result is still cacheable
        let empty = market_data(Vec::new(), Vec::new());
        assert!(worth_caching(&empty, false));
    }

    #[test]
    fn report_from_empty_data_still_renders() {
        let data = MarketData {
            records: Vec::new(),
            catalog_games: Vec::new(),
            catalog_genres: Vec::new(),
            warnings: vec!["spy is unavailable: timeout".into()],
        };
        let window = RecencyWindow {
            year_min: 2023,
            year_max: 2026,
        };
        let report = build_market_report(&data, vec!["roguelike".into()], false, window);
        let rendered = report.render();
        assert!(rendered.contains("(no genre data)"));
        assert!(!report.live_trends);
    }
}
