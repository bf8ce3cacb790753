//! Aggregation over collected records: genre/tag/price-tier statistics,
//! tag co-occurrence, blue-ocean detection, and trend keyword overlaps.
//!
//! All accumulators are insertion-ordered maps keyed in fetch order, so equal
//! sort keys preserve the original fetch order under the stable sorts below.
//! A zero playtime means "no data" and is excluded from playtime averages
//! rather than dragging the denominator down.

use indexmap::IndexMap;
use itertools::Itertools;
use serde::Serialize;
use strsim::jaro_winkler;

use super::{CatalogGame, CatalogGenre, GameRecord, GenreStat, PriceTier, PriceTierStat, TagStat};

/// Minimum similarity (Jaro-Winkler on normalized forms) for a trend keyword
/// to be matched against a tag.
pub const MIN_KEYWORD_SIMILARITY: f64 = 0.90;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlueOceanEntry {
    pub genre: String,
    pub games_count: u64,
    pub avg_rating: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeywordOverlap {
    pub keyword: String,
    pub matched_tag: String,
    pub game_count: usize,
}

#[derive(Default)]
struct Acc {
    game_count: usize,
    total_owners: u64,
    price_sum: u64,
    playtime_sum: u64,
    playtime_n: usize,
}

impl Acc {
    fn push(&mut self, rec: &GameRecord) {
        self.game_count += 1;
        self.total_owners += rec.owners;
        self.price_sum += rec.price_cents as u64;
        if rec.average_playtime_minutes > 0 {
            self.playtime_sum += rec.average_playtime_minutes as u64;
            self.playtime_n += 1;
        }
    }

    fn avg_price(&self) -> f64 {
        if self.game_count == 0 {
            0.0
        } else {
            self.price_sum as f64 / self.game_count as f64
        }
    }

    fn avg_playtime(&self) -> f64 {
        if self.playtime_n == 0 {
            0.0
        } else {
            self.playtime_sum as f64 / self.playtime_n as f64
        }
    }
}

/// Per-genre statistics, sorted by total owners descending (stable).
pub fn genre_stats(records: &[GameRecord]) -> Vec<GenreStat> {
    let mut by_genre: IndexMap<&str, Acc> = IndexMap::new();
    for rec in records {
        for genre in &rec.genres {
            by_genre.entry(genre.as_str()).or_default().push(rec);
        }
    }
    let mut stats: Vec<GenreStat> = by_genre
        .into_iter()
        .map(|(genre, acc)| GenreStat {
            genre: genre.to_string(),
            game_count: acc.game_count,
            total_owners: acc.total_owners,
            avg_price: acc.avg_price(),
            avg_playtime: acc.avg_playtime(),
        })
        .collect();
    stats.sort_by(|a, b| b.total_owners.cmp(&a.total_owners));
    stats
}

/// Per-tag statistics with ranked co-occurring tags, sorted by total owners
/// descending (stable).
pub fn tag_stats(records: &[GameRecord]) -> Vec<TagStat> {
    let mut by_tag: IndexMap<&str, Acc> = IndexMap::new();
    let mut pairs: IndexMap<&str, IndexMap<&str, usize>> = IndexMap::new();

    for rec in records {
        for tag in &rec.tags {
            by_tag.entry(tag.as_str()).or_default().push(rec);
        }
        for (a, b) in rec.tags.iter().tuple_combinations() {
            *pairs
                .entry(a.as_str())
                .or_default()
                .entry(b.as_str())
                .or_default() += 1;
            *pairs
                .entry(b.as_str())
                .or_default()
                .entry(a.as_str())
                .or_default() += 1;
        }
    }

    let mut stats: Vec<TagStat> = by_tag
        .into_iter()
        .map(|(tag, acc)| {
            let mut co: Vec<(String, usize)> = pairs
                .get(tag)
                .map(|m| m.iter().map(|(t, n)| (t.to_string(), *n)).collect())
                .unwrap_or_default();
            co.sort_by(|a, b| b.1.cmp(&a.1));
            TagStat {
                tag: tag.to_string(),
                game_count: acc.game_count,
                total_owners: acc.total_owners,
                avg_price: acc.avg_price(),
                co_occurring: co,
            }
        })
        .collect();
    stats.sort_by(|a, b| b.total_owners.cmp(&a.total_owners));
    stats
}

/// Among the `top_k` tags by owners, the unordered pairs that never co-occur
/// on any record, ranked by combined owners descending. These are the
/// candidate blue-ocean tag combinations.
pub fn missing_tag_pairs(stats: &[TagStat], top_k: usize) -> Vec<(String, String, u64)> {
    let top = &stats[..stats.len().min(top_k)];
    let mut missing: Vec<(String, String, u64)> = Vec::new();
    for (a, b) in top.iter().tuple_combinations() {
        let together = a.co_occurring.iter().any(|(t, _)| t == &b.tag);
        if !together {
            missing.push((a.tag.clone(), b.tag.clone(), a.total_owners + b.total_owners));
        }
    }
    missing.sort_by(|a, b| b.2.cmp(&a.2));
    missing
}

/// Game count and average owners per price tier, in fixed tier order.
pub fn price_tier_stats(records: &[GameRecord]) -> Vec<PriceTierStat> {
    PriceTier::ALL
        .iter()
        .map(|tier| {
            let members: Vec<&GameRecord> = records
                .iter()
                .filter(|r| PriceTier::classify(r.price_cents) == *tier)
                .collect();
            let avg_owners = if members.is_empty() {
                0.0
            } else {
                members.iter().map(|r| r.owners).sum::<u64>() as f64 / members.len() as f64
            };
            PriceTierStat {
                tier: *tier,
                game_count: members.len(),
                avg_owners,
            }
        })
        .collect()
}

/// Games per platform across catalog rows, count descending (stable).
pub fn platform_counts(catalog_games: &[CatalogGame]) -> Vec<(String, usize)> {
    let mut counts: IndexMap<&str, usize> = IndexMap::new();
    for game in catalog_games {
        for platform in &game.platforms {
            *counts.entry(platform.as_str()).or_default() += 1;
        }
    }
    let mut out: Vec<(String, usize)> = counts
        .into_iter()
        .map(|(p, n)| (p.to_string(), n))
        .collect();
    out.sort_by(|a, b| b.1.cmp(&a.1));
    out
}

/// Genres with below-median supply (catalog `games_count`) whose sampled
/// average rating is at or above the overall sample average, ranked by
/// average rating descending.
pub fn blue_ocean_genres(
    catalog_genres: &[CatalogGenre],
    catalog_games: &[CatalogGame],
) -> Vec<BlueOceanEntry> {
    if catalog_genres.is_empty() || catalog_games.is_empty() {
        return Vec::new();
    }

    let mut counts: Vec<u64> = catalog_genres.iter().map(|g| g.games_count).collect();
    counts.sort_unstable();
    let median = counts[counts.len() / 2];

    let rated: Vec<&CatalogGame> = catalog_games.iter().filter(|g| g.rating > 0.0).collect();
    if rated.is_empty() {
        return Vec::new();
    }
    let overall_avg = rated.iter().map(|g| g.rating).sum::<f64>() / rated.len() as f64;

    let mut out: Vec<BlueOceanEntry> = catalog_genres
        .iter()
        .filter(|g| g.games_count < median)
        .filter_map(|g| {
            let sampled: Vec<f64> = rated
                .iter()
                .filter(|game| game.genres.iter().any(|name| name == &g.name))
                .map(|game| game.rating)
                .collect();
            if sampled.is_empty() {
                return None;
            }
            let avg_rating = sampled.iter().sum::<f64>() / sampled.len() as f64;
            (avg_rating >= overall_avg).then(|| BlueOceanEntry {
                genre: g.name.clone(),
                games_count: g.games_count,
                avg_rating,
            })
        })
        .collect();
    out.sort_by(|a, b| b.avg_rating.partial_cmp(&a.avg_rating).unwrap_or(std::cmp::Ordering::Equal));
    out
}

/// For each trend keyword, the best-matching tag (normalized comparison,
/// fuzzy above [`MIN_KEYWORD_SIMILARITY`]) and how many records carry it.
/// Unmatched keywords are omitted.
pub fn keyword_overlaps(keywords: &[String], records: &[GameRecord]) -> Vec<KeywordOverlap> {
    let mut tag_counts: IndexMap<&str, usize> = IndexMap::new();
    for rec in records {
        for tag in &rec.tags {
            *tag_counts.entry(tag.as_str()).or_default() += 1;
        }
    }

    let mut out = Vec::new();
    for keyword in keywords {
        let kw_norm = normalize(keyword);
        if kw_norm.is_empty() {
            continue;
        }
        let mut best: Option<(&str, usize, f64)> = None;
        for (tag, count) in &tag_counts {
            let score = jaro_winkler(&kw_norm, &normalize(tag));
            if score >= MIN_KEYWORD_SIMILARITY
                && best.map_or(true, |(_, _, prev)| score > prev)
            {
                best = Some((tag, *count, score));
            }
        }
        if let Some((tag, count, _)) = best {
            out.push(KeywordOverlap {
                keyword: keyword.clone(),
                matched_tag: tag.to_string(),
                game_count: count,
            });
        }
    }
    out
}

fn normalize(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}
