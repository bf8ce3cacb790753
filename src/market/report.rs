//! Deterministic plain-text market report. This text block is the prompt
//! context consumed by the AI planner, so rendering must be byte-identical
//! for identical inputs: fixed section order, fixed float precision, and
//! only ordered structures are iterated.

use std::fmt::Write;

use serde::Serialize;

use super::aggregate::{BlueOceanEntry, KeywordOverlap};
use super::{
    CatalogGenre, GameRecord, GenreStat, PriceTierStat, RecencyWindow, TagStat,
};

const TOP_GENRES_SHOWN: usize = 10;
pub const TOP_TAGS_SHOWN: usize = 10;
const CO_OCCURRING_SHOWN: usize = 3;
const MISSING_PAIRS_SHOWN: usize = 5;
const PLATFORMS_SHOWN: usize = 10;
const SAMPLE_NAMES_SHOWN: usize = 5;

/// Everything the formatter needs, bundled. Lives for one session; no
/// persistence.
#[derive(Debug, Clone, Serialize)]
pub struct MarketReport {
    pub window: RecencyWindow,
    pub records: Vec<GameRecord>,
    pub genre_stats: Vec<GenreStat>,
    pub tag_stats: Vec<TagStat>,
    pub price_tiers: Vec<PriceTierStat>,
    pub catalog_genres: Vec<CatalogGenre>,
    pub platform_counts: Vec<(String, usize)>,
    pub blue_ocean: Vec<BlueOceanEntry>,
    pub missing_pairs: Vec<(String, String, u64)>,
    pub trend_keywords: Vec<String>,
    pub keyword_overlaps: Vec<KeywordOverlap>,
    /// Whether the keywords came from the live trends service (false means
    /// the static seed list was used).
    pub live_trends: bool,
}

impl MarketReport {
    /// Render the five fixed sections. Provider failures upstream show up
    /// here as empty inputs and render as "(no ...)" placeholder lines.
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_market_size(&mut out);
        self.render_success_patterns(&mut out);
        self.render_growth_trends(&mut out);
        self.render_blue_ocean(&mut out);
        self.render_platforms(&mut out);
        out
    }

    fn render_market_size(&self, out: &mut String) {
        let _ = writeln!(out, "== Market Size & Saturation ==");
        let _ = writeln!(
            out,
            "window: {}-{}",
            self.window.year_min, self.window.year_max
        );
        let total_owners: u64 = self.records.iter().map(|r| r.owners).sum();
        let _ = writeln!(
            out,
            "sampled games: {} (estimated owners: {})",
            self.records.len(),
            total_owners
        );
        if !self.records.is_empty() {
            let names: Vec<&str> = self
                .records
                .iter()
                .take(SAMPLE_NAMES_SHOWN)
                .map(|r| r.name.as_str())
                .collect();
            let _ = writeln!(out, "top titles: {}", names.join(", "));
        }
        if self.genre_stats.is_empty() {
            let _ = writeln!(out, "(no genre data)");
        } else {
            let _ = writeln!(out, "genres by owners:");
            for stat in self.genre_stats.iter().take(TOP_GENRES_SHOWN) {
                let _ = writeln!(
                    out,
                    "  {} | games {} | owners {} | avg price ${:.2} | avg playtime {:.1}h",
                    stat.genre,
                    stat.game_count,
                    stat.total_owners,
                    stat.avg_price / 100.0,
                    stat.avg_playtime / 60.0
                );
            }
        }
        if self.price_tiers.is_empty() {
            let _ = writeln!(out, "(no price data)");
        } else {
            let _ = writeln!(out, "price tiers:");
            for tier in &self.price_tiers {
                let _ = writeln!(
                    out,
                    "  {} | games {} | avg owners {:.0}",
                    tier.tier, tier.game_count, tier.avg_owners
                );
            }
        }
        let _ = writeln!(out);
    }

    fn render_success_patterns(&self, out: &mut String) {
        let _ = writeln!(out, "== Success Patterns ==");
        if self.tag_stats.is_empty() {
            let _ = writeln!(out, "(no tag data)");
        } else {
            for stat in self.tag_stats.iter().take(TOP_TAGS_SHOWN) {
                let pairs: Vec<String> = stat
                    .co_occurring
                    .iter()
                    .take(CO_OCCURRING_SHOWN)
                    .map(|(tag, n)| format!("{tag} x{n}"))
                    .collect();
                let pairs = if pairs.is_empty() {
                    "-".to_string()
                } else {
                    pairs.join(", ")
                };
                let _ = writeln!(
                    out,
                    "  {} | games {} | owners {} | pairs with: {}",
                    stat.tag, stat.game_count, stat.total_owners, pairs
                );
            }
        }
        let _ = writeln!(out);
    }

    fn render_growth_trends(&self, out: &mut String) {
        let _ = writeln!(out, "== Growth Trends ==");
        if self.live_trends {
            let _ = writeln!(out, "trend keywords (live):");
        } else {
            let _ = writeln!(out, "trend keywords (seed fallback; live trends unavailable):");
        }
        if self.trend_keywords.is_empty() {
            let _ = writeln!(out, "(no keywords)");
        } else {
            let _ = writeln!(out, "  {}", self.trend_keywords.join(", "));
        }
        if self.keyword_overlaps.is_empty() {
            let _ = writeln!(out, "(no keyword/tag overlaps)");
        } else {
            for overlap in &self.keyword_overlaps {
                let _ = writeln!(
                    out,
                    "  \"{}\" matches tag \"{}\" on {} sampled games",
                    overlap.keyword, overlap.matched_tag, overlap.game_count
                );
            }
        }
        let _ = writeln!(out);
    }

    fn render_blue_ocean(&self, out: &mut String) {
        let _ = writeln!(out, "== Blue Ocean Opportunities ==");
        if self.missing_pairs.is_empty() {
            let _ = writeln!(out, "(no untried tag pairs among top tags)");
        } else {
            let _ = writeln!(out, "untried tag pairs (combined owners):");
            for (a, b, owners) in self.missing_pairs.iter().take(MISSING_PAIRS_SHOWN) {
                let _ = writeln!(out, "  {a} + {b} ({owners})");
            }
        }
        if self.blue_ocean.is_empty() {
            if self.catalog_genres.is_empty() {
                let _ = writeln!(out, "(no catalog data)");
            } else {
                let _ = writeln!(out, "(no low-supply high-rating genres found)");
            }
        } else {
            let _ = writeln!(out, "low-supply, high-rating genres:");
            for entry in &self.blue_ocean {
                let _ = writeln!(
                    out,
                    "  {} | catalog games {} | avg rating {:.2}",
                    entry.genre, entry.games_count, entry.avg_rating
                );
            }
        }
        let _ = writeln!(out);
    }

    fn render_platforms(&self, out: &mut String) {
        let _ = writeln!(out, "== Platform Analysis ==");
        if self.platform_counts.is_empty() {
            let _ = writeln!(out, "(no catalog data)");
        } else {
            for (platform, count) in self.platform_counts.iter().take(PLATFORMS_SHOWN) {
                let _ = writeln!(out, "  {platform}: {count} games");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_report() -> MarketReport {
        MarketReport {
            window: RecencyWindow {
                year_min: 2022,
                year_max: 2025,
            },
            records: Vec::new(),
            genre_stats: Vec::new(),
            tag_stats: Vec::new(),
            price_tiers: Vec::new(),
            catalog_genres: Vec::new(),
            platform_counts: Vec::new(),
            blue_ocean: Vec::new(),
            missing_pairs: Vec::new(),
            trend_keywords: Vec::new(),
            keyword_overlaps: Vec::new(),
            live_trends: false,
        }
    }

    #[test]
    fn render_is_deterministic() {
        let mut report = empty_report();
        report.trend_keywords = vec!["roguelike".into(), "co-op".into()];
        report.genre_stats = vec![GenreStat {
            genre: "RPG".into(),
            game_count: 2,
            total_owners: 400,
            avg_price: 1999.0,
            avg_playtime: 90.0,
        }];
        assert_eq!(report.render(), report.render());
    }

    #[test]
    fn empty_inputs_render_placeholders_without_panicking() {
        let text = empty_report().render();
        assert!(text.contains("== Market Size & Saturation =="));
        assert!(text.contains("== Success Patterns =="));
        assert!(text.contains("== Growth Trends =="));
        assert!(text.contains("== Blue Ocean Opportunities =="));
        assert!(text.contains("== Platform Analysis =="));
        assert!(text.contains("(no genre data)"));
        assert!(text.contains("(no catalog data)"));
        assert!(text.contains("seed fallback"));
    }

    #[test]
    fn sections_appear_in_fixed_order() {
        let text = empty_report().render();
        let idx = |needle: &str| text.find(needle).unwrap();
        assert!(idx("== Market Size") < idx("== Success Patterns"));
        assert!(idx("== Success Patterns") < idx("== Growth Trends"));
        assert!(idx("== Growth Trends") < idx("== Blue Ocean"));
        assert!(idx("== Blue Ocean") < idx("== Platform Analysis"));
    }
}
