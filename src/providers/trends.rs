//! Optional search-trends provider. Configured only when `TRENDS_BASE_URL`
//! is set; otherwise the pipeline runs in seed-keywords-only mode, which is a
//! supported configuration rather than a failure.
//!
//! The consumed shape is narrow: a 12-month interest-over-time series and
//! top/rising related queries per seed keyword, scoped to the games category.

use indexmap::{IndexMap, IndexSet};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::market::Region;
use crate::util::env::env_opt;

use super::{build_client, default_timeout_secs, get_json_with_retries, Unavailable};

const PROVIDER: &str = "trends";
const TREND_MONTHS: u32 = 12;
/// Games category in the upstream taxonomy.
const GAMES_CATEGORY: u32 = 41;
/// Only the first seeds form the live query set; the upstream caps payloads.
const QUERY_SEEDS: usize = 5;
/// Hard cap on keywords carried into prompts.
pub const MAX_KEYWORDS: usize = 20;

const SEEDS_KR: [&str; 20] = [
    "모바일게임", "RPG", "생존게임", "로그라이크", "오픈월드",
    "인디게임", "멀티플레이", "방치형게임", "소울라이크", "메타버스",
    "하이퍼캐주얼", "덱빌딩", "타워디펜스", "배틀로얄", "수집형RPG",
    "액션로그라이크", "코옵게임", "시뮬레이션", "리듬게임", "공포게임",
];

const SEEDS_US: [&str; 20] = [
    "mobile game", "RPG", "survival game", "roguelike", "open world",
    "indie game", "multiplayer", "idle game", "soulslike", "metaverse",
    "hyper casual", "deck builder", "tower defense", "battle royale", "gacha RPG",
    "action roguelite", "co-op game", "simulation", "horror game", "city builder",
];

const SEEDS_JP: [&str; 20] = [
    "モバイルゲーム", "RPG", "サバイバルゲーム", "ローグライク", "オープンワールド",
    "インディーゲーム", "マルチプレイ", "放置ゲーム", "ソウルライク", "メタバース",
    "ハイパーカジュアル", "デッキ構築", "タワーディフェンス", "バトルロイヤル", "ガチャRPG",
    "アクションローグライト", "協力プレイ", "シミュレーション", "ホラーゲーム", "箱庭ゲーム",
];

const SEEDS_GLOBAL: [&str; 20] = [
    "mobile game", "RPG", "survival", "roguelike", "open world",
    "indie game", "multiplayer", "idle game", "soulslike", "metaverse",
    "hyper casual", "deck builder", "tower defense", "battle royale", "gacha",
    "action roguelite", "co-op", "simulation", "horror game", "city builder",
];

/// Static per-region fallback keywords.
pub fn seed_keywords(region: Region) -> &'static [&'static str] {
    match region {
        Region::Kr => &SEEDS_KR,
        Region::Us => &SEEDS_US,
        Region::Jp => &SEEDS_JP,
        Region::Global => &SEEDS_GLOBAL,
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct InterestPoint {
    pub date: String,
    #[serde(default)]
    pub values: IndexMap<String, u32>,
}

#[derive(Debug, Deserialize)]
struct InterestResponse {
    #[serde(default)]
    interest_over_time: Vec<InterestPoint>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelatedQuery {
    pub query: String,
    #[allow(dead_code)]
    #[serde(default)]
    pub value: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RelatedQueries {
    #[serde(default)]
    pub top: Vec<RelatedQuery>,
    #[serde(default)]
    pub rising: Vec<RelatedQuery>,
}

#[derive(Debug, Clone)]
pub struct TrendBundle {
    pub interest_over_time: Vec<InterestPoint>,
    pub related_queries: IndexMap<String, RelatedQueries>,
    pub keywords_used: Vec<String>,
}

pub struct TrendsService {
    http: Client,
    base_url: String,
}

impl TrendsService {
    /// `None` when `TRENDS_BASE_URL` is unset (seed-keywords-only mode).
    pub fn from_env() -> anyhow::Result<Option<Self>> {
        let Some(base_url) = env_opt("TRENDS_BASE_URL") else {
            return Ok(None);
        };
        Ok(Some(Self {
            http: build_client(default_timeout_secs())?,
            base_url,
        }))
    }

    /// 12-month interest series for the region's first seed keywords, plus
    /// related queries per seed.
    pub async fn fetch_trends(&self, region: Region) -> Result<TrendBundle, Unavailable> {
        let seeds: Vec<String> = seed_keywords(region)
            .iter()
            .take(QUERY_SEEDS)
            .map(|s| s.to_string())
            .collect();
        let geo = region.geo().to_string();

        let interest_url = format!("{}/interest", self.base_url);
        let body = get_json_with_retries(
            &self.http,
            PROVIDER,
            &interest_url,
            &[
                ("keywords", seeds.join(",")),
                ("geo", geo.clone()),
                ("months", TREND_MONTHS.to_string()),
                ("cat", GAMES_CATEGORY.to_string()),
            ],
        )
        .await?;
        let interest: InterestResponse = serde_json::from_value(body).map_err(|e| {
            Unavailable::new(PROVIDER, format!("unexpected interest shape: {e}"))
        })?;

        let related_url = format!("{}/related", self.base_url);
        let mut related_queries: IndexMap<String, RelatedQueries> = IndexMap::new();
        for seed in &seeds {
            let body = get_json_with_retries(
                &self.http,
                PROVIDER,
                &related_url,
                &[
                    ("keyword", seed.clone()),
                    ("geo", geo.clone()),
                    ("months", TREND_MONTHS.to_string()),
                    ("cat", GAMES_CATEGORY.to_string()),
                ],
            )
            .await?;
            let queries: RelatedQueries = serde_json::from_value(body).map_err(|e| {
                Unavailable::new(PROVIDER, format!("unexpected related shape for {seed}: {e}"))
            })?;
            related_queries.insert(seed.clone(), queries);
        }

        debug!(
            points = interest.interest_over_time.len(),
            seeds = seeds.len(),
            "trends: bundle fetched"
        );
        Ok(TrendBundle {
            interest_over_time: interest.interest_over_time,
            related_queries,
            keywords_used: seeds,
        })
    }
}

/// Walk the related queries, taking top then rising query strings per seed,
/// first-seen deduplication, capped at [`MAX_KEYWORDS`].
pub fn extract_trend_keywords(bundle: &TrendBundle) -> Vec<String> {
    let mut seen: IndexSet<String> = IndexSet::new();
    for queries in bundle.related_queries.values() {
        for q in queries.top.iter().chain(queries.rising.iter()) {
            if seen.len() >= MAX_KEYWORDS {
                return seen.into_iter().collect();
            }
            seen.insert(q.query.clone());
        }
    }
    seen.truncate(MAX_KEYWORDS);
    seen.into_iter().collect()
}

/// Extracted keywords first, then seeds, first-seen dedup, capped at
/// [`MAX_KEYWORDS`]. An empty extraction yields the seed list unchanged.
pub fn merge_keywords(extracted: &[String], seeds: &[&str]) -> Vec<String> {
    if extracted.is_empty() {
        return seeds.iter().map(|s| s.to_string()).collect();
    }
    let mut seen: IndexSet<String> = IndexSet::new();
    for kw in extracted.iter().map(String::as_str).chain(seeds.iter().copied()) {
        if seen.len() >= MAX_KEYWORDS {
            break;
        }
        seen.insert(kw.to_string());
    }
    seen.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle(related: &[(&str, &[&str], &[&str])]) -> TrendBundle {
        let mut related_queries = IndexMap::new();
        for (seed, top, rising) in related {
            related_queries.insert(
                seed.to_string(),
                RelatedQueries {
                    top: top
                        .iter()
                        .map(|q| RelatedQuery {
                            query: q.to_string(),
                            value: 100,
                        })
                        .collect(),
                    rising: rising
                        .iter()
                        .map(|q| RelatedQuery {
                            query: q.to_string(),
                            value: 100,
                        })
                        .collect(),
                },
            );
        }
        TrendBundle {
            interest_over_time: Vec::new(),
            related_queries,
            keywords_used: related.iter().map(|(s, _, _)| s.to_string()).collect(),
        }
    }

    #[test]
    fn extraction_is_ordered_deduped_and_capped() {
        let b = bundle(&[
            ("RPG", &["gacha rpg", "open world rpg"], &["rpg 2026"]),
            ("survival", &["gacha rpg", "craft survival"], &[]),
        ]);
        let extracted = extract_trend_keywords(&b);
        assert_eq!(
            extracted,
            ["gacha rpg", "open world rpg", "rpg 2026", "craft survival"]
        );

        let many: Vec<String> = (0..40).map(|i| format!("kw{i}")).collect();
        let many_refs: Vec<&str> = many.iter().map(String::as_str).collect();
        let b = bundle(&[("seed", &many_refs[..], &[])]);
        assert_eq!(extract_trend_keywords(&b).len(), MAX_KEYWORDS);
    }

    #[test]
    fn merge_prefers_extracted_then_seeds() {
        let extracted = vec!["fresh".to_string(), "RPG".to_string()];
        let seeds = ["RPG", "survival"];
        assert_eq!(
            merge_keywords(&extracted, &seeds),
            ["fresh", "RPG", "survival"]
        );
    }

    #[test]
    fn merge_falls_back_to_seeds_when_nothing_extracted() {
        let seeds = ["RPG", "survival"];
        assert_eq!(merge_keywords(&[], &seeds), ["RPG", "survival"]);
    }

    #[test]
    fn seed_tables_have_twenty_entries_each() {
        for region in [Region::Kr, Region::Us, Region::Jp, Region::Global] {
            assert_eq!(seed_keywords(region).len(), 20, "{region:?}");
        }
    }
}
