//! RAWG-shaped catalog provider: paginated top-rated search within a release
//! window, plus genre listing with supply counts. Requires `RAWG_API_KEY`;
//! the pipeline skips catalog data when it is unset.

use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::market::{CatalogGame, CatalogGenre, RecencyWindow};
use crate::util::env::{env_opt, env_parse};

use super::{build_client, default_timeout_secs, get_json_with_retries, Unavailable};

const PROVIDER: &str = "rawg";
const DEFAULT_BASE_URL: &str = "https://api.rawg.io/api";
const DEFAULT_REQS_PER_MIN: u64 = 30;

#[derive(Debug, Deserialize)]
struct ListResponse<T> {
    #[allow(dead_code)]
    count: Option<u64>,
    next: Option<String>,
    #[allow(dead_code)]
    previous: Option<String>,
    results: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct GameRow {
    name: String,
    released: Option<String>,
    #[serde(default)]
    rating: Option<f64>,
    #[serde(default)]
    metacritic: Option<i32>,
    #[serde(default)]
    platforms: Option<Vec<PlatformEntry>>,
    #[serde(default)]
    genres: Option<Vec<NamedRow>>,
    #[serde(default)]
    tags: Option<Vec<NamedRow>>,
}

#[derive(Debug, Deserialize)]
struct PlatformEntry {
    platform: NamedRow,
}

#[derive(Debug, Deserialize)]
struct NamedRow {
    name: String,
}

#[derive(Debug, Deserialize)]
struct GenreRow {
    name: String,
    #[serde(default)]
    games_count: Option<u64>,
}

fn parse_year(date: &str) -> Option<i32> {
    date.get(0..4)?.parse().ok()
}

impl From<GameRow> for CatalogGame {
    fn from(row: GameRow) -> Self {
        CatalogGame {
            name: row.name,
            release_year: row.released.as_deref().and_then(parse_year),
            rating: row.rating.unwrap_or(0.0),
            metacritic: row.metacritic,
            platforms: row
                .platforms
                .unwrap_or_default()
                .into_iter()
                .map(|p| p.platform.name)
                .collect(),
            genres: row
                .genres
                .unwrap_or_default()
                .into_iter()
                .map(|g| g.name)
                .collect(),
            tags: row
                .tags
                .unwrap_or_default()
                .into_iter()
                .map(|t| t.name)
                .collect(),
        }
    }
}

pub struct RawgCatalog {
    http: Client,
    base_url: String,
    key: String,
    page_sleep: Duration,
}

impl RawgCatalog {
    /// `None` when `RAWG_API_KEY` is unset: the catalog is an optional source
    /// and the pipeline degrades without it.
    pub fn from_env() -> anyhow::Result<Option<Self>> {
        let Some(key) = env_opt("RAWG_API_KEY") else {
            return Ok(None);
        };
        let rpm = env_parse("RAWG_REQS_PER_MIN", DEFAULT_REQS_PER_MIN).max(1);
        Ok(Some(Self {
            http: build_client(default_timeout_secs())?,
            base_url: env_opt("RAWG_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            key,
            page_sleep: Duration::from_millis(60_000 / rpm),
        }))
    }

    /// Top-rated games released inside `window`, up to `pages` pages of
    /// `page_size` rows. Stops early when the provider reports no next page.
    pub async fn top_rated(
        &self,
        window: RecencyWindow,
        pages: u32,
        page_size: u32,
    ) -> Result<Vec<CatalogGame>, Unavailable> {
        let url = format!("{}/games", self.base_url);
        let dates = format!("{}-01-01,{}-12-31", window.year_min, window.year_max);
        let mut out: Vec<CatalogGame> = Vec::new();

        for page in 1..=pages.max(1) {
            if page > 1 {
                tokio::time::sleep(self.page_sleep).await;
            }
            let body = get_json_with_retries(
                &self.http,
                PROVIDER,
                &url,
                &[
                    ("dates", dates.clone()),
                    ("ordering", "-rating".to_string()),
                    ("page", page.to_string()),
                    ("page_size", page_size.to_string()),
                    ("key", self.key.clone()),
                ],
            )
            .await?;
            let list: ListResponse<GameRow> = serde_json::from_value(body).map_err(|e| {
                Unavailable::new(PROVIDER, format!("unexpected games list shape: {e}"))
            })?;
            debug!(page, count = list.results.len(), "rawg: page fetched");
            let has_next = list.next.is_some();
            out.extend(list.results.into_iter().map(CatalogGame::from));
            if !has_next {
                break;
            }
        }
        Ok(out)
    }

    /// Genre listing with per-genre supply counts.
    pub async fn genres(&self) -> Result<Vec<CatalogGenre>, Unavailable> {
        let url = format!("{}/genres", self.base_url);
        let body = get_json_with_retries(
            &self.http,
            PROVIDER,
            &url,
            &[("key", self.key.clone())],
        )
        .await?;
        let list: ListResponse<GenreRow> = serde_json::from_value(body).map_err(|e| {
            Unavailable::new(PROVIDER, format!("unexpected genres list shape: {e}"))
        })?;
        Ok(list
            .results
            .into_iter()
            .map(|g| CatalogGenre {
                name: g.name,
                games_count: g.games_count.unwrap_or(0),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn game_row_maps_to_catalog_game() {
        let raw = serde_json::json!({
            "name": "Starfall",
            "released": "2023-10-10",
            "rating": 4.4,
            "metacritic": 88,
            "platforms": [{"platform": {"name": "PC"}}, {"platform": {"name": "PlayStation 5"}}],
            "genres": [{"name": "RPG"}],
            "tags": [{"name": "Open World"}]
        });
        let row: GameRow = serde_json::from_value(raw).unwrap();
        let game = CatalogGame::from(row);
        assert_eq!(game.release_year, Some(2023));
        assert_eq!(game.rating, 4.4);
        assert_eq!(game.platforms, ["PC", "PlayStation 5"]);
        assert_eq!(game.genres, ["RPG"]);
        assert_eq!(game.tags, ["Open World"]);
    }

    #[test]
    fn sparse_row_defaults() {
        let raw = serde_json::json!({"name": "Bare", "released": null});
        let row: GameRow = serde_json::from_value(raw).unwrap();
        let game = CatalogGame::from(row);
        assert_eq!(game.release_year, None);
        assert_eq!(game.rating, 0.0);
        assert!(game.platforms.is_empty());
    }

    #[test]
    fn year_needs_four_leading_digits() {
        assert_eq!(parse_year("2023-10-10"), Some(2023));
        assert_eq!(parse_year("23"), None);
        assert_eq!(parse_year("n/a"), None);
    }
}
