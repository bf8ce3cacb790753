use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use game_planner::ai::planner::{generate_design_document, generate_game_ideas, ENGINES};
use game_planner::ai::survey::{generate_survey_questions, recommend_teams};
use game_planner::ai::ChatClient;
use game_planner::market::{RecencyWindow, Region};
use game_planner::providers::rawg::RawgCatalog;
use game_planner::providers::steamspy::SteamSpy;
use game_planner::providers::storefront::Storefront;
use game_planner::providers::trends::{
    extract_trend_keywords, merge_keywords, seed_keywords, TrendsService,
};
use game_planner::session::{Action, FilterParams, Session, TtlCache};
use game_planner::{build_market_report, collect_market_data, export_snapshot, MarketData};

#[derive(Parser, Debug)]
#[command(name = "gp", version, about = "Trend-driven game planning CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum Commands {
    /// Fetch the trend bundle for a region (or show the seed fallback)
    Trends {
        /// Target region: kr, us, jp, or global
        #[arg(long, default_value = "kr")]
        region: Region,
    },
    /// Collect market data, aggregate, and print the plain-text report
    Report {
        #[arg(long, default_value = "kr")]
        region: Region,
        /// Oldest release year included in catalog queries
        #[arg(long, default_value_t = 2023)]
        year_min: i32,
        /// Newest release year included in catalog queries
        #[arg(long, default_value_t = 2026)]
        year_max: i32,
        /// How many top-listed games to detail
        #[arg(long, default_value_t = 50)]
        top_n: usize,
        /// Catalog sample size (rounded up to whole pages)
        #[arg(long, default_value_t = 100)]
        sample: usize,
        /// Skip the catalog provider even when configured
        #[arg(long, default_value_t = false)]
        skip_catalog: bool,
        /// Skip the trends provider even when configured
        #[arg(long, default_value_t = false)]
        skip_trends: bool,
        /// Write a timestamped JSON snapshot and report text into this directory
        #[arg(long)]
        export_dir: Option<PathBuf>,
    },
    /// Generate five game ideas from trend keywords and the market report
    Ideas {
        /// Game engine to plan for (Unity, Unreal Engine, Godot, RPG Maker, Other)
        #[arg(long, default_value = "Unity")]
        engine: String,
        #[arg(long, default_value = "kr")]
        region: Region,
        #[arg(long, default_value_t = 2023)]
        year_min: i32,
        #[arg(long, default_value_t = 2026)]
        year_max: i32,
        #[arg(long, default_value_t = 50)]
        top_n: usize,
        #[arg(long, default_value_t = 100)]
        sample: usize,
        /// Generate from keywords only, without collecting market data
        #[arg(long, default_value_t = false)]
        skip_market: bool,
    },
    /// Generate ideas, pick one, and expand it into a design document
    Plan {
        /// 1-based index of the idea to expand
        #[arg(long)]
        idea: usize,
        /// Write the document here instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(long, default_value = "Unity")]
        engine: String,
        #[arg(long, default_value = "kr")]
        region: Region,
        #[arg(long, default_value_t = 2023)]
        year_min: i32,
        #[arg(long, default_value_t = 2026)]
        year_max: i32,
        #[arg(long, default_value_t = 50)]
        top_n: usize,
        #[arg(long, default_value_t = 100)]
        sample: usize,
        #[arg(long, default_value_t = false)]
        skip_market: bool,
    },
    /// Generate fan-survey questions
    Survey,
    /// Recommend teams from a saved answers file (JSON object, category → value)
    Recommend {
        /// Path to the answers JSON file
        #[arg(long)]
        answers: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    game_planner::util::env::bootstrap_cli("gp");
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("game_planner=info")),
        )
        .with_target(false)
        .compact()
        .try_init();

    let cli = Cli::parse();

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received; finishing in-flight work");
                cancel.cancel();
            }
        });
    }

    match cli.command {
        Commands::Trends { region } => run_trends(region).await,
        Commands::Report {
            region,
            year_min,
            year_max,
            top_n,
            sample,
            skip_catalog,
            skip_trends,
            export_dir,
        } => {
            let filters = filters(region, year_min, year_max, top_n, sample)?;
            run_report(filters, skip_catalog, skip_trends, export_dir, &cancel).await
        }
        Commands::Ideas {
            engine,
            region,
            year_min,
            year_max,
            top_n,
            sample,
            skip_market,
        } => {
            ai_preflight("ideas")?;
            let filters = filters(region, year_min, year_max, top_n, sample)?;
            let ideas = run_ideas(&engine, filters, skip_market, &cancel).await?;
            println!("{}", serde_json::to_string_pretty(&ideas)?);
            Ok(())
        }
        Commands::Plan {
            idea,
            out,
            engine,
            region,
            year_min,
            year_max,
            top_n,
            sample,
            skip_market,
        } => {
            ai_preflight("plan")?;
            let filters = filters(region, year_min, year_max, top_n, sample)?;
            run_plan(idea, out, &engine, filters, skip_market, &cancel).await
        }
        Commands::Survey => {
            ai_preflight("survey")?;
            run_survey().await
        }
        Commands::Recommend { answers } => {
            ai_preflight("recommend")?;
            run_recommend(&answers).await
        }
    }
}

/// AI subcommands are fatal without a credential; log the redacted config
/// snapshot up front so a degraded run is explainable from the log alone.
fn ai_preflight(title: &str) -> Result<()> {
    game_planner::util::env::preflight_check(
        title,
        &["OPENAI_API_KEY"],
        &["AI_BASE_URL", "AI_MODEL", "RAWG_API_KEY", "TRENDS_BASE_URL"],
    )
}

fn filters(
    region: Region,
    year_min: i32,
    year_max: i32,
    top_n: usize,
    sample_size: usize,
) -> Result<FilterParams> {
    if year_min > year_max {
        bail!("--year-min {year_min} is after --year-max {year_max}");
    }
    Ok(FilterParams {
        region,
        window: RecencyWindow { year_min, year_max },
        top_n,
        sample_size,
    })
}

async fn run_trends(region: Region) -> Result<()> {
    let seeds = seed_keywords(region);
    match TrendsService::from_env()? {
        Some(service) => match service.fetch_trends(region).await {
            Ok(bundle) => {
                let extracted = extract_trend_keywords(&bundle);
                println!(
                    "interest series: {} monthly points",
                    bundle.interest_over_time.len()
                );
                println!("queried: {}", bundle.keywords_used.join(", "));
                println!("extracted: {}", extracted.join(", "));
                let merged = merge_keywords(&extracted, seeds);
                println!("merged: {}", merged.join(", "));
            }
            Err(e) => {
                warn!(%e, "trends unavailable; showing seed keywords");
                println!("seeds ({}): {}", region.label(), seeds.join(", "));
            }
        },
        None => {
            println!("TRENDS_BASE_URL not set; seed keywords for {}:", region.label());
            println!("{}", seeds.join(", "));
        }
    }
    Ok(())
}

/// Collect + aggregate behind a session so the phase transitions are logged
/// the same way the interactive flows log them.
async fn collect_and_report(
    filters: FilterParams,
    skip_catalog: bool,
    skip_trends: bool,
    cancel: &CancellationToken,
) -> Result<(MarketData, game_planner::market::MarketReport)> {
    let session = Session::new(filters.clone());
    let session = advance_logged(session, Action::Begin)?;
    let session = advance_logged(session, Action::Submit)?;

    let spy = SteamSpy::from_env()?;
    let store = Storefront::from_env()?;
    let catalog = if skip_catalog { None } else { RawgCatalog::from_env()? };

    let mut cache: TtlCache<MarketData> = TtlCache::from_env();
    let data =
        collect_market_data(&spy, &store, catalog.as_ref(), &filters, &mut cache, cancel).await;
    for w in &data.warnings {
        warn!(warning = %w, "collection degraded");
    }

    let region = filters.region;
    let seeds = seed_keywords(region);
    let (keywords, live) = if skip_trends {
        (seeds.iter().map(|s| s.to_string()).collect(), false)
    } else {
        match TrendsService::from_env()? {
            Some(service) => match service.fetch_trends(region).await {
                Ok(bundle) => {
                    let extracted = extract_trend_keywords(&bundle);
                    (merge_keywords(&extracted, seeds), true)
                }
                Err(e) => {
                    warn!(%e, "trends unavailable; using seed keywords");
                    (seeds.iter().map(|s| s.to_string()).collect(), false)
                }
            },
            None => (seeds.iter().map(|s| s.to_string()).collect(), false),
        }
    };

    let report = build_market_report(&data, keywords, live, filters.window);
    advance_logged(session, Action::Complete)?;
    Ok((data, report))
}

async fn run_report(
    filters: FilterParams,
    skip_catalog: bool,
    skip_trends: bool,
    export_dir: Option<PathBuf>,
    cancel: &CancellationToken,
) -> Result<()> {
    let (_, report) = collect_and_report(filters, skip_catalog, skip_trends, cancel).await?;
    println!("{}", report.render());
    if let Some(dir) = export_dir {
        let (json_path, text_path) = export_snapshot(&dir, &report)?;
        info!(json = %json_path.display(), text = %text_path.display(), "snapshot exported");
    }
    Ok(())
}

async fn run_ideas(
    engine: &str,
    filters: FilterParams,
    skip_market: bool,
    cancel: &CancellationToken,
) -> Result<Vec<game_planner::ai::planner::GameIdea>> {
    if !ENGINES.contains(&engine) {
        warn!(engine, "engine not in the suggested list; passing through as-is");
    }
    let client = ChatClient::from_env()?;

    let region = filters.region;
    let (keywords, report_text) = if skip_market {
        let seeds: Vec<String> = seed_keywords(region).iter().map(|s| s.to_string()).collect();
        (seeds, None)
    } else {
        let (_, report) = collect_and_report(filters, false, false, cancel).await?;
        (report.trend_keywords.clone(), Some(report.render()))
    };

    let ideas =
        generate_game_ideas(&client, &keywords, engine, region, report_text.as_deref()).await?;
    Ok(ideas)
}

async fn run_plan(
    idea_index: usize,
    out: Option<PathBuf>,
    engine: &str,
    filters: FilterParams,
    skip_market: bool,
    cancel: &CancellationToken,
) -> Result<()> {
    let ideas = run_ideas(engine, filters, skip_market, cancel).await?;
    if idea_index == 0 || idea_index > ideas.len() {
        bail!("--idea {idea_index} is out of range; {} ideas were generated", ideas.len());
    }
    let idea = &ideas[idea_index - 1];
    info!(title = %idea.title, genre = %idea.genre, "expanding idea into a design document");

    let client = ChatClient::from_env()?;
    let doc = generate_design_document(&client, idea, engine).await?;
    match out {
        Some(path) => {
            std::fs::write(&path, &doc)
                .with_context(|| format!("writing {}", path.display()))?;
            info!(path = %path.display(), "design document written");
        }
        None => println!("{doc}"),
    }
    Ok(())
}

async fn run_survey() -> Result<()> {
    let client = ChatClient::from_env()?;
    let questions = generate_survey_questions(&client).await?;
    println!("{}", serde_json::to_string_pretty(&questions)?);
    Ok(())
}

async fn run_recommend(answers_path: &PathBuf) -> Result<()> {
    let raw = std::fs::read_to_string(answers_path)
        .with_context(|| format!("reading {}", answers_path.display()))?;
    let answers: indexmap::IndexMap<String, String> =
        serde_json::from_str(&raw).context("answers file must be a JSON object of strings")?;

    let client = ChatClient::from_env()?;
    let set = recommend_teams(&client, &answers).await?;
    println!("{}", serde_json::to_string_pretty(&set)?);
    Ok(())
}

fn advance_logged(session: Session, action: Action) -> Result<Session> {
    let from = session.phase;
    let session = session.advance(action)?;
    info!(session = %session.id, ?from, to = ?session.phase, "session transition");
    Ok(session)
}
