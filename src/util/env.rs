//! Environment helpers: centralized dotenv loading and ergonomic getters.
//! Call `init_env()` once early in each binary (or rely on lazy Once).
use std::str::FromStr;
use std::sync::Once;
use tracing::{info, warn};

static INIT: Once = Once::new();

/// Load .env if present, exactly once. Safe to call many times.
pub fn init_env() {
    INIT.call_once(|| {
        if dotenv::dotenv().is_err() {
            // Fallback to the Cargo project root when running from elsewhere.
            let candidate = format!("{}/.env", env!("CARGO_MANIFEST_DIR"));
            let _ = dotenv::from_filename(candidate);
        }
    });
}

/// Common bootstrap for CLI binaries:
///   * initialize dotenv/env once
///   * log which optional providers are configured so degraded runs are
///     explainable from the log alone
pub fn bootstrap_cli(bin_name: &str) {
    init_env();

    if env_opt("RAWG_API_KEY").is_none() {
        warn!(
            target = "bootstrap",
            bin = bin_name,
            "RAWG_API_KEY not set; catalog data will be skipped"
        );
    }
    if env_opt("TRENDS_BASE_URL").is_none() {
        info!(
            target = "bootstrap",
            bin = bin_name,
            "TRENDS_BASE_URL not set; seed keywords will be used instead of live trends"
        );
    }
}

/// Get required env var; error if missing.
pub fn env_req(key: &str) -> anyhow::Result<String> {
    init_env();
    std::env::var(key).map_err(|_| anyhow::anyhow!("missing env var {key}"))
}

/// Get optional env var (None if unset or empty).
pub fn env_opt(key: &str) -> Option<String> {
    init_env();
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

/// Get parsed value with default fallback.
pub fn env_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + Clone,
{
    init_env();
    match std::env::var(key) {
        Ok(raw) => raw.parse::<T>().unwrap_or(default),
        Err(_) => default,
    }
}

fn redact_value(key: &str, val: &str) -> String {
    let k = key.to_ascii_uppercase();
    if k.contains("PASSWORD")
        || k.contains("SECRET")
        || k.contains("KEY")
        || k.contains("TOKEN")
        || k.contains("COOKIE")
    {
        return "***".to_string();
    }
    val.trim().to_string()
}

/// Validate required keys and log a consolidated, redacted snapshot of configuration.
/// Returns error if any required key is missing.
pub fn preflight_check(title: &str, required: &[&str], also_log: &[&str]) -> anyhow::Result<()> {
    init_env();
    let mut missing: Vec<&str> = Vec::new();
    for &k in required {
        if env_opt(k).is_none() {
            missing.push(k);
        }
    }
    let mut snapshot: Vec<(String, String)> = Vec::new();
    for &k in also_log {
        let v = env_opt(k).unwrap_or_default();
        snapshot.push((k.to_string(), redact_value(k, &v)));
    }
    info!(target = "preflight", title, snapshot = ?snapshot, "configuration snapshot");
    if !missing.is_empty() {
        return Err(anyhow::anyhow!(format!(
            "missing required env: {:?}",
            missing
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_sensitive_keys() {
        assert_eq!(redact_value("OPENAI_API_KEY", "sk-abc123"), "***");
        assert_eq!(redact_value("SOME_TOKEN", "t"), "***");
        assert_eq!(redact_value("MY_SECRET", "s"), "***");
        assert_eq!(redact_value("REGION", " kr "), "kr");
    }

    #[test]
    fn preflight_reports_missing_required_keys() {
        // unique key names so parallel tests cannot interfere
        std::env::set_var("GP_TEST_PREFLIGHT_PRESENT", "value");
        assert!(preflight_check(
            "test",
            &["GP_TEST_PREFLIGHT_PRESENT"],
            &["GP_TEST_PREFLIGHT_PRESENT"]
        )
        .is_ok());

        let err = preflight_check("test", &["GP_TEST_PREFLIGHT_ABSENT"], &[]).unwrap_err();
        assert!(err.to_string().contains("GP_TEST_PREFLIGHT_ABSENT"));
    }
}
