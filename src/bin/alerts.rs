//! One-shot queries against the local archive store, printed as JSON.
//!
//! Usage: alerts <command> [--flag value ...]
//!   latest          [--threshold F] [--max N] [--country C] [--category L] [--min-articles N] [--sort K]
//!   range           --start YYYY-MM-DD --end YYYY-MM-DD [filters as above]
//!   stats-country   [filters as above]
//!   stats-category  [filters as above]
//!   trends          --start YYYY-MM-DD --end YYYY-MM-DD [--threshold F]
//!   search          --keyword K [--days N]
//!   fetch
//!   cleanup

use anyhow::{anyhow, bail, Result};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::env;

use geoalerts::archive::fetch::{ArchiveFetcher, HttpTransport};
use geoalerts::config::Config;
use geoalerts::error::ErrorBody;
use geoalerts::filter::{QueryParameters, SortKey};
use geoalerts::retention::cleanup_now;
use geoalerts::service::AlertService;

fn parse_flags(args: &[String]) -> Result<HashMap<String, String>> {
    let mut flags = HashMap::new();
    let mut it = args.iter();
    while let Some(arg) = it.next() {
        let Some(name) = arg.strip_prefix("--") else {
            bail!("unexpected argument: {}", arg);
        };
        let value = it
            .next()
            .ok_or_else(|| anyhow!("missing value for --{}", name))?;
        flags.insert(name.to_string(), value.clone());
    }
    Ok(flags)
}

fn number<T: std::str::FromStr>(flags: &HashMap<String, String>, name: &str) -> Result<Option<T>> {
    match flags.get(name) {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| anyhow!("--{} expects a number, got '{}'", name, raw)),
        None => Ok(None),
    }
}

fn required<'a>(flags: &'a HashMap<String, String>, name: &str) -> Result<&'a str> {
    flags
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("--{} is required", name))
}

fn query_params(svc: &AlertService, flags: &HashMap<String, String>) -> Result<QueryParameters> {
    let mut params = svc.default_params();
    if let Some(t) = number(flags, "threshold")? {
        params.severity_threshold = t;
    }
    if let Some(n) = number(flags, "max")? {
        params.max_events = n;
    }
    params.country = flags.get("country").cloned();
    params.category = flags.get("category").cloned();
    params.min_articles = number(flags, "min-articles")?;
    params.sort_by = flags.get("sort").map(|s| SortKey::parse_or_default(s));
    Ok(params)
}

fn error_json(body: ErrorBody) -> Value {
    json!({ "error": body })
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    let Some((command, rest)) = args.split_first() else {
        bail!("usage: alerts <latest|range|stats-country|stats-category|trends|search|fetch|cleanup> [--flag value ...]");
    };
    let flags = parse_flags(rest)?;
    let cfg = Config::from_env();
    let svc = AlertService::new(cfg.clone());

    let out: Value = match command.as_str() {
        "latest" => serde_json::to_value(svc.latest_alerts(&query_params(&svc, &flags)?))?,
        "range" => {
            let params = query_params(&svc, &flags)?;
            match svc.alerts_by_date_range(required(&flags, "start")?, required(&flags, "end")?, &params) {
                Ok(result) => serde_json::to_value(result)?,
                Err(err) => error_json(ErrorBody::from(&err)),
            }
        }
        "stats-country" => serde_json::to_value(svc.stats_by_country(&query_params(&svc, &flags)?))?,
        "stats-category" => serde_json::to_value(svc.stats_by_category(&query_params(&svc, &flags)?))?,
        "trends" => {
            let threshold = number(&flags, "threshold")?.unwrap_or(cfg.default_threshold);
            match svc.trends(required(&flags, "start")?, required(&flags, "end")?, threshold) {
                Ok(report) => serde_json::to_value(report)?,
                Err(err) => error_json(ErrorBody::from(&err)),
            }
        }
        "search" => {
            let days = number(&flags, "days")?.unwrap_or(cfg.keep_days as usize);
            match svc.search_url(required(&flags, "keyword")?, days) {
                Some(hit) => serde_json::to_value(hit)?,
                None => json!({ "found": false }),
            }
        }
        "fetch" => {
            let fetcher = ArchiveFetcher::new(
                HttpTransport::new(cfg.fetch_timeout())?,
                svc.store().clone(),
                &cfg.lastupdate_url,
                &cfg.feed_base_url,
            );
            match fetcher.fetch_latest().await {
                Ok(outcome) => json!({
                    "status": outcome.status(),
                    "path": outcome.path().display().to_string(),
                }),
                Err(err) => error_json(ErrorBody::from(&err)),
            }
        }
        "cleanup" => serde_json::to_value(cleanup_now(svc.store(), cfg.keep_days)?)?,
        other => bail!("unknown command: {}", other),
    };

    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
