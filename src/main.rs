use anyhow::Result;
use std::sync::Arc;

use geoalerts::archive::fetch::{ArchiveFetcher, HttpTransport};
use geoalerts::config::Config;
use geoalerts::logging::{log, obj, v_str, Domain, Level};
use geoalerts::scheduler::Scheduler;
use geoalerts::service::AlertService;
use geoalerts::storage::Ledger;

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::from_env();
    std::fs::create_dir_all(&cfg.storage_root)?;

    let mut ledger = Ledger::new(&cfg.ledger_path)?;
    ledger.init()?;

    let service = Arc::new(AlertService::new(cfg.clone()));
    let fetcher = ArchiveFetcher::new(
        HttpTransport::new(cfg.fetch_timeout())?,
        service.store().clone(),
        &cfg.lastupdate_url,
        &cfg.feed_base_url,
    );

    log(
        Level::Info,
        Domain::System,
        "daemon_start",
        obj(&[
            ("root", v_str(&cfg.storage_root.display().to_string())),
            ("schema", v_str(cfg.schema_version.as_str())),
            ("ledger", v_str(&cfg.ledger_path)),
        ]),
    );

    Scheduler::new(fetcher, service, Some(ledger)).run().await;
    Ok(())
}
