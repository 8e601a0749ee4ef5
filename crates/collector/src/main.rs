use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

mod cli;
mod client;
mod diff;
mod discovery;
mod extract;
mod metrics;
mod normalize;
mod notify;
mod scheduler;
mod snapshot;
mod store;
mod sweep;

async fn run_sweep_job(db: &common::db::AsyncDb, cfg: &common::config::Config) {
    // Cookie can change between sweeps; build the client fresh.
    let cookie = match store::get_auth_cookie(db).await {
        Ok(cookie) => cookie,
        Err(e) => {
            tracing::error!(error = %e, "cookie lookup failed");
            return;
        }
    };
    let client = match client::SignalClient::new(
        &cfg.source.base_url,
        Duration::from_secs(cfg.collector.fetch_timeout_secs),
        cookie.as_deref(),
    ) {
        Ok(client) => client,
        Err(e) => {
            tracing::error!(error = %e, "client construction failed");
            return;
        }
    };
    let policy = sweep::SweepPolicy::new(
        cfg.collector.jitter_min_secs,
        cfg.collector.jitter_max_secs,
    );
    match sweep::run_sweep_once(
        db,
        &client,
        &notify::LogNotifier,
        &policy,
        &cfg.collector.diff_exclude,
    )
    .await
    {
        Ok(stats) => {
            tracing::info!(appended = stats.appended, failed = stats.failed, "sweep done");
        }
        Err(e) => tracing::error!(error = %e, "sweep failed"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = common::config::Config::load()?;

    let dispatch = common::observability::build_dispatch("collector", &config.general.log_level);
    tracing::dispatcher::set_global_default(dispatch).map_err(anyhow::Error::msg)?;

    tracing::info!("signal collector starting");

    if let Some(parent) = std::path::Path::new(&config.database.path).parent() {
        std::fs::create_dir_all(parent)?;
    }

    let cmd = cli::parse_args(std::env::args()).map_err(anyhow::Error::msg)?;
    if cmd != cli::Command::Run {
        let db = common::db::AsyncDb::open(&config.database.path).await?;
        return cli::run_command(&db, &config, cmd).await;
    }

    metrics::install_prometheus(config.observability.prometheus_port)?;
    metrics::describe();

    let db = common::db::AsyncDb::open(&config.database.path).await?;
    let cfg = Arc::new(config);

    let (sweep_tx, mut sweep_rx) = tokio::sync::mpsc::channel::<()>(8);

    // Worker loop first, so the immediate tick has a receiver.
    tokio::spawn({
        let cfg = cfg.clone();
        let db = db.clone();
        async move {
            while sweep_rx.recv().await.is_some() {
                let span = tracing::info_span!("job_run", job = "sweep");
                run_sweep_job(&db, &cfg).instrument(span).await;
            }
        }
    });

    let _scheduler_handles = scheduler::start(vec![scheduler::JobSpec {
        name: "sweep".to_string(),
        interval: Duration::from_secs(cfg.collector.sweep_interval_secs),
        tick: sweep_tx,
        run_immediately: true,
    }]);
    tracing::info!(
        interval_secs = cfg.collector.sweep_interval_secs,
        "scheduler started"
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down (force exit in 5s)");

    // Give the in-flight sweep a moment to commit, then force exit.
    tokio::spawn(async {
        tokio::time::sleep(Duration::from_secs(5)).await;
        tracing::warn!("force exit after timeout");
        std::process::exit(0);
    });

    Ok(())
}
