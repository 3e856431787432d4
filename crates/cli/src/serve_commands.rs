use std::{sync::Arc, time::Duration};

use {
    linkfetch_config::LinkfetchConfig,
    linkfetch_media::{Janitor, Orchestrator},
    linkfetch_telegram::BotState,
    tokio::task::JoinHandle,
    tokio_util::sync::CancellationToken,
    tracing::{info, warn},
};

pub async fn serve(config: &LinkfetchConfig, orchestrator: Arc<Orchestrator>) -> anyhow::Result<()> {
    let validation = linkfetch_config::validate(config);
    if validation.has_errors() {
        for d in &validation.diagnostics {
            warn!(path = %d.path, category = d.category, "{}", d.message);
        }
        anyhow::bail!("configuration has errors; run `linkfetch check-config` for details");
    }

    let janitor = orchestrator.janitor().clone();
    let stale_after = Duration::from_secs(config.downloads.stale_after_secs);
    startup_sweep(&janitor, stale_after).await;

    let bot = linkfetch_telegram::connect(config).await?;
    let state = Arc::new(BotState::new(bot, config, orchestrator)?);
    let cancel = linkfetch_telegram::start_polling(state);

    let sweeper = sweep_interval(config.downloads.sweep_interval_secs)
        .map(|every| spawn_sweeper(janitor, every, stale_after, cancel.clone()));
    if sweeper.is_none() {
        info!("periodic sweep disabled");
    }

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("shutdown requested");
        },
        () = cancel.cancelled() => {
            warn!("telegram polling stopped, shutting down");
        },
    }
    cancel.cancel();
    if let Some(sweeper) = sweeper {
        sweeper.await?;
    }
    Ok(())
}

/// Zero turns the periodic sweep off.
fn sweep_interval(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

/// Leftovers from a previous run are never resumable.
async fn startup_sweep(janitor: &Janitor, stale_after: Duration) {
    let stale = janitor.purge_stale(stale_after).await;
    let partial = janitor.purge_partial().await;
    info!(
        stale = stale.removed,
        partial = partial.removed,
        failed = stale.failed + partial.failed,
        "startup sweep finished"
    );
}

fn spawn_sweeper(
    janitor: Janitor,
    every: Duration,
    stale_after: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        // The first tick completes immediately; the startup sweep covered it.
        interval.tick().await;
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = interval.tick() => {
                    let report = janitor.purge_stale(stale_after).await;
                    if report.removed > 0 || report.failed > 0 {
                        info!(removed = report.removed, failed = report.failed, "periodic sweep");
                    }
                },
            }
        }
    })
}
