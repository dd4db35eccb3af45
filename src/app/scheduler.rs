//! Background discovery driver.
//!
//! Two triggers feed one scan routine: a fixed-period tick and a debounce
//! deadline re-armed by every registration change. Redundant scans are
//! harmless, since a scan with no state change creates nothing.

use anyhow::{Context as _, Result};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::app::config::DiscoveryConfig;
use crate::app::engine::FlowEngine;

pub struct DiscoveryScheduler {
    stop: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl DiscoveryScheduler {
    /// Spawn the loop on the current tokio runtime.
    pub fn spawn<P: Send + Sync + 'static>(engine: FlowEngine<P>, config: DiscoveryConfig) -> Self {
        let (stop, stopped) = watch::channel(false);
        info!(
            debounce_ms = config.debounce_ms,
            scan_interval_ms = config.scan_interval_ms,
            "discovery scheduler started"
        );
        let handle = tokio::spawn(run(engine, config, stopped));
        Self {
            stop,
            handle: Some(handle),
        }
    }

    /// Ask the loop to stop. Safe to call repeatedly.
    pub fn shutdown(&self) {
        let _ = self.stop.send(true);
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the loop and wait for it to exit.
    pub async fn join(mut self) -> Result<()> {
        self.shutdown();
        if let Some(handle) = self.handle.take() {
            handle.await.context("discovery task failed")?;
        }
        Ok(())
    }
}

impl Drop for DiscoveryScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn run<P: Send + Sync + 'static>(
    engine: FlowEngine<P>,
    config: DiscoveryConfig,
    mut stopped: watch::Receiver<bool>,
) {
    let rescan = engine.rescan_signal();
    let period = config.scan_interval();
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let debounce = time::sleep(config.debounce());
    tokio::pin!(debounce);
    let mut armed = false;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                scan(&engine, "interval");
            }
            _ = rescan.notified() => {
                debounce.as_mut().reset(Instant::now() + config.debounce());
                armed = true;
            }
            _ = &mut debounce, if armed => {
                armed = false;
                scan(&engine, "debounce");
            }
            changed = stopped.changed() => {
                if changed.is_err() || *stopped.borrow() {
                    break;
                }
            }
        }
    }
    info!("discovery scheduler stopped");
}

fn scan<P: Send + Sync + 'static>(engine: &FlowEngine<P>, trigger: &'static str) {
    let report = engine.scan();
    debug!(
        trigger,
        suggested = report.suggested.len(),
        created = report.created.len(),
        "scheduled scan"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::config::EngineConfig;
    use crate::domain::definition::DependencyDefinition;
    use std::time::Duration;

    fn engine() -> FlowEngine<String> {
        let engine = FlowEngine::new(EngineConfig::default());
        engine.register_definition(DependencyDefinition::provider("list", "EmailList", "email"));
        engine.register_definition(DependencyDefinition::consumer("detail", "EmailDetail", "email"));
        engine
    }

    fn mount(engine: &FlowEngine<String>, id: &str, ty: &str) {
        engine.register_instance(id, "main", ty);
        engine.set_active(&id.into(), true).unwrap();
    }

    fn config() -> DiscoveryConfig {
        DiscoveryConfig {
            debounce_ms: 50,
            scan_interval_ms: 10_000,
            ..DiscoveryConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounced_scan_after_quiet_period() {
        let engine = engine();
        let scheduler = DiscoveryScheduler::spawn(engine.clone(), config());
        tokio::task::yield_now().await;

        mount(&engine, "list-1", "EmailList");
        mount(&engine, "detail-1", "EmailDetail");
        time::sleep(Duration::from_millis(20)).await;
        assert!(engine.dependencies().is_empty());

        time::sleep(Duration::from_millis(60)).await;
        assert_eq!(engine.dependencies().len(), 1);

        scheduler.join().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_churn_rearms_debounce() {
        let engine = engine();
        let scheduler = DiscoveryScheduler::spawn(engine.clone(), config());
        tokio::task::yield_now().await;

        mount(&engine, "list-1", "EmailList");
        time::sleep(Duration::from_millis(40)).await;
        mount(&engine, "detail-1", "EmailDetail");
        time::sleep(Duration::from_millis(40)).await;
        // 80ms since the first change, 40ms since the latest
        assert!(engine.dependencies().is_empty());

        time::sleep(Duration::from_millis(30)).await;
        assert_eq!(engine.dependencies().len(), 1);
        scheduler.join().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_scan_runs_without_churn() {
        let engine = engine();
        let scheduler = DiscoveryScheduler::spawn(
            engine.clone(),
            DiscoveryConfig {
                debounce_ms: 50,
                scan_interval_ms: 1_000,
                ..DiscoveryConfig::default()
            },
        );
        tokio::task::yield_now().await;
        mount(&engine, "list-1", "EmailList");
        mount(&engine, "detail-1", "EmailDetail");
        time::sleep(Duration::from_millis(100)).await;
        assert_eq!(engine.dependencies().len(), 1);

        // edge removal is not registration churn, only the tick restores it
        engine.remove_dependency(engine.dependencies()[0].id);
        time::sleep(Duration::from_millis(500)).await;
        assert!(engine.dependencies().is_empty());

        time::sleep(Duration::from_millis(500)).await;
        assert_eq!(engine.dependencies().len(), 1);
        scheduler.join().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_is_idempotent() {
        let scheduler = DiscoveryScheduler::spawn(engine(), config());
        scheduler.shutdown();
        scheduler.shutdown();
        scheduler.join().await.unwrap();
    }
}
