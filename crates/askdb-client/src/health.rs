use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::debug;

use crate::error::ClientError;

/// Latest observed backend reachability.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HealthStatus {
    pub reachable: bool,
    pub message: String,
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self {
            reachable: false,
            message: "Checking connection...".to_string(),
        }
    }
}

/// Seam for the reachability probe; the production implementation is
/// `Client` calling `GET {base}/`.
#[async_trait::async_trait]
pub trait HealthProbe: Send + Sync {
    async fn probe(&self) -> Result<String, ClientError>;
}

/// Fire-and-forget periodic reachability poller.
///
/// Runs independently of the chat stream and shares no state with it;
/// probe failures are logged and swallowed, never propagated.
pub struct HealthPoller {
    status_rx: watch::Receiver<HealthStatus>,
    task: tokio::task::JoinHandle<()>,
}

impl HealthPoller {
    /// Spawns the poll task; the first probe fires immediately.
    pub fn spawn(probe: Arc<dyn HealthProbe>, period: Duration) -> Self {
        let (tx, rx) = watch::channel(HealthStatus::default());
        let task = tokio::spawn(poll_task(probe, period, tx));
        Self {
            status_rx: rx,
            task,
        }
    }

    /// Returns a receiver for observing status changes.
    pub fn subscribe(&self) -> watch::Receiver<HealthStatus> {
        self.status_rx.clone()
    }

    /// The latest observed status.
    pub fn status(&self) -> HealthStatus {
        self.status_rx.borrow().clone()
    }

    /// Stops the poll task.
    pub fn shutdown(&self) {
        self.task.abort();
    }
}

async fn poll_task(
    probe: Arc<dyn HealthProbe>,
    period: Duration,
    tx: watch::Sender<HealthStatus>,
) {
    let mut ticker = tokio::time::interval(period);
    loop {
        ticker.tick().await;
        let status = match probe.probe().await {
            Ok(message) => HealthStatus {
                reachable: true,
                message,
            },
            Err(err) => {
                debug!(error = %err, "health probe failed");
                HealthStatus {
                    reachable: false,
                    message: "API unreachable".to_string(),
                }
            }
        };
        if tx.send(status).is_err() {
            return;
        }
    }
}
