//! Credential sweeper agent.
//!
//! Periodically removes expired and consumed tokens, expired sessions and idle
//! rate-limit windows. Validity never depends on the sweep: every read path
//! checks expiry itself, so the sweep only bounds storage growth.

use super::request_reply::{create_request_reply, send_optional_response, ResponseChannel};
use crate::clock::Clock;
use crate::services::RateLimiter;
use crate::store::{within, CredentialStore, StoreError, StoreResult};
use acton_reactive::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

/// What a sweep operates on.
#[derive(Debug, Clone)]
pub struct SweepTargets {
    /// Store to purge.
    pub store: Arc<dyn CredentialStore>,
    /// Limiter whose idle keys are dropped.
    pub limiter: Arc<RateLimiter>,
    /// Time source for expiry decisions.
    pub clock: Arc<dyn Clock>,
    /// Deadline for the purge.
    pub store_timeout: Duration,
}

/// Counts removed by one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Tokens removed.
    pub tokens: u64,
    /// Sessions removed.
    pub sessions: u64,
    /// Idle limiter keys removed.
    pub limiter_keys: usize,
}

/// Sweeper agent state.
#[derive(Debug, Default)]
pub struct CredentialSweeperAgent {
    targets: Option<SweepTargets>,
}

impl CredentialSweeperAgent {
    /// Spawn the sweeper and its periodic trigger.
    ///
    /// # Errors
    ///
    /// Returns error if agent initialization fails.
    pub async fn spawn(
        runtime: &mut ActorRuntime,
        targets: SweepTargets,
        interval: Duration,
    ) -> anyhow::Result<ActorHandle> {
        let name = Ern::with_root("admin-auth-sweeper")
            .map_err(|e| anyhow::anyhow!("invalid actor name: {e:?}"))?;
        let config = ActorConfig::new(name, None, None)?;
        let mut builder = runtime.new_actor_with_config::<Self>(config);
        builder.model = Self {
            targets: Some(targets),
        };

        builder.mutate_on::<SweepExpired>(|agent, ctx| {
            let targets = agent.model.targets.clone();
            let response_tx = ctx.message().response_tx.clone();
            Reply::pending(async move {
                let result = match targets {
                    Some(targets) => run_sweep(targets).await,
                    None => Ok(SweepReport::default()),
                };
                send_optional_response(response_tx, result).await;
            })
        });

        let handle = builder.start().await;
        Self::spawn_sweep_task(handle.clone(), interval);
        Ok(handle)
    }

    /// Spawn the periodic sweep trigger.
    fn spawn_sweep_task(handle: ActorHandle, period: Duration) {
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut interval = tokio::time::interval_at(start, period);
            loop {
                interval.tick().await;
                handle.send(SweepExpired::fire_and_forget()).await;
            }
        });
    }
}

/// Run one sweep on its own task, since the store future is not `Sync`.
async fn run_sweep(targets: SweepTargets) -> StoreResult<SweepReport> {
    tokio::spawn(sweep(targets)).await.unwrap_or_else(|e| {
        tracing::error!(scope = "auth.sweep", error = %e, "sweep task failed");
        Err(StoreError::Backend(format!("sweep task failed: {e}")))
    })
}

/// Purge the store and limiter once.
async fn sweep(targets: SweepTargets) -> StoreResult<SweepReport> {
    let now = targets.clock.now();
    let purged = within(
        targets.store_timeout,
        "purge_expired",
        targets.store.purge_expired(now),
    )
    .await
    .inspect_err(|e| {
        tracing::error!(scope = "auth.sweep", error = %e, "failed to purge credentials");
    })?;
    let limiter_keys = targets.limiter.purge_idle();

    let report = SweepReport {
        tokens: purged.tokens,
        sessions: purged.sessions,
        limiter_keys,
    };
    if report != SweepReport::default() {
        tracing::info!(
            scope = "auth.sweep",
            backend = targets.store.backend(),
            tokens = report.tokens,
            sessions = report.sessions,
            limiter_keys = report.limiter_keys,
            "swept expired credentials"
        );
    }
    Ok(report)
}

// ============================================================================
// Messages
// ============================================================================

/// Trigger a sweep, optionally waiting for its report.
#[derive(Clone, Debug)]
pub struct SweepExpired {
    /// Response channel.
    pub response_tx: Option<ResponseChannel<StoreResult<SweepReport>>>,
}

impl SweepExpired {
    /// Sweep request with a response channel.
    #[must_use]
    pub fn with_response() -> (Self, oneshot::Receiver<StoreResult<SweepReport>>) {
        let (response_tx, rx) = create_request_reply();
        (
            Self {
                response_tx: Some(response_tx),
            },
            rx,
        )
    }

    /// Sweep request nobody waits on.
    #[must_use]
    pub const fn fire_and_forget() -> Self {
        Self { response_tx: None }
    }
}
