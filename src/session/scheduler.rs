//! Periodic wallet refresh and pending-driven ledger sync.

use super::Session;
use crate::error::SessionError;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Two background tasks bound to one session. Both stop when the session
/// disconnects or [`Scheduler::stop`] is called.
#[derive(Debug)]
pub struct Scheduler {
    token: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl Scheduler {
    pub fn start(session: Arc<Session>) -> Self {
        let token = session.shutdown.child_token();
        let handles = vec![
            tokio::spawn(wallet_loop(session.clone(), token.clone())),
            tokio::spawn(ledger_loop(session, token.clone())),
        ];
        Self { token, handles }
    }

    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    pub async fn join(self) {
        for handle in self.handles {
            if let Err(err) = handle.await {
                warn!("scheduler task ended abnormally: {}", err);
            }
        }
    }
}

async fn wallet_loop(session: Arc<Session>, cancel: CancellationToken) {
    let period = session.config().wallet_poll();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = sleep(period) => {}
        }
        match session.refresh_wallet().await {
            Ok(()) => {}
            Err(SessionError::Disconnected(reason)) => {
                info!("wallet refresh stopped: {}", reason);
                break;
            }
            Err(err) => warn!("wallet refresh failed: {}", err),
        }
    }
    debug!("wallet refresh task stopped");
}

/// Idles while nothing is pending; otherwise syncs every ledger period until the
/// pending set drains.
async fn ledger_loop(session: Arc<Session>, cancel: CancellationToken) {
    let period = session.config().ledger_sync();
    loop {
        if session.pending_len() == 0 {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = session.pending_changed.notified() => continue,
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = sleep(period) => {}
        }
        match session.sync_ledger().await {
            Ok(_) => {}
            Err(SessionError::Disconnected(_)) => break,
            // previous snapshot stays in place until the next tick
            Err(err) => warn!("ledger sync failed: {}", err),
        }
    }
    debug!("ledger sync task stopped");
}
