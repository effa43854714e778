//! Per-trade async orchestration (spec §5).
//!
//! The state machine in [`crate::trade`] is synchronous and pure. This
//! module supplies the surrounding concurrency model: one [`TradeRunner`]
//! per `trade_id`, linearizing every envelope for that trade through a
//! single queue, while different trades run independently with no shared
//! mutable state beyond the receipt store.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};

use crate::envelope::SignedEnvelope;
use crate::error::CoreError;
use crate::receipt::ReceiptStore;
use crate::trade::Trade;

/// A unit of work delivered to a trade's runner.
enum Command {
    Apply {
        envelope: Box<SignedEnvelope>,
        now_unix: i64,
        reply: mpsc::Sender<Result<Trade, CoreError>>,
    },
    Cancel,
}

/// A handle used to feed envelopes to a running trade's serialized queue.
/// Cloning shares the same underlying queue; dropping every handle ends the
/// runner's processing loop.
#[derive(Clone)]
pub struct TradeHandle {
    trade_id: String,
    tx: mpsc::Sender<Command>,
}

impl TradeHandle {
    pub fn trade_id(&self) -> &str {
        &self.trade_id
    }

    /// Submit one signed envelope for ordered application. Resolves once
    /// the envelope has been processed (not merely enqueued), in keeping
    /// with the per-trade linearization guarantee (spec §5).
    pub async fn apply(&self, envelope: SignedEnvelope, now_unix: i64) -> Result<Trade, CoreError> {
        let (reply_tx, mut reply_rx) = mpsc::channel(1);
        self.tx
            .send(Command::Apply {
                envelope: Box::new(envelope),
                now_unix,
                reply: reply_tx,
            })
            .await
            .map_err(|_| CoreError::Transport(crate::error::TransportError::Disconnected))?;
        reply_rx
            .recv()
            .await
            .ok_or(CoreError::Transport(crate::error::TransportError::Disconnected))?
    }

    /// Request cancellation of this trade. Does not revoke any
    /// already-broadcast Lightning payment or submitted claim (spec §5);
    /// those are only ever observed and reflected by future transitions.
    pub async fn cancel(&self) -> Result<(), CoreError> {
        self.tx
            .send(Command::Cancel)
            .await
            .map_err(|_| CoreError::Transport(crate::error::TransportError::Disconnected))
    }
}

/// Spawns the background task that owns one trade's mutable state and
/// drains its command queue in order. Returns a cloneable handle plus the
/// `JoinHandle` for the caller to await on shutdown.
pub fn spawn_trade_runner(
    trade_id: impl Into<String>,
    store: Arc<dyn ReceiptStore>,
    queue_depth: usize,
) -> (TradeHandle, tokio::task::JoinHandle<()>) {
    let trade_id = trade_id.into();
    let (tx, rx) = mpsc::channel(queue_depth);
    let handle = TradeHandle {
        trade_id: trade_id.clone(),
        tx,
    };

    let join = tokio::spawn(run_loop(trade_id, store, rx));
    (handle, join)
}

async fn run_loop(trade_id: String, store: Arc<dyn ReceiptStore>, mut rx: mpsc::Receiver<Command>) {
    let trade = Mutex::new(Trade::create_initial(trade_id.clone()));
    while let Some(command) = rx.recv().await {
        match command {
            Command::Apply {
                envelope,
                now_unix,
                reply,
            } => {
                let mut guard = trade.lock().await;
                let result = guard.apply(&envelope, now_unix);
                match result {
                    Ok(next) => {
                        if let Err(err) = store.append(&trade_id, *envelope) {
                            warn!(trade_id, %err, "receipt append failed");
                        }
                        *guard = next.clone();
                        let _ = reply.send(Ok(next)).await;
                    }
                    Err(err) => {
                        let _ = reply.send(Err(err)).await;
                    }
                }
            }
            Command::Cancel => {
                info!(trade_id, "cancellation requested, ending trade runner");
                break;
            }
        }
    }
}
