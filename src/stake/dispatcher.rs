//! Supervised fan-out of stake attempts.
//!
//! The poller only pushes `SwapEvent`s into an unbounded channel, so a slow
//! submission never stalls scanning. The dispatcher task owns a `JoinSet`
//! with one task per event and reaps each one, surfacing panics.

use crate::notify::Notifier;
use crate::stake::StakeSubmitter;
use crate::watcher::SwapEvent;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tracing::{error, info, warn};

/// Sending side given to the poller.
#[derive(Clone)]
pub struct DispatchHandle {
    tx: mpsc::UnboundedSender<SwapEvent>,
}

impl DispatchHandle {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SwapEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queue a stake for `event`. Never blocks. False if the dispatcher is gone.
    pub fn dispatch(&self, event: SwapEvent) -> bool {
        match self.tx.send(event) {
            Ok(()) => true,
            Err(e) => {
                error!(netuid = e.0.netuid, "stake dispatcher stopped, dropping swap event");
                false
            }
        }
    }
}

pub struct ActionDispatcher {
    submitter: Arc<StakeSubmitter>,
    notifier: Arc<dyn Notifier>,
    rx: mpsc::UnboundedReceiver<SwapEvent>,
    tasks: JoinSet<(SwapEvent, bool)>,
}

impl ActionDispatcher {
    pub fn new(submitter: Arc<StakeSubmitter>, notifier: Arc<dyn Notifier>) -> (Self, DispatchHandle) {
        let (handle, rx) = DispatchHandle::channel();
        let dispatcher = Self {
            submitter,
            notifier,
            rx,
            tasks: JoinSet::new(),
        };
        (dispatcher, handle)
    }

    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Runs until every `DispatchHandle` is dropped and all stakes have finished.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                maybe_event = self.rx.recv() => match maybe_event {
                    Some(event) => self.spawn(event),
                    None => break,
                },
                Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => {
                    self.reap(joined);
                }
            }
        }

        while let Some(joined) = self.tasks.join_next().await {
            self.reap(joined);
        }
        info!("stake dispatcher stopped");
    }

    fn spawn(&mut self, event: SwapEvent) {
        info!(
            netuid = event.netuid,
            caller = %event.caller,
            in_flight = self.tasks.len(),
            "dispatching stake"
        );
        let submitter = self.submitter.clone();
        self.tasks.spawn(async move {
            let ok = submitter.stake(event.netuid).await;
            (event, ok)
        });
    }

    fn reap(&self, joined: Result<(SwapEvent, bool), JoinError>) {
        match joined {
            Ok((event, true)) => {
                info!(netuid = event.netuid, caller = %event.caller, "stake task finished");
            }
            Ok((event, false)) => {
                warn!(netuid = event.netuid, caller = %event.caller, "stake task finished without staking");
            }
            Err(e) if e.is_panic() => {
                let msg = format!("[Stake task panicked] {}", e);
                error!(error = %e, "stake task panicked");
                self.notifier.notify(&msg);
            }
            Err(e) => {
                warn!(error = %e, "stake task cancelled");
            }
        }
    }
}
