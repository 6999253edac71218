//! Round driver: a Tokio task that polls a room until the duel ends.
//!
//! The driver owns a [`PollScheduler`] and calls
//! [`RoomController::try_advance`] on every poll. It talks to the outside
//! world through an mpsc command channel, the same way a room actor does.

use std::sync::Arc;

use manaduel_protocol::{RoomCode, Winner};
use manaduel_store::SharedStore;
use manaduel_tick::{Clock, PollConfig, PollScheduler};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::{Advance, RoomController, RoomError};

/// Counters kept by a running driver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverStats {
    pub polls: u64,
    /// Rounds this client resolved.
    pub resolved_rounds: u64,
    /// Phase races lost to another client.
    pub lost_races: u64,
    /// Resolutions held back by an empty seat.
    pub skipped: u64,
    /// Polls that failed on a store or decode error.
    pub errors: u64,
}

pub(crate) enum DriverCommand {
    Pause,
    Resume,
    Stats {
        reply: oneshot::Sender<DriverStats>,
    },
    Shutdown {
        reply: oneshot::Sender<DriverStats>,
    },
}

/// Handle to a running driver. Cheap to clone.
#[derive(Clone)]
pub struct DriverHandle {
    code: RoomCode,
    sender: mpsc::Sender<DriverCommand>,
    outcome: watch::Receiver<Option<Winner>>,
}

impl DriverHandle {
    pub fn code(&self) -> &RoomCode {
        &self.code
    }

    /// Stops polling until [`resume`](Self::resume).
    pub async fn pause(&self) -> Result<(), RoomError> {
        self.send(DriverCommand::Pause).await
    }

    pub async fn resume(&self) -> Result<(), RoomError> {
        self.send(DriverCommand::Resume).await
    }

    pub async fn stats(&self) -> Result<DriverStats, RoomError> {
        let (reply, rx) = oneshot::channel();
        self.send(DriverCommand::Stats { reply }).await?;
        rx.await.map_err(|_| RoomError::Unavailable(self.code.clone()))
    }

    /// Stops the driver and returns its final counters.
    pub async fn shutdown(&self) -> Result<DriverStats, RoomError> {
        let (reply, rx) = oneshot::channel();
        self.send(DriverCommand::Shutdown { reply }).await?;
        rx.await.map_err(|_| RoomError::Unavailable(self.code.clone()))
    }

    /// Waits for the duel to end and returns its winner.
    ///
    /// Returns `None` if the driver stopped first, or if the room was
    /// marked finished without a winner.
    pub async fn finished(&self) -> Option<Winner> {
        let mut outcome = self.outcome.clone();
        if let Ok(winner) = outcome.wait_for(Option::is_some).await {
            return winner.clone();
        }
        outcome.borrow().clone()
    }

    /// `true` once the driver task has exited.
    pub fn is_stopped(&self) -> bool {
        self.sender.is_closed()
    }

    async fn send(&self, cmd: DriverCommand) -> Result<(), RoomError> {
        self.sender
            .send(cmd)
            .await
            .map_err(|_| RoomError::Unavailable(self.code.clone()))
    }
}

struct RoundDriver<S: SharedStore, C: Clock> {
    controller: Arc<RoomController<S, C>>,
    scheduler: PollScheduler,
    receiver: mpsc::Receiver<DriverCommand>,
    outcome: watch::Sender<Option<Winner>>,
    stats: DriverStats,
}

impl<S: SharedStore, C: Clock> RoundDriver<S, C> {
    async fn run(mut self) {
        let code = self.controller.code().clone();
        info!(room = %code, "round driver started");

        loop {
            tokio::select! {
                cmd = self.receiver.recv() => match cmd {
                    Some(DriverCommand::Pause) => self.scheduler.pause(),
                    Some(DriverCommand::Resume) => self.scheduler.resume(),
                    Some(DriverCommand::Stats { reply }) => {
                        let _ = reply.send(self.stats);
                    }
                    Some(DriverCommand::Shutdown { reply }) => {
                        let _ = reply.send(self.stats);
                        break;
                    }
                    None => break,
                },
                _ = self.scheduler.wait_for_poll() => {
                    self.stats.polls += 1;
                    let done = self.poll(&code).await;
                    self.scheduler.record_poll_end();
                    if done {
                        break;
                    }
                }
            }
        }

        info!(room = %code, polls = self.stats.polls, "round driver stopped");
    }

    /// Runs one advance step. Returns `true` once the duel is over.
    async fn poll(&mut self, code: &RoomCode) -> bool {
        match self.controller.try_advance().await {
            Ok(Advance::Resolved { winner, .. }) => {
                self.stats.resolved_rounds += 1;
                match winner {
                    Some(winner) => self.finish(Some(winner)),
                    None => false,
                }
            }
            Ok(Advance::Finished { winner }) => self.finish(winner),
            Ok(Advance::Lost { .. }) => {
                self.stats.lost_races += 1;
                false
            }
            Ok(Advance::Skipped { .. }) => {
                self.stats.skipped += 1;
                false
            }
            Ok(Advance::Idle | Advance::Waiting { .. } | Advance::Pending { .. }) => false,
            Err(err) => {
                self.stats.errors += 1;
                warn!(room = %code, error = %err, "poll failed, retrying next interval");
                false
            }
        }
    }

    fn finish(&mut self, winner: Option<Winner>) -> bool {
        debug!(room = %self.controller.code(), ?winner, "duel over, stopping driver");
        self.outcome.send_replace(winner);
        true
    }
}

/// Spawns a driver for `controller` and returns its handle.
pub fn spawn_driver<S: SharedStore, C: Clock>(
    controller: Arc<RoomController<S, C>>,
    poll: PollConfig,
) -> DriverHandle {
    let (tx, rx) = mpsc::channel(16);
    let (outcome_tx, outcome_rx) = watch::channel(None);
    let code = controller.code().clone();

    let driver = RoundDriver {
        controller,
        scheduler: PollScheduler::new(poll),
        receiver: rx,
        outcome: outcome_tx,
        stats: DriverStats::default(),
    };

    tokio::spawn(driver.run());

    DriverHandle {
        code,
        sender: tx,
        outcome: outcome_rx,
    }
}
