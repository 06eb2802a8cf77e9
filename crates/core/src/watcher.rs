//! Game watcher: edge-triggered polling rate switching.
//!
//! Each tick samples the process list and compares "any watched game
//! running" against the current [`WatcherState`]. Only a change of state
//! sends a command, so a game that keeps running (or a second game starting
//! while the first is still up) never re-sends the game rate.

use crate::controller::{Delivery, SharedController};
use crate::device::PollingRate;
use crate::error::{Error, Result, Severity};
use crate::notify::{Event, SharedNotifier};
use crate::process::ProcessSampler;
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// The four values the watcher takes from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatcherSettings {
    pub default_rate: PollingRate,
    pub game_rate: PollingRate,
    pub interval: Duration,
    pub games: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WatcherState {
    #[default]
    Idle,
    GameActive,
}

/// What one tick did.
#[derive(Debug)]
pub enum TickOutcome {
    /// Game presence unchanged; nothing sent.
    Unchanged,
    /// The process list could not be read; state left as it was.
    SampleFailed,
    /// State flipped and one rate command was attempted.
    Switched {
        state: WatcherState,
        rate: PollingRate,
        result: Result<Delivery>,
    },
}

pub struct GameWatcher {
    settings: WatcherSettings,
    controller: SharedController,
    sampler: Box<dyn ProcessSampler>,
    notifier: SharedNotifier,
    state: WatcherState,
}

impl GameWatcher {
    pub fn new(
        settings: WatcherSettings,
        controller: SharedController,
        sampler: Box<dyn ProcessSampler>,
        notifier: SharedNotifier,
    ) -> Self {
        Self {
            settings,
            controller,
            sampler,
            notifier,
            state: WatcherState::Idle,
        }
    }

    pub fn state(&self) -> WatcherState {
        self.state
    }

    /// Whether a game is considered running, and the rate that implies.
    pub fn status(&self) -> (bool, PollingRate) {
        match self.state {
            WatcherState::GameActive => (true, self.settings.game_rate),
            WatcherState::Idle => (false, self.settings.default_rate),
        }
    }

    /// Run one sample-compare-switch cycle.
    ///
    /// The state moves to its new value even when the rate command fails,
    /// so a failed switch is not retried until the next real transition.
    pub fn tick(&mut self) -> TickOutcome {
        let snapshot = match self.sampler.sample() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                match e.severity() {
                    Severity::Recoverable => warn!(error = %e, "Error getting processes"),
                    _ => error!(error = %e, "Error getting processes"),
                }
                return TickOutcome::SampleFailed;
            }
        };
        let running = snapshot.first_match(&self.settings.games).map(str::to_owned);

        match (running, self.state) {
            (Some(game), WatcherState::Idle) => {
                let rate = self.settings.game_rate;
                info!(game = %game, rate = rate.as_hz(), "Game detected");
                self.state = WatcherState::GameActive;
                self.notifier.notify(&Event::GameDetected {
                    game,
                    rate: rate.as_hz(),
                });
                self.switch(WatcherState::GameActive, rate)
            }
            (None, WatcherState::GameActive) => {
                let rate = self.settings.default_rate;
                info!(rate = rate.as_hz(), "No game detected");
                self.state = WatcherState::Idle;
                self.notifier.notify(&Event::GameClosed {
                    rate: rate.as_hz(),
                });
                self.switch(WatcherState::Idle, rate)
            }
            _ => TickOutcome::Unchanged,
        }
    }

    fn switch(&self, state: WatcherState, rate: PollingRate) -> TickOutcome {
        let result = self.controller.lock().apply(rate);
        match &result {
            Ok(_) => self.notifier.notify(&Event::RateChanged {
                rate: rate.as_hz(),
            }),
            Err(e) => {
                match e.severity() {
                    Severity::Recoverable => {
                        warn!(rate = rate.as_hz(), error = %e, "Failed to set polling rate")
                    }
                    _ => error!(rate = rate.as_hz(), error = %e, "Mouse unavailable"),
                }
                self.notifier.notify(&Event::Error {
                    title: failure_title(e).to_string(),
                    message: format!("could not switch to {rate}: {e}"),
                });
            }
        }
        TickOutcome::Switched {
            state,
            rate,
            result,
        }
    }

    /// Run an initial tick on the calling thread, then keep ticking on a
    /// dedicated thread every `interval` until the handle is stopped.
    pub fn start(mut self) -> Result<WatcherHandle> {
        let interval = self.settings.interval;
        let outcome = self.tick();
        debug!(?outcome, "Initial tick");

        let (stop_tx, stop_rx) = bounded::<()>(1);
        let join = thread::Builder::new()
            .name("game-watcher".to_string())
            .spawn(move || {
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {
                            let outcome = self.tick();
                            debug!(?outcome, "Tick");
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                debug!("Watcher loop exited");
                self
            })
            .map_err(Error::Io)?;

        info!(interval_ms = interval.as_millis() as u64, "Watcher started");
        Ok(WatcherHandle {
            stop_tx: Some(stop_tx),
            join: Some(join),
        })
    }
}

/// Handle to a running watcher thread.
///
/// Dropping the handle stops the watcher.
pub struct WatcherHandle {
    stop_tx: Option<Sender<()>>,
    join: Option<JoinHandle<GameWatcher>>,
}

impl WatcherHandle {
    /// Stop ticking and wait for the thread to finish.
    ///
    /// A tick already in progress runs to completion first. Returns the
    /// watcher on the first call, `None` afterwards.
    pub fn stop(&mut self) -> Option<GameWatcher> {
        if let Some(tx) = self.stop_tx.take() {
            // a full channel or exited thread both mean the loop will stop
            let _ = tx.try_send(());
        }
        let join = self.join.take()?;
        match join.join() {
            Ok(watcher) => {
                info!("Watcher stopped");
                Some(watcher)
            }
            Err(_) => {
                warn!("Watcher thread panicked");
                None
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.join.is_some()
    }
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// A transmission hiccup may clear up on the next switch; anything else
/// means the mouse is gone until the monitor is restarted.
fn failure_title(e: &Error) -> &'static str {
    match e.severity() {
        Severity::Recoverable => "Polling rate change failed",
        Severity::Fatal | Severity::Caller => "Mouse unavailable",
    }
}
