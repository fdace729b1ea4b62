//! State machine driving one region download.
//!
//! ```text
//! Created ──start()──► Downloading ──┬── pack complete ──► Completed
//!                                    ├── engine error ───► Failed
//!                                    └── tile limit ─────► LimitExceeded
//! ```
//!
//! A downloader only acts on events whose pack context equals the context
//! captured at creation. Exactly one terminal transition is acted upon;
//! late or duplicate events after that are ignored.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::channel::{ProgressChannel, ProgressEvent};
use super::error::OfflineError;
use super::manager::ManagerShared;
use super::registry::Ticket;
use crate::engine::{PackEvent, PackHandle, PackState};
use crate::region::RegionRecord;

/// Final result of one download, delivered once.
pub(crate) type DownloadResult = Result<(), OfflineError>;

/// Lifecycle state of a [`Downloader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadState {
    Created,
    Downloading,
    Completed,
    Failed,
    LimitExceeded,
}

impl DownloadState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DownloadState::Completed | DownloadState::Failed | DownloadState::LimitExceeded
        )
    }
}

/// Terminal transition selected by [`Downloader::handle_event`].
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Terminal {
    Completed,
    Failed(String),
    LimitExceeded(u64),
}

/// Drives one pack from creation to a terminal state.
#[derive(Debug)]
pub struct Downloader {
    record: RegionRecord,
    pack: PackHandle,
    channel: ProgressChannel,
    ticket: Ticket,
    state: Mutex<DownloadState>,
    completed: AtomicBool,
    result: Mutex<Option<oneshot::Sender<DownloadResult>>>,
}

impl Downloader {
    pub(crate) fn new(
        record: RegionRecord,
        pack: PackHandle,
        channel: ProgressChannel,
        ticket: Ticket,
        result: oneshot::Sender<DownloadResult>,
    ) -> Self {
        Self {
            record,
            pack,
            channel,
            ticket,
            state: Mutex::new(DownloadState::Created),
            completed: AtomicBool::new(false),
            result: Mutex::new(Some(result)),
        }
    }

    pub fn record(&self) -> &RegionRecord {
        &self.record
    }

    pub fn pack(&self) -> &PackHandle {
        &self.pack
    }

    pub fn state(&self) -> DownloadState {
        *self.state.lock()
    }

    /// Enter `Downloading` and announce the start.
    pub(crate) fn start(&self) {
        *self.state.lock() = DownloadState::Downloading;
        self.channel.emit(ProgressEvent::Start);
        debug!(region_id = self.record.id(), pack_id = self.pack.id, "Download started");
    }

    /// Set the completion flag. Only the first caller gets `true`.
    fn try_complete(&self) -> bool {
        !self.completed.swap(true, Ordering::SeqCst)
    }

    /// React to an engine event. Returns the terminal transition to perform,
    /// if this event ends the download.
    pub(crate) fn handle_event(&self, event: &PackEvent) -> Option<Terminal> {
        if event.pack().context != self.pack.context {
            trace!(
                region_id = self.record.id(),
                pack_id = event.pack().id,
                "Ignoring event for another pack"
            );
            return None;
        }
        if self.completed.load(Ordering::SeqCst) {
            trace!(region_id = self.record.id(), "Ignoring event after completion");
            return None;
        }

        match event {
            PackEvent::Progress {
                progress, state, ..
            } => {
                let done = *state == PackState::Complete || progress.is_complete();
                let percent = if done { 100.0 } else { progress.percent() };
                self.channel.emit(ProgressEvent::Progress { progress: percent });

                (done && self.try_complete()).then_some(Terminal::Completed)
            }
            PackEvent::Error { message, .. } => self
                .try_complete()
                .then(|| Terminal::Failed(message.clone())),
            PackEvent::TileCountLimitExceeded { maximum, .. } => self
                .try_complete()
                .then_some(Terminal::LimitExceeded(*maximum)),
        }
    }

    fn resolve(&self, result: DownloadResult) {
        if let Some(tx) = self.result.lock().take() {
            // Caller may have stopped waiting
            let _ = tx.send(result);
        }
    }

    /// Perform the side effects of a terminal transition.
    ///
    /// The result is resolved last, after cleanup and release, so a caller
    /// woken by it sees the registry and store already settled.
    pub(crate) async fn finish(&self, terminal: Terminal, shared: &ManagerShared) {
        let id = self.record.id();

        let result = match terminal {
            Terminal::Completed => {
                *self.state.lock() = DownloadState::Completed;
                self.channel.emit(ProgressEvent::Success);
                info!(region_id = id, "Region download complete");
                Ok(())
            }
            Terminal::Failed(message) => {
                *self.state.lock() = DownloadState::Failed;
                warn!(region_id = id, error = %message, "Region download failed");
                Err(OfflineError::DownloadError(message))
            }
            Terminal::LimitExceeded(maximum) => {
                *self.state.lock() = DownloadState::LimitExceeded;
                warn!(region_id = id, maximum, "Region download hit tile count limit");
                Err(OfflineError::TileCountLimitExceeded { maximum })
            }
        };

        if let Err(error) = &result {
            self.channel.emit(ProgressEvent::Error {
                code: error.code().to_string(),
                message: Some(error.to_string()),
            });

            // The partial pack is unusable
            if let Err(e) = shared.discard_region(id).await {
                debug!(region_id = id, error = %e, "Cleanup of failed region did not complete");
            }
        }

        self.close(shared);
        self.resolve(result);
    }

    /// Leave the registry and tear down the progress channel.
    ///
    /// Only this downloader's own registration is removed; a successor
    /// registered for the same region after a release stays in place.
    pub(crate) fn close(&self, shared: &ManagerShared) {
        shared.registry().release_ticket(self.record.id(), self.ticket);
        self.channel.close();
    }

    /// Task loop: consume routed events until a terminal transition, a
    /// release, or shutdown.
    pub(crate) async fn run(
        self,
        mut events: mpsc::UnboundedReceiver<PackEvent>,
        shared: Arc<ManagerShared>,
        shutdown: CancellationToken,
    ) {
        let id = self.record.id();

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    debug!(region_id = id, "Downloader stopped by shutdown");
                    self.resolve(Err(OfflineError::ShutDown));
                    self.channel.close();
                    break;
                }

                received = events.recv() => match received {
                    Some(event) => {
                        if let Some(terminal) = self.handle_event(&event) {
                            self.finish(terminal, &shared).await;
                            break;
                        }
                    }
                    None => {
                        debug!(region_id = id, "Downloader released");
                        self.resolve(Err(OfflineError::Released(id)));
                        self.channel.close();
                        break;
                    }
                }
            }
        }
    }
}
