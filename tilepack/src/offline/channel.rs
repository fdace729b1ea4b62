//! Per-download progress channel.
//!
//! One [`ProgressChannel`] is opened per in-flight download. The downloader
//! holds the sending half and the caller reads a [`ProgressStream`]:
//!
//! ```text
//! Start ──► Progress(p0) ──► Progress(p1) ──► ... ──► Success | Error
//! ```
//!
//! The channel tears itself down after the first terminal event, or as soon
//! as the caller drops its stream.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::region::RegionId;

/// Prefix of every download channel name.
pub const DOWNLOAD_CHANNEL_PREFIX: &str = "downloadOfflineRegion_";

/// Channel name for the download of `region`.
pub fn channel_name(region: RegionId) -> String {
    format!("{}{}", DOWNLOAD_CHANNEL_PREFIX, region)
}

/// Lifecycle event of one download.
///
/// Serializes as `{"status": "start"}`, `{"status": "progress", "progress": 50.0}`,
/// `{"status": "success"}` or `{"status": "error", "code": .., "message": ..}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ProgressEvent {
    Start,
    Progress {
        /// Percentage in `0.0..=100.0`.
        progress: f64,
    },
    Success,
    Error {
        code: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

impl ProgressEvent {
    /// `Success` and `Error` end the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProgressEvent::Success | ProgressEvent::Error { .. })
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| String::from("{}"))
    }
}

/// Sending half, owned by the downloader.
#[derive(Debug)]
pub struct ProgressChannel {
    name: String,
    sender: Mutex<Option<mpsc::UnboundedSender<ProgressEvent>>>,
}

impl ProgressChannel {
    /// Open a named channel.
    pub fn open(name: impl Into<String>) -> (ProgressChannel, ProgressStream) {
        let name = name.into();
        let (tx, rx) = mpsc::unbounded_channel();
        (
            ProgressChannel {
                name: name.clone(),
                sender: Mutex::new(Some(tx)),
            },
            ProgressStream { name, receiver: rx },
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Send an event. Returns `false` once the channel is torn down.
    pub fn emit(&self, event: ProgressEvent) -> bool {
        let mut sender = self.sender.lock();
        let Some(tx) = sender.as_ref() else {
            return false;
        };

        let terminal = event.is_terminal();
        if tx.send(event).is_err() {
            // Caller stopped listening
            *sender = None;
            return false;
        }
        if terminal {
            *sender = None;
        }
        true
    }

    /// Tear the channel down without a terminal event.
    pub fn close(&self) {
        self.sender.lock().take();
    }

    pub fn is_closed(&self) -> bool {
        self.sender.lock().as_ref().map_or(true, |tx| tx.is_closed())
    }
}

/// Receiving half, handed to the caller.
#[derive(Debug)]
pub struct ProgressStream {
    name: String,
    receiver: mpsc::UnboundedReceiver<ProgressEvent>,
}

impl ProgressStream {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Next event, or `None` once the channel is torn down and drained.
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        self.receiver.recv().await
    }

    /// Next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<ProgressEvent> {
        self.receiver.try_recv().ok()
    }

    /// Stop listening. Already queued events can still be drained.
    pub fn close(&mut self) {
        self.receiver.close();
    }
}

impl Stream for ProgressStream {
    type Item = ProgressEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().receiver.poll_recv(cx)
    }
}
