//! Registry of live downloaders, keyed by region id.
//!
//! Each entry is the sending side of a downloader's event queue. The
//! manager's dispatcher routes engine events through [`DownloaderRegistry::dispatch`];
//! a downloader leaves the registry exactly once, when it reaches a terminal
//! state or is released. Removing an entry drops its sender, which ends the
//! downloader's task.
//!
//! Every registration gets a unique [`Ticket`]. A downloader releases itself
//! with its ticket, so it can never remove a successor registered for the
//! same region after it was released.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::engine::PackEvent;
use crate::region::RegionId;

/// Identifies one registration in a [`DownloaderRegistry`].
pub type Ticket = u64;

#[derive(Debug)]
struct Registration {
    ticket: Ticket,
    events: mpsc::UnboundedSender<PackEvent>,
}

/// Concurrent map of region id to downloader event queue.
#[derive(Debug, Default)]
pub struct DownloaderRegistry {
    entries: DashMap<RegionId, Registration>,
    tickets: AtomicU64,
}

impl DownloaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a downloader. Returns `None` if `region` already has one.
    pub fn insert(
        &self,
        region: RegionId,
        events: mpsc::UnboundedSender<PackEvent>,
    ) -> Option<Ticket> {
        match self.entries.entry(region) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                let ticket = self.tickets.fetch_add(1, Ordering::Relaxed);
                slot.insert(Registration { ticket, events });
                Some(ticket)
            }
        }
    }

    /// Deregister whatever downloader `region` has. Returns `false` if none
    /// was registered.
    pub fn release(&self, region: RegionId) -> bool {
        self.entries.remove(&region).is_some()
    }

    /// Deregister the downloader of `region` only if it still holds `ticket`.
    pub fn release_ticket(&self, region: RegionId, ticket: Ticket) -> bool {
        self.entries
            .remove_if(&region, |_, entry| entry.ticket == ticket)
            .is_some()
    }

    /// Queue `event` for the downloader of `region`.
    ///
    /// Returns `false` if no downloader is registered or it has exited.
    pub fn dispatch(&self, region: RegionId, event: PackEvent) -> bool {
        match self.entries.get(&region) {
            Some(entry) => entry.events.send(event).is_ok(),
            None => false,
        }
    }

    pub fn contains(&self, region: RegionId) -> bool {
        self.entries.contains_key(&region)
    }

    /// Registered region ids, ascending.
    pub fn ids(&self) -> Vec<RegionId> {
        let mut ids: Vec<_> = self.entries.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{PackHandle, PackProgress, PackState};
    use std::sync::Arc;

    fn event() -> PackEvent {
        PackEvent::Progress {
            pack: PackHandle {
                id: 1,
                context: br#"{"id":1}"#.to_vec(),
            },
            progress: PackProgress::new(1, 2),
            state: PackState::Active,
        }
    }

    #[test]
    fn test_insert_rejects_duplicate() {
        let registry = DownloaderRegistry::new();
        let (tx1, _rx1) = mpsc::unbounded_channel();
        let (tx2, _rx2) = mpsc::unbounded_channel();

        assert!(registry.insert(1, tx1).is_some());
        assert!(registry.insert(1, tx2).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_stale_ticket_keeps_successor() {
        let registry = DownloaderRegistry::new();
        let (tx1, _rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();

        let first = registry.insert(1, tx1).unwrap();
        assert!(registry.release(1));
        let second = registry.insert(1, tx2).unwrap();
        assert_ne!(first, second);

        assert!(!registry.release_ticket(1, first));
        assert!(registry.contains(1));
        assert!(registry.dispatch(1, event()));
        assert_eq!(rx2.try_recv().unwrap(), event());

        assert!(registry.release_ticket(1, second));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_release_is_idempotent() {
        let registry = DownloaderRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        registry.insert(1, tx);

        assert!(registry.release(1));
        assert!(!registry.release(1));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_dispatch_routes_by_id() {
        let registry = DownloaderRegistry::new();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        registry.insert(1, tx1);
        registry.insert(2, tx2);

        assert!(registry.dispatch(1, event()));
        assert!(!registry.dispatch(3, event()));

        assert_eq!(rx1.try_recv().unwrap(), event());
        assert!(rx2.try_recv().is_err());
    }

    #[test]
    fn test_release_ends_event_queue() {
        let registry = DownloaderRegistry::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.insert(1, tx);
        registry.release(1);

        assert!(matches!(
            rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[test]
    fn test_dispatch_to_exited_downloader() {
        let registry = DownloaderRegistry::new();
        let (tx, rx) = mpsc::unbounded_channel();
        registry.insert(1, tx);
        drop(rx);

        assert!(!registry.dispatch(1, event()));
    }

    #[test]
    fn test_concurrent_insert_release() {
        let registry = Arc::new(DownloaderRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        let id = t * 1000 + i;
                        let (tx, _rx) = mpsc::unbounded_channel();
                        assert!(registry.insert(id, tx).is_some());
                        if i % 2 == 0 {
                            assert!(registry.release(id));
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(registry.len(), 8 * 50);
        assert_eq!(registry.ids().len(), 8 * 50);
        registry.clear();
        assert!(registry.is_empty());
    }
}
