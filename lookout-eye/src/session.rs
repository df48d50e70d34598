//! The one active media item, its generation, and the validity rules for
//! detection results issued against it.

use crate::media::{MediaElement, MediaHandle};
use lookout_core::{Generation, PassTicket};
use std::sync::Arc;
use tracing::{debug, info};

/// Media session state.
///
/// A batch may be applied only when its ticket names the active handle and
/// the current generation, is newer than the last applied batch, and was
/// issued after the most recent discard point (pause, end, replacement).
#[derive(Debug, Default)]
pub struct MediaSession {
    active: Option<MediaHandle>,
    generation: Generation,
    last_issued: u64,
    last_applied: u64,
    discard_through: u64,
}

impl MediaSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> Option<&MediaHandle> {
        self.active.as_ref()
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Install new media. The previous element is released first, its
    /// generation ends, and every ticket issued so far becomes stale.
    pub fn replace_with(&mut self, element: Arc<dyn MediaElement>) -> MediaHandle {
        if let Some(old) = self.active.take() {
            debug!("Releasing {}", old.name());
            old.element().release();
        }
        self.generation = self.generation.next();
        self.discard_through = self.last_issued;
        let handle = MediaHandle::new(element);
        info!(
            "Active media is now {} {} ({})",
            handle.kind(),
            handle.name(),
            self.generation
        );
        self.active = Some(handle.clone());
        handle
    }

    /// Stamp a new detector call against the active media.
    pub fn issue(&mut self) -> Option<(PassTicket, MediaHandle)> {
        let handle = self.active.clone()?;
        self.last_issued += 1;
        let ticket = PassTicket {
            handle: handle.id(),
            generation: self.generation,
            sequence: self.last_issued,
        };
        Some((ticket, handle))
    }

    pub fn accepts(&self, ticket: &PassTicket) -> bool {
        let Some(active) = &self.active else {
            return false;
        };
        active.id() == ticket.handle
            && ticket.generation == self.generation
            && ticket.sequence > self.last_applied
            && ticket.sequence > self.discard_through
    }

    pub fn mark_applied(&mut self, ticket: &PassTicket) {
        self.last_applied = self.last_applied.max(ticket.sequence);
    }

    /// Make every ticket issued so far stale without changing media.
    pub fn discard_in_flight(&mut self) {
        self.discard_through = self.last_issued;
    }

    /// True when no newer call has been issued since `ticket`.
    pub fn is_latest(&self, ticket: &PassTicket) -> bool {
        ticket.sequence == self.last_issued
    }
}
