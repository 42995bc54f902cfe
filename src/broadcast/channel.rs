//! Cross-context channel primitive.
//!
//! A channel endpoint posts envelopes to every sibling endpoint and drains
//! whatever arrived since its last drain. Delivery is best effort: the
//! in-memory implementation can be told to drop or duplicate everything so
//! callers can prove they never depend on it.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use thiserror::Error;

/// One message on the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub id: String,
    /// Context that posted the envelope.
    pub origin: String,
    pub topic: String,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("channel closed")]
    Closed,
    #[error("channel lock poisoned")]
    Poisoned,
    #[error("failed to encode notice: {0}")]
    Encode(String),
}

pub trait Channel: Send {
    fn post(&self, envelope: Envelope) -> Result<(), ChannelError>;

    /// Everything posted since the previous drain, in arrival order.
    fn drain(&self) -> Result<Vec<Envelope>, ChannelError>;
}

impl<C: Channel + ?Sized> Channel for Box<C> {
    fn post(&self, envelope: Envelope) -> Result<(), ChannelError> {
        (**self).post(envelope)
    }

    fn drain(&self) -> Result<Vec<Envelope>, ChannelError> {
        (**self).drain()
    }
}

/// How the in-memory channel treats posted envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FaultMode {
    #[default]
    Deliver,
    /// Accept posts and silently lose them.
    DropAll,
    /// Deliver every envelope twice.
    Duplicate,
}

/// Envelopes kept for endpoints that have not drained yet. Older ones are
/// dropped and a lagging endpoint simply misses them.
pub const RETAINED_ENVELOPES: usize = 1024;

/// Log of recent envelopes. Positions are absolute: `base` is the index of
/// the oldest retained envelope.
#[derive(Default)]
struct Hub {
    log: VecDeque<Envelope>,
    base: usize,
    fault: FaultMode,
    closed: bool,
    readers: Vec<Weak<Mutex<usize>>>,
}

impl Hub {
    fn end(&self) -> usize {
        self.base + self.log.len()
    }

    fn push(&mut self, envelope: Envelope) {
        self.log.push_back(envelope);
        if self.log.len() > RETAINED_ENVELOPES {
            self.log.pop_front();
            self.base += 1;
        }
    }

    fn register(&mut self, start: usize) -> Arc<Mutex<usize>> {
        let position = Arc::new(Mutex::new(start));
        self.readers.push(Arc::downgrade(&position));
        position
    }

    /// Drop envelopes every live endpoint has already drained.
    fn trim(&mut self) {
        self.readers.retain(|reader| reader.strong_count() > 0);
        let end = self.end();
        let oldest_unread = self
            .readers
            .iter()
            .filter_map(Weak::upgrade)
            .map(|position| *position.lock().unwrap_or_else(PoisonError::into_inner))
            .min()
            .unwrap_or(end);
        let consumed = oldest_unread.saturating_sub(self.base).min(self.log.len());
        self.log.drain(..consumed);
        self.base += consumed;
    }
}

/// Shared-log channel for contexts living in one process.
///
/// Every endpoint created by [`InMemoryChannel::join`] shares the log and the
/// fault mode but tracks its own read position, starting at the end of the
/// log at the time it joined. Envelopes are released once every endpoint has
/// drained past them.
#[derive(Clone)]
pub struct InMemoryChannel {
    hub: Arc<RwLock<Hub>>,
    position: Arc<Mutex<usize>>,
}

impl Default for InMemoryChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryChannel {
    pub fn new() -> Self {
        let mut hub = Hub::default();
        let position = hub.register(0);
        Self {
            hub: Arc::new(RwLock::new(hub)),
            position,
        }
    }

    /// New endpoint on the same channel.
    pub fn join(&self) -> Self {
        let mut hub = self.hub.write().unwrap_or_else(PoisonError::into_inner);
        let start = hub.end();
        let position = hub.register(start);
        Self {
            hub: Arc::clone(&self.hub),
            position,
        }
    }

    /// Applies to every endpoint of this channel.
    pub fn set_fault_mode(&self, mode: FaultMode) {
        if let Ok(mut hub) = self.hub.write() {
            hub.fault = mode;
        }
    }

    /// Make every endpoint fail from now on.
    pub fn close(&self) {
        if let Ok(mut hub) = self.hub.write() {
            hub.closed = true;
        }
    }

    /// Envelopes currently retained.
    pub fn len(&self) -> usize {
        self.hub.read().map(|hub| hub.log.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Channel for InMemoryChannel {
    fn post(&self, envelope: Envelope) -> Result<(), ChannelError> {
        let mut hub = self.hub.write().map_err(|_| ChannelError::Poisoned)?;
        if hub.closed {
            return Err(ChannelError::Closed);
        }
        match hub.fault {
            FaultMode::Deliver => hub.push(envelope),
            FaultMode::DropAll => {}
            FaultMode::Duplicate => {
                hub.push(envelope.clone());
                hub.push(envelope);
            }
        }
        Ok(())
    }

    fn drain(&self) -> Result<Vec<Envelope>, ChannelError> {
        let mut hub = self.hub.write().map_err(|_| ChannelError::Poisoned)?;
        if hub.closed {
            return Err(ChannelError::Closed);
        }
        let fresh = {
            let mut pos = self.position.lock().map_err(|_| ChannelError::Poisoned)?;
            if *pos < hub.base {
                tracing::debug!(missed = hub.base - *pos, "endpoint lagged, envelopes dropped");
                *pos = hub.base;
            }
            let fresh: Vec<Envelope> = hub.log.range(*pos - hub.base..).cloned().collect();
            *pos = hub.end();
            fresh
        };
        hub.trim();
        Ok(fresh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(id: &str) -> Envelope {
        Envelope {
            id: id.into(),
            origin: "ctx-a".into(),
            topic: "guide_updates".into(),
            payload: vec![1, 2, 3],
        }
    }

    #[test]
    fn endpoints_have_independent_positions() {
        let channel = InMemoryChannel::new();
        let a = channel.join();
        let b = channel.join();

        a.post(envelope("1")).unwrap();
        assert_eq!(a.drain().unwrap().len(), 1);
        assert_eq!(b.drain().unwrap().len(), 1);
        assert!(b.drain().unwrap().is_empty());
    }

    #[test]
    fn late_joiners_start_at_the_end() {
        let channel = InMemoryChannel::new();
        channel.post(envelope("old")).unwrap();

        let late = channel.join();
        assert!(late.drain().unwrap().is_empty());
    }

    #[test]
    fn fault_modes_drop_and_duplicate() {
        let channel = InMemoryChannel::new();
        let reader = channel.join();

        channel.set_fault_mode(FaultMode::DropAll);
        channel.post(envelope("lost")).unwrap();
        assert!(reader.drain().unwrap().is_empty());

        channel.set_fault_mode(FaultMode::Duplicate);
        channel.post(envelope("twice")).unwrap();
        let got = reader.drain().unwrap();
        assert_eq!(got.len(), 2);
        assert_eq!(got[0], got[1]);
    }

    #[test]
    fn drained_envelopes_are_released() {
        let channel = InMemoryChannel::new();
        let a = channel.join();
        let b = channel.join();

        for round in 0..500 {
            a.post(envelope(&round.to_string())).unwrap();
            channel.drain().unwrap();
            a.drain().unwrap();
            assert_eq!(b.drain().unwrap().len(), 1);
            assert!(channel.len() <= 1);
        }
        assert!(channel.is_empty());
    }

    #[test]
    fn dropped_endpoints_do_not_pin_the_log() {
        let channel = InMemoryChannel::new();
        let idle = channel.join();
        channel.post(envelope("1")).unwrap();
        channel.drain().unwrap();
        assert_eq!(channel.len(), 1);

        drop(idle);
        channel.post(envelope("2")).unwrap();
        channel.drain().unwrap();
        assert!(channel.is_empty());
    }

    #[test]
    fn idle_endpoint_cannot_grow_the_log_past_the_cap() {
        let channel = InMemoryChannel::new();
        let idle = channel.join();
        for i in 0..RETAINED_ENVELOPES + 10 {
            channel.post(envelope(&i.to_string())).unwrap();
        }
        assert_eq!(channel.len(), RETAINED_ENVELOPES);

        let got = idle.drain().unwrap();
        assert_eq!(got.len(), RETAINED_ENVELOPES);
        assert_eq!(got[0].id, "10");
    }

    #[test]
    fn closed_channel_errors() {
        let channel = InMemoryChannel::new();
        let other = channel.join();
        channel.close();
        assert_eq!(other.post(envelope("x")), Err(ChannelError::Closed));
        assert_eq!(other.drain(), Err(ChannelError::Closed));
    }
}
