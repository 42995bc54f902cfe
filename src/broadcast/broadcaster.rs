use event_emitter_rs::EventEmitter;

use super::channel::{Channel, ChannelError, Envelope};
use super::notice::GuideNotice;

/// Publishes notices to sibling contexts and fans received ones out to
/// local handlers.
///
/// Handlers run on the emitter's own threads, after [`Broadcaster::receive`]
/// returns. Without a channel every publish is a no-op and `receive` is
/// always empty.
pub struct Broadcaster {
    channel: Option<Box<dyn Channel>>,
    emitter: EventEmitter,
    origin: String,
}

impl Broadcaster {
    pub fn new(origin: impl Into<String>, channel: impl Channel + 'static) -> Self {
        Self {
            channel: Some(Box::new(channel)),
            emitter: EventEmitter::new(),
            origin: origin.into(),
        }
    }

    /// Broadcaster for a context with no channel primitive.
    pub fn unavailable(origin: impl Into<String>) -> Self {
        Self {
            channel: None,
            emitter: EventEmitter::new(),
            origin: origin.into(),
        }
    }

    pub fn is_available(&self) -> bool {
        self.channel.is_some()
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Returns whether the notice was handed to the channel. Never fails.
    pub fn publish(&mut self, topic: &str, notice: &GuideNotice) -> bool {
        match self.try_publish(topic, notice) {
            Ok(posted) => posted,
            Err(e) => {
                tracing::warn!(topic, origin = %self.origin, "notice not broadcast: {e}");
                if e == ChannelError::Closed {
                    self.degrade();
                }
                false
            }
        }
    }

    fn try_publish(&self, topic: &str, notice: &GuideNotice) -> Result<bool, ChannelError> {
        let Some(channel) = &self.channel else {
            return Ok(false);
        };
        let payload = notice
            .encode()
            .map_err(|e| ChannelError::Encode(e.to_string()))?;
        channel.post(Envelope {
            id: uuid::Uuid::new_v4().to_string(),
            origin: self.origin.clone(),
            topic: topic.to_string(),
            payload,
        })?;
        tracing::debug!(topic, kind = ?notice.kind, guide_id = ?notice.guide_id, "notice published");
        Ok(true)
    }

    /// Register a handler for notices received on `topic`. Returns the
    /// listener id for [`Broadcaster::unsubscribe`].
    pub fn subscribe<F>(&mut self, topic: &str, handler: F) -> String
    where
        F: Fn(GuideNotice) + Send + Sync + 'static,
    {
        self.emitter.on(topic, move |json: String| {
            match serde_json::from_str::<GuideNotice>(&json) {
                Ok(notice) => handler(notice),
                Err(e) => tracing::warn!("dropping undecodable local notice: {e}"),
            }
        })
    }

    pub fn unsubscribe(&mut self, listener_id: &str) -> bool {
        self.emitter.remove_listener(listener_id).is_some()
    }

    /// Drain the channel, skipping this context's own notices, and hand each
    /// notice to the subscribed handlers.
    pub fn receive(&mut self) -> Vec<GuideNotice> {
        let drained = match &self.channel {
            Some(channel) => channel.drain(),
            None => return Vec::new(),
        };
        let envelopes = match drained {
            Ok(envelopes) => envelopes,
            Err(e) => {
                tracing::warn!(origin = %self.origin, "channel drain failed: {e}");
                if e == ChannelError::Closed {
                    self.degrade();
                }
                return Vec::new();
            }
        };

        let mut notices = Vec::new();
        for envelope in envelopes {
            if envelope.origin == self.origin {
                continue;
            }
            match GuideNotice::decode(&envelope.payload) {
                Ok(notice) => {
                    self.emitter.emit(&envelope.topic, notice.to_json());
                    notices.push(notice);
                }
                Err(e) => {
                    tracing::warn!(id = %envelope.id, topic = %envelope.topic, "malformed notice: {e}");
                }
            }
        }
        notices
    }

    fn degrade(&mut self) {
        if self.channel.take().is_some() {
            tracing::warn!(origin = %self.origin, "channel unavailable, falling back to polling");
        }
    }
}
