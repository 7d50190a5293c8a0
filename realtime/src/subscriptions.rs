//! Subscription Registry: the channels the application wants to observe.
//!
//! The desired set is changed only by the application and survives
//! disconnects. While a connection is live the registry holds that
//! connection's outbound queue, so a change and the frame announcing it are
//! made under one lock; on every new connection the whole set is replayed.

use events::ClientMessage;
use log::*;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use tokio::sync::mpsc::UnboundedSender;

#[derive(Default)]
struct Inner {
    desired: BTreeSet<String>,
    /// Channels the hub confirmed on the current connection.
    acknowledged: BTreeSet<String>,
    /// Outbound queue of the live connection, if there is one.
    live: Option<UnboundedSender<ClientMessage>>,
}

#[derive(Default)]
pub struct SubscriptionRegistry {
    inner: Mutex<Inner>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `channel` to the desired set. Sends a subscribe frame only when the
    /// channel is new and a connection is live. Returns whether the set changed.
    pub fn subscribe(&self, channel: impl Into<String>) -> bool {
        let channel = channel.into();
        let mut inner = self.inner.lock();
        if !inner.desired.insert(channel.clone()) {
            trace!("Already subscribed to {}", channel);
            return false;
        }
        debug!("Subscribing to {}", channel);
        Self::announce(&inner, ClientMessage::subscribe(channel));
        true
    }

    /// Remove `channel` from the desired set. Sends an unsubscribe frame only
    /// when the channel was present and a connection is live.
    pub fn unsubscribe(&self, channel: &str) -> bool {
        let mut inner = self.inner.lock();
        if !inner.desired.remove(channel) {
            trace!("Not subscribed to {}", channel);
            return false;
        }
        debug!("Unsubscribing from {}", channel);
        Self::announce(&inner, ClientMessage::unsubscribe(channel));
        true
    }

    fn announce(inner: &Inner, message: ClientMessage) {
        if let Some(live) = &inner.live {
            if live.send(message).is_err() {
                // Connection is going away; the next replay covers this change.
                debug!("Outbound queue closed, deferring frame to replay");
            }
        }
    }

    pub fn contains(&self, channel: &str) -> bool {
        self.inner.lock().desired.contains(channel)
    }

    /// Desired channels, sorted.
    pub fn channels(&self) -> Vec<String> {
        self.inner.lock().desired.iter().cloned().collect()
    }

    /// Channels the hub has confirmed on the current connection, sorted.
    pub fn acknowledged(&self) -> Vec<String> {
        self.inner.lock().acknowledged.iter().cloned().collect()
    }

    /// Forget every desired channel without sending anything. Used on
    /// teardown.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.desired.clear();
        inner.acknowledged.clear();
    }

    /// Attach a new connection's outbound queue and return the channels to
    /// replay on it. Changes made after this call go through the queue.
    pub(crate) fn go_live(&self, outbound: UnboundedSender<ClientMessage>) -> Vec<String> {
        let mut inner = self.inner.lock();
        inner.live = Some(outbound);
        inner.acknowledged.clear();
        inner.desired.iter().cloned().collect()
    }

    /// Detach the current connection. Queued frames for it are dropped with
    /// the queue.
    pub(crate) fn go_offline(&self) {
        let mut inner = self.inner.lock();
        inner.live = None;
        inner.acknowledged.clear();
    }

    pub(crate) fn acknowledge(&self, channel: String) {
        let mut inner = self.inner.lock();
        if !inner.desired.contains(&channel) {
            debug!("Hub confirmed {} which is no longer desired", channel);
        }
        inner.acknowledged.insert(channel);
    }

    pub(crate) fn release(&self, channel: &str) {
        self.inner.lock().acknowledged.remove(channel);
    }
}
