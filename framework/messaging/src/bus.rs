use crate::payload::Fields;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use yardstick_core::prelude::AbortHandle;

/// Routing context sent alongside every message.
///
/// `pid` identifies the publishing process. Receivers get the whole fanout stream for a topic and
/// use it to decide whether a message concerns them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageContext {
    pub pid: u32,
    #[serde(flatten)]
    pub extra: Fields,
}

impl MessageContext {
    pub fn new(pid: u32) -> Self {
        Self {
            pid,
            extra: Fields::new(),
        }
    }
}

/// A message as it travels on a topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub topic: String,
    pub context: MessageContext,
    pub method: String,
    pub payload: Fields,
}

/// A receiver of messages on a topic.
///
/// The listener calls [Endpoint::handle] for every message whose method is listed in
/// [Endpoint::methods]. Errors returned from `handle` are logged and do not stop the listener.
pub trait Endpoint: Send + Sync {
    fn methods(&self) -> &[&'static str];

    fn handle(
        &self,
        method: &str,
        context: &MessageContext,
        payload: Fields,
    ) -> anyhow::Result<()>;
}

/// Topic scoped publish/subscribe with fanout to every current subscriber.
///
/// Delivery is best effort. There is no ordering guarantee across publishers, nor for a single
/// publisher, and a message may be delivered more than once. Receivers must be idempotent.
pub trait NotificationBus: Send + Sync {
    /// Fire and forget. Never blocks and never reports delivery failures to the caller.
    fn publish(&self, topic: &str, context: MessageContext, method: &str, payload: Fields);

    /// Start listening on a topic, dispatching messages to the given endpoints.
    ///
    /// Only messages published after this call returns are guaranteed to be seen by the new
    /// subscription.
    fn subscribe(
        &self,
        topic: &str,
        endpoints: Vec<Arc<dyn Endpoint>>,
    ) -> anyhow::Result<Subscription>;
}

/// Keeps a listener alive. The listener stops when this is closed or dropped.
#[derive(Debug)]
pub struct Subscription {
    topic: String,
    stop: AbortHandle,
}

impl Subscription {
    pub fn new(topic: impl Into<String>, stop: AbortHandle) -> Self {
        Self {
            topic: topic.into(),
            stop,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn close(self) {
        // Drop does the work
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        log::trace!("Closing subscription to {}", self.topic);
        self.stop.abort();
    }
}

pub(crate) fn dispatch(endpoints: &[Arc<dyn Endpoint>], message: &Message) {
    let mut handled = false;
    for endpoint in endpoints {
        if !endpoint.methods().contains(&message.method.as_str()) {
            continue;
        }

        handled = true;
        if let Err(e) = endpoint.handle(&message.method, &message.context, message.payload.clone())
        {
            log::error!(
                "Endpoint failed to handle {} on {} from pid {}: {:?}",
                message.method,
                message.topic,
                message.context.pid,
                e
            );
        }
    }

    if !handled {
        log::trace!(
            "No endpoint for {} on {}, ignoring",
            message.method,
            message.topic
        );
    }
}
