use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::TransportError;

/// Raw JSON-RPC transport to a node.
///
/// Implementations only move frames around; method naming and response
/// interpretation live above this trait.
#[cfg_attr(any(test, feature = "test-utils"), mockall::automock)]
#[async_trait]
pub trait RpcTransport: Send + Sync + 'static {
    /// Issues a request and returns the raw `result` member of the response.
    async fn request(&self, method: &str, params: Vec<Value>) -> Result<Value, TransportError>;

    /// Opens a server-push subscription.
    ///
    /// `unsubscribe_method` is issued by the transport once the returned
    /// subscription is cancelled or dropped.
    async fn subscribe(
        &self,
        method: &str,
        params: Vec<Value>,
        unsubscribe_method: &str,
    ) -> Result<RawSubscription, TransportError>;
}

/// Consumer half of an open subscription.
#[derive(Debug)]
pub struct RawSubscription {
    id: String,
    events: mpsc::UnboundedReceiver<Value>,
    cancel: SubscriptionCancel,
}

impl RawSubscription {
    /// Creates a subscription and the producer half a transport feeds it from.
    pub fn channel(id: impl Into<String>) -> (Self, SubscriptionFeed) {
        let (events_tx, events) = mpsc::unbounded_channel();
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let sub = Self {
            id: id.into(),
            events,
            cancel: SubscriptionCancel(cancel_tx),
        };
        let feed = SubscriptionFeed {
            events_tx,
            cancel_rx,
        };
        (sub, feed)
    }

    /// Server-assigned subscription id.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn into_parts(self) -> (String, mpsc::UnboundedReceiver<Value>, SubscriptionCancel) {
        (self.id, self.events, self.cancel)
    }
}

/// Tells the transport to tear a subscription down.
#[derive(Debug)]
pub struct SubscriptionCancel(oneshot::Sender<()>);

impl SubscriptionCancel {
    pub fn cancel(self) {
        // Receiver is gone if the transport already closed the subscription.
        let _ = self.0.send(());
    }
}

/// Producer half of a [`RawSubscription`], held by the transport.
#[derive(Debug)]
pub struct SubscriptionFeed {
    pub events_tx: mpsc::UnboundedSender<Value>,
    pub cancel_rx: oneshot::Receiver<()>,
}
