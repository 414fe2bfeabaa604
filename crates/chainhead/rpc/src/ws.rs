use async_trait::async_trait;
use jsonrpsee::{
    core::{
        client::{ClientT, Subscription, SubscriptionClientT, SubscriptionKind},
        params::ArrayParams,
    },
    ws_client::{WsClient, WsClientBuilder},
};
use serde_json::Value;
use tracing::{debug, warn};

use crate::{RawSubscription, RpcTransport, SubscriptionFeed, TransportError};

/// [`RpcTransport`] over a jsonrpsee WebSocket client.
#[derive(Debug)]
pub struct WsTransport {
    client: WsClient,
}

impl WsTransport {
    /// Connects to the node at `url` (`ws://` or `wss://`).
    pub async fn connect(url: &str) -> Result<Self, TransportError> {
        let client = WsClientBuilder::default()
            .build(url)
            .await
            .map_err(|e| TransportError::rpc(e.to_string()))?;
        debug!(%url, "connected to node");
        Ok(Self { client })
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_connected()
    }
}

#[async_trait]
impl RpcTransport for WsTransport {
    async fn request(&self, method: &str, params: Vec<Value>) -> Result<Value, TransportError> {
        if !self.client.is_connected() {
            return Err(TransportError::Closed);
        }
        self.client
            .request::<Value, _>(method, array_params(params)?)
            .await
            .map_err(|e| TransportError::rpc(format!("{method}: {e}")))
    }

    async fn subscribe(
        &self,
        method: &str,
        params: Vec<Value>,
        unsubscribe_method: &str,
    ) -> Result<RawSubscription, TransportError> {
        if !self.client.is_connected() {
            return Err(TransportError::Closed);
        }
        let sub: Subscription<Value> = self
            .client
            .subscribe(method, array_params(params)?, unsubscribe_method)
            .await
            .map_err(|e| TransportError::rpc(format!("{method}: {e}")))?;

        let id = subscription_id(sub.kind())?;
        let (raw, feed) = RawSubscription::channel(id);
        tokio::spawn(forward_notifications(sub, feed));

        Ok(raw)
    }
}

fn array_params(params: Vec<Value>) -> Result<ArrayParams, TransportError> {
    let mut out = ArrayParams::new();
    for param in params {
        out.insert(param)
            .map_err(|e| TransportError::decode(e.to_string()))?;
    }
    Ok(out)
}

fn subscription_id(kind: &SubscriptionKind) -> Result<String, TransportError> {
    match kind {
        SubscriptionKind::Subscription(id) => {
            match serde_json::to_value(id).map_err(|e| TransportError::decode(e.to_string()))? {
                Value::String(id) => Ok(id),
                other => Ok(other.to_string()),
            }
        }
        SubscriptionKind::Method(method) => Ok(method.clone()),
        _ => Err(TransportError::decode("unrecognised subscription kind")),
    }
}

/// Drains the jsonrpsee subscription into the channel read by the consumer.
///
/// Unsubscribes once the consumer cancels or goes away.
async fn forward_notifications(mut sub: Subscription<Value>, feed: SubscriptionFeed) {
    let SubscriptionFeed {
        events_tx,
        mut cancel_rx,
    } = feed;

    loop {
        tokio::select! {
            _ = &mut cancel_rx => break,
            item = sub.next() => match item {
                Some(Ok(value)) => {
                    if events_tx.send(value).is_err() {
                        break;
                    }
                }
                Some(Err(err)) => {
                    warn!(%err, "dropping undecodable notification");
                }
                None => {
                    debug!("subscription closed by node");
                    return;
                }
            }
        }
    }

    if let Err(err) = sub.unsubscribe().await {
        warn!(%err, "failed to unsubscribe");
    }
}
