//! Shared test utilities for tracker tests.

use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use strata_chainhead_rpc::{RawSubscription, RpcTransport, TransportError, RPC_METHODS};
use tokio::{
    sync::{mpsc, oneshot, Notify},
    time::{sleep, timeout},
};

const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Transport that answers from a script and lets tests push follow events.
///
/// Requests without a scripted response get `null`. `rpc_methods` advertises
/// the `chainHead_v1` group unless scripted otherwise.
#[derive(Debug, Default)]
pub(crate) struct ScriptedTransport {
    inner: Mutex<ScriptedInner>,
    requests_changed: Notify,
}

#[derive(Debug, Default)]
struct ScriptedInner {
    requests: Vec<(String, Vec<Value>)>,
    responses: HashMap<String, VecDeque<Result<Value, TransportError>>>,
    /// Pushed into the next subscription as soon as it opens.
    initial_events: Vec<Value>,
    subscriptions: u32,
    events_tx: Option<mpsc::UnboundedSender<Value>>,
    cancel_rx: Option<oneshot::Receiver<()>>,
    /// The next call to the method waits until the sender fires or drops.
    gates: HashMap<String, oneshot::Receiver<()>>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn with_follow_events(&self, events: Vec<Value>) {
        self.inner.lock().initial_events = events;
    }

    pub(crate) fn respond(&self, method: &str, value: Value) {
        self.inner
            .lock()
            .responses
            .entry(method.to_string())
            .or_default()
            .push_back(Ok(value));
    }

    pub(crate) fn fail(&self, method: &str, err: TransportError) {
        self.inner
            .lock()
            .responses
            .entry(method.to_string())
            .or_default()
            .push_back(Err(err));
    }

    /// Holds back the next call to `method` (request or subscribe) after it
    /// is recorded, until the returned sender is used or dropped.
    pub(crate) fn hold(&self, method: &str) -> oneshot::Sender<()> {
        let (release_tx, release_rx) = oneshot::channel();
        self.inner.lock().gates.insert(method.to_string(), release_rx);
        release_tx
    }

    pub(crate) fn push_event(&self, event: Value) {
        let inner = self.inner.lock();
        let events_tx = inner.events_tx.as_ref().expect("no open subscription");
        events_tx.send(event).expect("follow task gone");
    }

    /// Ends the event stream without a `stop` event.
    pub(crate) fn close_stream(&self) {
        self.inner.lock().events_tx = None;
    }

    pub(crate) fn cancelled(&self) -> bool {
        let mut inner = self.inner.lock();
        inner
            .cancel_rx
            .as_mut()
            .is_some_and(|rx| rx.try_recv().is_ok())
    }

    pub(crate) fn requests_to(&self, method: &str) -> Vec<Vec<Value>> {
        self.inner
            .lock()
            .requests
            .iter()
            .filter(|(name, _)| name == method)
            .map(|(_, params)| params.clone())
            .collect()
    }

    /// Waits until `method` has been requested at least `count` times.
    pub(crate) async fn wait_for_requests(&self, method: &str, count: usize) -> Vec<Vec<Value>> {
        let wait = async {
            loop {
                let changed = self.requests_changed.notified();
                let requests = self.requests_to(method);
                if requests.len() >= count {
                    return requests;
                }
                changed.await;
            }
        };
        timeout(WAIT_TIMEOUT, wait)
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for {count} {method} requests"))
    }

    fn record(&self, method: &str, params: Vec<Value>) {
        self.inner.lock().requests.push((method.to_string(), params));
        self.requests_changed.notify_waiters();
    }

    async fn pass_gate(&self, method: &str) {
        let gate = self.inner.lock().gates.remove(method);
        if let Some(gate) = gate {
            let _ = gate.await;
        }
    }
}

#[async_trait]
impl RpcTransport for ScriptedTransport {
    async fn request(&self, method: &str, params: Vec<Value>) -> Result<Value, TransportError> {
        self.record(method, params);
        self.pass_gate(method).await;

        let scripted = self
            .inner
            .lock()
            .responses
            .get_mut(method)
            .and_then(VecDeque::pop_front);
        match scripted {
            Some(response) => response,
            None if method == RPC_METHODS => Ok(json!({
                "methods": [
                    "chainHead_v1_body",
                    "chainHead_v1_call",
                    "chainHead_v1_follow",
                    "chainHead_v1_unfollow",
                ]
            })),
            None => Ok(Value::Null),
        }
    }

    async fn subscribe(
        &self,
        method: &str,
        params: Vec<Value>,
        _unsubscribe_method: &str,
    ) -> Result<RawSubscription, TransportError> {
        self.record(method, params);
        self.pass_gate(method).await;

        let mut inner = self.inner.lock();
        if let Some(Err(err)) = inner
            .responses
            .get_mut(method)
            .and_then(VecDeque::pop_front)
        {
            return Err(err);
        }

        inner.subscriptions += 1;
        let (subscription, feed) = RawSubscription::channel(format!("sub-{}", inner.subscriptions));
        for event in inner.initial_events.drain(..) {
            let _ = feed.events_tx.send(event);
        }
        inner.events_tx = Some(feed.events_tx);
        inner.cancel_rx = Some(feed.cancel_rx);
        Ok(subscription)
    }
}

/// Polls `cond` until it holds.
pub(crate) async fn wait_until(mut cond: impl FnMut() -> bool) {
    let wait = async {
        while !cond() {
            sleep(Duration::from_millis(5)).await;
        }
    };
    timeout(WAIT_TIMEOUT, wait)
        .await
        .expect("timed out waiting for condition");
}

pub(crate) fn runtime(spec_version: u32) -> Value {
    json!({
        "type": "valid",
        "spec": {
            "specName": "test",
            "implName": "test-node",
            "specVersion": spec_version,
            "implVersion": 0,
            "apis": {}
        }
    })
}

pub(crate) fn initialized(hashes: &[&str], runtime: Option<Value>) -> Value {
    json!({
        "event": "initialized",
        "finalizedBlockHashes": hashes,
        "finalizedBlockRuntime": runtime,
    })
}

pub(crate) fn new_block(hash: &str, parent: &str, runtime: Option<Value>) -> Value {
    json!({
        "event": "newBlock",
        "blockHash": hash,
        "parentBlockHash": parent,
        "newRuntime": runtime,
    })
}

pub(crate) fn best_block(hash: &str) -> Value {
    json!({ "event": "bestBlockChanged", "bestBlockHash": hash })
}

pub(crate) fn finalized(hashes: &[&str], pruned: &[&str]) -> Value {
    json!({
        "event": "finalized",
        "finalizedBlockHashes": hashes,
        "prunedBlockHashes": pruned,
    })
}

pub(crate) fn operation_event(event: &str, operation_id: &str, extra: Value) -> Value {
    let mut value = json!({ "event": event, "operationId": operation_id });
    if let (Some(obj), Value::Object(extra)) = (value.as_object_mut(), extra) {
        obj.extend(extra);
    }
    value
}

pub(crate) fn started(operation_id: &str) -> Value {
    json!({ "result": "started", "operationId": operation_id })
}
