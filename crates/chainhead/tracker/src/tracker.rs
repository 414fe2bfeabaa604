use std::{
    mem,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use parking_lot::Mutex;
use serde_json::{json, Value};
use strata_chainhead_rpc::{RpcTransport, VersionedMethodGroup};
use strata_chainhead_types::{
    BlockHash, FollowEvent, HexString, MethodResponse, OperationId, RuntimeSpec, StorageQuery,
};
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, info, warn};

use crate::{
    correlator::Registered,
    errors::{ChainHeadError, Result},
    notification::ChainHeadNotification,
    operation::{OperationAccumulator, OperationFailure, OperationOutcome, OperationOutput},
    session::{Effect, Session, SessionEnd, SessionSlot},
    task::follow_task,
};

/// Method group the tracker talks to unless told otherwise.
pub const DEFAULT_METHOD_GROUP: &str = "chainHead";

/// Notifications buffered per subscriber before it starts lagging.
pub const DEFAULT_NOTIFICATION_CAPACITY: usize = 1024;

/// Effects produced by applying one follow event.
#[derive(Debug)]
pub(crate) struct Dispatched {
    pub(crate) subscription_id: String,
    pub(crate) effects: Vec<Effect>,
    /// The event ended the session.
    pub(crate) ended: bool,
}

/// State shared between tracker handles and the follow task.
#[derive(Debug)]
pub(crate) struct Shared<T> {
    methods: VersionedMethodGroup<T>,
    slot: Mutex<SessionSlot>,
    /// Generation of the last session to end and how it ended. Only written
    /// with the slot lock held.
    last_end: Mutex<Option<(u64, SessionEnd)>>,
    next_generation: AtomicU64,
    notifications_tx: broadcast::Sender<ChainHeadNotification>,
}

impl<T: RpcTransport> Shared<T> {
    /// Removes the active session, if it is the one of `generation` (or any
    /// session when `None`), and records `reason` for it.
    fn take_session(&self, generation: Option<u64>, reason: SessionEnd) -> Option<Session> {
        let mut slot = self.slot.lock();
        let owned = matches!(
            &*slot,
            SessionSlot::Active(session) if generation.map_or(true, |g| g == session.generation)
        );
        if !owned {
            return None;
        }
        match mem::replace(&mut *slot, SessionSlot::Unfollowed) {
            SessionSlot::Active(session) => {
                *self.last_end.lock() = Some((session.generation, reason));
                Some(session)
            }
            other => {
                *slot = other;
                None
            }
        }
    }

    /// Error for an operation whose session of `generation` is gone.
    fn ended_error(&self, generation: u64) -> ChainHeadError {
        match *self.last_end.lock() {
            Some((ended, SessionEnd::Stopped)) if ended == generation => {
                ChainHeadError::SubscriptionStopped
            }
            _ => ChainHeadError::SessionEnded,
        }
    }

    /// Ends the session of `generation`. Returns false if it was already gone.
    pub(crate) fn end_session(&self, generation: u64, reason: SessionEnd) -> bool {
        let Some(session) = self.take_session(Some(generation), reason) else {
            return false;
        };
        let subscription_id = session.subscription_id.clone();
        let failed = session.end(reason);
        info!(%subscription_id, ?reason, failed_operations = failed.len(), "follow session ended");
        true
    }

    /// Applies a follow event to the session of `generation`.
    ///
    /// Returns `None` if that session is no longer active.
    pub(crate) fn dispatch(&self, generation: u64, event: FollowEvent) -> Option<Dispatched> {
        if event == FollowEvent::Stop {
            let subscription_id = {
                let mut slot = self.slot.lock();
                slot.active_mut(generation)?.subscription_id.clone()
            };
            warn!(%subscription_id, "node stopped the follow subscription");
            self.end_session(generation, SessionEnd::Stopped);
            return Some(Dispatched {
                subscription_id,
                effects: Vec::new(),
                ended: true,
            });
        }

        let mut slot = self.slot.lock();
        let session = slot.active_mut(generation)?;
        let effects = session.apply(event);
        Some(Dispatched {
            subscription_id: session.subscription_id.clone(),
            effects,
            ended: false,
        })
    }

    pub(crate) async fn run_effects(&self, subscription_id: &str, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Notify(notification) => {
                    // Nobody listening is fine.
                    let _ = self.notifications_tx.send(notification);
                }
                Effect::Unpin(hashes) => {
                    self.fire("unpin", vec![json!(subscription_id), json!(hashes)])
                        .await;
                }
                Effect::StopOperation(operation_id) => {
                    self.fire(
                        "stopOperation",
                        vec![json!(subscription_id), json!(operation_id)],
                    )
                    .await;
                }
                Effect::Continue(operation_id) => {
                    self.fire("continue", vec![json!(subscription_id), json!(operation_id)])
                        .await;
                }
            }
        }
    }

    /// Sends a request whose result nobody waits for.
    async fn fire(&self, method: &str, params: Vec<Value>) {
        if let Err(err) = self.methods.send::<Value>(method, params).await {
            warn!(%method, %err, "follow side request failed");
        }
    }

    fn register(
        &self,
        generation: u64,
        operation_id: OperationId,
    ) -> Result<Registered<OperationOutput, OperationFailure>> {
        let mut slot = self.slot.lock();
        let Some(session) = slot.active_mut(generation) else {
            return Err(self.ended_error(generation));
        };
        Ok(session
            .operations
            .register(operation_id, OperationAccumulator::default())?)
    }
}

/// Puts the slot back to `Unfollowed` if `follow` is abandoned before its
/// session is installed.
#[derive(Debug)]
struct SubscribingGuard<'a> {
    slot: &'a Mutex<SessionSlot>,
    armed: bool,
}

impl<'a> SubscribingGuard<'a> {
    fn new(slot: &'a Mutex<SessionSlot>) -> Self {
        Self { slot, armed: true }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for SubscribingGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut slot = self.slot.lock();
        if matches!(*slot, SessionSlot::Subscribing) {
            *slot = SessionSlot::Unfollowed;
        }
    }
}

/// Where an operation runs.
#[derive(Debug, Clone)]
struct Target {
    generation: u64,
    subscription_id: String,
    hash: BlockHash,
}

/// Client-side view of a node's chain head through the `chainHead` methods.
///
/// Cheap to clone; clones share the same follow session.
#[derive(Debug)]
pub struct ChainHeadTracker<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for ChainHeadTracker<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T: RpcTransport> ChainHeadTracker<T> {
    pub fn new(transport: Arc<T>) -> Self {
        ChainHeadTrackerBuilder::new(transport).build()
    }

    pub fn builder(transport: Arc<T>) -> ChainHeadTrackerBuilder<T> {
        ChainHeadTrackerBuilder::new(transport)
    }

    pub fn methods(&self) -> &VersionedMethodGroup<T> {
        &self.shared.methods
    }

    /// Opens the follow subscription and waits for the node to report the
    /// finalized blocks it pinned for us.
    pub async fn follow(&self, with_runtime: bool) -> Result<()> {
        {
            let mut slot = self.shared.slot.lock();
            if !matches!(*slot, SessionSlot::Unfollowed) {
                return Err(ChainHeadError::AlreadyFollowing);
            }
            *slot = SessionSlot::Subscribing;
        }
        let guard = SubscribingGuard::new(&self.shared.slot);

        let subscription = match self
            .shared
            .methods
            .subscribe("follow", "unfollow", vec![json!(with_runtime)])
            .await
        {
            Ok(subscription) => subscription,
            Err(err) => {
                warn!(%err, "failed to open follow subscription");
                return Err(err.into());
            }
        };

        let (subscription_id, events_rx, cancel) = subscription.into_parts();
        let generation = self.shared.next_generation.fetch_add(1, Ordering::Relaxed);
        let (initialized_tx, initialized_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = oneshot::channel();

        *self.shared.slot.lock() = SessionSlot::Active(Session::new(
            generation,
            subscription_id.clone(),
            with_runtime,
            cancel,
            initialized_tx,
            stop_tx,
        ));
        guard.disarm();
        info!(%subscription_id, with_runtime, "opened follow subscription");

        tokio::spawn(follow_task(
            Arc::downgrade(&self.shared),
            generation,
            events_rx,
            stop_rx,
        ));

        match initialized_rx.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => {
                self.shared.end_session(generation, SessionEnd::Unfollowed);
                Err(err)
            }
            Err(_) => Err(ChainHeadError::SubscriptionStopped),
        }
    }

    /// Closes the follow subscription and fails every outstanding operation
    /// with [`ChainHeadError::SessionEnded`].
    pub fn unfollow(&self) -> Result<()> {
        let session = self
            .shared
            .take_session(None, SessionEnd::Unfollowed)
            .ok_or(ChainHeadError::NotFollowing)?;

        let subscription_id = session.subscription_id.clone();
        let failed = session.end(SessionEnd::Unfollowed);
        info!(%subscription_id, failed_operations = failed.len(), "unfollowed chain");
        Ok(())
    }

    pub fn is_following(&self) -> bool {
        matches!(*self.shared.slot.lock(), SessionSlot::Active(_))
    }

    pub fn subscription_id(&self) -> Option<String> {
        let slot = self.shared.slot.lock();
        slot.active().ok().map(|s| s.subscription_id.clone())
    }

    /// Receives chain updates of every session from now on.
    pub fn subscribe_notifications(&self) -> broadcast::Receiver<ChainHeadNotification> {
        self.shared.notifications_tx.subscribe()
    }

    pub fn best_hash(&self) -> Result<BlockHash> {
        let slot = self.shared.slot.lock();
        Ok(slot.active()?.chain()?.best().clone())
    }

    pub fn finalized_hash(&self) -> Result<BlockHash> {
        let slot = self.shared.slot.lock();
        Ok(slot.active()?.chain()?.finalized().clone())
    }

    /// Runtime of the finalized head. Always `None` when following without
    /// runtime updates.
    pub fn runtime_version(&self) -> Result<Option<Arc<RuntimeSpec>>> {
        let slot = self.shared.slot.lock();
        Ok(slot.active()?.chain()?.finalized_runtime())
    }

    /// Runtime in effect at the best block.
    pub fn best_runtime_version(&self) -> Result<Option<Arc<RuntimeSpec>>> {
        let slot = self.shared.slot.lock();
        Ok(slot.active()?.chain()?.best_runtime())
    }

    pub fn pinned_hashes(&self) -> Result<Vec<BlockHash>> {
        let slot = self.shared.slot.lock();
        Ok(slot.active()?.chain()?.pinned_hashes())
    }

    pub fn is_pinned(&self, hash: &BlockHash) -> Result<bool> {
        let slot = self.shared.slot.lock();
        Ok(slot.active()?.chain()?.is_pinned(hash))
    }

    /// Fetches the body of `at`, or of the best block.
    ///
    /// Resolves with the payload of whichever terminal event the node sent;
    /// use [`OperationOutput::into_body`] to insist on extrinsics.
    pub async fn body(&self, at: Option<BlockHash>) -> Result<OperationOutput> {
        let target = self.target(at)?;
        let params = vec![json!(target.subscription_id), json!(target.hash)];
        self.run_operation(&target, "body", params).await
    }

    /// Calls `function` of the runtime at `at`, or at the best block.
    pub async fn call(
        &self,
        function: &str,
        call_parameters: HexString,
        at: Option<BlockHash>,
    ) -> Result<OperationOutput> {
        let target = self.target(at)?;
        let params = vec![
            json!(target.subscription_id),
            json!(target.hash),
            json!(function),
            json!(call_parameters),
        ];
        self.run_operation(&target, "call", params).await
    }

    /// Queries storage of `at`, or of the best block. A storage output
    /// carries every item the node reported.
    pub async fn storage(
        &self,
        items: Vec<StorageQuery>,
        child_trie: Option<HexString>,
        at: Option<BlockHash>,
    ) -> Result<OperationOutput> {
        let target = self.target(at)?;
        let params = vec![
            json!(target.subscription_id),
            json!(target.hash),
            json!(items),
            json!(child_trie),
        ];
        self.run_operation(&target, "storage", params).await
    }

    /// Fetches the encoded header of `at`, or of the best block.
    pub async fn header(&self, at: Option<BlockHash>) -> Result<Option<HexString>> {
        let target = self.target(at)?;
        let params = vec![json!(target.subscription_id), json!(target.hash)];
        Ok(self.shared.methods.send("header", params).await?)
    }

    /// Asks the node to release `hashes`. The local model is left as is.
    pub async fn unpin(&self, hashes: Vec<BlockHash>) -> Result<()> {
        let subscription_id = self.active_subscription()?;
        let params = vec![json!(subscription_id), json!(hashes)];
        self.shared.methods.send::<Value>("unpin", params).await?;
        Ok(())
    }

    pub async fn stop_operation(&self, operation_id: &OperationId) -> Result<()> {
        let subscription_id = self.active_subscription()?;
        let params = vec![json!(subscription_id), json!(operation_id)];
        self.shared
            .methods
            .send::<Value>("stopOperation", params)
            .await?;
        Ok(())
    }

    pub async fn continue_operation(&self, operation_id: &OperationId) -> Result<()> {
        let subscription_id = self.active_subscription()?;
        let params = vec![json!(subscription_id), json!(operation_id)];
        self.shared.methods.send::<Value>("continue", params).await?;
        Ok(())
    }

    fn active_subscription(&self) -> Result<String> {
        let slot = self.shared.slot.lock();
        Ok(slot.active()?.subscription_id.clone())
    }

    fn target(&self, at: Option<BlockHash>) -> Result<Target> {
        let slot = self.shared.slot.lock();
        let session = slot.active()?;
        let chain = session.chain()?;

        let hash = match at {
            Some(hash) if chain.is_pinned(&hash) => hash,
            Some(hash) => return Err(ChainHeadError::BlockNotPinned(hash)),
            None => chain.best().clone(),
        };

        Ok(Target {
            generation: session.generation,
            subscription_id: session.subscription_id.clone(),
            hash,
        })
    }

    /// Starts an operation and waits for its result, resubmitting the same
    /// request for as long as the node reports it inaccessible.
    async fn run_operation(
        &self,
        target: &Target,
        method: &str,
        params: Vec<Value>,
    ) -> Result<OperationOutput> {
        loop {
            let response: MethodResponse = self.shared.methods.send(method, params.clone()).await?;
            match self.register_and_await(target, response).await? {
                Ok(output) => return Ok(output),
                Err(OperationFailure::Inaccessible) => {
                    debug!(%method, hash = %target.hash, "operation inaccessible, resubmitting");
                }
                Err(failure) => return Err(failure.into()),
            }
        }
    }

    /// Claims the operation acknowledged by `response` and waits for its
    /// terminal event.
    async fn register_and_await(
        &self,
        target: &Target,
        response: MethodResponse,
    ) -> Result<OperationOutcome> {
        let operation_id = match response {
            MethodResponse::Started {
                operation_id,
                discarded_items,
            } => {
                if let Some(discarded) = discarded_items.filter(|n| *n > 0) {
                    warn!(%operation_id, discarded, "node discarded part of the storage query");
                }
                operation_id
            }
            MethodResponse::LimitReached => return Err(ChainHeadError::OperationLimitReached),
        };

        let registered = self.shared.register(target.generation, operation_id.clone())?;
        if registered.finished {
            // Finished from buffered events; the follow task saw no waiter to
            // release it for.
            self.shared
                .fire(
                    "stopOperation",
                    vec![json!(target.subscription_id), json!(operation_id)],
                )
                .await;
        }

        registered
            .completion
            .await
            .map_err(|_| ChainHeadError::SubscriptionStopped)
    }
}

/// Builds a [`ChainHeadTracker`].
#[derive(Debug)]
pub struct ChainHeadTrackerBuilder<T> {
    transport: Arc<T>,
    method_group: String,
    supported_versions: Option<Vec<String>>,
    fixed_version: Option<String>,
    notification_capacity: usize,
}

impl<T: RpcTransport> ChainHeadTrackerBuilder<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            transport,
            method_group: DEFAULT_METHOD_GROUP.to_string(),
            supported_versions: None,
            fixed_version: None,
            notification_capacity: DEFAULT_NOTIFICATION_CAPACITY,
        }
    }

    pub fn with_method_group(mut self, prefix: impl Into<String>) -> Self {
        self.method_group = prefix.into();
        self
    }

    pub fn with_supported_versions(mut self, versions: Vec<String>) -> Self {
        self.supported_versions = Some(versions);
        self
    }

    pub fn with_fixed_version(mut self, version: impl Into<String>) -> Self {
        self.fixed_version = Some(version.into());
        self
    }

    pub fn with_notification_capacity(mut self, capacity: usize) -> Self {
        self.notification_capacity = capacity;
        self
    }

    pub fn build(self) -> ChainHeadTracker<T> {
        let mut methods = VersionedMethodGroup::new(self.transport, self.method_group);
        if let Some(versions) = self.supported_versions {
            methods = methods.with_supported_versions(versions);
        }
        if let Some(version) = self.fixed_version {
            methods = methods.with_fixed_version(version);
        }

        let (notifications_tx, _) = broadcast::channel(self.notification_capacity.max(1));
        let shared = Shared {
            methods,
            slot: Mutex::new(SessionSlot::Unfollowed),
            last_end: Mutex::new(None),
            next_generation: AtomicU64::new(0),
            notifications_tx,
        };

        ChainHeadTracker {
            shared: Arc::new(shared),
        }
    }
}
