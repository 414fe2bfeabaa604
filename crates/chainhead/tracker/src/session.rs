//! State of one follow subscription and how each follow event mutates it.

use strata_chainhead_rpc::SubscriptionCancel;
use strata_chainhead_types::{
    BestBlockChanged, BlockHash, Finalized, FollowEvent, Initialized, NewBlock, OperationEvent,
    OperationId, RuntimeEvent, RuntimeSpec,
};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::{
    chain::PinnedChain,
    correlator::Delivery,
    errors::{ChainHeadError, Result},
    notification::ChainHeadNotification,
    operation::{OperationFailure, Operations},
};

/// Follow state guarded by the tracker lock.
#[derive(Debug)]
pub(crate) enum SessionSlot {
    Unfollowed,
    /// `follow` is waiting for the node to open the subscription.
    Subscribing,
    Active(Session),
}

impl SessionSlot {
    pub(crate) fn active(&self) -> Result<&Session> {
        match self {
            SessionSlot::Active(session) => Ok(session),
            SessionSlot::Unfollowed | SessionSlot::Subscribing => Err(ChainHeadError::NotFollowing),
        }
    }

    /// Like [`Self::active`], but only for the session of `generation`.
    pub(crate) fn active_mut(&mut self, generation: u64) -> Option<&mut Session> {
        match self {
            SessionSlot::Active(session) if session.generation == generation => Some(session),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SessionEnd {
    /// We unfollowed.
    Unfollowed,
    /// The node sent `stop` or the event stream closed.
    Stopped,
}

/// Work the follow task does after releasing the lock, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Effect {
    Notify(ChainHeadNotification),
    Unpin(Vec<BlockHash>),
    StopOperation(OperationId),
    Continue(OperationId),
}

#[derive(Debug)]
pub(crate) struct Session {
    pub(crate) generation: u64,
    pub(crate) subscription_id: String,
    with_runtime: bool,
    /// Set once `initialized` has been applied.
    chain: Option<PinnedChain>,
    pub(crate) operations: Operations,
    initialized_tx: Option<oneshot::Sender<Result<()>>>,
    cancel: Option<SubscriptionCancel>,
    stop_tx: Option<oneshot::Sender<()>>,
}

impl Session {
    pub(crate) fn new(
        generation: u64,
        subscription_id: String,
        with_runtime: bool,
        cancel: SubscriptionCancel,
        initialized_tx: oneshot::Sender<Result<()>>,
        stop_tx: oneshot::Sender<()>,
    ) -> Self {
        Self {
            generation,
            subscription_id,
            with_runtime,
            chain: None,
            operations: Operations::new(),
            initialized_tx: Some(initialized_tx),
            cancel: Some(cancel),
            stop_tx: Some(stop_tx),
        }
    }

    pub(crate) fn chain(&self) -> Result<&PinnedChain> {
        self.chain.as_ref().ok_or(ChainHeadError::NotFollowing)
    }

    /// Applies a follow event other than `stop`.
    pub(crate) fn apply(&mut self, event: FollowEvent) -> Vec<Effect> {
        let event = match event.into_operation() {
            Ok((operation_id, event)) => return self.apply_operation(operation_id, event),
            Err(event) => event,
        };

        match event {
            FollowEvent::Initialized(init) => {
                self.initialize(init);
                Vec::new()
            }
            FollowEvent::NewBlock(block) => self.new_block(block),
            FollowEvent::BestBlockChanged(best) => self.best_block_changed(best),
            FollowEvent::Finalized(finalized) => self.finalized(finalized),
            other => {
                warn!(
                    subscription_id = %self.subscription_id,
                    event = ?other,
                    "unhandled follow event"
                );
                Vec::new()
            }
        }
    }

    fn initialize(&mut self, init: Initialized) {
        if self.chain.is_some() {
            warn!(subscription_id = %self.subscription_id, "ignoring repeated initialized event");
            return;
        }

        let hashes = init.finalized_hashes();
        let runtime = self.runtime_spec(init.finalized_block_runtime);
        let result = PinnedChain::from_initialized(hashes, runtime).map(|chain| {
            info!(
                subscription_id = %self.subscription_id,
                finalized = %chain.finalized(),
                pinned = chain.pinned_hashes().len(),
                "follow subscription initialized"
            );
            self.chain = Some(chain);
        });

        if let Err(err) = &result {
            error!(
                subscription_id = %self.subscription_id,
                %err,
                "cannot initialize follow session"
            );
        }
        if let Some(tx) = self.initialized_tx.take() {
            let _ = tx.send(result);
        }
    }

    fn new_block(&mut self, block: NewBlock) -> Vec<Effect> {
        let runtime = self.runtime_spec(block.new_runtime);
        let Some(chain) = self.chain_for_event("newBlock") else {
            return Vec::new();
        };

        let NewBlock {
            block_hash,
            parent_block_hash,
            ..
        } = block;
        debug!(hash = %block_hash, parent = %parent_block_hash, "new block");
        let runtime = chain.add_block(block_hash.clone(), parent_block_hash, runtime);

        vec![Effect::Notify(ChainHeadNotification::NewBlock {
            hash: block_hash,
            runtime,
        })]
    }

    fn best_block_changed(&mut self, best: BestBlockChanged) -> Vec<Effect> {
        let Some(chain) = self.chain_for_event("bestBlockChanged") else {
            return Vec::new();
        };

        let hash = best.best_block_hash;
        if let Err(err) = chain.set_best(hash.clone()) {
            warn!(%hash, %err, "ignoring best block update");
            return Vec::new();
        }
        debug!(%hash, "best block changed");

        vec![Effect::Notify(ChainHeadNotification::BestBlock {
            runtime: chain.runtime_at(&hash),
            hash,
        })]
    }

    fn finalized(&mut self, finalized: Finalized) -> Vec<Effect> {
        let Some(chain) = self.chain_for_event("finalized") else {
            return Vec::new();
        };

        let fin = match chain.finalize(
            finalized.finalized_block_hashes,
            finalized.pruned_block_hashes,
        ) {
            Ok(fin) => fin,
            Err(err) => {
                warn!(%err, "ignoring finalized event");
                return Vec::new();
            }
        };
        debug!(finalized = %fin.finalized, unpin = fin.unpin.len(), "finalized head advanced");

        let mut effects = vec![Effect::Notify(ChainHeadNotification::FinalizedBlock {
            hash: fin.finalized,
            runtime: fin.runtime,
        })];
        if !fin.unpin.is_empty() {
            effects.push(Effect::Unpin(fin.unpin));
        }
        effects
    }

    fn apply_operation(&mut self, operation_id: OperationId, event: OperationEvent) -> Vec<Effect> {
        if event == OperationEvent::WaitingForContinue {
            debug!(%operation_id, "operation waiting for continue");
            return vec![Effect::Continue(operation_id)];
        }

        let name = event.name();
        match self.operations.deliver(operation_id.clone(), event) {
            Delivery::Queued => {
                debug!(%operation_id, event = name, "buffering event for unclaimed operation");
                Vec::new()
            }
            Delivery::Pending => Vec::new(),
            Delivery::Completed(id) => {
                debug!(operation_id = %id, event = name, "operation finished");
                vec![Effect::StopOperation(id)]
            }
            Delivery::Abandoned(id) => {
                debug!(operation_id = %id, event = name, "operation finished with nobody waiting");
                vec![Effect::StopOperation(id)]
            }
        }
    }

    fn chain_for_event(&mut self, event: &str) -> Option<&mut PinnedChain> {
        if self.chain.is_none() {
            warn!(
                subscription_id = %self.subscription_id,
                %event,
                "event before initialized, ignoring"
            );
        }
        self.chain.as_mut()
    }

    fn runtime_spec(&self, runtime: Option<RuntimeEvent>) -> Option<RuntimeSpec> {
        if !self.with_runtime {
            return None;
        }
        match runtime? {
            RuntimeEvent::Valid { spec } => Some(spec),
            RuntimeEvent::Invalid { error } => {
                warn!(
                    subscription_id = %self.subscription_id,
                    %error,
                    "node reported an invalid runtime"
                );
                None
            }
        }
    }

    /// Tears the session down, failing every outstanding operation.
    ///
    /// Returns the ids of the operations that were failed.
    pub(crate) fn end(mut self, reason: SessionEnd) -> Vec<OperationId> {
        let failure = match reason {
            SessionEnd::Unfollowed => OperationFailure::SessionEnded,
            SessionEnd::Stopped => OperationFailure::SubscriptionStopped,
        };

        let failed = self.operations.cleanup_all(|| failure.clone());
        if let Some(tx) = self.initialized_tx.take() {
            let _ = tx.send(Err(failure.into()));
        }
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if reason == SessionEnd::Unfollowed {
            if let Some(cancel) = self.cancel.take() {
                cancel.cancel();
            }
        }
        failed
    }
}
