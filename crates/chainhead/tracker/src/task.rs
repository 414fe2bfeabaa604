use std::sync::Weak;

use serde_json::Value;
use strata_chainhead_rpc::RpcTransport;
use strata_chainhead_types::FollowEvent;
use tokio::{
    select,
    sync::{mpsc, oneshot},
};
use tracing::{debug, warn};

use crate::{session::SessionEnd, tracker::Shared};

/// Drains the follow subscription of one session.
///
/// This is the only place follow events are applied. Exits when the session
/// ends, the tracker is dropped or the event stream closes.
pub(crate) async fn follow_task<T: RpcTransport>(
    shared: Weak<Shared<T>>,
    generation: u64,
    mut events_rx: mpsc::UnboundedReceiver<Value>,
    mut stop_rx: oneshot::Receiver<()>,
) {
    loop {
        let maybe_event = select! {
            biased;
            _ = &mut stop_rx => break,
            maybe_event = events_rx.recv() => maybe_event,
        };

        let Some(shared) = shared.upgrade() else {
            debug!(generation, "tracker dropped; stopping follow task");
            break;
        };

        let Some(raw) = maybe_event else {
            if shared.end_session(generation, SessionEnd::Stopped) {
                warn!(generation, "follow subscription closed without stop event");
            }
            break;
        };

        let event = match serde_json::from_value::<FollowEvent>(raw) {
            Ok(event) => event,
            Err(err) => {
                warn!(generation, %err, "ignoring malformed follow event");
                continue;
            }
        };

        let Some(dispatched) = shared.dispatch(generation, event) else {
            break;
        };
        shared
            .run_effects(&dispatched.subscription_id, dispatched.effects)
            .await;
        if dispatched.ended {
            break;
        }
    }

    debug!(generation, "follow task exited");
}
