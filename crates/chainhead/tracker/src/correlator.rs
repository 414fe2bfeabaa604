//! Matching of id-tagged push events to the request waiting on them.
//!
//! The node mints an operation id in its synchronous acknowledgment and then
//! reports progress through the follow subscription. Nothing orders the
//! acknowledgment against the first event for that id, so events for ids
//! nobody has claimed yet are buffered until a handle is registered.

use std::{
    collections::{hash_map::Entry, HashMap, VecDeque},
    fmt::{self, Debug},
    hash::Hash,
    ops::ControlFlow,
};

use thiserror::Error;
use tokio::sync::oneshot;

/// Folds the events of one operation into its result.
pub trait OperationReducer<Ev> {
    type Output;
    type Error;

    /// Consumes an event. `Break` carries the result and ends the operation.
    fn reduce(&mut self, event: Ev) -> ControlFlow<Result<Self::Output, Self::Error>>;
}

type Outcome<Ev, R> =
    Result<<R as OperationReducer<Ev>>::Output, <R as OperationReducer<Ev>>::Error>;

#[derive(Debug, Error)]
pub enum CorrelatorError<K: Debug> {
    #[error("operation {0:?} already has a waiting handle")]
    DuplicateOperation(K),
}

/// What happened to a delivered event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery<K> {
    /// Nobody claimed the id yet; the event is buffered.
    Queued,
    /// The handle consumed the event and keeps waiting.
    Pending,
    /// The event ended the operation and the waiter got the result.
    Completed(K),
    /// The event ended the operation but the waiter had gone away.
    Abandoned(K),
}

impl<K> Delivery<K> {
    /// Returns the id whose server-side operation should now be released.
    pub fn finished(self) -> Option<K> {
        match self {
            Delivery::Completed(id) | Delivery::Abandoned(id) => Some(id),
            Delivery::Queued | Delivery::Pending => None,
        }
    }
}

/// Handle returned to the registering caller.
#[derive(Debug)]
pub struct Registered<T, E> {
    /// Resolves once a terminal event arrives or the table is torn down.
    pub completion: oneshot::Receiver<Result<T, E>>,
    /// Buffered events already finished the operation during registration.
    pub finished: bool,
}

struct Handle<Ev, R: OperationReducer<Ev>> {
    reducer: R,
    completion: oneshot::Sender<Outcome<Ev, R>>,
}

impl<Ev, R> Debug for Handle<Ev, R>
where
    R: OperationReducer<Ev> + Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("reducer", &self.reducer)
            .field("closed", &self.completion.is_closed())
            .finish()
    }
}

/// Table of in-flight operations keyed by their server-assigned id.
#[derive(Debug)]
pub struct OperationCorrelator<K, Ev, R: OperationReducer<Ev>> {
    handles: HashMap<K, Handle<Ev, R>>,
    pending: HashMap<K, VecDeque<Ev>>,
}

impl<K, Ev, R> Default for OperationCorrelator<K, Ev, R>
where
    R: OperationReducer<Ev>,
{
    fn default() -> Self {
        Self {
            handles: HashMap::new(),
            pending: HashMap::new(),
        }
    }
}

impl<K, Ev, R> OperationCorrelator<K, Ev, R>
where
    K: Clone + Debug + Eq + Hash,
    R: OperationReducer<Ev>,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `id` and replays whatever was buffered for it, oldest first.
    ///
    /// Events buffered behind a terminal one stay queued for the next claim
    /// of the same id.
    pub fn register(
        &mut self,
        id: K,
        mut reducer: R,
    ) -> Result<Registered<R::Output, R::Error>, CorrelatorError<K>> {
        if self.handles.contains_key(&id) {
            return Err(CorrelatorError::DuplicateOperation(id));
        }

        let (completion_tx, completion) = oneshot::channel();
        let mut buffered = self.pending.remove(&id).unwrap_or_default();

        while let Some(event) = buffered.pop_front() {
            if let ControlFlow::Break(result) = reducer.reduce(event) {
                let _ = completion_tx.send(result);
                if !buffered.is_empty() {
                    self.pending.insert(id, buffered);
                }
                return Ok(Registered {
                    completion,
                    finished: true,
                });
            }
        }

        self.handles.insert(
            id,
            Handle {
                reducer,
                completion: completion_tx,
            },
        );

        Ok(Registered {
            completion,
            finished: false,
        })
    }

    /// Routes an event to the handle owning `id`, or buffers it.
    pub fn deliver(&mut self, id: K, event: Ev) -> Delivery<K> {
        match self.handles.entry(id) {
            Entry::Vacant(entry) => {
                self.pending
                    .entry(entry.into_key())
                    .or_default()
                    .push_back(event);
                Delivery::Queued
            }
            Entry::Occupied(mut entry) => match entry.get_mut().reducer.reduce(event) {
                ControlFlow::Continue(()) => Delivery::Pending,
                ControlFlow::Break(result) => {
                    let (id, handle) = entry.remove_entry();
                    if handle.completion.send(result).is_ok() {
                        Delivery::Completed(id)
                    } else {
                        Delivery::Abandoned(id)
                    }
                }
            },
        }
    }

    /// Fails every outstanding handle and forgets all buffered events.
    ///
    /// Returns the ids of the handles that were failed.
    pub fn cleanup_all(&mut self, mut make_err: impl FnMut() -> R::Error) -> Vec<K> {
        self.pending.clear();
        self.handles
            .drain()
            .map(|(id, handle)| {
                let _ = handle.completion.send(Err(make_err()));
                id
            })
            .collect()
    }

    pub fn is_registered(&self, id: &K) -> bool {
        self.handles.contains_key(id)
    }

    /// Number of operations waiting for a terminal event.
    pub fn outstanding(&self) -> usize {
        self.handles.len()
    }

    /// Number of events buffered for `id`.
    pub fn buffered(&self, id: &K) -> usize {
        self.pending.get(id).map_or(0, VecDeque::len)
    }
}

#[cfg(test)]
mod tests {
    use std::mem;

    use super::*;

    /// Sums numbers until it sees a negative one, which fails the operation,
    /// or a zero, which ends it.
    #[derive(Debug, Default)]
    struct Summer {
        seen: Vec<i32>,
    }

    impl OperationReducer<i32> for Summer {
        type Output = Vec<i32>;
        type Error = String;

        fn reduce(&mut self, event: i32) -> ControlFlow<Result<Vec<i32>, String>> {
            match event {
                0 => ControlFlow::Break(Ok(mem::take(&mut self.seen))),
                n if n < 0 => ControlFlow::Break(Err(format!("bad {n}"))),
                n => {
                    self.seen.push(n);
                    ControlFlow::Continue(())
                }
            }
        }
    }

    type TestCorrelator = OperationCorrelator<&'static str, i32, Summer>;

    #[tokio::test]
    async fn test_register_then_deliver() {
        let mut table = TestCorrelator::new();
        let registered = table.register("a", Summer::default()).unwrap();
        assert!(!registered.finished);

        assert_eq!(table.deliver("a", 1), Delivery::Pending);
        assert_eq!(table.deliver("a", 2), Delivery::Pending);
        assert_eq!(table.deliver("a", 0), Delivery::Completed("a"));

        assert_eq!(registered.completion.await.unwrap(), Ok(vec![1, 2]));
        assert!(!table.is_registered(&"a"));
    }

    #[tokio::test]
    async fn test_events_before_registration_replay_in_order() {
        let mut table = TestCorrelator::new();
        assert_eq!(table.deliver("a", 3), Delivery::Queued);
        assert_eq!(table.deliver("a", 4), Delivery::Queued);
        assert_eq!(table.buffered(&"a"), 2);

        let registered = table.register("a", Summer::default()).unwrap();
        assert!(!registered.finished);
        assert_eq!(table.buffered(&"a"), 0);

        assert_eq!(table.deliver("a", 5), Delivery::Pending);
        assert_eq!(table.deliver("a", 0), Delivery::Completed("a"));
        assert_eq!(registered.completion.await.unwrap(), Ok(vec![3, 4, 5]));
    }

    #[tokio::test]
    async fn test_buffered_terminal_finishes_at_registration() {
        let mut table = TestCorrelator::new();
        table.deliver("a", 7);
        table.deliver("a", 0);

        let registered = table.register("a", Summer::default()).unwrap();
        assert!(registered.finished);
        assert!(!table.is_registered(&"a"));
        assert_eq!(registered.completion.await.unwrap(), Ok(vec![7]));
    }

    #[tokio::test]
    async fn test_events_behind_terminal_stay_buffered() {
        let mut table = TestCorrelator::new();
        table.deliver("a", -1);
        table.deliver("a", 9);
        table.deliver("a", 0);

        let first = table.register("a", Summer::default()).unwrap();
        assert!(first.finished);
        assert_eq!(first.completion.await.unwrap(), Err("bad -1".to_string()));
        assert_eq!(table.buffered(&"a"), 2);

        let second = table.register("a", Summer::default()).unwrap();
        assert!(second.finished);
        assert_eq!(second.completion.await.unwrap(), Ok(vec![9]));
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut table = TestCorrelator::new();
        let _first = table.register("a", Summer::default()).unwrap();

        let err = table.register("a", Summer::default()).unwrap_err();
        assert!(matches!(err, CorrelatorError::DuplicateOperation("a")));
    }

    #[test]
    fn test_dropped_waiter_is_reported_as_abandoned() {
        let mut table = TestCorrelator::new();
        let registered = table.register("a", Summer::default()).unwrap();
        drop(registered);

        assert_eq!(table.deliver("a", 0), Delivery::Abandoned("a"));
        assert_eq!(Delivery::Abandoned("a").finished(), Some("a"));
    }

    #[tokio::test]
    async fn test_cleanup_all_fails_handles_and_drops_queues() {
        let mut table = TestCorrelator::new();
        let a = table.register("a", Summer::default()).unwrap();
        let b = table.register("b", Summer::default()).unwrap();
        table.deliver("c", 1);

        let mut failed = table.cleanup_all(|| "session ended".to_string());
        failed.sort();

        assert_eq!(failed, vec!["a", "b"]);
        assert_eq!(table.outstanding(), 0);
        assert_eq!(table.buffered(&"c"), 0);
        assert_eq!(a.completion.await.unwrap(), Err("session ended".to_string()));
        assert_eq!(b.completion.await.unwrap(), Err("session ended".to_string()));
    }

    #[test]
    fn test_operations_are_independent() {
        let mut table = TestCorrelator::new();
        let _a = table.register("a", Summer::default()).unwrap();
        let _b = table.register("b", Summer::default()).unwrap();

        assert_eq!(table.deliver("a", -5), Delivery::Completed("a"));
        assert!(table.is_registered(&"b"));
        assert_eq!(table.deliver("b", 1), Delivery::Pending);
    }
}
