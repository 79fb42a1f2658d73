use crate::coordinator::{Coordinator, CoordinatorOptions, Outcome};
use crate::error::Result;
use crate::notification::Notification;
use crate::state::{LocalState, StateStore};

use std::collections::VecDeque;

use crdb_directory::Relation;
use crdb_gateway::Gateway;
use tracing::{debug, error};

/// Counts from one dispatch round.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RoundReport {
    /// Notifications handled, including follow-ups raised during the round.
    pub handled: usize,

    /// Notifications deferred to the next round.
    pub deferred: usize,
}

/// Single inbound queue in front of a [`Coordinator`].
///
/// One notification is handled at a time. A deferred notification goes to
/// the back of the queue and is not retried within the same round, and the
/// queue is persisted after every round so deferrals survive restarts.
/// Handlers re-read all state they act on, so a notification that is already
/// pending is never queued a second time.
#[derive(Debug)]
pub struct Dispatcher<R, G, S>
where
    R: Relation,
    G: Gateway,
    S: StateStore,
{
    coordinator: Coordinator<R, G>,
    queue: VecDeque<Notification>,
    store: S,
}

impl<R, G, S> Dispatcher<R, G, S>
where
    R: Relation,
    G: Gateway,
    S: StateStore,
{
    /// Restores the coordinator state and pending notifications from
    /// `store`.
    ///
    /// # Errors
    ///
    /// Returns an error if the saved state cannot be read.
    pub async fn load(options: CoordinatorOptions<R, G>, store: S) -> Result<Self> {
        let LocalState { unit, deferred } = store.load().await?;

        if !deferred.is_empty() {
            debug!("restored {} deferred notification(s)", deferred.len());
        }

        Ok(Self {
            coordinator: Coordinator::new(options, unit),
            queue: deferred.into(),
            store,
        })
    }

    /// The coordinator.
    pub const fn coordinator(&self) -> &Coordinator<R, G> {
        &self.coordinator
    }

    /// Mutable access to the coordinator.
    pub const fn coordinator_mut(&mut self) -> &mut Coordinator<R, G> {
        &mut self.coordinator
    }

    /// Notifications waiting for the next round.
    pub const fn pending(&self) -> &VecDeque<Notification> {
        &self.queue
    }

    /// Adds a notification behind everything already pending, unless it is
    /// pending already.
    pub fn enqueue(&mut self, notification: Notification) {
        if self.queue.contains(&notification) {
            debug!("{} already pending", notification);
        } else {
            self.queue.push_back(notification);
        }
    }

    /// Saves the coordinator state and the queue.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn persist(&self) -> Result<()> {
        self.store
            .save(&LocalState {
                unit: self.coordinator.state().clone(),
                deferred: self.queue.iter().copied().collect(),
            })
            .await
    }

    /// Handles every notification queued when the round starts, at most once
    /// each, then persists.
    ///
    /// # Errors
    ///
    /// Returns the first handler error. The failing notification and
    /// everything not yet handled stay queued and are persisted.
    pub async fn dispatch(&mut self) -> Result<RoundReport> {
        let mut report = RoundReport::default();
        let mut deferred = Vec::new();

        for _ in 0..self.queue.len() {
            let Some(mut notification) = self.queue.pop_front() else {
                break;
            };

            loop {
                match self.coordinator.handle(notification).await {
                    Ok(Outcome::Done) => {
                        report.handled += 1;
                        break;
                    }
                    Ok(Outcome::Defer) => {
                        debug!("deferring {}", notification);
                        report.handled += 1;
                        if !deferred.contains(&notification) {
                            deferred.push(notification);
                        }
                        break;
                    }
                    Ok(Outcome::Emit(next)) => {
                        report.handled += 1;
                        notification = next;
                    }
                    Err(e) => {
                        error!("failed to handle {}: {}", notification, e);

                        if !self.queue.contains(&notification) {
                            self.queue.push_front(notification);
                        }
                        for notification in deferred {
                            self.enqueue(notification);
                        }

                        if let Err(persist_error) = self.persist().await {
                            error!("failed to persist state: {}", persist_error);
                        }

                        return Err(e);
                    }
                }
            }
        }

        report.deferred = deferred.len();
        for notification in deferred {
            self.enqueue(notification);
        }
        self.persist().await?;

        Ok(report)
    }

    /// Queues `notification` behind any pending ones and runs one round.
    ///
    /// # Errors
    ///
    /// See [`Dispatcher::dispatch`].
    pub async fn deliver(&mut self, notification: Notification) -> Result<RoundReport> {
        self.enqueue(notification);
        self.dispatch().await
    }
}
