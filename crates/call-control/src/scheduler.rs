//! Deferred and periodic work posted back into the coordinator mailbox
//!
//! Timers never touch coordinator state directly: when they fire they send a
//! message into the same mailbox the coordinator drains, so their effects are
//! serialized with core events and user actions. Dropping a [`ScheduledTask`]
//! aborts it.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Posts messages into a mailbox after a delay
///
/// Holds only a weak sender so pending timers do not keep the mailbox open
/// after every handle is gone.
pub struct Scheduler<M> {
    mailbox: mpsc::WeakSender<M>,
}

impl<M> Clone for Scheduler<M> {
    fn clone(&self) -> Self {
        Self {
            mailbox: self.mailbox.clone(),
        }
    }
}

impl<M: Send + 'static> Scheduler<M> {
    pub fn new(mailbox: &mpsc::Sender<M>) -> Self {
        Self {
            mailbox: mailbox.downgrade(),
        }
    }

    /// Deliver `message` once after `delay`
    pub fn schedule(&self, delay: Duration, message: M) -> ScheduledTask {
        let deadline = Instant::now() + delay;
        let mailbox = self.mailbox.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if let Some(mailbox) = mailbox.upgrade() {
                let _ = mailbox.send(message).await;
            }
        });
        ScheduledTask { handle, deadline }
    }

    /// Deliver a fresh message from `make` every `period`, first one after one period
    pub fn schedule_every<F>(&self, period: Duration, make: F) -> ScheduledTask
    where
        F: Fn() -> M + Send + 'static,
    {
        let start = Instant::now() + period;
        let mailbox = self.mailbox.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(start, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let Some(mailbox) = mailbox.upgrade() else {
                    break;
                };
                if mailbox.send(make()).await.is_err() {
                    break;
                }
            }
        });
        ScheduledTask {
            handle,
            deadline: start,
        }
    }
}

/// Handle to a scheduled delivery, aborted on drop
#[derive(Debug)]
pub struct ScheduledTask {
    handle: JoinHandle<()>,
    deadline: Instant,
}

impl ScheduledTask {
    /// When the (first) delivery is due
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn cancel(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
