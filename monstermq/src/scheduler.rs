// Copyright (c) 2025 MonsterMQ Authors. All rights reserved.
// Use of this source is governed by GNU General Public License that can be found
// in the LICENSE file.

//! Monotonic timer queue on a dedicated task.
//!
//! Owners schedule delayed events and hold a [`TimerId`] for cancellation;
//! fired events are delivered through an mpsc channel. Backed by a min
//! heap ordered by deadline.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::time::Duration;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::time::Instant;

use crate::types::ClientId;

pub type TimerId = u64;

/// Events the broker schedules for later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerEvent {
    /// Will delay elapsed; publish the stored will of this client.
    PublishWill(ClientId),

    /// Session expiry elapsed; drop the stored session of this client.
    ExpireSession(ClientId),
}

#[derive(Debug)]
struct Entry {
    deadline: Instant,
    id: TimerId,
    event: TimerEvent,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.id == other.id
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max heap; flip to pop the earliest deadline.
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.id.cmp(&self.id))
    }
}

#[derive(Debug)]
enum SchedulerCmd {
    Schedule(TimerId, Duration, TimerEvent),
    Cancel(TimerId),
}

/// Handle used to schedule and cancel timers.
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    sender: mpsc::UnboundedSender<SchedulerCmd>,
    next_id: std::sync::Arc<std::sync::atomic::AtomicU64>,
}

impl SchedulerHandle {
    /// Schedule `event` to fire after `delay`.
    pub fn schedule(&self, delay: Duration, event: TimerEvent) -> TimerId {
        let id = self
            .next_id
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        if self
            .sender
            .send(SchedulerCmd::Schedule(id, delay, event))
            .is_err()
        {
            log::error!("scheduler: timer task is gone");
        }
        id
    }

    /// Cancel a previously scheduled timer. Cancelling a fired or unknown
    /// timer is a no-op.
    pub fn cancel(&self, id: TimerId) {
        if self.sender.send(SchedulerCmd::Cancel(id)).is_err() {
            log::error!("scheduler: timer task is gone");
        }
    }
}

/// Spawn the timer task. Fired events arrive on the returned receiver.
#[must_use]
pub fn start() -> (SchedulerHandle, Receiver<TimerEvent>) {
    let (cmd_sender, cmd_receiver) = mpsc::unbounded_channel();
    let (event_sender, event_receiver) = mpsc::channel(64);
    tokio::spawn(run_loop(cmd_receiver, event_sender));
    (
        SchedulerHandle {
            sender: cmd_sender,
            next_id: std::sync::Arc::new(std::sync::atomic::AtomicU64::new(1)),
        },
        event_receiver,
    )
}

async fn run_loop(
    mut cmds: mpsc::UnboundedReceiver<SchedulerCmd>,
    events: Sender<TimerEvent>,
) {
    let mut heap: BinaryHeap<Entry> = BinaryHeap::new();
    let mut cancelled: HashSet<TimerId> = HashSet::new();

    loop {
        // Drop cancelled entries from the top before sleeping.
        while let Some(entry) = heap.peek() {
            if cancelled.remove(&entry.id) {
                heap.pop();
            } else {
                break;
            }
        }

        let sleep_until = heap.peek().map(|entry| entry.deadline);
        tokio::select! {
            cmd = cmds.recv() => {
                match cmd {
                    Some(SchedulerCmd::Schedule(id, delay, event)) => {
                        heap.push(Entry {
                            deadline: Instant::now() + delay,
                            id,
                            event,
                        });
                    }
                    Some(SchedulerCmd::Cancel(id)) => {
                        cancelled.insert(id);
                    }
                    None => break,
                }
            }
            () = async {
                match sleep_until {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => futures::future::pending().await,
                }
            } => {
                let now = Instant::now();
                while let Some(entry) = heap.peek() {
                    if entry.deadline > now {
                        break;
                    }
                    let entry = heap.pop().expect("peeked entry");
                    if cancelled.remove(&entry.id) {
                        continue;
                    }
                    if let Err(err) = events.send(entry.event).await {
                        log::error!("scheduler: failed to deliver timer event: {err}");
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_fires_in_deadline_order() {
        let (handle, mut events) = start();
        handle.schedule(
            Duration::from_secs(2),
            TimerEvent::PublishWill("late".to_string()),
        );
        handle.schedule(
            Duration::from_secs(1),
            TimerEvent::PublishWill("early".to_string()),
        );

        assert_eq!(
            events.recv().await,
            Some(TimerEvent::PublishWill("early".to_string()))
        );
        assert_eq!(
            events.recv().await,
            Some(TimerEvent::PublishWill("late".to_string()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_timer_does_not_fire() {
        let (handle, mut events) = start();
        let id = handle.schedule(
            Duration::from_secs(1),
            TimerEvent::PublishWill("a".to_string()),
        );
        handle.schedule(
            Duration::from_secs(2),
            TimerEvent::PublishWill("b".to_string()),
        );
        handle.cancel(id);

        assert_eq!(
            events.recv().await,
            Some(TimerEvent::PublishWill("b".to_string()))
        );
    }
}
