//! Expiry timer.
//!
//! One task owns a min-heap of (deadline, bus id) pairs and funnels every
//! due entry serially into [`Scheduler::expire`]. Nothing is ever cancelled:
//! a hover reset or an early close simply leaves a stale deadline behind,
//! which the scheduler's re-validating expire path ignores.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Arc;

use tokio::time::Instant;
use tracing::debug;

use super::Scheduler;

/// Commands accepted by the timer task.
#[derive(Debug, Clone, Copy)]
pub enum TimerCmd {
    Arm { bus_id: u32, deadline: Instant },
}

/// Runs until every `TimerCmd` sender is dropped.
pub async fn run_timer(scheduler: Arc<Scheduler>, commands: flume::Receiver<TimerCmd>) {
    let mut heap: BinaryHeap<Reverse<(Instant, u32)>> = BinaryHeap::new();

    loop {
        let next_deadline = heap.peek().map(|Reverse((at, _))| *at);

        tokio::select! {
            command = commands.recv_async() => match command {
                Ok(TimerCmd::Arm { bus_id, deadline }) => {
                    heap.push(Reverse((deadline, bus_id)));
                }
                Err(_) => break,
            },
            _ = sleep_until_or_forever(next_deadline) => {
                let now = Instant::now();
                while let Some(Reverse((deadline, _))) = heap.peek() {
                    if *deadline > now {
                        break;
                    }
                    let Reverse((_, bus_id)) = heap.pop().expect("heap entry just peeked");
                    scheduler.expire(bus_id);
                }
            }
        }
    }
    debug!("timer task stopped");
}

async fn sleep_until_or_forever(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
