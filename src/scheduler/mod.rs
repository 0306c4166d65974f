//! Presentation scheduler.
//!
//! Admission control over a bounded number of visible slots: duplicate
//! stacking, critical-urgency preemption, a stable priority queue for
//! overflow, timeout-driven eviction, and hover pausing. One explicit
//! instance owns all state behind a single mutex; renderer and protocol-layer
//! callbacks are invoked only after the lock is released, so a callback that
//! re-enters the scheduler cannot deadlock.

pub mod timer;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::config::DisplayConfig;
use crate::notification::{CloseReason, NotificationRequest, Timeout, Urgency};
use crate::render::{RenderHandle, Renderer, SlotView};
use crate::tracker::{DisplayStatus, NotificationTracker};

use timer::TimerCmd;

/// Lifecycle outcome reported to the protocol layer for signal emission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    Closed { bus_id: u32, reason: CloseReason },
    ActionInvoked { bus_id: u32, action_key: String },
}

/// Hand-off from the protocol layer's dispatch thread.
#[derive(Debug)]
pub enum SchedulerCommand {
    Show { bus_id: u32, request: NotificationRequest },
    Close { bus_id: u32, reason: CloseReason },
}

struct ActiveSlot {
    request: NotificationRequest,
    correlation: String,
    /// None while the renderer is still creating the popup; the slot already
    /// counts against `max_visible`.
    handle: Option<RenderHandle>,
    created_at: Instant,
    expires_at: Option<Instant>,
    paused: bool,
    stack_count: u32,
    position: usize,
}

struct PendingEntry {
    bus_id: u32,
    request: NotificationRequest,
    correlation: String,
    queued_at: Instant,
}

struct State {
    config: DisplayConfig,
    active: HashMap<u32, ActiveSlot>,
    /// Sorted by (urgency desc, queued_at asc); insertion keeps it stable.
    pending: Vec<PendingEntry>,
}

/// Work collected under the lock and executed after release.
enum Effect {
    Create {
        bus_id: u32,
        request: NotificationRequest,
        position: usize,
    },
    Destroy(RenderHandle),
    StackCount {
        handle: RenderHandle,
        count: u32,
    },
    Position {
        handle: RenderHandle,
        position: usize,
    },
    Arm {
        bus_id: u32,
        deadline: Instant,
    },
    Expiry {
        bus_id: u32,
        expires_in: Option<Duration>,
    },
    Track {
        correlation: String,
        bus_id: u32,
        expires_in: Option<Duration>,
        status: DisplayStatus,
    },
    Status {
        bus_id: u32,
        status: DisplayStatus,
    },
    Event(LifecycleEvent),
}

pub struct Scheduler {
    state: Mutex<State>,
    renderer: Arc<dyn Renderer>,
    tracker: Arc<NotificationTracker>,
    events: flume::Sender<LifecycleEvent>,
    timer: flume::Sender<TimerCmd>,
}

impl Scheduler {
    pub fn new(
        renderer: Arc<dyn Renderer>,
        tracker: Arc<NotificationTracker>,
        config: DisplayConfig,
        events: flume::Sender<LifecycleEvent>,
        timer: flume::Sender<TimerCmd>,
    ) -> Self {
        Scheduler {
            state: Mutex::new(State {
                config,
                active: HashMap::new(),
                pending: Vec::new(),
            }),
            renderer,
            tracker,
            events,
            timer,
        }
    }

    /// Admits, stacks, preempts or queues an inbound request.
    pub fn show(&self, bus_id: u32, request: NotificationRequest) {
        let mut effects = Vec::new();
        {
            let mut state = self.state.lock().unwrap();

            // Replace semantics: the same bus id arriving again recycles the
            // old popup without a closure signal; the id stays alive.
            if let Some(old) = state.active.remove(&bus_id) {
                if let Some(handle) = old.handle {
                    effects.push(Effect::Destroy(handle));
                }
            } else if let Some(idx) = state.pending.iter().position(|p| p.bus_id == bus_id) {
                state.pending.remove(idx);
            }

            if state.config.stacking && !request.hints().transient() {
                if let Some(dup_id) = duplicate_of(&state, &request) {
                    effects.extend(stack_onto_locked(&mut state, dup_id, bus_id));
                    // a replace that turned into a stack freed a slot
                    effects.extend(recompute_positions_locked(&mut state));
                    drop(state);
                    self.run_effects(effects);
                    return;
                }
            }

            if state.active.len() < state.config.max_visible {
                effects.extend(admit_locked(&mut state, bus_id, request, None));
            } else if request.urgency() == Urgency::Critical {
                if let Some(victim_id) = preemption_victim(&state) {
                    // Evicted requests are dropped, not re-queued; clients
                    // observe the eviction as an expiry.
                    let victim = state.active.remove(&victim_id).expect("victim is active");
                    if let Some(handle) = victim.handle {
                        effects.push(Effect::Destroy(handle));
                    }
                    effects.push(Effect::Status {
                        bus_id: victim_id,
                        status: DisplayStatus::Expired,
                    });
                    effects.push(Effect::Event(LifecycleEvent::Closed {
                        bus_id: victim_id,
                        reason: CloseReason::Expired,
                    }));
                    effects.extend(admit_locked(&mut state, bus_id, request, None));
                } else {
                    effects.extend(enqueue_locked(&mut state, bus_id, request));
                }
            } else {
                effects.extend(enqueue_locked(&mut state, bus_id, request));
            }

            effects.extend(recompute_positions_locked(&mut state));
        }
        self.run_effects(effects);
    }

    /// Removes a notification from the active slots or the pending queue.
    /// Idempotent: closing an unknown or already-closed id does nothing and
    /// emits nothing.
    pub fn close(&self, bus_id: u32, reason: CloseReason) {
        let mut effects = Vec::new();
        {
            let mut state = self.state.lock().unwrap();
            if !close_locked(&mut state, bus_id, reason, &mut effects) {
                return;
            }
        }
        self.run_effects(effects);
    }

    /// User-driven dismissal, e.g. a click on the popup.
    pub fn dismiss(&self, bus_id: u32) {
        self.close(bus_id, CloseReason::Dismissed);
    }

    /// Drains active slots and the pending queue; everything is reported
    /// dismissed.
    pub fn close_all(&self) {
        let mut effects = Vec::new();
        {
            let mut state = self.state.lock().unwrap();
            // pending first, so closing the slots cannot promote into them
            for entry in std::mem::take(&mut state.pending) {
                effects.push(Effect::Status {
                    bus_id: entry.bus_id,
                    status: DisplayStatus::Dismissed,
                });
                effects.push(Effect::Event(LifecycleEvent::Closed {
                    bus_id: entry.bus_id,
                    reason: CloseReason::Dismissed,
                }));
            }
            let ids: Vec<u32> = state.active.keys().copied().collect();
            for bus_id in ids {
                close_locked(&mut state, bus_id, CloseReason::Dismissed, &mut effects);
            }
        }
        self.run_effects(effects);
    }

    /// Dismissal by an external collaborator, resolved through the tracker
    /// index rather than a scan.
    pub fn close_by_correlation_id(&self, correlation_id: &str, reason: CloseReason) {
        if let Some(bus_id) = self.tracker.get_by_correlation_id(correlation_id) {
            self.close(bus_id, reason);
        }
    }

    /// Timer-driven close. Re-validates that the slot is still active, not
    /// paused, and actually past its deadline: hover resets leave stale
    /// deadlines in the timer heap by design.
    pub fn expire(&self, bus_id: u32) {
        let mut effects = Vec::new();
        {
            let mut state = self.state.lock().unwrap();
            let due = match state.active.get(&bus_id) {
                Some(slot) if !slot.paused => {
                    matches!(slot.expires_at, Some(at) if at <= Instant::now())
                }
                _ => false,
            };
            if !due {
                debug!(bus_id, "stale expiry ignored");
                return;
            }
            close_locked(&mut state, bus_id, CloseReason::Expired, &mut effects);
        }
        self.run_effects(effects);
    }

    /// Entering the hover region suspends expiry.
    pub fn hover_start(&self, bus_id: u32) {
        let mut state = self.state.lock().unwrap();
        if let Some(slot) = state.active.get_mut(&bus_id) {
            slot.paused = true;
        }
    }

    /// Leaving the hover region restarts the full display duration rather
    /// than resuming the remaining time.
    pub fn hover_end(&self, bus_id: u32) {
        let mut effects = Vec::new();
        {
            let mut state = self.state.lock().unwrap();
            let config = state.config.clone();
            if let Some(slot) = state.active.get_mut(&bus_id) {
                slot.paused = false;
                let timeout = effective_timeout(&slot.request, &config);
                slot.expires_at = timeout.map(|d| Instant::now() + d);
                effects.push(Effect::Expiry {
                    bus_id,
                    expires_in: timeout,
                });
                if let Some(deadline) = slot.expires_at {
                    effects.push(Effect::Arm { bus_id, deadline });
                }
            }
        }
        self.run_effects(effects);
    }

    /// Emits `ActionInvoked`; the notification then closes as dismissed
    /// unless it is marked resident.
    pub fn invoke_action(&self, bus_id: u32, action_key: &str) {
        let resident = {
            let state = self.state.lock().unwrap();
            match state.active.get(&bus_id) {
                Some(slot) => slot.request.hints().resident(),
                None => return,
            }
        };
        let _ = self.events.send(LifecycleEvent::ActionInvoked {
            bus_id,
            action_key: action_key.to_string(),
        });
        if !resident {
            self.close(bus_id, CloseReason::Dismissed);
        }
    }

    /// Replaces the presentation policy at runtime. Raising `max_visible`
    /// promotes queued entries immediately; lowering it never evicts slots
    /// that are already visible.
    pub fn apply_config(&self, config: DisplayConfig) {
        let mut effects = Vec::new();
        {
            let mut state = self.state.lock().unwrap();
            state.config = config;
            effects.extend(promote_locked(&mut state));
            effects.extend(recompute_positions_locked(&mut state));
        }
        self.run_effects(effects);
    }

    pub fn active_count(&self) -> usize {
        self.state.lock().unwrap().active.len()
    }

    /// Visible bus ids, ordered by position.
    pub fn active_ids(&self) -> Vec<u32> {
        let state = self.state.lock().unwrap();
        let mut slots: Vec<(usize, u32)> = state
            .active
            .iter()
            .map(|(id, slot)| (slot.position, *id))
            .collect();
        slots.sort_unstable();
        slots.into_iter().map(|(_, id)| id).collect()
    }

    /// Queued bus ids in promotion order.
    pub fn pending_ids(&self) -> Vec<u32> {
        self.state
            .lock()
            .unwrap()
            .pending
            .iter()
            .map(|entry| entry.bus_id)
            .collect()
    }

    fn run_effects(&self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Create {
                    bus_id,
                    request,
                    position,
                } => {
                    let view = SlotView {
                        bus_id,
                        request: &request,
                        position,
                        stack_count: 1,
                    };
                    let handle = self.renderer.create(&view);
                    self.attach_handle(bus_id, handle, position);
                }
                Effect::Destroy(handle) => self.renderer.destroy(handle),
                Effect::StackCount { handle, count } => {
                    self.renderer.update_stack_count(handle, count)
                }
                Effect::Position { handle, position } => {
                    self.renderer.update_position(handle, position)
                }
                Effect::Arm { bus_id, deadline } => {
                    let _ = self.timer.send(TimerCmd::Arm { bus_id, deadline });
                }
                Effect::Expiry { bus_id, expires_in } => {
                    self.tracker
                        .set_expiry_by_bus_id(bus_id, wall_clock_deadline(expires_in));
                }
                Effect::Track {
                    correlation,
                    bus_id,
                    expires_in,
                    status,
                } => {
                    self.tracker
                        .register(&correlation, bus_id, wall_clock_deadline(expires_in));
                    self.tracker.set_status_by_bus_id(bus_id, status);
                }
                Effect::Status { bus_id, status } => {
                    self.tracker.set_status_by_bus_id(bus_id, status);
                }
                Effect::Event(event) => {
                    let _ = self.events.send(event);
                }
            }
        }
    }

    /// Hands a freshly created render handle to its slot. If the slot was
    /// closed while the popup was being created, the entry is already gone
    /// and the handle is destroyed here instead; each handle still has
    /// exactly one destroy.
    fn attach_handle(&self, bus_id: u32, handle: RenderHandle, created_position: usize) {
        let mut orphaned = false;
        let mut reposition = None;
        {
            let mut state = self.state.lock().unwrap();
            match state.active.get_mut(&bus_id) {
                Some(slot) if slot.handle.is_none() => {
                    slot.handle = Some(handle);
                    if slot.position != created_position {
                        reposition = Some(slot.position);
                    }
                }
                _ => orphaned = true,
            }
        }
        if orphaned {
            self.renderer.destroy(handle);
        } else if let Some(position) = reposition {
            self.renderer.update_position(handle, position);
        }
    }
}

fn effective_timeout(request: &NotificationRequest, config: &DisplayConfig) -> Option<Duration> {
    match request.timeout() {
        Timeout::Millis(ms) => Some(Duration::from_millis(ms as u64)),
        Timeout::Never => None,
        Timeout::Default => config.timeout_for(request.urgency()),
    }
}

fn wall_clock_deadline(expires_in: Option<Duration>) -> Option<chrono::DateTime<chrono::Local>> {
    expires_in
        .and_then(|d| chrono::Duration::from_std(d).ok())
        .map(|d| chrono::Local::now() + d)
}

fn new_correlation_id() -> String {
    format!(
        "{}-{:08x}",
        chrono::Local::now().timestamp_millis(),
        rand::random::<u32>()
    )
}

fn duplicate_of(state: &State, request: &NotificationRequest) -> Option<u32> {
    state
        .active
        .iter()
        .find(|(_, slot)| {
            !slot.request.hints().transient() && slot.request.same_content(request)
        })
        .map(|(id, _)| *id)
}

/// Coalesces a duplicate onto an existing slot: the counter grows, the slot's
/// expiry restarts, and the newcomer is reported closed without ever getting
/// a slot of its own.
fn stack_onto_locked(state: &mut State, slot_id: u32, duplicate_id: u32) -> Vec<Effect> {
    let mut effects = Vec::new();
    let config = state.config.clone();
    let slot = state.active.get_mut(&slot_id).expect("duplicate target is active");
    slot.stack_count += 1;
    let timeout = effective_timeout(&slot.request, &config);
    slot.expires_at = timeout.map(|d| Instant::now() + d);
    if let Some(handle) = slot.handle {
        effects.push(Effect::StackCount {
            handle,
            count: slot.stack_count,
        });
    }
    effects.push(Effect::Expiry {
        bus_id: slot_id,
        expires_in: timeout,
    });
    if let Some(deadline) = slot.expires_at {
        effects.push(Effect::Arm {
            bus_id: slot_id,
            deadline,
        });
    }
    // A replaced bus id may still carry a live tracker entry from the slot it
    // just vacated; terminalize it along with the closure report.
    effects.push(Effect::Status {
        bus_id: duplicate_id,
        status: DisplayStatus::Dismissed,
    });
    effects.push(Effect::Event(LifecycleEvent::Closed {
        bus_id: duplicate_id,
        reason: CloseReason::Dismissed,
    }));
    effects
}

fn admit_locked(
    state: &mut State,
    bus_id: u32,
    request: NotificationRequest,
    correlation: Option<String>,
) -> Vec<Effect> {
    let correlation = correlation.unwrap_or_else(new_correlation_id);
    let now = Instant::now();
    let timeout = effective_timeout(&request, &state.config);
    let expires_at = timeout.map(|d| now + d);
    let position = state.active.len();
    let create_request = request.clone();

    state.active.insert(
        bus_id,
        ActiveSlot {
            request,
            correlation: correlation.clone(),
            handle: None,
            created_at: now,
            expires_at,
            paused: false,
            stack_count: 1,
            position,
        },
    );

    let mut effects = vec![
        Effect::Track {
            correlation,
            bus_id,
            expires_in: timeout,
            status: DisplayStatus::Active,
        },
        Effect::Create {
            bus_id,
            request: create_request,
            position,
        },
    ];
    if let Some(deadline) = expires_at {
        effects.push(Effect::Arm { bus_id, deadline });
    }
    effects
}

fn enqueue_locked(state: &mut State, bus_id: u32, request: NotificationRequest) -> Vec<Effect> {
    let correlation = new_correlation_id();
    let entry = PendingEntry {
        bus_id,
        request,
        correlation: correlation.clone(),
        queued_at: Instant::now(),
    };
    // Insert after every entry of equal or higher urgency: urgency descending
    // with FIFO among equals.
    let idx = state
        .pending
        .iter()
        .position(|p| p.request.urgency() < entry.request.urgency())
        .unwrap_or(state.pending.len());
    state.pending.insert(idx, entry);
    vec![Effect::Track {
        correlation,
        bus_id,
        expires_in: None,
        status: DisplayStatus::Pending,
    }]
}

fn preemption_victim(state: &State) -> Option<u32> {
    state
        .active
        .iter()
        .filter(|(_, slot)| slot.request.urgency() < Urgency::Critical)
        .min_by_key(|(_, slot)| (slot.request.urgency(), slot.created_at))
        .map(|(id, _)| *id)
}

/// Removes one entry and, when a visible slot freed, promotes from the
/// pending queue immediately. Returns false when the id is absent.
fn close_locked(
    state: &mut State,
    bus_id: u32,
    reason: CloseReason,
    effects: &mut Vec<Effect>,
) -> bool {
    if let Some(slot) = state.active.remove(&bus_id) {
        if let Some(handle) = slot.handle {
            effects.push(Effect::Destroy(handle));
        }
        effects.push(Effect::Status {
            bus_id,
            status: DisplayStatus::from(reason),
        });
        effects.push(Effect::Event(LifecycleEvent::Closed { bus_id, reason }));
        effects.extend(promote_locked(state));
        effects.extend(recompute_positions_locked(state));
        true
    } else if let Some(idx) = state.pending.iter().position(|p| p.bus_id == bus_id) {
        state.pending.remove(idx);
        effects.push(Effect::Status {
            bus_id,
            status: DisplayStatus::from(reason),
        });
        effects.push(Effect::Event(LifecycleEvent::Closed { bus_id, reason }));
        true
    } else {
        false
    }
}

fn promote_locked(state: &mut State) -> Vec<Effect> {
    let mut effects = Vec::new();
    while state.active.len() < state.config.max_visible && !state.pending.is_empty() {
        let entry = state.pending.remove(0);
        debug!(bus_id = entry.bus_id, "promoting queued notification");
        effects.extend(admit_locked(
            state,
            entry.bus_id,
            entry.request,
            Some(entry.correlation),
        ));
    }
    effects
}

/// Full re-sort by original creation time, so older slots keep the upper
/// positions regardless of when promotions happened.
fn recompute_positions_locked(state: &mut State) -> Vec<Effect> {
    let mut order: Vec<(Instant, u32)> = state
        .active
        .iter()
        .map(|(id, slot)| (slot.created_at, *id))
        .collect();
    order.sort_unstable();

    let mut effects = Vec::new();
    for (position, (_, bus_id)) in order.into_iter().enumerate() {
        let slot = state.active.get_mut(&bus_id).expect("slot present");
        if slot.position != position {
            slot.position = position;
            if let Some(handle) = slot.handle {
                effects.push(Effect::Position { handle, position });
            }
        }
    }
    effects
}

/// Drains protocol-layer commands into the scheduler. Runs on its own task so
/// `Notify` handlers never block on scheduling work.
pub async fn run_dispatch(scheduler: Arc<Scheduler>, commands: flume::Receiver<SchedulerCommand>) {
    while let Ok(command) = commands.recv_async().await {
        match command {
            SchedulerCommand::Show { bus_id, request } => scheduler.show(bus_id, request),
            SchedulerCommand::Close { bus_id, reason } => scheduler.close(bus_id, reason),
        }
    }
    debug!("scheduler dispatch stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TimeoutTable;
    use crate::notification::Hints;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[derive(Debug, PartialEq, Eq)]
    enum RenderOp {
        Create(u32),
        Destroy(u64),
        StackCount(u64, u32),
        Position(u64, usize),
    }

    #[derive(Default)]
    struct MockRenderer {
        next: AtomicU64,
        ops: Mutex<Vec<RenderOp>>,
    }

    impl MockRenderer {
        fn ops(&self) -> Vec<RenderOp> {
            std::mem::take(&mut *self.ops.lock().unwrap())
        }

        fn destroy_count(&self) -> usize {
            self.ops
                .lock()
                .unwrap()
                .iter()
                .filter(|op| matches!(op, RenderOp::Destroy(_)))
                .count()
        }
    }

    impl Renderer for MockRenderer {
        fn create(&self, view: &SlotView<'_>) -> RenderHandle {
            self.ops.lock().unwrap().push(RenderOp::Create(view.bus_id));
            RenderHandle::new(self.next.fetch_add(1, Ordering::Relaxed))
        }

        fn destroy(&self, handle: RenderHandle) {
            self.ops.lock().unwrap().push(RenderOp::Destroy(handle.raw()));
        }

        fn update_stack_count(&self, handle: RenderHandle, count: u32) {
            self.ops
                .lock()
                .unwrap()
                .push(RenderOp::StackCount(handle.raw(), count));
        }

        fn update_position(&self, handle: RenderHandle, position: usize) {
            self.ops
                .lock()
                .unwrap()
                .push(RenderOp::Position(handle.raw(), position));
        }
    }

    struct Harness {
        scheduler: Arc<Scheduler>,
        renderer: Arc<MockRenderer>,
        tracker: Arc<NotificationTracker>,
        events: flume::Receiver<LifecycleEvent>,
        timer: flume::Receiver<TimerCmd>,
    }

    impl Harness {
        fn new(config: DisplayConfig) -> Self {
            let renderer = Arc::new(MockRenderer::default());
            let tracker = Arc::new(NotificationTracker::new());
            let (events_tx, events_rx) = flume::unbounded();
            let (timer_tx, timer_rx) = flume::unbounded();
            let scheduler = Arc::new(Scheduler::new(
                renderer.clone(),
                tracker.clone(),
                config,
                events_tx,
                timer_tx,
            ));
            Harness {
                scheduler,
                renderer,
                tracker,
                events: events_rx,
                timer: timer_rx,
            }
        }

        fn config(max_visible: usize, stacking: bool) -> DisplayConfig {
            DisplayConfig {
                max_visible,
                stacking,
                timeouts_ms: TimeoutTable {
                    low: 5_000,
                    normal: 10_000,
                    critical: 0,
                },
            }
        }

        fn drain_events(&self) -> Vec<LifecycleEvent> {
            self.events.try_iter().collect()
        }
    }

    fn normal(app: &str, summary: &str) -> NotificationRequest {
        NotificationRequest::new(app, summary, "body")
    }

    fn critical(app: &str, summary: &str) -> NotificationRequest {
        NotificationRequest::new(app, summary, "body")
            .with_hints(Hints::default().with_urgency(Urgency::Critical))
    }

    #[test]
    fn test_admission_under_limit() {
        let h = Harness::new(Harness::config(2, true));
        h.scheduler.show(1, normal("a", "one"));
        h.scheduler.show(2, normal("b", "two"));
        assert_eq!(h.scheduler.active_ids(), vec![1, 2]);
        assert!(h.scheduler.pending_ids().is_empty());
        assert_eq!(h.tracker.active_count(), 2);
        assert!(h.drain_events().is_empty());
    }

    #[test]
    fn test_active_count_never_exceeds_max_visible() {
        let h = Harness::new(Harness::config(3, false));
        for id in 1..=10 {
            h.scheduler.show(id, normal("app", &format!("n{id}")));
            assert!(h.scheduler.active_count() <= 3);
        }
        assert_eq!(h.scheduler.active_count(), 3);
        assert_eq!(h.scheduler.pending_ids().len(), 7);
    }

    #[test]
    fn test_scenario_critical_preempts_lowest_urgency() {
        let h = Harness::new(Harness::config(2, true));
        h.scheduler.show(1, normal("a", "one"));
        h.scheduler.show(2, normal("b", "two"));
        h.scheduler.show(3, critical("c", "three"));

        assert_eq!(h.scheduler.active_ids(), vec![2, 3]);
        let events = h.drain_events();
        assert_eq!(
            events,
            vec![LifecycleEvent::Closed {
                bus_id: 1,
                reason: CloseReason::Expired
            }]
        );
        assert_eq!(h.renderer.destroy_count(), 1);
    }

    #[test]
    fn test_critical_queues_when_everything_is_critical() {
        let h = Harness::new(Harness::config(1, true));
        h.scheduler.show(1, critical("a", "one"));
        h.scheduler.show(2, critical("b", "two"));
        assert_eq!(h.scheduler.active_ids(), vec![1]);
        assert_eq!(h.scheduler.pending_ids(), vec![2]);
        assert!(h.drain_events().is_empty());
    }

    #[test]
    fn test_scenario_expiry_promotes_queued_entry() {
        let mut config = Harness::config(1, true);
        config.timeouts_ms.normal = 1;
        let h = Harness::new(config);

        h.scheduler.show(1, normal("a", "one"));
        h.scheduler.show(2, normal("b", "two"));
        assert_eq!(h.scheduler.pending_ids(), vec![2]);

        std::thread::sleep(Duration::from_millis(10));
        h.scheduler.expire(1);

        assert_eq!(h.scheduler.active_ids(), vec![2]);
        assert!(h.scheduler.pending_ids().is_empty());
        let events = h.drain_events();
        assert_eq!(
            events,
            vec![LifecycleEvent::Closed {
                bus_id: 1,
                reason: CloseReason::Expired
            }]
        );
    }

    #[test]
    fn test_expiry_before_deadline_is_a_noop() {
        let h = Harness::new(Harness::config(1, true));
        h.scheduler.show(1, normal("a", "one"));
        h.scheduler.expire(1);
        assert_eq!(h.scheduler.active_ids(), vec![1]);
        assert!(h.drain_events().is_empty());
    }

    #[test]
    fn test_scenario_duplicate_stacks_instead_of_new_slot() {
        let h = Harness::new(Harness::config(3, true));
        h.scheduler.show(1, normal("mail", "inbox"));
        h.renderer.ops();
        h.scheduler.show(4, normal("mail", "inbox"));

        assert_eq!(h.scheduler.active_ids(), vec![1]);
        let events = h.drain_events();
        assert_eq!(
            events,
            vec![LifecycleEvent::Closed {
                bus_id: 4,
                reason: CloseReason::Dismissed
            }]
        );
        let ops = h.renderer.ops();
        assert!(ops.iter().any(|op| matches!(op, RenderOp::StackCount(_, 2))));
        assert!(!ops.iter().any(|op| matches!(op, RenderOp::Create(_))));
        // the stack refresh re-arms the slot's expiry
        assert!(h.timer.try_iter().any(|TimerCmd::Arm { bus_id, .. }| bus_id == 1));
    }

    #[test]
    fn test_replace_that_stacks_closes_out_the_replaced_entry() {
        let h = Harness::new(Harness::config(3, true));
        h.scheduler.show(1, normal("a", "one"));
        h.scheduler.show(2, normal("mail", "inbox"));
        // the replacement's new content duplicates slot 2, so bus id 1 ends
        // up stacked instead of re-admitted
        h.scheduler.show(1, normal("mail", "inbox"));

        assert_eq!(h.scheduler.active_ids(), vec![2]);
        assert_eq!(
            h.drain_events(),
            vec![LifecycleEvent::Closed {
                bus_id: 1,
                reason: CloseReason::Dismissed
            }]
        );
        // the vacated id's tracker entry went terminal with it
        assert_eq!(h.tracker.active_count(), 1);
        assert_eq!(h.tracker.active_notifications()[0].bus_id, 2);
    }

    #[test]
    fn test_stack_refresh_updates_tracked_expiry() {
        let h = Harness::new(Harness::config(3, true));
        h.scheduler.show(1, normal("mail", "inbox"));
        assert!(h.tracker.active_notifications()[0].expires_at.is_some());

        let mut config = Harness::config(3, true);
        config.timeouts_ms.normal = 0;
        h.scheduler.apply_config(config);
        h.scheduler.show(2, normal("mail", "inbox"));

        // the stack reset re-derived the expiry under the new policy
        assert!(h.tracker.active_notifications()[0].expires_at.is_none());
    }

    #[test]
    fn test_stacking_disabled_queues_duplicate() {
        let h = Harness::new(Harness::config(1, false));
        h.scheduler.show(1, normal("mail", "inbox"));
        h.scheduler.show(2, normal("mail", "inbox"));
        assert_eq!(h.scheduler.pending_ids(), vec![2]);
    }

    #[test]
    fn test_transient_duplicate_never_stacks() {
        let h = Harness::new(Harness::config(3, true));
        h.scheduler.show(1, normal("mail", "inbox"));
        h.scheduler.show(
            2,
            normal("mail", "inbox").with_hints(Hints::default().with_transient(true)),
        );
        assert_eq!(h.scheduler.active_ids(), vec![1, 2]);
    }

    #[test]
    fn test_close_is_idempotent() {
        let h = Harness::new(Harness::config(2, true));
        h.scheduler.show(1, normal("a", "one"));
        h.scheduler.close(1, CloseReason::Closed);
        h.scheduler.close(1, CloseReason::Closed);

        let closed: Vec<_> = h
            .drain_events()
            .into_iter()
            .filter(|e| matches!(e, LifecycleEvent::Closed { bus_id: 1, .. }))
            .collect();
        assert_eq!(closed.len(), 1);
        assert_eq!(h.renderer.destroy_count(), 1);
    }

    #[test]
    fn test_equal_urgency_promotes_fifo() {
        let h = Harness::new(Harness::config(1, false));
        h.scheduler.show(1, critical("a", "one"));
        h.scheduler.show(2, normal("b", "two"));
        h.scheduler.show(3, normal("c", "three"));
        h.scheduler.show(4, critical("d", "four"));

        // the critical overtakes the queue but the normals stay FIFO
        assert_eq!(h.scheduler.pending_ids(), vec![4, 2, 3]);

        h.scheduler.close(1, CloseReason::Dismissed);
        assert_eq!(h.scheduler.active_ids(), vec![4]);
        h.scheduler.close(4, CloseReason::Dismissed);
        assert_eq!(h.scheduler.active_ids(), vec![2]);
        h.scheduler.close(2, CloseReason::Dismissed);
        assert_eq!(h.scheduler.active_ids(), vec![3]);
    }

    #[test]
    fn test_replace_active_emits_no_close_signal() {
        let h = Harness::new(Harness::config(2, true));
        h.scheduler.show(1, normal("a", "one"));
        h.scheduler.show(1, normal("a", "updated"));

        assert_eq!(h.scheduler.active_ids(), vec![1]);
        assert!(h.drain_events().is_empty());
        assert_eq!(h.renderer.destroy_count(), 1);
    }

    #[test]
    fn test_replace_pending_entry() {
        let h = Harness::new(Harness::config(1, false));
        h.scheduler.show(1, normal("a", "one"));
        h.scheduler.show(2, normal("b", "two"));
        h.scheduler.show(2, normal("b", "updated"));
        assert_eq!(h.scheduler.pending_ids(), vec![2]);
        assert_eq!(h.scheduler.active_ids(), vec![1]);
    }

    #[test]
    fn test_close_all_drains_active_and_pending() {
        let h = Harness::new(Harness::config(1, false));
        h.scheduler.show(1, normal("a", "one"));
        h.scheduler.show(2, normal("b", "two"));
        h.scheduler.close_all();

        assert!(h.scheduler.active_ids().is_empty());
        assert!(h.scheduler.pending_ids().is_empty());
        let mut closed: Vec<u32> = h
            .drain_events()
            .into_iter()
            .map(|e| match e {
                LifecycleEvent::Closed {
                    bus_id,
                    reason: CloseReason::Dismissed,
                } => bus_id,
                other => panic!("unexpected event {other:?}"),
            })
            .collect();
        closed.sort_unstable();
        assert_eq!(closed, vec![1, 2]);
        assert_eq!(h.tracker.active_count(), 0);
    }

    #[test]
    fn test_close_by_correlation_id_uses_index() {
        let h = Harness::new(Harness::config(2, true));
        h.scheduler.show(1, normal("a", "one"));
        let correlation = h.tracker.get_by_bus_id(1).unwrap();
        h.scheduler
            .close_by_correlation_id(&correlation, CloseReason::Dismissed);
        assert!(h.scheduler.active_ids().is_empty());

        // unknown correlation ids are a silent no-op
        h.scheduler.close_by_correlation_id("missing", CloseReason::Dismissed);
    }

    #[test]
    fn test_hover_pause_blocks_expiry_and_leave_resets_it() {
        let mut config = Harness::config(1, true);
        config.timeouts_ms.normal = 1;
        let h = Harness::new(config);

        h.scheduler.show(1, normal("a", "one"));
        h.scheduler.hover_start(1);
        std::thread::sleep(Duration::from_millis(10));
        h.scheduler.expire(1);
        assert_eq!(h.scheduler.active_ids(), vec![1]);

        h.timer.try_iter().count();
        h.scheduler.hover_end(1);
        // leaving re-arms a fresh full timeout and refreshes the tracked expiry
        assert!(h.timer.try_iter().any(|TimerCmd::Arm { bus_id, .. }| bus_id == 1));
        assert!(h.tracker.active_notifications()[0].expires_at.is_some());
        std::thread::sleep(Duration::from_millis(10));
        h.scheduler.expire(1);
        assert!(h.scheduler.active_ids().is_empty());
    }

    #[test]
    fn test_action_on_resident_notification_keeps_it_open() {
        let h = Harness::new(Harness::config(2, true));
        h.scheduler.show(
            1,
            normal("player", "track").with_hints(Hints::default().with_resident(true)),
        );
        h.scheduler.invoke_action(1, "next");

        assert_eq!(h.scheduler.active_ids(), vec![1]);
        assert_eq!(
            h.drain_events(),
            vec![LifecycleEvent::ActionInvoked {
                bus_id: 1,
                action_key: "next".to_string()
            }]
        );
    }

    #[test]
    fn test_action_on_normal_notification_dismisses_after_signal() {
        let h = Harness::new(Harness::config(2, true));
        h.scheduler.show(1, normal("mail", "inbox"));
        h.scheduler.invoke_action(1, "open");

        assert_eq!(
            h.drain_events(),
            vec![
                LifecycleEvent::ActionInvoked {
                    bus_id: 1,
                    action_key: "open".to_string()
                },
                LifecycleEvent::Closed {
                    bus_id: 1,
                    reason: CloseReason::Dismissed
                },
            ]
        );
        assert!(h.scheduler.active_ids().is_empty());
    }

    #[test]
    fn test_config_increase_promotes_immediately() {
        let h = Harness::new(Harness::config(1, false));
        h.scheduler.show(1, normal("a", "one"));
        h.scheduler.show(2, normal("b", "two"));
        h.scheduler.show(3, normal("c", "three"));

        let mut config = Harness::config(3, false);
        config.timeouts_ms = TimeoutTable::default();
        h.scheduler.apply_config(config);

        assert_eq!(h.scheduler.active_ids(), vec![1, 2, 3]);
        assert!(h.scheduler.pending_ids().is_empty());
    }

    #[test]
    fn test_config_decrease_never_evicts() {
        let h = Harness::new(Harness::config(3, false));
        h.scheduler.show(1, normal("a", "one"));
        h.scheduler.show(2, normal("b", "two"));
        h.scheduler.show(3, normal("c", "three"));

        h.scheduler.apply_config(Harness::config(1, false));
        assert_eq!(h.scheduler.active_ids(), vec![1, 2, 3]);

        // but a freed slot is not refilled until under the new limit
        h.scheduler.show(4, normal("d", "four"));
        assert_eq!(h.scheduler.pending_ids(), vec![4]);
        h.scheduler.close(1, CloseReason::Dismissed);
        assert_eq!(h.scheduler.active_ids(), vec![2, 3]);
    }

    #[test]
    fn test_positions_follow_creation_order_after_close() {
        let h = Harness::new(Harness::config(3, false));
        h.scheduler.show(1, normal("a", "one"));
        h.scheduler.show(2, normal("b", "two"));
        h.scheduler.show(3, normal("c", "three"));
        h.renderer.ops();

        h.scheduler.close(2, CloseReason::Dismissed);
        assert_eq!(h.scheduler.active_ids(), vec![1, 3]);
        let ops = h.renderer.ops();
        // slot 3 slid up into position 1
        assert!(ops.iter().any(|op| matches!(op, RenderOp::Position(_, 1))));
    }
}
