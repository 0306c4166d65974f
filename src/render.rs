//! Renderer capability boundary.
//!
//! The scheduler owns the visible representation of a notification only
//! through opaque handles; how a popup is actually painted is someone else's
//! problem. Implementations must not block: these calls run on scheduler
//! paths. UI-originated events (clicks, hover, close-all) flow back into the
//! scheduler through its public `dismiss` / `invoke_action` / `hover_start` /
//! `hover_end` / `close_all` methods.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

use crate::notification::NotificationRequest;

/// Opaque handle to one visible popup, owned exclusively by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderHandle(u64);

impl RenderHandle {
    pub fn new(raw: u64) -> Self {
        RenderHandle(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Read-only view of a slot at creation time.
#[derive(Debug)]
pub struct SlotView<'a> {
    pub bus_id: u32,
    pub request: &'a NotificationRequest,
    pub position: usize,
    pub stack_count: u32,
}

/// Capability consumed by the scheduler to manage visible popups.
pub trait Renderer: Send + Sync {
    fn create(&self, view: &SlotView<'_>) -> RenderHandle;
    fn destroy(&self, handle: RenderHandle);
    fn update_stack_count(&self, handle: RenderHandle, count: u32);
    fn update_position(&self, handle: RenderHandle, position: usize);
}

/// Headless renderer that only logs; the default when no compositor frontend
/// is wired in.
#[derive(Default)]
pub struct LogRenderer {
    next_handle: AtomicU64,
}

impl LogRenderer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Renderer for LogRenderer {
    fn create(&self, view: &SlotView<'_>) -> RenderHandle {
        let handle = RenderHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        debug!(
            bus_id = view.bus_id,
            app = %view.request.app_name(),
            summary = %view.request.summary(),
            position = view.position,
            handle = handle.raw(),
            "popup created"
        );
        handle
    }

    fn destroy(&self, handle: RenderHandle) {
        debug!(handle = handle.raw(), "popup destroyed");
    }

    fn update_stack_count(&self, handle: RenderHandle, count: u32) {
        debug!(handle = handle.raw(), count, "popup stack count updated");
    }

    fn update_position(&self, handle: RenderHandle, position: usize) {
        debug!(handle = handle.raw(), position, "popup repositioned");
    }
}
