//! toastd core library.
//!
//! The daemon's two halves: the `org.freedesktop.Notifications` D-Bus
//! surface, and a presentation scheduler that decides which notifications
//! occupy the bounded set of visible slots. Rendering is abstracted behind
//! the [`render::Renderer`] capability.

pub mod config;
pub mod errors;
pub mod notification;
pub mod protocol;
pub mod render;
pub mod scheduler;
pub mod tracker;

// Re-export commonly used types for convenience
pub use config::{Config, ConfigManager, DisplayConfig};
pub use errors::{DaemonError, DaemonResult};
pub use notification::{CloseReason, NotificationRequest, Urgency};
pub use render::{LogRenderer, RenderHandle, Renderer};
pub use scheduler::{LifecycleEvent, Scheduler, SchedulerCommand};
pub use tracker::{DisplayStatus, NotificationTracker};
