//! D-Bus protocol surface.
//!
//! Implements the `org.freedesktop.Notifications` interface (spec version
//! 1.2). Method bodies do no scheduling work of their own: `Notify` and
//! `CloseNotification` validate, allocate ids and hand off over a channel,
//! returning immediately. A separate emitter task turns scheduler lifecycle
//! events back into `NotificationClosed` / `ActionInvoked` signals.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info, warn};
use zbus::object_server::SignalContext;
use zbus::zvariant::OwnedValue;
use zbus::{connection, interface};

use crate::errors::{DaemonError, DaemonResult};
use crate::notification::{CloseReason, NotificationRequest};
use crate::scheduler::{LifecycleEvent, SchedulerCommand};

pub const BUS_NAME: &str = "org.freedesktop.Notifications";
pub const OBJECT_PATH: &str = "/org/freedesktop/Notifications";
pub const SPEC_VERSION: &str = "1.2";

const CAPABILITIES: &[&str] = &[
    "actions",
    "body",
    "body-hyperlinks",
    "body-images",
    "body-markup",
    "icon-static",
    "persistence",
    "sound",
];

/// The bus-exposed notification service.
pub struct NotificationServer {
    next_id: u32,
    /// Ids handed out and not yet reported closed; gates the idempotent
    /// no-op behavior of `CloseNotification`.
    live: HashSet<u32>,
    commands: flume::Sender<SchedulerCommand>,
}

impl NotificationServer {
    pub fn new(commands: flume::Sender<SchedulerCommand>) -> Self {
        NotificationServer {
            next_id: 0,
            live: HashSet::new(),
            commands,
        }
    }

    /// Monotonic, process-lifetime-unique; skips 0, which the wire protocol
    /// reserves for "no id".
    fn allocate_id(&mut self) -> u32 {
        self.next_id = self.next_id.wrapping_add(1);
        if self.next_id == 0 {
            self.next_id = 1;
        }
        self.next_id
    }

    /// Called by the emitter once a closure signal for `id` went out.
    pub fn release_id(&mut self, id: u32) {
        self.live.remove(&id);
    }
}

#[interface(name = "org.freedesktop.Notifications")]
impl NotificationServer {
    fn get_capabilities(&self) -> Vec<String> {
        CAPABILITIES.iter().map(|s| s.to_string()).collect()
    }

    fn get_server_information(&self) -> (String, String, String, String) {
        (
            "toastd".to_string(),
            "toastd".to_string(),
            env!("CARGO_PKG_VERSION").to_string(),
            SPEC_VERSION.to_string(),
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn notify(
        &mut self,
        app_name: String,
        replaces_id: u32,
        app_icon: String,
        summary: String,
        body: String,
        actions: Vec<String>,
        hints: HashMap<String, OwnedValue>,
        expire_timeout: i32,
    ) -> u32 {
        let id = if replaces_id > 0 {
            replaces_id
        } else {
            self.allocate_id()
        };
        self.live.insert(id);

        let request = NotificationRequest::from_wire(
            app_name,
            app_icon,
            summary,
            body,
            actions,
            &hints,
            expire_timeout,
        );
        debug!(
            id,
            app = %request.app_name(),
            urgency = ?request.urgency(),
            replaces = replaces_id,
            "notification received"
        );
        let _ = self.commands.send(SchedulerCommand::Show { bus_id: id, request });
        id
    }

    fn close_notification(&mut self, id: u32) {
        if self.live.contains(&id) {
            let _ = self.commands.send(SchedulerCommand::Close {
                bus_id: id,
                reason: CloseReason::Closed,
            });
        } else {
            debug!(id, "close for unknown id ignored");
        }
    }

    #[zbus(signal)]
    async fn notification_closed(ctxt: &SignalContext<'_>, id: u32, reason: u32)
        -> zbus::Result<()>;

    #[zbus(signal)]
    async fn action_invoked(ctxt: &SignalContext<'_>, id: u32, action_key: String)
        -> zbus::Result<()>;
}

/// Claims the well-known name and serves the interface. A claim failure
/// means another daemon owns notifications; that is fatal and not retried.
pub async fn connect(commands: flume::Sender<SchedulerCommand>) -> DaemonResult<zbus::Connection> {
    let server = NotificationServer::new(commands);
    let connection = connection::Builder::session()?
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, server)?
        .build()
        .await
        .map_err(|source| DaemonError::BusClaim {
            name: BUS_NAME.to_string(),
            source,
        })?;
    info!("claimed {BUS_NAME} on the session bus");
    Ok(connection)
}

/// Drains scheduler lifecycle events into bus signals. Emission failures are
/// logged and dropped: internal state has already advanced, so a lost signal
/// never desynchronizes the daemon.
pub async fn run_signal_emitter(
    connection: zbus::Connection,
    events: flume::Receiver<LifecycleEvent>,
) -> DaemonResult<()> {
    let iface = connection
        .object_server()
        .interface::<_, NotificationServer>(OBJECT_PATH)
        .await?;

    while let Ok(event) = events.recv_async().await {
        match event {
            LifecycleEvent::Closed { bus_id, reason } => {
                iface.get_mut().await.release_id(bus_id);
                debug!(bus_id, ?reason, "notification closed");
                if let Err(e) = NotificationServer::notification_closed(
                    iface.signal_context(),
                    bus_id,
                    reason.code(),
                )
                .await
                {
                    warn!(bus_id, "failed to emit NotificationClosed: {e}");
                }
            }
            LifecycleEvent::ActionInvoked { bus_id, action_key } => {
                if let Err(e) = NotificationServer::action_invoked(
                    iface.signal_context(),
                    bus_id,
                    action_key.clone(),
                )
                .await
                {
                    warn!(bus_id, action_key, "failed to emit ActionInvoked: {e}");
                }
            }
        }
    }
    debug!("signal emitter stopped");
    Ok(())
}
