//! Notification request model.
//!
//! Converts the raw freedesktop `Notify` arguments into an owned, typed
//! request the scheduler can hold onto. The dynamic hint dictionary is read
//! once at the wire boundary through type-checked accessors; unknown keys and
//! wrongly-typed values fall back to documented defaults.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use zbus::zvariant::OwnedValue;

/// Three-level priority driving timeout selection and preemption eligibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Urgency {
    Low = 0,
    Normal = 1,
    Critical = 2,
}

impl Default for Urgency {
    fn default() -> Self {
        Urgency::Normal
    }
}

impl Urgency {
    /// Maps the wire-level urgency byte; out-of-range values read as Normal.
    pub fn from_level(level: u8) -> Self {
        match level {
            0 => Urgency::Low,
            2 => Urgency::Critical,
            _ => Urgency::Normal,
        }
    }
}

/// Close-reason codes of the freedesktop notification spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CloseReason {
    /// The notification timed out or was preemption-evicted.
    Expired = 1,
    /// The user dismissed it (click, action, close-all).
    Dismissed = 2,
    /// A `CloseNotification` call removed it.
    Closed = 3,
    Undefined = 4,
}

impl CloseReason {
    /// Wire representation for the `NotificationClosed` signal.
    pub fn code(self) -> u32 {
        self as u32
    }
}

/// One (key, label) pair from the `actions` array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub key: String,
    pub label: String,
}

/// Requested expiry, from the wire `expire_timeout` argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// Negative on the wire: use the per-urgency default from configuration.
    Default,
    /// Zero on the wire: never expire.
    Never,
    /// Positive on the wire: explicit override in milliseconds.
    Millis(u32),
}

impl Timeout {
    pub fn from_wire(expire_timeout: i32) -> Self {
        match expire_timeout {
            t if t < 0 => Timeout::Default,
            0 => Timeout::Never,
            t => Timeout::Millis(t as u32),
        }
    }
}

/// Typed view over the notification hint dictionary.
///
/// Values are extracted once, at the protocol boundary. Defaults when a hint
/// is absent or carries the wrong type: urgency `Normal`, `resident` false,
/// `transient` false, `suppress-sound` false, string hints `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Hints {
    urgency: Urgency,
    resident: bool,
    transient: bool,
    suppress_sound: bool,
    category: Option<String>,
    desktop_entry: Option<String>,
    image_path: Option<String>,
}

impl Hints {
    pub fn from_wire(raw: &HashMap<String, OwnedValue>) -> Self {
        Hints {
            urgency: hint_byte(raw, "urgency")
                .map(Urgency::from_level)
                .unwrap_or_default(),
            resident: hint_bool(raw, "resident").unwrap_or(false),
            transient: hint_bool(raw, "transient").unwrap_or(false),
            suppress_sound: hint_bool(raw, "suppress-sound").unwrap_or(false),
            category: hint_string(raw, "category"),
            desktop_entry: hint_string(raw, "desktop-entry"),
            image_path: hint_string(raw, "image-path"),
        }
    }

    pub fn urgency(&self) -> Urgency {
        self.urgency
    }

    /// Resident notifications stay open after an action fires.
    pub fn resident(&self) -> bool {
        self.resident
    }

    /// Transient notifications are never coalesced with duplicates.
    pub fn transient(&self) -> bool {
        self.transient
    }

    pub fn suppress_sound(&self) -> bool {
        self.suppress_sound
    }

    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    pub fn desktop_entry(&self) -> Option<&str> {
        self.desktop_entry.as_deref()
    }

    pub fn image_path(&self) -> Option<&str> {
        self.image_path.as_deref()
    }

    pub fn with_urgency(mut self, urgency: Urgency) -> Self {
        self.urgency = urgency;
        self
    }

    pub fn with_resident(mut self, resident: bool) -> Self {
        self.resident = resident;
        self
    }

    pub fn with_transient(mut self, transient: bool) -> Self {
        self.transient = transient;
        self
    }
}

// Some clients send the urgency as a wider integer than the spec's byte.
fn hint_byte(raw: &HashMap<String, OwnedValue>, key: &str) -> Option<u8> {
    let value = raw.get(key)?;
    if let Ok(b) = value.downcast_ref::<u8>() {
        return Some(b);
    }
    value.downcast_ref::<u32>().ok().map(|v| v.min(255) as u8)
}

fn hint_bool(raw: &HashMap<String, OwnedValue>, key: &str) -> Option<bool> {
    raw.get(key).and_then(|v| v.downcast_ref::<bool>().ok())
}

fn hint_string(raw: &HashMap<String, OwnedValue>, key: &str) -> Option<String> {
    raw.get(key)
        .and_then(|v| v.downcast_ref::<&str>().ok())
        .map(ToOwned::to_owned)
}

/// Snapshot of one inbound notification request.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationRequest {
    app_name: String,
    app_icon: String,
    summary: String,
    body: String,
    actions: Vec<Action>,
    hints: Hints,
    timeout: Timeout,
}

impl NotificationRequest {
    pub fn new(app_name: impl Into<String>, summary: impl Into<String>, body: impl Into<String>) -> Self {
        NotificationRequest {
            app_name: app_name.into(),
            app_icon: String::new(),
            summary: summary.into(),
            body: body.into(),
            actions: Vec::new(),
            hints: Hints::default(),
            timeout: Timeout::Default,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn from_wire(
        app_name: String,
        app_icon: String,
        summary: String,
        body: String,
        actions: Vec<String>,
        hints: &HashMap<String, OwnedValue>,
        expire_timeout: i32,
    ) -> Self {
        // Actions arrive as a flat [key, label, key, label, ...] array; a
        // trailing unpaired key is ignored.
        let actions = actions
            .chunks_exact(2)
            .map(|pair| Action {
                key: pair[0].clone(),
                label: pair[1].clone(),
            })
            .collect();

        NotificationRequest {
            app_name,
            app_icon,
            summary,
            body,
            actions,
            hints: Hints::from_wire(hints),
            timeout: Timeout::from_wire(expire_timeout),
        }
    }

    pub fn with_hints(mut self, hints: Hints) -> Self {
        self.hints = hints;
        self
    }

    pub fn with_actions(mut self, actions: Vec<Action>) -> Self {
        self.actions = actions;
        self
    }

    pub fn with_timeout(mut self, timeout: Timeout) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn app_icon(&self) -> &str {
        &self.app_icon
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn hints(&self) -> &Hints {
        &self.hints
    }

    pub fn timeout(&self) -> Timeout {
        self.timeout
    }

    pub fn urgency(&self) -> Urgency {
        self.hints.urgency()
    }

    /// Duplicate detection key: two requests with identical app name,
    /// summary and body coalesce into one visible slot.
    pub fn same_content(&self, other: &NotificationRequest) -> bool {
        self.app_name == other.app_name && self.summary == other.summary && self.body == other.body
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zbus::zvariant::Value;

    fn owned(value: Value<'_>) -> OwnedValue {
        OwnedValue::try_from(value).unwrap()
    }

    #[test]
    fn test_urgency_hint_from_byte() {
        let mut raw = HashMap::new();
        raw.insert("urgency".to_string(), owned(Value::U8(2)));
        assert_eq!(Hints::from_wire(&raw).urgency(), Urgency::Critical);
    }

    #[test]
    fn test_urgency_hint_from_wider_integer() {
        let mut raw = HashMap::new();
        raw.insert("urgency".to_string(), owned(Value::U32(0)));
        assert_eq!(Hints::from_wire(&raw).urgency(), Urgency::Low);
    }

    #[test]
    fn test_hint_defaults_when_absent_or_mistyped() {
        let mut raw = HashMap::new();
        raw.insert("resident".to_string(), owned(Value::Str("yes".into())));
        let hints = Hints::from_wire(&raw);
        assert_eq!(hints.urgency(), Urgency::Normal);
        assert!(!hints.resident());
        assert!(!hints.transient());
        assert_eq!(hints.category(), None);
    }

    #[test]
    fn test_action_pairing_ignores_trailing_key() {
        let request = NotificationRequest::from_wire(
            "mailer".into(),
            String::new(),
            "New mail".into(),
            "3 unread".into(),
            vec!["open".into(), "Open".into(), "dangling".into()],
            &HashMap::new(),
            -1,
        );
        assert_eq!(request.actions().len(), 1);
        assert_eq!(request.actions()[0].key, "open");
        assert_eq!(request.actions()[0].label, "Open");
    }

    #[test]
    fn test_timeout_from_wire() {
        assert_eq!(Timeout::from_wire(-1), Timeout::Default);
        assert_eq!(Timeout::from_wire(0), Timeout::Never);
        assert_eq!(Timeout::from_wire(2500), Timeout::Millis(2500));
    }

    #[test]
    fn test_same_content_ignores_urgency() {
        let a = NotificationRequest::new("app", "s", "b");
        let b = NotificationRequest::new("app", "s", "b")
            .with_hints(Hints::default().with_urgency(Urgency::Critical));
        let c = NotificationRequest::new("app", "s", "other");
        assert!(a.same_content(&b));
        assert!(!a.same_content(&c));
    }

    #[test]
    fn test_close_reason_codes() {
        assert_eq!(CloseReason::Expired.code(), 1);
        assert_eq!(CloseReason::Dismissed.code(), 2);
        assert_eq!(CloseReason::Closed.code(), 3);
        assert_eq!(CloseReason::Undefined.code(), 4);
    }
}
