//! Last-known relay state, published by the control loops.
//!
//! In-process readers get a `watch` receiver per actuator. The same value is
//! mirrored into the `actuator_status` table for readers in other processes
//! (the dashboard); a mirror failure is logged and never affects the
//! in-process value.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use crate::db::Db;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActuatorKind {
    Light,
    Pump,
}

impl ActuatorKind {
    pub const ALL: [Self; 2] = [Self::Light, Self::Pump];

    /// Status key seen by external readers.
    pub fn name(self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Pump => "pump",
        }
    }
}

impl fmt::Display for ActuatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RelayState {
    On,
    #[default]
    Off,
}

impl RelayState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::On => "ON",
            Self::Off => "OFF",
        }
    }

    pub fn is_on(self) -> bool {
        self == Self::On
    }
}

impl From<bool> for RelayState {
    fn from(energized: bool) -> Self {
        if energized {
            Self::On
        } else {
            Self::Off
        }
    }
}

impl FromStr for RelayState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ON" => Ok(Self::On),
            "OFF" => Ok(Self::Off),
            other => Err(format!("unknown relay state {other:?}")),
        }
    }
}

impl fmt::Display for RelayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A published value and when it was published. `updated_at` is `None`
/// until the first publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PublishedStatus {
    pub state: RelayState,
    pub updated_at: Option<DateTime<Utc>>,
}

struct Inner {
    light: watch::Sender<PublishedStatus>,
    pump: watch::Sender<PublishedStatus>,
    mirror: Option<Db>,
}

/// Cheap to clone; all clones publish to the same channels.
#[derive(Clone)]
pub struct StatusChannel {
    inner: Arc<Inner>,
}

impl StatusChannel {
    /// In-process only.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Also mirror every publish into `db`.
    pub fn with_mirror(db: Db) -> Self {
        Self::build(Some(db))
    }

    fn build(mirror: Option<Db>) -> Self {
        let (light, _) = watch::channel(PublishedStatus::default());
        let (pump, _) = watch::channel(PublishedStatus::default());
        Self {
            inner: Arc::new(Inner {
                light,
                pump,
                mirror,
            }),
        }
    }

    fn sender(&self, kind: ActuatorKind) -> &watch::Sender<PublishedStatus> {
        match kind {
            ActuatorKind::Light => &self.inner.light,
            ActuatorKind::Pump => &self.inner.pump,
        }
    }

    fn publish_local(&self, kind: ActuatorKind, state: RelayState) -> DateTime<Utc> {
        let now = Utc::now();
        self.sender(kind).send_replace(PublishedStatus {
            state,
            updated_at: Some(now),
        });
        tracing::debug!(actuator = %kind, %state, "status published");
        now
    }

    /// Record `state` for `kind`, stamped now.
    pub async fn publish(&self, kind: ActuatorKind, state: RelayState) {
        let now = self.publish_local(kind, state);
        if let Some(db) = &self.inner.mirror {
            mirror(db, kind, state, now).await;
        }
    }

    /// Like [`StatusChannel::publish`] but callable from sync code such as a
    /// `Drop` impl. The in-process value is updated before returning; the
    /// mirror write is spawned when a runtime is available.
    pub fn publish_detached(&self, kind: ActuatorKind, state: RelayState) {
        let now = self.publish_local(kind, state);
        let Some(db) = self.inner.mirror.clone() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { mirror(&db, kind, state, now).await });
            }
            Err(_) => {
                tracing::warn!(actuator = %kind, %state, "no runtime, status mirror not updated");
            }
        }
    }

    /// Last published state; `OFF` before the first publish.
    pub fn read(&self, kind: ActuatorKind) -> RelayState {
        self.sender(kind).borrow().state
    }

    pub fn status(&self, kind: ActuatorKind) -> PublishedStatus {
        *self.sender(kind).borrow()
    }

    pub fn subscribe(&self, kind: ActuatorKind) -> watch::Receiver<PublishedStatus> {
        self.sender(kind).subscribe()
    }
}

impl Default for StatusChannel {
    fn default() -> Self {
        Self::new()
    }
}

async fn mirror(db: &Db, kind: ActuatorKind, state: RelayState, at: DateTime<Utc>) {
    if let Err(e) = db.upsert_status(kind.name(), state, at).await {
        tracing::error!(actuator = %kind, %state, error = %e, "status mirror write failed");
    }
}

// ===========================================================================
// Tests
// ===========================================================================
