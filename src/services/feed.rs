//! Simulated notification push.
//!
//! DESIGN
//! ======
//! A background task ticks on a fixed interval and asks a
//! [`NotificationSource`] for at most one new alert per tick. The source is
//! injectable so tests can script arrivals. The task lives until its
//! [`NotificationPoller`] handle is stopped or dropped.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::Rng;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::models::{Notification, NotificationKind};
use crate::state::notifications::{NotificationAction, NotificationStore};

#[cfg(test)]
#[path = "feed_test.rs"]
mod tests;

/// External event source for new alerts.
pub trait NotificationSource: Send + Sync {
    /// Next pending alert, if any.
    fn next(&self) -> Option<Notification>;
}

const CATALOGUE: &[(NotificationKind, &str, &str, Option<&str>)] = &[
    (
        NotificationKind::Info,
        "Nouveau projet",
        "Un nouveau projet de construction correspond à votre profil",
        Some("/projects"),
    ),
    (
        NotificationKind::Success,
        "Devis accepté",
        "Votre devis a été accepté par le client",
        Some("/dashboard"),
    ),
    (
        NotificationKind::Info,
        "Nouveau message",
        "Vous avez reçu un nouveau message",
        Some("/messages"),
    ),
    (
        NotificationKind::Warning,
        "Paiement en attente",
        "Un paiement est en attente de confirmation",
        Some("/payments"),
    ),
    (
        NotificationKind::Success,
        "Commande expédiée",
        "Votre commande de matériaux a été expédiée",
        Some("/marketplace/orders"),
    ),
];

/// Random alerts drawn from a fixed catalogue.
#[derive(Debug, Clone, Copy)]
pub struct SimulatedPush {
    probability: f64,
}

impl SimulatedPush {
    /// `probability` is the chance that one call to `next` yields an alert.
    #[must_use]
    pub fn new(probability: f64) -> Self {
        let probability = if probability.is_finite() { probability.clamp(0.0, 1.0) } else { 0.0 };
        Self { probability }
    }
}

impl NotificationSource for SimulatedPush {
    fn next(&self) -> Option<Notification> {
        let mut rng = rand::rng();
        if !rng.random_bool(self.probability) {
            return None;
        }
        let (kind, title, message, link) = CATALOGUE[rng.random_range(0..CATALOGUE.len())];
        let notification = Notification::new(kind, title, message);
        Some(match link {
            Some(link) => notification.with_link(link),
            None => notification,
        })
    }
}

/// Source that replays a fixed queue. Handy for demos and tests.
#[derive(Debug, Default)]
pub struct ScriptedSource {
    queue: Mutex<std::collections::VecDeque<Notification>>,
}

impl ScriptedSource {
    #[must_use]
    pub fn new(items: impl IntoIterator<Item = Notification>) -> Self {
        Self { queue: Mutex::new(items.into_iter().collect()) }
    }
}

impl NotificationSource for ScriptedSource {
    fn next(&self) -> Option<Notification> {
        self.queue.lock().ok().and_then(|mut q| q.pop_front())
    }
}

/// Move at most one alert from `source` into `store`. Returns whether one
/// arrived.
pub fn poll_once(store: &NotificationStore, source: &dyn NotificationSource) -> bool {
    match source.next() {
        Some(notification) => {
            debug!(id = %notification.id, kind = ?notification.kind, "notification received");
            store.dispatch(NotificationAction::Push(notification));
            true
        }
        None => false,
    }
}

/// Handle to the polling task. Dropping it stops the task.
#[derive(Debug)]
pub struct NotificationPoller {
    handle: JoinHandle<()>,
}

impl NotificationPoller {
    pub fn stop(self) {
        drop(self);
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for NotificationPoller {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Spawn the polling task. The first poll happens one `every` after spawn.
#[must_use]
pub fn spawn_notification_poller(
    store: Arc<NotificationStore>,
    source: Arc<dyn NotificationSource>,
    every: Duration,
) -> NotificationPoller {
    let every = every.max(Duration::from_millis(1));
    info!(interval_ms = u64::try_from(every.as_millis()).unwrap_or(u64::MAX), "notification poller started");
    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            poll_once(&store, source.as_ref());
        }
    });
    NotificationPoller { handle }
}
