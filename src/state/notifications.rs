//! Notification list as an explicit state machine.
//!
//! DESIGN
//! ======
//! `reduce` is a pure transition over tagged actions; `NotificationStore`
//! only serializes access to the current state. Arrival of new alerts is an
//! external concern (see `services::feed`).

use std::sync::{Mutex, MutexGuard, PoisonError};

use uuid::Uuid;

use crate::models::{Notification, NotificationKind};

#[cfg(test)]
#[path = "notifications_test.rs"]
mod notifications_test;

/// Oldest entries beyond this are dropped.
pub const MAX_NOTIFICATIONS: usize = 50;

#[derive(Debug, Clone)]
pub enum NotificationAction {
    /// Prepend a new alert.
    Push(Notification),
    MarkRead(Uuid),
    MarkAllRead,
    Remove(Uuid),
    Clear,
}

/// Newest-first list of alerts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationState {
    pub items: Vec<Notification>,
}

impl NotificationState {
    #[must_use]
    pub fn unread_count(&self) -> usize {
        self.items.iter().filter(|n| !n.read).count()
    }
}

/// Apply one action. Unknown ids leave the state unchanged.
#[must_use]
pub fn reduce(state: NotificationState, action: NotificationAction) -> NotificationState {
    let mut items = state.items;
    match action {
        NotificationAction::Push(notification) => {
            items.retain(|n| n.id != notification.id);
            items.insert(0, notification);
            items.truncate(MAX_NOTIFICATIONS);
        }
        NotificationAction::MarkRead(id) => {
            if let Some(n) = items.iter_mut().find(|n| n.id == id) {
                n.read = true;
            }
        }
        NotificationAction::MarkAllRead => {
            for n in &mut items {
                n.read = true;
            }
        }
        NotificationAction::Remove(id) => items.retain(|n| n.id != id),
        NotificationAction::Clear => items.clear(),
    }
    NotificationState { items }
}

#[derive(Debug, Default)]
pub struct NotificationStore {
    state: Mutex<NotificationState>,
}

impl NotificationStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, NotificationState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn dispatch(&self, action: NotificationAction) {
        let mut state = self.state();
        let current = std::mem::take(&mut *state);
        *state = reduce(current, action);
    }

    /// Build and push an alert, returning its id.
    pub fn add(&self, kind: NotificationKind, title: &str, message: &str, link: Option<&str>) -> Uuid {
        let mut notification = Notification::new(kind, title, message);
        notification.link = link.map(str::to_owned);
        let id = notification.id;
        self.dispatch(NotificationAction::Push(notification));
        id
    }

    pub fn mark_as_read(&self, id: Uuid) {
        self.dispatch(NotificationAction::MarkRead(id));
    }

    pub fn mark_all_as_read(&self) {
        self.dispatch(NotificationAction::MarkAllRead);
    }

    pub fn remove(&self, id: Uuid) {
        self.dispatch(NotificationAction::Remove(id));
    }

    pub fn clear(&self) {
        self.dispatch(NotificationAction::Clear);
    }

    #[must_use]
    pub fn snapshot(&self) -> NotificationState {
        self.state().clone()
    }

    #[must_use]
    pub fn unread_count(&self) -> usize {
        self.state().unread_count()
    }

    /// Alerts addressed to `user_id` plus broadcast alerts with no owner.
    #[must_use]
    pub fn for_user(&self, user_id: Uuid) -> Vec<Notification> {
        self.state()
            .items
            .iter()
            .filter(|n| n.user_id.is_none_or(|owner| owner == user_id))
            .cloned()
            .collect()
    }
}
