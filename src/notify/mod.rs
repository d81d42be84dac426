//! Toast queue plus persisted message history.
//!
//! Every push lands in both the display queue (in memory, auto-expiring) and the
//! history (persisted). The two are cleared independently.

use crate::api::{detail_from_value, ApiError};
use crate::storage::{load_json, save_json, SharedStore};
use crate::timer::{SharedScheduler, TimerHandle};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use uuid::Uuid;

pub(crate) const HISTORY_KEY: &str = "zetsubou_message_history";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Message {
    pub id: Uuid,
    pub detail: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    /// Locked messages survive their expiry timer.
    #[serde(default)]
    pub lock: bool,
    pub last_updated: DateTime<Utc>,
}

impl Message {
    fn new(detail: String, link: Option<String>, lock: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            detail,
            link,
            lock,
            last_updated: Utc::now(),
        }
    }
}

struct Inner {
    queue: RefCell<Vec<Message>>,
    history: RefCell<Vec<Message>>,
    timers: RefCell<HashMap<Uuid, TimerHandle>>,
    listeners: RefCell<Vec<Rc<dyn Fn(&NotificationCenter)>>>,
    store: SharedStore,
    scheduler: SharedScheduler,
    ttl_ms: u32,
}

/// Process-scoped notification hub. Cloning shares the same queues.
#[derive(Clone)]
pub struct NotificationCenter {
    inner: Rc<Inner>,
}

impl NotificationCenter {
    /// History is restored from the store; a missing or corrupt copy starts empty.
    pub fn new(store: SharedStore, scheduler: SharedScheduler, ttl_ms: u32) -> Self {
        let history = load_json::<Vec<Message>>(store.as_ref(), HISTORY_KEY).unwrap_or_default();
        Self {
            inner: Rc::new(Inner {
                queue: RefCell::new(Vec::new()),
                history: RefCell::new(history),
                timers: RefCell::new(HashMap::new()),
                listeners: RefCell::new(Vec::new()),
                store,
                scheduler,
                ttl_ms,
            }),
        }
    }

    pub fn push(&self, detail: impl Into<String>) -> Uuid {
        self.push_message(Message::new(detail.into(), None, false))
    }

    pub fn push_with_link(&self, detail: impl Into<String>, link: impl Into<String>) -> Uuid {
        self.push_message(Message::new(detail.into(), Some(link.into()), false))
    }

    /// Push a message that stays until dismissed.
    pub fn push_locked(&self, detail: impl Into<String>) -> Uuid {
        self.push_message(Message::new(detail.into(), None, true))
    }

    /// Surface a gateway error and hand it back, so the caller's own failure path
    /// still runs: `return messages.push_error(e);`
    pub fn push_error<T>(&self, err: ApiError) -> Result<T, ApiError> {
        self.push(err.user_message());
        Err(err)
    }

    /// Same as `push_error` for an arbitrary JSON error payload.
    pub fn push_error_value<T>(
        &self,
        payload: serde_json::Value,
    ) -> Result<T, serde_json::Value> {
        let detail = detail_from_value(&payload).unwrap_or_else(|| match &payload {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        });
        self.push(detail);
        Err(payload)
    }

    fn push_message(&self, message: Message) -> Uuid {
        let id = message.id;
        tracing::debug!(%id, detail = %message.detail, "push message");

        self.inner.queue.borrow_mut().push(message.clone());
        self.inner.history.borrow_mut().push(message);
        self.persist_history();
        self.arm_expiry(id);
        self.notify();
        id
    }

    fn arm_expiry(&self, id: Uuid) {
        let weak: Weak<Inner> = Rc::downgrade(&self.inner);
        let handle = self.inner.scheduler.set_timeout(
            self.inner.ttl_ms,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    NotificationCenter { inner }.expire(id);
                }
            }),
        );
        self.inner.timers.borrow_mut().insert(id, handle);
    }

    fn expire(&self, id: Uuid) {
        self.inner.timers.borrow_mut().remove(&id);
        let removed = {
            let mut queue = self.inner.queue.borrow_mut();
            let before = queue.len();
            queue.retain(|m| m.id != id || m.lock);
            queue.len() != before
        };
        if removed {
            self.notify();
        }
    }

    /// Remove a message from the display queue now. History keeps it.
    pub fn dismiss(&self, id: Uuid) -> bool {
        if let Some(handle) = self.inner.timers.borrow_mut().remove(&id) {
            self.inner.scheduler.clear(handle);
        }
        let removed = {
            let mut queue = self.inner.queue.borrow_mut();
            let before = queue.len();
            queue.retain(|m| m.id != id);
            queue.len() != before
        };
        if removed {
            self.notify();
        }
        removed
    }

    /// Lock or unlock a queued message (e.g. while hovered).
    pub fn set_lock(&self, id: Uuid, lock: bool) -> bool {
        let found = {
            let mut queue = self.inner.queue.borrow_mut();
            match queue.iter_mut().find(|m| m.id == id) {
                Some(m) => {
                    m.lock = lock;
                    m.last_updated = Utc::now();
                    true
                }
                None => false,
            }
        };
        if found {
            self.notify();
        }
        found
    }

    pub fn clear_history(&self) {
        self.inner.history.borrow_mut().clear();
        if let Err(e) = self.inner.store.remove(HISTORY_KEY) {
            tracing::warn!(error = %e, "could not clear persisted message history");
        }
        self.notify();
    }

    pub fn queue(&self) -> Vec<Message> {
        self.inner.queue.borrow().clone()
    }

    pub fn history(&self) -> Vec<Message> {
        self.inner.history.borrow().clone()
    }

    /// Run `f` after every change to the queue or history.
    pub fn subscribe(&self, f: impl Fn(&NotificationCenter) + 'static) {
        self.inner.listeners.borrow_mut().push(Rc::new(f));
    }

    fn notify(&self) {
        let listeners: Vec<Rc<dyn Fn(&NotificationCenter)>> =
            self.inner.listeners.borrow().clone();
        for listener in listeners {
            listener(self);
        }
    }

    fn persist_history(&self) {
        let history = self.inner.history.borrow();
        if let Err(e) = save_json(self.inner.store.as_ref(), HISTORY_KEY, &*history) {
            // The in-memory copy stays authoritative for this session.
            tracing::warn!(error = %e, "could not persist message history");
        }
    }
}
