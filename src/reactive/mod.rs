//! Leptos wiring for the sync engines.
//!
//! The engines are plain `Rc` types; these helpers connect them to signals and
//! effects so views re-render when they change.

use crate::api::PageFetcher;
use crate::loader::{json_source, Producer, RouteLoader, RouteSnapshot};
use crate::notify::{Message, NotificationCenter};
use crate::options::{FieldBinding, OptionSource, OptionState, ScrollMetrics};
use crate::tasks::{TaskRecord, TaskStatusSource, TaskTracker};
use leptos::prelude::*;
use leptos::reactive::owner::LocalStorage;
use leptos::task::spawn_local;
use leptos_router::hooks::use_location;
use serde::Serialize;
use std::cell::RefCell;
use std::rc::Rc;

/// Run the loader's `observe` in an effect.
///
/// The effect tracks every signal its producers read. Several writes in one tick
/// re-run it once, so the load function sees the combined change.
pub fn watch_loader<S: 'static>(loader: RouteLoader<S>) -> Effect<LocalStorage> {
    Effect::new(move |_| {
        loader.observe();
    })
}

/// The current router location. Must be called under a `<Router>`.
pub fn route_source() -> impl Fn() -> Option<RouteSnapshot> + Clone + 'static {
    let location = use_location();
    move || {
        Some(RouteSnapshot::from_path_and_search(
            &location.pathname.get(),
            &location.search.get(),
        ))
    }
}

/// Watch a signal's value.
pub fn signal_source<T>(signal: RwSignal<T>) -> Producer
where
    T: Serialize + Clone + Send + Sync + 'static,
{
    json_source(move || signal.try_get())
}

/// Keep two signals equal. The outer value wins at start.
///
/// A write is forwarded only when it differs from the other side, so the pair
/// settles after one hop.
pub fn bind_two_way<T>(outer: RwSignal<T>, inner: RwSignal<T>)
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    let start = outer.get_untracked();
    if inner.with_untracked(|v| *v != start) {
        inner.set(start.clone());
    }
    let binding = Rc::new(RefCell::new(FieldBinding::new(start)));

    let b = binding.clone();
    Effect::new(move |_| {
        let value = outer.get();
        let forward = b.borrow_mut().push_outer(value);
        if let Some(v) = forward {
            inner.set(v);
        }
    });

    Effect::new(move |_| {
        let value = inner.get();
        let forward = binding.borrow_mut().push_inner(value);
        if let Some(v) = forward {
            outer.set(v);
        }
    });
}

/// Signals mirroring the notification center.
#[derive(Clone, Copy)]
pub struct MessageSignals {
    pub queue: RwSignal<Vec<Message>>,
    pub history: RwSignal<Vec<Message>>,
}

pub fn mirror_messages(center: &NotificationCenter) -> MessageSignals {
    let signals = MessageSignals {
        queue: RwSignal::new(center.queue()),
        history: RwSignal::new(center.history()),
    };
    center.subscribe(move |c| {
        // After the owning scope is disposed the update is dropped.
        let _ = signals.queue.try_set(c.queue());
        let _ = signals.history.try_set(c.history());
    });
    signals
}

pub fn mirror_tasks<S: TaskStatusSource + 'static>(
    tracker: &TaskTracker<S>,
) -> RwSignal<Vec<TaskRecord>> {
    let pending = RwSignal::new(tracker.pending());
    tracker.subscribe(move |queue| {
        let _ = pending.try_set(queue.to_vec());
    });
    pending
}

/// The option source's state as a signal, updated on every change.
pub fn mirror_options<R, F>(source: &OptionSource<R, F>) -> RwSignal<OptionState<R>, LocalStorage>
where
    R: Clone + 'static,
    F: PageFetcher<R> + 'static,
{
    let state = RwSignal::new_local(source.snapshot());
    source.subscribe(move |st| {
        let _ = state.try_set(st.clone());
    });
    state
}

/// Feed scroll positions into an option source, surfacing fetch errors as toasts.
///
/// `metrics` starts out `None` so nothing is fetched before the user scrolls.
pub fn load_more_on_scroll<R, F>(
    source: OptionSource<R, F>,
    metrics: RwSignal<Option<ScrollMetrics>>,
    messages: NotificationCenter,
) -> Effect<LocalStorage>
where
    R: Clone + 'static,
    F: PageFetcher<R> + 'static,
{
    Effect::new(move |_| {
        let Some(m) = metrics.get() else {
            return;
        };
        let (source, messages) = (source.clone(), messages.clone());
        spawn_local(async move {
            if let Err(e) = source.on_scroll_near_end(m).await {
                let _ = messages.push_error::<()>(e);
            }
        });
    })
}
