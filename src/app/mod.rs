use crate::api::ApiClient;
use crate::config::SyncConfig;
use crate::notify::NotificationCenter;
use crate::pages::{GalleryPage, MessageHistoryPage, NavBar, TagPage, ToastHost, VideoPage};
use crate::state::{AppContext, AppState};
use crate::storage::{default_store, SharedStore};
use crate::tasks::TaskTracker;
use crate::timer::{default_scheduler, SharedScheduler, TimerHandle};
use leptos::prelude::*;
use leptos_router::components::{Redirect, Route, Router, Routes};
use leptos_router::path;
use std::cell::RefCell;

/// The process-wide sync engines. Cloning shares them.
#[derive(Clone)]
pub struct Services {
    pub api: ApiClient,
    pub messages: NotificationCenter,
    pub tasks: TaskTracker<ApiClient>,
    pub config: SyncConfig,
    pub store: SharedStore,
    pub scheduler: SharedScheduler,
}

impl Services {
    pub fn new(
        api: ApiClient,
        store: SharedStore,
        scheduler: SharedScheduler,
        config: SyncConfig,
    ) -> Self {
        let messages =
            NotificationCenter::new(store.clone(), scheduler.clone(), config.message_ttl_ms);
        let tasks = TaskTracker::new(api.clone(), store.clone(), messages.clone());
        Self {
            api,
            messages,
            tasks,
            config,
            store,
            scheduler,
        }
    }

    /// Runtime defaults: `window.ENV`, localStorage and browser timers.
    pub fn from_env() -> Self {
        let store = default_store();
        let api = ApiClient::load_from_storage(store.as_ref());
        Self::new(api, store, default_scheduler(), SyncConfig::from_env())
    }
}

struct Registry {
    services: Services,
    _poller: TimerHandle,
}

thread_local! {
    static SERVICES: RefCell<Option<Registry>> = const { RefCell::new(None) };
}

/// Install `services` and start the task poller.
///
/// Only the first call installs anything; later calls return what is already there.
pub fn init(services: Services) -> Services {
    SERVICES.with(|slot| {
        let mut slot = slot.borrow_mut();
        if let Some(existing) = slot.as_ref() {
            return existing.services.clone();
        }
        let poller = services
            .tasks
            .start(services.scheduler.as_ref(), services.config.poll_interval_ms);
        tracing::info!(pending = services.tasks.len(), "sync services ready");
        *slot = Some(Registry {
            services: services.clone(),
            _poller: poller,
        });
        services
    })
}

/// The installed services, installing `Services::from_env()` on first use.
pub fn services() -> Services {
    let installed = SERVICES.with(|slot| slot.borrow().as_ref().map(|r| r.services.clone()));
    match installed {
        Some(services) => services,
        None => init(Services::from_env()),
    }
}

#[component]
pub fn App() -> impl IntoView {
    provide_context(AppContext(AppState::new(&services())));

    // Router hooks (`use_location`) need the <Router> context.
    view! {
        <Router>
            <NavBar />
            <ToastHost />
            <Routes fallback=|| view! { <div class="px-4 py-8 text-xs text-muted-foreground">"Not found"</div> }>
                <Route path=path!("gallery") view=GalleryPage />
                <Route path=path!("gallery/search") view=GalleryPage />
                <Route path=path!("video") view=VideoPage />
                <Route path=path!("video/search") view=VideoPage />
                <Route path=path!("tag") view=TagPage />
                <Route path=path!("messages") view=MessageHistoryPage />
                <Route path=path!("") view=|| view! { <Redirect path="/gallery" /> } />
            </Routes>
        </Router>
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::timer::ManualScheduler;
    use std::rc::Rc;

    fn memory_services() -> Services {
        Services::new(
            ApiClient::new("http://localhost:8000"),
            Rc::new(MemoryStore::new()),
            Rc::new(ManualScheduler::new()),
            SyncConfig::default(),
        )
    }

    #[test]
    fn test_services_share_one_notification_center() {
        let services = memory_services();
        let copy = services.clone();
        copy.messages.push("Saved");
        assert_eq!(services.messages.queue().len(), 1);
        assert_eq!(services.messages.history()[0].detail, "Saved");
    }

    #[test]
    fn test_init_is_idempotent() {
        let first = init(memory_services());
        first.messages.push("first");

        let second = init(memory_services());
        assert_eq!(second.messages.history().len(), 1);
        assert_eq!(services().messages.history()[0].detail, "first");
    }

    #[test]
    fn test_init_arms_the_poller() {
        let scheduler = Rc::new(ManualScheduler::new());
        let services = Services::new(
            ApiClient::new("http://localhost:8000"),
            Rc::new(MemoryStore::new()),
            scheduler.clone(),
            SyncConfig::default(),
        );
        init(services);
        assert_eq!(scheduler.pending(), 1);

        // Already installed: no second interval.
        init(memory_services());
        assert_eq!(scheduler.pending(), 1);
    }
}
