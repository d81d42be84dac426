use crate::api::ApiClient;
use crate::app::Services;
use crate::config::SyncConfig;
use crate::notify::Message;
use crate::reactive::{mirror_messages, mirror_tasks};
use crate::tasks::TaskRecord;
use leptos::prelude::*;

/// Signals views render from. The engines themselves live in `app::services()`.
#[derive(Clone)]
pub(crate) struct AppState {
    pub api_client: RwSignal<ApiClient>,

    /// Toasts on screen, mirrored from the notification center.
    pub messages: RwSignal<Vec<Message>>,
    pub message_history: RwSignal<Vec<Message>>,

    /// Runs still being polled.
    pub running_tasks: RwSignal<Vec<TaskRecord>>,

    pub config: SyncConfig,
}

impl AppState {
    pub fn new(services: &Services) -> Self {
        let mirrored = mirror_messages(&services.messages);
        Self {
            api_client: RwSignal::new(services.api.clone()),
            messages: mirrored.queue,
            message_history: mirrored.history,
            running_tasks: mirror_tasks(&services.tasks),
            config: services.config.clone(),
        }
    }
}

#[derive(Clone)]
pub(crate) struct AppContext(pub AppState);
