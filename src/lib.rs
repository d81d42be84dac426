pub mod api;
pub mod app;
mod components;
pub mod config;
pub mod loader;
pub mod models;
pub mod notify;
pub mod options;
pub mod pages;
pub mod pagination;
pub mod reactive;
mod state;
pub mod storage;
pub mod tasks;
pub mod timer;

pub use app::App;

// Needed for `#[wasm_bindgen(start)]` on the wasm entrypoint.
#[cfg(all(target_arch = "wasm32", not(test)))]
use wasm_bindgen::prelude::wasm_bindgen;

// WASM-only tests (run with `cargo test --target wasm32-unknown-unknown` + wasm-bindgen-test-runner)
#[cfg(all(test, target_arch = "wasm32"))]
mod wasm_tests {
    use crate::api::ApiClient;
    use crate::notify::NotificationCenter;
    use crate::storage::{BrowserStorage, KeyValueStore, TOKEN_KEY};
    use crate::tasks::{TaskRecord, TaskTracker, TASKS_KEY};
    use crate::timer::ManualScheduler;
    use std::rc::Rc;
    use wasm_bindgen_test::*;

    wasm_bindgen_test_configure!(run_in_browser);

    #[wasm_bindgen_test]
    fn test_api_client_token_from_local_storage() {
        let store = BrowserStorage;
        store.remove(TOKEN_KEY).unwrap();
        assert!(!ApiClient::load_from_storage(&store).is_authenticated());

        store.set(TOKEN_KEY, "t1").unwrap();
        assert!(ApiClient::load_from_storage(&store).is_authenticated());

        store.remove(TOKEN_KEY).unwrap();
    }

    #[wasm_bindgen_test]
    fn test_history_and_tasks_survive_reload() {
        let store: Rc<BrowserStorage> = Rc::new(BrowserStorage);
        let scheduler = Rc::new(ManualScheduler::new());
        store.remove(TASKS_KEY).unwrap();

        let center = NotificationCenter::new(store.clone(), scheduler.clone(), 3000);
        center.clear_history();
        center.push("Saved");
        let tracker = TaskTracker::new(
            ApiClient::new("http://localhost:8000"),
            store.clone(),
            center.clone(),
        );
        tracker.enqueue(TaskRecord::new("sync-minio-storages", "run-1"));

        let center = NotificationCenter::new(store.clone(), scheduler, 3000);
        let tracker = TaskTracker::new(ApiClient::new("http://localhost:8000"), store, center.clone());
        assert_eq!(center.history()[0].detail, "Saved");
        assert_eq!(tracker.pending()[0].run_id, "run-1");

        center.clear_history();
        BrowserStorage.remove(TASKS_KEY).unwrap();
    }
}

// Only register the WASM start function for normal builds (not for tests),
// otherwise wasm-bindgen-test will end up with multiple entry symbols.
#[cfg_attr(all(target_arch = "wasm32", not(test)), wasm_bindgen(start))]
pub fn main() {
    console_error_panic_hook::set_once();
    #[cfg(target_arch = "wasm32")]
    tracing_wasm::set_as_global_default();

    app::init(app::Services::from_env());
    leptos::mount::mount_to_body(App);
}
