use crate::options::ScrollMetrics;
use leptos::prelude::*;

/// Hook for tracking the scroll position of an options list
///
/// Returns a tuple of (on_scroll_handler, metrics_signal, can_scroll_up_signal) where:
/// - `on_scroll_handler`: Event handler to attach to the scrollable element's `on:scroll`
/// - `metrics_signal`: `None` until the first scroll, then the latest position
/// - `can_scroll_up_signal`: RwSignal<bool> indicating if content is scrolled down
pub fn use_scroll_metrics() -> (
    impl Fn(web_sys::Event) + Clone,
    RwSignal<Option<ScrollMetrics>>,
    RwSignal<bool>,
) {
    let metrics_signal = RwSignal::new(None);
    let can_scroll_up_signal = RwSignal::new(false);

    let on_scroll = move |ev: web_sys::Event| {
        let target = event_target::<web_sys::HtmlElement>(&ev);
        let metrics = ScrollMetrics {
            scroll_top: f64::from(target.scroll_top()),
            scroll_height: f64::from(target.scroll_height()),
            client_height: f64::from(target.client_height()),
        };

        can_scroll_up_signal.set(metrics.scroll_top > 0.0);
        metrics_signal.set(Some(metrics));
    };

    (on_scroll, metrics_signal, can_scroll_up_signal)
}
