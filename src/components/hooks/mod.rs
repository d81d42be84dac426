pub mod use_scroll_metrics;
