//! Paged option lists for search dropdowns and tag pickers.
//!
//! An `OptionSource` owns one dropdown's state: the query, the options loaded so far,
//! selected chips and the current selection. Pages are fetched one at a time and
//! results that arrive after a reset are dropped.

mod binding;

pub use binding::FieldBinding;

use crate::api::{ApiResult, PageFetcher, PageQuery};
use crate::config::SyncConfig;
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use strum::IntoEnumIterator;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum OptionValue {
    Number(i64),
    Text(String),
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for OptionValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for OptionValue {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SelectOption<R> {
    pub title: OptionValue,
    pub value: Option<OptionValue>,
    /// The record this option was built from.
    pub raw: Option<R>,
}

impl<R> SelectOption<R> {
    pub fn new(title: impl Into<OptionValue>) -> Self {
        Self {
            title: title.into(),
            value: None,
            raw: None,
        }
    }

    pub fn with_value(mut self, value: impl Into<OptionValue>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_raw(mut self, raw: R) -> Self {
        self.raw = Some(raw);
        self
    }

    /// Options are the same entry when title and value both match.
    pub fn same_key(&self, other: &SelectOption<R>) -> bool {
        self.title == other.title && self.value == other.value
    }
}

/// Build options straight from an enum's variants (title and value are the variant name).
pub fn options_from_enum<E, R>() -> Vec<SelectOption<R>>
where
    E: IntoEnumIterator + AsRef<str>,
{
    E::iter()
        .map(|variant| SelectOption::new(variant.as_ref()).with_value(variant.as_ref()))
        .collect()
}

/// Append candidates whose `(title, value)` is not already present. Returns how many
/// were added.
pub fn accumulate_chips<R>(
    chips: &mut Vec<SelectOption<R>>,
    candidates: impl IntoIterator<Item = SelectOption<R>>,
) -> usize {
    let mut added = 0;
    for candidate in candidates {
        if !chips.iter().any(|c| c.same_key(&candidate)) {
            chips.push(candidate);
            added += 1;
        }
    }
    added
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Accumulation {
    /// Every mapped record is appended.
    #[default]
    Append,
    /// Records whose option is already listed are skipped.
    DedupByKey,
}

/// When a page means there is nothing more to fetch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndOfDataPolicy {
    /// Only an empty page ends the list.
    #[default]
    EmptyPage,
    /// Any page shorter than the page size ends the list.
    ShortPage,
}

impl EndOfDataPolicy {
    pub fn is_end(self, count: usize, page_size: u32) -> bool {
        match self {
            Self::EmptyPage => count == 0,
            Self::ShortPage => count < page_size as usize,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FetchPhase {
    #[default]
    Idle,
    /// A request for `generation` is outstanding.
    Fetching { generation: u64 },
}

impl FetchPhase {
    pub fn is_fetching(&self) -> bool {
        matches!(self, Self::Fetching { .. })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum FetchOutcome {
    /// End of data reached, a fetch already running, or not near the end.
    Skipped,
    Loaded { appended: usize, end_of_data: bool },
    /// A reset happened while the request was out; the page was dropped.
    Stale,
}

/// Scroll position of the options container.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ScrollMetrics {
    pub scroll_top: f64,
    pub scroll_height: f64,
    pub client_height: f64,
}

impl ScrollMetrics {
    pub fn remaining(&self) -> f64 {
        self.scroll_height - self.scroll_top - self.client_height
    }

    pub fn near_end(&self, threshold_px: f64) -> bool {
        self.remaining() <= threshold_px
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct OptionState<R> {
    pub query: PageQuery,
    pub options: Vec<SelectOption<R>>,
    pub chips: Vec<SelectOption<R>>,
    pub end_of_data: bool,
    pub phase: FetchPhase,
    /// Bumped by every reset.
    pub generation: u64,
    pub title: Option<OptionValue>,
    pub selected_value: Option<OptionValue>,
}

impl<R> OptionState<R> {
    fn new(page_size: u32) -> Self {
        Self {
            query: PageQuery::new(page_size),
            options: Vec::new(),
            chips: Vec::new(),
            end_of_data: false,
            phase: FetchPhase::Idle,
            generation: 0,
            title: None,
            selected_value: None,
        }
    }
}

struct Inner<R, F> {
    fetcher: F,
    to_option: Box<dyn Fn(&R) -> SelectOption<R>>,
    state: RefCell<OptionState<R>>,
    accumulation: Cell<Accumulation>,
    end_policy: EndOfDataPolicy,
    scroll_threshold_px: f64,
    listeners: RefCell<Vec<Rc<dyn Fn(&OptionState<R>)>>>,
}

pub struct OptionSource<R, F> {
    inner: Rc<Inner<R, F>>,
}

impl<R, F> Clone for OptionSource<R, F> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<R: Clone + 'static, F: PageFetcher<R>> OptionSource<R, F> {
    pub fn new(
        fetcher: F,
        to_option: impl Fn(&R) -> SelectOption<R> + 'static,
        config: &SyncConfig,
    ) -> Self {
        Self {
            inner: Rc::new(Inner {
                fetcher,
                to_option: Box::new(to_option),
                state: RefCell::new(OptionState::new(config.page_size)),
                accumulation: Cell::new(Accumulation::default()),
                end_policy: config.end_of_data,
                scroll_threshold_px: config.scroll_threshold_px,
                listeners: RefCell::new(Vec::new()),
            }),
        }
    }

    pub fn with_accumulation(self, accumulation: Accumulation) -> Self {
        self.inner.accumulation.set(accumulation);
        self
    }

    pub fn fetcher(&self) -> &F {
        &self.inner.fetcher
    }

    pub fn snapshot(&self) -> OptionState<R> {
        self.inner.state.borrow().clone()
    }

    /// Run `f` with the new state after every change.
    pub fn subscribe(&self, f: impl Fn(&OptionState<R>) + 'static) {
        self.inner.listeners.borrow_mut().push(Rc::new(f));
    }

    fn changed(&self) {
        let listeners: Vec<Rc<dyn Fn(&OptionState<R>)>> = self.inner.listeners.borrow().clone();
        if listeners.is_empty() {
            return;
        }
        let state = self.snapshot();
        for listener in listeners {
            listener(&state);
        }
    }

    pub fn options(&self) -> Vec<SelectOption<R>> {
        self.inner.state.borrow().options.clone()
    }

    pub fn chips(&self) -> Vec<SelectOption<R>> {
        self.inner.state.borrow().chips.clone()
    }

    pub fn page(&self) -> u32 {
        self.inner.state.borrow().query.page
    }

    pub fn end_of_data(&self) -> bool {
        self.inner.state.borrow().end_of_data
    }

    pub fn is_fetching(&self) -> bool {
        self.inner.state.borrow().phase.is_fetching()
    }

    pub fn title(&self) -> Option<OptionValue> {
        self.inner.state.borrow().title.clone()
    }

    pub fn selected_value(&self) -> Option<OptionValue> {
        self.inner.state.borrow().selected_value.clone()
    }

    /// Fetch the current page and add it to the options.
    ///
    /// Does nothing while another fetch is outstanding or once the list is exhausted.
    /// On error nothing is appended and the list is left open for a retry.
    pub async fn fetch_next_page(&self) -> ApiResult<FetchOutcome> {
        let (query, generation) = {
            let mut st = self.inner.state.borrow_mut();
            if st.end_of_data || st.phase.is_fetching() {
                return Ok(FetchOutcome::Skipped);
            }
            let generation = st.generation;
            st.phase = FetchPhase::Fetching { generation };
            (st.query.clone(), generation)
        };
        self.changed();

        tracing::debug!(page = query.page, s = %query.s, "fetch options page");
        let result = self.inner.fetcher.fetch(&query).await;

        let mapped = result.map(|records| {
            let count = records.len();
            let candidates: Vec<SelectOption<R>> =
                records.iter().map(|r| (self.inner.to_option)(r)).collect();
            (count, candidates)
        });

        let outcome = self.apply_page(generation, mapped);
        if !matches!(outcome, Ok(FetchOutcome::Stale)) {
            self.changed();
        }
        outcome
    }

    fn apply_page(
        &self,
        generation: u64,
        mapped: ApiResult<(usize, Vec<SelectOption<R>>)>,
    ) -> ApiResult<FetchOutcome> {
        let mut st = self.inner.state.borrow_mut();
        if st.generation != generation {
            tracing::debug!(generation, current = st.generation, "dropping stale options page");
            return Ok(FetchOutcome::Stale);
        }
        st.phase = FetchPhase::Idle;

        match mapped {
            Ok((count, candidates)) => {
                let appended = match self.inner.accumulation.get() {
                    Accumulation::Append => {
                        let n = candidates.len();
                        st.options.extend(candidates);
                        n
                    }
                    Accumulation::DedupByKey => accumulate_chips(&mut st.options, candidates),
                };
                let end_of_data = self.inner.end_policy.is_end(count, st.query.size);
                st.end_of_data = end_of_data;
                Ok(FetchOutcome::Loaded {
                    appended,
                    end_of_data,
                })
            }
            Err(e) => {
                tracing::warn!(error = %e, page = st.query.page, "options fetch failed");
                st.end_of_data = false;
                Err(e)
            }
        }
    }

    fn reset_paging(st: &mut OptionState<R>) {
        st.query.page = 1;
        st.options.clear();
        st.end_of_data = false;
        st.generation += 1;
        // Any outstanding request now belongs to an old generation.
        st.phase = FetchPhase::Idle;
    }

    /// Start the list over from page 1.
    pub async fn reset_and_fetch_first_page(&self) -> ApiResult<FetchOutcome> {
        Self::reset_paging(&mut self.inner.state.borrow_mut());
        self.fetch_next_page().await
    }

    /// New search text.
    pub async fn set_filter(&self, text: impl Into<String>) -> ApiResult<FetchOutcome> {
        self.inner.state.borrow_mut().query.s = text.into();
        self.reset_and_fetch_first_page().await
    }

    /// Set or remove one extra query constraint (e.g. `category`).
    pub async fn set_constraint(
        &self,
        key: impl Into<String>,
        value: Option<String>,
    ) -> ApiResult<FetchOutcome> {
        {
            let mut st = self.inner.state.borrow_mut();
            let key = key.into();
            match value {
                Some(v) => {
                    st.query.extra.insert(key, v);
                }
                None => {
                    st.query.extra.remove(&key);
                }
            }
        }
        self.reset_and_fetch_first_page().await
    }

    /// Load the next page when the container is scrolled to its end.
    ///
    /// The page number only moves forward when the fetch succeeds.
    pub async fn on_scroll_near_end(&self, metrics: ScrollMetrics) -> ApiResult<FetchOutcome> {
        if !metrics.near_end(self.inner.scroll_threshold_px) {
            return Ok(FetchOutcome::Skipped);
        }
        let generation = {
            let mut st = self.inner.state.borrow_mut();
            if st.end_of_data || st.phase.is_fetching() {
                return Ok(FetchOutcome::Skipped);
            }
            st.query.page += 1;
            st.generation
        };

        let result = self.fetch_next_page().await;
        if result.is_err() {
            let mut st = self.inner.state.borrow_mut();
            if st.generation == generation && st.query.page > 1 {
                st.query.page -= 1;
            }
        }
        result
    }

    pub fn add_chip(&self, option: SelectOption<R>) -> bool {
        let added = accumulate_chips(&mut self.inner.state.borrow_mut().chips, [option]) == 1;
        if added {
            self.changed();
        }
        added
    }

    /// Map records into chips, skipping any already selected.
    pub fn add_chips_from(&self, records: &[R]) -> usize {
        let candidates: Vec<SelectOption<R>> =
            records.iter().map(|r| (self.inner.to_option)(r)).collect();
        let added = accumulate_chips(&mut self.inner.state.borrow_mut().chips, candidates);
        if added > 0 {
            self.changed();
        }
        added
    }

    pub fn remove_chip(&self, option: &SelectOption<R>) -> bool {
        let removed = {
            let mut st = self.inner.state.borrow_mut();
            let before = st.chips.len();
            st.chips.retain(|c| !c.same_key(option));
            st.chips.len() != before
        };
        if removed {
            self.changed();
        }
        removed
    }

    pub fn select(&self, option: &SelectOption<R>) {
        self.set_selection(Some(option.title.clone()), option.value.clone());
    }

    /// Set the selection from a bound outer field. Equal values change nothing.
    pub fn set_selection(&self, title: Option<OptionValue>, value: Option<OptionValue>) {
        {
            let mut st = self.inner.state.borrow_mut();
            if st.title == title && st.selected_value == value {
                return;
            }
            st.title = title;
            st.selected_value = value;
        }
        self.changed();
    }

    /// Drop the current selection only.
    pub fn clear(&self) {
        self.set_selection(None, None);
    }

    /// Everything back to a fresh dropdown. Nothing is fetched.
    pub fn reset(&self) {
        let mut st = self.inner.state.borrow_mut();
        let generation = st.generation + 1;
        *st = OptionState::new(st.query.size);
        st.generation = generation;
        drop(st);
        self.changed();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiError;
    use crate::models::{DagRunState, TagToken};
    use futures::channel::oneshot;
    use futures::executor::{block_on, LocalPool};
    use futures::task::LocalSpawnExt;
    use std::collections::VecDeque;

    fn token(id: i64, name: &str) -> TagToken {
        TagToken {
            id,
            name: name.to_string(),
        }
    }

    fn token_option(t: &TagToken) -> SelectOption<TagToken> {
        SelectOption::new(t.name.as_str())
            .with_value(t.id)
            .with_raw(t.clone())
    }

    fn tokens(range: std::ops::Range<i64>) -> Vec<TagToken> {
        range.map(|i| token(i, &format!("tag{i}"))).collect()
    }

    /// Serves scripted pages and records every query.
    #[derive(Default)]
    struct ScriptedPages {
        pages: RefCell<VecDeque<ApiResult<Vec<TagToken>>>>,
        queries: RefCell<Vec<PageQuery>>,
    }

    impl ScriptedPages {
        fn with(pages: Vec<ApiResult<Vec<TagToken>>>) -> Self {
            Self {
                pages: RefCell::new(pages.into()),
                queries: RefCell::default(),
            }
        }
    }

    impl PageFetcher<TagToken> for ScriptedPages {
        async fn fetch(&self, query: &PageQuery) -> ApiResult<Vec<TagToken>> {
            self.queries.borrow_mut().push(query.clone());
            self.pages.borrow_mut().pop_front().unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    /// Each fetch waits for the next sender the test holds.
    #[derive(Default)]
    struct GatedPages {
        gates: RefCell<VecDeque<oneshot::Receiver<ApiResult<Vec<TagToken>>>>>,
        calls: Cell<usize>,
    }

    impl PageFetcher<TagToken> for GatedPages {
        async fn fetch(&self, _query: &PageQuery) -> ApiResult<Vec<TagToken>> {
            self.calls.set(self.calls.get() + 1);
            let gate = self.gates.borrow_mut().pop_front();
            match gate {
                Some(rx) => rx
                    .await
                    .unwrap_or_else(|_| Err(ApiError::Network("cancelled".to_string()))),
                None => Ok(Vec::new()),
            }
        }
    }

    fn source<F: PageFetcher<TagToken>>(fetcher: F) -> OptionSource<TagToken, F> {
        OptionSource::new(fetcher, token_option, &SyncConfig::default())
    }

    fn at_end() -> ScrollMetrics {
        ScrollMetrics {
            scroll_top: 300.0,
            scroll_height: 500.0,
            client_height: 200.0,
        }
    }

    #[test]
    fn test_double_fetch_is_single_flight() {
        let (tx, rx) = oneshot::channel();
        let fetcher = GatedPages::default();
        fetcher.gates.borrow_mut().push_back(rx);
        let src = source(fetcher);

        let mut pool = LocalPool::new();
        let first = Rc::new(RefCell::new(None));
        {
            let (src, first) = (src.clone(), first.clone());
            pool.spawner()
                .spawn_local(async move {
                    *first.borrow_mut() = Some(src.fetch_next_page().await);
                })
                .unwrap();
        }
        pool.run_until_stalled();
        assert!(src.is_fetching());

        assert_eq!(block_on(src.fetch_next_page()), Ok(FetchOutcome::Skipped));
        assert_eq!(src.fetcher().calls.get(), 1);

        tx.send(Ok(tokens(0..3))).unwrap();
        pool.run_until_stalled();

        assert_eq!(
            *first.borrow(),
            Some(Ok(FetchOutcome::Loaded {
                appended: 3,
                end_of_data: false
            }))
        );
        assert!(!src.is_fetching());
        assert_eq!(src.options().len(), 3);
    }

    #[test]
    fn test_end_of_data_sticks_until_reset() {
        let src = source(ScriptedPages::with(vec![
            Ok(tokens(0..20)),
            Ok(vec![]),
            Ok(tokens(0..2)),
        ]));

        block_on(src.fetch_next_page()).unwrap();
        assert_eq!(
            block_on(src.on_scroll_near_end(at_end())),
            Ok(FetchOutcome::Loaded {
                appended: 0,
                end_of_data: true
            })
        );
        assert!(src.end_of_data());

        assert_eq!(block_on(src.fetch_next_page()), Ok(FetchOutcome::Skipped));
        assert_eq!(block_on(src.on_scroll_near_end(at_end())), Ok(FetchOutcome::Skipped));
        assert!(src.end_of_data());
        assert_eq!(src.page(), 2);
        assert_eq!(src.fetcher().queries.borrow().len(), 2);

        block_on(src.reset_and_fetch_first_page()).unwrap();
        assert!(!src.end_of_data());
        assert_eq!(src.page(), 1);
        assert_eq!(src.options().len(), 2);
    }

    #[test]
    fn test_chip_accumulation_skips_existing() {
        let mut chips: Vec<SelectOption<()>> = vec![SelectOption::new("a"), SelectOption::new("b")];
        let added = accumulate_chips(&mut chips, vec![SelectOption::new("a")]);
        assert_eq!(added, 0);
        assert_eq!(chips.len(), 2);

        let added = accumulate_chips(
            &mut chips,
            vec![SelectOption::new("a").with_value(1i64), SelectOption::new("c")],
        );
        assert_eq!(added, 2);
        assert_eq!(chips.len(), 4);
    }

    #[test]
    fn test_chips_from_records() {
        let src = source(ScriptedPages::default());
        assert!(src.add_chip(token_option(&token(1, "a"))));
        assert!(src.add_chip(token_option(&token(2, "b"))));
        assert!(!src.add_chip(token_option(&token(1, "a"))));

        assert_eq!(src.add_chips_from(&[token(1, "a"), token(3, "c")]), 1);
        assert_eq!(src.chips().len(), 3);

        assert!(src.remove_chip(&token_option(&token(2, "b"))));
        assert!(!src.remove_chip(&token_option(&token(2, "b"))));
        assert_eq!(src.chips().len(), 2);
    }

    #[test]
    fn test_short_second_page_with_empty_page_policy() {
        let src = source(ScriptedPages::with(vec![Ok(tokens(0..20)), Ok(tokens(20..25))]));

        let first = block_on(src.fetch_next_page()).unwrap();
        assert_eq!(
            first,
            FetchOutcome::Loaded {
                appended: 20,
                end_of_data: false
            }
        );
        assert_eq!(src.page(), 1);

        block_on(src.on_scroll_near_end(at_end())).unwrap();
        assert_eq!(src.page(), 2);
        assert_eq!(src.options().len(), 25);
        // Only an empty page closes the list under the default policy.
        assert!(!src.end_of_data());

        block_on(src.on_scroll_near_end(at_end())).unwrap();
        assert!(src.end_of_data());

        let pages: Vec<u32> = src.fetcher().queries.borrow().iter().map(|q| q.page).collect();
        assert_eq!(pages, vec![1, 2, 3]);
    }

    #[test]
    fn test_short_second_page_with_short_page_policy() {
        let config = SyncConfig {
            end_of_data: EndOfDataPolicy::ShortPage,
            ..SyncConfig::default()
        };
        let src = OptionSource::new(
            ScriptedPages::with(vec![Ok(tokens(0..20)), Ok(tokens(20..25))]),
            token_option,
            &config,
        );

        block_on(src.fetch_next_page()).unwrap();
        assert!(!src.end_of_data());
        let second = block_on(src.on_scroll_near_end(at_end())).unwrap();
        assert_eq!(
            second,
            FetchOutcome::Loaded {
                appended: 5,
                end_of_data: true
            }
        );
        assert_eq!(src.options().len(), 25);
    }

    #[test]
    fn test_stale_page_after_reset_is_dropped() {
        let (old_tx, old_rx) = oneshot::channel();
        let (new_tx, new_rx) = oneshot::channel();
        let fetcher = GatedPages::default();
        fetcher.gates.borrow_mut().extend([old_rx, new_rx]);
        let src = source(fetcher);

        let mut pool = LocalPool::new();
        let outcomes = Rc::new(RefCell::new(Vec::new()));
        {
            let (src, outcomes) = (src.clone(), outcomes.clone());
            pool.spawner()
                .spawn_local(async move {
                    let r = src.fetch_next_page().await;
                    outcomes.borrow_mut().push(("old", r));
                })
                .unwrap();
        }
        pool.run_until_stalled();
        {
            let (src, outcomes) = (src.clone(), outcomes.clone());
            pool.spawner()
                .spawn_local(async move {
                    let r = src.set_filter("cat").await;
                    outcomes.borrow_mut().push(("new", r));
                })
                .unwrap();
        }
        pool.run_until_stalled();
        assert_eq!(src.fetcher().calls.get(), 2);

        new_tx.send(Ok(tokens(0..2))).unwrap();
        pool.run_until_stalled();
        old_tx.send(Ok(tokens(100..120))).unwrap();
        pool.run_until_stalled();

        let outcomes = outcomes.borrow();
        assert_eq!(outcomes[1], ("old", Ok(FetchOutcome::Stale)));
        assert_eq!(src.options().len(), 2);
        assert!(!src.is_fetching());
        assert!(!src.end_of_data());
    }

    #[test]
    fn test_stale_error_is_dropped_too() {
        let (old_tx, old_rx) = oneshot::channel();
        let fetcher = GatedPages::default();
        fetcher.gates.borrow_mut().push_back(old_rx);
        let src = source(fetcher);

        let mut pool = LocalPool::new();
        let result = Rc::new(RefCell::new(None));
        {
            let (src, result) = (src.clone(), result.clone());
            pool.spawner()
                .spawn_local(async move {
                    *result.borrow_mut() = Some(src.fetch_next_page().await);
                })
                .unwrap();
        }
        pool.run_until_stalled();

        // No more gates: the fresh fetch answers with an empty page at once.
        block_on(src.reset_and_fetch_first_page()).unwrap();
        assert!(src.end_of_data());

        old_tx
            .send(Err(ApiError::Network("timeout".to_string())))
            .unwrap();
        pool.run_until_stalled();
        assert_eq!(*result.borrow(), Some(Ok(FetchOutcome::Stale)));
        assert!(src.end_of_data());
    }

    #[test]
    fn test_error_leaves_list_open() {
        let src = source(ScriptedPages::with(vec![
            Ok(tokens(0..20)),
            Err(ApiError::from_status(500, "boom".to_string())),
            Ok(tokens(20..40)),
        ]));

        block_on(src.fetch_next_page()).unwrap();
        let err = block_on(src.on_scroll_near_end(at_end()));
        assert!(matches!(err, Err(ApiError::Http { status: 500, .. })));
        assert!(!src.end_of_data());
        assert!(!src.is_fetching());
        assert_eq!(src.options().len(), 20);
        // The failed page is asked for again.
        assert_eq!(src.page(), 1);

        block_on(src.on_scroll_near_end(at_end())).unwrap();
        assert_eq!(src.options().len(), 40);
        let pages: Vec<u32> = src.fetcher().queries.borrow().iter().map(|q| q.page).collect();
        assert_eq!(pages, vec![1, 2, 2]);
    }

    #[test]
    fn test_scroll_away_from_end_does_nothing() {
        let src = source(ScriptedPages::default());
        let metrics = ScrollMetrics {
            scroll_top: 100.0,
            scroll_height: 500.0,
            client_height: 200.0,
        };
        assert_eq!(block_on(src.on_scroll_near_end(metrics)), Ok(FetchOutcome::Skipped));
        assert_eq!(src.page(), 1);
        assert!(src.fetcher().queries.borrow().is_empty());
    }

    #[test]
    fn test_scroll_threshold_is_inclusive() {
        let metrics = ScrollMetrics {
            scroll_top: 299.0,
            scroll_height: 500.0,
            client_height: 200.0,
        };
        assert!(metrics.near_end(1.0));
        assert!(!metrics.near_end(0.5));
    }

    #[test]
    fn test_filter_and_constraints_reach_query() {
        let src = source(ScriptedPages::with(vec![Ok(tokens(0..3)), Ok(tokens(0..1))]));
        block_on(src.set_filter("blue")).unwrap();
        block_on(src.set_constraint("category", Some("manga".to_string()))).unwrap();

        let queries = src.fetcher().queries.borrow();
        assert_eq!(queries[0].s, "blue");
        assert_eq!(queries[1].s, "blue");
        assert_eq!(queries[1].extra.get("category").map(String::as_str), Some("manga"));
        assert_eq!(queries[1].page, 1);
        assert_eq!(src.options().len(), 1);
    }

    #[test]
    fn test_dedup_accumulation() {
        let src = source(ScriptedPages::with(vec![Ok(tokens(0..3)), Ok(tokens(2..5))]))
            .with_accumulation(Accumulation::DedupByKey);
        block_on(src.fetch_next_page()).unwrap();
        let outcome = block_on(src.on_scroll_near_end(at_end())).unwrap();
        assert_eq!(
            outcome,
            FetchOutcome::Loaded {
                appended: 2,
                end_of_data: false
            }
        );
        assert_eq!(src.options().len(), 5);
    }

    #[test]
    fn test_select_clear_reset() {
        let src = source(ScriptedPages::with(vec![Ok(tokens(0..3))]));
        block_on(src.fetch_next_page()).unwrap();
        src.add_chip(SelectOption::new("x"));

        let picked = src.options()[1].clone();
        src.select(&picked);
        assert_eq!(src.title(), Some(OptionValue::from("tag1")));
        assert_eq!(src.selected_value(), Some(OptionValue::Number(1)));

        src.clear();
        assert!(src.title().is_none());
        assert!(src.selected_value().is_none());
        assert_eq!(src.options().len(), 3);

        let generation = src.snapshot().generation;
        src.reset();
        let st = src.snapshot();
        assert!(st.options.is_empty());
        assert!(st.chips.is_empty());
        assert_eq!(st.query.page, 1);
        assert_eq!(st.query.size, 20);
        assert_eq!(st.generation, generation + 1);
    }

    #[test]
    fn test_selection_binding_round_trip() {
        let src = source(ScriptedPages::default());
        let mut binding = FieldBinding::new(None::<OptionValue>);

        if let Some(v) = binding.push_outer(Some(OptionValue::from("video"))) {
            src.set_selection(v.clone(), v);
        }
        assert_eq!(src.selected_value(), Some(OptionValue::from("video")));
        // Mirroring the source's value back out is a no-op.
        assert_eq!(binding.push_inner(src.selected_value()), None);
    }

    #[test]
    fn test_subscribers_follow_fetch_and_selection() {
        let src = source(ScriptedPages::with(vec![Ok(tokens(0..2))]));
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = seen.clone();
        src.subscribe(move |st| s.borrow_mut().push((st.phase.is_fetching(), st.options.len())));

        block_on(src.fetch_next_page()).unwrap();
        assert_eq!(*seen.borrow(), vec![(true, 0), (false, 2)]);

        let first = src.options()[0].clone();
        src.select(&first);
        src.select(&first);
        assert_eq!(seen.borrow().len(), 3);
    }

    #[test]
    fn test_options_from_enum() {
        let opts: Vec<SelectOption<()>> = options_from_enum::<DagRunState, ()>();
        let titles: Vec<String> = opts.iter().map(|o| o.title.to_string()).collect();
        assert_eq!(titles, vec!["queued", "running", "success", "failed"]);
        assert_eq!(opts[0].value, Some(OptionValue::from("queued")));
    }

    #[test]
    fn test_option_value_wire_format() {
        let v: Vec<OptionValue> = serde_json::from_str(r#"[3, "three"]"#).unwrap();
        assert_eq!(v, vec![OptionValue::Number(3), OptionValue::from("three")]);
        assert_eq!(serde_json::to_string(&v).unwrap(), r#"[3,"three"]"#);
    }
}
