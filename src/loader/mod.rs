//! Re-run a view's load function when its route or watched values change.
//!
//! The loader turns the current route and every watch source into one composite
//! value. `observe` compares it with the last one seen and calls the load function
//! once per change.

mod list;

pub use list::{ListState, LoadState, LoadTicket};

use serde::Serialize;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

/// Path plus decoded query, compared by value.
#[derive(Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct RouteSnapshot {
    pub path: String,
    pub query: BTreeMap<String, String>,
}

impl RouteSnapshot {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            query: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    /// Parse a location's pathname and `?a=1&b=2` search string.
    pub fn from_path_and_search(path: &str, search: &str) -> Self {
        let query = search
            .trim_start_matches('?')
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| {
                let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
                (decode(k), decode(v))
            })
            .collect();
        Self {
            path: path.to_string(),
            query,
        }
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }

    /// `page` as a number, when present and valid.
    pub fn page(&self) -> Option<u32> {
        self.param("page").and_then(|p| p.parse().ok())
    }

    /// Stable text form: query keys are sorted.
    pub fn key(&self) -> String {
        if self.query.is_empty() {
            return self.path.clone();
        }
        let pairs: Vec<String> = self
            .query
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect();
        format!("{}?{}", self.path, pairs.join("&"))
    }
}

fn decode(s: &str) -> String {
    let spaced = s.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|c| c.into_owned())
        .unwrap_or(spaced)
}

/// One slot of the composite. `None` means the source is unset and adds nothing.
pub type Producer = Rc<dyn Fn() -> Option<String>>;

/// Watch an arbitrary serializable value.
pub fn json_source<T: Serialize>(read: impl Fn() -> Option<T> + 'static) -> Producer {
    Rc::new(move || {
        let value = read()?;
        match serde_json::to_string(&value) {
            Ok(json) => Some(json),
            Err(e) => {
                tracing::warn!(error = %e, "watch source is not serializable");
                None
            }
        }
    })
}

pub type LoadFn<S> = Rc<dyn Fn(&S, &[String])>;

struct Binding<S> {
    route: Option<Producer>,
    watch: Vec<Producer>,
    load: Option<LoadFn<S>>,
    last: Vec<String>,
    observed: bool,
}

struct Inner<S> {
    state: S,
    binding: RefCell<Binding<S>>,
}

/// One view's binding of route and watch sources to a load function.
pub struct RouteLoader<S> {
    inner: Rc<Inner<S>>,
}

impl<S> Clone for RouteLoader<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S: 'static> RouteLoader<S> {
    pub fn new(state: S) -> Self {
        Self {
            inner: Rc::new(Inner {
                state,
                binding: RefCell::new(Binding {
                    route: None,
                    watch: Vec::new(),
                    load: None,
                    last: Vec::new(),
                    observed: false,
                }),
            }),
        }
    }

    pub fn state(&self) -> &S {
        &self.inner.state
    }

    /// The route moved. Picked up by the next `observe`.
    pub fn set_route(&self, route: RouteSnapshot) {
        let key = route.key();
        self.inner.binding.borrow_mut().route = Some(Rc::new(move || Some(key.clone())));
    }

    /// Read the route from a live source instead of explicit `set_route` calls.
    pub fn set_route_source(&self, source: impl Fn() -> Option<RouteSnapshot> + 'static) {
        let producer: Producer = Rc::new(move || source().map(|r| r.key()));
        self.inner.binding.borrow_mut().route = Some(producer);
        self.rebaseline();
    }

    /// Replace the watch sources. Does not load by itself.
    pub fn set_watch_sources(&self, sources: Vec<Producer>) {
        self.inner.binding.borrow_mut().watch = sources;
        self.rebaseline();
    }

    /// Replace the load function. Does not load by itself.
    pub fn set_load_function(&self, load: impl Fn(&S, &[String]) + 'static) {
        self.inner.binding.borrow_mut().load = Some(Rc::new(load));
    }

    fn producers(&self) -> Vec<Producer> {
        let binding = self.inner.binding.borrow();
        binding
            .route
            .iter()
            .chain(binding.watch.iter())
            .cloned()
            .collect()
    }

    /// Route snapshot first, then each watch source in order.
    pub fn composite(&self) -> Vec<String> {
        // Producers run with no borrow held; they may read the loader themselves.
        self.producers().iter().filter_map(|p| p()).collect()
    }

    // A rebind after the first observation becomes the new baseline, so only a
    // later change of the values themselves triggers a load.
    fn rebaseline(&self) {
        if !self.inner.binding.borrow().observed {
            return;
        }
        let composite = self.composite();
        self.inner.binding.borrow_mut().last = composite;
    }

    /// Compare the composite with the last one seen and load once if it changed.
    ///
    /// Returns whether the load function ran.
    pub fn observe(&self) -> bool {
        let composite = self.composite();
        let load = {
            let mut binding = self.inner.binding.borrow_mut();
            binding.observed = true;
            if binding.last == composite {
                return false;
            }
            binding.last = composite.clone();
            binding.load.clone()
        };

        match load {
            Some(load) => {
                tracing::debug!(composite = ?composite, "route loader fired");
                load(&self.inner.state, &composite);
                true
            }
            None => false,
        }
    }
}
