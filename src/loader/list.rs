use crate::pagination::Pagination;
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Clone, Debug, Default, PartialEq)]
pub enum LoadState<T> {
    #[default]
    Unloaded,
    Loading,
    Loaded(T),
    Failed(String),
}

impl<T> LoadState<T> {
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    pub fn loaded(&self) -> Option<&T> {
        match self {
            Self::Loaded(v) => Some(v),
            _ => None,
        }
    }
}

/// Identifies one load of a `ListState`. Only the newest ticket may finish.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoadTicket(u64);

#[derive(Debug)]
struct ListInner<T> {
    load: LoadState<Vec<T>>,
    pagination: Option<Pagination>,
    latest: u64,
}

/// Items and pager of one list view, written by its load function.
///
/// Clones share the same list, so a load function can hand one to its request.
#[derive(Debug)]
pub struct ListState<T> {
    inner: Rc<RefCell<ListInner<T>>>,
}

impl<T> Clone for ListState<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Default for ListState<T> {
    fn default() -> Self {
        Self {
            inner: Rc::new(RefCell::new(ListInner {
                load: LoadState::Unloaded,
                pagination: None,
                latest: 0,
            })),
        }
    }
}

impl<T: Clone> ListState<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a load as started. Earlier tickets become stale.
    pub fn begin(&self) -> LoadTicket {
        let mut inner = self.inner.borrow_mut();
        inner.latest += 1;
        inner.load = LoadState::Loading;
        LoadTicket(inner.latest)
    }

    /// Store a load's result. Returns `false` (and changes nothing) for a stale ticket.
    pub fn finish(
        &self,
        ticket: LoadTicket,
        result: Result<(Vec<T>, Option<Pagination>), String>,
    ) -> bool {
        let mut inner = self.inner.borrow_mut();
        if ticket.0 != inner.latest {
            tracing::debug!(ticket = ticket.0, latest = inner.latest, "dropping stale list result");
            return false;
        }
        match result {
            Ok((items, pagination)) => {
                inner.load = LoadState::Loaded(items);
                inner.pagination = pagination;
            }
            Err(message) => {
                inner.load = LoadState::Failed(message);
                inner.pagination = None;
            }
        }
        true
    }

    pub fn load_state(&self) -> LoadState<Vec<T>> {
        self.inner.borrow().load.clone()
    }

    pub fn items(&self) -> Vec<T> {
        self.inner
            .borrow()
            .load
            .loaded()
            .cloned()
            .unwrap_or_default()
    }

    pub fn pagination(&self) -> Option<Pagination> {
        self.inner.borrow().pagination.clone()
    }

    pub fn reset(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.latest += 1;
        inner.load = LoadState::Unloaded;
        inner.pagination = None;
    }
}
