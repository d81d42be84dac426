//! Fire-once and repeating timers.
//!
//! The browser implementation wraps `setTimeout`/`setInterval`; `ManualScheduler`
//! runs callbacks against a virtual clock that only moves when told to.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(pub(crate) i64);

pub trait Scheduler {
    fn set_timeout(&self, delay_ms: u32, callback: Box<dyn FnOnce()>) -> TimerHandle;
    fn set_interval(&self, period_ms: u32, callback: Box<dyn FnMut()>) -> TimerHandle;
    /// Cancels either kind of timer. Unknown or already-fired handles are ignored.
    fn clear(&self, handle: TimerHandle);
}

pub type SharedScheduler = Rc<dyn Scheduler>;

#[cfg(target_arch = "wasm32")]
#[derive(Clone, Copy, Debug, Default)]
pub struct BrowserScheduler;

#[cfg(target_arch = "wasm32")]
impl Scheduler for BrowserScheduler {
    fn set_timeout(&self, delay_ms: u32, callback: Box<dyn FnOnce()>) -> TimerHandle {
        use wasm_bindgen::JsCast;

        let Some(win) = web_sys::window() else {
            return TimerHandle(0);
        };
        let cb = wasm_bindgen::closure::Closure::once_into_js(callback);
        let tid = win
            .set_timeout_with_callback_and_timeout_and_arguments_0(
                cb.as_ref().unchecked_ref(),
                delay_ms as i32,
            )
            .unwrap_or(0);
        TimerHandle(tid as i64)
    }

    fn set_interval(&self, period_ms: u32, callback: Box<dyn FnMut()>) -> TimerHandle {
        use wasm_bindgen::JsCast;

        let Some(win) = web_sys::window() else {
            return TimerHandle(0);
        };
        let cb = wasm_bindgen::closure::Closure::wrap(callback);
        let tid = win
            .set_interval_with_callback_and_timeout_and_arguments_0(
                cb.as_ref().unchecked_ref(),
                period_ms as i32,
            )
            .unwrap_or(0);

        // Interval owners live for the page lifetime.
        cb.forget();
        TimerHandle(tid as i64)
    }

    fn clear(&self, handle: TimerHandle) {
        if let Some(win) = web_sys::window() {
            // Browser timeout and interval ids share one pool.
            win.clear_timeout_with_handle(handle.0 as i32);
            win.clear_interval_with_handle(handle.0 as i32);
        }
    }
}

/// The scheduler for this runtime.
///
/// Off-browser nothing drives the manual clock, so timers simply never fire.
pub fn default_scheduler() -> SharedScheduler {
    #[cfg(target_arch = "wasm32")]
    {
        Rc::new(BrowserScheduler)
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        Rc::new(ManualScheduler::new())
    }
}

enum Job {
    Once(Box<dyn FnOnce()>),
    Repeat {
        period: u64,
        callback: Rc<RefCell<Box<dyn FnMut()>>>,
    },
}

struct Entry {
    due: u64,
    job: Job,
}

#[derive(Default)]
struct ManualState {
    now: u64,
    next_id: i64,
    entries: BTreeMap<i64, Entry>,
}

/// Deterministic scheduler driven by `advance`.
#[derive(Clone, Default)]
pub struct ManualScheduler {
    state: Rc<RefCell<ManualState>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now_ms(&self) -> u64 {
        self.state.borrow().now
    }

    /// Number of timers still armed.
    pub fn pending(&self) -> usize {
        self.state.borrow().entries.len()
    }

    fn insert(&self, due_in: u64, job: Job) -> TimerHandle {
        let mut st = self.state.borrow_mut();
        st.next_id += 1;
        let id = st.next_id;
        let due = st.now + due_in;
        st.entries.insert(id, Entry { due, job });
        TimerHandle(id)
    }

    /// Move the clock forward, firing every timer that comes due in order.
    ///
    /// Callbacks run with no borrow held, so they may arm or clear timers.
    pub fn advance(&self, ms: u64) {
        let target = self.state.borrow().now + ms;

        loop {
            let next = {
                let st = self.state.borrow();
                st.entries
                    .iter()
                    .filter(|(_, e)| e.due <= target)
                    .min_by_key(|(id, e)| (e.due, **id))
                    .map(|(id, _)| *id)
            };
            let Some(id) = next else {
                break;
            };

            let entry = {
                let mut st = self.state.borrow_mut();
                let Some(entry) = st.entries.remove(&id) else {
                    break;
                };
                st.now = entry.due;
                entry
            };

            match entry.job {
                Job::Once(callback) => callback(),
                Job::Repeat { period, callback } => {
                    self.state.borrow_mut().entries.insert(
                        id,
                        Entry {
                            due: entry.due + period,
                            job: Job::Repeat {
                                period,
                                callback: callback.clone(),
                            },
                        },
                    );
                    let mut cb = callback.borrow_mut();
                    (&mut *cb)();
                }
            }
        }

        self.state.borrow_mut().now = target;
    }
}

impl Scheduler for ManualScheduler {
    fn set_timeout(&self, delay_ms: u32, callback: Box<dyn FnOnce()>) -> TimerHandle {
        self.insert(u64::from(delay_ms), Job::Once(callback))
    }

    fn set_interval(&self, period_ms: u32, callback: Box<dyn FnMut()>) -> TimerHandle {
        let period = u64::from(period_ms.max(1));
        self.insert(
            period,
            Job::Repeat {
                period,
                callback: Rc::new(RefCell::new(callback)),
            },
        )
    }

    fn clear(&self, handle: TimerHandle) {
        self.state.borrow_mut().entries.remove(&handle.0);
    }
}
