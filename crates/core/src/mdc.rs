//! Mapped diagnostic context: per-request key/value pairs that the logging
//! subsystem stamps onto every line.
//!
//! Inside [`scope`] the map lives in tokio task-local storage, so it follows the
//! request's task across worker threads. Code running outside any request scope
//! (startup, blocking threads, plain unit tests) gets a thread-local map instead.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt::{self, Write as _};
use std::future::Future;

use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

/// Key under which the acting user of the current request is stored.
pub const CURRENT_USER_KEY: &str = "userName";

tokio::task_local! {
    static TASK_MDC: RefCell<HashMap<String, String>>;
}

thread_local! {
    static THREAD_MDC: RefCell<HashMap<String, String>> = RefCell::new(HashMap::new());
}

fn with_map<R>(f: impl FnOnce(&mut HashMap<String, String>) -> R) -> R {
    if TASK_MDC.try_with(|_| ()).is_ok() {
        TASK_MDC.with(|map| f(&mut map.borrow_mut()))
    } else {
        THREAD_MDC.with(|map| f(&mut map.borrow_mut()))
    }
}

/// Run `future` with a fresh, empty context. Entries written inside the future
/// are invisible to every other request and vanish when it completes.
pub async fn scope<F>(future: F) -> F::Output
where
    F: Future,
{
    TASK_MDC.scope(RefCell::new(HashMap::new()), future).await
}

pub fn put(key: &str, value: &str) {
    with_map(|map| {
        map.insert(key.to_string(), value.to_string());
    });
}

pub fn get(key: &str) -> Option<String> {
    with_map(|map| map.get(key).cloned())
}

pub fn remove(key: &str) -> Option<String> {
    with_map(|map| map.remove(key))
}

/// Registration of the acting user into the logging context.
pub trait LoggerMdc: Send + Sync {
    fn register_user(&self, user: &str);
    fn unregister_user(&self);
}

/// [`LoggerMdc`] backed by this module's context under [`CURRENT_USER_KEY`].
#[derive(Debug, Default, Clone, Copy)]
pub struct Mdc;

impl LoggerMdc for Mdc {
    fn register_user(&self, user: &str) {
        put(CURRENT_USER_KEY, user);
    }

    fn unregister_user(&self) {
        remove(CURRENT_USER_KEY);
    }
}

/// Event formatter that prefixes each line with `[user] ` when the current
/// context has a registered user, then delegates to `inner`.
#[derive(Debug, Clone)]
pub struct MdcFormat<F> {
    inner: F,
}

impl<F> MdcFormat<F> {
    pub fn new(inner: F) -> Self {
        Self { inner }
    }
}

impl<S, N, F> FormatEvent<S, N> for MdcFormat<F>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
    F: FormatEvent<S, N>,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        if let Some(user) = get(CURRENT_USER_KEY) {
            write!(writer, "[{user}] ")?;
        }
        self.inner.format_event(ctx, writer, event)
    }
}
