//! Panic capture for request handlers.
//!
//! A handler wrapped with [`catch_panic`] or [`catch_panic_async`] never
//! takes the process down: the panic is caught, logged once through the
//! request context with `panicError` and `stackTrace` fields, and swallowed.
//!
//! The stack trace is recorded by a process panic hook at the panic site.
//! While a capture scope is active on the panicking thread the hook stores
//! the trace for the catcher and skips the previously installed hook, so
//! swallowed panics do not also print to stderr.

use std::{
    any::Any,
    backtrace::Backtrace,
    cell::{Cell, RefCell},
    future::Future,
    panic::{self, AssertUnwindSafe, PanicHookInfo},
    pin::Pin,
    sync::Once,
    task::{Context as TaskContext, Poll},
};

use futures::FutureExt;

use crate::context::Context;

/// Upper bound on the logged stack trace, in bytes.
pub const MAX_STACK_TRACE_BYTES: usize = 16 * 1024;

thread_local! {
    static CAPTURE_DEPTH: Cell<usize> = const { Cell::new(0) };
    static LAST_TRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

static HOOK: Once = Once::new();

/// Installs the trace-recording panic hook. Idempotent.
pub fn install_capture_hook() {
    HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info: &PanicHookInfo<'_>| {
            if CAPTURE_DEPTH.with(Cell::get) > 0 {
                let trace = Backtrace::force_capture().to_string();
                LAST_TRACE.with(|slot| *slot.borrow_mut() = Some(trace));
            } else {
                previous(info);
            }
        }));
    });
}

struct ScopeGuard;

impl ScopeGuard {
    fn enter() -> Self {
        // A trace left by a panic that an inner catch swallowed is stale.
        LAST_TRACE.with(|slot| slot.borrow_mut().take());
        CAPTURE_DEPTH.with(|depth| depth.set(depth.get() + 1));
        Self
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        CAPTURE_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

/// Marks every poll of the inner future as a capture scope.
struct Scoped<F> {
    inner: Pin<Box<F>>,
}

impl<F: Future> Future for Scoped<F> {
    type Output = F::Output;

    fn poll(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        let _scope = ScopeGuard::enter();
        self.inner.as_mut().poll(cx)
    }
}

/// Runs `f`, logging and swallowing any panic. Returns `None` on panic.
pub fn catch_panic<R>(ctx: &Context, f: impl FnOnce() -> R) -> Option<R> {
    install_capture_hook();
    let result = {
        let _scope = ScopeGuard::enter();
        panic::catch_unwind(AssertUnwindSafe(f))
    };
    match result {
        Ok(value) => Some(value),
        Err(payload) => {
            ctx.handle_panic(payload.as_ref());
            None
        },
    }
}

/// Awaits `fut`, logging and swallowing any panic. Returns `None` on panic.
pub async fn catch_panic_async<F: Future>(ctx: &Context, fut: F) -> Option<F::Output> {
    install_capture_hook();
    match AssertUnwindSafe(Scoped { inner: Box::pin(fut) }).catch_unwind().await {
        Ok(value) => Some(value),
        Err(payload) => {
            ctx.handle_panic(payload.as_ref());
            None
        },
    }
}

impl Context {
    /// Logs a caught panic payload as a single error line.
    ///
    /// Uses the trace recorded at the panic site when available, otherwise
    /// captures one here.
    pub fn handle_panic(&self, payload: &(dyn Any + Send)) {
        let trace = LAST_TRACE
            .with(|slot| slot.borrow_mut().take())
            .unwrap_or_else(|| Backtrace::force_capture().to_string());
        let panic_error = panic_message(payload);
        let stack_trace = truncate_utf8(&trace, MAX_STACK_TRACE_BYTES);

        self.log().error("recovered from panic", &[
            ("panicError", panic_error.as_str()),
            ("stackTrace", stack_trace),
        ]);
    }
}

/// Renders a panic payload as text.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return (*message).to_string();
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return message.clone();
    }

    macro_rules! render {
        ($($ty:ty),*) => {
            $(if let Some(value) = payload.downcast_ref::<$ty>() {
                return value.to_string();
            })*
        };
    }
    render!(i32, i64, u32, u64, isize, usize, f64, bool, char);

    "non-string panic payload".to_string()
}

/// Longest prefix of `s` no larger than `max` bytes ending on a char boundary.
pub fn truncate_utf8(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;
    use crate::logging::{LogRecord, LogSink};

    #[derive(Debug, Default)]
    struct Lines(Mutex<Vec<LogRecord>>);

    impl LogSink for Lines {
        fn emit(&self, record: &LogRecord) {
            self.0.lock().push(record.clone());
        }
    }

    #[test]
    fn renders_common_payloads() {
        assert_eq!(panic_message(&"boom"), "boom");
        assert_eq!(panic_message(&String::from("boom")), "boom");
        assert_eq!(panic_message(&42_i32), "42");
        assert_eq!(panic_message(&vec![1_u8]), "non-string panic payload");
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let s = "aé";
        assert_eq!(truncate_utf8(s, 2), "a");
        assert_eq!(truncate_utf8(s, 3), "aé");
        assert_eq!(truncate_utf8("abc", 10), "abc");
    }

    #[test]
    fn catch_panic_returns_value_without_panic() {
        let ctx = Context::new();
        assert_eq!(catch_panic(&ctx, || 7), Some(7));
    }

    #[test]
    fn catch_panic_swallows_panic() {
        let ctx = Context::new();
        let result: Option<()> = catch_panic(&ctx, || panic!("handler failed"));
        assert!(result.is_none());
        assert_eq!(CAPTURE_DEPTH.with(Cell::get), 0);
    }

    fn explode() -> u8 {
        panic::panic_any(42_i32)
    }

    #[tokio::test]
    async fn catch_panic_async_swallows_panic() {
        let ctx = Context::new();
        let result = catch_panic_async(&ctx, async {
            tokio::task::yield_now().await;
            explode()
        })
        .await;
        assert!(result.is_none());
    }

    #[test]
    fn swallowed_inner_panic_does_not_leak_its_trace() {
        let lines = Arc::new(Lines::default());
        let ctx = Context::with_sink(lines.clone());

        let inner = catch_panic(&ctx, || panic::catch_unwind(|| panic!("inner")).is_err());
        assert_eq!(inner, Some(true));
        LAST_TRACE.with(|slot| *slot.borrow_mut() = Some("stale-trace".to_string()));

        let result: Option<()> = catch_panic(&ctx, || panic::resume_unwind(Box::new("outer")));
        assert!(result.is_none());

        let lines = lines.0.lock();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].field("panicError").as_deref(), Some("outer"));
        assert_ne!(lines[0].field("stackTrace").as_deref(), Some("stale-trace"));
    }

    #[test]
    fn entering_a_scope_discards_leftover_trace() {
        LAST_TRACE.with(|slot| *slot.borrow_mut() = Some("stale-trace".to_string()));

        let scope = ScopeGuard::enter();
        assert!(LAST_TRACE.with(|slot| slot.borrow().is_none()));
        drop(scope);
    }
}
