//! Panic recovery.
//!
//! A panicking handler is answered with a generic 500 JSON error; the panic
//! payload and its stack are logged with `alert = true` so it can be paged
//! on.
//!
//! The stack is captured by a process-wide panic hook into a thread local.
//! `CatchPanic` unwinds on the thread that polled the handler, so the
//! handler below reads the backtrace of the panic it recovers.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::sync::Once;

use axum::response::{IntoResponse, Response};
use tower_http::catch_panic::CatchPanicLayer;

use crate::http::error::HttpError;

pub type PanicHandler = fn(Box<dyn Any + Send + 'static>) -> Response;

thread_local! {
    static LAST_BACKTRACE: RefCell<Option<Backtrace>> = const { RefCell::new(None) };
}

static BACKTRACE_HOOK: Once = Once::new();

pub fn layer() -> CatchPanicLayer<PanicHandler> {
    install_backtrace_hook();
    CatchPanicLayer::custom(handle_panic as PanicHandler)
}

/// Chain a hook recording the backtrace of every panic in front of the
/// current one.
fn install_backtrace_hook() {
    BACKTRACE_HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let _ = LAST_BACKTRACE.try_with(|slot| {
                if let Ok(mut slot) = slot.try_borrow_mut() {
                    *slot = Some(Backtrace::force_capture());
                }
            });
            previous(info);
        }));
    });
}

fn take_backtrace() -> Option<Backtrace> {
    LAST_BACKTRACE.with(|slot| slot.try_borrow_mut().ok().and_then(|mut slot| slot.take()))
}

fn handle_panic(payload: Box<dyn Any + Send + 'static>) -> Response {
    let message = panic_message(payload.as_ref());
    let stack = take_backtrace()
        .map(|backtrace| backtrace.to_string())
        .unwrap_or_default();
    tracing::error!(alert = true, panic = %message, stack = %stack, "[PANIC RECOVER] {}", message);
    HttpError::internal().into_response()
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
