//! Wrapping calls so that each one produces exactly one [`Record`].
//!
//! A [`Tracer`] binds an actor id to an engine. Its methods run a closure, time it, classify the
//! outcome, and enqueue the record before handing the closure's result back unchanged:
//!
//! - [`Tracer::call`] for infallible work, where only a panic counts as an error
//! - [`Tracer::try_call`] for work returning `Result`, where `Err` counts as an error
//! - the `_summarized` variants additionally keep a bounded `Debug` rendering of the result
//! - [`Tracer::wrap`] and [`Tracer::try_wrap`] build a new callable instead of running one
//!
//! For functions of any signature there is the [`traced`](crate::traced) attribute.
//!
//! A panic inside the wrapped closure is recorded and then resumed with its original payload.

use std::any::Any;
use std::fmt::{Debug, Display};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::engine::Shared;
use crate::log::diag;
use crate::{CallSite, Outcome, Record};

/// Records calls on behalf of one actor.
///
/// Obtained from [`Engine::tracer`](crate::Engine::tracer). Cloning is cheap, and a tracer may
/// outlive its engine, in which case its records are rejected.
///
/// # Examples
///
/// ```rust
/// use callspool::{Engine, call_site};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let engine = Engine::builder().build()?;
/// let tracer = engine.tracer("alice");
///
/// let parsed: Result<u32, _> = tracer.try_call(call_site!("parse"), || "42".parse::<u32>());
/// assert_eq!(parsed, Ok(42));
///
/// let double = tracer.wrap(call_site!("double"), |x: u32| x * 2);
/// assert_eq!(double(21), 42);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Tracer {
    actor_id: Arc<str>,
    shared: Arc<Shared>,
}

impl Tracer {
    pub(crate) fn new(actor_id: Arc<str>, shared: Arc<Shared>) -> Self {
        Self { actor_id, shared }
    }

    /// The actor id every record from this tracer carries.
    pub fn actor_id(&self) -> &str {
        &self.actor_id
    }

    /// Runs `f` and records it as a success unless it panics.
    pub fn call<R>(&self, site: CallSite, f: impl FnOnce() -> R) -> R {
        self.observe(site, f, |_| Outcome::success())
    }

    /// Like [`call`](Tracer::call), keeping a summary of the returned value.
    pub fn call_summarized<R>(&self, site: CallSite, f: impl FnOnce() -> R) -> R
    where
        R: Debug,
    {
        let limit = self.shared.config.summary_limit;
        self.observe(site, f, |value| Outcome::summarized(value, limit))
    }

    /// Runs `f` and records `Err` (or a panic) as an error.
    pub fn try_call<T, E>(&self, site: CallSite, f: impl FnOnce() -> Result<T, E>) -> Result<T, E>
    where
        E: Display,
    {
        self.observe(site, f, |result| match result {
            Ok(_) => Outcome::success(),
            Err(error) => Outcome::error(error),
        })
    }

    /// Like [`try_call`](Tracer::try_call), keeping a summary of the `Ok` value.
    pub fn try_call_summarized<T, E>(
        &self,
        site: CallSite,
        f: impl FnOnce() -> Result<T, E>,
    ) -> Result<T, E>
    where
        T: Debug,
        E: Display,
    {
        let limit = self.shared.config.summary_limit;
        self.observe(site, f, |result| match result {
            Ok(value) => Outcome::summarized(value, limit),
            Err(error) => Outcome::error(error),
        })
    }

    /// Returns a callable that behaves like `f` and records every invocation with
    /// [`call`](Tracer::call).
    ///
    /// Functions of several arguments take them as a tuple.
    pub fn wrap<A, R, F>(&self, site: CallSite, f: F) -> impl Fn(A) -> R + use<A, R, F>
    where
        F: Fn(A) -> R,
    {
        let tracer = self.clone();
        move |argument: A| tracer.call(site, || f(argument))
    }

    /// Returns a callable that behaves like `f` and records every invocation with
    /// [`try_call`](Tracer::try_call).
    pub fn try_wrap<A, T, E, F>(
        &self,
        site: CallSite,
        f: F,
    ) -> impl Fn(A) -> Result<T, E> + use<A, T, E, F>
    where
        F: Fn(A) -> Result<T, E>,
        E: Display,
    {
        let tracer = self.clone();
        move |argument: A| tracer.try_call(site, || f(argument))
    }

    fn observe<R>(
        &self,
        site: CallSite,
        f: impl FnOnce() -> R,
        classify: impl FnOnce(&R) -> Outcome,
    ) -> R {
        let start = Instant::now();
        let result = panic::catch_unwind(AssertUnwindSafe(f));
        let elapsed = start.elapsed();

        match result {
            Ok(value) => {
                let outcome = classify(&value);
                self.emit(site, elapsed, outcome);
                value
            }
            Err(payload) => {
                let detail = panic_message(&*payload);
                self.emit(site, elapsed, Outcome::Error { detail });
                panic::resume_unwind(payload)
            }
        }
    }

    fn emit(&self, site: CallSite, elapsed: Duration, outcome: Outcome) {
        if let Outcome::Error { detail } = &outcome {
            diag!(
                self.shared.config.log_level,
                WARN,
                engine = self.shared.id,
                actor = &*self.actor_id,
                %site,
                error = detail.as_str(),
                "instrumented call failed"
            );
        }
        self.shared
            .enqueue(Record::new(&*self.actor_id, site, elapsed, outcome));
    }
}

/// Extracts the message of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        String::from("Box<dyn Any>")
    }
}
