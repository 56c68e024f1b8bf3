//! Update listeners for long running Docker operations
//!
//! Every streaming operation drives its listener through three phases:
//! [`UpdateListener::on_start`] once before any request is sent,
//! [`UpdateListener::on_update`] once per event in stream order, and
//! [`UpdateListener::on_finish`] once when the operation ends. The finish
//! call is issued by a drop guard, so it also happens when the request fails,
//! when the daemon reports an error in the stream, when a listener returns an
//! error and while unwinding from a panic.
//!
//! Internal validation listeners are combined with the caller's listener
//! through [`Chain`], which forwards every phase to both in a fixed order.

pub mod events;
pub mod log;
pub mod progress;

use std::marker::PhantomData;

use crate::error::Result;

pub use events::{
    ErrorDetail, ImageProgressUpdateEvent, LoadImageUpdateEvent, ProgressDetail, ProgressUpdateEvent,
    PullImageUpdateEvent, PushImageUpdateEvent,
};
pub use log::{LogUpdateEvent, StreamType};
pub use progress::{TotalProgressEvent, TotalProgressListener};

/// Observer of the events produced by a Docker operation
pub trait UpdateListener<E> {
    /// Called once before the operation sends its request
    fn on_start(&mut self) {}

    /// Called for each event; returning an error stops the operation
    fn on_update(&mut self, event: &E) -> Result<()>;

    /// Called once when the operation ends, whatever the outcome
    fn on_finish(&mut self) {}
}

impl<E, L: UpdateListener<E> + ?Sized> UpdateListener<E> for &mut L {
    fn on_start(&mut self) {
        (**self).on_start();
    }

    fn on_update(&mut self, event: &E) -> Result<()> {
        (**self).on_update(event)
    }

    fn on_finish(&mut self) {
        (**self).on_finish();
    }
}

/// Listener that ignores every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoUpdates;

impl<E> UpdateListener<E> for NoUpdates {
    fn on_update(&mut self, _event: &E) -> Result<()> {
        Ok(())
    }
}

/// A listener that ignores every event
pub fn none() -> NoUpdates {
    NoUpdates
}

/// Listener backed by a closure receiving each event
pub struct FnListener<F>(F);

impl<E, F> UpdateListener<E> for FnListener<F>
where
    F: FnMut(&E) -> Result<()>,
{
    fn on_update(&mut self, event: &E) -> Result<()> {
        (self.0)(event)
    }
}

/// A listener calling `f` for each event
pub fn from_fn<E, F>(f: F) -> FnListener<F>
where
    F: FnMut(&E) -> Result<()>,
{
    FnListener(f)
}

/// Two listeners invoked one after the other for every phase
pub struct Chain<'a, A: ?Sized, B: ?Sized> {
    first: &'a mut A,
    second: &'a mut B,
}

impl<'a, A: ?Sized, B: ?Sized> Chain<'a, A, B> {
    pub fn new(first: &'a mut A, second: &'a mut B) -> Self {
        Self { first, second }
    }

    pub fn first(&self) -> &A {
        &*self.first
    }
}

impl<E, A, B> UpdateListener<E> for Chain<'_, A, B>
where
    A: UpdateListener<E> + ?Sized,
    B: UpdateListener<E> + ?Sized,
{
    fn on_start(&mut self) {
        self.first.on_start();
        self.second.on_start();
    }

    fn on_update(&mut self, event: &E) -> Result<()> {
        self.first.on_update(event)?;
        self.second.on_update(event)
    }

    fn on_finish(&mut self) {
        self.first.on_finish();
        self.second.on_finish();
    }
}

/// Started listener; finishes it when dropped
struct UpdateScope<'a, E, L: UpdateListener<E> + ?Sized> {
    listener: &'a mut L,
    _event: PhantomData<fn(&E)>,
}

impl<'a, E, L: UpdateListener<E> + ?Sized> UpdateScope<'a, E, L> {
    fn start(listener: &'a mut L) -> Self {
        listener.on_start();
        Self {
            listener,
            _event: PhantomData,
        }
    }
}

impl<E, L: UpdateListener<E> + ?Sized> Drop for UpdateScope<'_, E, L> {
    fn drop(&mut self) {
        self.listener.on_finish();
    }
}

/// Run `operation` between `on_start` and `on_finish` of `listener`
pub fn scoped<E, L, T, F>(listener: &mut L, operation: F) -> Result<T>
where
    L: UpdateListener<E> + ?Sized,
    F: FnOnce(&mut L) -> Result<T>,
{
    let scope = UpdateScope::<E, L>::start(listener);
    operation(&mut *scope.listener)
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingListener;
    use super::*;
    use crate::error::DockerError;

    #[test]
    fn test_scope_finishes_on_success() {
        let mut listener = RecordingListener::<u32>::default();
        let result = scoped::<u32, _, _, _>(&mut listener, |listener| {
            listener.on_update(&1)?;
            listener.on_update(&2)?;
            Ok("done")
        });
        assert_eq!(result.unwrap(), "done");
        assert_eq!((listener.starts, listener.finishes), (1, 1));
        assert_eq!(listener.events, vec![1, 2]);
        assert_eq!(listener.updates_before_start, 0);
    }

    #[test]
    fn test_scope_finishes_on_error() {
        let mut listener = RecordingListener::<u32>::default();
        let result: Result<()> = scoped::<u32, _, _, _>(&mut listener, |_| Err(DockerError::Transport("refused".to_string())));
        assert!(matches!(result, Err(DockerError::Transport(_))));
        assert_eq!((listener.starts, listener.finishes), (1, 1));
    }

    #[test]
    fn test_scope_finishes_on_panic() {
        let mut listener = RecordingListener::<u32>::default();
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _: Result<()> = scoped::<u32, _, _, _>(&mut listener, |_| panic!("listener failure"));
        }));
        assert!(outcome.is_err());
        assert_eq!((listener.starts, listener.finishes), (1, 1));
    }

    #[test]
    fn test_chain_invokes_in_order_and_stops_on_error() {
        let mut seen = Vec::new();
        let mut first = from_fn(|event: &u32| {
            if *event == 3 {
                Err(DockerError::Aborted("three".to_string()))
            } else {
                Ok(())
            }
        });
        let mut second = RecordingListener::<u32>::default();
        {
            let mut chain = Chain::new(&mut first, &mut second);
            let result = scoped::<u32, _, _, _>(&mut chain, |listener| {
                for event in 1..=5u32 {
                    listener.on_update(&event)?;
                }
                Ok(())
            });
            assert!(matches!(result, Err(DockerError::Aborted(_))));
        }
        seen.extend(second.events.iter().copied());
        assert_eq!(seen, vec![1, 2]);
        assert_eq!((second.starts, second.finishes), (1, 1));
    }

    #[test]
    fn test_none_accepts_everything() {
        let mut listener = none();
        assert!(UpdateListener::<String>::on_update(&mut listener, &"x".to_string()).is_ok());
    }
}
