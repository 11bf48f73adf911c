//! Async animation scripts
//!
//! A script is an async function handed to [`UpdateProps::script`]. It issues
//! an open-ended sequence of targets through [`ScriptContext::next`] and runs
//! on the scheduler's single-threaded executor, so it never races a frame
//! pass. Cancellation is cooperative: once the owning controller is stopped
//! or destroyed, the pending `next` resolves to
//! [`AnimationError::ScriptCancelled`] and every later call fails the same
//! way, so `?` unwinds the script at its yield point.

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::rc::Rc;

use futures::channel::oneshot;

use crate::controller::{AnimationResult, ControllerHandle, ScriptFn, UpdateProps};
use crate::error::{AnimationError, Result};

/// Shared cancellation flag
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Rc<Cell<bool>>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.set(true);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.get()
    }

    /// No task holds this token any more
    pub(crate) fn is_orphaned(&self) -> bool {
        Rc::strong_count(&self.0) == 1
    }
}

/// Handed to a running script
pub struct ScriptContext {
    controller: ControllerHandle,
    token: CancelToken,
    last: Rc<RefCell<Vec<AnimationResult>>>,
}

impl ScriptContext {
    pub(crate) fn new(controller: ControllerHandle, token: CancelToken) -> Self {
        Self {
            controller,
            token,
            last: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Animate to `props` and wait for every touched key to resolve
    pub async fn next(&self, props: UpdateProps) -> Result<Vec<AnimationResult>> {
        if self.token.is_cancelled() {
            return Err(AnimationError::ScriptCancelled);
        }
        let results = self.controller.animate(props)?.await;
        if self.token.is_cancelled() {
            return Err(AnimationError::ScriptCancelled);
        }
        *self.last.borrow_mut() = results.clone();
        Ok(results)
    }

    pub fn controller(&self) -> &ControllerHandle {
        &self.controller
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Run a script and report the results of its last step
pub(crate) fn script_task(
    script: ScriptFn,
    ctx: ScriptContext,
    done: oneshot::Sender<Vec<AnimationResult>>,
) -> impl Future<Output = ()> {
    let token = ctx.token.clone();
    let last = ctx.last.clone();
    async move {
        let outcome = script(ctx).await;
        let cancelled =
            token.is_cancelled() || matches!(outcome, Err(AnimationError::ScriptCancelled));
        match outcome {
            Err(AnimationError::ScriptCancelled) | Ok(()) => {}
            Err(err) => tracing::warn!("animation script failed: {}", err),
        }

        let results = last
            .take()
            .into_iter()
            .map(|result| AnimationResult {
                finished: result.finished && !cancelled,
                cancelled: result.cancelled || cancelled,
                ..result
            })
            .collect();
        let _ = done.send(results);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_token() {
        let token = CancelToken::new();
        let held = token.clone();
        assert!(!token.is_orphaned());
        held.cancel();
        assert!(token.is_cancelled());
        drop(held);
        assert!(token.is_orphaned());
    }
}
