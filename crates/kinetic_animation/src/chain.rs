//! Chain orchestrator
//!
//! Sequences controllers. Without offsets each controller's queued updates
//! start only after every key of the previous controller resolved. With
//! offsets, controller `i` starts after `offsets[i] * timeframe_ms`
//! regardless of the others.
//!
//! ```ignore
//! // Queue each controller's target, then chain them
//! panel.update(UpdateProps::new().to("height", 240.0))?;
//! items.update(UpdateProps::new().to("opacity", 1.0))?;
//! let open = Chain::new(vec![panel.handle(), items.handle()]).run()?;
//! ```

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::channel::oneshot;
use futures::future::join_all;
use futures::FutureExt;

use crate::controller::{AnimationResult, Completion, ControllerHandle};
use crate::error::{AnimationError, Result};
use crate::script::CancelToken;

#[derive(Clone, Debug, PartialEq)]
enum Timing {
    /// Each controller waits for the previous one
    Completion,
    Offsets { offsets: Vec<f64>, timeframe_ms: f64 },
}

/// An ordered set of controllers to start together
#[derive(Clone, Debug)]
pub struct Chain {
    controllers: Vec<ControllerHandle>,
    timing: Timing,
}

impl Chain {
    pub fn new(controllers: Vec<ControllerHandle>) -> Self {
        Self {
            controllers,
            timing: Timing::Completion,
        }
    }

    /// Start each controller at a fraction of `timeframe_ms`
    pub fn with_offsets(mut self, offsets: Vec<f64>, timeframe_ms: f64) -> Result<Self> {
        if offsets.len() != self.controllers.len() {
            return Err(AnimationError::InvalidConfig(format!(
                "chain has {} controllers but {} offsets",
                self.controllers.len(),
                offsets.len()
            )));
        }
        if offsets.iter().any(|o| !o.is_finite() || *o < 0.0) {
            return Err(AnimationError::InvalidConfig(format!(
                "chain offsets must be non-negative: {offsets:?}"
            )));
        }
        if !(timeframe_ms.is_finite() && timeframe_ms >= 0.0) {
            return Err(AnimationError::InvalidConfig(format!(
                "chain timeframe must be non-negative, got {timeframe_ms}"
            )));
        }
        self.timing = Timing::Offsets {
            offsets,
            timeframe_ms,
        };
        Ok(self)
    }

    /// Mirror the order; offset slots keep their times
    pub fn reversed(mut self) -> Self {
        self.controllers.reverse();
        self
    }

    pub fn len(&self) -> usize {
        self.controllers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty()
    }

    /// Start the chain
    ///
    /// Offsets only apply to this run; running again starts from scratch.
    pub fn run(&self) -> Result<ChainHandle> {
        let token = CancelToken::new();
        let completion = match &self.timing {
            Timing::Offsets {
                offsets,
                timeframe_ms,
            } => {
                let mut pending = Vec::with_capacity(self.controllers.len());
                for (controller, offset) in self.controllers.iter().zip(offsets) {
                    pending.push(controller.start_with_delay((offset * timeframe_ms).round())?);
                }
                async move { join_all(pending).await.into_iter().flatten().collect() }.boxed_local()
            }
            Timing::Completion => self.run_sequential(&token)?,
        };

        tracing::debug!("chain of {} controllers started", self.controllers.len());
        Ok(ChainHandle {
            completion,
            token,
            controllers: self.controllers.clone(),
        })
    }

    fn run_sequential(&self, token: &CancelToken) -> Result<Completion> {
        let Some((first, rest)) = self.controllers.split_first() else {
            return Ok(futures::future::ready(Vec::new()).boxed_local());
        };

        // Hold back every later queue so nothing starts early
        let mut held = Vec::with_capacity(rest.len());
        for controller in rest {
            held.push((controller.clone(), controller.take_queue()?));
        }
        let first_done = first.start()?;

        let (done, receiver) = oneshot::channel();
        let token = token.clone();
        let task = async move {
            let mut results = first_done.await;
            for (controller, queue) in held {
                if token.is_cancelled() {
                    break;
                }
                let started = controller
                    .restore_queue(queue)
                    .and_then(|()| controller.start());
                match started {
                    Ok(completion) => results.extend(completion.await),
                    Err(err) => {
                        tracing::warn!("chain stopped: {}", err);
                        break;
                    }
                }
            }
            let _ = done.send(results);
        };
        first.scheduler().upgrade()?.spawn(task);

        Ok(receiver.map(|result| result.unwrap_or_default()).boxed_local())
    }
}

/// A running chain
///
/// Resolves with the results of every controller that ran.
pub struct ChainHandle {
    completion: Completion,
    token: CancelToken,
    controllers: Vec<ControllerHandle>,
}

impl ChainHandle {
    /// Stop every controller and skip the ones not started yet
    pub fn cancel(&self) {
        self.token.cancel();
        for controller in &self.controllers {
            if let Err(err) = controller.stop(None) {
                tracing::debug!("chain cancel skipped controller: {}", err);
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Future for ChainHandle {
    type Output = Vec<AnimationResult>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.completion.poll_unpin(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::{Controller, UpdateProps};
    use crate::host::ManualHost;
    use crate::scheduler::AnimationScheduler;
    use std::rc::Rc;

    #[test]
    fn test_offsets_validated() {
        let scheduler = AnimationScheduler::new(Rc::new(ManualHost::new()));
        let a = Controller::new(&scheduler.handle(), [("x", 0.0)]).unwrap();
        let chain = Chain::new(vec![a.handle()]);
        assert!(chain.clone().with_offsets(vec![0.0, 0.5], 100.0).is_err());
        assert!(chain.clone().with_offsets(vec![-1.0], 100.0).is_err());
        assert!(chain.with_offsets(vec![0.5], 100.0).is_ok());
    }

    #[test]
    fn test_empty_chain_resolves() {
        let results = Chain::new(Vec::new()).run().unwrap().now_or_never();
        assert_eq!(results, Some(Vec::new()));
    }

    #[test]
    fn test_reversed_chain_starts_last_controller_first() {
        let host = Rc::new(ManualHost::new());
        let scheduler = AnimationScheduler::new(host.clone());
        let a = Controller::new(&scheduler.handle(), [("x", 0.0)]).unwrap();
        let b = Controller::new(&scheduler.handle(), [("y", 0.0)]).unwrap();
        a.update(UpdateProps::new().to("x", 1.0)).unwrap();
        b.update(UpdateProps::new().to("y", 1.0)).unwrap();

        let _chain = Chain::new(vec![a.handle(), b.handle()]).reversed().run().unwrap();
        host.run_frames(2, 16.0);
        assert!(b.is_animating());
        assert!(!a.is_animating());
    }
}
