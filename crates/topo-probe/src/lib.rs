//! The probe lifecycle (§4.B): a uniform `Start`/`Stop` discipline shared by
//! the netlink, namespace, OVSDB, and Docker probes, each of which owns its
//! own background loop and host connection but reports through the same
//! atomic state machine.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use tokio::sync::Notify;
use tracing::warn;

/// A probe's lifecycle state (§4.B). Transitions are one-directional and
/// terminal: `Stopped → Running → Stopping → Stopped`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProbeState {
    Stopped,
    Running,
    Stopping,
}

impl ProbeState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            0 => ProbeState::Stopped,
            1 => ProbeState::Running,
            _ => ProbeState::Stopping,
        }
    }

    fn to_raw(self) -> u8 {
        match self {
            ProbeState::Stopped => 0,
            ProbeState::Running => 1,
            ProbeState::Stopping => 2,
        }
    }
}

/// The shared state machine a probe's background task polls, and that its
/// `Stop()` waits on.
///
/// Separated from the `Probe` trait itself so a probe's background loop can
/// hold an `Arc<ProbeLifecycle>` independent of the probe object's own
/// lifetime (the loop runs in a detached `tokio::spawn`, not borrowing the
/// probe).
pub struct ProbeLifecycle {
    state: AtomicU8,
    quiesced: Notify,
}

impl Default for ProbeLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl ProbeLifecycle {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(ProbeState::Stopped.to_raw()),
            quiesced: Notify::new(),
        }
    }

    pub fn state(&self) -> ProbeState {
        ProbeState::from_raw(self.state.load(Ordering::Acquire))
    }

    /// `Start()`: `Stopped → Running`. Returns `false` if already running or
    /// stopping (idempotent against a concurrent/duplicate start).
    pub fn try_start(&self) -> bool {
        self.state
            .compare_exchange(
                ProbeState::Stopped.to_raw(),
                ProbeState::Running.to_raw(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Signal the background loop to stop. Idempotent: a probe that is
    /// already `Stopping` or `Stopped` is left alone.
    pub fn request_stop(&self) {
        let _ = self.state.compare_exchange(
            ProbeState::Running.to_raw(),
            ProbeState::Stopping.to_raw(),
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Polled by the background loop between iterations.
    pub fn should_continue(&self) -> bool {
        self.state() == ProbeState::Running
    }

    /// Called by the background loop on its way out, however it got there.
    pub fn mark_stopped(&self) {
        self.state.store(ProbeState::Stopped.to_raw(), Ordering::Release);
        self.quiesced.notify_waiters();
    }

    /// `Stop()`'s blocking half: waits until the loop has called
    /// `mark_stopped`. Returns immediately if already stopped.
    pub async fn wait_stopped(&self) {
        loop {
            if self.state() == ProbeState::Stopped {
                return;
            }
            let notified = self.quiesced.notified();
            if self.state() == ProbeState::Stopped {
                return;
            }
            notified.await;
        }
    }
}

/// Common shape implemented by every probe (netlink, netns, ovsdb, docker).
///
/// `start`/`stop` are the only entry points the process wiring (`topo-agent`)
/// needs; each probe's actual translation logic lives in its own crate
/// behind this uniform lifecycle.
pub trait Probe: Send + Sync {
    /// Short name used as this probe's configuration key and tracing span
    /// (§4.B "Probe identity & logging").
    fn name(&self) -> &'static str;

    /// Non-blocking: launches the probe's background work. A no-op if
    /// already running.
    fn start(self: Arc<Self>);

    /// Idempotent; the returned future resolves once the background loop
    /// has quiesced (§4.B, §8 invariant 6).
    fn stop<'a>(&'a self) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

    fn state(&self) -> ProbeState;
}

/// Runs `body` as the guarded interior of a probe's background loop: checks
/// `should_continue` before each iteration and calls `mark_stopped` on the
/// way out, regardless of why `body` returned. Probes use this so their own
/// loop code only has to express "one iteration of work", not the
/// state-machine bookkeeping around it.
pub async fn run_guarded_loop<F, Fut>(lifecycle: Arc<ProbeLifecycle>, probe_name: &'static str, mut body: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    while lifecycle.should_continue() {
        body().await;
    }
    lifecycle.mark_stopped();
    warn!(probe = probe_name, "probe loop exited");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_from_stopped_and_rejects_double_start() {
        let lc = ProbeLifecycle::new();
        assert!(lc.try_start());
        assert_eq!(lc.state(), ProbeState::Running);
        assert!(!lc.try_start(), "second start is rejected while running");
    }

    #[tokio::test]
    async fn stop_waits_for_loop_to_quiesce() {
        let lc = Arc::new(ProbeLifecycle::new());
        assert!(lc.try_start());

        let loop_lc = lc.clone();
        let handle = tokio::spawn(async move {
            run_guarded_loop(loop_lc, "test", || async {
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            })
            .await;
        });

        lc.request_stop();
        lc.wait_stopped().await;
        assert_eq!(lc.state(), ProbeState::Stopped);
        handle.await.unwrap();
    }

    #[test]
    fn request_stop_is_idempotent_when_already_stopped() {
        let lc = ProbeLifecycle::new();
        lc.request_stop();
        assert_eq!(lc.state(), ProbeState::Stopped);
    }
}
