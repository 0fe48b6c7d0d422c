//! Ownership of the live synthesis and playback processes.
//!
//! The supervisor holds at most one handle per [`Slot`]. A handle is not the
//! child process itself: the stage that spawned the child keeps it and waits
//! on it, while the slot keeps the sending half of a oneshot channel. `stop()`
//! takes the handles out of their slots under the guard and fires them; the
//! owning stage sees the signal, terminates its own children and reaps them.
//! This way the guard is never held across a wait, and a process is only
//! ever signalled by the task that still owns its (unreaped) PID.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::process::Child;
use tokio::sync::oneshot;

use crate::error::EngineError;

/// How long a child gets to exit after SIGTERM before it is killed.
const TERMINATE_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Synthesis,
    Playback,
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Synthesis => f.write_str("synthesis"),
            Slot::Playback => f.write_str("playback"),
        }
    }
}

struct Handle {
    id: u64,
    cancel: oneshot::Sender<()>,
}

impl Handle {
    /// Signal the owner. Returns false if the owner already went away.
    fn fire(self) -> bool {
        !self.cancel.is_closed() && self.cancel.send(()).is_ok()
    }
}

#[derive(Default)]
struct Slots {
    synthesis: Option<Handle>,
    playback: Option<Handle>,
}

impl Slots {
    fn get_mut(&mut self, slot: Slot) -> &mut Option<Handle> {
        match slot {
            Slot::Synthesis => &mut self.synthesis,
            Slot::Playback => &mut self.playback,
        }
    }
}

#[derive(Default)]
struct Inner {
    slots: Mutex<Slots>,
    next_id: AtomicU64,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Slots> {
        // A panic while holding the guard cannot leave the slots half
        // written, so a poisoned lock is still usable.
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Shared owner of the two process slots. Cloning shares the same slots.
#[derive(Clone, Default)]
pub struct Supervisor {
    inner: Arc<Inner>,
}

impl Supervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `spawn` while holding the guard and register the result in
    /// `slot`. Because the spawn happens under the same lock `stop()` uses,
    /// a concurrent `stop()` either runs before the process exists or sees
    /// its handle; it can never miss it.
    pub fn launch<T, F>(&self, slot: Slot, spawn: F) -> Result<(T, Registration), EngineError>
    where
        F: FnOnce() -> Result<T, EngineError>,
    {
        let mut slots = self.inner.lock();
        let value = spawn()?;
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        if let Some(stale) = slots.get_mut(slot).replace(Handle { id, cancel: tx }) {
            log::warn!("{slot} slot was still occupied; stopping the previous process");
            stale.fire();
        }
        drop(slots);
        Ok((
            value,
            Registration {
                inner: Arc::clone(&self.inner),
                slot,
                id,
                cancel: Some(rx),
                fired: false,
            },
        ))
    }

    /// Terminate whatever is registered and clear both slots. Returns the
    /// number of live handles that were signalled; 0 means nothing was
    /// running. Safe to call from any task at any time.
    pub fn stop(&self) -> usize {
        let mut slots = self.inner.lock();
        let taken = [slots.synthesis.take(), slots.playback.take()];
        let stopped = taken
            .into_iter()
            .flatten()
            .map(Handle::fire)
            .filter(|fired| *fired)
            .count();
        drop(slots);
        if stopped > 0 {
            log::info!("stopped {stopped} running process(es)");
        }
        stopped
    }

    #[cfg(test)]
    pub fn is_active(&self, slot: Slot) -> bool {
        self.inner.lock().get_mut(slot).is_some()
    }
}

/// Proof that a stage owns the handle in a slot. Dropping it clears the slot
/// (if it still belongs to this registration) on every exit path.
pub struct Registration {
    inner: Arc<Inner>,
    slot: Slot,
    id: u64,
    cancel: Option<oneshot::Receiver<()>>,
    fired: bool,
}

impl Registration {
    /// Resolves once `stop()` claimed this registration. Never resolves
    /// otherwise, so it is meant to race the child's wait in a `select!`.
    pub async fn cancelled(&mut self) {
        if self.fired {
            return;
        }
        let Some(rx) = self.cancel.as_mut() else {
            return std::future::pending().await;
        };
        match rx.await {
            Ok(()) => self.fired = true,
            Err(_) => {
                self.cancel = None;
                std::future::pending::<()>().await;
            }
        }
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        let mut slots = self.inner.lock();
        let entry = slots.get_mut(self.slot);
        if entry.as_ref().is_some_and(|handle| handle.id == self.id) {
            *entry = None;
        }
    }
}

/// Ask `child` to exit with SIGTERM, escalating to SIGKILL after a short
/// grace period, and reap it.
pub async fn terminate(child: &mut Child, label: &str) {
    #[cfg(unix)]
    {
        use nix::errno::Errno;
        use nix::sys::signal::{self, Signal};
        use nix::unistd::Pid;

        if let Some(pid) = child.id().and_then(|pid| i32::try_from(pid).ok()) {
            match signal::kill(Pid::from_raw(pid), Signal::SIGTERM) {
                Ok(()) => {
                    if let Ok(result) = tokio::time::timeout(TERMINATE_GRACE, child.wait()).await {
                        log::debug!("{label} terminated: {result:?}");
                        return;
                    }
                    log::warn!("{label} ignored SIGTERM; killing it");
                }
                Err(Errno::ESRCH) => {}
                Err(e) => log::warn!("failed to signal {label}: {e}"),
            }
        }
    }
    if let Err(e) = child.kill().await {
        log::debug!("failed to kill {label}: {e}");
    }
}
