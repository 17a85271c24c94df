use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};

/// Per-step rendezvous between the loop thread and the receive thread.
///
/// Each `arm` opens a new generation; at most one generation is armed at a
/// time. A release names the generation it answers and is refused unless that
/// generation is the armed one.
#[derive(Debug, Default)]
pub struct StepBarrier {
    generation: u64,
    armed: Option<Armed>,
}

#[derive(Debug)]
struct Armed {
    generation: u64,
    release: Sender<()>,
}

/// Waiting half held by the loop thread.
#[derive(Debug)]
pub struct BarrierWait {
    generation: u64,
    released: Receiver<()>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Released,
    TimedOut,
    /// The barrier was disarmed without being released.
    Abandoned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseRefused {
    NotArmed,
    Stale { armed: u64, requested: u64 },
}

impl StepBarrier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the next generation. Fails with the pending generation if one is still armed.
    pub fn arm(&mut self) -> Result<BarrierWait, u64> {
        if let Some(armed) = &self.armed {
            return Err(armed.generation);
        }
        self.generation += 1;
        let (release, released) = bounded(1);
        self.armed = Some(Armed {
            generation: self.generation,
            release,
        });
        Ok(BarrierWait {
            generation: self.generation,
            released,
        })
    }

    pub fn armed_generation(&self) -> Option<u64> {
        self.armed.as_ref().map(|armed| armed.generation)
    }

    /// Most recently armed generation, whether or not it is still pending.
    pub fn last_generation(&self) -> u64 {
        self.generation
    }

    pub fn release(&mut self, generation: u64) -> Result<(), ReleaseRefused> {
        let armed = self.armed.as_ref().ok_or(ReleaseRefused::NotArmed)?;
        if armed.generation != generation {
            return Err(ReleaseRefused::Stale {
                armed: armed.generation,
                requested: generation,
            });
        }
        if let Some(armed) = self.armed.take() {
            // Capacity one and a single release per generation, so this never blocks.
            let _ = armed.release.try_send(());
        }
        Ok(())
    }

    /// Drop the armed generation without releasing it; its waiter sees `Abandoned`.
    pub fn disarm(&mut self) -> Option<u64> {
        self.armed.take().map(|armed| armed.generation)
    }
}

impl BarrierWait {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn wait(&self, timeout: Duration) -> WaitOutcome {
        match self.released.recv_timeout(timeout) {
            Ok(()) => WaitOutcome::Released,
            Err(RecvTimeoutError::Timeout) => WaitOutcome::TimedOut,
            Err(RecvTimeoutError::Disconnected) => WaitOutcome::Abandoned,
        }
    }

    /// Non-blocking check used to settle a release that raced with a timeout.
    pub fn try_released(&self) -> bool {
        match self.released.try_recv() {
            Ok(()) => true,
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => false,
        }
    }
}
