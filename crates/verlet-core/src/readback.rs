//! Asynchronous device-to-host copies of particle positions.
//!
//! A readback is queued on the device pool and resolves a [`ReadbackHandle`]
//! when the copy finishes. Work that writes the particle buffer first waits
//! on [`ReadbackQueue::fence`], so a readback always observes the frame that
//! was complete when it was requested.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Condvar, Mutex, PoisonError, RwLock};
use std::task::{Context, Poll, Waker};

use rayon::prelude::*;

use crate::device::Device;
use crate::error::SimulationDeviceError;
use crate::particle::Particle;

pub type Positions = Vec<[f32; 3]>;

#[derive(Default)]
struct Slot {
    result: Option<Result<Positions, SimulationDeviceError>>,
    waker: Option<Waker>,
}

/// Pending result of `read_positions`.
///
/// Resolves to positions `[0, count)`. Await it, block on it with
/// [`wait`](Self::wait), or poll it with [`try_take`](Self::try_take).
pub struct ReadbackHandle {
    slot: Arc<Mutex<Slot>>,
    count: u32,
}

impl ReadbackHandle {
    /// Number of positions this readback copies.
    pub fn len(&self) -> u32 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Blocks the current thread until the copy completes.
    pub fn wait(self) -> Result<Positions, SimulationDeviceError> {
        pollster::block_on(self)
    }

    /// Takes the result if the copy has completed.
    pub fn try_take(&mut self) -> Option<Result<Positions, SimulationDeviceError>> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .result
            .take()
    }
}

impl Future for ReadbackHandle {
    type Output = Result<Positions, SimulationDeviceError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        match slot.result.take() {
            Some(result) => Poll::Ready(result),
            None => {
                slot.waker = Some(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}

fn complete(slot: &Mutex<Slot>, result: Result<Positions, SimulationDeviceError>) {
    let waker = {
        let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
        slot.result = Some(result);
        slot.waker.take()
    };
    if let Some(waker) = waker {
        waker.wake();
    }
}

/// Tracks readbacks that are still copying.
#[derive(Default)]
pub struct ReadbackQueue {
    in_flight: Arc<(Mutex<usize>, Condvar)>,
}

/// Decrements the in-flight count when the copy job ends, however it ends.
struct InFlightGuard(Arc<(Mutex<usize>, Condvar)>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let (count, cvar) = &*self.0;
        let mut count = count.lock().unwrap_or_else(PoisonError::into_inner);
        *count -= 1;
        if *count == 0 {
            cvar.notify_all();
        }
    }
}

impl ReadbackQueue {
    /// Queues a copy of positions `[0, count)` of `source` on the device pool.
    pub(crate) fn submit(
        &self,
        device: &Device,
        source: Arc<RwLock<Vec<Particle>>>,
        count: u32,
    ) -> Result<ReadbackHandle, SimulationDeviceError> {
        device.ensure_alive()?;
        let slot = Arc::new(Mutex::new(Slot::default()));
        let handle = ReadbackHandle {
            slot: Arc::clone(&slot),
            count,
        };

        {
            let (pending, _) = &*self.in_flight;
            *pending.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        }
        let guard = InFlightGuard(Arc::clone(&self.in_flight));

        device.spawn(move || {
            let _guard = guard;
            let result = match source.read() {
                Ok(particles) => particles
                    .get(..count as usize)
                    .map(|live| live.par_iter().map(|p| p.position).collect::<Positions>())
                    .ok_or(SimulationDeviceError::Lost),
                Err(_) => Err(SimulationDeviceError::Lost),
            };
            complete(&slot, result);
        });

        tracing::trace!(count, "readback queued");
        Ok(handle)
    }

    /// Blocks until every queued readback has finished copying.
    pub(crate) fn fence(&self) {
        let (count, cvar) = &*self.in_flight;
        let count = count.lock().unwrap_or_else(PoisonError::into_inner);
        let _idle = cvar
            .wait_while(count, |pending| *pending > 0)
            .unwrap_or_else(PoisonError::into_inner);
    }
}
