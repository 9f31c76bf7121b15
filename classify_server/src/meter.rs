use std::{
    ops::Deref,
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use tokio::{task::JoinHandle, time::interval};
use tract_onnx::prelude::Tensor;

/// Counters and gauges of the capture/predict pipeline.
#[derive(Debug, Default)]
pub struct Meter {
    sampled_frames: AtomicU64,
    forward_passes: AtomicU64,
    predictions: AtomicU64,
    live_tensors: AtomicUsize,
    active_loops: AtomicUsize,
}

impl Meter {
    pub const fn new() -> Meter {
        Meter {
            sampled_frames: AtomicU64::new(0),
            forward_passes: AtomicU64::new(0),
            predictions: AtomicU64::new(0),
            live_tensors: AtomicUsize::new(0),
            active_loops: AtomicUsize::new(0),
        }
    }

    pub fn tick_sampled(&self) {
        self.sampled_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn tick_forward(&self) {
        self.forward_passes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn tick_prediction(&self) {
        self.predictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn sampled_frames(&self) -> u64 {
        self.sampled_frames.load(Ordering::Relaxed)
    }

    pub fn forward_passes(&self) -> u64 {
        self.forward_passes.load(Ordering::Relaxed)
    }

    pub fn predictions(&self) -> u64 {
        self.predictions.load(Ordering::Relaxed)
    }

    pub fn live_tensors(&self) -> usize {
        self.live_tensors.load(Ordering::SeqCst)
    }

    pub fn active_loops(&self) -> usize {
        self.active_loops.load(Ordering::SeqCst)
    }

    /// Take ownership of a tensor, counting it as alive for as long as the lease holds it.
    pub fn lease_tensor(&self, tensor: Tensor) -> TensorLease<'_> {
        self.live_tensors.fetch_add(1, Ordering::SeqCst);
        TensorLease {
            tensor,
            _live: LiveTensor { meter: self },
        }
    }

    /// Register a running sampling loop until the returned guard is dropped.
    pub fn enter_loop(self: &Arc<Self>) -> LoopGuard {
        self.active_loops.fetch_add(1, Ordering::SeqCst);
        LoopGuard {
            meter: Arc::clone(self),
        }
    }
}

/// A tensor counted as alive in the meter. The count drops with the tensor, or when the
/// tensor is handed on with [`TensorLease::into_inner`].
#[must_use]
pub struct TensorLease<'a> {
    tensor: Tensor,
    _live: LiveTensor<'a>,
}

impl TensorLease<'_> {
    pub fn into_inner(self) -> Tensor {
        self.tensor
    }
}

impl Deref for TensorLease<'_> {
    type Target = Tensor;

    fn deref(&self) -> &Tensor {
        &self.tensor
    }
}

struct LiveTensor<'a> {
    meter: &'a Meter,
}

impl Drop for LiveTensor<'_> {
    fn drop(&mut self) {
        self.meter.live_tensors.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Keeps a sampling loop counted as active.
#[must_use]
pub struct LoopGuard {
    meter: Arc<Meter>,
}

impl Drop for LoopGuard {
    fn drop(&mut self) {
        self.meter.active_loops.fetch_sub(1, Ordering::SeqCst);
    }
}

pub fn spawn_meter_logger(meter: Arc<Meter>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut log_interval = interval(period);
        log_interval.tick().await;

        let mut last = (meter.sampled_frames(), meter.predictions());
        loop {
            let start = Instant::now();
            log_interval.tick().await;

            let current = (meter.sampled_frames(), meter.predictions());
            let elapsed = start.elapsed().as_secs_f32();
            let fps_sampled = (current.0 - last.0) as f32 / elapsed;
            let fps_predicted = (current.1 - last.1) as f32 / elapsed;
            last = current;

            if fps_sampled > 0.0 {
                log::info!("Sampled frames per second: {fps_sampled:.2}")
            }
            if fps_predicted > 0.0 {
                log::info!("Predictions per second: {fps_predicted:.2}")
            }
        }
    })
}

#[cfg(test)]
mod test {

    use super::*;

    use tract_onnx::prelude::tensor1;

    #[test]
    fn test_lease_follows_its_tensor() {
        let meter = Meter::new();
        let first = meter.lease_tensor(tensor1(&[1.0f32, 2.0]));
        let second = meter.lease_tensor(tensor1(&[3.0f32]));
        assert_eq!(meter.live_tensors(), 2);
        assert_eq!(first.len(), 2);

        // Moving a lease keeps the tensor counted
        let kept = vec![second];
        assert_eq!(meter.live_tensors(), 2);

        let tensor = first.into_inner();
        assert_eq!(meter.live_tensors(), 1);
        assert_eq!(tensor.len(), 2);

        drop(kept);
        assert_eq!(meter.live_tensors(), 0);
    }

    #[test]
    fn test_loop_guard() {
        let meter = Arc::new(Meter::new());
        let guard = meter.enter_loop();
        assert_eq!(meter.active_loops(), 1);
        drop(guard);
        assert_eq!(meter.active_loops(), 0);
    }
}
