//! The downstream release/presentation protocol
//!
//! The compositor does not fire client release callbacks itself; it registers
//! every committed frame with a [`ReleaseFenceScheduler`] and later reports
//! the vsync that confirmed it. The scheduler guarantees that release
//! callbacks fire only after the frame's GPU work (if any) has finished *and*
//! the frame was confirmed on screen.

use std::fmt;

use crate::backend::renderer::sync::Event;
use crate::utils::Timestamp;

/// Callback invoked once a frame has been confirmed on screen.
pub type FramePresentedCallback = Box<dyn FnOnce(Timestamp) + Send>;

/// Downstream consumer of per-frame completion information.
///
/// Implementations must not call back into the compositor from these methods;
/// they may be invoked while the compositor services a frame.
pub trait ReleaseFenceScheduler: fmt::Debug + Send + Sync {
    /// A GPU-composited frame was committed. `render_finished` is signaled
    /// once the GPU work of *every* display in the frame has completed;
    /// `release_fences` are the caller-supplied fences to signal when the
    /// frame's resources may be reused.
    fn on_gpu_composited_frame(
        &self,
        frame_number: u64,
        render_finished: Event,
        release_fences: Vec<Event>,
        presented: FramePresentedCallback,
    );

    /// A direct-scanout frame (no GPU work) was committed.
    fn on_direct_scanout_frame(
        &self,
        frame_number: u64,
        release_fences: Vec<Event>,
        presented: FramePresentedCallback,
    );

    /// Vsync confirmed that `frame_number` was presented at `timestamp`.
    fn on_vsync(&self, frame_number: u64, timestamp: Timestamp);
}
