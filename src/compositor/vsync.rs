//! Vsync correlation
//!
//! Every committed configuration is queued with its stamp and frame number.
//! A vsync carrying stamp `S` confirms not only the frame committed with `S`
//! but every earlier queued frame as well: those configurations were
//! superseded before getting a vsync of their own, and the hardware has
//! necessarily moved past them. Draining the queue prefix keeps release
//! notifications exactly-once and in submission order.

use tracing::info;

use crate::backend::display::ConfigStamp;
use crate::utils::Timestamp;

use super::DisplayCompositor;

impl DisplayCompositor {
    /// Handle one vsync notification from the display driver.
    ///
    /// Repeated vsyncs of an already-confirmed configuration and stamps this
    /// compositor never produced (e.g. from before a restart) are ignored.
    #[profiling::function]
    pub fn on_vsync(&self, timestamp: Timestamp, applied_stamp: ConfigStamp) {
        let _guard = self.span.enter();

        let presented: Vec<u64> = {
            let mut shared = self.shared.lock().unwrap();
            if shared.last_presented_stamp == Some(applied_stamp) {
                return;
            }
            let Some(position) = shared
                .pending_configs
                .iter()
                .position(|pending| pending.stamp == applied_stamp)
            else {
                info!(?applied_stamp, "vsync with an unrecognized configuration stamp, skipped");
                return;
            };
            shared.last_presented_stamp = Some(applied_stamp);
            shared
                .pending_configs
                .drain(..=position)
                .map(|pending| pending.frame_number)
                .collect()
        };

        // Notified outside the lock; the scheduler may do arbitrary work.
        for frame_number in presented {
            self.scheduler.on_vsync(frame_number, timestamp);
        }
    }
}
