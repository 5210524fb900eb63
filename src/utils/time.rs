//! Monotonic timestamps
//!
//! The compositor never reads a clock itself. Timestamps originate from the
//! display driver's vsync notifications and are forwarded, untouched, to the
//! release protocol.

/// A point on the system monotonic clock, in nanoseconds since an arbitrary
/// (but fixed) epoch such as boot.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Construct a timestamp from raw nanoseconds.
    pub const fn from_nanos(nanos: u64) -> Self {
        Timestamp(nanos)
    }

    /// The raw nanosecond value.
    pub const fn as_nanos(self) -> u64 {
        self.0
    }
}
