//! Various utility types used throughout the crate

mod geometry;
mod time;

pub use self::geometry::{Frame, ImageRect, Orientation, Point, Size};
pub use self::time::Timestamp;
