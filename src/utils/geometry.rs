//! Common geometry types
//!
//! Scene placement is described in floating-point display coordinates
//! ([`ImageRect`]), because clients may position content sub-pixel. The
//! display driver consumes integer source/destination frames ([`Frame`]);
//! the conversion truncates, matching the behavior of the hardware path.

/// A point in floating-point display coordinates.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Point {
    /// Horizontal coordinate
    pub x: f32,
    /// Vertical coordinate
    pub y: f32,
}

impl From<(f32, f32)> for Point {
    #[inline]
    fn from((x, y): (f32, f32)) -> Self {
        Point { x, y }
    }
}

/// A size in pixels, e.g. the dimensions of a display mode or an image.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Size {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl From<(u32, u32)> for Size {
    #[inline]
    fn from((width, height): (u32, u32)) -> Self {
        Size { width, height }
    }
}

/// Clockwise rotation applied to an image's content before placement.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Orientation {
    /// Content is unrotated
    #[default]
    Normal,
    /// Content is rotated by 90 degrees clockwise
    Rotate90,
    /// Content is rotated by 180 degrees
    Rotate180,
    /// Content is rotated by 270 degrees clockwise
    Rotate270,
}

/// The on-screen placement of one image for one frame.
///
/// `extent` describes the final footprint on the display, after
/// `orientation` has been applied to the content.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct ImageRect {
    /// Top-left corner in display coordinates
    pub origin: Point,
    /// Width and height of the on-screen footprint
    pub extent: Point,
    /// Rotation applied to the image content
    pub orientation: Orientation,
}

impl ImageRect {
    /// Create a rect from its top-left corner and footprint, without rotation.
    pub fn new(origin: impl Into<Point>, extent: impl Into<Point>) -> Self {
        ImageRect {
            origin: origin.into(),
            extent: extent.into(),
            orientation: Orientation::Normal,
        }
    }

    /// A rect covering a full display of the given dimensions.
    pub fn fullscreen(size: Size) -> Self {
        ImageRect::new((0., 0.), (size.width as f32, size.height as f32))
    }

    /// Whether this rect exactly covers a display of the given dimensions.
    pub fn covers(&self, size: Size) -> bool {
        self.origin.x == 0.
            && self.origin.y == 0.
            && self.extent.x == size.width as f32
            && self.extent.y == size.height as f32
    }
}

/// An axis-aligned integer rectangle as consumed by the display driver
/// for layer source and destination frames.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Frame {
    /// Horizontal position of the top-left corner
    pub x: u32,
    /// Vertical position of the top-left corner
    pub y: u32,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl Frame {
    /// A frame at the origin with the given dimensions.
    pub fn from_size(width: u32, height: u32) -> Self {
        Frame {
            x: 0,
            y: 0,
            width,
            height,
        }
    }

    /// The destination frame for an [`ImageRect`], truncated to pixels.
    pub fn from_rect(rect: ImageRect) -> Self {
        Frame {
            x: rect.origin.x as u32,
            y: rect.origin.y as u32,
            width: rect.extent.x as u32,
            height: rect.extent.y as u32,
        }
    }

    /// Whether either dimension is zero.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fullscreen_rect_covers_display() {
        let size = Size::from((1920, 1080));
        assert!(ImageRect::fullscreen(size).covers(size));
    }

    #[test]
    fn offset_rect_does_not_cover_display() {
        let size = Size::from((1920, 1080));
        let rect = ImageRect::new((1., 0.), (1920., 1080.));
        assert!(!rect.covers(size));
    }

    #[test]
    fn undersized_rect_does_not_cover_display() {
        let size = Size::from((1920, 1080));
        let rect = ImageRect::new((0., 0.), (1280., 720.));
        assert!(!rect.covers(size));
    }

    #[test]
    fn frame_truncates_subpixel_placement() {
        let rect = ImageRect::new((10.7, 3.2), (100.9, 50.1));
        let frame = Frame::from_rect(rect);
        assert_eq!(
            frame,
            Frame {
                x: 10,
                y: 3,
                width: 100,
                height: 50
            }
        );
    }
}
