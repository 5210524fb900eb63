//! The display-controller transport contract
//!
//! A [`DisplayDriver`] exposes the hardware's compositing primitives: a pool
//! of layers that can be bound to images or solid colors, and a *draft
//! configuration* that is built up by the layer setters, feasibility-checked
//! with [`check_config`](DisplayDriver::check_config) and committed with
//! [`apply_config`](DisplayDriver::apply_config). Applying returns an opaque
//! [`ConfigStamp`] that a later vsync notification carries back, which is how
//! presentation is correlated to frames.
//!
//! Drafting calls are fire-and-forget: an infeasible draft is reported by the
//! feasibility check, not by the individual setters.

use std::fmt;

use crate::backend::allocator::{
    BlendMode, CollectionId, CollectionToken, FormatModifier, ImageFlip, ImageId, PixelFormat,
};
use crate::backend::renderer::sync::Event;
use crate::utils::{Frame, Orientation, Size, Timestamp};

/// Identifier of a connected physical display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DisplayId(pub u64);

/// Handle to a hardware compositing layer created through the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LayerId(pub u64);

/// Driver-side handle to an imported completion [`Event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventId(pub u64);

impl EventId {
    /// The reserved invalid event id, meaning "no event".
    pub const INVALID: EventId = EventId(0);
}

/// Opaque identifier of an applied configuration, correlated with vsync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConfigStamp(pub u64);

/// Static properties of a display relevant to composition.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayInfo {
    /// Dimensions of the active mode in pixels
    pub dimensions: Size,
    /// Pixel formats the display can scan out, in preference order
    pub formats: Vec<PixelFormat>,
}

/// How a layer's alpha channel is treated by the hardware blender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlphaMode {
    /// Alpha is ignored; the layer is opaque
    Disable,
    /// The layer's color channels are premultiplied by alpha
    Premultiplied,
}

impl From<BlendMode> for AlphaMode {
    fn from(blend_mode: BlendMode) -> Self {
        match blend_mode {
            BlendMode::Src => AlphaMode::Disable,
            BlendMode::SrcOver => AlphaMode::Premultiplied,
        }
    }
}

/// The eight transforms display hardware can apply while scanning out.
///
/// `Flipped*` variants mirror about the vertical axis first, then rotate
/// clockwise by the given amount.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transform {
    /// Content is passed through unaltered
    #[default]
    Normal,
    /// Rotated by 90 degrees clockwise
    Rotate90,
    /// Rotated by 180 degrees
    Rotate180,
    /// Rotated by 270 degrees clockwise
    Rotate270,
    /// Mirrored about the vertical axis
    Flipped,
    /// Mirrored, then rotated by 90 degrees clockwise
    Flipped90,
    /// Mirrored, then rotated by 180 degrees
    Flipped180,
    /// Mirrored, then rotated by 270 degrees clockwise
    Flipped270,
}

impl Transform {
    /// The hardware transform expressing `orientation` followed by `flip`.
    ///
    /// An up-down mirror equals a left-right mirror composed with a 180
    /// degree rotation, which is how the second row folds into the
    /// `Flipped*` variants.
    pub fn from_orientation_and_flip(orientation: Orientation, flip: ImageFlip) -> Transform {
        match (orientation, flip) {
            (Orientation::Normal, ImageFlip::None) => Transform::Normal,
            (Orientation::Rotate90, ImageFlip::None) => Transform::Rotate90,
            (Orientation::Rotate180, ImageFlip::None) => Transform::Rotate180,
            (Orientation::Rotate270, ImageFlip::None) => Transform::Rotate270,
            (Orientation::Normal, ImageFlip::LeftRight) => Transform::Flipped,
            (Orientation::Rotate90, ImageFlip::LeftRight) => Transform::Flipped90,
            (Orientation::Rotate180, ImageFlip::LeftRight) => Transform::Flipped180,
            (Orientation::Rotate270, ImageFlip::LeftRight) => Transform::Flipped270,
            (Orientation::Normal, ImageFlip::UpDown) => Transform::Flipped180,
            (Orientation::Rotate90, ImageFlip::UpDown) => Transform::Flipped270,
            (Orientation::Rotate180, ImageFlip::UpDown) => Transform::Flipped,
            (Orientation::Rotate270, ImageFlip::UpDown) => Transform::Flipped90,
        }
    }
}

/// Geometry and format of an image as the display driver sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageConfig {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Pixel format the backing collection allocated with
    pub format: PixelFormat,
    /// Tiling modifier the backing collection allocated with
    pub modifier: FormatModifier,
}

/// Outcome of a draft-configuration feasibility check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigResult {
    /// The draft can be applied as-is
    Ok,
    /// The draft is malformed (e.g. a layer without an image)
    InvalidConfig,
    /// The hardware cannot scan the draft out
    UnsupportedConfig,
    /// More displays are configured than the hardware supports
    TooManyDisplays,
    /// A configured display mode is not supported
    UnsupportedDisplayModes,
}

/// Errors reported by a [`DisplayDriver`].
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// The driver rejected the resource import
    #[error("The display driver rejected the resource import")]
    ImportRejected,
    /// The driver has no free layers left
    #[error("The display driver has no free layers left")]
    NoFreeLayers,
    /// The transport to the driver failed
    #[error("The transport to the display driver failed")]
    Transport,
}

/// The display-controller transport.
///
/// All calls are synchronous; the compositor serializes them under its own
/// lock so a concurrently delivered vsync can never observe a torn call
/// sequence.
pub trait DisplayDriver: fmt::Debug + Send + Sync {
    /// Create a new layer usable on any display of this driver.
    fn create_layer(&self) -> Result<LayerId, DriverError>;

    /// Destroy a layer previously created with
    /// [`create_layer`](DisplayDriver::create_layer).
    fn destroy_layer(&self, layer: LayerId);

    /// Set the active layers of `display`, front of the slice being the
    /// bottommost layer. Layers not listed are detached.
    fn set_display_layers(&self, display: DisplayId, layers: &[LayerId]);

    /// Draft: set the image geometry/format a layer will be bound to.
    fn set_layer_image_config(&self, layer: LayerId, config: ImageConfig);

    /// Draft: set a layer's scanout transform and source/destination frames.
    fn set_layer_position(&self, layer: LayerId, transform: Transform, src: Frame, dst: Frame);

    /// Draft: set a layer's alpha mode and plane-wide alpha value.
    fn set_layer_alpha(&self, layer: LayerId, mode: AlphaMode, alpha: f32);

    /// Draft: bind an imported image to a layer.
    ///
    /// Scanout begins once `wait` is signaled ([`EventId::INVALID`] for
    /// "immediately"); the driver signals `signal` once the image is no
    /// longer being scanned out and may be reused.
    fn set_layer_image(&self, layer: LayerId, image: ImageId, wait: EventId, signal: EventId);

    /// Draft: turn a layer into a solid-color fill covering the display.
    fn set_layer_color(&self, layer: LayerId, format: PixelFormat, color: [u8; 4]);

    /// Program the display-wide color conversion: `c * coefficients +
    /// postoffsets`, with `preoffsets` added before the matrix.
    fn set_display_color_conversion(
        &self,
        display: DisplayId,
        preoffsets: [f32; 3],
        coefficients: [f32; 9],
        postoffsets: [f32; 3],
    );

    /// Check whether the current draft configuration is feasible, without
    /// applying it. With `discard` set, the draft is thrown away as well.
    fn check_config(&self, discard: bool) -> ConfigResult;

    /// Atomically apply the draft configuration, returning the stamp the
    /// matching vsync notification will carry.
    fn apply_config(&self) -> ConfigStamp;

    /// Register a buffer collection with the display hardware, contributing
    /// scanout constraints to its negotiation. `format` restricts the
    /// negotiation to one pixel format, if given.
    fn import_buffer_collection(
        &self,
        collection_id: CollectionId,
        token: CollectionToken,
        format: Option<PixelFormat>,
    ) -> Result<(), DriverError>;

    /// Drop a previously imported buffer collection.
    fn release_buffer_collection(&self, collection_id: CollectionId);

    /// Register a single image out of an imported, allocated collection for
    /// scanout.
    fn import_image(
        &self,
        config: ImageConfig,
        collection_id: CollectionId,
        image_id: ImageId,
        vmo_index: u32,
    ) -> Result<(), DriverError>;

    /// Drop a previously imported image.
    fn release_image(&self, image_id: ImageId);

    /// Share a completion event with the driver, returning the id used to
    /// reference it in [`set_layer_image`](DisplayDriver::set_layer_image).
    fn import_event(&self, event: Event) -> EventId;

    /// Drop a previously imported event.
    fn release_event(&self, event: EventId);

    /// Clamp every output channel to at least `minimum` (black-level floor).
    fn set_minimum_rgb(&self, minimum: u8) -> Result<(), DriverError>;
}

/// Callback invoked on every vsync with the timestamp and the stamp of the
/// configuration that was live during that vsync.
pub type VsyncCallback = Box<dyn FnMut(Timestamp, ConfigStamp) + Send>;

/// A source of vsync notifications for one display.
///
/// The compositor registers a callback holding a weak back-reference to
/// itself, so an outlived registration degrades to a no-op instead of keeping
/// the compositor alive.
pub trait VsyncSource: fmt::Debug {
    /// Register `callback`, replacing any previously registered one.
    fn set_vsync_callback(&self, callback: VsyncCallback);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blend_mode_maps_to_alpha_mode() {
        assert_eq!(AlphaMode::from(BlendMode::Src), AlphaMode::Disable);
        assert_eq!(AlphaMode::from(BlendMode::SrcOver), AlphaMode::Premultiplied);
    }

    #[test]
    fn plain_rotations_map_through() {
        assert_eq!(
            Transform::from_orientation_and_flip(Orientation::Normal, ImageFlip::None),
            Transform::Normal
        );
        assert_eq!(
            Transform::from_orientation_and_flip(Orientation::Rotate270, ImageFlip::None),
            Transform::Rotate270
        );
    }

    #[test]
    fn up_down_flip_folds_into_mirror_plus_180() {
        assert_eq!(
            Transform::from_orientation_and_flip(Orientation::Normal, ImageFlip::UpDown),
            Transform::Flipped180
        );
        assert_eq!(
            Transform::from_orientation_and_flip(Orientation::Rotate180, ImageFlip::UpDown),
            Transform::Flipped
        );
    }
}
