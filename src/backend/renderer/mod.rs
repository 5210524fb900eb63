//! The GPU rendering backend contract
//!
//! When a scene cannot be expressed with hardware layers, the compositor asks
//! a [`Renderer`] to composite it into a render target instead. The renderer
//! is also the format authority for every imported buffer collection: its
//! constraints are set first, and a collection the renderer rejects is
//! unusable regardless of display support.

use std::fmt;

use crate::backend::allocator::{
    BufferCollectionUsage, CollectionId, CollectionToken, ImageId, ImageMetadata, PixelFormat,
};
use crate::utils::{ImageRect, Size};

pub mod sync;

use self::sync::Event;

/// Errors reported by a [`Renderer`].
#[derive(Debug, thiserror::Error)]
pub enum RendererError {
    /// The renderer could not negotiate constraints for the collection
    #[error("The renderer could not negotiate constraints for the collection")]
    CollectionRejected,
    /// The renderer could not import the image
    #[error("The renderer could not import the image")]
    ImportFailed,
}

/// The GPU rendering backend.
///
/// `render` is asynchronous: the call returns once the work is queued, and the
/// supplied fences are signaled when the GPU finishes. The compositor never
/// blocks on them; downstream reuse is gated by non-blocking polls.
pub trait Renderer: fmt::Debug + Send + Sync {
    /// Register a buffer collection and contribute the renderer's constraints
    /// to its negotiation.
    fn import_buffer_collection(
        &self,
        collection_id: CollectionId,
        token: CollectionToken,
        usage: BufferCollectionUsage,
        size: Option<Size>,
    ) -> Result<(), RendererError>;

    /// Drop a previously imported buffer collection.
    fn release_buffer_collection(&self, collection_id: CollectionId, usage: BufferCollectionUsage);

    /// Register a single image out of an already imported collection.
    fn import_buffer_image(
        &self,
        metadata: &ImageMetadata,
        usage: BufferCollectionUsage,
    ) -> Result<(), RendererError>;

    /// Drop a previously imported image.
    fn release_buffer_image(&self, image_id: ImageId);

    /// Composite `images`, placed at `rectangles`, into `target`.
    ///
    /// `rectangles` and `images` are parallel, ordered back to front. Every
    /// fence in `release_fences` is signaled once the rendering work has
    /// completed on the GPU. If `apply_color_conversion` is set, the global
    /// color-conversion values are applied as part of the pass.
    fn render(
        &self,
        target: &ImageMetadata,
        rectangles: &[ImageRect],
        images: &[ImageMetadata],
        release_fences: &[Event],
        apply_color_conversion: bool,
    );

    /// Pick the preferred render-target format out of `available`, or `None`
    /// if the renderer supports none of them.
    fn choose_preferred_format(&self, available: &[PixelFormat]) -> Option<PixelFormat>;

    /// Whether this renderer can render into protected memory at all.
    fn supports_render_in_protected(&self) -> bool;

    /// Whether compositing `images` must happen in protected memory
    /// (e.g. because one of them is DRM-protected content).
    fn requires_render_in_protected(&self, images: &[ImageMetadata]) -> bool;

    /// Set the global color-conversion values applied when a `render` call
    /// requests color conversion.
    fn set_color_conversion_values(
        &self,
        coefficients: [f32; 9],
        preoffsets: [f32; 3],
        postoffsets: [f32; 3],
    );
}
