//! Buffer-collection and image import
//!
//! Collections always negotiate with the renderer; whether the display
//! hardware participates depends on the compositor's
//! [`BufferCollectionImportMode`]. Whether a given collection's allocation
//! actually turned out scanout-capable is only determined lazily, on the
//! first image imported out of it, and memoized for the collection's
//! lifetime.

use tracing::{error, info, warn};

use crate::backend::allocator::{
    BufferCollectionUsage, BufferConstraints, CollectionId, CollectionToken, ImageId, ImageMetadata,
};
use crate::backend::display::ImageConfig;
use crate::utils::Size;

use super::{BufferCollectionImportMode, DisplayCompositor, DisplaySupport, Shared};

/// Errors reported by the import entry points.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    /// The image metadata carries the reserved invalid image id
    #[error("The image metadata carries the reserved invalid image id")]
    InvalidIdentifier,
    /// The image metadata carries the reserved invalid collection id
    #[error("The image metadata carries the reserved invalid collection id")]
    InvalidCollection,
    /// The image has a zero dimension
    #[error("Image dimensions must be non-zero, got {0}x{1}")]
    EmptyImage(u32, u32),
    /// Display constraints are enforced and the collection's allocation
    /// cannot be scanned out
    #[error("The collection's allocation cannot be scanned out by the display")]
    UnsupportedByDisplay,
    /// The renderer failed
    #[error(transparent)]
    Renderer(#[from] crate::backend::renderer::RendererError),
    /// The buffer allocator failed
    #[error(transparent)]
    Allocator(#[from] crate::backend::allocator::AllocatorError),
    /// The display driver failed
    #[error(transparent)]
    Driver(#[from] crate::backend::display::DriverError),
}

impl DisplayCompositor {
    /// Register a client buffer collection for composition.
    ///
    /// The renderer always becomes a participant in the negotiation. In
    /// [`EnforceDisplayConstraints`](BufferCollectionImportMode::EnforceDisplayConstraints)
    /// mode the display hardware does too, so allocation fails rather than
    /// produce scanout-incapable buffers; in
    /// [`AttemptDisplayConstraints`](BufferCollectionImportMode::AttemptDisplayConstraints)
    /// mode its constraints are attached best-effort only.
    #[profiling::function]
    pub fn import_buffer_collection(
        &self,
        collection_id: CollectionId,
        token: CollectionToken,
        usage: BufferCollectionUsage,
        size: Option<Size>,
    ) -> Result<(), ImportError> {
        let _guard = self.span.enter();
        debug_assert_eq!(usage, BufferCollectionUsage::ClientImage);

        // Duplicate before the renderer consumes the original token.
        let display_token = self.allocator.duplicate_token(&token)?;
        if let Err(err) = self
            .renderer
            .import_buffer_collection(collection_id, token, usage, size)
        {
            info!(collection = ?collection_id, "renderer rejected buffer collection: {err}");
            self.allocator.close_token(display_token);
            return Err(err.into());
        }

        let display_token = match self.import_mode {
            BufferCollectionImportMode::RendererOnly => {
                self.allocator.close_token(display_token);
                return Ok(());
            }
            BufferCollectionImportMode::EnforceDisplayConstraints => display_token,
            BufferCollectionImportMode::AttemptDisplayConstraints => {
                self.allocator.convert_to_attach_token(display_token)?
            }
        };

        // A probe connection with empty constraints lets the compositor ask
        // later whether allocation succeeded, without influencing it.
        let probe_token = self.allocator.duplicate_token(&display_token)?;
        let probe = self.allocator.bind_collection(probe_token)?;
        if let Err(err) = self
            .allocator
            .set_constraints(&probe, BufferConstraints::default())
        {
            self.allocator.close(probe);
            return Err(err.into());
        }

        let mut shared = self.shared.lock().unwrap();
        if let Err(err) = self
            .driver
            .import_buffer_collection(collection_id, display_token, None)
        {
            self.allocator.close(probe);
            return Err(err.into());
        }
        shared.display_collections.insert(collection_id, probe);
        Ok(())
    }

    /// Drop a previously imported buffer collection from every participant.
    pub fn release_buffer_collection(
        &self,
        collection_id: CollectionId,
        usage: BufferCollectionUsage,
    ) {
        let _guard = self.span.enter();
        let mut shared = self.shared.lock().unwrap();
        self.driver.release_buffer_collection(collection_id);
        self.renderer.release_buffer_collection(collection_id, usage);
        if let Some(probe) = shared.display_collections.shift_remove(&collection_id) {
            self.allocator.close(probe);
        }
        shared.collection_support.shift_remove(&collection_id);
    }

    /// Register one image out of an imported, allocated collection.
    ///
    /// The first image of a collection determines whether the allocation is
    /// scanout-capable; the verdict is memoized per collection. An image whose
    /// collection turned out unsupported still imports fine in
    /// [`AttemptDisplayConstraints`](BufferCollectionImportMode::AttemptDisplayConstraints)
    /// mode and is composited by the GPU.
    #[profiling::function]
    pub fn import_buffer_image(
        &self,
        metadata: &ImageMetadata,
        usage: BufferCollectionUsage,
    ) -> Result<(), ImportError> {
        let _guard = self.span.enter();

        if !metadata.identifier.is_valid() {
            return Err(ImportError::InvalidIdentifier);
        }
        if !metadata.collection_id.is_valid() {
            return Err(ImportError::InvalidCollection);
        }
        if metadata.width == 0 || metadata.height == 0 {
            return Err(ImportError::EmptyImage(metadata.width, metadata.height));
        }

        self.renderer
            .import_buffer_image(metadata, usage)
            .map_err(|err| {
                error!(image = ?metadata.identifier, "renderer could not import image: {err}");
                err
            })?;

        let mut shared = self.shared.lock().unwrap();
        let shared = &mut *shared;

        // Render targets negotiated with the driver pinned to a format, so
        // their support was memoized at allocation time.
        let is_render_target = usage == BufferCollectionUsage::RenderTarget;
        if self.import_mode == BufferCollectionImportMode::RendererOnly && !is_render_target {
            shared
                .collection_support
                .insert(metadata.collection_id, DisplaySupport::Unsupported);
            return Ok(());
        }

        if !shared.collection_support.contains_key(&metadata.collection_id) {
            let support = self.determine_display_support(shared, metadata.collection_id);
            shared
                .collection_support
                .insert(metadata.collection_id, support);
        }

        match shared.collection_support[&metadata.collection_id] {
            DisplaySupport::Unsupported => match self.import_mode {
                BufferCollectionImportMode::EnforceDisplayConstraints => {
                    Err(ImportError::UnsupportedByDisplay)
                }
                _ => Ok(()),
            },
            DisplaySupport::Supported { format, modifier } => {
                let config = ImageConfig {
                    width: metadata.width,
                    height: metadata.height,
                    format,
                    modifier,
                };
                self.driver
                    .import_image(
                        config,
                        metadata.collection_id,
                        metadata.identifier,
                        metadata.vmo_index,
                    )
                    .map_err(|err| {
                        error!(
                            image = ?metadata.identifier,
                            "display driver could not import image: {err}"
                        );
                        err.into()
                    })
            }
        }
    }

    /// Drop a previously imported image from every participant.
    pub fn release_buffer_image(&self, image_id: ImageId) {
        let _guard = self.span.enter();
        let mut shared = self.shared.lock().unwrap();
        self.driver.release_image(image_id);
        self.renderer.release_buffer_image(image_id);
        if let Some(events) = shared.image_events.shift_remove(&image_id) {
            self.driver.release_event(events.signal_id);
        }
        shared.pending_images.retain(|id| *id != image_id);
    }

    /// Ask the probe connection whether the collection allocated in a form
    /// the display can scan out. Every failure mode degrades to
    /// [`DisplaySupport::Unsupported`]; GPU composition covers those
    /// collections.
    fn determine_display_support(
        &self,
        shared: &Shared,
        collection_id: CollectionId,
    ) -> DisplaySupport {
        let Some(probe) = shared.display_collections.get(&collection_id) else {
            warn!(collection = ?collection_id, "no display probe connection for collection");
            return DisplaySupport::Unsupported;
        };
        if !self.allocator.check_allocated(probe) {
            return DisplaySupport::Unsupported;
        }
        let info = match self.allocator.wait_allocated(probe) {
            Ok(info) => info,
            Err(err) => {
                warn!(collection = ?collection_id, "allocation query failed: {err}");
                return DisplaySupport::Unsupported;
            }
        };
        // The scanout path has no planar YUV support.
        if info.format.is_chroma_subsampled() {
            return DisplaySupport::Unsupported;
        }
        DisplaySupport::Supported {
            format: info.format,
            modifier: info.modifier,
        }
    }
}
