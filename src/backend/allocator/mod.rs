//! Buffer collections and image metadata
//!
//! Images shown by the compositor are backed by *buffer collections*: sets of
//! shared memory buffers whose format and geometry are negotiated between all
//! participants (client, renderer, display hardware) by an external allocation
//! service. This module defines the identifiers and metadata attached to
//! collections and images, and the [`BufferAllocator`] capability trait the
//! compositor uses to drive the negotiation.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::utils::Size;

static NEXT_COLLECTION_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_IMAGE_ID: AtomicU64 = AtomicU64::new(1);

/// Identifier of a negotiated buffer collection, unique within the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionId(pub u64);

impl CollectionId {
    /// The reserved invalid collection id.
    pub const INVALID: CollectionId = CollectionId(0);

    /// Mint a fresh, process-unique collection id.
    pub fn generate() -> Self {
        CollectionId(NEXT_COLLECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Whether this id refers to an actual collection.
    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }
}

/// Identifier of an imported image, unique within the process.
///
/// The reserved value [`ImageId::INVALID`] is used in [`ImageMetadata`] to
/// denote a solid-color fill with no backing image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImageId(pub u64);

impl ImageId {
    /// The reserved invalid image id, denoting "solid color, no backing image".
    pub const INVALID: ImageId = ImageId(0);

    /// Mint a fresh, process-unique image id.
    pub fn generate() -> Self {
        ImageId(NEXT_IMAGE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Whether this id refers to an actual image.
    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }
}

/// Pixel formats a buffer collection can be allocated with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 32-bit BGRA, 8 bits per channel
    Bgra32,
    /// 32-bit RGBA, 8 bits per channel
    R8g8b8a8,
    /// 4:2:0 YUV, two planes
    Nv12,
    /// 4:2:0 YUV, three planes
    I420,
}

impl PixelFormat {
    /// Whether this is a chroma-subsampled (YUV) format.
    ///
    /// The display path does not support scanning these out; collections that
    /// allocate with one of them are composited by the GPU instead.
    pub fn is_chroma_subsampled(&self) -> bool {
        matches!(self, PixelFormat::Nv12 | PixelFormat::I420)
    }
}

/// Vendor-specific tiling arrangement of a buffer, negotiated alongside the
/// pixel format. Opaque to the compositor; forwarded to the display driver.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FormatModifier(pub u64);

impl FormatModifier {
    /// Plain linear (untiled) layout.
    pub const LINEAR: FormatModifier = FormatModifier(0);
}

/// How an image's pixels are combined with the layers beneath it.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendMode {
    /// The image replaces whatever is beneath it
    #[default]
    Src,
    /// The image is alpha-blended over what is beneath it, with
    /// premultiplied alpha
    SrcOver,
}

/// Mirroring applied to an image's content, composed after its rotation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFlip {
    /// No mirroring
    #[default]
    None,
    /// Mirrored about the vertical axis
    LeftRight,
    /// Mirrored about the horizontal axis
    UpDown,
}

/// Everything the compositor knows about one image.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageMetadata {
    /// Image identifier, or [`ImageId::INVALID`] for a solid-color fill
    pub identifier: ImageId,
    /// The collection the image's buffer belongs to
    pub collection_id: CollectionId,
    /// Index of the backing buffer within the collection
    pub vmo_index: u32,
    /// Width of the image in pixels
    pub width: u32,
    /// Height of the image in pixels
    pub height: u32,
    /// Per-channel multiply color, normalized. For solid-color fills this
    /// *is* the color; for images it tints the content
    pub multiply_color: [f32; 4],
    /// Blend mode used when compositing this image
    pub blend_mode: BlendMode,
    /// Content mirroring
    pub flip: ImageFlip,
}

impl Default for ImageMetadata {
    fn default() -> Self {
        ImageMetadata {
            identifier: ImageId::INVALID,
            collection_id: CollectionId::INVALID,
            vmo_index: 0,
            width: 0,
            height: 0,
            multiply_color: [1., 1., 1., 1.],
            blend_mode: BlendMode::default(),
            flip: ImageFlip::default(),
        }
    }
}

impl ImageMetadata {
    /// Whether this metadata denotes a solid-color fill rather than an image.
    pub fn is_solid_color(&self) -> bool {
        !self.identifier.is_valid()
    }
}

/// What a buffer collection will be used for.
///
/// The renderer picks different internal usage flags per variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferCollectionUsage {
    /// Client-provided content to be sampled or scanned out
    ClientImage,
    /// A compositor-owned render target, rendered to and scanned out
    RenderTarget,
}

/// A participant's share in a not-yet-bound buffer collection.
///
/// Tokens are opaque capabilities minted by the allocator. They are
/// deliberately not `Clone`; duplication goes through
/// [`BufferAllocator::duplicate_token`] so the allocator can track
/// participants.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct CollectionToken(pub u64);

/// A bound connection to a buffer collection, able to set constraints and
/// observe allocation.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct CollectionHandle(pub u64);

/// Constraints one participant contributes to a collection's negotiation.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct BufferConstraints {
    /// Minimum number of buffers this participant needs to hold concurrently
    pub min_buffer_count: u32,
    /// Required buffer dimensions, if any
    pub size: Option<Size>,
    /// Required pixel format, if any
    pub format: Option<PixelFormat>,
    /// Whether buffers must live in protected (inaccessible) memory
    pub secure_required: bool,
}

/// The outcome of a successful allocation.
#[derive(Debug, Clone, PartialEq)]
pub struct BufferCollectionInfo {
    /// Number of buffers allocated
    pub buffer_count: u32,
    /// The pixel format every buffer was allocated with
    pub format: PixelFormat,
    /// The tiling modifier every buffer was allocated with
    pub modifier: FormatModifier,
    /// Dimensions of every buffer
    pub size: Size,
}

/// Errors reported by a [`BufferAllocator`].
#[derive(Debug, thiserror::Error)]
pub enum AllocatorError {
    /// The token or handle is not recognized by this allocator
    #[error("The token is not recognized by this allocator")]
    UnknownToken,
    /// The participants' constraints could not be reconciled
    #[error("Participant constraints could not be reconciled")]
    ConstraintsIrreconcilable,
    /// The allocator ran out of buffer memory
    #[error("The allocator ran out of buffer memory")]
    OutOfMemory,
}

/// The shared-memory buffer negotiation service.
///
/// Mirrors the lifecycle of a multi-participant allocation: tokens are
/// duplicated and handed to participants, each participant binds its token and
/// sets constraints, and allocation completes once every outstanding token has
/// been bound or closed.
pub trait BufferAllocator: fmt::Debug + Send + Sync {
    /// Start a new collection, returning its initial token.
    fn allocate_shared_collection(&self) -> Result<CollectionToken, AllocatorError>;

    /// Duplicate `token`, adding a participant to its collection.
    fn duplicate_token(&self, token: &CollectionToken) -> Result<CollectionToken, AllocatorError>;

    /// Convert `token` into a best-effort *attach* token.
    ///
    /// Constraints set through an attach token do not have to be satisfied for
    /// the collection to allocate; they are honored opportunistically. Used to
    /// probe hardware compatibility without risking the allocation.
    fn convert_to_attach_token(
        &self,
        token: CollectionToken,
    ) -> Result<CollectionToken, AllocatorError>;

    /// Bind `token` to the underlying collection, enabling constraint setting
    /// and allocation queries.
    fn bind_collection(&self, token: CollectionToken) -> Result<CollectionHandle, AllocatorError>;

    /// Contribute this participant's constraints.
    fn set_constraints(
        &self,
        collection: &CollectionHandle,
        constraints: BufferConstraints,
    ) -> Result<(), AllocatorError>;

    /// Non-blocking: whether allocation has completed successfully.
    fn check_allocated(&self, collection: &CollectionHandle) -> bool;

    /// Wait for allocation to complete and return its outcome.
    fn wait_allocated(
        &self,
        collection: &CollectionHandle,
    ) -> Result<BufferCollectionInfo, AllocatorError>;

    /// Close an unused token without binding it.
    fn close_token(&self, token: CollectionToken);

    /// Close a bound connection. The collection itself stays alive for the
    /// remaining participants.
    fn close(&self, collection: CollectionHandle);
}
