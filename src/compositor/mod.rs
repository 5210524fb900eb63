//! Composition of per-display scenes using hardware layers, with GPU fallback
//!
//! The [`DisplayCompositor`] receives, once per frame, a [`RenderData`] per
//! physical display: parallel lists of placement rectangles and images. It
//! first drafts a hardware configuration mapping one image to one pre-created
//! hardware layer per display. If the scene cannot be expressed that way (too
//! many images, a format the hardware cannot scan out, an image still in
//! flight, or a draft the driver rejects), the whole frame falls back to GPU
//! composition: each display's scene is rendered into the next slot of a
//! small per-display ring of render targets, and that single result is
//! scanned out through one layer.
//!
//! Committing a configuration yields an opaque stamp. Stamps come back with
//! the driver's vsync notifications and are correlated against a FIFO of
//! committed frames, which is how every frame's release callbacks fire
//! exactly once and in submission order even when intermediate configurations
//! are superseded without a vsync of their own.
//!
//! The compositor is shared between the frame-producing context and the
//! asynchronous vsync context. One internal mutex guards the shared state and
//! the driver transport per call group; it is never held across a whole frame,
//! so vsync handling can interleave with an in-progress frame without ever
//! observing a torn driver call sequence.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use indexmap::IndexMap;
use smallvec::SmallVec;
use tracing::{error, info_span};

use crate::backend::allocator::{
    BufferAllocator, CollectionHandle, CollectionId, FormatModifier, ImageId, ImageMetadata,
    PixelFormat,
};
use crate::backend::display::{
    ConfigResult, ConfigStamp, DisplayDriver, DisplayId, DisplayInfo, EventId, LayerId,
};
use crate::backend::renderer::sync::Event;
use crate::backend::renderer::Renderer;
use crate::utils::{ImageRect, Timestamp};

mod color;
mod fallback;
mod import;
mod release;
mod scanout;
mod vsync;

pub use self::color::{ColorConversion, ColorConversionStateMachine};
pub use self::import::ImportError;
pub use self::release::{FramePresentedCallback, ReleaseFenceScheduler};

/// Number of hardware layers pre-created per display.
///
/// Scenes with more images than this cannot be composited in hardware and
/// take the GPU path.
pub const LAYERS_PER_DISPLAY: usize = 2;

/// Tint multiplied into every image when [`DebugFlags::TINT`] is set, to make
/// GPU-composited frames visually distinguishable from direct scanout.
const GPU_RENDERING_DEBUG_COLOR: [f32; 4] = [0.9, 0.5, 0.5, 1.];

bitflags::bitflags! {
    /// Debug flags changing the compositor's visible behavior.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DebugFlags: u32 {
        /// Tint images composited by the GPU fallback path
        const TINT = 1 << 0;
    }
}

/// How aggressively imported buffer collections are negotiated with the
/// display hardware.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferCollectionImportMode {
    /// Never offer collections to the display; every frame is GPU-composited
    /// (except the compositor's own render targets).
    RendererOnly,
    /// The display's constraints participate in negotiation; a collection
    /// the hardware cannot allocate fails to import.
    EnforceDisplayConstraints,
    /// The display's constraints are attached best-effort; direct scanout is
    /// used when the allocation "just happens" to be hardware-compatible.
    #[default]
    AttemptDisplayConstraints,
}

/// One display's scene for one frame: parallel, ordered lists of placement
/// rectangles and images, back to front.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderData {
    /// The display this scene belongs to
    pub display_id: DisplayId,
    /// Placement rectangle of each image
    pub rectangles: Vec<ImageRect>,
    /// The images, parallel to `rectangles`
    pub images: Vec<ImageMetadata>,
}

/// Errors reported by the compositor's setup and teardown entry points.
///
/// Per-frame failures are deliberately not errors: a frame that cannot be
/// composited is dropped silently (the scheduler notices the missing
/// presentation callback), per the engine's contract.
#[derive(Debug, thiserror::Error)]
pub enum CompositorError {
    /// The display is not known to the compositor
    #[error("Display {0:?} has not been added to the compositor")]
    UnknownDisplay(DisplayId),
    /// The renderer supports none of the display's scanout formats
    #[error("The renderer supports none of the display's scanout formats")]
    NoCompatibleFormat,
    /// The display was added without render targets, so GPU fallback is
    /// impossible
    #[error("Display {0:?} has no render targets for GPU composition")]
    NoRenderTargets(DisplayId),
    /// Hardware composition and GPU fallback both failed for a display
    #[error("Both hardware composition and GPU rendering failed for display {0:?}")]
    DoubleFailure(DisplayId),
    /// Importing a compositor-owned render target failed
    #[error(transparent)]
    Import(#[from] ImportError),
    /// The buffer allocator failed
    #[error(transparent)]
    Allocator(#[from] crate::backend::allocator::AllocatorError),
    /// The display driver failed
    #[error(transparent)]
    Driver(#[from] crate::backend::display::DriverError),
    /// The renderer failed
    #[error(transparent)]
    Renderer(#[from] crate::backend::renderer::RendererError),
}

/// Completion events of one render-target ring slot.
#[derive(Debug)]
pub(super) struct FrameEventData {
    /// Signaled by the renderer when the slot's GPU work finishes; scanout
    /// waits on it.
    pub(super) wait_event: Event,
    pub(super) wait_id: EventId,
    /// Signaled by the driver once the slot is no longer scanned out.
    /// Pre-signaled at creation so first use never blocks.
    pub(super) signal_event: Event,
    pub(super) signal_id: EventId,
}

/// Completion event of one client image on the hardware path.
#[derive(Debug)]
pub(super) struct ImageEventData {
    /// Signaled by the driver once the image is no longer scanned out.
    /// Pre-signaled at creation so first use never blocks.
    pub(super) signal_event: Event,
    pub(super) signal_id: EventId,
}

/// Per-display composition state, created once on display attach.
#[derive(Debug, Default)]
pub(super) struct DisplayEngineData {
    /// Pre-created hardware layers, bottommost first
    pub(super) layers: SmallVec<[LayerId; LAYERS_PER_DISPLAY]>,
    /// Completion events per render-target ring slot
    pub(super) frame_events: Vec<FrameEventData>,
    /// Standard render-target ring
    pub(super) render_targets: Vec<ImageMetadata>,
    /// Protected-memory render-target ring, if the renderer supports it
    pub(super) protected_render_targets: Vec<ImageMetadata>,
    /// Ring depth
    pub(super) vmo_count: u32,
    /// Ring cursor, in `[0, vmo_count)`
    pub(super) curr_vmo: u32,
}

/// Whether a collection's allocation turned out hardware-scanout-capable,
/// memoized on the first image import of the collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum DisplaySupport {
    Unsupported,
    Supported {
        format: PixelFormat,
        modifier: FormatModifier,
    },
}

impl DisplaySupport {
    pub(super) fn is_supported(&self) -> bool {
        matches!(self, DisplaySupport::Supported { .. })
    }
}

/// A committed configuration awaiting its vsync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingConfig {
    stamp: ConfigStamp,
    frame_number: u64,
}

/// State shared between the frame path and the vsync path, guarded by the
/// compositor's mutex.
#[derive(Debug, Default)]
pub(super) struct Shared {
    /// Empty-constraints probe handles used to query allocation success
    /// without re-negotiating, keyed by collection
    pub(super) display_collections: IndexMap<CollectionId, CollectionHandle>,
    /// Memoized hardware-scanout support per collection
    pub(super) collection_support: IndexMap<CollectionId, DisplaySupport>,
    /// Completion events per client image used on the hardware path
    pub(super) image_events: IndexMap<ImageId, ImageEventData>,
    pub(super) display_info: IndexMap<DisplayId, DisplayInfo>,
    pub(super) display_engine_data: IndexMap<DisplayId, DisplayEngineData>,
    /// Images referenced by the current hardware draft; their events are
    /// unsignaled just before the draft is applied
    pub(super) pending_images: Vec<ImageId>,
    /// FIFO of committed configurations awaiting vsync
    pending_configs: VecDeque<PendingConfig>,
    last_presented_stamp: Option<ConfigStamp>,
    pub(super) color_conversion: ColorConversionStateMachine,
    pub(super) debug_flags: DebugFlags,
}

/// The composition engine. See the [module docs](self) for an overview.
///
/// One instance serves all displays of one display controller. It is intended
/// to live in an [`Arc`]; [`add_display`](DisplayCompositor::add_display)
/// registers a weak reference with the display's vsync source.
#[derive(Debug)]
pub struct DisplayCompositor {
    pub(super) driver: Arc<dyn DisplayDriver>,
    pub(super) renderer: Arc<dyn Renderer>,
    pub(super) allocator: Arc<dyn BufferAllocator>,
    pub(super) scheduler: Arc<dyn ReleaseFenceScheduler>,
    pub(super) import_mode: BufferCollectionImportMode,
    pub(super) shared: Mutex<Shared>,
    pub(super) span: tracing::Span,
}

impl DisplayCompositor {
    /// Create a new compositor driving the given collaborators.
    pub fn new(
        driver: Arc<dyn DisplayDriver>,
        renderer: Arc<dyn Renderer>,
        allocator: Arc<dyn BufferAllocator>,
        scheduler: Arc<dyn ReleaseFenceScheduler>,
        import_mode: BufferCollectionImportMode,
    ) -> Self {
        let span = info_span!(parent: None, "display_compositor", ?import_mode);
        DisplayCompositor {
            driver,
            renderer,
            allocator,
            scheduler,
            import_mode,
            shared: Mutex::new(Shared::default()),
            span,
        }
    }

    /// Change the debug flags applied to subsequent frames.
    pub fn set_debug_flags(&self, flags: DebugFlags) {
        self.shared.lock().unwrap().debug_flags = flags;
    }

    /// The currently active debug flags.
    pub fn debug_flags(&self) -> DebugFlags {
        self.shared.lock().unwrap().debug_flags
    }

    /// Set the color-conversion transform applied from the next frame on.
    ///
    /// The transform takes effect on exactly one path per frame: programmed
    /// into the display hardware when the frame is composited there, or
    /// applied inline by the renderer when the frame falls back to GPU
    /// composition.
    pub fn set_color_conversion_values(
        &self,
        coefficients: [f32; 9],
        preoffsets: [f32; 3],
        postoffsets: [f32; 3],
    ) {
        let _guard = self.span.enter();
        let mut shared = self.shared.lock().unwrap();
        shared.color_conversion.set_data(ColorConversion {
            coefficients,
            preoffsets,
            postoffsets,
        });
        self.renderer
            .set_color_conversion_values(coefficients, preoffsets, postoffsets);
    }

    /// Clamp every output channel of the display to at least `minimum`.
    pub fn set_minimum_rgb(&self, minimum: u8) -> Result<(), CompositorError> {
        let _shared = self.shared.lock().unwrap();
        self.driver.set_minimum_rgb(minimum)?;
        Ok(())
    }

    /// Composite and commit one frame.
    ///
    /// `render_data` holds one scene per display; `release_fences` are the
    /// caller's fences to signal once the frame's resources may be reused,
    /// and `presented` fires once vsync confirms the frame on screen. Both
    /// are handed to the release scheduler with the committed frame.
    ///
    /// A frame that can be composited neither in hardware nor by the GPU is
    /// dropped: nothing is committed and neither `release_fences` nor
    /// `presented` are forwarded. No error escapes; the scheduler above is
    /// expected to notice the missing presentation and produce a new frame.
    #[profiling::function]
    pub fn render_frame(
        &self,
        frame_number: u64,
        _presentation_time: Timestamp,
        render_data: &[RenderData],
        release_fences: Vec<Event>,
        presented: FramePresentedCallback,
    ) {
        let _guard = self.span.enter();

        // The draft must be reset before anything new is programmed.
        self.discard_config();
        let hardware_failure = !self.set_render_data_on_displays(render_data);

        // Skip the feasibility round-trip to the driver when the draft
        // already failed.
        let fallback_to_gpu = hardware_failure || !self.check_config();

        if fallback_to_gpu {
            self.discard_config();
            if let Err(err) = self.perform_gpu_composition(
                frame_number,
                render_data,
                release_fences,
                presented,
            ) {
                error!(frame_number, "frame dropped: {err}");
                return;
            }
        } else {
            {
                let mut shared = self.shared.lock().unwrap();
                // Color conversion, if pending, made it into the committed
                // configuration.
                shared.color_conversion.apply_config_succeeded();

                // The images in this draft are about to be on screen; their
                // prior "safe to reuse" state no longer applies.
                let pending_images = std::mem::take(&mut shared.pending_images);
                for image_id in pending_images {
                    if let Some(events) = shared.image_events.get(&image_id) {
                        events.signal_event.reset();
                    }
                }
            }
            self.scheduler
                .on_direct_scanout_frame(frame_number, release_fences, presented);
        }

        let stamp = self.apply_config();
        self.shared
            .lock()
            .unwrap()
            .pending_configs
            .push_back(PendingConfig {
                stamp,
                frame_number,
            });
    }

    /// Ask the driver whether the current draft is feasible.
    pub(super) fn check_config(&self) -> bool {
        let _shared = self.shared.lock().unwrap();
        self.driver.check_config(false) == ConfigResult::Ok
    }

    /// Throw away the current draft and everything staged for it.
    pub(super) fn discard_config(&self) {
        let mut shared = self.shared.lock().unwrap();
        shared.pending_images.clear();
        self.driver.check_config(true);
    }

    /// Commit the draft and return its configuration stamp.
    pub(super) fn apply_config(&self) -> ConfigStamp {
        let _shared = self.shared.lock().unwrap();
        self.driver.apply_config()
    }
}

impl Drop for DisplayCompositor {
    fn drop(&mut self) {
        self.discard_config();
        let Ok(shared) = self.shared.get_mut() else {
            return;
        };
        for data in shared.display_engine_data.values() {
            for layer in &data.layers {
                self.driver.destroy_layer(*layer);
            }
            for events in &data.frame_events {
                self.driver.release_event(events.wait_id);
                self.driver.release_event(events.signal_id);
            }
        }
        for events in shared.image_events.values() {
            self.driver.release_event(events.signal_id);
        }
    }
}
