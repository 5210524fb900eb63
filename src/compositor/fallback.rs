//! The GPU composition path and display attachment
//!
//! Every display owns a small ring of render targets, allocated when the
//! display is attached. A GPU-composited frame renders the display's whole
//! scene into the ring slot under the cursor and scans that single image out
//! through the display's bottommost layer. The ring cursor advances once per
//! GPU frame regardless of outcome, so consecutive frames never contend for
//! the same target.

use std::sync::Arc;

use smallvec::SmallVec;
use tracing::{error, warn};

use crate::backend::allocator::{
    BufferCollectionInfo, BufferCollectionUsage, BufferConstraints, CollectionId, ImageId,
    ImageMetadata, PixelFormat,
};
use crate::backend::display::{DisplayId, DisplayInfo, VsyncSource};
use crate::backend::renderer::sync::Event;
use crate::utils::{ImageRect, Size};

use super::color::ColorConversion;
use super::scanout::apply_layer_image;
use super::{
    CompositorError, DebugFlags, DisplayCompositor, DisplayEngineData, DisplaySupport,
    FrameEventData, FramePresentedCallback, RenderData, GPU_RENDERING_DEBUG_COLOR,
    LAYERS_PER_DISPLAY,
};

impl DisplayCompositor {
    /// Composite every display's scene on the GPU and draft the results for
    /// scanout.
    ///
    /// `render_finished` is threaded into the final display's render call
    /// only, so it signals once the whole frame's GPU work is done.
    #[profiling::function]
    pub(super) fn perform_gpu_composition(
        &self,
        frame_number: u64,
        render_data: &[RenderData],
        release_fences: Vec<Event>,
        presented: FramePresentedCallback,
    ) -> Result<(), CompositorError> {
        let render_finished = Event::new();

        for (i, data) in render_data.iter().enumerate() {
            let is_final = i + 1 == render_data.len();
            let use_protected = self.renderer.requires_render_in_protected(&data.images);

            let render_target;
            let wait_event;
            let wait_id;
            let signal_id;
            let layer;
            let images;
            let apply_color_conversion;
            {
                let mut shared = self.shared.lock().unwrap();
                let shared = &mut *shared;

                // The GPU applies the transform inline; stale display
                // registers would correct the frame twice.
                if shared.color_conversion.gpu_requires_display_clearing() {
                    let identity = ColorConversion::IDENTITY;
                    self.driver.set_display_color_conversion(
                        data.display_id,
                        identity.preoffsets,
                        identity.coefficients,
                        identity.postoffsets,
                    );
                    shared.color_conversion.display_cleared();
                }

                let engine_data = shared
                    .display_engine_data
                    .get_mut(&data.display_id)
                    .ok_or(CompositorError::UnknownDisplay(data.display_id))?;
                if engine_data.vmo_count == 0 {
                    warn!(
                        display = ?data.display_id,
                        "cannot composite on the GPU, display has no render targets"
                    );
                    return Err(CompositorError::NoRenderTargets(data.display_id));
                }

                let slot = engine_data.curr_vmo as usize;
                engine_data.curr_vmo = (engine_data.curr_vmo + 1) % engine_data.vmo_count;

                let pool = if use_protected && !engine_data.protected_render_targets.is_empty() {
                    &engine_data.protected_render_targets
                } else {
                    if use_protected {
                        warn!("protected output required but no protected render targets");
                    }
                    &engine_data.render_targets
                };
                render_target = pool[slot].clone();

                let events = &engine_data.frame_events[slot];
                if !events.signal_event.is_signaled() {
                    // The ring is too shallow for the current scanout latency.
                    // Reusing the slot tears at worst; stalling would be worse.
                    error!(slot, "rendering into a render target still being scanned out");
                }
                events.wait_event.reset();
                events.signal_event.reset();
                wait_event = events.wait_event.clone();
                wait_id = events.wait_id;
                signal_id = events.signal_id;
                layer = engine_data.layers[0];

                images = if shared.debug_flags.contains(DebugFlags::TINT) {
                    let mut tinted = data.images.clone();
                    for image in &mut tinted {
                        for (channel, tint) in
                            image.multiply_color.iter_mut().zip(GPU_RENDERING_DEBUG_COLOR)
                        {
                            *channel *= tint;
                        }
                    }
                    tinted
                } else {
                    data.images.clone()
                };
                apply_color_conversion = shared.color_conversion.data_to_apply().is_some();
            }

            let mut fences: SmallVec<[Event; 2]> = SmallVec::new();
            fences.push(wait_event);
            if is_final {
                fences.push(render_finished.clone());
            }
            // Not under the lock: rendering may take a while and vsyncs must
            // keep flowing.
            self.renderer.render(
                &render_target,
                &data.rectangles,
                &images,
                &fences,
                apply_color_conversion,
            );

            {
                let shared = self.shared.lock().unwrap();
                self.driver.set_display_layers(data.display_id, &[layer]);
                let size = Size {
                    width: render_target.width,
                    height: render_target.height,
                };
                apply_layer_image(
                    &*self.driver,
                    &shared,
                    layer,
                    ImageRect::fullscreen(size),
                    &render_target,
                    wait_id,
                    signal_id,
                );
            }

            if !self.check_config() {
                error!("display hardware composition and GPU rendering have both failed");
                return Err(CompositorError::DoubleFailure(data.display_id));
            }
        }

        self.scheduler
            .on_gpu_composited_frame(frame_number, render_finished, release_fences, presented);
        Ok(())
    }

    /// Attach a display: create its hardware layers, register for its vsyncs
    /// and allocate `num_render_targets` GPU fallback targets (plus a
    /// protected ring of the same depth if the renderer supports protected
    /// output).
    ///
    /// With `num_render_targets == 0` no targets are allocated and every
    /// frame must composite in hardware; `Ok(None)` is returned. Otherwise
    /// the allocation outcome of the standard ring is returned.
    ///
    /// The vsync registration holds only a weak reference, so it does not
    /// keep the compositor alive.
    pub fn add_display(
        self: &Arc<Self>,
        vsync_source: &dyn VsyncSource,
        display_id: DisplayId,
        info: DisplayInfo,
        num_render_targets: u32,
    ) -> Result<Option<BufferCollectionInfo>, CompositorError> {
        let _guard = self.span.enter();

        let format = self
            .renderer
            .choose_preferred_format(&info.formats)
            .ok_or(CompositorError::NoCompatibleFormat)?;
        let dimensions = info.dimensions;

        {
            let mut shared = self.shared.lock().unwrap();
            debug_assert!(!shared.display_engine_data.contains_key(&display_id));
            let mut engine_data = DisplayEngineData::default();
            for _ in 0..LAYERS_PER_DISPLAY {
                engine_data.layers.push(self.driver.create_layer()?);
            }
            shared.display_info.insert(display_id, info);
            shared.display_engine_data.insert(display_id, engine_data);
        }

        let weak = Arc::downgrade(self);
        vsync_source.set_vsync_callback(Box::new(move |timestamp, stamp| {
            if let Some(compositor) = weak.upgrade() {
                compositor.on_vsync(timestamp, stamp);
            }
        }));

        if num_render_targets == 0 {
            return Ok(None);
        }

        let (render_targets, collection_info) =
            self.allocate_display_render_targets(false, num_render_targets, dimensions, format)?;
        {
            let mut shared = self.shared.lock().unwrap();
            let mut frame_events = Vec::with_capacity(num_render_targets as usize);
            for _ in 0..num_render_targets {
                let wait_event = Event::new();
                let wait_id = self.driver.import_event(wait_event.clone());
                // Pre-signaled, so the slot's first use never stalls.
                let signal_event = Event::signaled();
                let signal_id = self.driver.import_event(signal_event.clone());
                frame_events.push(FrameEventData {
                    wait_event,
                    wait_id,
                    signal_event,
                    signal_id,
                });
            }
            if let Some(engine_data) = shared.display_engine_data.get_mut(&display_id) {
                engine_data.frame_events = frame_events;
                engine_data.render_targets = render_targets;
                engine_data.vmo_count = num_render_targets;
                engine_data.curr_vmo = 0;
            }
        }

        if self.renderer.supports_render_in_protected() {
            let (protected, _) = self.allocate_display_render_targets(
                true,
                num_render_targets,
                dimensions,
                format,
            )?;
            let mut shared = self.shared.lock().unwrap();
            if let Some(engine_data) = shared.display_engine_data.get_mut(&display_id) {
                engine_data.protected_render_targets = protected;
            }
        }

        Ok(Some(collection_info))
    }

    /// Negotiate and allocate one ring of render targets, importing every
    /// buffer as a scanout-capable image into both renderer and driver.
    fn allocate_display_render_targets(
        &self,
        use_protected: bool,
        count: u32,
        size: Size,
        format: PixelFormat,
    ) -> Result<(Vec<ImageMetadata>, BufferCollectionInfo), CompositorError> {
        let collection_id = CollectionId::generate();
        let local_token = self.allocator.allocate_shared_collection()?;
        let renderer_token = self.allocator.duplicate_token(&local_token)?;
        let display_token = self.allocator.duplicate_token(&local_token)?;

        self.renderer.import_buffer_collection(
            collection_id,
            renderer_token,
            BufferCollectionUsage::RenderTarget,
            Some(size),
        )?;
        {
            let _shared = self.shared.lock().unwrap();
            self.driver
                .import_buffer_collection(collection_id, display_token, Some(format))?;
        }

        let handle = self.allocator.bind_collection(local_token)?;
        self.allocator.set_constraints(
            &handle,
            BufferConstraints {
                min_buffer_count: count,
                size: Some(size),
                format: Some(format),
                secure_required: use_protected,
            },
        )?;
        let collection_info = self.allocator.wait_allocated(&handle)?;
        self.allocator.close(handle);

        // Render targets are always scanout-capable; the driver participated
        // in the negotiation with a pinned format.
        self.shared.lock().unwrap().collection_support.insert(
            collection_id,
            DisplaySupport::Supported {
                format: collection_info.format,
                modifier: collection_info.modifier,
            },
        );

        let mut targets = Vec::with_capacity(count as usize);
        for vmo_index in 0..count {
            let metadata = ImageMetadata {
                identifier: ImageId::generate(),
                collection_id,
                vmo_index,
                width: size.width,
                height: size.height,
                ..Default::default()
            };
            self.import_buffer_image(&metadata, BufferCollectionUsage::RenderTarget)?;
            targets.push(metadata);
        }
        Ok((targets, collection_info))
    }
}
