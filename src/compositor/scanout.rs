//! The hardware composition path
//!
//! Drafting a frame onto hardware layers can fail for many reasons, none of
//! which are errors: more images than layers, a solid-color fill anywhere but
//! fullscreen at the bottom, a collection whose allocation the hardware cannot
//! scan out, or an image whose previous scanout has not retired yet. The
//! drafting functions return `false` in all those cases and the frame takes
//! the GPU path instead.

use tracing::{error, warn};

use crate::backend::allocator::{ImageMetadata, PixelFormat};
use crate::backend::display::{AlphaMode, DisplayDriver, EventId, ImageConfig, LayerId, Transform};
use crate::utils::{Frame, ImageRect};

use crate::backend::renderer::sync::Event;

use super::{DisplayCompositor, DisplaySupport, ImageEventData, RenderData, Shared};

impl DisplayCompositor {
    /// Draft every display's scene onto hardware layers. Returns `false` as
    /// soon as one display cannot be drafted; the caller then discards the
    /// partial draft wholesale.
    pub(super) fn set_render_data_on_displays(&self, render_data: &[RenderData]) -> bool {
        for data in render_data {
            if !self.set_render_data_on_display(data) {
                return false;
            }
            let shared = self.shared.lock().unwrap();
            if let Some(cc) = shared.color_conversion.data_to_apply() {
                self.driver.set_display_color_conversion(
                    data.display_id,
                    cc.preoffsets,
                    cc.coefficients,
                    cc.postoffsets,
                );
            }
        }
        true
    }

    #[profiling::function]
    fn set_render_data_on_display(&self, data: &RenderData) -> bool {
        debug_assert_eq!(data.rectangles.len(), data.images.len());

        let mut shared = self.shared.lock().unwrap();
        let shared = &mut *shared;

        let Some(display) = shared.display_info.get(&data.display_id) else {
            warn!(display = ?data.display_id, "scene for a display that was never added");
            return false;
        };
        let dimensions = display.dimensions;
        let layers = match shared.display_engine_data.get(&data.display_id) {
            Some(engine_data) if engine_data.layers.len() >= data.images.len() => {
                engine_data.layers.clone()
            }
            Some(_) => return false,
            None => return false,
        };

        // An image still being scanned out from an earlier configuration must
        // not be re-drafted; its retire event is polled, never waited on.
        for image in &data.images {
            if image.is_solid_color() {
                continue;
            }
            match shared.image_events.get(&image.identifier) {
                Some(events) => {
                    if !events.signal_event.is_signaled() {
                        return false;
                    }
                }
                None => {
                    // First hardware use of this image. Pre-signaled, so this
                    // frame is not held back.
                    let signal_event = Event::signaled();
                    let signal_id = self.driver.import_event(signal_event.clone());
                    shared.image_events.insert(
                        image.identifier,
                        ImageEventData {
                            signal_event,
                            signal_id,
                        },
                    );
                }
            }
            shared.pending_images.push(image.identifier);
        }

        self.driver
            .set_display_layers(data.display_id, &layers[..data.images.len()]);

        for (i, (rect, image)) in data.rectangles.iter().zip(&data.images).enumerate() {
            let layer = layers[i];
            if image.is_solid_color() {
                // Hardware color fills are display-wide; only the bottommost
                // slot can hold one.
                if i != 0 || !rect.covers(dimensions) {
                    return false;
                }
                let [r, g, b, a] = image.multiply_color;
                let color = [
                    (b * 255.) as u8,
                    (g * 255.) as u8,
                    (r * 255.) as u8,
                    (a * 255.) as u8,
                ];
                self.driver.set_layer_color(layer, PixelFormat::Bgra32, color);
                continue;
            }

            if !shared
                .collection_support
                .get(&image.collection_id)
                .is_some_and(DisplaySupport::is_supported)
            {
                return false;
            }
            let signal_id = shared.image_events[&image.identifier].signal_id;
            if !apply_layer_image(
                &*self.driver,
                shared,
                layer,
                *rect,
                image,
                EventId::INVALID,
                signal_id,
            ) {
                return false;
            }
        }
        true
    }
}

/// Draft one image onto one layer: geometry, position, alpha, image binding.
///
/// Returns `false` if the image's collection has no memoized scanout format,
/// which only happens when drafting raced a release.
pub(super) fn apply_layer_image(
    driver: &dyn DisplayDriver,
    shared: &Shared,
    layer: LayerId,
    rect: ImageRect,
    image: &ImageMetadata,
    wait_id: EventId,
    signal_id: EventId,
) -> bool {
    let config = match shared.collection_support.get(&image.collection_id) {
        Some(DisplaySupport::Supported { format, modifier }) => ImageConfig {
            width: image.width,
            height: image.height,
            format: *format,
            modifier: *modifier,
        },
        _ => {
            error!(
                collection = ?image.collection_id,
                "no scanout format memoized for drafted image"
            );
            return false;
        }
    };
    let src = Frame::from_size(image.width, image.height);
    let dst = Frame::from_rect(rect);
    let transform = Transform::from_orientation_and_flip(rect.orientation, image.flip);

    driver.set_layer_image_config(layer, config);
    driver.set_layer_position(layer, transform, src, dst);
    driver.set_layer_alpha(layer, AlphaMode::from(image.blend_mode), image.multiply_color[3]);
    driver.set_layer_image(layer, image.identifier, wait_id, signal_id);
    true
}
