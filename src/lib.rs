#![warn(missing_docs, missing_debug_implementations)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]
//! **Scanout is a display-controller composition engine with GPU fallback.**
//!
//! ## Goals & Design
//!
//! Every frame, a scene is handed to the [`DisplayCompositor`](compositor::DisplayCompositor)
//! as a set of rectangles bound to images, one set per physical display. The compositor
//! decides whether the display hardware can scan the scene out directly by mapping each
//! image onto one of the display's pre-created hardware layers, and falls back to GPU
//! composition into a ring of per-display render targets when it cannot. Either way it
//! manages the buffer and fence lifecycle needed to keep multiple frames in flight, and
//! correlates hardware vsync notifications back to per-frame release callbacks.
//!
//! The engine itself owns no hardware. It drives four narrow capability interfaces:
//!
//! - [`backend::display::DisplayDriver`]: the display-controller transport
//!   (layers, draft configurations, vsync, resource import)
//! - [`backend::renderer::Renderer`]: the GPU rendering backend
//! - [`backend::allocator::BufferAllocator`]: the shared-memory buffer negotiation
//!   service
//! - [`compositor::ReleaseFenceScheduler`]: the downstream release/presentation
//!   protocol
//!
//! Production and test implementations satisfy the same contracts, which is how the
//! composition logic is tested without hardware.
//!
//! ## Modules
//!
//! - [`compositor`]: the composition engine (frame orchestration, layer assignment,
//!   GPU fallback, buffer/image lifecycle, color correction, vsync correlation)
//! - [`backend`]: the capability interfaces listed above, plus fences and
//!   synchronization primitives
//! - [`utils`]: geometry and time value types shared across the crate

pub mod backend;
pub mod compositor;
pub mod utils;
