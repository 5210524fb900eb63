//! Capability interfaces consumed and exposed by the composition engine
//!
//! The compositor core never talks to hardware directly. Each external
//! collaborator is modeled as a narrow trait:
//!
//! - [`display::DisplayDriver`]: layer/configuration primitives of the
//!   display controller, plus resource import and vsync delivery
//! - [`renderer::Renderer`]: the GPU rendering backend
//! - [`allocator::BufferAllocator`]: shared-memory buffer collection
//!   negotiation
//!
//! Synchronization primitives shared between all of them live in
//! [`renderer::sync`].

pub mod allocator;
pub mod display;
pub mod renderer;
