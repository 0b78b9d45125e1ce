//! Viewport-driven feature streaming: per-layer caches, the incremental
//! loader that fills them, and the seams to the spatial source and the
//! rendering surface.

pub mod cache;
pub mod error;
pub mod feature;
pub mod geometry;
pub mod loader;
pub mod metrics;
pub mod source;
pub mod surface;
pub mod timeseries;

pub use cache::*;
pub use error::*;
pub use feature::*;
pub use loader::*;
pub use metrics::*;
pub use source::*;
pub use surface::*;
pub use timeseries::*;
