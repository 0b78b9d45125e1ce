pub mod catalog;
pub mod config;
pub mod controller;
pub mod dashboard;
pub mod layer;
pub mod projector;
pub mod selection;

pub use catalog::*;
pub use config::*;
pub use controller::*;
pub use dashboard::*;
pub use layer::*;
pub use projector::*;
pub use selection::*;
