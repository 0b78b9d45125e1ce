//! Layer-wide statistics derived from resident cache contents.

pub mod analysis;

pub use analysis::statistics::*;
pub use analysis::temporal::*;
