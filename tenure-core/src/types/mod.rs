mod lease;
mod options;
mod primitives;

pub use lease::*;
pub use options::*;
pub use primitives::*;
