pub mod activity;
pub mod package;
pub mod registry;
pub mod score;

pub use activity::*;
pub use package::*;
pub use registry::*;
pub use score::*;
