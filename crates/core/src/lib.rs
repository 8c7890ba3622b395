//! Draw and history core. Keep this crate free of IO and platform concerns.

pub mod catalog;
pub mod history;
pub mod rng;
pub mod select;
pub mod session;

pub use catalog::*;
pub use history::*;
pub use rng::*;
pub use select::*;
pub use session::*;
