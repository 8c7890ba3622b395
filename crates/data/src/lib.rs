//! Rule data loading, validation and application configuration.

pub mod load;
pub mod schema;
pub mod validate;

pub use load::*;
pub use schema::*;
pub use validate::*;
