//! History storage: a remote HTTP service with a durable local fallback.

mod identity;
mod kv;
mod local;
mod remote;
mod store;
pub mod wire;

pub use identity::*;
pub use kv::*;
pub use local::*;
pub use remote::*;
pub use store::*;
