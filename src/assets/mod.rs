//! Asset storage.
//!
//! Models and materials are shared read-only through [`AssetServer`]. A reload
//! is observed by the scene core as a changed `Arc` behind an unchanged handle.

pub mod server;
pub mod storage;

pub use server::{AssetServer, MaterialHandle, ModelHandle};
pub use storage::AssetStorage;
