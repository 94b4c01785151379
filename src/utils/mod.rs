//! Utility Module
//!
//! - [`ObservableSet`]: insertion-ordered set that records its own mutations

pub mod observable;

pub use observable::{CollectionChange, ObservableSet};
