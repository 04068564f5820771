//! logfunnel pipeline
//!
//! The in-memory message store that receivers deliver into, and the logger
//! hierarchy selection contexts build their filters from.

pub mod store;
pub mod tree;

pub use store::MessageStore;
pub use tree::LoggerTree;
