pub mod arena;
pub mod dylib;
pub mod error;
pub mod policy;
pub mod source;

pub use arena::{LoadPolicy, LoaderArena, NodeId};
pub use dylib::{DylibSource, UnitExports};
pub use source::{CodeSource, ResourceHit, StaticSource};

#[cfg(test)]
mod tests;
