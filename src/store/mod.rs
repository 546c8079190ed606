//! Startup data loaded from disk

pub mod names;

pub use names::NameProvider;
