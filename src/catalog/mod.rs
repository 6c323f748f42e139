/// Icon catalogue population from notes metadata

pub mod cascade;

pub use cascade::{CascadeOutcome, MetadataCascade};
