/// Image handling module
///
/// This module handles:
/// - Mapping UI-space selections onto real pixel boxes (region.rs)
/// - Cropping, encoding and staging crop artifacts (crop.rs)

pub mod region;
pub mod crop;
