//! Title clustering into sold-price comps and scoring of live listings
//! against them.

pub mod comps;
pub mod matcher;
pub mod similarity;

pub use comps::compute_comps;
pub use matcher::match_live;
pub use similarity::{normalize_title, token_set_ratio};
