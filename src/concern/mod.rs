//! Value types shared by every component: the category bitset, the subject
//! identifier and the per-group configuration blob.

mod concern_type;
mod group_config;
mod subject;

pub use concern_type::*;
pub use group_config::*;
pub use subject::*;
