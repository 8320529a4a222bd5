mod distance;
mod record_match;

pub use distance::{arc_degrees, distance_between, select_closest};
pub use record_match::{match_any, NameFilter};
