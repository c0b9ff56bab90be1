pub mod selection;

pub use selection::{pick_distinct, pick_one};
