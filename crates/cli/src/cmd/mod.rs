mod dist;

pub use dist::{DistOptions, cmd_dist};
