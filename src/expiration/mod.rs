mod sweeper;

pub use sweeper::{run_sweep, start_sweeper};
