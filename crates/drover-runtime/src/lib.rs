pub mod classifier;
pub mod log_sink;
pub mod supervisor;

pub use classifier::*;
pub use log_sink::*;
pub use supervisor::*;
