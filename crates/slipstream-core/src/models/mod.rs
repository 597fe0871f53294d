//! Data models for Slipstream

mod message;
mod sync_run;
mod thread;

pub use message::*;
pub use sync_run::*;
pub use thread::*;
