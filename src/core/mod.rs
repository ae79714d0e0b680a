//! Core harness
//!
//! The codec, modifier tables, engine adapter and the per-width test driver.

pub mod analysis;
pub mod codec;
pub mod config;
pub mod controls;
pub mod driver;
pub mod engine;
pub mod input;
pub mod modifiers;
pub mod posix;
pub mod session;
pub mod subject;
pub mod substring;

// Re-export commonly used types
pub use config::{build_config, config_item};
pub use driver::{HarnessError, Timing};
pub use input::LineReader;
pub use session::{run, ActiveTester, Width};
