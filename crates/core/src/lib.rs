// crates/core/src/lib.rs
pub mod error;
pub mod job;
pub mod machine;
pub mod paths;
pub mod progress;
pub mod registry;
pub mod resolve;
pub mod retry;
pub mod storage;

pub use error::*;
pub use job::*;
pub use machine::*;
pub use progress::*;
pub use registry::*;
pub use resolve::*;
pub use retry::*;
pub use storage::*;
