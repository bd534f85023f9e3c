//! CLI command implementations

pub mod config;
pub mod gc;
pub mod get;
pub mod inspect;
pub mod output;

pub use config::execute as config;
pub use gc::execute as gc;
pub use get::execute as get;
pub use inspect::execute as inspect;
pub use output::execute as output;
