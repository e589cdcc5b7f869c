pub mod apply;
pub mod common;
pub mod config;
pub mod diff;
pub mod plan;
pub mod status;

pub use apply::Apply;
pub use common::GlobalOptions;
pub use config::Config;
pub use diff::Diff;
pub use plan::Plan;
pub use status::Status;
