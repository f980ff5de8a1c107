pub mod approvals;
pub mod catalog;
pub mod config;
pub mod credentials;
pub mod deploy;
pub mod dispatch;
pub mod error;
pub mod git;
pub mod github;
pub mod jenkins;
pub mod ledger;
pub mod model;
pub mod platform;
pub mod repo_host;
pub mod saga;
pub mod store;
pub mod templates;
pub mod types;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{LaunchpadError, Result};
pub use platform::Platform;
