pub mod approvals;
pub mod artifacts;
pub mod services;
