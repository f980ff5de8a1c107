pub mod approval;
pub mod artifact;
pub mod deploy;
pub mod migrate;
pub mod rollback;
pub mod serve;
pub mod service;
