pub mod config;
pub mod policy;
pub mod release;
pub mod version;
