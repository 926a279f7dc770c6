pub mod config;
pub mod driver;
pub mod logging;
pub mod probe;
pub mod task;
pub mod version;
