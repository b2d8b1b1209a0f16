pub mod cmd;
pub mod proxy;
pub mod raw_config;
pub mod signal;
