//! A rule engine rewriting, redirecting, fabricating or aborting proxied HTTP requests, driven by
//! a small line oriented rules file that can be reloaded while requests are in flight.

pub mod engine;
pub mod handler;
pub mod proxy;
pub mod raw_config;
pub mod task;
