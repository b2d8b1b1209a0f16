pub mod action;
pub mod exec;
pub mod modifier;
pub mod pattern;
pub mod rule;
pub mod state;
pub mod template;
