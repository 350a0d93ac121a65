//! Token-triggered automation daemon: scan a token, resolve it to ZapScript and
//! run it against the host platform.

pub mod api;
pub mod cli;
pub mod client;
pub mod config;
pub mod history;
pub mod mapping;
pub mod platform;
pub mod playlist;
pub mod readers;
pub mod service;
pub mod state;
pub mod token;
pub mod zapscript;
