pub mod cli;
pub mod config;
pub mod defs;
pub mod hardware;
pub mod policy;
pub mod server;
pub mod state;
