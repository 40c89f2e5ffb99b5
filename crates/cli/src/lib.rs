pub mod cli;
pub mod commands;
pub mod config;
pub mod connect;
pub mod context;
pub mod error;
pub mod logging;
