//! Library crate for snifferfy, the HTTP gateway in front of snf-server's XCI interface.
pub mod blob;
pub mod client;
pub mod command;
pub mod config;
pub mod decode;
pub mod error;
pub mod gateway;
pub mod server;
pub mod types;
