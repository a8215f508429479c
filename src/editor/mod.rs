pub mod actions;
pub mod backend;
pub mod catalog;
pub mod config_files;
mod device_config;
pub mod errors;
pub mod form;
pub mod merger;
mod parser;
pub mod policies;
pub mod render;
pub mod script;
pub mod session;
pub mod store;
mod utils;
pub mod wire;

#[cfg(test)]
mod testing;
