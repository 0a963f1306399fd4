pub mod app;
pub mod config;
pub mod descriptor;
pub mod discovery;
pub mod download;
pub mod error;
pub mod host;
pub mod index;
pub mod install;
pub mod output;
pub mod repo;
pub mod version;
