pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod mail;
pub mod models;
pub mod render;
pub mod security;
pub mod server;
pub mod service;
pub mod totals;
pub mod ui;
