pub mod config;
pub mod db;
pub mod export;
pub mod images;
pub mod schema;
pub mod server;
