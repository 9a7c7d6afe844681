pub mod app;
pub mod client;
pub mod config;
pub mod graph;
pub mod grid;
pub mod logging;
pub mod stream;
pub mod surface;
pub mod timestamp;
pub mod toggle;
pub mod ui;
