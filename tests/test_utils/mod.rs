#![allow(dead_code)]

pub mod fixtures;
pub mod mock_server;

pub use fixtures::{message, tcp_listener, track};
pub use mock_server::{CapturedRequest, spawn_server};
