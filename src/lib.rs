pub mod board;
pub mod constants;
pub mod engine;
pub mod entity;
pub mod game;
pub mod rng;
pub mod server_protocol;
pub mod server_utils;
pub mod types;
