#![doc = include_str!("RUSTDOC.md")]

pub mod cms;
pub mod database;
pub mod logger;
pub mod util;
