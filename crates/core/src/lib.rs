#![forbid(unsafe_code)]

pub mod model;
pub mod route;
pub mod scoring;
pub mod session;
pub mod time;

pub use time::Clock;
