pub mod ackermann;
pub mod command;
pub mod config;
pub mod controller;
pub mod limiter;
pub mod messages;
pub mod runtime;
pub mod throttle;
