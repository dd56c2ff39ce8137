#![deny(clippy::all)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod app;
pub mod config;
pub mod domain;
pub mod infra;
pub mod usecases;

pub use app::Application;
