pub mod api;
pub mod catalog;
pub mod client;
pub mod config;
pub mod controller;
pub mod dispatcher;
pub mod errors;
pub mod executor;
pub mod load_models;
pub mod metrics;
pub mod run;
pub mod state;
pub mod stats;
pub mod utils;
