pub mod api;
pub mod broadcast;
pub mod config;
pub mod error;
pub mod gate;
pub mod geo;
pub mod jobs;
pub mod models;
pub mod observability;
pub mod state;
pub mod store;
pub mod tracking;
