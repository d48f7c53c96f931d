pub mod agent;
pub mod analysis;
pub mod analyze;
pub mod app_state;
pub mod auth;
pub mod cache;
pub mod config;
pub mod fetcher;
pub mod health;
pub mod llm;
pub mod pipeline;
pub mod routes;
pub mod scoring;
pub mod scrapers;
pub mod tools;
