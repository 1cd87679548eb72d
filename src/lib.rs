pub mod access;
pub mod app;
pub mod catalog;
pub mod config;
pub mod domain;
pub mod error;
pub mod orchestrator;
pub mod output;
pub mod profile;
pub mod sink;
pub mod workflow;
