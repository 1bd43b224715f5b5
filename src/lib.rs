//! Vision Tech detection client
//!
//! This library provides an async client for the Vision Tech video analysis
//! service: session handling, the detection job API, and a job-status tracker
//! that polls a running detection job until it finishes.

pub mod app_state;
pub mod commands;
pub mod config;
pub mod models;
pub mod services;
