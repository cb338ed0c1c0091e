// src/lib.rs - Library root for moonforge

pub mod cache;
pub mod cli;
pub mod generator;
pub mod handlers;
pub mod infra;
pub mod scoring;
pub mod workflow;
