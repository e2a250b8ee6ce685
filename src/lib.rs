//! Image Analysis Job Queue
//!
//! This library provides the core of the analysis-queue service: a durable,
//! Postgres-backed job queue with a guarded status state machine, fair
//! priority/age scheduling with bounded retry backoff, a fingerprint-keyed
//! result cache, and an operator control surface.

pub mod app_state;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;
