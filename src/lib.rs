//! Affordability Planner API Library
//!
//! House affordability planning on top of a FastAPI backend: the planner
//! workflow, its local projection fallback, spending insights, and the HTTP
//! relays the web client talks to.
//!
//! # Modules
//!
//! - `api`: HTTP-facing components.
//! - `core`: Planner workflow and domain logic.
//! - `integrations`: Backend client and service adapters.
//! - `backend_client`: FastAPI backend client.
//! - `circuit_breaker`: Circuit breaker for analysis calls.
//! - `config`: Configuration management.
//! - `errors`: Error handling types.
//! - `handlers`: Relay handlers and shared application state.
//! - `insights`: Spending insight rules.
//! - `models`: Planner and wire data models.
//! - `planner`: Affordability planning workflow.
//! - `planner_handler`: Planner session handlers.
//! - `projection`: Local projection arithmetic.
//! - `routes`: Router construction.
//! - `services`: Service traits and backend implementations.

pub mod api;
pub mod core;
pub mod integrations;

pub mod backend_client;
pub mod circuit_breaker;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod insights;
pub mod models;
pub mod planner;
pub mod planner_handler;
pub mod projection;
pub mod routes;
pub mod services;
