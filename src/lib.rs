//! # MediScan Backend Library
//!
//! This is the core library for MediScan, a patient-facing backend for medical
//! image analysis. MediScan handles account management with email confirmation,
//! medical image uploads, simulated AI analysis with live progress streaming,
//! and reporting over a REST API.
//!
//! ## Architecture
//!
//! The application is built using:
//! - **Axum**: Modern web framework for HTTP server and routing
//! - **SQLx**: Asynchronous database operations with SQLite
//! - **Tokio**: Async runtime for concurrent operations
//! - **Serde**: Serialization/deserialization for JSON APIs
//!
//! ## Core Components
//!
//! - [`analysis`]: Simulated AI analysis engine and outcome catalog
//! - [`auth`]: Password hashing and bearer-token primitives
//! - [`config`]: Application configuration management
//! - [`db`]: Database schema initialization and migrations
//! - [`error`]: Centralized error handling and HTTP error responses
//! - [`metrics`]: Application performance and usage metrics
//! - [`middleware`]: HTTP middleware for authentication, rate limiting, and validation
//! - [`routes`]: HTTP API endpoint handlers
//! - [`state`]: Shared application state and resource management
//! - [`storage`]: Media storage for originals and thumbnails
//! - [`types`]: Data transfer objects and shared type definitions
//!
//! ## Features
//!
//! - Account signup with email confirmation and JWT-based sessions
//! - Medical image upload with type and size validation
//! - Simulated analysis with real-time progress via Server-Sent Events (SSE)
//! - Scan records with search and filtering
//! - Dashboard statistics and plain-text scan reports
//! - Account data export as JSON
//! - Rate limiting and security headers
//! - Comprehensive error handling and logging

pub mod analysis;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod storage;
pub mod types;

#[cfg(test)]
mod tests;
