//! HTTP route handlers for the MediScan API.
//!
//! This module contains all the HTTP endpoint handlers for the medical imaging
//! backend. Each sub-module handles a specific domain of functionality:
//!
//! - `auth`: Account signup, signin and email confirmation endpoints
//! - `export`: Account data export functionality
//! - `health`: Health check and system status endpoints
//! - `scans`: Scan upload, analysis and record management
//! - `stats`: Dashboard statistics aggregation

pub mod auth;
pub mod export;
pub mod health;
pub mod scans;
pub mod stats;
