//! Integration and unit tests for the MediScan application.
//!
//! This module organizes all test modules for the application, providing
//! comprehensive test coverage for different components and functionality.
//!
//! ## Test Modules
//!
//! - **analysis_tests**: Tests for the mocked analysis engine
//! - **api_tests**: Scan upload and record API endpoint tests
//! - **auth_api_tests**: Signup, confirmation, signin and profile tests
//! - **catalog_tests**: Outcome catalog resolution and draw tests
//! - **config_tests**: Configuration loading and validation tests
//! - **db_tests**: Database operations and migration tests
//! - **error_tests**: Error handling and validation tests
//! - **health_api_tests**: Health check endpoint tests
//! - **stats_tests**: Dashboard aggregation tests
//! - **storage_tests**: Media store tests
//!
//! ## Running Tests
//!
//! Tests can be run using:
//! ```bash
//! cargo test
//! ```
//!
//! Individual test modules can be run with:
//! ```bash
//! cargo test analysis_tests
//! cargo test api_tests
//! # etc.
//! ```

pub mod auth_api_tests;
pub mod config_tests;
pub mod health_api_tests;
pub mod storage_tests;
