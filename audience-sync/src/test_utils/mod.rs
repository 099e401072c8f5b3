//! Utilities for testing code built on the synchronization engine.
//!
//! [`http::MockHttpClient`] stands in for the upstream transport with scripted responses and
//! records every request it receives. [`records`] builds membership records for common
//! scenarios.

pub mod http;
pub mod records;
