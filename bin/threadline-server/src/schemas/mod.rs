//! Request / response types for the HTTP API, grouped by version.

pub mod v1;
