//! Utils module - logging setup shared by the binary and tests

pub mod logging;
