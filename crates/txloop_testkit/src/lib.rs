//! # txloop Testkit
//!
//! Test utilities for txloop.
//!
//! This crate provides:
//! - Recording resources and scripted handlers
//! - A retryable test error and a manager that retries it
//! - Property-based test generators using proptest
//! - Stress testing utilities
//!
//! ## Usage
//!
//! ```rust
//! use txloop_testkit::prelude::*;
//!
//! let log = EventLog::new();
//! let manager = retrying_manager();
//! let mut txn = manager.begin();
//! txn.join(log.resource("a", "k")).unwrap();
//! manager.commit(&mut txn).unwrap();
//! assert_eq!(log.finished(), vec!["a"]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use generators::*;
pub use stress::*;
