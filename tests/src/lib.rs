//! # Pipe Router Test Suite
//!
//! Unified test crate for behavior that spans the connector, the router and
//! the wire format.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── scenarios.rs   # End-to-end exchanges between two endpoints
//!     ├── properties.rs  # Invariants checked over many calls
//!     └── wire.rs        # What actually crosses the pipe
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p pipe-tests
//! cargo test -p pipe-tests integration::scenarios::
//! ```
