//! # Financial Market Models Module
//!
//! This module groups the data models for the markets the application tracks.
//! Its purpose is to give the rest of the system one normalized vocabulary for
//! instruments and quotes, independent of which upstream delivered them.
//!
//! ## Contained Modules:
//!
//! - **`forex`**: Currency pairs, the process-wide supported pair allow-list,
//!   rate snapshots with their precision rules, the wire envelope returned by
//!   the forex proxy, and currency display metadata.

/// Currency pair, rate snapshot and wire models for the forex market.
pub mod forex;
