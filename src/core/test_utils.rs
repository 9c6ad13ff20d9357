//! Test utilities for arena-based testing.
