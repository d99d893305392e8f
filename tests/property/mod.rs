//! Property-based tests for sequencing and composition order
