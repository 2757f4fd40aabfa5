//! Tests for the awl-engine crate.

mod helpers;
