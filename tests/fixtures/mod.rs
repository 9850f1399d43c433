//! Test Fixtures Module
//!
//! This module provides test fixtures for WaaV Call testing:
//! - Audio fixtures (programmatically generated)
//! - WAV files written to temporary directories

// Allow dead code in test fixtures - not every test uses every helper
#![allow(dead_code)]

pub mod audio_fixtures;

pub use audio_fixtures::*;
