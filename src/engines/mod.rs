//! Speech synthesis engines.
//!
//! This module contains implementations of text-to-speech engines.
//!
//! # Available Engines
//!
//! - `hts` - HTS statistical parametric synthesis with the STRAIGHT vocoder
//!   (HTK/HTS, SPTK and MATLAB required)

pub mod hts;
