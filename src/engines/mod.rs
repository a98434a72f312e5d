//! Speech synthesis engines.
//!
//! This module contains implementations of voice-cloning models.
//!
//! # Available Engines
//!
//! Enable engines via Cargo features:
//! - `neutts` - NeuTTS-Air (ONNX format, espeak-ng required)
//!
//! Prompt handling, sampling and reference audio loading are always
//! compiled so they can be exercised without an ONNX runtime.

pub mod neutts;
