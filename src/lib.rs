//! Peak fitting for HPGe gamma-ray spectra.
//!
//! Curve models and their seeds live in [`fitter`], the per-histogram fit
//! session and its debounced refits in [`fitter::session`], and text, CSV,
//! JSON and report output in [`fitter::format`] and [`export`]. The numerical
//! minimizer sits behind [`fitter::FitEngine`].

#![warn(clippy::all, rust_2018_idioms)]

pub mod batch;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod export;
pub mod fitter;
pub mod histoer;
pub mod scheduler;
