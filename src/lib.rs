//! Core library for the cbam-tools command line application.
//!
//! The library turns versioned customer spreadsheets into a normalized report
//! model. Workbook access lives under [`cbam::tools::io`], the layout document
//! and version overlays under [`cbam::tools::layout`], value normalization in
//! [`cbam::tools::validate`], keyword-anchored table extraction in
//! [`cbam::tools::extract`], and the business aggregation in
//! [`cbam::tools::aggregate`]. [`cbam::tools::workflow`] ties the pieces
//! together for batch runs.

pub mod cbam;

pub use cbam::tools::{
    Result, ToolError, aggregate, config, emission, error, extract, io, layout, model, progress,
    reference, run, validate, workflow,
};
