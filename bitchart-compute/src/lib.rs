//! Indicator math and temporal decimation for BitChart.
//!
//! The heavy lifting runs on a dedicated worker thread ([`ComputeWorker`])
//! fed by a message channel; the algorithms themselves are plain functions
//! over slices so they can be tested (and reused) without a worker.

pub mod decimate;
pub mod indicators;
mod worker;

pub use indicators::IndicatorKind;
pub use worker::{
    ComputeError, ComputeHandle, ComputeOp, ComputeReply, ComputeRequest, ComputeResponse,
    ComputeWorker, Pending, DEFAULT_REQUEST_TIMEOUT,
};
