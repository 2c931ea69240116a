// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! ec-fan-utility: drive a laptop's CrOS embedded controller fan from CPU
//! temperature instead of the EC's built-in thermal table.
//!
//! The pipeline reads per-core temperatures each tick, smooths them over a
//! moving window, maps the result through a piecewise-linear duty curve, and
//! forwards the duty to the EC through a debounce gate that suppresses
//! near-identical commands:
//!
//! ```text
//! sensors -> MovingAverageSmoother -> FanCurve -> DebounceGate -> EcCommandChannel
//! ```
//!
//! On shutdown the daemon always hands thermal control back to the EC.

pub mod config;
pub mod control;
pub mod curve;
pub mod ec;
pub mod fan;
pub mod percent;
pub mod power;
pub mod sensors;
pub mod smooth;
pub mod state;
