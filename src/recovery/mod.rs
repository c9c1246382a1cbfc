// SPDX-License-Identifier: Apache-2.0

//! RFC 9002 loss recovery and congestion control: RTT estimation, the
//! packet/time-threshold loss detector, persistent-congestion detection,
//! and a NewReno-style congestion controller.

pub mod congestion_controller;
pub mod loss_detector;
pub mod persistent_congestion;
pub mod rtt_estimator;

pub use congestion_controller::CongestionController;
pub use loss_detector::{LossDetector, LossOutcome};
pub use rtt_estimator::RttEstimator;
