//! Normalization, the classifier seam, and calibration of raw output.

pub mod calibration;
pub mod classifier;
pub mod normalize;
