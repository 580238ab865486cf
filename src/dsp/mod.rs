//! Pure numeric kernel: statistics, filters, spectra, correlation.
//!
//! Every function operates on immutable numeric slices and returns new
//! values. Empty and single-element inputs never raise; they yield
//! empty/default results. Transient numeric faults (division by zero,
//! log of non-positive inputs) fall back to safe defaults.

pub mod correlation;
pub mod filters;
pub mod spectrum;
pub mod statistics;

pub use correlation::{autocorrelation, cross_correlation, envelope, find_peaks, Peak};
pub use filters::{band_pass, high_pass, low_pass, moving_average, DirectForm2, KalmanFilter, LmsFilter};
pub use spectrum::{fft, magnitude_spectrum, phase_spectrum};
pub use statistics::{kurtosis, mean, median, percentile, skewness, std_dev, variance, RunningStats};
