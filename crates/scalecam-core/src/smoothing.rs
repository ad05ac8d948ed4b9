//! Fixed-capacity sliding window statistics.
//!
//! # Example
//!
//! ```
//! use scalecam_core::Smoother;
//!
//! let mut smoother = Smoother::new(3).unwrap();
//! for v in [10.0, 500.0, 12.0, 11.0] {
//!     smoother.append(v);
//! }
//! // Window now holds [500, 12, 11]
//! assert_eq!(smoother.median().unwrap(), 12.0);
//! ```

use std::collections::VecDeque;

use crate::error::{Error, Result};

/// Sliding window over the last `window` values.
#[derive(Debug, Clone)]
pub struct Smoother {
    values: VecDeque<f64>,
    window: usize,
    scratch: Vec<f64>,
}

impl Smoother {
    /// Create a smoother holding at most `window` values.
    pub fn new(window: usize) -> Result<Self> {
        if window == 0 {
            return Err(Error::invalid_config("smoothing window must be at least 1"));
        }
        Ok(Self {
            values: VecDeque::with_capacity(window),
            window,
            scratch: Vec::with_capacity(window),
        })
    }

    /// Record a value, evicting the oldest once the window is full.
    pub fn append(&mut self, value: f64) {
        if self.values.len() == self.window {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    /// Median of the held values. An even count yields the mean of the two
    /// middle values.
    pub fn median(&mut self) -> Result<f64> {
        let n = self.values.len();
        if n == 0 {
            return Err(Error::InsufficientData);
        }

        self.scratch.clear();
        self.scratch.extend(self.values.iter().copied());
        let mid = n / 2;
        let (lower, upper, _) = self.scratch.select_nth_unstable_by(mid, f64::total_cmp);
        let upper = *upper;

        if n % 2 == 1 {
            return Ok(upper);
        }
        let below = lower
            .iter()
            .copied()
            .max_by(|a, b| a.total_cmp(b))
            .unwrap_or(upper);
        Ok((below + upper) / 2.0)
    }

    /// Arithmetic mean of the held values.
    pub fn mean(&self) -> Result<f64> {
        if self.values.is_empty() {
            return Err(Error::InsufficientData);
        }
        Ok(self.values.iter().sum::<f64>() / self.values.len() as f64)
    }

    /// Number of values held.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Whether the window holds `window` values.
    pub fn is_full(&self) -> bool {
        self.values.len() == self.window
    }

    /// Capacity of the window.
    pub fn window(&self) -> usize {
        self.window
    }

    /// Drop all held values.
    pub fn clear(&mut self) {
        self.values.clear();
    }

    /// Held values, oldest first.
    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.values.iter().copied()
    }
}

/// Reference median used to check [`Smoother::median`].
#[cfg(test)]
fn sorted_median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}
