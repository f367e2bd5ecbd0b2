//! Elevation smoothing and speed helpers.

/// Centered moving average over `window` points.
///
/// Near the ends the window shrinks to the samples that exist, so the output
/// always has the same length as the input.
pub fn centered_moving_average(values: &[f64], window: usize) -> Vec<f64> {
    if values.is_empty() {
        return Vec::new();
    }

    let half = window.max(1) / 2;
    let last = values.len() - 1;

    (0..values.len())
        .map(|i| {
            let from = i.saturating_sub(half);
            let to = (i + half).min(last);
            let slice = &values[from..=to];
            slice.iter().sum::<f64>() / slice.len() as f64
        })
        .collect()
}

/// Speed in km/h for `distance_m` covered in `seconds`. Zero when no time passed.
pub fn speed_kmh(distance_m: f64, seconds: f64) -> f64 {
    if seconds > 0.0 {
        distance_m / seconds * 3.6
    } else {
        0.0
    }
}

/// Running mean/max accumulator for values that pass a filter.
#[derive(Debug, Default, Clone, Copy)]
pub struct Accumulator {
    sum: f64,
    count: usize,
    max: f64,
}

impl Accumulator {
    /// Create an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value.
    pub fn add(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
        if self.count == 1 || value > self.max {
            self.max = value;
        }
    }

    /// Mean of the added values, zero when empty.
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }

    /// Largest added value, zero when empty.
    pub fn max(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.max
        }
    }

    /// Number of values added.
    pub fn len(&self) -> usize {
        self.count
    }

    /// Check if nothing was added.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Heart rate aggregate over readings greater than zero.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeartRateAccumulator {
    sum: u64,
    count: u32,
    max: u8,
}

impl HeartRateAccumulator {
    /// Add a reading. Missing and zero readings are skipped.
    pub fn add(&mut self, bpm: Option<u8>) {
        if let Some(hr) = bpm.filter(|hr| *hr > 0) {
            self.sum += hr as u64;
            self.count += 1;
            self.max = self.max.max(hr);
        }
    }

    /// Mean of the kept readings, `None` when there were none.
    pub fn average(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum as f64 / self.count as f64)
    }

    /// Highest kept reading, `None` when there were none.
    pub fn max(&self) -> Option<u8> {
        (self.count > 0).then_some(self.max)
    }
}
