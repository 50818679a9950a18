//! Windowed median filter over `K` parallel streams.
//!
//! Values accumulate until the window holds `window_size` samples per stream. A drain
//! then returns the per-stream medians and empties every stream at once, so the next
//! push starts a fresh window. Windows never overlap.

/// Median filter for `K` synchronized streams.
#[derive(Clone, Debug)]
pub struct MedianFilter<const K: usize> {
    window_size: usize,
    streams: [Vec<f64>; K],
}

impl<const K: usize> MedianFilter<K> {
    /// Create a filter with the given window size. A zero size is treated as 1.
    pub fn new(window_size: usize) -> Self {
        let window_size = window_size.max(1);
        Self {
            window_size,
            streams: std::array::from_fn(|_| Vec::with_capacity(window_size)),
        }
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Number of samples accumulated in the current window.
    pub fn len(&self) -> usize {
        self.streams.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_ready(&self) -> bool {
        self.len() >= self.window_size
    }

    /// Append one sample to each stream.
    pub fn push(&mut self, values: [f64; K]) {
        for (stream, value) in self.streams.iter_mut().zip(values) {
            stream.push(value);
        }
    }

    /// Per-stream medians once the window is full, clearing all streams.
    ///
    /// Returns `None` (not ready) before `window_size` pushes.
    pub fn drain(&mut self) -> Option<[f64; K]> {
        if !self.is_ready() {
            return None;
        }
        let medians = std::array::from_fn(|i| median(&mut self.streams[i]));
        self.reset();
        Some(medians)
    }

    /// Push then drain in one step.
    pub fn push_and_drain(&mut self, values: [f64; K]) -> Option<[f64; K]> {
        self.push(values);
        self.drain()
    }

    /// Discard any partially accumulated window.
    pub fn reset(&mut self) {
        for stream in &mut self.streams {
            stream.clear();
        }
    }
}

/// Median of a non-empty slice; even lengths average the two middle values.
fn median(values: &mut [f64]) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}
