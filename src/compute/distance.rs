//! Squared Euclidean distance over variable-length vectors.

/// Squared Euclidean distance, treating missing trailing components as zero.
///
/// Pure function of its inputs: swapping the arguments gives a bitwise
/// identical result.
#[inline]
pub fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    let (long, short) = if a.len() >= b.len() { (a, b) } else { (b, a) };

    let shared: f64 = short
        .iter()
        .zip(long)
        .map(|(x, y)| {
            let d = y - x;
            d * d
        })
        .sum();
    let tail: f64 = long[short.len()..].iter().map(|x| x * x).sum();

    shared + tail
}

/// Per-dimension min/max normalization.
///
/// Bounds come from known `(min, max)` values where given, otherwise from the
/// data. A dimension with zero span normalizes to 0.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureBounds {
    mins: Vec<f64>,
    spans: Vec<f64>,
}

impl FeatureBounds {
    /// Fit bounds of `width` dimensions to a set of rows.
    pub fn fit<'a, I, F>(width: usize, rows: I, known: F) -> Self
    where
        I: IntoIterator<Item = &'a [f64]>,
        F: Fn(usize) -> Option<(f64, f64)>,
    {
        let mut mins = vec![f64::INFINITY; width];
        let mut maxs = vec![f64::NEG_INFINITY; width];

        for row in rows {
            for (dim, &value) in row.iter().enumerate().take(width) {
                mins[dim] = mins[dim].min(value);
                maxs[dim] = maxs[dim].max(value);
            }
        }

        for dim in 0..width {
            if let Some((min, max)) = known(dim) {
                mins[dim] = min;
                maxs[dim] = max;
            }
        }

        let spans = mins
            .iter()
            .zip(&maxs)
            .map(|(min, max)| {
                let span = max - min;
                if span.is_finite() && span > 0.0 { span } else { 0.0 }
            })
            .collect();
        let mins = mins
            .into_iter()
            .map(|m| if m.is_finite() { m } else { 0.0 })
            .collect();

        Self { mins, spans }
    }

    /// Number of dimensions.
    pub fn width(&self) -> usize {
        self.mins.len()
    }

    /// Normalize one value of a dimension.
    #[inline]
    pub fn normalize(&self, dim: usize, value: f64) -> f64 {
        match (self.mins.get(dim), self.spans.get(dim)) {
            (Some(min), Some(span)) if *span > 0.0 => (value - min) / span,
            _ => 0.0,
        }
    }

    /// Normalize a row into `out`, zero-padding it to the full width.
    pub fn normalize_row_into(&self, row: &[f64], out: &mut Vec<f64>) {
        for dim in 0..self.width() {
            out.push(row.get(dim).map_or(0.0, |&v| self.normalize(dim, v)));
        }
    }
}
