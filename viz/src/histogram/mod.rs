//! Histograms over fixed bin edges
//!
//! Binning follows numpy's `histogram` convention: every bin is half-open
//! `[lo, hi)` except the last, which also includes its upper edge. Values
//! outside the edges and NaN are ignored. Counts are `f64` so that samples
//! can carry weights.

use crate::{Result, VizError};
use std::fmt::Write;

const BAR_CHAR: char = '#';
const MAX_BAR_WIDTH: usize = 40;

/// Histogram for continuous data
#[derive(Debug, Clone)]
pub struct Histogram {
    /// Bin edges (boundaries between bins)
    bin_edges: Vec<f64>,
    /// Weighted counts in each bin
    counts: Vec<f64>,
    /// Total weight of binned values
    total_count: f64,
    /// Heading printed above the table
    title: Option<String>,
}

impl Histogram {
    /// Create a new histogram with specified bin edges
    pub fn new(bin_edges: Vec<f64>) -> Result<Self> {
        if bin_edges.len() < 2 {
            return Err(VizError::HistogramError(
                "Histogram must have at least 2 bin edges".to_string(),
            ));
        }

        // Check that bin edges are finite and in ascending order
        if bin_edges.iter().any(|e| !e.is_finite()) {
            return Err(VizError::HistogramError(
                "Histogram bin edges must all be finite".to_string(),
            ));
        }
        if bin_edges.windows(2).any(|w| w[0] >= w[1]) {
            return Err(VizError::HistogramError(
                "Histogram bin edges must be in ascending order".to_string(),
            ));
        }

        let num_bins = bin_edges.len() - 1;

        Ok(Self {
            bin_edges,
            counts: vec![0.0; num_bins],
            total_count: 0.0,
            title: None,
        })
    }

    /// Set the heading used by [`Self::format`]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Add a value to the histogram
    pub fn add(&mut self, value: f64) {
        self.add_weighted(value, 1.0);
    }

    /// Add a value carrying the given weight
    pub fn add_weighted(&mut self, value: f64, weight: f64) {
        if let Some(idx) = self.find_bin(value) {
            self.counts[idx] += weight;
            self.total_count += weight;
        }
    }

    /// Add multiple values to the histogram
    pub fn add_all<I>(&mut self, values: I)
    where
        I: IntoIterator<Item = f64>,
    {
        for value in values {
            self.add(value);
        }
    }

    /// Find the bin index for a value
    pub fn find_bin(&self, value: f64) -> Option<usize> {
        let first = self.bin_edges[0];
        let last = self.bin_edges[self.bin_edges.len() - 1];

        // NaN fails both comparisons
        if !(value >= first && value <= last) {
            return None;
        }

        // Special case: if value is exactly the last bin edge, put it in the last bin
        if value == last {
            return Some(self.counts.len() - 1);
        }

        let upper = self.bin_edges.partition_point(|&edge| edge <= value);
        Some(upper - 1)
    }

    /// Get the counts in each bin
    pub fn counts(&self) -> &[f64] {
        &self.counts
    }

    /// Get the bin edges
    pub fn bin_edges(&self) -> &[f64] {
        &self.bin_edges
    }

    /// Midpoint of each bin
    pub fn bin_centers(&self) -> Vec<f64> {
        self.bin_edges
            .windows(2)
            .map(|w| 0.5 * (w[0] + w[1]))
            .collect()
    }

    pub fn num_bins(&self) -> usize {
        self.counts.len()
    }

    /// Get the total count
    pub fn total_count(&self) -> f64 {
        self.total_count
    }

    /// ASCII table of the populated bins with counts, percentages and bars
    pub fn format(&self) -> Result<String> {
        let mut output = String::new();

        if let Some(title) = &self.title {
            writeln!(output, "{}", title)?;
            writeln!(output, "{}", "=".repeat(title.len()))?;
        }

        let max_count = self.counts.iter().copied().fold(0.0_f64, f64::max);
        let max_count = if max_count > 0.0 { max_count } else { 1.0 };

        let count_column_width = self
            .counts
            .iter()
            .map(|c| format_count(*c).len())
            .max()
            .unwrap_or(10)
            .max(5)
            + 2;

        let mut header = String::new();
        write!(header, "{:<19} ", "Range")?;
        write!(header, "| {:<width$} ", "Count", width = count_column_width)?;
        write!(header, "| {:<10} ", "Percentage")?;
        write!(header, "| Bar")?;

        writeln!(output, "{}", header)?;
        writeln!(output, "{}", "-".repeat(header.len()))?;

        for (i, &count) in self.counts.iter().enumerate() {
            if count == 0.0 {
                continue;
            }

            let percentage = if self.total_count > 0.0 {
                (count / self.total_count) * 100.0
            } else {
                0.0
            };

            let bar_length = ((count / max_count) * MAX_BAR_WIDTH as f64).round() as usize;
            let bar = BAR_CHAR.to_string().repeat(bar_length);

            write!(
                output,
                "{:<8} - {:<8}",
                format_with_sign(self.bin_edges[i]),
                format_with_sign(self.bin_edges[i + 1]),
            )?;
            write!(
                output,
                " | {:<width$} ",
                format_count(count),
                width = count_column_width
            )?;
            write!(output, "| {:5.2}%     ", percentage)?;
            writeln!(output, "| {}", bar)?;
        }

        Ok(output)
    }
}

// 3-4 sig figs with consistent sign handling
fn format_with_sign(val: f64) -> String {
    let val_str = format!("{:.3}", val);
    if val_str.starts_with('-') {
        val_str
    } else {
        format!("+{}", val_str)
    }
}

fn format_count(count: f64) -> String {
    if count.fract() == 0.0 {
        format!("{}", count as i64)
    } else {
        format!("{:.2}", count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_histogram_creation() {
        let hist = Histogram::new(vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        assert_eq!(hist.num_bins(), 5);
        assert_eq!(hist.total_count(), 0.0);
    }

    #[test]
    fn test_histogram_adding_values() {
        let mut hist = Histogram::new(vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();

        hist.add(0.5);
        hist.add(1.5);
        hist.add(1.7);
        hist.add(4.9);

        assert_eq!(hist.counts(), &[1.0, 2.0, 0.0, 0.0, 1.0]);
        assert_eq!(hist.total_count(), 4.0);
    }

    #[test]
    fn test_edges_are_half_open_except_last() {
        let mut hist = Histogram::new(vec![0.0, 1.0, 2.0]).unwrap();
        hist.add_all([0.0, 1.0, 2.0]);
        assert_eq!(hist.counts(), &[1.0, 2.0]);
    }

    #[test]
    fn test_out_of_range_and_nan_ignored() {
        let mut hist = Histogram::new(vec![0.0, 1.0, 2.0]).unwrap();
        hist.add_all([-0.1, 2.1, f64::NAN, f64::INFINITY]);
        assert_eq!(hist.total_count(), 0.0);
    }

    #[test]
    fn test_weighted_counts() {
        let mut hist = Histogram::new(vec![0.0, 1.0, 2.0]).unwrap();
        hist.add_weighted(0.5, 0.25);
        hist.add_weighted(0.6, 0.25);
        hist.add(1.5);
        assert_relative_eq!(hist.counts()[0], 0.5);
        assert_relative_eq!(hist.total_count(), 1.5);
    }

    #[test]
    fn test_invalid_edges() {
        assert!(Histogram::new(vec![1.0]).is_err());
        assert!(Histogram::new(vec![0.0, 2.0, 1.0]).is_err());
        assert!(Histogram::new(vec![0.0, 1.0, 1.0]).is_err());
        assert!(Histogram::new(vec![0.0, f64::NAN]).is_err());
    }

    #[test]
    fn test_find_bin_and_centers() {
        let hist = Histogram::new(vec![0.0, 0.25, 0.5, 0.75, 1.0]).unwrap();
        assert_eq!(hist.find_bin(0.3), Some(1));
        assert_eq!(hist.find_bin(1.0), Some(3));
        assert_eq!(hist.find_bin(1.1), None);
        let centers = hist.bin_centers();
        assert_relative_eq!(centers[0], 0.125);
        assert_relative_eq!(centers[3], 0.875);
    }

    #[test]
    fn test_histogram_formatting() {
        let mut hist = Histogram::new(vec![0.0, 1.0, 2.0, 3.0])
            .unwrap()
            .with_title("Line EW");
        hist.add_all([0.5, 1.5, 1.6, 1.7]);

        let text = hist.format().unwrap();
        assert!(text.starts_with("Line EW\n======="));
        assert!(text.contains("+0.000   - +1.000"));
        // Empty bins are skipped
        assert!(!text.contains("+2.000   - +3.000"));
        assert!(text.contains("75.00%"));
    }
}
