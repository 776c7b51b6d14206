use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::ops::RangeInclusive;
use std::path::Path;

use crate::error::LoadError;

/// Read access to a uniformly binned 1D spectrum.
///
/// Bins are addressed `0..bin_count()`; there are no under/overflow bins in
/// the index space. Fitting only ever reads through this trait, so anything
/// that can answer these questions can be fit.
pub trait BinnedHistogram {
    fn name(&self) -> &str;
    fn bin_count(&self) -> usize;
    fn x_range(&self) -> (f64, f64);
    fn bin_center(&self, bin: usize) -> f64;
    fn bin_content(&self, bin: usize) -> f64;

    /// Bin holding `x`, or `None` when `x` lies off the axis.
    fn find_bin(&self, x: f64) -> Option<usize>;

    /// Like `find_bin`, but positions off the axis map to the nearest edge bin.
    fn clamped_bin(&self, x: f64) -> Option<usize> {
        let count = self.bin_count();
        if count == 0 || x.is_nan() {
            return None;
        }
        let (lo, hi) = self.x_range();
        if x < lo {
            Some(0)
        } else if x >= hi {
            Some(count - 1)
        } else {
            self.find_bin(x).map(|bin| bin.min(count - 1))
        }
    }

    /// Inclusive bin range covering `[xmin, xmax]`, `None` when the window
    /// misses the axis entirely or is inverted.
    fn bins_in_range(&self, xmin: f64, xmax: f64) -> Option<RangeInclusive<usize>> {
        let (lo, hi) = self.x_range();
        if self.bin_count() == 0 || xmax < xmin || xmax < lo || xmin > hi {
            return None;
        }
        let first = self.clamped_bin(xmin)?;
        let last = self.clamped_bin(xmax)?;
        Some(first..=last)
    }

    fn bin_count_in_range(&self, xmin: f64, xmax: f64) -> usize {
        self.bins_in_range(xmin, xmax)
            .map(|bins| bins.count())
            .unwrap_or(0)
    }

    /// Bin centers and contents within `[xmin, xmax]`.
    fn points_in_range(&self, xmin: f64, xmax: f64) -> (Vec<f64>, Vec<f64>) {
        match self.bins_in_range(xmin, xmax) {
            Some(bins) => bins
                .map(|bin| (self.bin_center(bin), self.bin_content(bin)))
                .unzip(),
            None => (Vec::new(), Vec::new()),
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct Histogram {
    pub name: String,
    pub bins: Vec<f64>,
    pub range: (f64, f64),
    #[serde(default)]
    pub overflow: f64,
    #[serde(default)]
    pub underflow: f64,
    #[serde(default)]
    pub bin_width: f64,
}

impl Histogram {
    // Create a new Histogram with specified min, max, and number of bins
    pub fn new(name: &str, number_of_bins: usize, range: (f64, f64)) -> Self {
        Histogram {
            name: name.to_string(),
            bins: vec![0.0; number_of_bins],
            range,
            overflow: 0.0,
            underflow: 0.0,
            bin_width: Self::width_for(number_of_bins, range),
        }
    }

    pub fn from_counts(name: &str, counts: Vec<f64>, range: (f64, f64)) -> Self {
        let bin_width = Self::width_for(counts.len(), range);
        Histogram {
            name: name.to_string(),
            bins: counts,
            range,
            overflow: 0.0,
            underflow: 0.0,
            bin_width,
        }
    }

    fn width_for(number_of_bins: usize, range: (f64, f64)) -> f64 {
        if number_of_bins == 0 {
            0.0
        } else {
            (range.1 - range.0) / number_of_bins as f64
        }
    }

    // Add a value to the histogram
    pub fn fill(&mut self, value: f64) {
        self.fill_weighted(value, 1.0);
    }

    pub fn fill_weighted(&mut self, value: f64, weight: f64) {
        if value >= self.range.0 && value < self.range.1 {
            let index = ((value - self.range.0) / self.bin_width) as usize;
            if index < self.bins.len() {
                self.bins[index] += weight;
            }
        } else if value >= self.range.1 {
            self.overflow += weight;
        } else {
            self.underflow += weight;
        }
    }

    pub fn integral(&self) -> f64 {
        self.bins.iter().sum()
    }

    pub fn load_json(path: &Path) -> Result<Self, LoadError> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut histogram: Histogram = serde_json::from_reader(reader)?;

        if histogram.range.1 <= histogram.range.0 {
            return Err(LoadError::Invalid(format!(
                "histogram '{}' has an empty range ({}, {})",
                histogram.name, histogram.range.0, histogram.range.1
            )));
        }
        histogram.bin_width = Self::width_for(histogram.bins.len(), histogram.range);

        log::info!(
            "Loaded histogram '{}' with {} bins from {}",
            histogram.name,
            histogram.bins.len(),
            path.display()
        );
        Ok(histogram)
    }

    pub fn save_json(&self, path: &Path) -> Result<(), crate::error::ExportError> {
        let file = File::create(path)?;
        let writer = BufWriter::new(file);
        serde_json::to_writer(writer, &self)?;
        Ok(())
    }
}

impl BinnedHistogram for Histogram {
    fn name(&self) -> &str {
        &self.name
    }

    fn bin_count(&self) -> usize {
        self.bins.len()
    }

    fn x_range(&self) -> (f64, f64) {
        self.range
    }

    fn bin_center(&self, bin: usize) -> f64 {
        self.range.0 + (bin as f64 * self.bin_width) + self.bin_width * 0.5
    }

    fn bin_content(&self, bin: usize) -> f64 {
        self.bins.get(bin).copied().unwrap_or(0.0)
    }

    // The upper edge belongs to the last bin.
    fn find_bin(&self, x: f64) -> Option<usize> {
        if self.bins.is_empty() || x.is_nan() || x < self.range.0 || x > self.range.1 {
            return None;
        }

        let bin_index = ((x - self.range.0) / self.bin_width).floor() as usize;

        Some(bin_index.min(self.bins.len() - 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp() -> Histogram {
        Histogram::from_counts("ramp", (0..10).map(|i| i as f64).collect(), (0.0, 10.0))
    }

    #[test]
    fn test_find_bin_edges() {
        let h = ramp();
        assert_eq!(h.find_bin(0.0), Some(0));
        assert_eq!(h.find_bin(9.5), Some(9));
        assert_eq!(h.find_bin(10.0), Some(9));
        assert_eq!(h.find_bin(-0.1), None);
        assert_eq!(h.find_bin(10.1), None);
        assert_eq!(h.find_bin(f64::NAN), None);
        assert!((h.bin_center(3) - 3.5).abs() < 1e-9);
    }

    #[test]
    fn test_bins_in_range_clamps_to_axis() {
        let h = ramp();
        assert_eq!(h.bins_in_range(-5.0, 2.5), Some(0..=2));
        assert_eq!(h.bins_in_range(7.2, 50.0), Some(7..=9));
        assert_eq!(h.bins_in_range(20.0, 30.0), None);
        assert_eq!(h.bins_in_range(5.0, 4.0), None);
        assert_eq!(h.bin_count_in_range(2.0, 4.0), 3);

        let (x, y) = h.points_in_range(2.0, 4.0);
        assert_eq!(y, vec![2.0, 3.0, 4.0]);
        assert!((x[0] - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_fill_tracks_under_and_overflow() {
        let mut h = Histogram::new("fill", 4, (0.0, 4.0));
        h.fill(-1.0);
        h.fill(1.5);
        h.fill_weighted(1.2, 2.0);
        h.fill(4.0);
        assert_eq!(h.bins, vec![0.0, 3.0, 0.0, 0.0]);
        assert_eq!(h.underflow, 1.0);
        assert_eq!(h.overflow, 1.0);
        assert_eq!(h.integral(), 3.0);
    }

    #[test]
    fn test_json_round_trip_recomputes_width() {
        let dir = std::env::temp_dir().join(format!("hpge_fit_histogram_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("ramp.json");

        std::fs::write(&path, r#"{"name":"ramp","bins":[1.0,2.0,3.0,4.0],"range":[100.0,108.0]}"#)
            .unwrap();
        let loaded = Histogram::load_json(&path).unwrap();
        assert!((loaded.bin_width - 2.0).abs() < 1e-12);
        assert_eq!(loaded.find_bin(103.0), Some(1));

        loaded.save_json(&path).unwrap();
        let again = Histogram::load_json(&path).unwrap();
        assert_eq!(again.bins, loaded.bins);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_load_rejects_empty_range() {
        let dir = std::env::temp_dir().join(format!("hpge_fit_bad_hist_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("bad.json");
        std::fs::write(&path, r#"{"name":"bad","bins":[1.0],"range":[5.0,5.0]}"#).unwrap();

        assert!(matches!(Histogram::load_json(&path), Err(LoadError::Invalid(_))));

        std::fs::remove_dir_all(&dir).ok();
    }
}
