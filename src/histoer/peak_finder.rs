use find_peaks::PeakFinder;

use super::histogram::BinnedHistogram;
use super::peaks::{Peak, PeakSource};

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct PeakFindingSettings {
    pub min_height: f64,
    pub max_height: f64,
    pub min_prominence: f64,
    pub max_prominence: f64,
    pub min_difference: f64,
    pub max_difference: f64,
    pub min_plateau_size: usize,
    pub max_plateau_size: usize,
    pub min_distance: usize,
    pub max_distance: usize,

    pub enable_min_height: bool,
    pub enable_max_height: bool,
    pub enable_min_prominence: bool,
    pub enable_max_prominence: bool,
    pub enable_min_difference: bool,
    pub enable_max_difference: bool,
    pub enable_min_plateau_size: bool,
    pub enable_max_plateau_size: bool,
    pub enable_min_distance: bool,
    pub enable_max_distance: bool,

    // Applied to the search result, not to the search itself.
    pub energy_min: Option<f64>,
    pub energy_max: Option<f64>,
    pub threshold_counts: f64,
}

impl Default for PeakFindingSettings {
    fn default() -> Self {
        PeakFindingSettings {
            min_height: 0.0,
            max_height: 0.0,
            min_prominence: 0.0,
            max_prominence: 0.0,
            min_difference: 1.0,
            max_difference: 1.0,
            min_plateau_size: 1,
            max_plateau_size: 1,
            min_distance: 1,
            max_distance: 1,

            enable_min_height: false,
            enable_max_height: false,
            enable_min_prominence: false,
            enable_max_prominence: false,
            enable_min_difference: false,
            enable_max_difference: false,
            enable_min_plateau_size: false,
            enable_max_plateau_size: false,
            enable_min_distance: false,
            enable_max_distance: false,

            energy_min: None,
            energy_max: None,
            threshold_counts: 0.0,
        }
    }
}

impl PeakFindingSettings {
    /// Indices of the local maxima in `y_data` that pass the enabled filters.
    pub fn find_peak_positions(&self, y_data: &[f64]) -> Vec<usize> {
        if y_data.is_empty() {
            return Vec::new();
        }

        let mut peak_finder = PeakFinder::new(y_data);

        if self.enable_min_height {
            peak_finder.with_min_height(self.min_height);
        }

        if self.enable_max_height {
            peak_finder.with_max_height(self.max_height);
        }

        if self.enable_min_prominence {
            peak_finder.with_min_prominence(self.min_prominence);
        }

        if self.enable_max_prominence {
            peak_finder.with_max_prominence(self.max_prominence);
        }

        if self.enable_min_difference {
            peak_finder.with_min_difference(self.min_difference);
        }

        if self.enable_max_difference {
            peak_finder.with_max_difference(self.max_difference);
        }

        if self.enable_min_plateau_size {
            peak_finder.with_min_plateau_size(self.min_plateau_size);
        }

        if self.enable_max_plateau_size {
            peak_finder.with_max_plateau_size(self.max_plateau_size);
        }

        if self.enable_min_distance {
            peak_finder.with_min_distance(self.min_distance);
        }

        if self.enable_max_distance {
            peak_finder.with_max_distance(self.max_distance);
        }

        peak_finder
            .find_peaks()
            .iter()
            .map(|peak| peak.middle_position())
            .collect()
    }

    /// Automatic peak search over the whole histogram, filtered by the
    /// energy window and count threshold, sorted by energy.
    pub fn find_peaks<H: BinnedHistogram + ?Sized>(&self, histogram: &H) -> Vec<Peak> {
        let y_data: Vec<f64> = (0..histogram.bin_count())
            .map(|bin| histogram.bin_content(bin))
            .collect();

        let mut peaks: Vec<Peak> = self
            .find_peak_positions(&y_data)
            .into_iter()
            .filter_map(|bin| {
                let energy = histogram.bin_center(bin);
                let counts = histogram.bin_content(bin);

                if self.energy_min.is_some_and(|min| energy < min) {
                    return None;
                }
                if self.energy_max.is_some_and(|max| energy > max) {
                    return None;
                }
                if counts < self.threshold_counts {
                    return None;
                }

                Some(Peak {
                    energy,
                    counts: Some(counts),
                    source: PeakSource::Automatic,
                })
            })
            .collect();

        peaks.sort_by(|a, b| a.energy.total_cmp(&b.energy));
        log::info!(
            "Found {} peaks in '{}'",
            peaks.len(),
            histogram.name()
        );
        peaks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::histoer::histogram::Histogram;

    fn two_line_spectrum() -> Histogram {
        let mut counts = vec![2.0; 40];
        for (offset, value) in [(-2i32, 20.0), (-1, 60.0), (0, 100.0), (1, 60.0), (2, 20.0)] {
            counts[(10 + offset) as usize] = value;
            counts[(30 + offset) as usize] = value / 4.0;
        }
        Histogram::from_counts("lines", counts, (0.0, 40.0))
    }

    #[test]
    fn test_finds_both_lines_sorted() {
        let settings = PeakFindingSettings {
            enable_min_prominence: true,
            min_prominence: 5.0,
            ..Default::default()
        };
        let peaks = settings.find_peaks(&two_line_spectrum());
        assert_eq!(peaks.len(), 2);
        assert!((peaks[0].energy - 10.5).abs() < 1e-9);
        assert!((peaks[1].energy - 30.5).abs() < 1e-9);
        assert_eq!(peaks[0].counts, Some(100.0));
        assert!(peaks.iter().all(|p| p.source == PeakSource::Automatic));
    }

    #[test]
    fn test_energy_window_and_threshold_filter_results() {
        let h = two_line_spectrum();
        let windowed = PeakFindingSettings {
            enable_min_prominence: true,
            min_prominence: 5.0,
            energy_min: Some(20.0),
            ..Default::default()
        };
        let peaks = windowed.find_peaks(&h);
        assert_eq!(peaks.len(), 1);
        assert!((peaks[0].energy - 30.5).abs() < 1e-9);

        let thresholded = PeakFindingSettings {
            enable_min_prominence: true,
            min_prominence: 5.0,
            threshold_counts: 50.0,
            ..Default::default()
        };
        let peaks = thresholded.find_peaks(&h);
        assert_eq!(peaks.len(), 1);
        assert!((peaks[0].energy - 10.5).abs() < 1e-9);
    }

    #[test]
    fn test_empty_histogram_has_no_peaks() {
        let h = Histogram::new("empty", 0, (0.0, 1.0));
        assert!(PeakFindingSettings::default().find_peaks(&h).is_empty());
    }

    #[test]
    fn test_settings_round_trip_through_ron() {
        let settings = PeakFindingSettings {
            enable_min_height: true,
            min_height: 12.0,
            energy_max: Some(2000.0),
            ..Default::default()
        };
        let text = ron::to_string(&settings).unwrap();
        let back: PeakFindingSettings = ron::from_str(&text).unwrap();
        assert_eq!(back, settings);
    }
}
