use super::histogram::BinnedHistogram;
use crate::dispatcher::ErrorDispatcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PeakSource {
    Automatic,
    Manual,
}

impl PeakSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeakSource::Automatic => "automatic",
            PeakSource::Manual => "manual",
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Peak {
    pub energy: f64,
    pub counts: Option<f64>,
    pub source: PeakSource,
}

impl Peak {
    /// A user-placed peak, with the counts of the bin at `energy` when a
    /// histogram is available.
    pub fn manual<H: BinnedHistogram + ?Sized>(energy: f64, histogram: Option<&H>) -> Self {
        Peak {
            energy,
            counts: counts_at(histogram, energy),
            source: PeakSource::Manual,
        }
    }
}

fn counts_at<H: BinnedHistogram + ?Sized>(histogram: Option<&H>, energy: f64) -> Option<f64> {
    let histogram = histogram?;
    let bin = histogram.find_bin(energy)?;
    Some(histogram.bin_content(bin))
}

/// The peaks of one histogram selection, kept sorted by energy.
#[derive(Debug, Clone, Default)]
pub struct PeakList {
    peaks: Vec<Peak>,
    dispatcher: ErrorDispatcher,
}

impl PeakList {
    pub fn new(dispatcher: ErrorDispatcher) -> Self {
        Self {
            peaks: Vec::new(),
            dispatcher,
        }
    }

    pub fn peaks(&self) -> &[Peak] {
        &self.peaks
    }

    pub fn len(&self) -> usize {
        self.peaks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peaks.is_empty()
    }

    pub fn energies(&self) -> Vec<f64> {
        self.peaks.iter().map(|peak| peak.energy).collect()
    }

    fn sort(&mut self) {
        self.peaks.sort_by(|a, b| a.energy.total_cmp(&b.energy));
    }

    /// Swaps in a fresh automatic search result while keeping manual peaks.
    /// An empty search with no manual peaks leaves the list untouched.
    pub fn replace_automatic(&mut self, found: Vec<Peak>) {
        let mut merged: Vec<Peak> = found
            .into_iter()
            .filter(|peak| peak.source == PeakSource::Automatic)
            .collect();
        merged.extend(
            self.peaks
                .iter()
                .filter(|peak| peak.source == PeakSource::Manual)
                .cloned(),
        );

        if merged.is_empty() {
            return;
        }

        self.peaks = merged;
        self.sort();
        log::info!("Peak list now holds {} peaks", self.peaks.len());
    }

    pub fn add_manual<H: BinnedHistogram + ?Sized>(&mut self, energy: f64, histogram: Option<&H>) {
        self.peaks.push(Peak::manual(energy, histogram));
        self.sort();
    }

    /// Parses a typed energy. Blank input is ignored; anything else that is
    /// not a number is dropped with a warning.
    pub fn add_manual_text<H: BinnedHistogram + ?Sized>(
        &mut self,
        text: &str,
        histogram: Option<&H>,
    ) -> bool {
        let raw = text.trim();
        if raw.is_empty() {
            return false;
        }
        match raw.parse::<f64>() {
            Ok(energy) if energy.is_finite() => {
                self.add_manual(energy, histogram);
                true
            }
            _ => {
                self.dispatcher.warning(
                    format!("Ignoring manual peak '{raw}': not a number"),
                    "peaks",
                );
                false
            }
        }
    }

    /// Moves the peak at `index` to `energy` and refreshes its counts.
    pub fn set_energy<H: BinnedHistogram + ?Sized>(
        &mut self,
        index: usize,
        energy: f64,
        histogram: Option<&H>,
    ) -> bool {
        let Some(peak) = self.peaks.get_mut(index) else {
            return false;
        };
        peak.energy = energy;
        peak.counts = counts_at(histogram, energy);
        self.sort();
        true
    }

    pub fn energy_at(&self, index: usize) -> Option<f64> {
        self.peaks.get(index).map(|peak| peak.energy)
    }

    /// Removes the given indices; out-of-range entries are skipped.
    pub fn remove(&mut self, indices: &[usize]) {
        let mut indices = indices.to_vec();
        indices.sort_unstable();
        indices.dedup();
        for index in indices.into_iter().rev() {
            if index < self.peaks.len() {
                self.peaks.remove(index);
            }
        }
    }

    pub fn clear(&mut self) {
        self.peaks.clear();
    }
}
