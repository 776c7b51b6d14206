pub mod histogram;
pub mod peak_finder;
pub mod peaks;

pub use histogram::{BinnedHistogram, Histogram};
pub use peak_finder::PeakFindingSettings;
pub use peaks::{Peak, PeakList, PeakSource};
