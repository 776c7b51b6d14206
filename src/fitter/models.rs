//! Curve model registry.
//!
//! Every fit names its model with a short string (`gaus`, `gaus+pol1`, ...).
//! Registered names map to an engine formula with explicit parameter-group
//! offsets plus parameter labels. Any other name passes straight through to
//! the engine as its own formula and carries no labels.

/// FWHM = 2 sqrt(2 ln 2) sigma, rounded the way peak tables quote it.
pub const FWHM_TO_SIGMA: f64 = 2.355;
pub const SQRT_2PI: f64 = 2.506628;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Deserialize, serde::Serialize)]
pub enum CurveModel {
    #[serde(rename = "gaus")]
    Gaus,
    #[serde(rename = "gaus+pol1")]
    GausPol1,
    #[serde(rename = "gaus+pol2")]
    GausPol2,
    #[serde(rename = "gaus+erf")]
    GausErf,
    #[serde(rename = "2gaus")]
    DoubleGaus,
    #[serde(rename = "2gaus+pol1")]
    DoubleGausPol1,
}

/// How derived peak quantities are read out of a parameter vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFamily {
    /// `gaus` and every `gaus+...` compound: the Gaussian triple sits at 0..3.
    SingleGaussian,
    /// `2gaus` and `2gaus+pol1`: triples at 0..3 and 3..6.
    Doublet,
    Landau,
    Generic,
}

impl ModelFamily {
    pub fn of(name: &str) -> Self {
        match name {
            "2gaus" | "2gaus+pol1" => ModelFamily::Doublet,
            "landau" => ModelFamily::Landau,
            _ if name == "gaus" || name.starts_with("gaus+") => ModelFamily::SingleGaussian,
            _ => ModelFamily::Generic,
        }
    }
}

const GAUS_LABELS: [&str; 3] = ["Constant (p0)", "Mean (p1)", "Sigma (p2)"];
const GAUS_POL1_LABELS: [&str; 5] = [
    "Constant (p0)",
    "Mean (p1)",
    "Sigma (p2)",
    "Bkg a0 (p3)",
    "Bkg a1 (p4)",
];
const GAUS_POL2_LABELS: [&str; 6] = [
    "Constant (p0)",
    "Mean (p1)",
    "Sigma (p2)",
    "Bkg a0 (p3)",
    "Bkg a1 (p4)",
    "Bkg a2 (p5)",
];
const GAUS_ERF_LABELS: [&str; 4] = ["Constant (p0)", "Mean (p1)", "Sigma (p2)", "Step Amp (p3)"];
const DOUBLE_GAUS_LABELS: [&str; 6] = [
    "Const1 (p0)",
    "Mean1 (p1)",
    "Sigma1 (p2)",
    "Const2 (p3)",
    "Mean2 (p4)",
    "Sigma2 (p5)",
];
const DOUBLE_GAUS_POL1_LABELS: [&str; 8] = [
    "Const1 (p0)",
    "Mean1 (p1)",
    "Sigma1 (p2)",
    "Const2 (p3)",
    "Mean2 (p4)",
    "Sigma2 (p5)",
    "Bkg a0 (p6)",
    "Bkg a1 (p7)",
];

impl CurveModel {
    /// Registered models in the order a model picker lists them.
    pub const ALL: [CurveModel; 6] = [
        CurveModel::Gaus,
        CurveModel::GausPol1,
        CurveModel::GausPol2,
        CurveModel::GausErf,
        CurveModel::DoubleGaus,
        CurveModel::DoubleGausPol1,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|model| model.name() == name)
    }

    pub fn name(&self) -> &'static str {
        match self {
            CurveModel::Gaus => "gaus",
            CurveModel::GausPol1 => "gaus+pol1",
            CurveModel::GausPol2 => "gaus+pol2",
            CurveModel::GausErf => "gaus+erf",
            CurveModel::DoubleGaus => "2gaus",
            CurveModel::DoubleGausPol1 => "2gaus+pol1",
        }
    }

    pub fn formula(&self) -> &'static str {
        match self {
            CurveModel::Gaus => "gaus",
            CurveModel::GausPol1 => "gaus(0)+pol1(3)",
            CurveModel::GausPol2 => "gaus(0)+pol2(3)",
            // Compton-edge step under the photopeak
            CurveModel::GausErf => "gaus(0)+[3]*TMath::Erfc((x-[1])/(sqrt(2)*[2]))*0.5",
            CurveModel::DoubleGaus => "gaus(0)+gaus(3)",
            CurveModel::DoubleGausPol1 => "gaus(0)+gaus(3)+pol1(6)",
        }
    }

    pub fn labels(&self) -> &'static [&'static str] {
        match self {
            CurveModel::Gaus => &GAUS_LABELS,
            CurveModel::GausPol1 => &GAUS_POL1_LABELS,
            CurveModel::GausPol2 => &GAUS_POL2_LABELS,
            CurveModel::GausErf => &GAUS_ERF_LABELS,
            CurveModel::DoubleGaus => &DOUBLE_GAUS_LABELS,
            CurveModel::DoubleGausPol1 => &DOUBLE_GAUS_POL1_LABELS,
        }
    }

    pub fn parameter_count(&self) -> usize {
        self.labels().len()
    }

    pub fn display_names(&self) -> Vec<&'static str> {
        self.labels().iter().map(|label| display_name(label)).collect()
    }

    pub fn family(&self) -> ModelFamily {
        ModelFamily::of(self.name())
    }
}

impl std::fmt::Display for CurveModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

// "Bkg a0 (p3)" -> "Bkg a0"
fn display_name(label: &str) -> &str {
    match label.rsplit_once(" (p") {
        Some((name, _)) => name,
        None => label,
    }
}

pub fn formula_for(name: &str) -> String {
    match CurveModel::from_name(name) {
        Some(model) => model.formula().to_owned(),
        None => name.to_owned(),
    }
}

pub fn labels_for(name: &str) -> Vec<String> {
    CurveModel::from_name(name)
        .map(|model| model.labels().iter().map(|s| (*s).to_owned()).collect())
        .unwrap_or_default()
}

pub fn display_names_for(name: &str) -> Vec<String> {
    CurveModel::from_name(name)
        .map(|model| {
            model
                .display_names()
                .into_iter()
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

/// Parameter count for a registered model, `None` for pass-through names.
pub fn parameter_count_for(name: &str) -> Option<usize> {
    CurveModel::from_name(name).map(|model| model.parameter_count())
}
