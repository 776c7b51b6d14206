use std::sync::LazyLock;

use regex::Regex;

use crate::error::EngineError;

/// One additive piece of a fit formula. Offsets index into the shared
/// parameter vector.
#[derive(Debug, Clone, Copy, PartialEq, serde::Deserialize, serde::Serialize)]
pub enum FormulaTerm {
    /// `p[o] * exp(-0.5 ((x - p[o+1]) / p[o+2])^2)`
    Gaussian { offset: usize },
    /// `sum_k p[o+k] x^k` for `k = 0..=degree`
    Polynomial { degree: usize, offset: usize },
    /// `p[amplitude] * erfc((x - p[mean]) / (sqrt(2) p[sigma])) / 2`
    ErfcStep {
        amplitude: usize,
        mean: usize,
        sigma: usize,
    },
    /// Moyal approximation of a Landau: `p[o]`, most probable value `p[o+1]`, width `p[o+2]`
    Landau { offset: usize },
    /// `exp(p[o] + p[o+1] x)`
    Exponential { offset: usize },
}

impl FormulaTerm {
    fn highest_index(&self) -> usize {
        match *self {
            FormulaTerm::Gaussian { offset } | FormulaTerm::Landau { offset } => offset + 2,
            FormulaTerm::Polynomial { degree, offset } => offset + degree,
            FormulaTerm::ErfcStep {
                amplitude,
                mean,
                sigma,
            } => amplitude.max(mean).max(sigma),
            FormulaTerm::Exponential { offset } => offset + 1,
        }
    }

    pub fn evaluate(&self, parameters: &[f64], x: f64) -> f64 {
        let p = |i: usize| parameters.get(i).copied().unwrap_or(0.0);
        match *self {
            FormulaTerm::Gaussian { offset } => {
                let sigma = p(offset + 2);
                if sigma == 0.0 {
                    return 0.0;
                }
                let z = (x - p(offset + 1)) / sigma;
                p(offset) * (-0.5 * z * z).exp()
            }
            FormulaTerm::Polynomial { degree, offset } => (0..=degree)
                .rev()
                .fold(0.0, |acc, k| acc * x + p(offset + k)),
            FormulaTerm::ErfcStep {
                amplitude,
                mean,
                sigma,
            } => {
                let sigma = p(sigma);
                if sigma == 0.0 {
                    return 0.0;
                }
                p(amplitude) * erfc((x - p(mean)) / (std::f64::consts::SQRT_2 * sigma)) * 0.5
            }
            FormulaTerm::Landau { offset } => {
                let width = p(offset + 2);
                if width == 0.0 {
                    return 0.0;
                }
                let lambda = (x - p(offset + 1)) / width;
                p(offset) * (-0.5 * (lambda + (-lambda).exp())).exp()
            }
            FormulaTerm::Exponential { offset } => (p(offset) + p(offset + 1) * x).exp(),
        }
    }
}

static NAMED_TERM: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^(gaus|landau|expo)(?:\((\d+)\))?$"));
static POLYNOMIAL_TERM: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^pol(\d+)(?:\((\d+)\))?$"));
static ERFC_TERM: LazyLock<Result<Regex, regex::Error>> = LazyLock::new(|| {
    Regex::new(
        r"^\[(\d+)\]\*TMath::Erfc\(\(x-\[(\d+)\]\)/\(sqrt\(2\)\*\[(\d+)\]\)\)\*0\.5$",
    )
});

fn compiled(re: &'static LazyLock<Result<Regex, regex::Error>>) -> Result<&'static Regex, EngineError> {
    LazyLock::force(re)
        .as_ref()
        .map_err(|e| EngineError::Failed(format!("formula pattern: {e}")))
}

fn index(text: Option<regex::Match<'_>>, default: usize) -> usize {
    text.and_then(|m| m.as_str().parse().ok()).unwrap_or(default)
}

// Split on '+' outside of parentheses and brackets.
fn split_terms(formula: &str) -> Vec<&str> {
    let mut terms = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in formula.char_indices() {
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' => depth -= 1,
            '+' if depth == 0 => {
                terms.push(&formula[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    terms.push(&formula[start..]);
    terms
}

/// Parses an engine formula into additive terms. A bare `gaus`, `landau`,
/// `expo` or `polN` starts at parameter 0.
pub fn parse_formula(formula: &str) -> Result<Vec<FormulaTerm>, EngineError> {
    let compact: String = formula.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return Err(EngineError::UnsupportedFormula(formula.to_owned()));
    }

    let named = compiled(&NAMED_TERM)?;
    let polynomial = compiled(&POLYNOMIAL_TERM)?;
    let erfc_step = compiled(&ERFC_TERM)?;

    split_terms(&compact)
        .into_iter()
        .map(|term| {
            if let Some(caps) = named.captures(term) {
                let offset = index(caps.get(2), 0);
                return Ok(match &caps[1] {
                    "gaus" => FormulaTerm::Gaussian { offset },
                    "landau" => FormulaTerm::Landau { offset },
                    _ => FormulaTerm::Exponential { offset },
                });
            }
            if let Some(caps) = polynomial.captures(term) {
                return Ok(FormulaTerm::Polynomial {
                    degree: index(caps.get(1), 0),
                    offset: index(caps.get(2), 0),
                });
            }
            if let Some(caps) = erfc_step.captures(term) {
                return Ok(FormulaTerm::ErfcStep {
                    amplitude: index(caps.get(1), 0),
                    mean: index(caps.get(2), 0),
                    sigma: index(caps.get(3), 0),
                });
            }
            Err(EngineError::UnsupportedFormula(formula.to_owned()))
        })
        .collect()
}

pub fn parameter_count(terms: &[FormulaTerm]) -> usize {
    terms
        .iter()
        .map(|term| term.highest_index() + 1)
        .max()
        .unwrap_or(0)
}

pub fn evaluate(terms: &[FormulaTerm], parameters: &[f64], x: f64) -> f64 {
    terms.iter().map(|term| term.evaluate(parameters, x)).sum()
}

/// Complementary error function, Abramowitz & Stegun 7.1.26 (|error| < 1.5e-7).
pub fn erfc(x: f64) -> f64 {
    let z = x.abs();
    let t = 1.0 / (1.0 + 0.327_591_1 * z);
    let poly = t
        * (0.254_829_592
            + t * (-0.284_496_736 + t * (1.421_413_741 + t * (-1.453_152_027 + t * 1.061_405_429))));
    let tail = poly * (-z * z).exp();
    if x >= 0.0 { tail } else { 2.0 - tail }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_compound_offsets() {
        let terms = parse_formula("gaus(0)+gaus(3)+pol1(6)").unwrap();
        assert_eq!(
            terms,
            vec![
                FormulaTerm::Gaussian { offset: 0 },
                FormulaTerm::Gaussian { offset: 3 },
                FormulaTerm::Polynomial {
                    degree: 1,
                    offset: 6
                },
            ]
        );
        assert_eq!(parameter_count(&terms), 8);
    }

    #[test]
    fn test_parse_erfc_step() {
        let terms = parse_formula("gaus(0)+[3]*TMath::Erfc((x-[1])/(sqrt(2)*[2]))*0.5").unwrap();
        assert_eq!(
            terms[1],
            FormulaTerm::ErfcStep {
                amplitude: 3,
                mean: 1,
                sigma: 2
            }
        );
        assert_eq!(parameter_count(&terms), 4);
    }

    #[test]
    fn test_bare_names() {
        assert_eq!(parse_formula("landau").unwrap(), vec![FormulaTerm::Landau { offset: 0 }]);
        assert_eq!(parameter_count(&parse_formula("pol2").unwrap()), 3);
        assert_eq!(parameter_count(&parse_formula("expo").unwrap()), 2);
    }

    #[test]
    fn test_unsupported_formula() {
        assert!(matches!(
            parse_formula("sin(x)*[0]"),
            Err(EngineError::UnsupportedFormula(_))
        ));
        assert!(parse_formula("").is_err());
    }

    #[test]
    fn test_evaluate_gaussian_plus_line() {
        let terms = parse_formula("gaus(0)+pol1(3)").unwrap();
        let p = [100.0, 10.0, 2.0, 5.0, 0.5];
        let at_mean = evaluate(&terms, &p, 10.0);
        assert!((at_mean - (100.0 + 5.0 + 5.0)).abs() < 1e-9);
        let one_sigma = evaluate(&terms, &p, 12.0);
        assert!((one_sigma - (100.0 * (-0.5f64).exp() + 5.0 + 6.0)).abs() < 1e-9);
    }

    #[test]
    fn test_erfc_values() {
        assert!((erfc(0.0) - 1.0).abs() < 1e-6);
        assert!((erfc(1.0) - 0.157_299_2).abs() < 1e-6);
        assert!((erfc(-1.0) - 1.842_700_8).abs() < 1e-6);
        assert!(erfc(6.0) < 1e-10);
    }
}
