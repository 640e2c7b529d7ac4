use std::f64::consts::TAU;

use serde::{Deserialize, Serialize};

use crate::{
    utils::{enums::MultiplicityBin, get_bin_edges, get_bin_index},
    QmixError, QmixResult,
};

/// Evenly spaced bins over `[min, max)`.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Binning {
    /// Number of bins
    pub n_bins: usize,
    /// Lower edge of the first bin
    pub min: f64,
    /// Upper edge of the last bin
    pub max: f64,
}

impl Binning {
    /// Construct a new [`Binning`].
    pub fn new(n_bins: usize, min: f64, max: f64) -> Self {
        Self { n_bins, min, max }
    }

    /// Width of a single bin (zero if there are no bins).
    pub fn width(&self) -> f64 {
        if self.n_bins == 0 {
            0.0
        } else {
            (self.max - self.min) / self.n_bins as f64
        }
    }

    /// Index of the bin containing `value`, if any.
    pub fn index(&self, value: f64) -> Option<usize> {
        get_bin_index(value, self.n_bins, (self.min, self.max))
    }

    /// Lower edge of bin `index`.
    pub fn low_edge(&self, index: usize) -> f64 {
        self.min + index as f64 * self.width()
    }

    /// All `n_bins + 1` edges.
    pub fn edges(&self) -> Vec<f64> {
        get_bin_edges(self.n_bins, (self.min, self.max))
    }

    fn validate(&self, field: &str) -> QmixResult<()> {
        if self.n_bins == 0 {
            return Err(QmixError::InvalidConfig {
                field: field.to_string(),
                reason: "the number of bins must be greater than zero".to_string(),
            });
        }
        if !(self.max > self.min) {
            return Err(QmixError::InvalidConfig {
                field: field.to_string(),
                reason: format!(
                    "the lower edge ({}) must be smaller than the upper edge ({})",
                    self.min, self.max
                ),
            });
        }
        Ok(())
    }
}

/// Multiplicity binning: one underflow bin for $`M < M_{\text{min}}`$, `n_bins` bins of width
/// $`\Delta M`$ starting at $`M_{\text{min}}`$, and one overflow bin for
/// $`M \ge M_{\text{min}} + N\Delta M`$.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MultiplicityBinning {
    /// Lower edge of the first regular bin
    pub min: f64,
    /// Width of each regular bin
    pub width: f64,
    /// Number of regular bins
    pub n_bins: usize,
}

impl Default for MultiplicityBinning {
    fn default() -> Self {
        Self {
            min: 1.0,
            width: 2.0,
            n_bins: 10,
        }
    }
}

impl MultiplicityBinning {
    /// Construct a new [`MultiplicityBinning`].
    pub fn new(min: f64, width: f64, n_bins: usize) -> Self {
        Self { min, width, n_bins }
    }

    /// Lower edge of the overflow bin.
    pub fn upper(&self) -> f64 {
        self.min + self.n_bins as f64 * self.width
    }

    /// Total number of bins including underflow and overflow.
    pub fn n_total(&self) -> usize {
        self.n_bins + 2
    }

    /// The bin which holds events of multiplicity `multiplicity`.
    pub fn bin(&self, multiplicity: f64) -> MultiplicityBin {
        if multiplicity < self.min {
            MultiplicityBin::Underflow
        } else if multiplicity >= self.upper() {
            MultiplicityBin::Overflow
        } else {
            let index = ((multiplicity - self.min) / self.width).floor() as usize;
            MultiplicityBin::Regular(index.min(self.n_bins - 1))
        }
    }

    /// Every bin in flat order.
    pub fn bins(&self) -> impl Iterator<Item = MultiplicityBin> + '_ {
        (0..self.n_total()).map(|i| MultiplicityBin::from_flat_index(i, self.n_bins))
    }

    /// A label describing the multiplicity range of `bin`, e.g. `3 <= M < 5`.
    pub fn label(&self, bin: MultiplicityBin) -> String {
        match bin {
            MultiplicityBin::Underflow => format!("M < {}", self.min),
            MultiplicityBin::Regular(i) => format!(
                "{} <= M < {}",
                self.min + i as f64 * self.width,
                self.min + (i + 1) as f64 * self.width
            ),
            MultiplicityBin::Overflow => format!("M >= {}", self.upper()),
        }
    }

    fn validate(&self) -> QmixResult<()> {
        if self.n_bins == 0 {
            return Err(QmixError::InvalidConfig {
                field: "multiplicity.n_bins".to_string(),
                reason: "the number of multiplicity bins must be greater than zero".to_string(),
            });
        }
        if !(self.width > 0.0) {
            return Err(QmixError::InvalidConfig {
                field: "multiplicity.width".to_string(),
                reason: format!("the bin width must be positive, got {}", self.width),
            });
        }
        if !self.min.is_finite() {
            return Err(QmixError::InvalidConfig {
                field: "multiplicity.min".to_string(),
                reason: "the minimum multiplicity must be finite".to_string(),
            });
        }
        Ok(())
    }
}

/// Settings for the analysis with mixed harmonics.
///
/// The correlator under study is $`\langle\langle\cos[n(\phi_1+\phi_2-2\phi_3)]\rangle\rangle`$
/// with $`n`$ given by [`MixedHarmonicsConfig::harmonic`]. Every setting has a default, and
/// the builder methods can be chained:
///
/// ```rust
/// use qmix_core::{MixedHarmonicsConfig, MultiplicityBinning};
///
/// let config = MixedHarmonicsConfig::new()
///     .harmonic(2)
///     .multiplicity(MultiplicityBinning::new(1.0, 2.0, 10))
///     .evaluate_differential(true);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MixedHarmonicsConfig {
    /// The harmonic $`n`$
    pub harmonic: u32,
    /// Binning of the correlator versus multiplicity
    pub multiplicity: MultiplicityBinning,
    /// Azimuthal binning (used by the phi weights)
    pub phi: Binning,
    /// Transverse momentum binning (used by the pt weights and the differential correlator)
    pub pt: Binning,
    /// Pseudorapidity binning (used by the eta weights)
    pub eta: Binning,
    /// Only pair particles of interest with opposite charges
    pub opposite_charges_poi: bool,
    /// Evaluate $`\langle\cos[n(\psi_1+\psi_2-2\phi_3)]\rangle`$ versus pair kinematics
    pub evaluate_differential: bool,
    /// Correct the measured correlator for non-uniform acceptance at the end of the run
    pub correct_for_detector_effects: bool,
    /// Log the final results when the run finishes
    pub print_results: bool,
    /// Weight reference particles by their azimuthal angle
    pub use_phi_weights: bool,
    /// Weight reference particles by their transverse momentum
    pub use_pt_weights: bool,
    /// Weight reference particles by their pseudorapidity
    pub use_eta_weights: bool,
}

impl Default for MixedHarmonicsConfig {
    fn default() -> Self {
        Self {
            harmonic: 1,
            multiplicity: MultiplicityBinning::default(),
            phi: Binning::new(72, 0.0, TAU),
            pt: Binning::new(100, 0.0, 10.0),
            eta: Binning::new(200, -5.0, 5.0),
            opposite_charges_poi: false,
            evaluate_differential: false,
            correct_for_detector_effects: true,
            print_results: true,
            use_phi_weights: false,
            use_pt_weights: false,
            use_eta_weights: false,
        }
    }
}

impl MixedHarmonicsConfig {
    /// Default settings.
    pub fn new() -> Self {
        Self::default()
    }
    /// Set the harmonic $`n`$.
    pub fn harmonic(mut self, harmonic: u32) -> Self {
        self.harmonic = harmonic;
        self
    }
    /// Set the multiplicity binning.
    pub fn multiplicity(mut self, binning: MultiplicityBinning) -> Self {
        self.multiplicity = binning;
        self
    }
    /// Set the azimuthal binning.
    pub fn phi_binning(mut self, binning: Binning) -> Self {
        self.phi = binning;
        self
    }
    /// Set the transverse momentum binning.
    pub fn pt_binning(mut self, binning: Binning) -> Self {
        self.pt = binning;
        self
    }
    /// Set the pseudorapidity binning.
    pub fn eta_binning(mut self, binning: Binning) -> Self {
        self.eta = binning;
        self
    }
    /// Require opposite charges for pairs of particles of interest.
    pub fn opposite_charges_poi(mut self, value: bool) -> Self {
        self.opposite_charges_poi = value;
        self
    }
    /// Enable or disable the differential correlator.
    pub fn evaluate_differential(mut self, value: bool) -> Self {
        self.evaluate_differential = value;
        self
    }
    /// Enable or disable the correction for detector effects.
    pub fn correct_for_detector_effects(mut self, value: bool) -> Self {
        self.correct_for_detector_effects = value;
        self
    }
    /// Enable or disable logging of the final results.
    pub fn print_results(mut self, value: bool) -> Self {
        self.print_results = value;
        self
    }
    /// Enable or disable phi weights.
    pub fn use_phi_weights(mut self, value: bool) -> Self {
        self.use_phi_weights = value;
        self
    }
    /// Enable or disable pt weights.
    pub fn use_pt_weights(mut self, value: bool) -> Self {
        self.use_pt_weights = value;
        self
    }
    /// Enable or disable eta weights.
    pub fn use_eta_weights(mut self, value: bool) -> Self {
        self.use_eta_weights = value;
        self
    }

    /// Whether any particle weight is switched on.
    pub fn uses_particle_weights(&self) -> bool {
        self.use_phi_weights || self.use_pt_weights || self.use_eta_weights
    }

    /// Check that the settings make sense before any event is processed.
    pub fn validate(&self) -> QmixResult<()> {
        if self.harmonic == 0 {
            return Err(QmixError::InvalidConfig {
                field: "harmonic".to_string(),
                reason: "the harmonic must be a positive integer".to_string(),
            });
        }
        self.multiplicity.validate()?;
        self.phi.validate("phi")?;
        self.pt.validate("pt")?;
        self.eta.validate("eta")?;
        Ok(())
    }
}
