use serde::{Deserialize, Serialize};

use crate::{
    profile::Estimate,
    reducer::{CorrelatorAggregates, TermArray},
    utils::enums::{MultiplicityBin, NonIsotropicTerm},
};

/// Remove the contribution of the non-isotropic terms from a measured
/// $`\langle\langle\cos[n(\phi_1+\phi_2-2\phi_3)]\rangle\rangle`$.
///
/// With $`t_0 \ldots t_7`$ the terms in the order of [`NonIsotropicTerm::ALL`], the corrected value is
///
/// ```math
/// c = m - t_2 t_4 - t_3 t_5 - 2 t_0 t_6 - 2 t_1 t_7 + 2 t_2 (t_0^2 - t_1^2) + 4 t_3 t_0 t_1
/// ```
pub fn correct(measured: f64, terms: &TermArray<f64>) -> f64 {
    use NonIsotropicTerm::*;
    let cos1 = terms[OneParticleCos];
    let sin1 = terms[OneParticleSin];
    let cos2 = terms[OneParticleCos2n];
    let sin2 = terms[OneParticleSin2n];
    measured
        - cos2 * terms[TwoParticleSumCos]
        - sin2 * terms[TwoParticleSumSin]
        - 2.0 * cos1 * terms[TwoParticleDiffCos]
        - 2.0 * sin1 * terms[TwoParticleDiffSin]
        + 2.0 * cos2 * (cos1 * cos1 - sin1 * sin1)
        + 4.0 * sin2 * cos1 * sin1
}

/// A measured correlator next to its corrected value.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BiasCorrection {
    /// The measured correlator
    pub measured: Estimate,
    /// The corrected correlator. Its error is the error of the measured value.
    pub corrected: Estimate,
    /// `corrected / measured`, or zero if nothing was measured
    pub bias: f64,
}

impl BiasCorrection {
    /// Correct `measured` with the non-isotropic `terms` averaged over the same events.
    pub fn new(measured: Estimate, terms: &TermArray<f64>) -> Self {
        let corrected = correct(measured.value, terms);
        let bias = if measured.value != 0.0 {
            corrected / measured.value
        } else {
            0.0
        };
        Self {
            measured,
            corrected: Estimate::new(corrected, measured.error),
            bias,
        }
    }
}

/// Corrected correlators, integrated and for every multiplicity bin.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CorrectedCorrelators {
    /// Correction of the integrated correlator
    pub integrated: BiasCorrection,
    /// Correction in every multiplicity bin, in flat order
    pub per_bin: Vec<(MultiplicityBin, BiasCorrection)>,
}

impl CorrectedCorrelators {
    /// The correction in multiplicity bin `bin`.
    pub fn get(&self, bin: MultiplicityBin) -> Option<&BiasCorrection> {
        self.per_bin
            .iter()
            .find(|(b, _)| *b == bin)
            .map(|(_, correction)| correction)
    }
}

/// Corrects the accumulated 3-particle correlator for non-uniform acceptance.
#[derive(Copy, Clone, Debug, Default)]
pub struct DetectorBiasCorrector;

impl DetectorBiasCorrector {
    /// Apply the correction to the integrated correlator and to every multiplicity bin, each with
    /// the non-isotropic terms accumulated over the same events.
    pub fn apply(&self, aggregates: &CorrelatorAggregates) -> CorrectedCorrelators {
        let integrated = BiasCorrection::new(
            aggregates.three_particle().estimate(),
            &aggregates.term_means(),
        );
        let per_bin = aggregates
            .three_particle_vs_m()
            .iter()
            .map(|(bin, content)| {
                (
                    bin,
                    BiasCorrection::new(content.estimate(), &aggregates.term_means_in(bin)),
                )
            })
            .collect();
        CorrectedCorrelators {
            integrated,
            per_bin,
        }
    }
}
