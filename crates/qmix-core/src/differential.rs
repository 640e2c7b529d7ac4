use serde::{Deserialize, Serialize};

use crate::{
    accumulator::{EventMoments, PairProfiles},
    config::{Binning, MixedHarmonicsConfig},
    profile::{Estimate, Profile1D},
    utils::enums::{PairVariable, PoiLeg},
    QmixError, QmixResult,
};

/// Running averages of $`\langle\cos[n(\psi_1+\psi_2-2\phi_3)]\rangle`$ versus the kinematics of
/// the pair of particles of interest $`(\psi_1, \psi_2)`$.
///
/// Per event and bin, with $`p_n = \sum_{\text{pairs}} e^{in(\psi_1+\psi_2)}`$ and $`m_p`$ pairs,
///
/// ```math
/// \frac{\text{Re}[p_n Q_{2n}^*] - o_1 - o_2}{m_p M - m_{o_1} - m_{o_2}}
/// ```
///
/// where $`o_l`$ sums $`\cos[n(\psi_1-\psi_2)]`$ over the $`m_{o_l}`$ pairs whose leg $`l`$ is also
/// a reference particle. Bins with a non-positive denominator are left untouched.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DifferentialCorrelator {
    weighted: bool,
    profiles: [Profile1D; 2],
}

impl DifferentialCorrelator {
    /// Empty profiles over the transverse momentum binning of `config`.
    pub fn new(config: &MixedHarmonicsConfig) -> Self {
        Self {
            weighted: config.uses_particle_weights(),
            profiles: [Profile1D::new(config.pt), Profile1D::new(config.pt)],
        }
    }

    /// Check that [`DifferentialCorrelator::fill`] can take the event whose pairs are in
    /// `pairs` without failing.
    pub fn check_fillable(&self, pairs: &PairProfiles, method: &str) -> QmixResult<()> {
        if self.weighted {
            return Err(QmixError::Unsupported {
                method: method.to_string(),
            });
        }
        for variable in PairVariable::ALL {
            let binning = pairs.re(variable).binning();
            if !self.profiles[variable.index()].is_binned_as(binning) {
                return Err(QmixError::MissingAggregate {
                    name: format!(
                        "differential correlator versus {} with binning {:?}",
                        variable, binning
                    ),
                    method: method.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Check that both profiles are binned with the transverse momentum binning of `config` and
    /// were set up for the same weighting.
    pub fn check_consistency(&self, config: &MixedHarmonicsConfig, method: &str) -> QmixResult<()> {
        let consistent = self.weighted == config.uses_particle_weights()
            && self
                .profiles
                .iter()
                .all(|profile| profile.is_binned_as(&config.pt));
        if !consistent {
            return Err(QmixError::MissingAggregate {
                name: format!("differential correlator with binning {:?}", config.pt),
                method: method.to_string(),
            });
        }
        Ok(())
    }

    /// Add the event described by `moments` and its pair profiles. Returns the number of bins
    /// which received a fill. Nothing is filled if the event cannot be taken.
    pub fn fill(&mut self, moments: &EventMoments, pairs: &PairProfiles) -> QmixResult<usize> {
        self.check_fillable(pairs, "DifferentialCorrelator::fill")?;
        let m = moments.multiplicity();
        let q2n = moments.q2n();
        let mut filled = 0;
        for variable in PairVariable::ALL {
            let re = pairs.re(variable);
            let im = pairs.im(variable);
            let first = pairs.overlap(PoiLeg::First, variable);
            let second = pairs.overlap(PoiLeg::Second, variable);
            for b in 0..re.len() {
                let mp = re.bin(b).entries() as f64;
                let m_overlap_1 = first.bin(b).entries() as f64;
                let m_overlap_2 = second.bin(b).entries() as f64;
                let weight = mp * m - m_overlap_1 - m_overlap_2;
                if weight <= 0.0 {
                    continue;
                }
                let value = (re.bin(b).sum_wy() * q2n.re + im.bin(b).sum_wy() * q2n.im
                    - first.bin(b).sum_wy()
                    - second.bin(b).sum_wy())
                    / weight;
                self.profiles[variable.index()].fill_bin(b, value, weight);
                filled += 1;
            }
        }
        Ok(filled)
    }

    /// The profile versus `variable`.
    pub fn profile(&self, variable: PairVariable) -> &Profile1D {
        &self.profiles[variable.index()]
    }

    /// Add the content of `other`.
    pub fn merge(&mut self, other: &DifferentialCorrelator) -> QmixResult<()> {
        if self.weighted != other.weighted {
            return Err(QmixError::IncompatibleMerge {
                reason: "only one of the differential correlators uses particle weights"
                    .to_string(),
            });
        }
        for (a, b) in self.profiles.iter_mut().zip(&other.profiles) {
            a.merge(b)?;
        }
        Ok(())
    }

    /// Combine many differential correlators with compensated summation.
    pub fn combine(parts: &[&DifferentialCorrelator]) -> QmixResult<DifferentialCorrelator> {
        let Some(first) = parts.first() else {
            return Err(QmixError::IncompatibleMerge {
                reason: "no differential correlators to combine".to_string(),
            });
        };
        if parts.iter().any(|p| p.weighted != first.weighted) {
            return Err(QmixError::IncompatibleMerge {
                reason: "only some of the differential correlators use particle weights"
                    .to_string(),
            });
        }
        let combine = |variable: PairVariable| {
            let profiles: Vec<&Profile1D> = parts.iter().map(|p| p.profile(variable)).collect();
            Profile1D::combine(&profiles)
        };
        Ok(DifferentialCorrelator {
            weighted: first.weighted,
            profiles: [combine(PairVariable::PtSum)?, combine(PairVariable::PtDiff)?],
        })
    }

    /// Final estimates in every bin.
    pub fn results(&self) -> DifferentialResults {
        DifferentialResults {
            binning: *self.profiles[0].binning(),
            pt_sum: self.profile(PairVariable::PtSum).estimates(),
            pt_diff: self.profile(PairVariable::PtDiff).estimates(),
        }
    }
}

/// $`\langle\cos[n(\psi_1+\psi_2-2\phi_3)]\rangle`$ in bins of $`(p_{T,1}+p_{T,2})/2`$ and
/// $`|p_{T,1}-p_{T,2}|`$.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DifferentialResults {
    /// The binning shared by both variables
    pub binning: Binning,
    /// Estimates versus $`(p_{T,1}+p_{T,2})/2`$
    pub pt_sum: Vec<Estimate>,
    /// Estimates versus $`|p_{T,1}-p_{T,2}|`$
    pub pt_diff: Vec<Estimate>,
}

impl DifferentialResults {
    /// Estimates versus `variable`.
    pub fn get(&self, variable: PairVariable) -> &[Estimate] {
        match variable {
            PairVariable::PtSum => &self.pt_sum,
            PairVariable::PtDiff => &self.pt_diff,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        accumulator::EventAccumulator,
        data::{test_event, EventData, FlowEvent, ToyEventGenerator, Track},
        weights::ParticleWeights,
    };
    use approx::assert_relative_eq;

    fn brute_force(event: &EventData, n: f64) -> f64 {
        let tracks = event.tracks();
        let mut sum = 0.0;
        let mut count = 0.0;
        for (i, first) in tracks.iter().enumerate() {
            for (j, second) in tracks.iter().enumerate() {
                if i == j || !first.is_poi || !second.is_poi {
                    continue;
                }
                for (k, third) in tracks.iter().enumerate() {
                    if k == i || k == j || !third.is_rp {
                        continue;
                    }
                    sum += (n * (first.phi + second.phi - 2.0 * third.phi)).cos();
                    count += 1.0;
                }
            }
        }
        sum / count
    }

    fn run(config: &MixedHarmonicsConfig, event: &EventData) -> (DifferentialCorrelator, usize) {
        let mut accumulator = EventAccumulator::new(config);
        accumulator
            .accumulate(event, &ParticleWeights::none(), config)
            .unwrap();
        let finalized = accumulator.finalize().unwrap();
        let mut differential = DifferentialCorrelator::new(config);
        let filled = differential
            .fill(&finalized.moments, finalized.pairs)
            .unwrap();
        (differential, filled)
    }

    #[test]
    fn test_matches_triplet_loop() {
        let config = MixedHarmonicsConfig::new()
            .harmonic(2)
            .evaluate_differential(true)
            .pt_binning(Binning::new(1, 0.0, 100.0));
        let mut event = ToyEventGenerator::new(9)
            .multiplicity(12)
            .flow(2, 0.15)
            .rp_fraction(0.6)
            .poi_fraction(0.5)
            .generate();
        event.tracks.push(Track::poi(1.3, 0.8, 1).also_rp());
        event.tracks.push(Track::poi(4.1, 1.9, -1));
        event.tracks.push(Track::rp(5.5));
        let (differential, filled) = run(&config, &event);
        assert_eq!(filled, 2);
        let expected = brute_force(&event, 2.0);
        for variable in PairVariable::ALL {
            assert_relative_eq!(
                differential.profile(variable).bin(0).mean(),
                expected,
                epsilon = 1e-10
            );
        }
    }

    #[test]
    fn test_empty_bins_are_not_filled() {
        let config = MixedHarmonicsConfig::new().evaluate_differential(true);
        let event = EventData::new(vec![
            Track::rp(0.1),
            Track::rp(1.7),
            Track::poi(0.4, 0.53, 1),
            Track::poi(2.9, 0.78, -1),
        ]);
        let (differential, filled) = run(&config, &event);
        // both ordered pairs share a bin of each variable
        assert_eq!(filled, 2);
        let sum = differential.profile(PairVariable::PtSum);
        assert_eq!(sum.bin(6).entries(), 1);
        assert_relative_eq!(sum.bin(6).sum_w(), 4.0);
        assert_eq!(
            sum.bins().iter().filter(|b| !b.is_empty()).count(),
            1
        );
        let diff = differential.profile(PairVariable::PtDiff);
        assert_eq!(diff.bin(2).entries(), 1);
        assert_relative_eq!(sum.bin(6).mean(), brute_force(&event, 1.0), epsilon = 1e-12);
    }

    fn fill_event(
        differential: &mut DifferentialCorrelator,
        config: &MixedHarmonicsConfig,
        event: &EventData,
    ) -> usize {
        let mut accumulator = EventAccumulator::new(config);
        accumulator
            .accumulate(event, &ParticleWeights::none(), config)
            .unwrap();
        let finalized = accumulator.finalize().unwrap();
        differential
            .fill(&finalized.moments, finalized.pairs)
            .unwrap()
    }

    #[test]
    fn test_non_positive_weight_is_skipped() {
        let config = MixedHarmonicsConfig::new().evaluate_differential(true);
        let (mut differential, filled) = run(
            &config,
            &EventData::new(vec![
                Track::rp(0.1),
                Track::rp(1.7),
                Track::poi(0.4, 0.53, 1),
                Track::poi(2.9, 0.78, -1),
            ]),
        );
        assert_eq!(filled, 2);
        let before = differential.clone();
        // one reference particle which is also a particle of interest: every triplet overlaps
        let overlapping = EventData::new(vec![
            Track::poi(0.4, 0.53, 1).also_rp(),
            Track::poi(2.9, 0.78, -1),
        ]);
        assert_eq!(fill_event(&mut differential, &config, &overlapping), 0);
        assert_eq!(differential, before);
        for variable in PairVariable::ALL {
            for (a, b) in differential
                .profile(variable)
                .bins()
                .iter()
                .zip(before.profile(variable).bins())
            {
                assert_eq!(a.sum_w().to_bits(), b.sum_w().to_bits());
                assert_eq!(a.sum_wy().to_bits(), b.sum_wy().to_bits());
                assert_eq!(a.entries(), b.entries());
            }
        }
        assert_eq!(differential.profile(PairVariable::PtSum).bin(6).entries(), 1);
    }

    #[test]
    fn test_mismatched_binning_is_rejected() {
        let config = MixedHarmonicsConfig::new().evaluate_differential(true);
        let mut differential =
            DifferentialCorrelator::new(&config.clone().pt_binning(Binning::new(10, 0.0, 10.0)));
        assert!(differential.check_consistency(&config, "test").is_err());
        let mut accumulator = EventAccumulator::new(&config);
        accumulator
            .accumulate(&test_event(), &ParticleWeights::none(), &config)
            .unwrap();
        let finalized = accumulator.finalize().unwrap();
        let before = differential.clone();
        assert!(matches!(
            differential.fill(&finalized.moments, finalized.pairs),
            Err(QmixError::MissingAggregate { method, .. }) if method == "DifferentialCorrelator::fill"
        ));
        assert_eq!(differential, before);
    }

    #[test]
    fn test_weighted_fill_is_unsupported() {
        let config = MixedHarmonicsConfig::new()
            .evaluate_differential(true)
            .use_pt_weights(true);
        let mut differential = DifferentialCorrelator::new(&config);
        let accumulator = EventAccumulator::new(&config);
        let moments = EventMoments::new(1, Default::default(), Default::default());
        assert!(matches!(
            differential.fill(&moments, accumulator.pairs()),
            Err(QmixError::Unsupported { method }) if method == "DifferentialCorrelator::fill"
        ));
    }

    #[test]
    fn test_merge_and_results() {
        let config = MixedHarmonicsConfig::new().evaluate_differential(true);
        let mut generator = ToyEventGenerator::new(4).multiplicity(20).flow(1, 0.1);
        let (mut a, _) = run(&config, &generator.generate());
        let (b, _) = run(&config, &generator.generate());
        let combined = DifferentialCorrelator::combine(&[&a, &b]).unwrap();
        a.merge(&b).unwrap();
        let results = a.results();
        assert_eq!(results.pt_sum.len(), config.pt.n_bins);
        for (x, y) in results
            .get(PairVariable::PtDiff)
            .iter()
            .zip(combined.results().get(PairVariable::PtDiff))
        {
            assert_relative_eq!(x.value, y.value, epsilon = 1e-12);
        }
    }
}
