use std::ops::{Index, IndexMut};

use serde::{Deserialize, Serialize};

use crate::{
    accumulator::EventMoments,
    config::{MixedHarmonicsConfig, MultiplicityBinning},
    profile::{MultiplicityProfile, ProfileBin},
    utils::{enums::MultiplicityBin, enums::NonIsotropicTerm, falling_factorial},
    QmixError, QmixResult,
};

/// One value per [`NonIsotropicTerm`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TermArray<T> {
    values: [T; NonIsotropicTerm::COUNT],
}

impl<T> TermArray<T> {
    /// Construct a new [`TermArray`] from values in storage order.
    pub fn new(values: [T; NonIsotropicTerm::COUNT]) -> Self {
        Self { values }
    }

    /// Build the array by evaluating `f` for every term.
    pub fn from_fn<F: FnMut(NonIsotropicTerm) -> T>(mut f: F) -> Self {
        Self {
            values: std::array::from_fn(|i| f(NonIsotropicTerm::ALL[i])),
        }
    }

    /// Iterate over `(term, value)` in storage order.
    pub fn iter(&self) -> impl Iterator<Item = (NonIsotropicTerm, &T)> {
        NonIsotropicTerm::ALL.into_iter().zip(self.values.iter())
    }

    /// Apply `f` to every value.
    pub fn map<U, F: FnMut(&T) -> U>(&self, mut f: F) -> TermArray<U> {
        TermArray::from_fn(|term| f(&self.values[term.index()]))
    }
}

impl<T> Index<NonIsotropicTerm> for TermArray<T> {
    type Output = T;

    fn index(&self, term: NonIsotropicTerm) -> &Self::Output {
        &self.values[term.index()]
    }
}

impl<T> IndexMut<NonIsotropicTerm> for TermArray<T> {
    fn index_mut(&mut self, term: NonIsotropicTerm) -> &mut Self::Output {
        &mut self.values[term.index()]
    }
}

/// The event estimate of $`\langle\cos[n(\phi_1+\phi_2-2\phi_3)]\rangle`$ from unweighted flow
/// vectors:
///
/// ```math
/// \frac{\text{Re}[Q_n Q_n Q_{2n}^*] - 2|Q_n|^2 - |Q_{2n}|^2 + 2M}{M(M-1)(M-2)}
/// ```
///
/// Returns [`None`] for fewer than three reference particles.
pub fn three_particle_correlator(moments: &EventMoments) -> Option<f64> {
    let m = moments.multiplicity();
    if m < 3.0 {
        return None;
    }
    let (re1, im1) = (moments.q1n().re, moments.q1n().im);
    let (re2, im2) = (moments.q2n().re, moments.q2n().im);
    let numerator = re1 * re1 * re2 + 2.0 * re1 * im1 * im2
        - im1 * im1 * re2
        - 2.0 * (re1 * re1 + im1 * im1)
        - (re2 * re2 + im2 * im2)
        + 2.0 * m;
    Some(numerator / falling_factorial(m, 3))
}

/// The eight one- and two-particle non-isotropic terms of a single event. One-particle terms are
/// [`None`] for $`M = 0`$ and two-particle terms for $`M \le 1`$.
pub fn non_isotropic_terms(moments: &EventMoments) -> TermArray<Option<f64>> {
    let m = moments.multiplicity();
    let (re1, im1) = (moments.q1n().re, moments.q1n().im);
    let (re2, im2) = (moments.q2n().re, moments.q2n().im);
    let one = m > 0.0;
    let two = m > 1.0;
    let m2 = falling_factorial(m, 2);
    TermArray::from_fn(|term| match term {
        NonIsotropicTerm::OneParticleCos => one.then(|| re1 / m),
        NonIsotropicTerm::OneParticleSin => one.then(|| im1 / m),
        NonIsotropicTerm::OneParticleCos2n => one.then(|| re2 / m),
        NonIsotropicTerm::OneParticleSin2n => one.then(|| im2 / m),
        NonIsotropicTerm::TwoParticleSumCos => two.then(|| (re1 * re1 - im1 * im1 - re2) / m2),
        NonIsotropicTerm::TwoParticleSumSin => two.then(|| (2.0 * re1 * im1 - im2) / m2),
        NonIsotropicTerm::TwoParticleDiffCos => {
            two.then(|| (re2 * re1 + im2 * im1 - re1) / m2)
        }
        NonIsotropicTerm::TwoParticleDiffSin => {
            two.then(|| (im2 * re1 - re2 * im1 - im1) / m2)
        }
    })
}

/// Running averages of the 3-particle correlator and the non-isotropic terms over all events,
/// integrated and versus multiplicity.
///
/// Every event estimate enters with the number of distinct particle tuples it averages over:
/// $`M(M-1)(M-2)`$ for the correlator, $`M`$ or $`M(M-1)`$ for the terms.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CorrelatorAggregates {
    weighted: bool,
    three_particle: ProfileBin,
    three_particle_vs_m: MultiplicityProfile,
    terms: TermArray<ProfileBin>,
    terms_vs_m: TermArray<MultiplicityProfile>,
}

impl CorrelatorAggregates {
    /// Empty aggregates for the multiplicity binning of `config`.
    pub fn new(config: &MixedHarmonicsConfig) -> Self {
        Self {
            weighted: config.uses_particle_weights(),
            three_particle: ProfileBin::default(),
            three_particle_vs_m: MultiplicityProfile::new(config.multiplicity),
            terms: TermArray::default(),
            terms_vs_m: TermArray::from_fn(|_| MultiplicityProfile::new(config.multiplicity)),
        }
    }

    pub(crate) fn ensure_unweighted(&self, method: &str) -> QmixResult<()> {
        if self.weighted {
            return Err(QmixError::Unsupported {
                method: method.to_string(),
            });
        }
        Ok(())
    }

    /// Fill the 3-particle correlator of the event, if it has at least three reference
    /// particles. Returns the event estimate.
    pub fn fill_three_particle(&mut self, moments: &EventMoments) -> QmixResult<Option<f64>> {
        self.ensure_unweighted("CorrelatorAggregates::fill_three_particle")?;
        let correlator = three_particle_correlator(moments);
        if let Some(value) = correlator {
            let m = moments.multiplicity();
            let weight = falling_factorial(m, 3);
            self.three_particle.fill(value, weight);
            self.three_particle_vs_m.fill(m, value, weight);
        }
        Ok(correlator)
    }

    /// Fill every non-isotropic term which is defined for the event. Returns the event values.
    pub fn fill_non_isotropic_terms(
        &mut self,
        moments: &EventMoments,
    ) -> QmixResult<TermArray<Option<f64>>> {
        self.ensure_unweighted("CorrelatorAggregates::fill_non_isotropic_terms")?;
        let values = non_isotropic_terms(moments);
        let m = moments.multiplicity();
        for (term, value) in values.iter() {
            if let Some(value) = value {
                let weight = falling_factorial(m, term.order());
                self.terms[term].fill(*value, weight);
                self.terms_vs_m[term].fill(m, *value, weight);
            }
        }
        Ok(values)
    }

    /// The integrated 3-particle correlator.
    pub fn three_particle(&self) -> &ProfileBin {
        &self.three_particle
    }

    /// The 3-particle correlator versus multiplicity.
    pub fn three_particle_vs_m(&self) -> &MultiplicityProfile {
        &self.three_particle_vs_m
    }

    /// The integrated non-isotropic term `term`.
    pub fn term(&self, term: NonIsotropicTerm) -> &ProfileBin {
        &self.terms[term]
    }

    /// The non-isotropic term `term` versus multiplicity.
    pub fn term_vs_m(&self, term: NonIsotropicTerm) -> &MultiplicityProfile {
        &self.terms_vs_m[term]
    }

    /// Mean values of the integrated non-isotropic terms.
    pub fn term_means(&self) -> TermArray<f64> {
        self.terms.map(ProfileBin::mean)
    }

    /// Mean values of the non-isotropic terms in the multiplicity bin `bin`.
    pub fn term_means_in(&self, bin: MultiplicityBin) -> TermArray<f64> {
        self.terms_vs_m.map(|profile| profile.get(bin).mean())
    }

    /// The multiplicity binning.
    pub fn multiplicity_binning(&self) -> &MultiplicityBinning {
        self.three_particle_vs_m.binning()
    }

    /// Check that every profile is binned with the multiplicity binning of `config` and that the
    /// aggregates were set up for the same weighting.
    pub fn check_consistency(&self, config: &MixedHarmonicsConfig, method: &str) -> QmixResult<()> {
        let missing = |name: String| QmixError::MissingAggregate {
            name,
            method: method.to_string(),
        };
        if self.weighted != config.uses_particle_weights() {
            return Err(missing(format!(
                "correlator aggregates with particle weights {}",
                if config.uses_particle_weights() { "enabled" } else { "disabled" }
            )));
        }
        if !self.three_particle_vs_m.is_binned_as(&config.multiplicity) {
            return Err(missing(format!(
                "3-particle correlator versus multiplicity with binning {:?}",
                config.multiplicity
            )));
        }
        if let Some(term) = NonIsotropicTerm::ALL
            .into_iter()
            .find(|term| !self.terms_vs_m[*term].is_binned_as(&config.multiplicity))
        {
            return Err(missing(format!(
                "{} versus multiplicity with binning {:?}",
                term, config.multiplicity
            )));
        }
        Ok(())
    }

    /// Add the content of `other`. Nothing is added unless every profile of `other` matches.
    pub fn merge(&mut self, other: &CorrelatorAggregates) -> QmixResult<()> {
        if self.weighted != other.weighted {
            return Err(QmixError::IncompatibleMerge {
                reason: "only one of the aggregates uses particle weights".to_string(),
            });
        }
        let binning = self.multiplicity_binning();
        let consistent = other.three_particle_vs_m.is_binned_as(binning)
            && NonIsotropicTerm::ALL.into_iter().all(|term| {
                self.terms_vs_m[term].is_binned_as(binning)
                    && other.terms_vs_m[term].is_binned_as(binning)
            });
        if !consistent {
            return Err(QmixError::IncompatibleMerge {
                reason: "the aggregates are binned differently in multiplicity".to_string(),
            });
        }
        self.three_particle_vs_m.merge(&other.three_particle_vs_m)?;
        self.three_particle += other.three_particle;
        for term in NonIsotropicTerm::ALL {
            self.terms_vs_m[term].merge(&other.terms_vs_m[term])?;
            self.terms[term] += other.terms[term];
        }
        Ok(())
    }

    /// Combine many aggregates with compensated summation.
    pub fn combine(parts: &[&CorrelatorAggregates]) -> QmixResult<CorrelatorAggregates> {
        let Some(first) = parts.first() else {
            return Err(QmixError::IncompatibleMerge {
                reason: "no aggregates to combine".to_string(),
            });
        };
        if parts.iter().any(|p| p.weighted != first.weighted) {
            return Err(QmixError::IncompatibleMerge {
                reason: "only some of the aggregates use particle weights".to_string(),
            });
        }
        let three_particle: Vec<ProfileBin> = parts.iter().map(|p| p.three_particle).collect();
        let three_particle_vs_m: Vec<&MultiplicityProfile> =
            parts.iter().map(|p| &p.three_particle_vs_m).collect();
        let mut terms = TermArray::<ProfileBin>::default();
        let mut terms_vs_m = first.terms_vs_m.clone();
        for term in NonIsotropicTerm::ALL {
            let bins: Vec<ProfileBin> = parts.iter().map(|p| p.terms[term]).collect();
            terms[term] = ProfileBin::combine(&bins);
            let profiles: Vec<&MultiplicityProfile> =
                parts.iter().map(|p| &p.terms_vs_m[term]).collect();
            terms_vs_m[term] = MultiplicityProfile::combine(&profiles)?;
        }
        Ok(CorrelatorAggregates {
            weighted: first.weighted,
            three_particle: ProfileBin::combine(&three_particle),
            three_particle_vs_m: MultiplicityProfile::combine(&three_particle_vs_m)?,
            terms,
            terms_vs_m,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        accumulator::EventAccumulator,
        data::{EventData, FlowEvent},
        weights::ParticleWeights,
    };
    use approx::assert_relative_eq;
    use std::f64::consts::{FRAC_PI_2, PI, TAU};

    fn moments_of(angles: &[f64], harmonic: u32) -> EventMoments {
        let config = MixedHarmonicsConfig::new().harmonic(harmonic);
        let mut accumulator = EventAccumulator::new(&config);
        accumulator
            .accumulate(
                &EventData::from_rp_angles(angles),
                &ParticleWeights::none(),
                &config,
            )
            .unwrap();
        accumulator.finalize().unwrap().moments
    }

    fn random_angles(seed: u64, n: usize) -> Vec<f64> {
        let mut rng = fastrand::Rng::with_seed(seed);
        (0..n).map(|_| TAU * rng.f64()).collect()
    }

    fn brute_force_three_particle(angles: &[f64], n: f64) -> f64 {
        let mut sum = 0.0;
        let mut count = 0.0;
        for (i, a) in angles.iter().enumerate() {
            for (j, b) in angles.iter().enumerate() {
                for (k, c) in angles.iter().enumerate() {
                    if i == j || i == k || j == k {
                        continue;
                    }
                    sum += (n * (a + b - 2.0 * c)).cos();
                    count += 1.0;
                }
            }
        }
        sum / count
    }

    fn brute_force_pair<F: Fn(f64, f64) -> f64>(angles: &[f64], f: F) -> f64 {
        let mut sum = 0.0;
        let mut count = 0.0;
        for (i, a) in angles.iter().enumerate() {
            for (j, b) in angles.iter().enumerate() {
                if i != j {
                    sum += f(*a, *b);
                    count += 1.0;
                }
            }
        }
        sum / count
    }

    #[test]
    fn test_three_particle_matches_triplet_loop() {
        for (seed, harmonic) in [(1, 1), (2, 2), (3, 3)] {
            let angles = random_angles(seed, 9);
            let moments = moments_of(&angles, harmonic);
            assert_relative_eq!(
                three_particle_correlator(&moments).unwrap(),
                brute_force_three_particle(&angles, harmonic as f64),
                epsilon = 1e-10
            );
        }
    }

    #[test]
    fn test_non_isotropic_terms_match_loops() {
        let angles = random_angles(11, 7);
        let n = 2.0;
        let terms = non_isotropic_terms(&moments_of(&angles, 2));
        let m = angles.len() as f64;
        let one = |f: &dyn Fn(f64) -> f64| angles.iter().map(|a| f(*a)).sum::<f64>() / m;
        let expected = TermArray::new([
            one(&|a| (n * a).cos()),
            one(&|a| (n * a).sin()),
            one(&|a| (2.0 * n * a).cos()),
            one(&|a| (2.0 * n * a).sin()),
            brute_force_pair(&angles, |a, b| (n * (a + b)).cos()),
            brute_force_pair(&angles, |a, b| (n * (a + b)).sin()),
            brute_force_pair(&angles, |a, b| (n * (2.0 * a - b)).cos()),
            brute_force_pair(&angles, |a, b| (n * (2.0 * a - b)).sin()),
        ]);
        for (term, value) in terms.iter() {
            assert_relative_eq!(value.unwrap(), expected[term], epsilon = 1e-10);
        }
    }

    #[test]
    fn test_isotropic_acceptance() {
        for m in 3..12 {
            let angles: Vec<f64> = (0..m).map(|i| TAU * i as f64 / m as f64).collect();
            let moments = moments_of(&angles, 1);
            // Q_n and Q_2n vanish for m >= 3 evenly spaced angles
            let expected = 2.0 / ((m as f64 - 1.0) * (m as f64 - 2.0));
            assert_relative_eq!(
                three_particle_correlator(&moments).unwrap(),
                expected,
                epsilon = 1e-10
            );
        }
    }

    #[test]
    fn test_square_event() {
        let angles = [0.0, FRAC_PI_2, PI, 3.0 * FRAC_PI_2];
        // at n = 2 the harmonic-n vector vanishes and Q_2n = 4
        assert_relative_eq!(
            three_particle_correlator(&moments_of(&angles, 2)).unwrap(),
            -1.0 / 3.0,
            epsilon = 1e-12
        );
        assert_relative_eq!(
            brute_force_three_particle(&angles, 2.0),
            -1.0 / 3.0,
            epsilon = 1e-12
        );
        // at n = 4 every phase is aligned
        assert_relative_eq!(
            three_particle_correlator(&moments_of(&angles, 4)).unwrap(),
            1.0,
            epsilon = 1e-10
        );
    }

    #[test]
    fn test_degenerate_multiplicities() {
        assert!(three_particle_correlator(&moments_of(&[0.1, 0.2], 1)).is_none());
        let terms = non_isotropic_terms(&moments_of(&[], 1));
        assert!(terms.iter().all(|(_, v)| v.is_none()));
        let terms = non_isotropic_terms(&moments_of(&[0.3], 1));
        for (term, value) in terms.iter() {
            assert_eq!(value.is_some(), term.order() == 1);
        }
        assert_relative_eq!(terms[NonIsotropicTerm::OneParticleCos].unwrap(), 0.3f64.cos());
    }

    #[test]
    fn test_aggregates_fill() {
        let config = MixedHarmonicsConfig::default();
        let mut aggregates = CorrelatorAggregates::new(&config);
        let small = moments_of(&[0.1, 0.2], 1);
        assert_eq!(aggregates.fill_three_particle(&small).unwrap(), None);
        assert!(aggregates.three_particle().is_empty());
        let angles = random_angles(5, 6);
        let moments = moments_of(&angles, 1);
        let value = aggregates.fill_three_particle(&moments).unwrap().unwrap();
        assert_relative_eq!(aggregates.three_particle().mean(), value);
        assert_relative_eq!(aggregates.three_particle().sum_w(), 120.0);
        let bin = config.multiplicity.bin(6.0);
        assert_eq!(bin, MultiplicityBin::Regular(2));
        assert_relative_eq!(aggregates.three_particle_vs_m().get(bin).mean(), value);
        aggregates.fill_non_isotropic_terms(&small).unwrap();
        assert_relative_eq!(
            aggregates.term(NonIsotropicTerm::TwoParticleSumCos).sum_w(),
            2.0
        );
        assert_relative_eq!(aggregates.term(NonIsotropicTerm::OneParticleSin).sum_w(), 2.0);
        assert_eq!(
            aggregates
                .term_vs_m(NonIsotropicTerm::OneParticleSin)
                .get(MultiplicityBin::Regular(0))
                .entries(),
            1
        );
        assert_relative_eq!(
            aggregates.term_means_in(MultiplicityBin::Regular(0))[NonIsotropicTerm::OneParticleCos],
            (0.1f64.cos() + 0.2f64.cos()) / 2.0
        );
    }

    #[test]
    fn test_weighted_reduction_is_unsupported() {
        let config = MixedHarmonicsConfig::default().use_phi_weights(true);
        let mut aggregates = CorrelatorAggregates::new(&config);
        let moments = moments_of(&[0.1, 0.2, 0.3], 1);
        assert!(matches!(
            aggregates.fill_three_particle(&moments),
            Err(QmixError::Unsupported { method }) if method == "CorrelatorAggregates::fill_three_particle"
        ));
        assert!(matches!(
            aggregates.fill_non_isotropic_terms(&moments),
            Err(QmixError::Unsupported { .. })
        ));
    }

    #[test]
    fn test_merge_equals_sequential() {
        let config = MixedHarmonicsConfig::default();
        let events: Vec<Vec<f64>> = (0..6).map(|i| random_angles(100 + i, 3 + i as usize)).collect();
        let mut all = CorrelatorAggregates::new(&config);
        let mut parts = vec![
            CorrelatorAggregates::new(&config),
            CorrelatorAggregates::new(&config),
            CorrelatorAggregates::new(&config),
        ];
        for (i, angles) in events.iter().enumerate() {
            let event = EventData::from_rp_angles(angles);
            assert_eq!(event.n_reference_particles(), angles.len());
            let moments = moments_of(angles, 1);
            all.fill_three_particle(&moments).unwrap();
            all.fill_non_isotropic_terms(&moments).unwrap();
            parts[i % 3].fill_three_particle(&moments).unwrap();
            parts[i % 3].fill_non_isotropic_terms(&moments).unwrap();
        }
        let mut merged = parts[0].clone();
        merged.merge(&parts[1]).unwrap();
        merged.merge(&parts[2]).unwrap();
        let combined = CorrelatorAggregates::combine(&parts.iter().collect::<Vec<_>>()).unwrap();
        for candidate in [&merged, &combined] {
            assert_relative_eq!(
                candidate.three_particle().mean(),
                all.three_particle().mean(),
                epsilon = 1e-12
            );
            assert_relative_eq!(
                candidate.three_particle().error(),
                all.three_particle().error(),
                epsilon = 1e-12
            );
            for term in NonIsotropicTerm::ALL {
                assert_relative_eq!(
                    candidate.term(term).mean(),
                    all.term(term).mean(),
                    epsilon = 1e-12
                );
            }
            for (bin, content) in all.three_particle_vs_m().iter() {
                assert_eq!(
                    candidate.three_particle_vs_m().get(bin).entries(),
                    content.entries()
                );
            }
        }
    }

    #[test]
    fn test_consistency_checks() {
        let config = MixedHarmonicsConfig::new();
        let mut aggregates = CorrelatorAggregates::new(&config);
        aggregates
            .fill_three_particle(&moments_of(&random_angles(3, 9), 1))
            .unwrap();
        assert!(aggregates.check_consistency(&config, "test").is_ok());
        assert!(matches!(
            aggregates.check_consistency(&config.clone().use_eta_weights(true), "test"),
            Err(QmixError::MissingAggregate { .. })
        ));

        let mut shifted = aggregates.clone();
        shifted.terms_vs_m[NonIsotropicTerm::TwoParticleDiffCos] =
            MultiplicityProfile::new(MultiplicityBinning::new(0.0, 5.0, 4));
        assert!(matches!(
            shifted.check_consistency(&config, "CorrelatorAggregates::test"),
            Err(QmixError::MissingAggregate { method, .. }) if method == "CorrelatorAggregates::test"
        ));
        let before = aggregates.clone();
        assert!(matches!(
            aggregates.merge(&shifted),
            Err(QmixError::IncompatibleMerge { .. })
        ));
        assert_eq!(aggregates, before);
    }
}
