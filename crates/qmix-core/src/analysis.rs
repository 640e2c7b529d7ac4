use std::{fmt::Display, path::PathBuf};

#[cfg(feature = "rayon")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    accumulator::EventAccumulator,
    config::MixedHarmonicsConfig,
    corrector::{BiasCorrection, DetectorBiasCorrector},
    data::FlowEvent,
    differential::{DifferentialCorrelator, DifferentialResults},
    profile::{Estimate, ProfileBin},
    reducer::{CorrelatorAggregates, TermArray},
    utils::enums::{MultiplicityBin, NonIsotropicTerm},
    weights::ParticleWeights,
    QmixError, QmixResult,
};

fn expand_path(file_path: &str) -> QmixResult<PathBuf> {
    Ok(PathBuf::from(&*shellexpand::full(file_path)?))
}

/// Everything which survives the event loop, as written by [`MixedHarmonics::save_as`].
#[derive(Serialize, Deserialize)]
struct SavedAnalysis {
    config: MixedHarmonicsConfig,
    weights: ParticleWeights,
    aggregates: CorrelatorAggregates,
    differential: Option<DifferentialCorrelator>,
    multiplicity: ProfileBin,
    n_pairs_outside: u64,
}

/// The analysis of $`\langle\langle\cos[n(\phi_1+\phi_2-2\phi_3)]\rangle\rangle`$ with mixed
/// harmonics.
///
/// Every event is reduced to its flow vectors, from which the 3-particle correlator and the
/// non-isotropic terms are evaluated without looping over particle triplets. The event estimates
/// are collected in running averages, integrated and versus multiplicity, and optionally versus
/// the kinematics of pairs of particles of interest. [`MixedHarmonics::finish`] turns the running
/// averages into the final results, corrected for non-uniform acceptance if requested.
///
/// ```rust
/// use qmix_core::{EventData, MixedHarmonics, MixedHarmonicsConfig, ParticleWeights};
/// use std::f64::consts::FRAC_PI_2;
///
/// let config = MixedHarmonicsConfig::new().harmonic(4).print_results(false);
/// let mut analysis = MixedHarmonics::new(config, ParticleWeights::none()).unwrap();
/// let event = EventData::from_rp_angles([0.0, FRAC_PI_2, 2.0 * FRAC_PI_2, 3.0 * FRAC_PI_2]);
/// analysis.process_event(&event).unwrap();
/// let results = analysis.finish().unwrap();
/// assert!((results.measured.value - 1.0).abs() < 1e-12);
/// ```
#[derive(Clone, Debug)]
pub struct MixedHarmonics {
    config: MixedHarmonicsConfig,
    weights: ParticleWeights,
    accumulator: EventAccumulator,
    aggregates: CorrelatorAggregates,
    differential: Option<DifferentialCorrelator>,
    multiplicity: ProfileBin,
    n_pairs_outside: u64,
}

impl MixedHarmonics {
    /// Set up an analysis. Fails if `config` makes no sense or if an enabled weight table is
    /// missing or binned differently from `config`.
    pub fn new(config: MixedHarmonicsConfig, weights: ParticleWeights) -> QmixResult<Self> {
        config.validate()?;
        weights.validate(&config, "MixedHarmonics::new")?;
        Ok(Self::empty(config, weights))
    }

    fn empty(config: MixedHarmonicsConfig, weights: ParticleWeights) -> Self {
        let differential = config
            .evaluate_differential
            .then(|| DifferentialCorrelator::new(&config));
        Self {
            accumulator: EventAccumulator::new(&config),
            aggregates: CorrelatorAggregates::new(&config),
            differential,
            multiplicity: ProfileBin::default(),
            n_pairs_outside: 0,
            config,
            weights,
        }
    }

    fn empty_like(&self) -> Self {
        Self::empty(self.config.clone(), self.weights.clone())
    }

    /// The settings of the analysis.
    pub fn config(&self) -> &MixedHarmonicsConfig {
        &self.config
    }

    /// The running averages of the correlator and the non-isotropic terms.
    pub fn aggregates(&self) -> &CorrelatorAggregates {
        &self.aggregates
    }

    /// The differential correlator, if it is evaluated.
    pub fn differential(&self) -> Option<&DifferentialCorrelator> {
        self.differential.as_ref()
    }

    /// Number of processed events.
    pub fn n_events(&self) -> u64 {
        self.multiplicity.entries()
    }

    /// Run one event through the analysis. An event either enters every running average or,
    /// if it cannot be reduced, none of them. The per-event state is reset afterwards in both
    /// cases.
    pub fn process_event<E: FlowEvent + ?Sized>(&mut self, event: &E) -> QmixResult<()> {
        let result = self.reduce_event(event);
        self.accumulator.reset();
        result
    }

    fn reduce_event<E: FlowEvent + ?Sized>(&mut self, event: &E) -> QmixResult<()> {
        const METHOD: &str = "MixedHarmonics::process_event";
        self.accumulator
            .accumulate(event, &self.weights, &self.config)?;
        let n_rp = event.n_reference_particles();
        let finalized = self.accumulator.finalize()?;
        self.aggregates.ensure_unweighted(METHOD)?;
        let differential = if self.config.evaluate_differential {
            let differential =
                self.differential
                    .as_mut()
                    .ok_or_else(|| QmixError::MissingAggregate {
                        name: "differential correlator".to_string(),
                        method: METHOD.to_string(),
                    })?;
            differential.check_fillable(finalized.pairs, METHOD)?;
            Some(differential)
        } else {
            None
        };

        let moments = finalized.moments;
        let m = moments.multiplicity();
        self.multiplicity.fill(m, 1.0);
        self.n_pairs_outside += finalized.pairs.n_outside();
        let three_particle = if n_rp >= 3 {
            self.aggregates.fill_three_particle(&moments)?
        } else {
            None
        };
        self.aggregates.fill_non_isotropic_terms(&moments)?;
        let mut differential_bins = 0;
        if let Some(differential) = differential.filter(|_| n_rp >= 1) {
            differential_bins = differential.fill(&moments, finalized.pairs)?;
        }
        debug!(
            multiplicity = m,
            reference_particles = n_rp,
            three_particle = ?three_particle,
            differential_bins,
            "processed event"
        );
        Ok(())
    }

    /// Run every event of `events` through the analysis. With the `rayon` feature the events
    /// are split among worker-local analyses which are merged at the end.
    ///
    /// The batch is all or nothing: if any event fails, the error is returned and none of the
    /// events of `events` enter the running averages.
    #[cfg(feature = "rayon")]
    pub fn process_events<E: FlowEvent + Sync>(&mut self, events: &[E]) -> QmixResult<()> {
        self.check_state("MixedHarmonics::process_events")?;
        let partial = events
            .par_iter()
            .try_fold(
                || self.empty_like(),
                |mut analysis, event| {
                    analysis.process_event(event)?;
                    Ok::<_, QmixError>(analysis)
                },
            )
            .try_reduce(
                || self.empty_like(),
                |mut a, b| {
                    a.merge(&b)?;
                    Ok(a)
                },
            )?;
        self.merge(&partial)
    }

    /// Run every event of `events` through the analysis.
    ///
    /// The batch is all or nothing: if any event fails, the error is returned and none of the
    /// events of `events` enter the running averages.
    #[cfg(not(feature = "rayon"))]
    pub fn process_events<E: FlowEvent>(&mut self, events: &[E]) -> QmixResult<()> {
        self.check_state("MixedHarmonics::process_events")?;
        let mut partial = self.empty_like();
        for event in events {
            partial.process_event(event)?;
        }
        self.merge(&partial)
    }

    fn ensure_compatible(&self, other: &MixedHarmonics) -> QmixResult<()> {
        if self.config != other.config {
            return Err(QmixError::IncompatibleMerge {
                reason: "the analyses were run with different settings".to_string(),
            });
        }
        if self.weights != other.weights {
            return Err(QmixError::IncompatibleMerge {
                reason: "the analyses were run with different weight tables".to_string(),
            });
        }
        Ok(())
    }

    /// Add the running averages of `other`, an analysis of a disjoint set of events with the
    /// same settings. On error `self` is left unchanged.
    pub fn merge(&mut self, other: &MixedHarmonics) -> QmixResult<()> {
        const METHOD: &str = "MixedHarmonics::merge";
        self.ensure_compatible(other)?;
        if self.differential.is_some() != other.differential.is_some() {
            return Err(QmixError::IncompatibleMerge {
                reason: "only one of the analyses holds a differential correlator".to_string(),
            });
        }
        self.check_state(METHOD)?;
        other.check_state(METHOD)?;
        self.aggregates.merge(&other.aggregates)?;
        if let (Some(a), Some(b)) = (&mut self.differential, &other.differential) {
            a.merge(b)?;
        }
        self.multiplicity += other.multiplicity;
        self.n_pairs_outside += other.n_pairs_outside;
        Ok(())
    }

    /// Combine many analyses of disjoint sets of events with compensated summation.
    pub fn merge_all(parts: &[MixedHarmonics]) -> QmixResult<MixedHarmonics> {
        let Some(first) = parts.first() else {
            return Err(QmixError::IncompatibleMerge {
                reason: "no analyses to merge".to_string(),
            });
        };
        for part in parts {
            first.ensure_compatible(part)?;
            part.check_state("MixedHarmonics::merge_all")?;
        }
        let aggregates: Vec<&CorrelatorAggregates> = parts.iter().map(|p| &p.aggregates).collect();
        let differential = if first.config.evaluate_differential {
            let all = parts
                .iter()
                .map(|p| {
                    p.differential
                        .as_ref()
                        .ok_or_else(|| QmixError::MissingAggregate {
                            name: "differential correlator".to_string(),
                            method: "MixedHarmonics::merge_all".to_string(),
                        })
                })
                .collect::<QmixResult<Vec<_>>>()?;
            Some(DifferentialCorrelator::combine(&all)?)
        } else {
            None
        };
        let multiplicity: Vec<ProfileBin> = parts.iter().map(|p| p.multiplicity).collect();
        Ok(MixedHarmonics {
            config: first.config.clone(),
            weights: first.weights.clone(),
            accumulator: EventAccumulator::new(&first.config),
            aggregates: CorrelatorAggregates::combine(&aggregates)?,
            differential,
            multiplicity: ProfileBin::combine(&multiplicity),
            n_pairs_outside: parts.iter().map(|p| p.n_pairs_outside).sum(),
        })
    }

    fn check_state(&self, method: &str) -> QmixResult<()> {
        match &self.differential {
            Some(differential) => differential.check_consistency(&self.config, method)?,
            None if self.config.evaluate_differential => {
                return Err(QmixError::MissingAggregate {
                    name: "differential correlator".to_string(),
                    method: method.to_string(),
                })
            }
            None => {}
        }
        self.aggregates.check_consistency(&self.config, method)
    }

    /// Compute the final results from the running averages.
    pub fn finish(&self) -> QmixResult<MixedHarmonicsResults> {
        self.check_state("MixedHarmonics::finish")?;
        if self.n_events() == 0 {
            warn!("finishing an analysis which has not processed any event");
        }
        if self.n_pairs_outside > 0 {
            warn!(
                pairs = self.n_pairs_outside,
                pt_min = self.config.pt.min,
                pt_max = self.config.pt.max,
                "pairs of particles of interest fell outside of the transverse momentum binning"
            );
        }
        let corrections = self
            .config
            .correct_for_detector_effects
            .then(|| DetectorBiasCorrector.apply(&self.aggregates));
        let binning = self.aggregates.multiplicity_binning();
        let per_bin = self
            .aggregates
            .three_particle_vs_m()
            .iter()
            .map(|(bin, content)| MultiplicityBinResult {
                bin,
                label: binning.label(bin),
                entries: content.entries(),
                measured: content.estimate(),
                correction: corrections
                    .as_ref()
                    .and_then(|c| c.get(bin))
                    .copied(),
                terms: TermArray::from_fn(|term| {
                    self.aggregates.term_vs_m(term).get(bin).estimate()
                }),
            })
            .collect();
        let results = MixedHarmonicsResults {
            harmonic: self.config.harmonic,
            n_events: self.n_events(),
            mean_multiplicity: self.multiplicity.estimate(),
            measured: self.aggregates.three_particle().estimate(),
            correction: corrections.as_ref().map(|c| c.integrated),
            terms: TermArray::from_fn(|term| self.aggregates.term(term).estimate()),
            per_bin,
            differential: self
                .differential
                .as_ref()
                .map(DifferentialCorrelator::results),
        };
        if self.config.print_results {
            info!("\n{}", results);
        }
        Ok(results)
    }

    /// Write the running averages and settings to `file_path` so that the analysis can be
    /// resumed, merged or finished later.
    pub fn save_as<T: AsRef<str>>(&self, file_path: T) -> QmixResult<()> {
        let path = expand_path(file_path.as_ref())?;
        let saved = SavedAnalysis {
            config: self.config.clone(),
            weights: self.weights.clone(),
            aggregates: self.aggregates.clone(),
            differential: self.differential.clone(),
            multiplicity: self.multiplicity,
            n_pairs_outside: self.n_pairs_outside,
        };
        let bytes = bincode::serde::encode_to_vec(&saved, bincode::config::standard())?;
        std::fs::write(&path, bytes)?;
        debug!(path = %path.display(), "saved analysis");
        Ok(())
    }

    /// Load an analysis written by [`MixedHarmonics::save_as`]. The stored settings are checked
    /// again, as are the stored running averages against them.
    pub fn load_from<T: AsRef<str>>(file_path: T) -> QmixResult<Self> {
        let path = expand_path(file_path.as_ref())?;
        let bytes = std::fs::read(&path)?;
        let (saved, _): (SavedAnalysis, usize) =
            bincode::serde::decode_from_slice(&bytes, bincode::config::standard())?;
        saved.config.validate()?;
        saved
            .weights
            .validate(&saved.config, "MixedHarmonics::load_from")?;
        let analysis = MixedHarmonics {
            accumulator: EventAccumulator::new(&saved.config),
            config: saved.config,
            weights: saved.weights,
            aggregates: saved.aggregates,
            differential: saved.differential,
            multiplicity: saved.multiplicity,
            n_pairs_outside: saved.n_pairs_outside,
        };
        analysis.check_state("MixedHarmonics::load_from")?;
        Ok(analysis)
    }
}

/// The final results in one multiplicity bin.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MultiplicityBinResult {
    /// The bin
    pub bin: MultiplicityBin,
    /// The multiplicity range of the bin, e.g. `3 <= M < 5`
    pub label: String,
    /// Number of events which contributed to the correlator in this bin
    pub entries: u64,
    /// The measured correlator
    pub measured: Estimate,
    /// The correction for detector effects, if requested
    pub correction: Option<BiasCorrection>,
    /// The non-isotropic terms
    pub terms: TermArray<Estimate>,
}

/// The final results of a [`MixedHarmonics`] analysis.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MixedHarmonicsResults {
    /// The harmonic $`n`$
    pub harmonic: u32,
    /// Number of processed events
    pub n_events: u64,
    /// Mean number of reference particles per event
    pub mean_multiplicity: Estimate,
    /// The measured $`\langle\langle\cos[n(\phi_1+\phi_2-2\phi_3)]\rangle\rangle`$
    pub measured: Estimate,
    /// The correction for detector effects, if requested
    pub correction: Option<BiasCorrection>,
    /// The integrated non-isotropic terms
    pub terms: TermArray<Estimate>,
    /// Results in every multiplicity bin, in flat order
    pub per_bin: Vec<MultiplicityBinResult>,
    /// The differential correlator, if evaluated
    pub differential: Option<DifferentialResults>,
}

impl MixedHarmonicsResults {
    /// The corrected correlator if a correction was applied, the measured one otherwise.
    pub fn best_estimate(&self) -> Estimate {
        self.correction
            .map(|c| c.corrected)
            .unwrap_or(self.measured)
    }

    /// The results in multiplicity bin `bin`.
    pub fn bin(&self, bin: MultiplicityBin) -> Option<&MultiplicityBinResult> {
        self.per_bin.iter().find(|r| r.bin == bin)
    }

    /// The integrated non-isotropic term `term`.
    pub fn term(&self, term: NonIsotropicTerm) -> Estimate {
        self.terms[term]
    }

    fn correlator_label(&self) -> String {
        if self.harmonic == 1 {
            "cos(phi1+phi2-2phi3)".to_string()
        } else {
            format!("cos[{}(phi1+phi2-2phi3)]", self.harmonic)
        }
    }
}

impl Display for MixedHarmonicsResults {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let rule = "*".repeat(55);
        writeln!(f, "{rule}")?;
        writeln!(f, "{:^55}", "Mixed Harmonics")?;
        writeln!(f)?;
        let label = self.correlator_label();
        writeln!(f, "  {} = {}", label, self.best_estimate())?;
        if let Some(correction) = self.correction {
            writeln!(f, "  measured = {}", correction.measured)?;
            writeln!(f, "  Detector Bias = {}", correction.bias)?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "  nEvts = {}, <M> = {}",
            self.n_events, self.mean_multiplicity.value
        )?;
        writeln!(f)?;
        for (term, estimate) in self.terms.iter() {
            writeln!(f, "  <{}> = {}", term.label(self.harmonic), estimate)?;
        }
        writeln!(f)?;
        for result in self.per_bin.iter().filter(|r| r.entries > 0) {
            let value = result
                .correction
                .map(|c| c.corrected)
                .unwrap_or(result.measured);
            writeln!(f, "  {:>16}: {}", result.label, value)?;
        }
        writeln!(f, "{rule}")
    }
}
