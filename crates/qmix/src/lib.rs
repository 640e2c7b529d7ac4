//! `qmix` is a library for the analysis of anisotropic flow with mixed harmonics. It measures the
//! 3-particle azimuthal correlator
//! ```math
//! \langle\langle\cos[n(\phi_1+\phi_2-2\phi_3)]\rangle\rangle
//! ```
//! from event-by-event flow vectors $`Q_{n,k} = \sum_i w_i^k e^{in\phi_i}`$, without ever looping
//! over particle triplets.
//!
//! # Table of Contents
//! - [Key Features](#key-features)
//! - [Quick Start](#quick-start)
//! - [Detector Effects](#detector-effects)
//! - [Differential Correlator](#differential-correlator)
//! - [Parallel Processing](#parallel-processing)
//!
//! # Key Features
//! * The 3-particle correlator and the eight one- and two-particle non-isotropic terms, integrated
//!   and versus multiplicity, from the flow vectors in harmonics $`n`$ and $`2n`$.
//! * Correction of the measured correlator for non-uniform detector acceptance.
//! * The differential correlator $`\langle\cos[n(\psi_1+\psi_2-2\phi_3)]\rangle`$ versus
//!   $`(p_{T,1}+p_{T,2})/2`$ and $`|p_{T,1}-p_{T,2}|`$ of the pair of particles of interest.
//! * Efficient parallelism using [`rayon`](https://github.com/rayon-rs/rayon), with analyses of
//!   disjoint event samples merged exactly.
//! * Saving and reloading of the running averages to finish or merge an analysis later.
//!
//! # Quick Start
//! Events are anything implementing [`FlowEvent`], a list of [`Track`]s with kinematics and
//! reference particle / particle of interest flags. An analysis is configured with a
//! [`MixedHarmonicsConfig`], fed events, and finished:
//!
//! ```rust
//! use qmix::{MixedHarmonics, MixedHarmonicsConfig, ParticleWeights, ToyEventGenerator};
//!
//! # fn main() -> Result<(), qmix::QmixError> {
//! let config = MixedHarmonicsConfig::new().harmonic(1).print_results(false);
//! let mut analysis = MixedHarmonics::new(config, ParticleWeights::none())?;
//! let events = ToyEventGenerator::new(0)
//!     .multiplicity(50)
//!     .flow(1, 0.05)
//!     .flow(2, 0.1)
//!     .generate_many(100);
//! analysis.process_events(&events)?;
//! let results = analysis.finish()?;
//! assert_eq!(results.n_events, 100);
//! println!("{}", results);
//! # Ok(())
//! # }
//! ```
//!
//! # Detector Effects
//! For a detector with non-uniform azimuthal acceptance, products of the non-isotropic terms
//! (such as $`\langle\cos(n\phi_1)\rangle`$ or $`\langle\cos[n(2\phi_1-\phi_2)]\rangle`$) leak into
//! the measured correlator. With
//! [`correct_for_detector_effects`](MixedHarmonicsConfig::correct_for_detector_effects) enabled
//! (the default), [`MixedHarmonics::finish`] subtracts them, integrated and in every
//! multiplicity bin, and reports the ratio of corrected to measured value as the detector bias.
//!
//! # Differential Correlator
//! With [`evaluate_differential`](MixedHarmonicsConfig::evaluate_differential), every ordered pair
//! of distinct particles of interest is correlated with the flow vector $`Q_{2n}`$ of the
//! reference particles. Pairs in which a particle of interest is also a reference particle are
//! handled so that no particle is correlated with itself. Use
//! [`opposite_charges_poi`](MixedHarmonicsConfig::opposite_charges_poi) to restrict the pairs to
//! opposite charges.
//!
//! # Parallel Processing
//! With the default `rayon` feature, [`MixedHarmonics::process_events`] splits the events among
//! worker-local analyses and merges them. Analyses run elsewhere (for instance on separate
//! machines, written with [`MixedHarmonics::save_as`]) can be combined with
//! [`MixedHarmonics::merge`] or [`MixedHarmonics::merge_all`].
#![warn(clippy::perf, clippy::style)]

pub use qmix_core::{
    accumulator, analysis, config, corrector, data, differential, profile, reducer, utils,
    weights,
};
pub use qmix_core::{
    Binning, BiasCorrection, CorrectedCorrelators, CorrelatorAggregates, DetectorBiasCorrector,
    DifferentialCorrelator, DifferentialResults, Estimate, EventAccumulator, EventData,
    EventMoments, EventPhase, FlowEvent, FlowVectors, MixedHarmonics, MixedHarmonicsConfig,
    MixedHarmonicsResults, MultiplicityBin, MultiplicityBinResult, MultiplicityBinning,
    NonIsotropicTerm, PairVariable, ParticleWeights, PoiLeg, QmixError, QmixResult, TermArray,
    ToyEventGenerator, Track, WeightKind, WeightTable,
};

/// Useful traits for all crate structs
pub mod traits {
    pub use qmix_core::traits::*;
}
