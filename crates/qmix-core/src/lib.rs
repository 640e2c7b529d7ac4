//! # qmix-core
//!
//! This is an internal crate used by `qmix`.
#![warn(clippy::perf, clippy::style)]
#![allow(clippy::excessive_precision)]

use thiserror::Error;

/// Event-by-event flow vectors $`Q_{n,k}`$ and multiplicity power sums $`S_{p,k}`$.
pub mod accumulator;
/// The [`MixedHarmonics`] driver which ties every stage of the analysis together.
pub mod analysis;
/// Analysis settings.
pub mod config;
/// Correction of the measured 3-particle correlator for non-uniform acceptance.
pub mod corrector;
/// Tracks, events, and a toy event generator.
pub mod data;
/// The differential correlator $`\langle\cos[n(\psi_1+\psi_2-2\phi_3)]\rangle`$.
pub mod differential;
/// Weighted running averages ("profiles").
pub mod profile;
/// Reduction of flow vectors into multi-particle correlators.
pub mod reducer;
/// Utility functions and enums.
pub mod utils;
/// Detection-efficiency weights.
pub mod weights;
/// Useful traits for all crate structs
pub mod traits {
    pub use crate::data::FlowEvent;
}

pub use crate::accumulator::{
    EventAccumulator, EventMoments, EventPhase, FinalizedEvent, FlowVectors, MultiplicityPowers,
    PairProfiles, WeightSums,
};
pub use crate::analysis::{MixedHarmonics, MixedHarmonicsResults, MultiplicityBinResult};
pub use crate::config::{Binning, MixedHarmonicsConfig, MultiplicityBinning};
pub use crate::corrector::{correct, BiasCorrection, CorrectedCorrelators, DetectorBiasCorrector};
pub use crate::data::{EventData, FlowEvent, ToyEventGenerator, Track};
pub use crate::differential::{DifferentialCorrelator, DifferentialResults};
pub use crate::profile::{Estimate, MultiplicityProfile, Profile1D, ProfileBin};
pub use crate::reducer::{
    non_isotropic_terms, three_particle_correlator, CorrelatorAggregates, TermArray,
};
pub use crate::utils::enums::{
    MultiplicityBin, NonIsotropicTerm, PairVariable, PoiLeg, WeightKind,
};
pub use crate::weights::{ParticleWeights, WeightTable};

/// The [`Result`] type returned by fallible `qmix` methods.
pub type QmixResult<T> = Result<T, QmixError>;

/// The error type used by all `qmix` internal methods
#[derive(Error, Debug)]
pub enum QmixError {
    /// An alias for [`std::io::Error`].
    #[error("IO Error: {0}")]
    IOError(#[from] std::io::Error),
    /// An alias for [`shellexpand::LookupError`].
    #[error("Failed to expand path: {0}")]
    LookupError(#[from] shellexpand::LookupError<std::env::VarError>),
    /// An error returned by the Rust encoder
    #[error("Encoder error: {0}")]
    EncodeError(#[from] bincode::error::EncodeError),
    /// An error returned by the Rust decoder
    #[error("Decoder error: {0}")]
    DecodeError(#[from] bincode::error::DecodeError),
    /// An analysis setting which makes no sense (checked before any event is processed).
    #[error("Invalid setting \"{field}\": {reason}")]
    InvalidConfig {
        /// Name of the offending setting
        field: String,
        /// Why the value was rejected
        reason: String,
    },
    /// A weight table was requested in the settings but never provided.
    #[error("{kind} weights are enabled but no {kind} weight table was given (checked in {method})")]
    MissingWeightTable {
        /// Which table is missing
        kind: WeightKind,
        /// The method which performed the check
        method: String,
    },
    /// A weight table whose binning differs from the configured binning.
    #[error("Inconsistent binning for {kind} weights: expected {quantity} {expected}, found {found}")]
    InconsistentBinning {
        /// Which table is inconsistent
        kind: WeightKind,
        /// The compared quantity, `bin width` or `lower edge`
        quantity: String,
        /// Configured value
        expected: f64,
        /// Value of the supplied table
        found: f64,
    },
    /// A per-event operation was called in the wrong phase of the event cycle.
    #[error("{method} cannot run while the event is {found} (expected {expected})")]
    PhaseViolation {
        /// The method which was called
        method: String,
        /// Phase(s) in which the call is allowed
        expected: String,
        /// Phase the accumulator was actually in
        found: String,
    },
    /// A required aggregate is missing from the analysis state.
    #[error("Required aggregate \"{name}\" is missing (checked in {method})")]
    MissingAggregate {
        /// Name of the aggregate
        name: String,
        /// The method which performed the check
        method: String,
    },
    /// A computation branch which has not been implemented yet.
    #[error("{method}: calculation with particle weights is not implemented yet")]
    Unsupported {
        /// The method which hit the unimplemented branch
        method: String,
    },
    /// Two analyses which cannot be combined.
    #[error("Cannot merge analyses: {reason}")]
    IncompatibleMerge {
        /// Description of the mismatch
        reason: String,
    },
    /// An error which occurs when the user tries to parse an invalid string of text, typically
    /// into an enum variant.
    #[error("Failed to parse string: \"{name}\" does not correspond to a valid \"{object}\"!")]
    ParseError {
        /// The string which was parsed
        name: String,
        /// The name of the object it failed to parse into
        object: String,
    },
}
