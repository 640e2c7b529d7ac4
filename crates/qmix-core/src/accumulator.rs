use std::fmt::Display;

use num::complex::Complex64;

use crate::{
    config::{Binning, MixedHarmonicsConfig},
    data::{FlowEvent, Track},
    profile::Profile1D,
    utils::enums::{PairVariable, PoiLeg},
    weights::ParticleWeights,
    QmixError, QmixResult,
};

/// Number of harmonics kept in the flow vectors ($`n`$ and $`2n`$).
pub const N_HARMONICS: usize = 2;
/// Number of weight powers kept in the flow vectors and weight sums ($`k = 0..3`$).
pub const N_POWERS: usize = 4;

/// The flow vectors $`Q_{mn,k} = \sum_i w_i^k e^{imn\phi_i}`$ of a single event for $`m \in \{1, 2\}`$
/// and $`k \in \{0, 1, 2, 3\}`$.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct FlowVectors {
    q: [[Complex64; N_POWERS]; N_HARMONICS],
}

impl FlowVectors {
    /// Add a particle at azimuth `phi` with weight `weight` for the base harmonic `harmonic`.
    pub fn add(&mut self, phi: f64, weight: f64, harmonic: u32) {
        for (m, row) in self.q.iter_mut().enumerate() {
            let phase = Complex64::from_polar(1.0, ((m + 1) as f64) * harmonic as f64 * phi);
            let mut wk = 1.0;
            for q in row.iter_mut() {
                *q += phase * wk;
                wk *= weight;
            }
        }
    }

    /// $`Q_{(m+1)n,k}`$
    pub fn get(&self, m: usize, k: usize) -> Complex64 {
        self.q[m][k]
    }

    /// The unweighted flow vector in harmonic $`n`$.
    pub fn q1n(&self) -> Complex64 {
        self.q[0][0]
    }

    /// The unweighted flow vector in harmonic $`2n`$.
    pub fn q2n(&self) -> Complex64 {
        self.q[1][0]
    }
}

/// The per-event sums $`\sum_i w_i^k`$ collected while tracks are added.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct WeightSums {
    sums: [f64; N_POWERS],
}

impl WeightSums {
    /// Add a particle with weight `weight`.
    pub fn add(&mut self, weight: f64) {
        let mut wk = 1.0;
        for sum in self.sums.iter_mut() {
            *sum += wk;
            wk *= weight;
        }
    }

    /// $`\sum_i w_i^k`$
    pub fn get(&self, k: usize) -> f64 {
        self.sums[k]
    }

    /// Raise the sums to their powers, $`S_{p,k} = (\sum_i w_i^k)^{p+1}`$.
    pub fn powers(&self) -> MultiplicityPowers {
        let mut s = [[0.0; N_POWERS]; N_POWERS];
        for (p, row) in s.iter_mut().enumerate() {
            for (k, value) in row.iter_mut().enumerate() {
                *value = self.sums[k].powi(p as i32 + 1);
            }
        }
        MultiplicityPowers { s }
    }
}

/// The finalized multiplicity power table $`S_{p,k} = (\sum_i w_i^k)^{p+1}`$, $`p, k \in \{0..3\}`$.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct MultiplicityPowers {
    s: [[f64; N_POWERS]; N_POWERS],
}

impl MultiplicityPowers {
    /// $`S_{p,k}`$
    pub fn get(&self, p: usize, k: usize) -> f64 {
        self.s[p][k]
    }

    /// The number of reference particles, $`M = S_{0,0}`$.
    pub fn multiplicity(&self) -> f64 {
        self.s[0][0]
    }
}

/// Everything the reducers read from a finished event.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct EventMoments {
    harmonic: u32,
    q: FlowVectors,
    powers: MultiplicityPowers,
}

impl EventMoments {
    /// Build moments directly from flow vectors and power sums.
    pub fn new(harmonic: u32, q: FlowVectors, powers: MultiplicityPowers) -> Self {
        Self {
            harmonic,
            q,
            powers,
        }
    }
    /// The base harmonic $`n`$.
    pub fn harmonic(&self) -> u32 {
        self.harmonic
    }
    /// The flow vectors.
    pub fn flow_vectors(&self) -> &FlowVectors {
        &self.q
    }
    /// The finalized power sums.
    pub fn powers(&self) -> &MultiplicityPowers {
        &self.powers
    }
    /// $`M = S_{0,0}`$
    pub fn multiplicity(&self) -> f64 {
        self.powers.multiplicity()
    }
    /// Unweighted $`Q_n`$.
    pub fn q1n(&self) -> Complex64 {
        self.q.q1n()
    }
    /// Unweighted $`Q_{2n}`$.
    pub fn q2n(&self) -> Complex64 {
        self.q.q2n()
    }
}

/// Per-event profiles of pairs of particles of interest, binned in
/// $`(p_{T,1}+p_{T,2})/2`$ and $`|p_{T,1}-p_{T,2}|`$.
///
/// For every pair, $`\cos[n(\psi_1+\psi_2)]`$ and $`\sin[n(\psi_1+\psi_2)]`$ are recorded. When a
/// leg of the pair is also a reference particle, $`\cos[n(\psi_1-\psi_2)]`$ goes into the overlap
/// profile of that leg.
#[derive(Clone, Debug, PartialEq)]
pub struct PairProfiles {
    re: [Profile1D; 2],
    im: [Profile1D; 2],
    overlap: [[Profile1D; 2]; 2],
    n_outside: u64,
}

impl PairProfiles {
    /// Empty profiles over the transverse momentum binning `binning`.
    pub fn new(binning: Binning) -> Self {
        let profile = || Profile1D::new(binning);
        Self {
            re: [profile(), profile()],
            im: [profile(), profile()],
            overlap: [[profile(), profile()], [profile(), profile()]],
            n_outside: 0,
        }
    }

    /// Record the ordered pair (`first`, `second`).
    pub fn fill(&mut self, first: &Track, second: &Track, harmonic: u32) {
        let n = harmonic as f64;
        let (sin_sum, cos_sum) = (n * (first.phi + second.phi)).sin_cos();
        let cos_diff = (n * (first.phi - second.phi)).cos();
        for variable in PairVariable::ALL {
            let v = variable.index();
            let x = variable.value(first.pt, second.pt);
            if !self.re[v].fill(x, cos_sum, 1.0) {
                self.n_outside += 1;
                continue;
            }
            self.im[v].fill(x, sin_sum, 1.0);
            if first.is_rp {
                self.overlap[PoiLeg::First.index()][v].fill(x, cos_diff, 1.0);
            }
            if second.is_rp {
                self.overlap[PoiLeg::Second.index()][v].fill(x, cos_diff, 1.0);
            }
        }
    }

    /// Profile of $`\cos[n(\psi_1+\psi_2)]`$.
    pub fn re(&self, variable: PairVariable) -> &Profile1D {
        &self.re[variable.index()]
    }

    /// Profile of $`\sin[n(\psi_1+\psi_2)]`$.
    pub fn im(&self, variable: PairVariable) -> &Profile1D {
        &self.im[variable.index()]
    }

    /// Profile of $`\cos[n(\psi_1-\psi_2)]`$ for pairs whose `leg` is also a reference particle.
    pub fn overlap(&self, leg: PoiLeg, variable: PairVariable) -> &Profile1D {
        &self.overlap[leg.index()][variable.index()]
    }

    /// Number of pair fills which fell outside of the transverse momentum binning.
    pub fn n_outside(&self) -> u64 {
        self.n_outside
    }

    /// Empty every profile.
    pub fn reset(&mut self) {
        self.re.iter_mut().for_each(Profile1D::reset);
        self.im.iter_mut().for_each(Profile1D::reset);
        self.overlap
            .iter_mut()
            .flatten()
            .for_each(Profile1D::reset);
        self.n_outside = 0;
    }
}

/// Where the accumulator is in the cycle of a single event.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EventPhase {
    /// Nothing accumulated since the last reset
    Idle,
    /// Tracks are being added
    Accumulating,
    /// The power sums have been computed and the moments may be read
    Finalized,
}

impl Display for EventPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Accumulating => write!(f, "accumulating"),
            Self::Finalized => write!(f, "finalized"),
        }
    }
}

/// The result of [`EventAccumulator::finalize`].
#[derive(Debug)]
pub struct FinalizedEvent<'a> {
    /// Flow vectors and power sums of the event
    pub moments: EventMoments,
    /// Pair profiles of the event (empty unless the differential correlator is evaluated)
    pub pairs: &'a PairProfiles,
}

/// Collects the flow vectors, weight sums and pair profiles of one event at a time.
///
/// The cycle is [`accumulate`](EventAccumulator::accumulate) (or repeated
/// [`add_track`](EventAccumulator::add_track)), then [`finalize`](EventAccumulator::finalize)
/// exactly once, then [`reset`](EventAccumulator::reset) before the next event. Calls out of
/// order return [`QmixError::PhaseViolation`].
#[derive(Clone, Debug)]
pub struct EventAccumulator {
    harmonic: u32,
    q: FlowVectors,
    sums: WeightSums,
    powers: MultiplicityPowers,
    pairs: PairProfiles,
    phase: EventPhase,
}

impl EventAccumulator {
    /// An idle accumulator for the harmonic and transverse momentum binning of `config`.
    pub fn new(config: &MixedHarmonicsConfig) -> Self {
        Self {
            harmonic: config.harmonic,
            q: FlowVectors::default(),
            sums: WeightSums::default(),
            powers: MultiplicityPowers::default(),
            pairs: PairProfiles::new(config.pt),
            phase: EventPhase::Idle,
        }
    }

    /// The current phase.
    pub fn phase(&self) -> EventPhase {
        self.phase
    }

    fn ensure_open(&self, method: &str) -> QmixResult<()> {
        if self.phase == EventPhase::Finalized {
            return Err(QmixError::PhaseViolation {
                method: method.to_string(),
                expected: "idle or accumulating".to_string(),
                found: self.phase.to_string(),
            });
        }
        Ok(())
    }

    /// Add the reference-particle contribution of `track` with the given weight. Tracks which are
    /// not reference particles are ignored.
    pub fn add_track(&mut self, track: &Track, weight: f64) -> QmixResult<()> {
        self.ensure_open("EventAccumulator::add_track")?;
        self.phase = EventPhase::Accumulating;
        if track.is_rp {
            self.q.add(track.phi, weight, self.harmonic);
            self.sums.add(weight);
        }
        Ok(())
    }

    /// Run over every track of `event`: reference particles feed the flow vectors, and when the
    /// differential correlator is switched on every ordered pair of distinct particles of
    /// interest feeds the pair profiles.
    pub fn accumulate<E: FlowEvent + ?Sized>(
        &mut self,
        event: &E,
        weights: &ParticleWeights,
        config: &MixedHarmonicsConfig,
    ) -> QmixResult<()> {
        self.ensure_open("EventAccumulator::accumulate")?;
        self.phase = EventPhase::Accumulating;
        let tracks = event.tracks();
        for (i, first) in tracks.iter().enumerate() {
            if !first.is_selected() {
                continue;
            }
            if first.is_rp {
                self.add_track(first, weights.weight(first, config))?;
            }
            if !(config.evaluate_differential && first.is_poi) {
                continue;
            }
            for (j, second) in tracks.iter().enumerate() {
                if j == i || !second.is_poi {
                    continue;
                }
                if config.opposite_charges_poi && first.charge == second.charge {
                    continue;
                }
                self.pairs.fill(first, second, self.harmonic);
            }
        }
        Ok(())
    }

    /// Compute the power sums of the event. This may happen only once per event.
    pub fn finalize(&mut self) -> QmixResult<FinalizedEvent<'_>> {
        self.ensure_open("EventAccumulator::finalize")?;
        self.powers = self.sums.powers();
        self.phase = EventPhase::Finalized;
        Ok(FinalizedEvent {
            moments: EventMoments::new(self.harmonic, self.q, self.powers),
            pairs: &self.pairs,
        })
    }

    /// The moments of the finalized event.
    pub fn moments(&self) -> QmixResult<EventMoments> {
        if self.phase != EventPhase::Finalized {
            return Err(QmixError::PhaseViolation {
                method: "EventAccumulator::moments".to_string(),
                expected: EventPhase::Finalized.to_string(),
                found: self.phase.to_string(),
            });
        }
        Ok(EventMoments::new(self.harmonic, self.q, self.powers))
    }

    /// The pair profiles of the current event.
    pub fn pairs(&self) -> &PairProfiles {
        &self.pairs
    }

    /// Zero every per-event quantity and return to [`EventPhase::Idle`].
    pub fn reset(&mut self) {
        self.q = FlowVectors::default();
        self.sums = WeightSums::default();
        self.powers = MultiplicityPowers::default();
        self.pairs.reset();
        self.phase = EventPhase::Idle;
    }
}
