use std::{
    f64::consts::{FRAC_PI_2, PI, TAU},
    fmt::Display,
};

use serde::{Deserialize, Serialize};

/// A single reconstructed particle as seen by the flow analysis.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// Azimuthal angle in the laboratory frame (radians, `[0, 2π)`)
    pub phi: f64,
    /// Transverse momentum
    pub pt: f64,
    /// Pseudorapidity
    pub eta: f64,
    /// Electric charge
    pub charge: i32,
    /// Whether the track is used to build the flow vectors (a reference particle)
    pub is_rp: bool,
    /// Whether the track is a particle of interest
    pub is_poi: bool,
}

impl Track {
    /// A reference particle at azimuth `phi` with unit charge and no other kinematics.
    pub fn rp(phi: f64) -> Self {
        Self {
            phi,
            charge: 1,
            is_rp: true,
            ..Default::default()
        }
    }

    /// A particle of interest at azimuth `phi` with the given `pt` and `charge`.
    pub fn poi(phi: f64, pt: f64, charge: i32) -> Self {
        Self {
            phi,
            pt,
            charge,
            is_poi: true,
            ..Default::default()
        }
    }

    /// Flag this track as a reference particle as well.
    pub fn also_rp(mut self) -> Self {
        self.is_rp = true;
        self
    }

    /// Flag this track as a particle of interest as well.
    pub fn also_poi(mut self) -> Self {
        self.is_poi = true;
        self
    }

    /// Whether the track takes part in the analysis at all.
    pub fn is_selected(&self) -> bool {
        self.is_rp || self.is_poi
    }
}

impl Display for Track {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let flags = match (self.is_rp, self.is_poi) {
            (true, true) => "RP+POI",
            (true, false) => "RP",
            (false, true) => "POI",
            (false, false) => "-",
        };
        write!(
            f,
            "[φ = {:.4}, pT = {:.4}, η = {:.4}, q = {:+}, {}]",
            self.phi, self.pt, self.eta, self.charge, flags
        )
    }
}

/// Anything which can hand the analysis an ordered list of tracks.
pub trait FlowEvent {
    /// The tracks of the event in their original order.
    fn tracks(&self) -> &[Track];

    /// The number of reference particles in the event. This count decides whether the
    /// 3-particle correlator and the differential correlator are evaluated.
    fn n_reference_particles(&self) -> usize {
        self.tracks().iter().filter(|t| t.is_rp).count()
    }
}

/// A simple owned event.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EventData {
    /// The tracks of the event
    pub tracks: Vec<Track>,
}

impl EventData {
    /// Construct a new [`EventData`] from a list of tracks.
    pub fn new(tracks: Vec<Track>) -> Self {
        Self { tracks }
    }

    /// An event of unit-weight reference particles at the given angles.
    pub fn from_rp_angles<T: AsRef<[f64]>>(angles: T) -> Self {
        Self::new(angles.as_ref().iter().map(|phi| Track::rp(*phi)).collect())
    }

    /// Number of tracks in the event.
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    /// Whether the event has no tracks.
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

impl FlowEvent for EventData {
    fn tracks(&self) -> &[Track] {
        &self.tracks
    }
}

impl Display for EventData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Event:")?;
        writeln!(f, "  tracks:")?;
        for track in &self.tracks {
            writeln!(f, "    {}", track)?;
        }
        writeln!(f, "  reference particles: {}", self.n_reference_particles())?;
        Ok(())
    }
}

/// An event which can be used to test the analysis. It contains four reference particles
/// spaced by π/2 in azimuth, two of which are also particles of interest with opposite
/// charges, plus one pure particle of interest.
pub fn test_event() -> EventData {
    EventData::new(vec![
        Track {
            phi: 0.0,
            pt: 0.45,
            eta: -0.31,
            charge: 1,
            is_rp: true,
            is_poi: true,
        },
        Track {
            phi: FRAC_PI_2,
            pt: 1.12,
            eta: 0.52,
            charge: -1,
            is_rp: true,
            is_poi: true,
        },
        Track {
            phi: PI,
            pt: 0.78,
            eta: 0.07,
            charge: 1,
            is_rp: true,
            is_poi: false,
        },
        Track {
            phi: 3.0 * FRAC_PI_2,
            pt: 2.35,
            eta: -0.84,
            charge: -1,
            is_rp: true,
            is_poi: false,
        },
        Track {
            phi: 0.4,
            pt: 1.61,
            eta: 0.29,
            charge: -1,
            is_rp: false,
            is_poi: true,
        },
    ])
}

/// A seeded generator of toy events with anisotropic flow.
///
/// Azimuthal angles follow $`1 + 2\sum_n v_n\cos[n(\phi-\Psi)]`$ relative to a random symmetry
/// plane $`\Psi`$ drawn once per event. Transverse momenta follow an exponential spectrum,
/// pseudorapidities are uniform.
///
/// ```rust
/// use qmix_core::{FlowEvent, ToyEventGenerator};
///
/// let mut generator = ToyEventGenerator::new(0).multiplicity(50).flow(2, 0.1);
/// let event = generator.generate();
/// assert_eq!(event.tracks().len(), 50);
/// ```
#[derive(Clone, Debug)]
pub struct ToyEventGenerator {
    rng: fastrand::Rng,
    multiplicity: usize,
    flow: Vec<(u32, f64)>,
    mean_pt: f64,
    eta_range: (f64, f64),
    rp_fraction: f64,
    poi_fraction: f64,
}

impl ToyEventGenerator {
    /// A generator of isotropic events with 100 tracks, all of them reference particles and
    /// half of them particles of interest.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: fastrand::Rng::with_seed(seed),
            multiplicity: 100,
            flow: Vec::new(),
            mean_pt: 0.5,
            eta_range: (-0.8, 0.8),
            rp_fraction: 1.0,
            poi_fraction: 0.5,
        }
    }
    /// Set the number of tracks per event.
    pub fn multiplicity(mut self, multiplicity: usize) -> Self {
        self.multiplicity = multiplicity;
        self
    }
    /// Add a flow harmonic `harmonic` with coefficient `v`.
    pub fn flow(mut self, harmonic: u32, v: f64) -> Self {
        self.flow.push((harmonic, v));
        self
    }
    /// Set the mean of the exponential transverse momentum spectrum.
    pub fn mean_pt(mut self, mean_pt: f64) -> Self {
        self.mean_pt = mean_pt;
        self
    }
    /// Set the pseudorapidity range.
    pub fn eta_range(mut self, min: f64, max: f64) -> Self {
        self.eta_range = (min, max);
        self
    }
    /// Set the probability for a track to be a reference particle.
    pub fn rp_fraction(mut self, fraction: f64) -> Self {
        self.rp_fraction = fraction;
        self
    }
    /// Set the probability for a track to be a particle of interest.
    pub fn poi_fraction(mut self, fraction: f64) -> Self {
        self.poi_fraction = fraction;
        self
    }

    fn sample_phi(&mut self, psi: f64) -> f64 {
        let max = 1.0 + 2.0 * self.flow.iter().map(|(_, v)| v.abs()).sum::<f64>();
        loop {
            let phi = TAU * self.rng.f64();
            let density = 1.0
                + 2.0
                    * self
                        .flow
                        .iter()
                        .map(|(n, v)| v * (*n as f64 * (phi - psi)).cos())
                        .sum::<f64>();
            if max * self.rng.f64() <= density {
                return phi;
            }
        }
    }

    /// Generate a single event.
    pub fn generate(&mut self) -> EventData {
        let psi = TAU * self.rng.f64();
        let tracks = (0..self.multiplicity)
            .map(|_| {
                let phi = self.sample_phi(psi);
                let pt = -self.mean_pt * (1.0 - self.rng.f64()).ln();
                let eta = self.eta_range.0 + (self.eta_range.1 - self.eta_range.0) * self.rng.f64();
                let charge = if self.rng.bool() { 1 } else { -1 };
                let is_rp = self.rng.f64() < self.rp_fraction;
                let is_poi = self.rng.f64() < self.poi_fraction;
                Track {
                    phi,
                    pt,
                    eta,
                    charge,
                    is_rp,
                    is_poi,
                }
            })
            .collect();
        EventData::new(tracks)
    }

    /// Generate `n_events` events.
    pub fn generate_many(&mut self, n_events: usize) -> Vec<EventData> {
        (0..n_events).map(|_| self.generate()).collect()
    }
}
