use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::QmixError;

/// The non-isotropic terms which appear in the decomposition of
/// $`\langle\langle\cos[n(\phi_1+\phi_2-2\phi_3)]\rangle\rangle`$. All of them vanish for a detector
/// with uniform azimuthal acceptance.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NonIsotropicTerm {
    /// $`\langle\cos(n\phi_1)\rangle`$
    OneParticleCos,
    /// $`\langle\sin(n\phi_1)\rangle`$
    OneParticleSin,
    /// $`\langle\cos(2n\phi_1)\rangle`$
    OneParticleCos2n,
    /// $`\langle\sin(2n\phi_1)\rangle`$
    OneParticleSin2n,
    /// $`\langle\cos[n(\phi_1+\phi_2)]\rangle`$
    TwoParticleSumCos,
    /// $`\langle\sin[n(\phi_1+\phi_2)]\rangle`$
    TwoParticleSumSin,
    /// $`\langle\cos[n(2\phi_1-\phi_2)]\rangle`$
    TwoParticleDiffCos,
    /// $`\langle\sin[n(2\phi_1-\phi_2)]\rangle`$
    TwoParticleDiffSin,
}

impl NonIsotropicTerm {
    /// Number of distinct terms.
    pub const COUNT: usize = 8;
    /// Every term, in storage order.
    pub const ALL: [NonIsotropicTerm; Self::COUNT] = [
        Self::OneParticleCos,
        Self::OneParticleSin,
        Self::OneParticleCos2n,
        Self::OneParticleSin2n,
        Self::TwoParticleSumCos,
        Self::TwoParticleSumSin,
        Self::TwoParticleDiffCos,
        Self::TwoParticleDiffSin,
    ];

    /// Position of the term in storage order.
    pub fn index(&self) -> usize {
        match self {
            Self::OneParticleCos => 0,
            Self::OneParticleSin => 1,
            Self::OneParticleCos2n => 2,
            Self::OneParticleSin2n => 3,
            Self::TwoParticleSumCos => 4,
            Self::TwoParticleSumSin => 5,
            Self::TwoParticleDiffCos => 6,
            Self::TwoParticleDiffSin => 7,
        }
    }

    /// Number of particles the term correlates.
    pub fn order(&self) -> usize {
        if self.index() < 4 {
            1
        } else {
            2
        }
    }

    /// A human-readable label with the harmonic filled in, e.g. `cos[2(phi1+phi2)]`.
    pub fn label(&self, harmonic: u32) -> String {
        let n = harmonic;
        let m = 2 * harmonic;
        match self {
            Self::OneParticleCos if n == 1 => "cos(phi1)".to_string(),
            Self::OneParticleSin if n == 1 => "sin(phi1)".to_string(),
            Self::TwoParticleSumCos if n == 1 => "cos(phi1+phi2)".to_string(),
            Self::TwoParticleSumSin if n == 1 => "sin(phi1+phi2)".to_string(),
            Self::TwoParticleDiffCos if n == 1 => "cos(2phi1-phi2)".to_string(),
            Self::TwoParticleDiffSin if n == 1 => "sin(2phi1-phi2)".to_string(),
            Self::OneParticleCos => format!("cos({n}phi1)"),
            Self::OneParticleSin => format!("sin({n}phi1)"),
            Self::OneParticleCos2n => format!("cos({m}phi1)"),
            Self::OneParticleSin2n => format!("sin({m}phi1)"),
            Self::TwoParticleSumCos => format!("cos[{n}(phi1+phi2)]"),
            Self::TwoParticleSumSin => format!("sin[{n}(phi1+phi2)]"),
            Self::TwoParticleDiffCos => format!("cos[{n}(2phi1-phi2)]"),
            Self::TwoParticleDiffSin => format!("sin[{n}(2phi1-phi2)]"),
        }
    }
}

impl Display for NonIsotropicTerm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OneParticleCos => write!(f, "cos(n*phi1)"),
            Self::OneParticleSin => write!(f, "sin(n*phi1)"),
            Self::OneParticleCos2n => write!(f, "cos(2n*phi1)"),
            Self::OneParticleSin2n => write!(f, "sin(2n*phi1)"),
            Self::TwoParticleSumCos => write!(f, "cos(n*(phi1+phi2))"),
            Self::TwoParticleSumSin => write!(f, "sin(n*(phi1+phi2))"),
            Self::TwoParticleDiffCos => write!(f, "cos(n*(2phi1-phi2))"),
            Self::TwoParticleDiffSin => write!(f, "sin(n*(2phi1-phi2))"),
        }
    }
}

impl FromStr for NonIsotropicTerm {
    type Err = QmixError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let compact: String = s
            .to_lowercase()
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '*')
            .collect();
        match compact.as_str() {
            "cos(nphi1)" | "cosn" => Ok(Self::OneParticleCos),
            "sin(nphi1)" | "sinn" => Ok(Self::OneParticleSin),
            "cos(2nphi1)" | "cos2n" => Ok(Self::OneParticleCos2n),
            "sin(2nphi1)" | "sin2n" => Ok(Self::OneParticleSin2n),
            "cos(n(phi1+phi2))" | "cosnsum" => Ok(Self::TwoParticleSumCos),
            "sin(n(phi1+phi2))" | "sinnsum" => Ok(Self::TwoParticleSumSin),
            "cos(n(2phi1-phi2))" | "cosndiff" => Ok(Self::TwoParticleDiffCos),
            "sin(n(2phi1-phi2))" | "sinndiff" => Ok(Self::TwoParticleDiffSin),
            _ => Err(QmixError::ParseError {
                name: s.to_string(),
                object: "NonIsotropicTerm".to_string(),
            }),
        }
    }
}

/// The pair-kinematic variable used to bin the differential correlator.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PairVariable {
    /// $`(p_{T,1}+p_{T,2})/2`$
    PtSum,
    /// $`|p_{T,1}-p_{T,2}|`$
    PtDiff,
}

impl PairVariable {
    /// Both variables, in storage order.
    pub const ALL: [PairVariable; 2] = [Self::PtSum, Self::PtDiff];

    /// Position of the variable in storage order.
    pub fn index(&self) -> usize {
        match self {
            Self::PtSum => 0,
            Self::PtDiff => 1,
        }
    }

    /// Evaluate the variable for a pair of transverse momenta.
    pub fn value(&self, pt1: f64, pt2: f64) -> f64 {
        match self {
            Self::PtSum => (pt1 + pt2) / 2.0,
            Self::PtDiff => (pt1 - pt2).abs(),
        }
    }
}

impl Display for PairVariable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PtSum => write!(f, "(pT1+pT2)/2"),
            Self::PtDiff => write!(f, "|pT1-pT2|"),
        }
    }
}

impl FromStr for PairVariable {
    type Err = QmixError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ptsum" | "pt sum" | "sum" | "(pt1+pt2)/2" => Ok(Self::PtSum),
            "ptdiff" | "pt diff" | "diff" | "|pt1-pt2|" => Ok(Self::PtDiff),
            _ => Err(QmixError::ParseError {
                name: s.to_string(),
                object: "PairVariable".to_string(),
            }),
        }
    }
}

/// Which leg of a particle-of-interest pair doubles as a reference particle.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PoiLeg {
    /// The outer-loop particle of the pair.
    First,
    /// The inner-loop particle of the pair.
    Second,
}

impl PoiLeg {
    /// Both legs, in storage order.
    pub const ALL: [PoiLeg; 2] = [Self::First, Self::Second];

    /// Position of the leg in storage order.
    pub fn index(&self) -> usize {
        match self {
            Self::First => 0,
            Self::Second => 1,
        }
    }
}

impl Display for PoiLeg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::First => write!(f, "1st POI"),
            Self::Second => write!(f, "2nd POI"),
        }
    }
}

/// A bin of the multiplicity axis.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MultiplicityBin {
    /// $`M < M_{\text{min}}`$
    Underflow,
    /// $`M_{\text{min}} + i\Delta M \le M < M_{\text{min}} + (i+1)\Delta M`$
    Regular(usize),
    /// $`M \ge M_{\text{min}} + N\Delta M`$
    Overflow,
}

impl MultiplicityBin {
    /// Flat position of the bin given `n_bins` regular bins: the underflow bin comes first and
    /// the overflow bin last.
    pub fn flat_index(&self, n_bins: usize) -> usize {
        match self {
            Self::Underflow => 0,
            Self::Regular(i) => i + 1,
            Self::Overflow => n_bins + 1,
        }
    }

    /// The inverse of [`MultiplicityBin::flat_index`].
    pub fn from_flat_index(index: usize, n_bins: usize) -> Self {
        if index == 0 {
            Self::Underflow
        } else if index > n_bins {
            Self::Overflow
        } else {
            Self::Regular(index - 1)
        }
    }
}

impl Display for MultiplicityBin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Underflow => write!(f, "underflow"),
            Self::Regular(i) => write!(f, "bin {i}"),
            Self::Overflow => write!(f, "overflow"),
        }
    }
}

/// The kinematic variable a detection-efficiency weight depends on.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WeightKind {
    /// Azimuthal angle
    Phi,
    /// Transverse momentum
    Pt,
    /// Pseudorapidity
    Eta,
}

impl Display for WeightKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Phi => write!(f, "phi"),
            Self::Pt => write!(f, "pt"),
            Self::Eta => write!(f, "eta"),
        }
    }
}

impl FromStr for WeightKind {
    type Err = QmixError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "phi" | "phi_weights" => Ok(Self::Phi),
            "pt" | "pt_weights" => Ok(Self::Pt),
            "eta" | "eta_weights" => Ok(Self::Eta),
            _ => Err(QmixError::ParseError {
                name: s.to_string(),
                object: "WeightKind".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn enum_displays() {
        assert_eq!(format!("{}", NonIsotropicTerm::OneParticleCos), "cos(n*phi1)");
        assert_eq!(
            format!("{}", NonIsotropicTerm::TwoParticleDiffSin),
            "sin(n*(2phi1-phi2))"
        );
        assert_eq!(format!("{}", PairVariable::PtSum), "(pT1+pT2)/2");
        assert_eq!(format!("{}", PairVariable::PtDiff), "|pT1-pT2|");
        assert_eq!(format!("{}", PoiLeg::Second), "2nd POI");
        assert_eq!(format!("{}", MultiplicityBin::Regular(3)), "bin 3");
        assert_eq!(format!("{}", WeightKind::Eta), "eta");
    }

    #[test]
    fn enum_from_str() {
        for term in NonIsotropicTerm::ALL {
            assert_eq!(
                NonIsotropicTerm::from_str(&term.to_string()).unwrap(),
                term
            );
        }
        assert_eq!(
            NonIsotropicTerm::from_str("COS2N").unwrap(),
            NonIsotropicTerm::OneParticleCos2n
        );
        assert!(NonIsotropicTerm::from_str("cos(3n*phi1)").is_err());
        assert_eq!(PairVariable::from_str("PtSum").unwrap(), PairVariable::PtSum);
        assert_eq!(PairVariable::from_str("diff").unwrap(), PairVariable::PtDiff);
        assert_eq!(WeightKind::from_str("pt_weights").unwrap(), WeightKind::Pt);
        assert!(WeightKind::from_str("rapidity").is_err());
    }

    #[test]
    fn term_indices_follow_storage_order() {
        for (i, term) in NonIsotropicTerm::ALL.iter().enumerate() {
            assert_eq!(term.index(), i);
        }
        assert_eq!(NonIsotropicTerm::OneParticleSin2n.order(), 1);
        assert_eq!(NonIsotropicTerm::TwoParticleSumCos.order(), 2);
        assert_eq!(NonIsotropicTerm::OneParticleCos.label(1), "cos(phi1)");
        assert_eq!(NonIsotropicTerm::OneParticleCos2n.label(1), "cos(2phi1)");
        assert_eq!(NonIsotropicTerm::TwoParticleSumSin.label(3), "sin[3(phi1+phi2)]");
    }

    #[test]
    fn multiplicity_bin_flat_index_roundtrip() {
        let n_bins = 10;
        assert_eq!(MultiplicityBin::Underflow.flat_index(n_bins), 0);
        assert_eq!(MultiplicityBin::Regular(0).flat_index(n_bins), 1);
        assert_eq!(MultiplicityBin::Overflow.flat_index(n_bins), 11);
        for index in 0..n_bins + 2 {
            assert_eq!(
                MultiplicityBin::from_flat_index(index, n_bins).flat_index(n_bins),
                index
            );
        }
    }
}
