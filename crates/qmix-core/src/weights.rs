use serde::{Deserialize, Serialize};

use crate::{
    config::{Binning, MixedHarmonicsConfig},
    data::Track,
    utils::enums::WeightKind,
    QmixError, QmixResult,
};

/// Largest allowed difference between the bin width or lower edge of a weight table and the
/// configured one.
pub const BINNING_TOLERANCE: f64 = 1e-6;

/// A table of per-bin multiplicative detection-efficiency weights.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WeightTable {
    binning: Binning,
    values: Vec<f64>,
}

impl WeightTable {
    /// Construct a new [`WeightTable`]. The number of values must match the number of bins.
    pub fn new(binning: Binning, values: Vec<f64>) -> QmixResult<Self> {
        if values.len() != binning.n_bins {
            return Err(QmixError::InvalidConfig {
                field: "weights".to_string(),
                reason: format!(
                    "a table with {} bins needs {} values, got {}",
                    binning.n_bins,
                    binning.n_bins,
                    values.len()
                ),
            });
        }
        Ok(Self { binning, values })
    }

    /// A table with every weight equal to one.
    pub fn uniform(binning: Binning) -> Self {
        Self {
            binning,
            values: vec![1.0; binning.n_bins],
        }
    }

    /// The binning of the table.
    pub fn binning(&self) -> &Binning {
        &self.binning
    }

    /// The weight of the bin containing `value`, if `value` is inside the table.
    pub fn lookup(&self, value: f64) -> Option<f64> {
        self.binning.index(value).map(|index| self.values[index])
    }
}

/// The optional phi, pt and eta weight tables.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ParticleWeights {
    /// Weights as a function of azimuthal angle
    pub phi: Option<WeightTable>,
    /// Weights as a function of transverse momentum
    pub pt: Option<WeightTable>,
    /// Weights as a function of pseudorapidity
    pub eta: Option<WeightTable>,
}

impl ParticleWeights {
    /// No weight tables at all.
    pub fn none() -> Self {
        Self::default()
    }
    /// Set the phi weights.
    pub fn with_phi(mut self, table: WeightTable) -> Self {
        self.phi = Some(table);
        self
    }
    /// Set the pt weights.
    pub fn with_pt(mut self, table: WeightTable) -> Self {
        self.pt = Some(table);
        self
    }
    /// Set the eta weights.
    pub fn with_eta(mut self, table: WeightTable) -> Self {
        self.eta = Some(table);
        self
    }

    fn table(&self, kind: WeightKind) -> Option<&WeightTable> {
        match kind {
            WeightKind::Phi => self.phi.as_ref(),
            WeightKind::Pt => self.pt.as_ref(),
            WeightKind::Eta => self.eta.as_ref(),
        }
    }

    fn enabled(kind: WeightKind, config: &MixedHarmonicsConfig) -> bool {
        match kind {
            WeightKind::Phi => config.use_phi_weights,
            WeightKind::Pt => config.use_pt_weights,
            WeightKind::Eta => config.use_eta_weights,
        }
    }

    fn configured_binning(kind: WeightKind, config: &MixedHarmonicsConfig) -> &Binning {
        match kind {
            WeightKind::Phi => &config.phi,
            WeightKind::Pt => &config.pt,
            WeightKind::Eta => &config.eta,
        }
    }

    /// Check that every enabled weight table is present and binned like the configuration: same
    /// bin width and same lower edge, up to [`BINNING_TOLERANCE`]. The number of bins may differ.
    /// `method` names the caller in the returned error.
    pub fn validate(&self, config: &MixedHarmonicsConfig, method: &str) -> QmixResult<()> {
        for kind in [WeightKind::Phi, WeightKind::Pt, WeightKind::Eta] {
            if !Self::enabled(kind, config) {
                continue;
            }
            let table = self
                .table(kind)
                .ok_or_else(|| QmixError::MissingWeightTable {
                    kind,
                    method: method.to_string(),
                })?;
            let configured = Self::configured_binning(kind, config);
            for (quantity, expected, found) in [
                ("bin width", configured.width(), table.binning.width()),
                ("lower edge", configured.min, table.binning.min),
            ] {
                if (expected - found).abs() > BINNING_TOLERANCE {
                    return Err(QmixError::InconsistentBinning {
                        kind,
                        quantity: quantity.to_string(),
                        expected,
                        found,
                    });
                }
            }
        }
        Ok(())
    }

    /// The combined weight $`w_\phi w_{p_T} w_\eta`$ of `track`. Each factor is one when its
    /// table is switched off, absent, or does not cover the track.
    pub fn weight(&self, track: &Track, config: &MixedHarmonicsConfig) -> f64 {
        [
            (WeightKind::Phi, track.phi),
            (WeightKind::Pt, track.pt),
            (WeightKind::Eta, track.eta),
        ]
        .into_iter()
        .filter(|(kind, _)| Self::enabled(*kind, config))
        .filter_map(|(kind, value)| self.table(kind).and_then(|table| table.lookup(value)))
        .product()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn pt_table() -> WeightTable {
        WeightTable::new(
            Binning::new(100, 0.0, 10.0),
            (0..100).map(|i| 1.0 + i as f64 / 100.0).collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_weights_disabled_are_unity() {
        let config = MixedHarmonicsConfig::default();
        let weights = ParticleWeights::none().with_pt(pt_table());
        let track = Track::poi(0.3, 2.05, 1);
        assert_relative_eq!(weights.weight(&track, &config), 1.0);
    }

    #[test]
    fn test_weight_lookup() {
        let config = MixedHarmonicsConfig::default().use_pt_weights(true);
        let weights = ParticleWeights::none().with_pt(pt_table());
        assert_relative_eq!(weights.weight(&Track::poi(0.3, 2.05, 1), &config), 1.2);
        assert_relative_eq!(weights.weight(&Track::poi(0.3, 10.5, 1), &config), 1.0);
        let config = config.use_phi_weights(true);
        let weights = weights.with_phi(
            WeightTable::new(Binning::new(72, 0.0, std::f64::consts::TAU), vec![0.5; 72]).unwrap(),
        );
        assert_relative_eq!(weights.weight(&Track::poi(0.3, 2.05, 1), &config), 0.6);
    }

    #[test]
    fn test_missing_table() {
        let config = MixedHarmonicsConfig::default().use_eta_weights(true);
        let result = ParticleWeights::none().validate(&config, "MixedHarmonics::new");
        assert!(matches!(
            result,
            Err(QmixError::MissingWeightTable { kind: WeightKind::Eta, method })
                if method == "MixedHarmonics::new"
        ));
    }

    #[test]
    fn test_inconsistent_binning() {
        let config = MixedHarmonicsConfig::default().use_pt_weights(true);
        let weights =
            ParticleWeights::none().with_pt(WeightTable::uniform(Binning::new(50, 0.0, 10.0)));
        assert!(matches!(
            weights.validate(&config, "test"),
            Err(QmixError::InconsistentBinning {
                kind: WeightKind::Pt,
                ..
            })
        ));
        let weights = ParticleWeights::none().with_pt(pt_table());
        assert!(weights.validate(&config, "test").is_ok());
    }

    #[test]
    fn test_shifted_table_is_inconsistent() {
        let config = MixedHarmonicsConfig::default().use_pt_weights(true);
        let shifted = WeightTable::uniform(Binning::new(100, 0.05, 10.05));
        assert!(matches!(
            ParticleWeights::none().with_pt(shifted).validate(&config, "test"),
            Err(QmixError::InconsistentBinning { kind: WeightKind::Pt, quantity, .. })
                if quantity == "lower edge"
        ));
        // a shorter table over the same bins is fine
        let shorter = WeightTable::uniform(Binning::new(50, 0.0, 5.0));
        assert!(ParticleWeights::none()
            .with_pt(shorter)
            .validate(&config, "test")
            .is_ok());
    }

    #[test]
    fn test_table_size_checked() {
        assert!(WeightTable::new(Binning::new(3, 0.0, 1.0), vec![1.0; 2]).is_err());
    }
}
