use std::fmt::Display;

use accurate::{sum::Klein, traits::*};
use auto_ops::impl_op_ex;
use serde::{Deserialize, Serialize};

use crate::{
    config::{Binning, MultiplicityBinning},
    utils::enums::MultiplicityBin,
    QmixError, QmixResult,
};

/// A value with its statistical uncertainty.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Estimate {
    /// Central value
    pub value: f64,
    /// Statistical error
    pub error: f64,
}

impl Estimate {
    /// Construct a new [`Estimate`].
    pub fn new(value: f64, error: f64) -> Self {
        Self { value, error }
    }
}

impl Display for Estimate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} +/- {}", self.value, self.error)
    }
}

/// A weighted running average of some quantity $`y`$.
///
/// Every fill with value $`y`$ and weight $`w`$ updates $`\sum w`$, $`\sum wy`$, $`\sum wy^2`$ and
/// $`\sum w^2`$. The mean is $`\sum wy / \sum w`$ and the error is the error on the mean,
/// $`\sigma / \sqrt{N_{\text{eff}}}`$ with $`N_{\text{eff}} = (\sum w)^2 / \sum w^2`$.
///
/// Since only sums are stored, two bins filled independently can be combined exactly with `+`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileBin {
    sum_w: f64,
    sum_wy: f64,
    sum_wy2: f64,
    sum_w2: f64,
    entries: u64,
}

impl ProfileBin {
    /// Add the value `y` with weight `w`.
    pub fn fill(&mut self, y: f64, w: f64) {
        self.sum_w += w;
        self.sum_wy += w * y;
        self.sum_wy2 += w * y * y;
        self.sum_w2 += w * w;
        self.entries += 1;
    }

    /// The weighted mean (zero for an empty bin).
    pub fn mean(&self) -> f64 {
        if self.sum_w == 0.0 {
            0.0
        } else {
            self.sum_wy / self.sum_w
        }
    }

    /// The error on the weighted mean (zero for an empty bin).
    pub fn error(&self) -> f64 {
        if self.sum_w == 0.0 || self.sum_w2 == 0.0 {
            return 0.0;
        }
        let mean = self.mean();
        let variance = (self.sum_wy2 / self.sum_w - mean * mean).max(0.0);
        let n_eff = self.sum_w * self.sum_w / self.sum_w2;
        (variance / n_eff).sqrt()
    }

    /// Mean and error together.
    pub fn estimate(&self) -> Estimate {
        Estimate::new(self.mean(), self.error())
    }

    /// $`\sum w`$
    pub fn sum_w(&self) -> f64 {
        self.sum_w
    }

    /// $`\sum wy`$, the un-normalized content of the bin.
    pub fn sum_wy(&self) -> f64 {
        self.sum_wy
    }

    /// Number of fills.
    pub fn entries(&self) -> u64 {
        self.entries
    }

    /// Whether the bin was never filled.
    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    /// Combine many bins with compensated summation.
    pub fn combine(bins: &[ProfileBin]) -> ProfileBin {
        ProfileBin {
            sum_w: bins
                .iter()
                .map(|b| b.sum_w)
                .sum_with_accumulator::<Klein<f64>>(),
            sum_wy: bins
                .iter()
                .map(|b| b.sum_wy)
                .sum_with_accumulator::<Klein<f64>>(),
            sum_wy2: bins
                .iter()
                .map(|b| b.sum_wy2)
                .sum_with_accumulator::<Klein<f64>>(),
            sum_w2: bins
                .iter()
                .map(|b| b.sum_w2)
                .sum_with_accumulator::<Klein<f64>>(),
            entries: bins.iter().map(|b| b.entries).sum(),
        }
    }
}

impl_op_ex!(+ |a: &ProfileBin, b: &ProfileBin| -> ProfileBin {
    ProfileBin {
        sum_w: a.sum_w + b.sum_w,
        sum_wy: a.sum_wy + b.sum_wy,
        sum_wy2: a.sum_wy2 + b.sum_wy2,
        sum_w2: a.sum_w2 + b.sum_w2,
        entries: a.entries + b.entries,
    }
});
impl_op_ex!(+= |a: &mut ProfileBin, b: &ProfileBin| {
    a.sum_w += b.sum_w;
    a.sum_wy += b.sum_wy;
    a.sum_wy2 += b.sum_wy2;
    a.sum_w2 += b.sum_w2;
    a.entries += b.entries;
});

/// A one-dimensional profile: a [`ProfileBin`] for every bin of a [`Binning`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Profile1D {
    binning: Binning,
    bins: Vec<ProfileBin>,
}

impl Profile1D {
    /// An empty profile over `binning`.
    pub fn new(binning: Binning) -> Self {
        Self {
            binning,
            bins: vec![ProfileBin::default(); binning.n_bins],
        }
    }

    /// Fill `y` with weight `w` into the bin containing `x`. Returns `false` (and does nothing)
    /// if `x` is outside of the binning.
    pub fn fill(&mut self, x: f64, y: f64, w: f64) -> bool {
        match self.binning.index(x) {
            Some(index) => {
                self.bins[index].fill(y, w);
                true
            }
            None => false,
        }
    }

    /// Fill bin `index` directly.
    pub fn fill_bin(&mut self, index: usize, y: f64, w: f64) {
        self.bins[index].fill(y, w);
    }

    /// The binning of the profile.
    pub fn binning(&self) -> &Binning {
        &self.binning
    }

    /// Whether the profile is binned with `binning` and holds one bin for each of its bins.
    pub fn is_binned_as(&self, binning: &Binning) -> bool {
        self.binning == *binning && self.bins.len() == binning.n_bins
    }

    /// Bin `index`.
    pub fn bin(&self, index: usize) -> &ProfileBin {
        &self.bins[index]
    }

    /// All bins.
    pub fn bins(&self) -> &[ProfileBin] {
        &self.bins
    }

    /// Number of bins.
    pub fn len(&self) -> usize {
        self.bins.len()
    }

    /// Whether the profile has no bins.
    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    /// Estimates for every bin.
    pub fn estimates(&self) -> Vec<Estimate> {
        self.bins.iter().map(ProfileBin::estimate).collect()
    }

    /// Empty every bin.
    pub fn reset(&mut self) {
        self.bins.fill(ProfileBin::default());
    }

    /// Add the content of `other` bin by bin.
    pub fn merge(&mut self, other: &Profile1D) -> QmixResult<()> {
        if self.binning != other.binning {
            return Err(QmixError::IncompatibleMerge {
                reason: format!(
                    "profile binnings differ ({:?} vs {:?})",
                    self.binning, other.binning
                ),
            });
        }
        for (a, b) in self.bins.iter_mut().zip(&other.bins) {
            *a += b;
        }
        Ok(())
    }

    /// Combine many profiles bin by bin with compensated summation.
    pub fn combine(profiles: &[&Profile1D]) -> QmixResult<Profile1D> {
        let Some(first) = profiles.first() else {
            return Err(QmixError::IncompatibleMerge {
                reason: "no profiles to combine".to_string(),
            });
        };
        if let Some(other) = profiles.iter().find(|p| p.binning != first.binning) {
            return Err(QmixError::IncompatibleMerge {
                reason: format!(
                    "profile binnings differ ({:?} vs {:?})",
                    first.binning, other.binning
                ),
            });
        }
        Ok(Profile1D {
            binning: first.binning,
            bins: combine_bins(profiles.iter().map(|p| p.bins.as_slice()), first.len()),
        })
    }
}

fn combine_bins<'a>(
    sources: impl Iterator<Item = &'a [ProfileBin]> + Clone,
    n_bins: usize,
) -> Vec<ProfileBin> {
    (0..n_bins)
        .map(|i| {
            let column: Vec<ProfileBin> = sources.clone().map(|bins| bins[i]).collect();
            ProfileBin::combine(&column)
        })
        .collect()
}

/// A profile over multiplicity bins (underflow, regular bins, overflow).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MultiplicityProfile {
    binning: MultiplicityBinning,
    bins: Vec<ProfileBin>,
}

impl MultiplicityProfile {
    /// An empty profile over `binning`.
    pub fn new(binning: MultiplicityBinning) -> Self {
        Self {
            binning,
            bins: vec![ProfileBin::default(); binning.n_total()],
        }
    }

    /// Fill `y` with weight `w` into the bin holding events of multiplicity `multiplicity`.
    pub fn fill(&mut self, multiplicity: f64, y: f64, w: f64) -> MultiplicityBin {
        let bin = self.binning.bin(multiplicity);
        self.bins[bin.flat_index(self.binning.n_bins)].fill(y, w);
        bin
    }

    /// The multiplicity binning.
    pub fn binning(&self) -> &MultiplicityBinning {
        &self.binning
    }

    /// Whether the profile is binned with `binning`, underflow and overflow included.
    pub fn is_binned_as(&self, binning: &MultiplicityBinning) -> bool {
        self.binning == *binning && self.bins.len() == binning.n_total()
    }

    /// The content of `bin`.
    pub fn get(&self, bin: MultiplicityBin) -> &ProfileBin {
        &self.bins[bin.flat_index(self.binning.n_bins)]
    }

    /// Iterate over `(bin, content)` in flat order.
    pub fn iter(&self) -> impl Iterator<Item = (MultiplicityBin, &ProfileBin)> + '_ {
        self.binning.bins().zip(self.bins.iter())
    }

    /// Add the content of `other` bin by bin.
    pub fn merge(&mut self, other: &MultiplicityProfile) -> QmixResult<()> {
        if self.binning != other.binning {
            return Err(QmixError::IncompatibleMerge {
                reason: format!(
                    "multiplicity binnings differ ({:?} vs {:?})",
                    self.binning, other.binning
                ),
            });
        }
        for (a, b) in self.bins.iter_mut().zip(&other.bins) {
            *a += b;
        }
        Ok(())
    }

    /// Combine many profiles bin by bin with compensated summation.
    pub fn combine(profiles: &[&MultiplicityProfile]) -> QmixResult<MultiplicityProfile> {
        let Some(first) = profiles.first() else {
            return Err(QmixError::IncompatibleMerge {
                reason: "no profiles to combine".to_string(),
            });
        };
        if let Some(other) = profiles.iter().find(|p| p.binning != first.binning) {
            return Err(QmixError::IncompatibleMerge {
                reason: format!(
                    "multiplicity binnings differ ({:?} vs {:?})",
                    first.binning, other.binning
                ),
            });
        }
        Ok(MultiplicityProfile {
            binning: first.binning,
            bins: combine_bins(
                profiles.iter().map(|p| p.bins.as_slice()),
                first.bins.len(),
            ),
        })
    }
}
