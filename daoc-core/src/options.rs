//! Clustering options and their validation.
//!
//! [`ClusterOptions`] gathers every knob of the agglomeration loop: the
//! resolution schedule, root-level bounding, link reduction, validation
//! severity, the gain/filter margins, and the clustering strategy (overlap
//! mode, chain handling, prefilter, AOH acceleration). Construction is
//! chainable and the resulting value is checked once by [`ClusterOptions::validate`]
//! before clustering starts.

use crate::error::{CoreError, Result};

/// Default maximal gamma step ratio of the dynamic resolution schedule.
pub const GAMMA_RATIO_MAX_DFL: f64 = 0.999;

/// Sentinel for gamma range bounds requesting automatic derivation from the
/// total network weight.
pub const GAMMA_AUTO: f64 = -1.0;

/// Link consistency validation severity applied before clustering.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, PartialOrd, Ord)]
pub enum Validation {
    /// Skip the validation; input is trusted.
    None,
    /// Fix and warn about unsorted or duplicated links.
    #[default]
    Standard,
    /// Any inconsistency is fatal.
    Severe,
}

/// Severity of the insignificant-link reduction.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReductionSeverity {
    /// Minimal impact on accuracy, fewest links folded.
    Accurate,
    /// Compromise between speedup and accuracy.
    Mean,
    /// Maximal speedup, lowest memory, minor accuracy drop.
    Severe,
}

/// Link-reduction policy for the input graph and the built levels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Reduction {
    /// Reduction severity; `None` disables the reduction.
    pub severity: Option<ReductionSeverity>,
    /// Rank links by direct weight instead of the optimization function.
    pub by_weight: bool,
    /// The input graph was already reduced, so skip re-reducing base nodes
    /// and fold lightest links on the newly built levels instead.
    pub skip_nodes: bool,
}

impl Reduction {
    /// Whether any reduction is active.
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.severity.is_some()
    }
}

/// Root-level bounding policy applied when `root_max` is set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RootBound {
    /// Keep merging, even through non-positive gains, until the root fits.
    pub up: bool,
    /// Stop early once the root level fits the bound.
    pub down: bool,
    /// Fold disconnected clusters into the root as well.
    pub standalone: bool,
    /// Accept only non-negative gains while shrinking up.
    pub nonnegative: bool,
}

/// Overlap admission mode for items with several equally best candidates.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Overlap {
    /// The item joins the single group whose representative id is smallest.
    #[default]
    Crisp,
    /// The item joins every conflicting group with an explicit share.
    Fuzzy,
}

/// Options of the hierarchy construction.
#[derive(Clone, Debug)]
pub struct ClusterOptions {
    /// Static resolution, or the fixed bound of a dynamic sweep.
    pub gamma: f64,
    /// Gamma step ratio in (0, 1); 0 disables the dynamic schedule.
    pub gamma_ratio: f64,
    /// Upper bound the step ratio anneals to near gamma = 1.
    pub gamma_ratio_max: f64,
    /// Lower gamma bound of the sweep; [`GAMMA_AUTO`] derives it from W.
    pub gamma_min: f64,
    /// Upper gamma bound of the sweep; [`GAMMA_AUTO`] derives it from W.
    pub gamma_max: f64,
    /// Maximal number of clusters on the root level; 0 disables the bound.
    pub root_max: u32,
    /// Bounding policy used when `root_max` is set.
    pub root_bound: RootBound,
    /// Link-reduction policy.
    pub reduction: Reduction,
    /// Link validation severity before clustering.
    pub validation: Validation,
    /// Prefilter activation margin in [0, 1]: 0 always applies the filter,
    /// 1 discards it.
    pub filter_margin: f32,
    /// Minimal global gain for the early exit; values <= 0 disable it.
    pub gain_marg: f64,
    /// Divide `gain_marg` by the square root of the number of links.
    pub gain_marg_div: bool,
    /// Use the aggregating order-invariant hash to share candidate
    /// computation between structurally equivalent items.
    pub use_ahash: bool,
    /// Overlap admission mode.
    pub overlap: Overlap,
    /// Merge whole mutual-best components instead of their cliques.
    pub chains: bool,
    /// Enable the candidate prefilter (a safe pruning).
    pub prefilter: bool,
    /// Emit the optimization function per iteration at info level.
    pub mod_trace: bool,
}

impl Default for ClusterOptions {
    fn default() -> Self {
        Self {
            gamma: 1.0,
            gamma_ratio: 0.0,
            gamma_ratio_max: GAMMA_RATIO_MAX_DFL,
            gamma_min: GAMMA_AUTO,
            gamma_max: GAMMA_AUTO,
            root_max: 0,
            root_bound: RootBound::default(),
            reduction: Reduction::default(),
            validation: Validation::default(),
            filter_margin: 0.15,
            gain_marg: 0.0,
            gain_marg_div: false,
            use_ahash: true,
            overlap: Overlap::default(),
            chains: false,
            prefilter: true,
            mod_trace: false,
        }
    }
}

impl ClusterOptions {
    /// Creates options with the default clustering strategy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a static resolution parameter.
    #[must_use]
    pub fn with_gamma(mut self, gamma: f64) -> Self {
        self.gamma = gamma;
        self.gamma_ratio = 0.0;
        self
    }

    /// Enables the dynamic resolution schedule with the given step ratio.
    #[must_use]
    pub fn with_gamma_ratio(mut self, ratio: f64) -> Self {
        self.gamma_ratio = ratio;
        self
    }

    /// Sets the gamma range of the dynamic schedule.
    #[must_use]
    pub fn with_gamma_range(mut self, min: f64, max: f64) -> Self {
        self.gamma_min = min;
        self.gamma_max = max;
        self
    }

    /// Bounds the root level size with the given policy.
    #[must_use]
    pub fn with_root_bound(mut self, root_max: u32, bound: RootBound) -> Self {
        self.root_max = root_max;
        self.root_bound = bound;
        self
    }

    /// Sets the link-reduction policy.
    #[must_use]
    pub fn with_reduction(mut self, reduction: Reduction) -> Self {
        self.reduction = reduction;
        self
    }

    /// Sets the validation severity.
    #[must_use]
    pub fn with_validation(mut self, validation: Validation) -> Self {
        self.validation = validation;
        self
    }

    /// Sets the gain margin for the early exit.
    #[must_use]
    pub fn with_gain_marg(mut self, marg: f64, div_by_links: bool) -> Self {
        self.gain_marg = marg;
        self.gain_marg_div = div_by_links;
        self
    }

    /// Sets the overlap admission mode.
    #[must_use]
    pub fn with_overlap(mut self, overlap: Overlap) -> Self {
        self.overlap = overlap;
        self
    }

    /// Checks the mutual consistency of the options.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidOption`] naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if self.gamma_ratio != 0.0 && !(0.0..1.0).contains(&self.gamma_ratio) {
            return Err(invalid("gamma_ratio", "must be in (0, 1)"));
        }
        if self.gamma_ratio != 0.0
            && (self.gamma_ratio_max < self.gamma_ratio || self.gamma_ratio_max >= 1.0)
        {
            return Err(invalid("gamma_ratio_max", "must be in [gamma_ratio, 1)"));
        }
        if self.gamma_ratio == 0.0 && self.gamma < 0.0 {
            return Err(invalid("gamma", "static resolution must be >= 0"));
        }
        for (name, value) in [("gamma_min", self.gamma_min), ("gamma_max", self.gamma_max)] {
            if value < 0.0 && value != GAMMA_AUTO {
                return Err(invalid(name, "must be >= 0 or the auto sentinel"));
            }
        }
        if self.gamma_min >= 0.0 && self.gamma_max >= 0.0 && self.gamma_max < self.gamma_min {
            return Err(invalid("gamma_max", "must be >= gamma_min"));
        }
        if !(0.0..=1.0).contains(&self.filter_margin) {
            return Err(invalid("filter_margin", "must be in [0, 1]"));
        }
        if !(-0.5..=1.0).contains(&self.gain_marg) {
            return Err(invalid("gain_marg", "must be in [-1/2, 1]"));
        }
        if self.root_bound.nonnegative && !self.root_bound.up {
            return Err(invalid(
                "root_bound",
                "the non-negative flag requires bounding up",
            ));
        }
        Ok(())
    }
}

fn invalid(name: &'static str, message: &str) -> CoreError {
    CoreError::InvalidOption {
        name,
        message: message.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rstest::rstest;

    #[test]
    fn defaults_are_valid() {
        ClusterOptions::new().validate().expect("defaults must pass");
    }

    #[rstest]
    #[case(ClusterOptions::new().with_gamma(-0.5), "gamma")]
    #[case(ClusterOptions::new().with_gamma_ratio(1.0), "gamma_ratio")]
    #[case(ClusterOptions::new().with_gamma_ratio(0.5).with_gamma_range(3.0, 2.0), "gamma_max")]
    #[case(ClusterOptions::new().with_gain_marg(1.5, false), "gain_marg")]
    fn rejects_out_of_range_values(#[case] opts: ClusterOptions, #[case] field: &str) {
        let err = opts.validate().expect_err("validation must fail");
        match err {
            CoreError::InvalidOption { name, .. } => assert_eq!(name, field),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn nonnegative_bound_requires_up() {
        let opts = ClusterOptions::new().with_root_bound(
            4,
            RootBound {
                nonnegative: true,
                ..RootBound::default()
            },
        );
        assert!(opts.validate().is_err());
    }
}
