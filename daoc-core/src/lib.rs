//! DAOC core library: deterministic, parameter-free agglomerative
//! clustering of large weighted networks.
//!
//! The engine builds a complete hierarchy of (possibly overlapping)
//! clusters by iteratively merging mutual-best candidate pairs under a
//! resolution-parametrized modularity gain. For the same input graph and
//! options the output is byte-identical across runs and platforms: node
//! input order, irrelevant tie-breaking and the `shuffle` construction mode
//! never influence the result.

mod agglomerate;
mod aoh;
mod candidates;
mod error;
mod graph;
mod hierarchy;
mod item;
mod level;
mod merger;
mod num;
mod options;
mod output;
mod reduction;

pub mod intrinsics;

pub use crate::{
    agglomerate::cluster,
    aoh::AggHash,
    error::{CoreError, CoreErrorCode, LinkErrors, NodeErrors, Result},
    graph::{canonicalize, AccWeight, Graph, Id, InpLink, Link, LinkWeight, Node, ReleasedNodes},
    hierarchy::{Cluster, ClusterLink, HierScore, Hierarchy, Level, Owner, Share},
    intrinsics::{intrinsic_measures, Intrinsics, IntrinsicsFlags},
    options::{
        ClusterOptions, Overlap, Reduction, ReductionSeverity, RootBound, Validation, GAMMA_AUTO,
        GAMMA_RATIO_MAX_DFL,
    },
    output::{
        all_distinct_clusters, approx_level, custom_levels, max_share_filter,
        significant_clusters, CustomLevsOptions, LevMarg, Selected, SignifOptions, SzMin, CEXPM2,
        RGOLDINV, ROOT_BASE_MAX, ROOT_BASE_MIN,
    },
    reduction::reduced_links_marg,
};
