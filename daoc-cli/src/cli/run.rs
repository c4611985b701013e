//! Execution driver: input loading, clustering or evaluation, and the
//! requested outputs.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use daoc_core::{
    all_distinct_clusters, approx_level, custom_levels, intrinsic_measures, max_share_filter,
    significant_clusters, ClusterOptions, Graph, Hierarchy, Selected, Share, SignifOptions, SzMin,
};
use daoc_formats::{
    ensure_parent_dir, CnlParser, CnlPrinter, FileFormat, NodeVecOptions, NodeVecPrinter,
    NslParser, ParseError, RcgParser, RhbHierarchy,
};

use crate::cli::commands::{CliError, OutKind, OutputSpec, ParsedInput};
use crate::timing::Timing;

/// Node-id mask of the members filtered out by the `f` output flag.
const FILTER_MASK: u32 = 1 << 31;

/// Executes the decoded CLI request.
///
/// # Errors
/// Returns [`CliError`] on input, clustering or output failures.
pub fn execute(mut parsed: ParsedInput) -> Result<(), CliError> {
    if let Some(extended) = parsed.version {
        print_version(extended, &parsed.clustering);
        if parsed.inp.filename.as_os_str().is_empty() {
            return Ok(());
        }
    }
    if parsed.inp.filename.as_os_str().is_empty() {
        return Err(CliError::MissingInput);
    }

    let mut timing = parsed.timings.then(Timing::new);
    let mut graph = load_graph(&mut parsed)?;
    if let Some(t) = timing.as_mut() {
        t.loadnet = t.update();
    }

    if let Some((flags, clsfile)) = parsed.evaluate.take() {
        let released = graph.release();
        let loaded = CnlParser::load(&clsfile)?;
        if let Some(t) = timing.as_mut() {
            t.loadcls = t.update();
        }
        let ins = intrinsic_measures(
            &released.nodes,
            &loaded.clusters,
            parsed.clustering.gamma,
            flags,
        )?;
        if let Some(t) = timing.as_mut() {
            t.evaluate = t.update();
        }
        print_intrinsics(&ins, flags, parsed.clustering.gamma);
        if let Some(t) = timing {
            print!("{}", t.render());
        }
        return Ok(());
    }

    // The input parsers never reduce the graph themselves; a requested
    // reduction folds the lightest links of the built levels instead.
    if parsed.clustering.reduction.enabled() {
        parsed.clustering.reduction.skip_nodes = true;
    }
    let hier = graph.build_hierarchy(&parsed.clustering)?;
    if let Some(t) = timing.as_mut() {
        t.cluster = t.update();
    }
    info!(
        levels = hier.levels().len(),
        clusters = hier.score().clusters,
        modularity = hier.score().modularity,
        "clustering completed"
    );

    for spec in &parsed.outputs {
        write_output(&hier, spec, &parsed.inp.filename)?;
    }
    if let Some((nv_opts, nv_file)) = &parsed.nodevec {
        write_nodevec(&hier, &parsed.outputs, nv_opts, nv_file.as_deref(), &parsed.inp.filename)?;
    }
    if let Some(t) = timing.as_mut() {
        t.outpfile = t.update();
        print!("{}", t.render());
    }
    Ok(())
}

/// Loads the input network, identifying the format when not forced.
fn load_graph(parsed: &mut ParsedInput) -> Result<Graph, CliError> {
    let mut format = parsed.inp.format;
    if format == FileFormat::Unknown {
        format = FileFormat::from_path(&parsed.inp.filename);
    }
    if format == FileFormat::Unknown {
        format = FileFormat::DEFAULT_INPUT;
        warn!(
            file = %parsed.inp.filename.display(),
            assumed = %format,
            "the input format could not be identified by the extension"
        );
    }
    parsed.inp.format = format;
    let inp = parsed.inp.clone();
    match format {
        FileFormat::Rcg => Ok(RcgParser::new(inp).load()?),
        FileFormat::Nse | FileFormat::Nsa => Ok(NslParser::new(inp).load()?),
        other => Err(CliError::Parse(ParseError::Syntax {
            line: 0,
            message: format!("`{other}` is not an input network format"),
        })),
    }
}

/// Writes one `-c` output request.
fn write_output(hier: &Hierarchy, spec: &OutputSpec, input: &Path) -> Result<(), CliError> {
    if hier.levels().is_empty() {
        warn!("the hierarchy is empty, no output files are produced");
        return Ok(());
    }
    let path = spec
        .file
        .clone()
        .unwrap_or_else(|| default_output_name(spec, input));
    match &spec.kind {
        OutKind::Hier => {
            ensure_parent_dir(&path)?;
            let mut out = open(&path)?;
            RhbHierarchy::render(hier).print(&mut out)?;
            out.flush().map_err(daoc_formats::PrintError::from)?;
        }
        OutKind::Root => {
            let top = hier.levels().len().saturating_sub(1);
            let selection: Vec<Selected> = (0..hier.root().len())
                .map(|index| Selected { level: top, index })
                .collect();
            write_clusters(hier, spec, &selection, &path)?;
        }
        OutKind::Signif(sopts) => {
            let selection = significant_clusters(hier, sopts);
            write_clusters(hier, spec, &selection, &path)?;
        }
        OutKind::AllCls => {
            let selection = all_distinct_clusters(hier);
            write_clusters(hier, spec, &selection, &path)?;
        }
        OutKind::PerLevel => {
            write_levels(hier, spec, &(0..hier.levels().len()).collect::<Vec<_>>(), &path)?;
        }
        OutKind::CustLevs(lopts) => {
            write_levels(hier, spec, &custom_levels(hier, lopts), &path)?;
        }
        OutKind::ApproxLevel(clsnum) => {
            let levels: Vec<usize> = approx_level(hier, *clsnum).into_iter().collect();
            write_levels(hier, spec, &levels, &path)?;
        }
    }
    info!(file = %path.display(), "output written");
    Ok(())
}

/// Unwraps and prints a cluster selection into one CNL file.
fn write_clusters(
    hier: &Hierarchy,
    spec: &OutputSpec,
    selection: &[Selected],
    path: &Path,
) -> Result<(), CliError> {
    let members = unwrap_selection(hier, spec, selection);
    ensure_parent_dir(path)?;
    let mut out = open(path)?;
    CnlPrinter::new(hier).print(&mut out, &members, spec.fmt)?;
    out.flush().map_err(daoc_formats::PrintError::from)?;
    Ok(())
}

/// Prints the selected levels, one CNL file per level, into a directory
/// named after the output file stem.
fn write_levels(
    hier: &Hierarchy,
    spec: &OutputSpec,
    levels: &[usize],
    path: &Path,
) -> Result<(), CliError> {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "levels".to_owned());
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "cnl".to_owned());
    let dir = path.parent().unwrap_or_else(|| Path::new("")).join(&stem);
    for &levi in levels {
        let selection: Vec<Selected> = (0..hier.levels()[levi].fullsize())
            .map(|index| Selected { level: levi, index })
            .collect();
        let file = dir.join(format!("{stem}_{levi}.{ext}"));
        write_clusters(hier, spec, &selection, &file)?;
    }
    Ok(())
}

/// Unwraps the selection, applying the member filter and the max-share
/// simplification when requested.
fn unwrap_selection(
    hier: &Hierarchy,
    spec: &OutputSpec,
    selection: &[Selected],
) -> Vec<(Selected, BTreeMap<usize, Share>)> {
    let mut members: Vec<(Selected, BTreeMap<usize, Share>)> = selection
        .iter()
        .map(|&sel| {
            let mut m = hier.unwrap(sel.level, sel.index);
            if spec.filter_members {
                m.retain(|&node, _| hier.nodes()[node].id & FILTER_MASK == 0);
            }
            (sel, m)
        })
        .collect();
    if spec.max_share {
        members = max_share_filter(members);
    }
    members
}

/// Writes the node-vectorization output over the significant dimensions.
fn write_nodevec(
    hier: &Hierarchy,
    outputs: &[OutputSpec],
    opts: &NodeVecOptions,
    file: Option<&Path>,
    input: &Path,
) -> Result<(), CliError> {
    // Reuse the significance constraints of an explicit -cs output when
    // present; the recommended all-owner hierarchy selection otherwise.
    let sopts = outputs
        .iter()
        .find_map(|spec| match &spec.kind {
            OutKind::Signif(s) => Some(*s),
            _ => None,
        })
        .unwrap_or(SignifOptions {
            any_owner: false,
            direct: false,
            szmin: SzMin::Abs(2),
            ..SignifOptions::default()
        });
    let dims: Vec<(Selected, BTreeMap<usize, Share>)> = significant_clusters(hier, &sopts)
        .into_iter()
        .map(|sel| (sel, hier.unwrap(sel.level, sel.index)))
        .collect();
    let path = file
        .map(Path::to_path_buf)
        .unwrap_or_else(|| replace_ext(input, "_v.nvc"));
    ensure_parent_dir(&path)?;
    let mut out = open(&path)?;
    NodeVecPrinter::new(hier).print(&mut out, &dims, opts)?;
    out.flush().map_err(daoc_formats::PrintError::from)?;
    info!(file = %path.display(), dims = dims.len(), "node vectors written");
    Ok(())
}

fn open(path: &Path) -> Result<BufWriter<File>, CliError> {
    let file = File::create(path).map_err(|source| {
        CliError::Parse(ParseError::Io {
            path: path.to_path_buf(),
            source,
        })
    })?;
    Ok(BufWriter::new(file))
}

/// Derives the default output file name from the input network name,
/// encoding the output options into the suffix.
#[must_use]
pub fn default_output_name(spec: &OutputSpec, input: &Path) -> PathBuf {
    let suffix = match &spec.kind {
        OutKind::Root => "_r.cnl".to_owned(),
        OutKind::PerLevel => "_la.cnl".to_owned(),
        OutKind::AllCls => "_ca.cnl".to_owned(),
        OutKind::Hier => "_.rhb".to_owned(),
        OutKind::ApproxLevel(clsnum) => format!("_lp-n{clsnum}-.cnl"),
        OutKind::CustLevs(lopts) => {
            let mut suf = "_lc".to_owned();
            let tag = match lopts.levmarg {
                daoc_core::LevMarg::ClsNum => "-n",
                daoc_core::LevMarg::LevId => "-i",
                daoc_core::LevMarg::LevStepNum => "-s",
                daoc_core::LevMarg::None => "",
            };
            suf.push_str(tag);
            if !tag.is_empty() {
                if lopts.margmin > 0 {
                    suf.push_str(&lopts.margmin.to_string());
                }
                suf.push('-');
                if lopts.margmax != u32::MAX {
                    suf.push_str(&lopts.margmax.to_string());
                }
                if lopts.step_ratio > 0.0 {
                    suf.push('_');
                    suf.push_str(&lopts.step_ratio.to_string());
                }
            }
            suf.push_str(".cnl");
            suf
        }
        OutKind::Signif(sopts) => {
            let mut suf = "_".to_owned();
            let default = SignifOptions {
                single_owner: sopts.single_owner,
                ..SignifOptions::default()
            };
            if *sopts == default {
                suf.push('d');
            } else {
                suf.push(if sopts.any_owner { 's' } else { 'a' });
                suf.push(if sopts.direct { 'd' } else { 'h' });
            }
            if sopts.densdrop != 1.0 {
                suf.push_str(&sopts.densdrop.to_string());
            }
            if sopts.wrstep < 1.0 {
                suf.push('-');
                if sopts.wrange {
                    suf.push('r');
                }
                suf.push_str(&sopts.wrstep.to_string());
            }
            if let SzMin::Abs(szmin) = sopts.szmin {
                if szmin > 0 {
                    suf.push('_');
                    suf.push_str(&szmin.to_string());
                }
            }
            suf.push_str(".cnl");
            suf
        }
    };
    replace_ext(input, &suffix)
}

/// Replaces the extension of the input file name with the given suffix,
/// touching only the file name, never the parent directories.
fn replace_ext(input: &Path, suffix: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "out".to_owned());
    input
        .parent()
        .unwrap_or_else(|| Path::new(""))
        .join(format!("{stem}{suffix}"))
}

/// One-line summary of the active clustering strategy.
#[must_use]
pub fn strategy_summary(opts: &ClusterOptions) -> String {
    let overlap = match opts.overlap {
        daoc_core::Overlap::Crisp => "crisp-overlap",
        daoc_core::Overlap::Fuzzy => "fuzzy-overlap",
    };
    let mut summary = overlap.to_owned();
    if opts.chains {
        summary.push_str("+chains");
    }
    if !opts.prefilter {
        summary.push_str("+noprefilter");
    }
    if !opts.use_ahash {
        summary.push_str("+noahash");
    }
    summary
}

fn print_version(extended: bool, opts: &ClusterOptions) {
    let version = env!("CARGO_PKG_VERSION");
    if extended {
        println!("daoc {version}\nstrategy: {}", strategy_summary(opts));
    } else {
        println!("daoc {version} ({})", strategy_summary(opts));
    }
}

fn print_intrinsics(ins: &daoc_core::Intrinsics, flags: daoc_core::IntrinsicsFlags, gamma: f64) {
    let mut parts: Vec<String> = Vec::new();
    if flags.conductance {
        parts.push(format!("Conductance f: {}", ins.conductance));
    }
    if flags.modularity {
        parts.push(format!("Q: {} on gamma={gamma}", ins.modularity));
    }
    if flags.gamma {
        parts.push(format!(
            "Q*: {} on the expected static (Newman's) gamma={}",
            ins.gamma_modularity, ins.gamma
        ));
    }
    println!("{}, clusters: {}", parts.join(", "), ins.clusters);
}
