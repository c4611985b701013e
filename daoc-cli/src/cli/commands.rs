//! Argument surface and option-payload parsing of the DAOC CLI.
//!
//! The surface is a compact grammar: every option is a short flag whose
//! payload (when any) is attached to the option itself, e.g.
//! `-cxss=clusters.cnl`, `-gr0.5:0.9`, `-bpu=5` or `-ms=0.01`. Clap handles
//! the tokenization; the compound payloads are decoded by the dedicated
//! sub-parsers below.

use std::path::PathBuf;

use clap::Parser;
use thiserror::Error;

use daoc_core::{
    ClusterOptions, CoreError, CustomLevsOptions, IntrinsicsFlags, LevMarg, Reduction,
    ReductionSeverity, RootBound, SignifOptions, SzMin, Validation, CEXPM2, GAMMA_AUTO,
    GAMMA_RATIO_MAX_DFL, RGOLDINV, ROOT_BASE_MAX, ROOT_BASE_MIN,
};
use daoc_formats::{ClsFmt, FileFormat, InputOptions, NodeVecOptions, NodeVecValue, ParseError,
    PrintError};

/// Default gamma step ratio of `-gr` when no value is attached.
pub const DEFAULT_GAMMA_RATIO: f64 = 0.5;

/// Top-level CLI options parsed by [`clap`].
#[derive(Debug, Parser, Clone)]
#[command(
    name = "daoc",
    disable_version_flag = true,
    about = "Deterministic agglomerative overlapping clustering of large networks.",
    after_help = "Option payloads attach to the option itself, e.g. -cxss=out.cnl, \
                  -gr0.5:0.9, -bpu=5, -rm, -ms=0.01, -ne."
)]
pub struct Cli {
    /// Clusters output: [f][x]{r|s...|S...|l...|a|h}[{p,s,h,e}][=FILE]; may repeat.
    #[arg(short = 'c', value_name = "SPEC", action = clap::ArgAction::Append)]
    pub clusters: Vec<String>,

    /// Evaluate intrinsic measures of a CNL clustering: {c,m,g}*=FILE.
    #[arg(short = 'e', value_name = "SPEC")]
    pub evaluate: Option<String>,

    /// Accumulate weights of duplicated links on graph construction.
    #[arg(short = 'a')]
    pub sumdups: bool,

    /// Resolution: =GAMMA for static, r[RATIO][:[RMAX]][=[GMIN][:GMAX]] for dynamic.
    #[arg(short = 'g', value_name = "SPEC")]
    pub gamma: Option<String>,

    /// Root level bound: [s][p][u|d][=ROOT_SZMAX].
    #[arg(short = 'b', value_name = "SPEC")]
    pub bound: Option<String>,

    /// Link reduction: [w][a|m|s]; bare -r means mean severity.
    #[arg(short = 'r', value_name = "SPEC", num_args = 0..=1, default_missing_value = "m")]
    pub reduce: Option<String>,

    /// Validation severity of the node links: =0..2.
    #[arg(short = 'l', value_name = "SEVERITY")]
    pub validation: Option<String>,

    /// Prefilter margin: =FLOAT in [0, 1].
    #[arg(short = 'f', value_name = "MARGIN")]
    pub filter: Option<String>,

    /// Gain margin for the early exit: [s]=FLOAT.
    #[arg(short = 'm', value_name = "SPEC")]
    pub margin: Option<String>,

    /// Trace execution timings.
    #[arg(short = 't')]
    pub timings: bool,

    /// Shuffle (randomly reorder) nodes and links on graph construction.
    #[arg(short = 's')]
    pub shuffle: bool,

    /// Informative tracing: report the optimization function per iteration.
    #[arg(short = 'i')]
    pub informative: bool,

    /// Disable features: a - the aggregating hash acceleration.
    #[arg(short = 'x', value_name = "FEATURES")]
    pub disable: Option<String>,

    /// Force the input format: r - rcg, e - nse, a - nsa.
    #[arg(short = 'n', value_name = "FORMAT")]
    pub format: Option<String>,

    /// Node vectorization: [b|1|2|f][n][m<VALMIN>][=FILE].
    #[arg(short = 'v', value_name = "SPEC", num_args = 0..=1, default_missing_value = "")]
    pub nodevec: Option<String>,

    /// Show the version; x appends the clustering strategy details.
    #[arg(short = 'V', value_name = "MODE", num_args = 0..=1, default_missing_value = "")]
    pub version: Option<String>,

    /// Input network (graph) to be processed.
    #[arg(value_name = "NETWORK")]
    pub network: Option<PathBuf>,
}

impl Cli {
    /// Repairs optional-payload options that swallowed the positional
    /// network argument (e.g. `-r net.nse`).
    #[must_use]
    pub fn normalize(mut self) -> Self {
        if self.network.is_none() {
            for slot in [&mut self.reduce, &mut self.nodevec, &mut self.version] {
                let reclaim = slot
                    .as_ref()
                    .is_some_and(|v| v.contains('.') || v.contains('/'));
                if reclaim {
                    self.network = slot.take().map(PathBuf::from);
                    *slot = Some(String::new());
                    break;
                }
            }
        }
        self
    }
}

/// Errors surfaced while decoding and executing CLI options.
#[derive(Debug, Error)]
pub enum CliError {
    /// An option payload violated the grammar.
    #[error("unexpected option -{option}{spec}: {message}")]
    BadOption {
        /// The option letter.
        option: char,
        /// The raw payload.
        spec: String,
        /// Description of the violation.
        message: String,
    },
    /// `-c` and `-e` were both requested.
    #[error("the clusters output (-c) is not compatible with the evaluation (-e)")]
    IncompatibleOutputs,
    /// No input network was supplied.
    #[error("the input network is not specified")]
    MissingInput,
    /// Input parsing failed.
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// Output serialization failed.
    #[error(transparent)]
    Print(#[from] PrintError),
    /// The clustering core rejected the request.
    #[error(transparent)]
    Core(#[from] CoreError),
}

fn bad(option: char, spec: &str, message: impl Into<String>) -> CliError {
    CliError::BadOption {
        option,
        spec: spec.to_owned(),
        message: message.into(),
    }
}

/// The requested kind of a clusters output.
#[derive(Clone, Debug, PartialEq)]
pub enum OutKind {
    /// Root level clusters only.
    Root,
    /// Significant (representative) clusters.
    Signif(SignifOptions),
    /// Every level into its own file.
    PerLevel,
    /// Levels satisfying the custom margins.
    CustLevs(CustomLevsOptions),
    /// The single level closest to the requested cluster count.
    ApproxLevel(u32),
    /// All distinct clusters once.
    AllCls,
    /// The whole hierarchy in the RHB format.
    Hier,
}

/// One decoded `-c` output request.
#[derive(Clone, Debug, PartialEq)]
pub struct OutputSpec {
    /// Filter out members with the highest id bit set.
    pub filter_members: bool,
    /// Keep only the maximal share of each fuzzy-overlapping node.
    pub max_share: bool,
    /// What to output.
    pub kind: OutKind,
    /// File sub-format.
    pub fmt: ClsFmt,
    /// Output path; derived from the input name when absent.
    pub file: Option<PathBuf>,
}

/// Cursor over an ASCII option payload.
struct Scan<'a> {
    spec: &'a str,
    pos: usize,
}

impl<'a> Scan<'a> {
    fn new(spec: &'a str) -> Self {
        Self { spec, pos: 0 }
    }

    fn peek(&self) -> Option<u8> {
        self.spec.as_bytes().get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn eat(&mut self, c: u8) -> bool {
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn rest(&self) -> &'a str {
        &self.spec[self.pos..]
    }

    fn done(&self) -> bool {
        self.pos >= self.spec.len()
    }

    /// Consumes the longest prefix parsing as the requested number type.
    fn number<T: std::str::FromStr>(&mut self) -> Option<T> {
        let rest = self.rest();
        let mut end = rest
            .find(|ch: char| !matches!(ch, '0'..='9' | '.' | '-' | '+'))
            .unwrap_or(rest.len());
        while end > 0 {
            if let Ok(v) = rest[..end].parse::<T>() {
                self.pos += end;
                return Some(v);
            }
            end -= 1;
        }
        None
    }
}

/// Strips an optional `=file` suffix (with optional quotes) from the scan.
fn take_file(scan: &mut Scan<'_>, option: char) -> Result<Option<PathBuf>, CliError> {
    if scan.done() {
        return Ok(None);
    }
    if !scan.eat(b'=') {
        return Err(bad(option, scan.spec, "trailing characters after the options"));
    }
    let mut name = scan.rest();
    if (name.starts_with('"') && name.ends_with('"') && name.len() >= 2)
        || (name.starts_with('\'') && name.ends_with('\'') && name.len() >= 2)
    {
        name = &name[1..name.len() - 1];
    }
    if name.is_empty() || name == "." || name == ".." {
        return Err(bad(option, scan.spec, "the filename is not specified"));
    }
    Ok(Some(PathBuf::from(name)))
}

/// Decodes one `-c` payload.
pub fn parse_cluster_spec(spec: &str) -> Result<OutputSpec, CliError> {
    let mut scan = Scan::new(spec);
    let filter_members = scan.eat(b'f');
    let max_share = scan.eat(b'x');

    let kind = match scan.bump() {
        Some(b'r') => OutKind::Root,
        Some(c @ (b's' | b'S')) => OutKind::Signif(parse_signif(&mut scan, c == b'S', spec)?),
        Some(b'l') => parse_custlevs(&mut scan, spec)?,
        Some(b'a') => OutKind::AllCls,
        Some(b'h') => OutKind::Hier,
        _ => return Err(bad('c', spec, "missing output kind {r,s,S,l,a,h}")),
    };

    let fmt = if kind == OutKind::Hier {
        if !scan.done() && scan.peek() != Some(b'=') {
            return Err(bad('c', spec, "the hierarchy output has no sub-format"));
        }
        ClsFmt::default()
    } else {
        match scan.peek() {
            Some(b'p') => {
                scan.bump();
                ClsFmt::Pure
            }
            Some(b's') => {
                scan.bump();
                ClsFmt::Simple
            }
            Some(b'h') => {
                scan.bump();
                ClsFmt::Shared
            }
            Some(b'e') => {
                scan.bump();
                ClsFmt::Extended
            }
            _ => ClsFmt::default(),
        }
    };

    let file = take_file(&mut scan, 'c')?;
    Ok(OutputSpec {
        filter_members,
        max_share,
        kind,
        fmt,
        file,
    })
}

/// Decodes the significant-clusters sub-options
/// `[{s,a}{d,h}][%[b]{F,e,g}][/{F,e,g}[~]][_{N,l2,le,pg,r<base>}]`.
fn parse_signif(scan: &mut Scan<'_>, single_owner: bool, spec: &str) -> Result<SignifOptions, CliError> {
    let mut opts = SignifOptions {
        single_owner,
        ..SignifOptions::default()
    };
    // The quantifier pair is present only when {s,a} is directly followed by
    // {d,h}; otherwise the character belongs to the file sub-format.
    let quantified = matches!(scan.peek(), Some(b's' | b'a'))
        && matches!(
            scan.spec.as_bytes().get(scan.pos + 1),
            Some(b'd' | b'h')
        );
    if quantified {
        let c = scan.bump().expect("the quantifier was peeked");
        opts.any_owner = c == b's';
        match scan.bump() {
            Some(b'd') => opts.direct = true,
            Some(b'h') => opts.direct = false,
            _ => unreachable!("the direction was peeked"),
        }
    }
    loop {
        match scan.peek() {
            Some(b'%') => {
                scan.bump();
                opts.densbound = scan.eat(b'b');
                opts.densdrop = parse_ratio_value(scan, spec)?;
            }
            Some(b'/') => {
                scan.bump();
                opts.wrstep = parse_ratio_value(scan, spec)?;
                opts.wrange = scan.eat(b'~');
                if opts.wrange && !(0.5..1.0).contains(&opts.wrstep) {
                    return Err(bad('c', spec, "the '~' range requires wrstep in (0.5, 1)"));
                }
            }
            Some(b'_') => {
                scan.bump();
                opts.szmin = parse_szmin(scan, spec)?;
            }
            _ => break,
        }
    }
    Ok(opts)
}

/// A ratio value: a float, `e` (1 - e^-2) or `g` (inverse golden ratio).
fn parse_ratio_value(scan: &mut Scan<'_>, spec: &str) -> Result<f32, CliError> {
    match scan.peek() {
        Some(b'e') => {
            scan.bump();
            Ok(CEXPM2)
        }
        Some(b'g') => {
            scan.bump();
            Ok(RGOLDINV)
        }
        _ => scan
            .number::<f32>()
            .filter(|v| *v >= 0.0)
            .ok_or_else(|| bad('c', spec, "a non-negative ratio value is expected")),
    }
}

/// A minimal-size value: `l2`, `le`, `pg`, `r<base>` or an absolute count.
fn parse_szmin(scan: &mut Scan<'_>, spec: &str) -> Result<SzMin, CliError> {
    match scan.peek() {
        Some(b'l') => {
            scan.bump();
            match scan.bump() {
                Some(b'2') => Ok(SzMin::Log2),
                Some(b'e') => Ok(SzMin::LogE),
                _ => Err(bad('c', spec, "expected l2 or le")),
            }
        }
        Some(b'p') => {
            scan.bump();
            if scan.bump() != Some(b'g') {
                return Err(bad('c', spec, "expected pg"));
            }
            Ok(SzMin::PowGoldInv)
        }
        Some(b'r') => {
            scan.bump();
            let base: u8 = scan
                .number()
                .ok_or_else(|| bad('c', spec, "the root base is expected"))?;
            if !(ROOT_BASE_MIN..=ROOT_BASE_MAX).contains(&base) {
                return Err(bad('c', spec, "the root base must be in 2..8"));
            }
            Ok(SzMin::Root(base))
        }
        _ => scan
            .number::<u32>()
            .map(SzMin::Abs)
            .ok_or_else(|| bad('c', spec, "the minimal cluster size is expected")),
    }
}

/// Decodes the custom-levels sub-options
/// `~<clsnum>` or `[[[%]#][min][:max][/rstep]]`.
fn parse_custlevs(scan: &mut Scan<'_>, spec: &str) -> Result<OutKind, CliError> {
    match scan.peek() {
        Some(b'~') => {
            scan.bump();
            let clsnum: u32 = scan
                .number()
                .ok_or_else(|| bad('c', spec, "an approximate cluster count is expected"))?;
            Ok(OutKind::ApproxLevel(clsnum))
        }
        Some(b'[') => {
            scan.bump();
            let mut opts = CustomLevsOptions {
                levmarg: LevMarg::ClsNum,
                ..CustomLevsOptions::default()
            };
            if scan.eat(b'%') {
                if !scan.eat(b'#') {
                    return Err(bad('c', spec, "'%' requires '#'"));
                }
                opts.levmarg = LevMarg::LevStepNum;
            } else if scan.eat(b'#') {
                opts.levmarg = LevMarg::LevId;
            }
            if let Some(v) = scan.number::<u32>() {
                opts.margmin = v;
            }
            if scan.eat(b':') {
                if let Some(v) = scan.number::<u32>() {
                    opts.margmax = v;
                }
            }
            if scan.eat(b'/') {
                let ratio: f32 = scan
                    .number()
                    .ok_or_else(|| bad('c', spec, "the level step ratio is expected"))?;
                if !(0.0..1.0).contains(&ratio) {
                    return Err(bad('c', spec, "the level step ratio must be in (0, 1)"));
                }
                opts.step_ratio = ratio;
            }
            if !scan.eat(b']') {
                return Err(bad('c', spec, "the closing ']' is missed"));
            }
            Ok(OutKind::CustLevs(opts))
        }
        _ => Ok(OutKind::PerLevel),
    }
}

/// Decodes the `-e{c,m,g}*=FILE` evaluation payload.
pub fn parse_eval_spec(spec: &str) -> Result<(IntrinsicsFlags, PathBuf), CliError> {
    // Without '=' the payload can only be a bare path (the tokenizer
    // consumes the '=' of the `-e=FILE` form).
    let (head, file) = match spec.split_once('=') {
        Some(parts) => parts,
        None if spec.contains('.') || spec.contains('/') => ("", spec),
        None => return Err(bad('e', spec, "the filename is expected")),
    };
    if file.is_empty() || file == "." || file == ".." {
        return Err(bad('e', spec, "the filename is not specified"));
    }
    let mut flags = IntrinsicsFlags::default();
    for c in head.chars() {
        match c {
            'c' => flags.conductance = true,
            'm' => flags.modularity = true,
            'g' => flags.gamma = true,
            other => return Err(bad('e', spec, format!("invalid measure `{other}`"))),
        }
    }
    if !flags.any() {
        flags = IntrinsicsFlags::all();
    }
    Ok((flags, PathBuf::from(file)))
}

/// Decodes the `-g` payload into the cluster options.
pub fn parse_gamma_spec(spec: &str, opts: &mut ClusterOptions) -> Result<(), CliError> {
    let mut scan = Scan::new(spec);
    if scan.eat(b'r') {
        opts.gamma_ratio = DEFAULT_GAMMA_RATIO;
        if let Some(ratio) = scan.number::<f64>() {
            if !(0.0..1.0).contains(&ratio) || ratio == 0.0 {
                return Err(bad('g', spec, "gammaRatio must be in (0, 1)"));
            }
            opts.gamma_ratio = ratio;
        }
        if scan.eat(b':') {
            opts.gamma_ratio_max = GAMMA_RATIO_MAX_DFL;
            if let Some(rmax) = scan.number::<f64>() {
                if rmax < opts.gamma_ratio || rmax >= 1.0 {
                    return Err(bad('g', spec, "gammaRatioMax must be in [gammaRatio, 1)"));
                }
                opts.gamma_ratio_max = rmax;
            }
        }
        if scan.done() {
            return Ok(());
        }
        if !scan.eat(b'=') {
            return Err(bad('g', spec, "expected '=' before the gamma range"));
        }
        opts.gamma_min = GAMMA_AUTO;
        opts.gamma_max = GAMMA_AUTO;
        if let Some(gmin) = scan.number::<f64>() {
            if gmin < 0.0 {
                return Err(bad('g', spec, "gammaMin must be >= 0"));
            }
            opts.gamma_min = gmin;
        }
        if scan.eat(b':') {
            if let Some(gmax) = scan.number::<f64>() {
                if gmax < 0.0 || (opts.gamma_min >= 0.0 && gmax < opts.gamma_min) {
                    return Err(bad('g', spec, "gammaMax must be >= gammaMin"));
                }
                opts.gamma_max = gmax;
            }
        }
        if !scan.done() {
            return Err(bad('g', spec, "trailing characters"));
        }
        return Ok(());
    }
    scan.eat(b'=');
    let gamma: f64 = scan
        .number()
        .ok_or_else(|| bad('g', spec, "a resolution value is expected"))?;
    if gamma < 0.0 {
        return Err(bad('g', spec, "the static resolution must be >= 0"));
    }
    if !scan.done() {
        return Err(bad('g', spec, "trailing characters"));
    }
    opts.gamma = gamma;
    opts.gamma_ratio = 0.0;
    Ok(())
}

/// Decodes the `-b[s][p][u|d][=ROOT_SZMAX]` payload.
pub fn parse_bound_spec(spec: &str) -> Result<(u32, RootBound), CliError> {
    if spec.is_empty() {
        return Err(bad('b', spec, "the bound requires parameters"));
    }
    let mut scan = Scan::new(spec);
    let mut bound = RootBound::default();
    let mut root_max: u32 = 0;
    while let Some(c) = scan.peek() {
        match c {
            b's' => {
                scan.bump();
                if bound.standalone {
                    return Err(bad('b', spec, "duplicated 's' flag"));
                }
                bound.standalone = true;
            }
            b'p' => {
                scan.bump();
                if bound.nonnegative {
                    return Err(bad('b', spec, "duplicated 'p' flag"));
                }
                bound.nonnegative = true;
            }
            b'u' | b'd' => {
                scan.bump();
                if bound.up || bound.down {
                    return Err(bad('b', spec, "duplicated or exclusive bound direction"));
                }
                if c == b'u' {
                    bound.up = true;
                } else {
                    bound.down = true;
                }
            }
            b'=' | b'0'..=b'9' => {
                // The '=' may already be consumed by the argument tokenizer.
                scan.eat(b'=');
                root_max = scan
                    .number()
                    .ok_or_else(|| bad('b', spec, "the bound value is expected"))?;
                if !scan.done() {
                    return Err(bad('b', spec, "trailing characters"));
                }
                break;
            }
            other => {
                return Err(bad('b', spec, format!("unexpected flag `{}`", other as char)))
            }
        }
    }
    // The default policy bounds in both directions.
    if !bound.up && !bound.down {
        bound.up = true;
        bound.down = true;
    }
    if bound.nonnegative && !bound.up {
        return Err(bad('b', spec, "'p' requires the (possibly implicit) 'u' bound"));
    }
    // A zero bound shrinks the root as far as the policy admits.
    if root_max == 0 {
        root_max = 1;
    }
    Ok((root_max, bound))
}

/// Decodes the `-r[w][a|m|s]` payload.
pub fn parse_reduction_spec(spec: &str) -> Result<Reduction, CliError> {
    let mut reduction = Reduction {
        severity: Some(ReductionSeverity::Mean),
        ..Reduction::default()
    };
    let mut scan = Scan::new(spec);
    if scan.eat(b'w') {
        reduction.by_weight = true;
    }
    match scan.bump() {
        None => {}
        Some(b'a') => reduction.severity = Some(ReductionSeverity::Accurate),
        Some(b'm') => reduction.severity = Some(ReductionSeverity::Mean),
        Some(b's') => reduction.severity = Some(ReductionSeverity::Severe),
        Some(other) => {
            return Err(bad('r', spec, format!("unexpected severity `{}`", other as char)))
        }
    }
    if !scan.done() {
        return Err(bad('r', spec, "trailing characters"));
    }
    Ok(reduction)
}

/// Decodes the `-l=0..2` payload.
pub fn parse_validation_spec(spec: &str) -> Result<Validation, CliError> {
    match spec.trim_start_matches('=') {
        "0" => Ok(Validation::None),
        "1" => Ok(Validation::Standard),
        "2" => Ok(Validation::Severe),
        other => Err(bad('l', spec, format!("severity `{other}` is out of 0..2"))),
    }
}

/// Decodes the `-f=MARGIN` payload.
pub fn parse_filter_spec(spec: &str) -> Result<f32, CliError> {
    let value: f32 = spec
        .trim_start_matches('=')
        .parse()
        .map_err(|_| bad('f', spec, "a float margin is expected"))?;
    if !(0.0..=1.0).contains(&value) {
        return Err(bad('f', spec, "the margin must be in [0, 1]"));
    }
    Ok(value)
}

/// Decodes the `-m[s]=GAIN_MARGMIN` payload.
pub fn parse_margin_spec(spec: &str) -> Result<(f64, bool), CliError> {
    let mut scan = Scan::new(spec);
    let div = scan.eat(b's');
    // The '=' may already be consumed by the argument tokenizer.
    scan.eat(b'=');
    let value: f64 = scan
        .rest()
        .parse()
        .map_err(|_| bad('m', spec, "a float margin is expected"))?;
    if !(-0.5..=1.0).contains(&value) {
        return Err(bad('m', spec, "the margin must be in [-1/2, 1]"));
    }
    Ok((value, div))
}

/// Decodes the `-n{r,e,a}` payload.
pub fn parse_format_spec(spec: &str) -> Result<FileFormat, CliError> {
    match spec.trim_start_matches('=') {
        "r" => Ok(FileFormat::Rcg),
        "e" => Ok(FileFormat::Nse),
        "a" => Ok(FileFormat::Nsa),
        other => Err(bad('n', spec, format!("unknown format `{other}`"))),
    }
}

/// Decodes the `-v[b|1|2|f][n][m<VALMIN>][=FILE]` payload.
pub fn parse_nodevec_spec(spec: &str) -> Result<(NodeVecOptions, Option<PathBuf>), CliError> {
    let mut opts = NodeVecOptions::default();
    let mut scan = Scan::new(spec);
    match scan.peek() {
        Some(b'b') => {
            scan.bump();
            opts.value = NodeVecValue::Bit;
        }
        Some(b'1') => {
            scan.bump();
            opts.value = NodeVecValue::Uint8;
        }
        Some(b'2') => {
            scan.bump();
            opts.value = NodeVecValue::Uint16;
        }
        Some(b'f') => {
            scan.bump();
            opts.value = NodeVecValue::Float32;
        }
        _ => {}
    }
    if scan.eat(b'n') {
        opts.numbered = true;
    }
    if scan.eat(b'm') {
        let valmin: f32 = scan
            .number()
            .ok_or_else(|| bad('v', spec, "the minimal value is expected"))?;
        if !(0.0..=1.0).contains(&valmin) {
            return Err(bad('v', spec, "the minimal value must be in [0, 1]"));
        }
        opts.valmin = valmin;
    }
    // A bare path remains when the tokenizer consumed the '=' already.
    if !scan.done() && scan.peek() != Some(b'=') {
        return Ok((opts, Some(PathBuf::from(scan.rest()))));
    }
    let file = take_file(&mut scan, 'v')?;
    Ok((opts, file))
}

/// Decodes the `-x{a}` feature-disabling payload.
pub fn parse_disable_spec(spec: &str, opts: &mut ClusterOptions) -> Result<(), CliError> {
    for c in spec.trim_start_matches('=').chars() {
        match c {
            'a' => opts.use_ahash = false,
            other => return Err(bad('x', spec, format!("unknown feature `{other}`"))),
        }
    }
    Ok(())
}

/// Decoded input options of the input network.
#[derive(Clone, Debug, Default)]
pub struct ParsedInput {
    /// Input network options.
    pub inp: InputOptions,
    /// Clustering options.
    pub clustering: ClusterOptions,
    /// Cluster output requests.
    pub outputs: Vec<OutputSpec>,
    /// Evaluation request instead of clustering.
    pub evaluate: Option<(IntrinsicsFlags, PathBuf)>,
    /// Node vectorization request.
    pub nodevec: Option<(NodeVecOptions, Option<PathBuf>)>,
    /// Report execution timings.
    pub timings: bool,
    /// Show the version; true requests the extended form.
    pub version: Option<bool>,
}

/// Decodes the full CLI into the execution request.
///
/// # Errors
/// Returns [`CliError`] on grammar violations and incompatible options.
pub fn parse_cli(cli: Cli) -> Result<ParsedInput, CliError> {
    let cli = cli.normalize();
    let mut parsed = ParsedInput {
        timings: cli.timings,
        ..ParsedInput::default()
    };

    if let Some(version) = &cli.version {
        parsed.version = Some(match version.as_str() {
            "" => false,
            "x" => true,
            other => return Err(bad('V', other, "only the `x` modifier is supported")),
        });
    }

    if cli.evaluate.is_some() && !cli.clusters.is_empty() {
        return Err(CliError::IncompatibleOutputs);
    }
    for spec in &cli.clusters {
        parsed.outputs.push(parse_cluster_spec(spec)?);
    }
    if let Some(spec) = &cli.evaluate {
        parsed.evaluate = Some(parse_eval_spec(spec)?);
    }
    if let Some(spec) = &cli.gamma {
        parse_gamma_spec(spec, &mut parsed.clustering)?;
    }
    if let Some(spec) = &cli.bound {
        let (root_max, bound) = parse_bound_spec(spec)?;
        parsed.clustering.root_max = root_max;
        parsed.clustering.root_bound = bound;
    }
    if let Some(spec) = &cli.reduce {
        if !spec.is_empty() {
            parsed.clustering.reduction = parse_reduction_spec(spec)?;
        } else {
            parsed.clustering.reduction = parse_reduction_spec("m")?;
        }
    }
    if let Some(spec) = &cli.validation {
        parsed.clustering.validation = parse_validation_spec(spec)?;
    }
    if let Some(spec) = &cli.filter {
        parsed.clustering.filter_margin = parse_filter_spec(spec)?;
    }
    if let Some(spec) = &cli.margin {
        let (value, div) = parse_margin_spec(spec)?;
        parsed.clustering = parsed.clustering.clone().with_gain_marg(value, div);
    }
    if let Some(spec) = &cli.disable {
        parse_disable_spec(spec, &mut parsed.clustering)?;
    }
    if let Some(spec) = &cli.format {
        parsed.inp.format = parse_format_spec(spec)?;
    }
    if let Some(spec) = &cli.nodevec {
        parsed.nodevec = Some(parse_nodevec_spec(spec)?);
    }
    parsed.clustering.mod_trace = cli.informative;
    parsed.inp.sumdups = cli.sumdups;
    parsed.inp.shuffle = cli.shuffle;
    if let Some(network) = cli.network {
        parsed.inp.filename = network;
    }
    parsed.clustering.validate()?;
    Ok(parsed)
}
