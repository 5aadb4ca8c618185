//! Command-line front end for [`compute::ReductionDispatcher`].
//!
//! Each invocation issues one dispatch. With `--collapse` the binary acts as
//! the caller that composes a full reduction: it feeds the partials of each
//! dispatch back in until a single value remains.

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use compute::{
    ComputeBackend, CpuBackend, ReduceConfig, ReduceOp, ReductionDispatcher, ReductionOutput,
    DEFAULT_WORKGROUP_SIZE,
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendChoice {
    /// GPU when available, host otherwise.
    Auto,
    Cpu,
    Gpu,
}

#[derive(Parser, Debug)]
#[command(name = "reducer", about = "Run one single-stage reduction dispatch")]
pub struct Args {
    /// Comma-separated input values.
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true, conflicts_with = "count")]
    pub values: Vec<f32>,

    /// Reduce the values 1..=N instead of explicit values.
    #[arg(long)]
    pub count: Option<u32>,

    /// Combining function: sum, min or max.
    #[arg(long, default_value = "sum")]
    pub op: ReduceOp,

    /// Input elements folded by each workgroup.
    #[arg(long, default_value_t = DEFAULT_WORKGROUP_SIZE)]
    pub workgroup_size: u32,

    /// Bind a full debug buffer and print its records.
    #[arg(long)]
    pub debug: bool,

    #[arg(long, value_enum, default_value_t = BackendChoice::Auto)]
    pub backend: BackendChoice,

    /// Re-dispatch on the partials until one value remains.
    #[arg(long)]
    pub collapse: bool,
}

impl Args {
    fn input(&self) -> Vec<f32> {
        match self.count {
            Some(n) => (1..=n).map(|v| v as f32).collect(),
            None => self.values.clone(),
        }
    }

    fn config(&self) -> ReduceConfig {
        ReduceConfig {
            op: self.op,
            workgroup_size: self.workgroup_size,
        }
    }
}

fn select_backend(choice: BackendChoice) -> Result<Arc<dyn ComputeBackend>> {
    match choice {
        BackendChoice::Auto => Ok(compute::default_backend()?),
        BackendChoice::Cpu => Ok(Arc::new(CpuBackend::new())),
        #[cfg(feature = "gpu")]
        BackendChoice::Gpu => {
            let gpu = compute::WgpuBackend::try_new().context("GPU backend requested")?;
            Ok(Arc::new(gpu))
        }
        #[cfg(not(feature = "gpu"))]
        BackendChoice::Gpu => bail!("reducer was built without the `gpu` feature"),
    }
}

/// Log filter from `RUST_LOG`, falling back to `info` when it is unset or
/// does not parse.
pub fn log_filter(rust_log: Option<&str>) -> EnvFilter {
    rust_log
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

/// One line per debug record of a dispatch, or nothing when the dispatch ran
/// without a debug buffer.
pub fn debug_lines(output: &ReductionOutput) -> Vec<String> {
    output
        .debug
        .iter()
        .flatten()
        .map(|record| {
            format!(
                "workgroup {}: first={} count={} partial={}",
                record.workgroup_id, record.first_index, record.element_count, record.partial
            )
        })
        .collect()
}

/// Dispatches once, or repeatedly when `collapse` is set. Returns every
/// dispatch's output in order.
pub fn reduce(
    dispatcher: &ReductionDispatcher,
    input: Vec<f32>,
    debug: bool,
    collapse: bool,
) -> Result<Vec<ReductionOutput>> {
    let mut passes = Vec::new();
    let mut values = input;
    loop {
        let output = dispatcher
            .dispatch(&values, debug)
            .with_context(|| format!("dispatch {} over {} values", passes.len() + 1, values.len()))?;
        let done = !collapse || output.is_scalar();
        if !done && output.partials.len() >= values.len() {
            bail!("workgroup size {} cannot shrink the input", dispatcher.config().workgroup_size);
        }
        values.clone_from(&output.partials);
        passes.push(output);
        if done {
            return Ok(passes);
        }
    }
}

pub fn run(args: &Args) -> Result<()> {
    let backend = select_backend(args.backend)?;
    let dispatcher = ReductionDispatcher::new(backend, args.config());
    let input = args.input();
    tracing::info!(
        op = ?args.op,
        elements = input.len(),
        workgroup_size = args.workgroup_size,
        "Starting reduction"
    );

    let passes = reduce(&dispatcher, input, args.debug, args.collapse)?;
    for (i, pass) in passes.iter().enumerate() {
        tracing::info!("Dispatch {} produced {} partials.", i + 1, pass.partials.len());
        for line in debug_lines(pass) {
            println!("  {line}");
        }
    }
    if let Some(last) = passes.last() {
        println!(
            "{}",
            last.partials
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(",")
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cpu_dispatcher(op: ReduceOp, workgroup_size: u32) -> ReductionDispatcher {
        ReductionDispatcher::new(Arc::new(CpuBackend::new()), ReduceConfig { op, workgroup_size })
    }

    #[test]
    fn parses_values_and_options() {
        let args = Args::try_parse_from([
            "reducer", "--values", "1,-2.5,3", "--op", "max", "--workgroup-size", "4", "--debug",
            "--backend", "cpu",
        ])
        .unwrap();
        assert_eq!(args.input(), vec![1.0, -2.5, 3.0]);
        assert_eq!(args.config(), ReduceConfig { op: ReduceOp::Max, workgroup_size: 4 });
        assert!(args.debug);
        assert_eq!(args.backend, BackendChoice::Cpu);
    }

    #[test]
    fn count_generates_a_range() {
        let args = Args::try_parse_from(["reducer", "--count", "4"]).unwrap();
        assert_eq!(args.input(), vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(args.config(), ReduceConfig::default());
    }

    #[test]
    fn values_and_count_conflict() {
        assert!(Args::try_parse_from(["reducer", "--values", "1", "--count", "2"]).is_err());
        assert!(Args::try_parse_from(["reducer", "--op", "mean"]).is_err());
    }

    #[test]
    fn single_dispatch_without_collapse() {
        let input: Vec<f32> = (1..=8).map(|v| v as f32).collect();
        let passes = reduce(&cpu_dispatcher(ReduceOp::Sum, 4), input, false, false).unwrap();
        assert_eq!(passes.len(), 1);
        assert_eq!(passes[0].partials, vec![10.0, 26.0]);
    }

    #[test]
    fn collapse_feeds_partials_back() {
        let input: Vec<f32> = (1..=8).map(|v| v as f32).collect();
        let passes = reduce(&cpu_dispatcher(ReduceOp::Sum, 4), input, true, true).unwrap();
        assert_eq!(passes.len(), 2);
        assert_eq!(passes[1].partials, vec![36.0]);
        assert_eq!(passes[1].debug.as_ref().map(Vec::len), Some(1));
    }

    #[test]
    fn collapse_refuses_a_width_of_one() {
        let result = reduce(&cpu_dispatcher(ReduceOp::Sum, 1), vec![1.0, 2.0], false, true);
        assert!(result.is_err());
    }

    #[test]
    fn debug_records_are_printed_per_workgroup() {
        let input: Vec<f32> = (0..10).map(|v| v as f32).collect();
        let passes = reduce(&cpu_dispatcher(ReduceOp::Sum, 4), input.clone(), true, false).unwrap();
        assert_eq!(
            debug_lines(&passes[0]),
            vec![
                "workgroup 0: first=0 count=4 partial=6",
                "workgroup 1: first=4 count=4 partial=22",
                "workgroup 2: first=8 count=2 partial=17",
            ]
        );

        let quiet = reduce(&cpu_dispatcher(ReduceOp::Sum, 4), input, false, false).unwrap();
        assert!(debug_lines(&quiet[0]).is_empty());
    }

    #[test]
    fn logs_default_to_info() {
        use tracing_subscriber::filter::LevelFilter;
        assert_eq!(log_filter(None).max_level_hint(), Some(LevelFilter::INFO));
        assert_eq!(
            log_filter(Some("compute=debug")).max_level_hint(),
            Some(LevelFilter::DEBUG)
        );
    }

    #[test]
    fn empty_input_surfaces_invalid_input() {
        let err = reduce(&cpu_dispatcher(ReduceOp::Sum, 4), Vec::new(), false, false).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<compute::ComputeError>(),
            Some(compute::ComputeError::InvalidInput(_))
        ));
    }
}
