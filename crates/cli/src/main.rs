use clap::{CommandFactory, Parser, ValueEnum};
use depscan_core::{format_report, DependencyScanner, OutputFormat, ScanConfig, Target};
use indicatif::{ProgressBar, ProgressStyle};
use log::debug;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "depscan")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "List the modules a Python program pulls in when it runs")]
#[command(long_about = "Runs the target under `python -v`, subtracts what the bare \
    interpreter imports on its own, and cross-checks the result against the import \
    statements in the target's source. Reports dependencies, builtins and imports \
    that failed to resolve.\n\n\
    The target is a Python file, an importable module name, or (with --kind inline) \
    a snippet of code.")]
pub struct Args {
    /// Python file, module name, or code to scan
    pub target: Option<String>,

    /// How to interpret the target
    #[arg(short, long, value_enum, default_value_t = TargetKind::Auto)]
    pub kind: TargetKind,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormatArg::Summary)]
    pub format: OutputFormatArg,

    /// Output file (defaults to stdout)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Include builtin modules in the summary
    #[arg(long)]
    pub builtins: bool,

    /// Python interpreter to trace with (overrides config and DEPSCAN_PYTHON)
    #[arg(long)]
    pub python: Option<PathBuf>,

    /// Seconds to wait for each interpreter run (0 = no limit)
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Do not subtract the bare interpreter's imports
    #[arg(long)]
    pub no_baseline: bool,

    /// TOML config file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Show verbose progress and debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum TargetKind {
    /// File if it exists, module name otherwise
    Auto,
    File,
    Module,
    Inline,
}

#[derive(ValueEnum, Clone, Debug)]
pub enum OutputFormatArg {
    Json,
    Yaml,
    Summary,
}

impl From<OutputFormatArg> for OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Json => OutputFormat::Json,
            OutputFormatArg::Yaml => OutputFormat::Yaml,
            OutputFormatArg::Summary => OutputFormat::Summary,
        }
    }
}

fn to_target(descriptor: String, kind: TargetKind) -> Target {
    match kind {
        TargetKind::Auto => Target::infer(&descriptor),
        TargetKind::File => Target::File(PathBuf::from(descriptor)),
        TargetKind::Module => Target::Module(descriptor),
        TargetKind::Inline => Target::Inline(descriptor),
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let Some(descriptor) = args.target.clone() else {
        eprintln!("no target provided\n");
        Args::command().print_help()?;
        return Ok(());
    };

    // Build config: file, then environment, then flags
    let mut config = match &args.config {
        Some(path) => ScanConfig::from_file(path)?,
        None => ScanConfig::default(),
    }
    .with_env();

    if let Some(python) = args.python.clone() {
        config = config.with_interpreter(python);
    }
    if let Some(secs) = args.timeout {
        config = config.with_timeout((secs > 0).then(|| Duration::from_secs(secs)));
    }
    if args.no_baseline {
        config = config.with_baseline(false);
    }
    debug!("Config: {:?}", config);

    let target = to_target(descriptor, args.kind);

    // Show progress if verbose
    let spinner = if args.verbose {
        let pb = ProgressBar::new_spinner();
        pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
        pb.enable_steady_tick(Duration::from_millis(100));
        pb.set_message(format!("Tracing {}...", target));
        Some(pb)
    } else {
        None
    };

    let scanner = DependencyScanner::new(config);
    let result = scanner.scan(&target);

    if let Some(ref pb) = spinner {
        match &result {
            Ok(report) => pb.finish_with_message(format!(
                "Found {} dependencies in {}ms",
                report.dependencies.len(),
                report.metadata.scan_duration_ms
            )),
            Err(_) => pb.finish_and_clear(),
        }
    }
    let report = result?;

    let output = format_report(&report, args.format.into(), args.builtins)?;

    // Write output
    if let Some(path) = args.output {
        fs::write(&path, &output)?;
        if args.verbose {
            eprintln!("Output written to: {}", path.display());
        }
    } else {
        print!("{}", output);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_are_valid() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_target_is_optional() {
        let args = Args::try_parse_from(["depscan"]).unwrap();
        assert!(args.target.is_none());
    }

    #[test]
    fn test_explicit_kinds() {
        let args = Args::try_parse_from(["depscan", "--kind", "inline", "import os"]).unwrap();
        assert_eq!(
            to_target(args.target.unwrap(), args.kind),
            Target::Inline("import os".to_string())
        );

        assert_eq!(
            to_target("pkg.mod".to_string(), TargetKind::Module),
            Target::Module("pkg.mod".to_string())
        );
        assert_eq!(
            to_target("missing.py".to_string(), TargetKind::File),
            Target::File(PathBuf::from("missing.py"))
        );
    }

    #[test]
    fn test_auto_kind_falls_back_to_module() {
        assert_eq!(
            to_target("definitely_not_a_file_here".to_string(), TargetKind::Auto),
            Target::Module("definitely_not_a_file_here".to_string())
        );
    }

    #[test]
    fn test_flags() {
        let args = Args::try_parse_from([
            "depscan",
            "app.py",
            "--format",
            "json",
            "--builtins",
            "--timeout",
            "0",
            "--no-baseline",
        ])
        .unwrap();
        assert!(matches!(args.format, OutputFormatArg::Json));
        assert!(args.builtins);
        assert_eq!(args.timeout, Some(0));
        assert!(args.no_baseline);
    }
}
