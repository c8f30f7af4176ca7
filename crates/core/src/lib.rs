//! Depscan Core Library
//!
//! This library finds the modules a Python program pulls in by combining
//! three sources: a verbose import trace of the program (`python -v`), a
//! trace of the bare interpreter used to subtract ambient imports, and the
//! import statements in the program's own source.
//!
//! # Features
//!
//! - Resolve files, module names, located modules and inline code to a runtime invocation
//! - Parse verbose import traces into builtins, dependencies and import errors
//! - Extract import statements from Python source with tree-sitter
//! - Output results in JSON, YAML or a plain-text summary
//!
//! # Example
//!
//! ```no_run
//! use depscan_core::{format_report, DependencyScanner, OutputFormat, ScanConfig, Target};
//!
//! let scanner = DependencyScanner::new(ScanConfig::default());
//! let report = scanner.scan(&Target::infer("app.py")).unwrap();
//!
//! let text = format_report(&report, OutputFormat::Summary, true).unwrap();
//! println!("{}", text);
//! ```

pub mod classifier;
pub mod config;
pub mod launcher;
pub mod models;
pub mod output;
pub mod parsers;
pub mod scanner;
pub mod target;
pub mod trace;

// Re-exports for convenience
pub use classifier::{Classification, DependencyClassifier};
pub use config::{ConfigError, ScanConfig};
pub use launcher::{Launcher, PythonLauncher, Sink};
pub use models::*;
pub use output::{format_report, format_summary, FormatError, OutputFormat};
pub use scanner::{DependencyScanner, ScanError};
pub use target::{Invocation, Target, TargetError};
