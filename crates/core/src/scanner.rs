use crate::classifier::DependencyClassifier;
use crate::config::ScanConfig;
use crate::launcher::Launcher;
use crate::models::{ScanMetadata, ScanReport, StaticImport};
use crate::parsers::{PythonParser, SyntaxTree};
use crate::target::{Target, TargetError, TargetResolver, TargetSource};
use crate::trace::{Trace, Tracer};
use log::{debug, info, warn};
use std::time::Instant;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error(transparent)]
    TargetError(#[from] TargetError),
}

/// Finds and classifies the dependencies of a Python target
pub struct DependencyScanner {
    config: ScanConfig,
    launcher: Box<dyn Launcher>,
}

impl DependencyScanner {
    /// A scanner that launches the interpreter named in `config`
    pub fn new(config: ScanConfig) -> Self {
        let launcher = Box::new(config.launcher());
        Self { config, launcher }
    }

    pub fn with_launcher(config: ScanConfig, launcher: Box<dyn Launcher>) -> Self {
        Self { config, launcher }
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Resolve the target, then trace the baseline, trace the target and
    /// read its source, in that order.
    ///
    /// Only an unresolvable target is an error; every later failure narrows
    /// the report instead.
    pub fn scan(&self, target: &Target) -> Result<ScanReport, ScanError> {
        let start = Instant::now();
        let launcher = self.launcher.as_ref();

        // 1. Resolve before launching anything traced
        let resolved = TargetResolver::new(launcher).resolve(target)?;
        info!("Scanning {}", resolved.target);

        let tracer = Tracer::new(launcher);
        let mut classifier = DependencyClassifier::new();
        if let Some(own) = &resolved.own_module {
            classifier.ignore(own.clone());
        }

        // 2. Baseline
        let baseline = if self.config.baseline {
            tracer.baseline()
        } else {
            debug!("Baseline disabled");
            Trace::default()
        };
        classifier.ingest_baseline(&baseline);

        // 3. Dynamic trace
        let trace = tracer.target(&resolved.invocation);
        debug!(
            "Target trace has {} imports and {} failures",
            trace.records.len(),
            trace.missing.len()
        );
        classifier.ingest_trace(&trace);

        // 4. Static imports
        let static_imports = match &resolved.source {
            Some(source) => extract_static(source),
            None => {
                debug!("No Python source for {}, skipping static imports", resolved.target);
                vec![]
            }
        };
        classifier.ingest_static(&static_imports);

        let result = classifier.finish();
        if !result.import_errors.is_empty() {
            warn!(
                "{} import(s) failed: {}",
                result.import_errors.len(),
                result
                    .import_errors
                    .sorted()
                    .iter()
                    .map(|d| d.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }

        let metadata = ScanMetadata {
            exit: trace.exit,
            scan_duration_ms: start.elapsed().as_millis() as u64,
            ..ScanMetadata::default()
        };

        Ok(ScanReport {
            target: resolved.target.to_string(),
            invocation: resolved.invocation.args().to_vec(),
            dependencies: result.dependencies,
            builtins: result.builtins,
            import_errors: result.import_errors,
            baseline: result.baseline,
            static_imports,
            trace: result.trace,
            metadata,
        })
    }
}

/// Parse the target's own source; unreadable source yields nothing
fn extract_static(source: &TargetSource) -> Vec<StaticImport> {
    let tree = match source {
        TargetSource::File(path) => SyntaxTree::from_file(path),
        TargetSource::Text(code) => SyntaxTree::parse(code.as_str()),
    };

    match tree {
        Ok(tree) => {
            if tree.has_errors() {
                debug!("Source has syntax errors, static imports may be incomplete");
            }
            PythonParser::new().extract(&tree)
        }
        Err(e) => {
            warn!("Could not read target source: {}", e);
            vec![]
        }
    }
}
