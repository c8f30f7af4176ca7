use crate::models::{Dependency, DependencySet, StaticImport, TraceRecord, LEVEL_STATIC};
use crate::trace::Trace;
use log::debug;
use std::collections::HashSet;

/// Final output of a [`DependencyClassifier`]
#[derive(Debug, Clone, Default)]
pub struct Classification {
    pub dependencies: DependencySet,
    pub builtins: DependencySet,
    pub import_errors: DependencySet,
    pub baseline: DependencySet,
    /// Every target trace record, baseline ones included
    pub trace: Vec<TraceRecord>,
}

/// Merges the baseline, the target trace and the target's static imports.
///
/// Feed it in that order, then call [`DependencyClassifier::finish`]. A name
/// in the baseline never ends up in `dependencies` or `builtins`.
#[derive(Debug, Default)]
pub struct DependencyClassifier {
    baseline: DependencySet,
    dependencies: DependencySet,
    builtins: DependencySet,
    import_errors: DependencySet,
    trace: Vec<TraceRecord>,
    ignored: HashSet<String>,
}

impl DependencyClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record what the bare runtime imports
    pub fn ingest_baseline(&mut self, baseline: &Trace) {
        for record in &baseline.records {
            let mut dep = Dependency::from_record(record);
            dep.is_baseline = true;
            self.baseline.insert(dep);
        }
    }

    /// Never report `name` as a dependency (the target's own module)
    pub fn ignore(&mut self, name: impl Into<String>) {
        self.ignored.insert(name.into());
    }

    /// File the target trace's records into builtins and dependencies
    pub fn ingest_trace(&mut self, trace: &Trace) {
        for record in &trace.records {
            let mut record = record.clone();
            record.is_baseline = self.baseline.contains(&record.name);

            if !record.is_baseline
                && !self.ignored.contains(&record.name)
                && !self.dependencies.contains(&record.name)
                && !self.builtins.contains(&record.name)
            {
                let dep = Dependency::from_record(&record);
                if dep.is_builtin() {
                    self.builtins.insert(dep);
                } else {
                    self.dependencies.insert(dep);
                }
            }

            self.trace.push(record);
        }

        // A missing module is reported even when the baseline knows the name
        for name in &trace.missing {
            let mut dep = Dependency::named(name.as_str());
            dep.is_baseline = self.baseline.contains(name);
            self.import_errors.insert(dep);
        }
    }

    /// Confirm or add the target's own import statements
    pub fn ingest_static(&mut self, imports: &[StaticImport]) {
        for import in imports {
            let name = import.module.as_str();

            if import.is_relative() {
                debug!("Skipping relative import {} (line {})", name, import.line);
                continue;
            }
            if self.baseline.contains(name) || self.ignored.contains(name) {
                continue;
            }

            if self.confirm(name) {
                continue;
            }

            // `import os.path` is traced as `os` (and `posixpath`), never as `os.path`
            if let Some(parent) = parents(name).find(|parent| {
                self.baseline.contains(parent)
                    || self.dependencies.contains(parent)
                    || self.builtins.contains(parent)
            }) {
                if !self.baseline.contains(parent) {
                    self.confirm(parent);
                }
                debug!("{} is covered by its package {}", name, parent);
                continue;
            }

            debug!("{} is imported by the target but was never traced", name);
            self.dependencies.insert(Dependency::from_static(name));
        }
    }

    /// Raise an already filed record to top-level; false if there is none
    fn confirm(&mut self, name: &str) -> bool {
        match self.dependencies.get_mut(name) {
            Some(dep) => dep.level = LEVEL_STATIC,
            None => match self.builtins.get_mut(name) {
                Some(dep) => dep.level = LEVEL_STATIC,
                None => return false,
            },
        }
        true
    }

    pub fn finish(self) -> Classification {
        Classification {
            dependencies: self.dependencies,
            builtins: self.builtins,
            import_errors: self.import_errors,
            baseline: self.baseline,
            trace: self.trace,
        }
    }
}

/// Enclosing packages of a dotted name, nearest first (`a.b.c` gives `a.b`, `a`)
fn parents(name: &str) -> impl Iterator<Item = &str> {
    name.rmatch_indices('.').map(move |(i, _)| &name[..i])
}
