use serde::{Deserialize, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;

/// Seen only in the dynamic trace
pub const LEVEL_DYNAMIC: u8 = 0;
/// Confirmed as an import statement in the target's own source
pub const LEVEL_STATIC: u8 = 1;

/// A classified unit of import
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    /// Module identifier as it appeared in the trace or the source
    pub name: String,
    /// Load kind in the runtime's own vocabulary (e.g. "builtin", "precompiled")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Filesystem path or location string the module was loaded from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    /// Confirmation tier, see [`LEVEL_DYNAMIC`] and [`LEVEL_STATIC`]
    #[serde(default)]
    pub level: u8,
    /// Also imported by the bare runtime
    #[serde(default)]
    pub is_baseline: bool,
    /// Raw trailing annotation from the trace line
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl Dependency {
    /// A record carrying nothing but a name
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: None,
            origin: None,
            level: LEVEL_DYNAMIC,
            is_baseline: false,
            comment: None,
        }
    }

    /// A record synthesized from a static import the trace never observed
    pub fn from_static(name: impl Into<String>) -> Self {
        Self {
            level: LEVEL_STATIC,
            ..Self::named(name)
        }
    }

    pub fn from_record(record: &TraceRecord) -> Self {
        Self {
            name: record.name.clone(),
            kind: record.kind.clone(),
            origin: record.origin.clone(),
            level: LEVEL_DYNAMIC,
            is_baseline: false,
            comment: record.comment.clone(),
        }
    }

    /// Whether the runtime reports this module as compiled into the interpreter
    pub fn is_builtin(&self) -> bool {
        self.kind
            .as_deref()
            .map(|kind| kind.to_ascii_lowercase().contains("builtin"))
            .unwrap_or(false)
    }

    pub fn is_top_level(&self) -> bool {
        self.level >= LEVEL_STATIC
    }
}

/// Mapping from module name to its [`Dependency`] record.
///
/// Insertion order carries no meaning. [`DependencySet::sorted`] exists for
/// presentation and serialization only; classification logic works on names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "Vec<Dependency>")]
pub struct DependencySet {
    entries: HashMap<String, Dependency>,
}

impl DependencySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Dependency> {
        self.entries.get(name)
    }

    pub(crate) fn get_mut(&mut self, name: &str) -> Option<&mut Dependency> {
        self.entries.get_mut(name)
    }

    /// Insert a record keyed by its name, returning the one it replaced
    pub(crate) fn insert(&mut self, dependency: Dependency) -> Option<Dependency> {
        self.entries.insert(dependency.name.clone(), dependency)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Dependency> {
        self.entries.values()
    }

    /// Records ordered by name, for display
    pub fn sorted(&self) -> Vec<&Dependency> {
        let mut deps: Vec<&Dependency> = self.entries.values().collect();
        deps.sort_by(|a, b| a.name.cmp(&b.name));
        deps
    }
}

impl From<Vec<Dependency>> for DependencySet {
    fn from(deps: Vec<Dependency>) -> Self {
        deps.into_iter().collect()
    }
}

impl FromIterator<Dependency> for DependencySet {
    fn from_iter<I: IntoIterator<Item = Dependency>>(iter: I) -> Self {
        let mut set = DependencySet::new();
        for dep in iter {
            set.insert(dep);
        }
        set
    }
}

impl Serialize for DependencySet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.sorted())
    }
}

/// One `import` line parsed out of a verbose trace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceRecord {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Name was also imported by the bare runtime
    #[serde(default)]
    pub is_baseline: bool,
}

/// An import statement found in the target's own source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticImport {
    /// The module being imported (`pkg` for `from pkg import sub`)
    pub module: String,
    /// Specific names imported by `from ... import`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<String>,
    /// Alias if any (e.g., `import numpy as np`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// Line number in source file
    pub line: usize,
}

impl StaticImport {
    /// `from . import x` and `from .mod import y`
    pub fn is_relative(&self) -> bool {
        self.module.starts_with('.')
    }
}

/// How a child runtime process finished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "value")]
pub enum ChildExit {
    /// Exited normally with this code
    Code(i32),
    /// Terminated by this signal number
    Signal(i32),
    /// Killed after exceeding the configured timeout
    TimedOut,
}

impl ChildExit {
    pub fn success(&self) -> bool {
        matches!(self, ChildExit::Code(0))
    }
}

impl fmt::Display for ChildExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChildExit::Code(code) => write!(f, "exit code {}", code),
            ChildExit::Signal(signal) => write!(f, "signal {}", signal),
            ChildExit::TimedOut => write!(f, "timed out"),
        }
    }
}

/// Result of scanning one target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    /// Human-readable description of the target
    pub target: String,
    /// Arguments the runtime was launched with (after the trace flag)
    pub invocation: Vec<String>,
    /// Non-baseline modules loaded from outside the interpreter, plus static imports
    pub dependencies: DependencySet,
    /// Non-baseline modules compiled into the interpreter
    pub builtins: DependencySet,
    /// Modules the target failed to import
    pub import_errors: DependencySet,
    /// Everything the bare runtime imports on its own
    pub baseline: DependencySet,
    /// Import statements found in the target's source
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub static_imports: Vec<StaticImport>,
    /// Every import line of the target trace, in order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trace: Vec<TraceRecord>,
    pub metadata: ScanMetadata,
}

/// Scan metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanMetadata {
    /// How the traced target exited; absent when it could not be launched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit: Option<ChildExit>,
    pub scan_duration_ms: u64,
    pub timestamp: String,
    pub tool_version: String,
}

impl Default for ScanMetadata {
    fn default() -> Self {
        Self {
            exit: None,
            scan_duration_ms: 0,
            timestamp: chrono::Utc::now().to_rfc3339(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
