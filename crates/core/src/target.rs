//! Target descriptors and the runtime invocations they resolve to

use crate::launcher::{Launcher, Sink};
use crate::models::ChildExit;
use log::{debug, info};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use thiserror::Error;

/// Dotted Python module name (`a`, `a.b_c`)
static MODULE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\W\d]\w*(\.[^\W\d]\w*)*$").expect("MODULE_NAME regex is invalid")
});

/// Prefix of the line the trial import prints its module file on
const FILE_MARKER: &str = "__depscan_file__=";

const TRIAL_IMPORT: &str = "import importlib, sys; \
    m = importlib.import_module(sys.argv[1]); \
    sys.stdout.write('\\n__depscan_file__=%s\\n' % (getattr(m, '__file__', None) or ''))";

const IMPORT_FROM_DIR: &str = "import sys; sys.path.append(sys.argv[1]); import ";

/// Prefix of the line the shadow check prints a competing module's origin on
const SHADOW_MARKER: &str = "__depscan_shadow__=";

/// Locate `argv[1]` without importing it, ignoring the current directory and `argv[2]`
const FIND_ELSEWHERE: &str = "import importlib.util, os, sys; \
    d = os.path.abspath(sys.argv[2]); \
    sys.path[:] = [p for p in sys.path if p and os.path.abspath(p) != d]; \
    s = importlib.util.find_spec(sys.argv[1]); \
    sys.stdout.write('\\n__depscan_shadow__=%s\\n' % (s and (s.origin or 'namespace') or ''))";

#[derive(Error, Debug)]
pub enum TargetError {
    #[error("'{0}' is neither an existing file nor a valid module name")]
    InvalidName(String),
    #[error("Cannot import module '{name}': {reason}")]
    Unresolvable { name: String, reason: String },
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
}

/// What to scan, tagged by how it should be run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "value")]
pub enum Target {
    /// A Python source file on disk
    File(PathBuf),
    /// An importable dotted module name
    Module(String),
    /// A module that has already been located, with its backing file
    Loaded { name: String, file: PathBuf },
    /// Python code passed to `-c`
    Inline(String),
}

impl Target {
    /// Existing files become [`Target::File`], anything else [`Target::Module`].
    ///
    /// Never produces [`Target::Inline`]; code has to be asked for explicitly.
    pub fn infer(descriptor: &str) -> Self {
        let path = Path::new(descriptor);
        if path.is_file() {
            Target::File(path.to_path_buf())
        } else {
            Target::Module(descriptor.to_string())
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::File(path) => write!(f, "{}", path.display()),
            Target::Module(name) => write!(f, "{}", name),
            Target::Loaded { name, file } => write!(f, "{} ({})", name, file.display()),
            Target::Inline(code) => write!(f, "-c {:?}", code),
        }
    }
}

/// Arguments for one run of the runtime, excluding the interpreter itself
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invocation {
    args: Vec<String>,
    traced: bool,
}

impl Invocation {
    /// The bare runtime doing nothing
    pub fn baseline() -> Self {
        Self::inline("pass")
    }

    pub fn import_module(name: &str) -> Self {
        Self::inline(&format!("import {}", name))
    }

    /// Put `dir` on the import path, then import `module` from it
    pub fn import_from_dir(dir: &Path, module: &str) -> Self {
        Self {
            args: vec![
                "-c".to_string(),
                format!("{}{}", IMPORT_FROM_DIR, module),
                dir.to_string_lossy().into_owned(),
            ],
            traced: true,
        }
    }

    pub fn run_file(path: &Path) -> Self {
        Self {
            args: vec![path.to_string_lossy().into_owned()],
            traced: true,
        }
    }

    pub fn inline(code: &str) -> Self {
        Self {
            args: vec!["-c".to_string(), code.to_string()],
            traced: true,
        }
    }

    /// Import `name` without tracing and report its `__file__` on stdout
    pub fn trial_import(name: &str) -> Self {
        Self {
            args: vec!["-c".to_string(), TRIAL_IMPORT.to_string(), name.to_string()],
            traced: false,
        }
    }

    /// Check whether `name` is importable from anywhere but `dir`
    pub fn find_elsewhere(name: &str, dir: &Path) -> Self {
        Self {
            args: vec![
                "-c".to_string(),
                FIND_ELSEWHERE.to_string(),
                name.to_string(),
                dir.to_string_lossy().into_owned(),
            ],
            traced: false,
        }
    }

    /// Arbitrary arguments, run without the trace flag
    #[cfg(test)]
    pub(crate) fn untraced(args: Vec<String>) -> Self {
        Self {
            args,
            traced: false,
        }
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn is_traced(&self) -> bool {
        self.traced
    }
}

/// Where the target's own source can be read for static extraction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSource {
    File(PathBuf),
    Text(String),
}

/// A target ready to be traced
#[derive(Debug, Clone)]
pub struct ResolvedTarget {
    pub target: Target,
    pub invocation: Invocation,
    /// Source to extract static imports from, when there is any
    pub source: Option<TargetSource>,
    /// Module name the target itself is imported under
    pub own_module: Option<String>,
}

/// Turns [`Target`]s into [`ResolvedTarget`]s
pub struct TargetResolver<'a> {
    launcher: &'a dyn Launcher,
}

impl<'a> TargetResolver<'a> {
    pub fn new(launcher: &'a dyn Launcher) -> Self {
        Self { launcher }
    }

    pub fn resolve(&self, target: &Target) -> Result<ResolvedTarget, TargetError> {
        match target {
            Target::File(path) => Ok(self.resolve_file(target, path)),
            Target::Loaded { file, .. } => Ok(ResolvedTarget {
                target: target.clone(),
                invocation: Invocation::run_file(file),
                source: Some(TargetSource::File(file.clone())),
                own_module: None,
            }),
            Target::Inline(code) => Ok(ResolvedTarget {
                target: target.clone(),
                invocation: Invocation::inline(code),
                source: Some(TargetSource::Text(code.clone())),
                own_module: None,
            }),
            Target::Module(name) => self.resolve_module(target, name),
        }
    }

    fn resolve_file(&self, target: &Target, path: &Path) -> ResolvedTarget {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let run_directly = || ResolvedTarget {
            target: target.clone(),
            invocation: Invocation::run_file(path),
            source: Some(TargetSource::File(path.to_path_buf())),
            own_module: None,
        };

        if !is_module_name(&stem) || stem.contains('.') {
            debug!("{} cannot be imported by name, running it directly", path.display());
            return run_directly();
        }

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        // An appended directory loses to the stdlib and site-packages
        match self.find_elsewhere(&stem, &dir) {
            Ok(Some(origin)) => {
                info!(
                    "{} would import {} from {}, running it directly",
                    path.display(),
                    stem,
                    origin
                );
                return run_directly();
            }
            Ok(None) => {}
            Err(e) => debug!("Could not check whether {} is shadowed: {}", stem, e),
        }

        ResolvedTarget {
            target: target.clone(),
            invocation: Invocation::import_from_dir(&dir, &stem),
            source: Some(TargetSource::File(path.to_path_buf())),
            own_module: Some(stem),
        }
    }

    /// Where `name` resolves when `dir` is not on the import path, if anywhere
    fn find_elsewhere(&self, name: &str, dir: &Path) -> io::Result<Option<String>> {
        let mut stdout = tempfile::tempfile()?;
        let exit = self.launcher.launch(
            &Invocation::find_elsewhere(name, dir),
            Sink::Capture(stdout.try_clone()?),
            Sink::Discard,
        )?;
        if !exit.success() {
            debug!("Shadow check for {} ended with {}", name, exit);
            return Ok(None);
        }

        let output = read_back(&mut stdout)?;
        Ok(marker_value(&output, SHADOW_MARKER).map(str::to_string))
    }

    fn resolve_module(&self, target: &Target, name: &str) -> Result<ResolvedTarget, TargetError> {
        if !is_module_name(name) {
            return Err(TargetError::InvalidName(name.to_string()));
        }

        let file = self.trial_import(name)?;
        let source = file
            .filter(|path| crate::parsers::is_python_source(path))
            .map(TargetSource::File);

        Ok(ResolvedTarget {
            target: target.clone(),
            invocation: Invocation::import_module(name),
            source,
            own_module: None,
        })
    }

    /// Import `name` in a quiet child, returning its `__file__` when it has one
    fn trial_import(&self, name: &str) -> Result<Option<PathBuf>, TargetError> {
        let mut stdout = tempfile::tempfile()?;
        let exit = self
            .launcher
            .launch(
                &Invocation::trial_import(name),
                Sink::Capture(stdout.try_clone()?),
                Sink::Discard,
            )
            .map_err(|e| TargetError::Unresolvable {
                name: name.to_string(),
                reason: format!("failed to launch the runtime: {}", e),
            })?;

        if exit != ChildExit::Code(0) {
            return Err(TargetError::Unresolvable {
                name: name.to_string(),
                reason: format!("trial import ended with {}", exit),
            });
        }

        let output = read_back(&mut stdout)?;
        let file = marker_value(&output, FILE_MARKER).map(PathBuf::from);

        match &file {
            Some(path) => info!("Module {} is at {}", name, path.display()),
            None => info!("Module {} has no __file__, importing it by name", name),
        }
        Ok(file)
    }
}

/// Whether `name` is a syntactically valid dotted module name
pub fn is_module_name(name: &str) -> bool {
    MODULE_NAME.is_match(name)
}

/// Value of the last `marker` line a helper script printed, if non-empty
fn marker_value<'a>(output: &'a str, marker: &str) -> Option<&'a str> {
    output
        .lines()
        .rev()
        .find_map(|line| line.strip_prefix(marker))
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Rewind a capture file and read what the child wrote into it
pub(crate) fn read_back(file: &mut File) -> io::Result<String> {
    file.seek(SeekFrom::Start(0))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
