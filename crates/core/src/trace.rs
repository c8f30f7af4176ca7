//! Running the runtime with verbose import tracing and reading what it reports
//!
//! `python -v` writes one line to stderr per module it loads:
//!
//! ```text
//! import 'encodings' # <_frozen_importlib_external.SourceFileLoader object at 0x7f...>
//! import '_io' # <class '_frozen_importlib.BuiltinImporter'>
//! import os # precompiled from /usr/lib/python2.7/os.pyc
//! ```
//!
//! and a failing import ends with `ModuleNotFoundError: No module named 'foo'`.

use crate::launcher::{Launcher, Sink};
use crate::models::{ChildExit, TraceRecord};
use crate::target::{read_back, Invocation};
use log::{debug, info, warn};
use std::io;

const TRACE_KEYWORD: &str = "import";
const PEDIGREE_MARKER: char = '#';
const ORIGIN_MARKER: &str = " from ";
const ALIAS_MARKER: &str = "imported as";
const MISSING_MODULE: &str = "No module named";

/// Kind given to trace lines that report an aliased import
pub const ALIASED_KIND: &str = "aliased";

/// One line of a verbose trace, classified
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceLine {
    /// A module was imported
    Import(TraceRecord),
    /// A module could not be found
    Missing(String),
    /// Anything else
    Other,
}

/// Classify a single diagnostic line
pub fn parse_line(line: &str) -> TraceLine {
    let line = line.trim_end();

    if let Some((_, tail)) = line.split_once(MISSING_MODULE) {
        return match missing_name(tail) {
            Some(name) => TraceLine::Missing(name.to_string()),
            None => TraceLine::Other,
        };
    }

    let Some(rest) = line.strip_prefix(TRACE_KEYWORD) else {
        return TraceLine::Other;
    };
    // `importlib ...` and friends are not trace lines
    if !rest.starts_with(char::is_whitespace) {
        return TraceLine::Other;
    }
    let rest = rest.trim();

    let record = if let Some((name, pedigree)) = rest.split_once(PEDIGREE_MARKER) {
        let pedigree = pedigree.trim();
        let (kind, origin) = match pedigree.split_once(ORIGIN_MARKER) {
            Some((kind, origin)) => (kind.trim(), Some(unquote(origin.trim()).to_string())),
            None => (pedigree, None),
        };
        TraceRecord {
            name: unquote(name.trim()).to_string(),
            kind: non_empty(kind),
            origin: origin.filter(|o| !o.is_empty()),
            comment: non_empty(pedigree),
            is_baseline: false,
        }
    } else if let Some((name, alias)) = rest.split_once(ALIAS_MARKER) {
        TraceRecord {
            name: unquote(name.trim()).to_string(),
            kind: Some(ALIASED_KIND.to_string()),
            origin: None,
            comment: Some(format!("{} {}", ALIAS_MARKER, unquote(alias.trim()))),
            is_baseline: false,
        }
    } else {
        TraceRecord {
            name: unquote(rest).to_string(),
            kind: None,
            origin: None,
            comment: None,
            is_baseline: false,
        }
    };

    if record.name.is_empty() || record.name.contains(char::is_whitespace) {
        debug!("Skipping malformed trace line: {}", line);
        return TraceLine::Other;
    }
    TraceLine::Import(record)
}

/// Everything a traced run reported
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Trace {
    /// Import lines in the order they were written
    pub records: Vec<TraceRecord>,
    /// Names of modules that failed to import
    pub missing: Vec<String>,
    /// How the child ended; `None` if it never started
    pub exit: Option<ChildExit>,
}

impl Trace {
    /// Parse a captured diagnostic stream
    pub fn parse(text: &str) -> Self {
        let mut trace = Trace::default();
        for line in text.lines() {
            match parse_line(line) {
                TraceLine::Import(record) => trace.records.push(record),
                TraceLine::Missing(name) => trace.missing.push(name),
                TraceLine::Other => {}
            }
        }
        trace
    }
}

/// Runs traced invocations through a [`Launcher`]
pub struct Tracer<'a> {
    launcher: &'a dyn Launcher,
}

impl<'a> Tracer<'a> {
    pub fn new(launcher: &'a dyn Launcher) -> Self {
        Self { launcher }
    }

    /// Trace the bare runtime. Failures give an empty trace.
    pub fn baseline(&self) -> Trace {
        match self.capture(&Invocation::baseline()) {
            Ok(trace) => {
                if !trace.exit.map(|e| e.success()).unwrap_or(false) {
                    debug!("Baseline run ended abnormally: {:?}", trace.exit);
                }
                debug!("Baseline has {} imports", trace.records.len());
                trace
            }
            Err(e) => {
                debug!("Baseline trace unavailable, nothing will be suppressed: {}", e);
                Trace::default()
            }
        }
    }

    /// Trace the target. Only a launch failure gives an empty trace.
    pub fn target(&self, invocation: &Invocation) -> Trace {
        let trace = match self.capture(invocation) {
            Ok(trace) => trace,
            Err(e) => {
                warn!("Execution failed: {}", e);
                return Trace::default();
            }
        };

        match trace.exit {
            Some(ChildExit::Code(0)) => info!("Target exited normally"),
            Some(ChildExit::Code(code)) => {
                warn!("Target returned {}, a dependency is likely missing", code)
            }
            Some(ChildExit::Signal(signal)) => warn!("Target was terminated by signal {}", signal),
            Some(ChildExit::TimedOut) => warn!("Target timed out, using the partial trace"),
            None => {}
        }
        trace
    }

    /// Launch with stdout discarded and stderr captured, then parse stderr.
    ///
    /// The capture file is anonymous and goes away when dropped.
    fn capture(&self, invocation: &Invocation) -> io::Result<Trace> {
        let mut stderr = tempfile::tempfile()?;
        let exit = self
            .launcher
            .launch(invocation, Sink::Discard, Sink::Capture(stderr.try_clone()?))?;

        let text = read_back(&mut stderr)?;
        let mut trace = Trace::parse(&text);
        trace.exit = Some(exit);
        Ok(trace)
    }
}

/// The module name after `No module named`, quoted (Python 3) or bare (Python 2)
fn missing_name(tail: &str) -> Option<&str> {
    let tail = tail.trim();
    let name = match tail.chars().next()? {
        quote @ ('\'' | '"') => tail[1..].split(quote).next()?,
        _ => tail.split_whitespace().next()?,
    };
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

fn unquote(s: &str) -> &str {
    s.trim_matches(|c| c == '\'' || c == '"')
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::io::Write;

    fn import(line: &str) -> TraceRecord {
        match parse_line(line) {
            TraceLine::Import(record) => record,
            other => panic!("expected an import, got {:?}", other),
        }
    }

    #[test]
    fn test_python3_source_line() {
        let record = import(
            "import 'encodings' # <_frozen_importlib_external.SourceFileLoader object at 0x7f3a>",
        );
        assert_eq!(record.name, "encodings");
        assert_eq!(
            record.kind.as_deref(),
            Some("<_frozen_importlib_external.SourceFileLoader object at 0x7f3a>")
        );
        assert!(record.origin.is_none());
    }

    #[test]
    fn test_python3_builtin_line() {
        let record = import("import '_io' # <class '_frozen_importlib.BuiltinImporter'>");
        assert_eq!(record.name, "_io");
        assert!(record.kind.unwrap().contains("BuiltinImporter"));
    }

    #[test]
    fn test_pedigree_with_origin() {
        let record = import("import os # precompiled from /usr/lib/python2.7/os.pyc\n");
        assert_eq!(record.name, "os");
        assert_eq!(record.kind.as_deref(), Some("precompiled"));
        assert_eq!(record.origin.as_deref(), Some("/usr/lib/python2.7/os.pyc"));
        assert_eq!(
            record.comment.as_deref(),
            Some("precompiled from /usr/lib/python2.7/os.pyc")
        );
    }

    #[test]
    fn test_dynamically_loaded_origin() {
        let record = import("import _ssl # dynamically loaded from /usr/lib/_ssl.so");
        assert_eq!(record.kind.as_deref(), Some("dynamically loaded"));
        assert_eq!(record.origin.as_deref(), Some("/usr/lib/_ssl.so"));
    }

    #[test]
    fn test_bare_name() {
        let record = import("import zipimport");
        assert_eq!(record.name, "zipimport");
        assert!(record.kind.is_none());
        assert!(record.comment.is_none());
    }

    #[test]
    fn test_aliased_line_keeps_original_name() {
        let record = import("import 'xml.etree.cElementTree' imported as 'ET'");
        assert_eq!(record.name, "xml.etree.cElementTree");
        assert_eq!(record.kind.as_deref(), Some(ALIASED_KIND));
        assert_eq!(record.comment.as_deref(), Some("imported as ET"));
    }

    #[test]
    fn test_missing_module_python3() {
        assert_eq!(
            parse_line("ModuleNotFoundError: No module named 'foo'"),
            TraceLine::Missing("foo".to_string())
        );
    }

    #[test]
    fn test_missing_module_python2() {
        assert_eq!(
            parse_line("ImportError: No module named foo.bar"),
            TraceLine::Missing("foo.bar".to_string())
        );
    }

    #[test]
    fn test_missing_submodule_of_non_package() {
        assert_eq!(
            parse_line("ModuleNotFoundError: No module named 'os.nope'; 'os' is not a package"),
            TraceLine::Missing("os.nope".to_string())
        );
        assert_eq!(parse_line("ImportError: No module named"), TraceLine::Other);
    }

    #[test]
    fn test_unrelated_lines() {
        assert_eq!(parse_line("# installing zipimport hook"), TraceLine::Other);
        assert_eq!(parse_line("# cleanup[2] removing sys"), TraceLine::Other);
        assert_eq!(parse_line("importlib bootstrap"), TraceLine::Other);
        assert_eq!(parse_line("    import foo"), TraceLine::Other);
        assert_eq!(parse_line("import"), TraceLine::Other);
        assert_eq!(parse_line("import # nothing"), TraceLine::Other);
        assert_eq!(parse_line(""), TraceLine::Other);
    }

    #[test]
    fn test_trace_parse_collects_both_shapes() {
        let text = "\
# installing zipimport hook
import 'json' # <SourceFileLoader>
import '_json' # <class '_frozen_importlib.BuiltinImporter'>
Traceback (most recent call last):
  File \"<string>\", line 1, in <module>
ModuleNotFoundError: No module named 'foo'
";
        let trace = Trace::parse(text);
        let names: Vec<&str> = trace.records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["json", "_json"]);
        assert_eq!(trace.missing, vec!["foo".to_string()]);
        assert!(trace.exit.is_none());
    }

    struct CannedLauncher {
        stderr: &'static str,
        exit: ChildExit,
        fail: bool,
        calls: Cell<usize>,
    }

    impl Launcher for CannedLauncher {
        fn launch(&self, _invocation: &Invocation, stdout: Sink, stderr: Sink) -> io::Result<ChildExit> {
            self.calls.set(self.calls.get() + 1);
            if self.fail {
                return Err(io::Error::new(io::ErrorKind::NotFound, "python3 not found"));
            }
            assert!(matches!(stdout, Sink::Discard));
            if let Sink::Capture(mut file) = stderr {
                file.write_all(self.stderr.as_bytes())?;
            }
            Ok(self.exit)
        }
    }

    #[test]
    fn test_target_failure_still_parses_partial_output() {
        let launcher = CannedLauncher {
            stderr: "import 'yaml' # <SourceFileLoader>\nModuleNotFoundError: No module named 'lxml'\n",
            exit: ChildExit::Code(1),
            fail: false,
            calls: Cell::new(0),
        };

        let trace = Tracer::new(&launcher).target(&Invocation::import_module("app"));
        assert_eq!(trace.exit, Some(ChildExit::Code(1)));
        assert_eq!(trace.records.len(), 1);
        assert_eq!(trace.missing, vec!["lxml".to_string()]);
    }

    #[test]
    fn test_signal_still_parses() {
        let launcher = CannedLauncher {
            stderr: "import 'yaml' # <SourceFileLoader>\n",
            exit: ChildExit::Signal(11),
            fail: false,
            calls: Cell::new(0),
        };

        let trace = Tracer::new(&launcher).target(&Invocation::import_module("app"));
        assert_eq!(trace.records.len(), 1);
    }

    #[test]
    fn test_launch_failure_gives_empty_trace() {
        let launcher = CannedLauncher {
            stderr: "",
            exit: ChildExit::Code(0),
            fail: true,
            calls: Cell::new(0),
        };
        let tracer = Tracer::new(&launcher);

        assert_eq!(tracer.baseline(), Trace::default());
        assert_eq!(tracer.target(&Invocation::import_module("app")), Trace::default());
        assert_eq!(launcher.calls.get(), 2);
    }
}
