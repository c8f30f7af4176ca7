//! Launching the Python runtime as a child process
//!
//! The rest of the crate only talks to the [`Launcher`] trait, so the trace
//! logic can be driven by canned output in tests.

use crate::models::ChildExit;
use crate::target::Invocation;
use log::{debug, warn};
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Where a child's output stream goes
#[derive(Debug)]
pub enum Sink {
    /// Thrown away
    Discard,
    /// Written into this file
    Capture(File),
}

impl From<Sink> for Stdio {
    fn from(sink: Sink) -> Self {
        match sink {
            Sink::Discard => Stdio::null(),
            Sink::Capture(file) => Stdio::from(file),
        }
    }
}

/// Runs a Python runtime for an [`Invocation`].
///
/// Implementations must not return before both sinks are fully written.
pub trait Launcher {
    fn launch(&self, invocation: &Invocation, stdout: Sink, stderr: Sink) -> io::Result<ChildExit>;
}

/// Launches a real interpreter binary
#[derive(Debug, Clone)]
pub struct PythonLauncher {
    interpreter: PathBuf,
    trace_flag: String,
    timeout: Option<Duration>,
}

impl PythonLauncher {
    pub fn new(interpreter: impl Into<PathBuf>) -> Self {
        Self {
            interpreter: interpreter.into(),
            trace_flag: "-v".to_string(),
            timeout: None,
        }
    }

    pub fn with_trace_flag(mut self, flag: impl Into<String>) -> Self {
        self.trace_flag = flag.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn interpreter(&self) -> &PathBuf {
        &self.interpreter
    }

    fn command(&self, invocation: &Invocation) -> Command {
        let mut cmd = Command::new(&self.interpreter);
        if invocation.is_traced() {
            cmd.arg(&self.trace_flag);
        }
        cmd.args(invocation.args());
        cmd
    }

    fn wait(&self, mut child: Child) -> io::Result<ChildExit> {
        let Some(timeout) = self.timeout else {
            return child.wait().map(exit_of);
        };

        let deadline = Instant::now() + timeout;
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(exit_of(status));
            }
            if Instant::now() >= deadline {
                warn!(
                    "Child {} exceeded {:?}, killing it",
                    child.id(),
                    timeout
                );
                // kill fails if the child exited in the meantime; reap either way
                let _ = child.kill();
                child.wait()?;
                return Ok(ChildExit::TimedOut);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

impl Default for PythonLauncher {
    fn default() -> Self {
        Self::new("python3")
    }
}

impl Launcher for PythonLauncher {
    fn launch(&self, invocation: &Invocation, stdout: Sink, stderr: Sink) -> io::Result<ChildExit> {
        let mut cmd = self.command(invocation);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr));

        debug!("Launching {:?}", cmd);
        let child = cmd.spawn()?;
        // Dropping `cmd` closes our copies of the sink handles
        drop(cmd);
        self.wait(child)
    }
}

#[cfg(unix)]
fn exit_of(status: ExitStatus) -> ChildExit {
    use std::os::unix::process::ExitStatusExt;

    match (status.code(), status.signal()) {
        (Some(code), _) => ChildExit::Code(code),
        (None, Some(signal)) => ChildExit::Signal(signal),
        (None, None) => ChildExit::Code(-1),
    }
}

#[cfg(not(unix))]
fn exit_of(status: ExitStatus) -> ChildExit {
    ChildExit::Code(status.code().unwrap_or(-1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Seek, SeekFrom};

    #[test]
    fn test_command_includes_trace_flag_only_when_traced() {
        let launcher = PythonLauncher::new("python3");

        let traced = launcher.command(&Invocation::import_module("json"));
        let args: Vec<_> = traced.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(args, vec!["-v", "-c", "import json"]);

        let trial = launcher.command(&Invocation::trial_import("json"));
        let args: Vec<_> = trial.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(args.first().map(String::as_str), Some("-c"));
    }

    #[test]
    fn test_missing_interpreter_is_launch_error() {
        let launcher = PythonLauncher::new("/nonexistent/bin/python-depscan");
        let result = launcher.launch(&Invocation::baseline(), Sink::Discard, Sink::Discard);
        assert!(result.is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_captures_output_of_real_process() {
        let launcher = PythonLauncher::new("sh");
        let invocation = Invocation::untraced(vec![
            "-c".to_string(),
            "echo out; echo err 1>&2; exit 3".to_string(),
        ]);

        let mut out = tempfile::tempfile().unwrap();
        let mut err = tempfile::tempfile().unwrap();
        let exit = launcher
            .launch(
                &invocation,
                Sink::Capture(out.try_clone().unwrap()),
                Sink::Capture(err.try_clone().unwrap()),
            )
            .unwrap();
        assert_eq!(exit, ChildExit::Code(3));

        let mut text = String::new();
        out.seek(SeekFrom::Start(0)).unwrap();
        out.read_to_string(&mut text).unwrap();
        assert_eq!(text, "out\n");

        text.clear();
        err.seek(SeekFrom::Start(0)).unwrap();
        err.read_to_string(&mut text).unwrap();
        assert_eq!(text, "err\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_kills_child() {
        let launcher = PythonLauncher::new("sh").with_timeout(Some(Duration::from_millis(100)));
        let invocation = Invocation::untraced(vec!["-c".to_string(), "sleep 5".to_string()]);

        let started = Instant::now();
        let exit = launcher
            .launch(&invocation, Sink::Discard, Sink::Discard)
            .unwrap();

        assert_eq!(exit, ChildExit::TimedOut);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[cfg(unix)]
    #[test]
    fn test_signal_is_reported() {
        let launcher = PythonLauncher::new("sh");
        let invocation = Invocation::untraced(vec!["-c".to_string(), "kill -9 $$".to_string()]);

        let exit = launcher
            .launch(&invocation, Sink::Discard, Sink::Discard)
            .unwrap();
        assert_eq!(exit, ChildExit::Signal(9));
    }
}
