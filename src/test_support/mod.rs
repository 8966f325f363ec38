//! Test utilities and mocks for meshdeploy unit tests.
//!
//! [`MockSystem`] stands in for the host: it answers commands from scripted
//! expectations, pretends a set of tools and device nodes exist, simulates
//! processes holding serial ports (answering `lsof`/`fuser` from that state
//! and reacting to signals) and records every call and sleep.
//!
//! # Example
//!
//! ```rust,ignore
//! let sys = Arc::new(MockSystem::new());
//! sys.add_tool("pio");
//! sys.expect_contains("--target upload", exit(2, "Failed to connect"));
//!
//! let ctx = mock_context(&sys);
//! // Run a stage with ctx, then inspect sys.calls()...
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{bail, Result};

use crate::util::config::Tools;
use crate::util::context::DeployContext;
use crate::util::process::{ProcessBuilder, ProcessOutput};
use crate::util::shell::{ColorChoice, Shell, ShellMode, Verbosity};
use crate::util::system::{KillSignal, Pid, System};

/// A successful output with the given stdout.
pub fn ok(stdout: impl Into<String>) -> ProcessOutput {
    ProcessOutput {
        code: Some(0),
        stdout: stdout.into(),
        stderr: String::new(),
    }
}

/// A failed output with the given exit code and stderr.
pub fn exit(code: i32, stderr: impl Into<String>) -> ProcessOutput {
    ProcessOutput {
        code: Some(code),
        stdout: String::new(),
        stderr: stderr.into(),
    }
}

/// Pattern for matching commands in MockSystem.
#[derive(Debug, Clone)]
pub enum CommandPattern {
    /// Exact match on full command string.
    Exact(String),
    /// Match if command starts with prefix.
    StartsWith(String),
    /// Match if command contains substring.
    Contains(String),
}

impl CommandPattern {
    pub fn matches(&self, cmd: &str) -> bool {
        match self {
            CommandPattern::Exact(s) => cmd == s,
            CommandPattern::StartsWith(s) => cmd.starts_with(s),
            CommandPattern::Contains(s) => cmd.contains(s),
        }
    }
}

/// Expectation for a command execution.
#[derive(Debug, Clone)]
pub struct CommandExpectation {
    pub pattern: CommandPattern,
    pub output: ProcessOutput,
    /// Number of times this expectation can be used (None = unlimited).
    pub times: Option<usize>,
    pub used: usize,
}

impl CommandExpectation {
    pub fn new(pattern: CommandPattern, output: ProcessOutput) -> Self {
        CommandExpectation {
            pattern,
            output,
            times: None,
            used: 0,
        }
    }

    pub fn times(mut self, n: usize) -> Self {
        self.times = Some(n);
        self
    }

    fn available(&self) -> bool {
        self.times.map_or(true, |n| self.used < n)
    }
}

/// How a simulated port holder reacts to signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resistance {
    /// Survives SIGTERM, dies on SIGKILL.
    IgnoresTerm,
    /// Survives every signal and `fuser -k`.
    Unkillable,
}

#[derive(Debug, Default)]
struct MockState {
    expectations: Vec<CommandExpectation>,
    calls: Vec<String>,
    default_output: Option<ProcessOutput>,
    tools: BTreeSet<String>,
    paths: BTreeSet<PathBuf>,
    holders: BTreeMap<PathBuf, Vec<Pid>>,
    resistance: BTreeMap<Pid, Resistance>,
    signals: Vec<(Pid, KillSignal)>,
    sleeps: Vec<Duration>,
}

impl MockState {
    fn release(&mut self, pid: Pid, signal: KillSignal) {
        let survives = match (self.resistance.get(&pid), signal) {
            (Some(Resistance::Unkillable), _) => true,
            (Some(Resistance::IgnoresTerm), KillSignal::Terminate) => true,
            _ => false,
        };
        if !survives {
            for pids in self.holders.values_mut() {
                pids.retain(|p| *p != pid);
            }
        }
    }

    /// Answer `lsof -t -- PATH`, `fuser PATH` and `fuser -k PATH` from the
    /// simulated holder table.
    fn holder_tool(&mut self, cmd: &ProcessBuilder) -> Option<ProcessOutput> {
        let program = cmd.get_program().file_name()?.to_string_lossy().into_owned();
        let args = cmd.get_args();
        let path = PathBuf::from(args.last()?);
        let pids = self.holders.get(&path).cloned().unwrap_or_default();

        match program.as_str() {
            "lsof" => Some(if pids.is_empty() {
                exit(1, "")
            } else {
                ok(pids.iter().map(|p| format!("{}\n", p)).collect::<String>())
            }),
            "fuser" if args.first().map(String::as_str) == Some("-k") => {
                for pid in pids {
                    self.release(pid, KillSignal::Kill);
                }
                Some(ok(""))
            }
            "fuser" => Some(if pids.is_empty() {
                exit(1, "")
            } else {
                ProcessOutput {
                    code: Some(0),
                    stdout: pids.iter().map(|p| format!(" {}", p)).collect(),
                    stderr: format!("{}:", path.display()),
                }
            }),
            _ => None,
        }
    }
}

/// Mock host for testing the deployment stages.
#[derive(Debug, Default)]
pub struct MockSystem {
    state: Mutex<MockState>,
}

impl MockSystem {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make a tool resolvable on the mock PATH.
    pub fn add_tool(&self, name: &str) -> &Self {
        self.state().tools.insert(name.to_string());
        self
    }

    /// Make a device node (or any path) exist.
    pub fn add_path(&self, path: impl AsRef<Path>) -> &Self {
        self.state().paths.insert(path.as_ref().to_path_buf());
        self
    }

    /// Simulate `pid` holding `path` open.
    pub fn hold(&self, path: impl AsRef<Path>, pid: u32) -> &Self {
        self.state()
            .holders
            .entry(path.as_ref().to_path_buf())
            .or_default()
            .push(Pid::new(pid));
        self
    }

    /// Make a simulated holder resist signals.
    pub fn resist(&self, pid: u32, resistance: Resistance) -> &Self {
        self.state().resistance.insert(Pid::new(pid), resistance);
        self
    }

    /// Add an expectation for an exact command match.
    pub fn expect(&self, cmd: &str, output: ProcessOutput) -> &Self {
        self.expect_pattern(CommandExpectation::new(
            CommandPattern::Exact(cmd.to_string()),
            output,
        ))
    }

    /// Add an expectation for a command starting with a prefix.
    pub fn expect_prefix(&self, prefix: &str, output: ProcessOutput) -> &Self {
        self.expect_pattern(CommandExpectation::new(
            CommandPattern::StartsWith(prefix.to_string()),
            output,
        ))
    }

    /// Add an expectation for a command containing a substring.
    pub fn expect_contains(&self, substring: &str, output: ProcessOutput) -> &Self {
        self.expect_pattern(CommandExpectation::new(
            CommandPattern::Contains(substring.to_string()),
            output,
        ))
    }

    pub fn expect_pattern(&self, expectation: CommandExpectation) -> &Self {
        self.state().expectations.push(expectation);
        self
    }

    /// Set a default output for commands that don't match any expectation.
    pub fn set_default(&self, output: ProcessOutput) -> &Self {
        self.state().default_output = Some(output);
        self
    }

    /// All commands that were run, in order.
    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    /// Commands containing `needle`.
    pub fn calls_containing(&self, needle: &str) -> Vec<String> {
        self.calls().into_iter().filter(|c| c.contains(needle)).collect()
    }

    /// Signals delivered, in order.
    pub fn signals(&self) -> Vec<(Pid, KillSignal)> {
        self.state().signals.clone()
    }

    /// Sleeps requested, in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.state().sleeps.clone()
    }

    /// Current simulated holders of `path`.
    pub fn holders(&self, path: impl AsRef<Path>) -> Vec<Pid> {
        self.state()
            .holders
            .get(path.as_ref())
            .cloned()
            .unwrap_or_default()
    }
}

impl System for MockSystem {
    fn exec(&self, cmd: &ProcessBuilder) -> Result<ProcessOutput> {
        let full_cmd = cmd.display_command();
        let mut state = self.state();
        state.calls.push(full_cmd.clone());

        for exp in &mut state.expectations {
            if exp.pattern.matches(&full_cmd) && exp.available() {
                exp.used += 1;
                return Ok(exp.output.clone());
            }
        }

        if let Some(output) = state.holder_tool(cmd) {
            return Ok(output);
        }

        if let Some(ref default) = state.default_output {
            return Ok(default.clone());
        }

        bail!("unexpected command: {}", full_cmd)
    }

    fn find_executable(&self, name: &str) -> Option<PathBuf> {
        self.state()
            .tools
            .contains(name)
            .then(|| PathBuf::from("/usr/bin").join(name))
    }

    fn exists(&self, path: &Path) -> bool {
        self.state().paths.contains(path)
    }

    fn signal(&self, pid: Pid, signal: KillSignal) -> Result<()> {
        let mut state = self.state();
        state.signals.push((pid, signal));
        state.release(pid, signal);
        Ok(())
    }

    fn sleep(&self, duration: Duration) {
        self.state().sleeps.push(duration);
    }
}

/// A shell that only prints warnings and errors.
pub fn quiet_shell() -> Arc<Shell> {
    Arc::new(Shell::new(ShellMode::Human {
        verbosity: Verbosity::Quiet,
        color: ColorChoice::Never,
    }))
}

/// A deploy context over a mock system with the stock tool names.
pub fn mock_context(system: &Arc<MockSystem>) -> DeployContext {
    let system: Arc<dyn System> = system.clone();
    DeployContext::new(system, quiet_shell(), Tools::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_expectations_and_calls() {
        let sys = MockSystem::new();
        sys.expect_prefix("pio run", ok("done"));
        sys.expect_pattern(
            CommandExpectation::new(CommandPattern::Contains("install".into()), exit(1, "nope"))
                .times(1),
        );

        let out = sys.exec(&ProcessBuilder::new("pio").args(["run", "-d", "."])).unwrap();
        assert_eq!(out.stdout, "done");

        let install = ProcessBuilder::new("adb").args(["install", "a.apk"]);
        assert_eq!(sys.exec(&install).unwrap().code, Some(1));
        assert!(sys.exec(&install).is_err());

        assert_eq!(sys.calls().len(), 3);
    }

    #[test]
    fn test_mock_holders_react_to_signals() {
        let sys = MockSystem::new();
        sys.hold("/dev/ttyACM0", 100).hold("/dev/ttyACM0", 200);
        sys.resist(200, Resistance::IgnoresTerm);

        let lsof = ProcessBuilder::new("lsof").args(["-t", "--", "/dev/ttyACM0"]);
        assert_eq!(sys.exec(&lsof).unwrap().stdout, "100\n200\n");

        sys.signal(Pid::new(100), KillSignal::Terminate).unwrap();
        sys.signal(Pid::new(200), KillSignal::Terminate).unwrap();
        assert_eq!(sys.holders("/dev/ttyACM0"), [Pid::new(200)]);

        sys.signal(Pid::new(200), KillSignal::Kill).unwrap();
        assert!(sys.holders("/dev/ttyACM0").is_empty());
        assert_eq!(sys.exec(&lsof).unwrap().code, Some(1));
    }
}
