//! Environment health checks.
//!
//! The `doctor` command verifies that every external tool a deployment
//! drives is reachable and lists what is plugged in.
//!
//! ## Checks Performed
//!
//! - PlatformIO (`pio`) and adb, required
//! - lsof and fuser, optional (port contention resolution)
//! - The Gradle wrapper of the Android project, required
//! - The Android SDK, required

use std::fmt::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::core::{DeviceHandle, SerialEndpoint};
use crate::discovery::{discover_devices, discover_endpoints};
use crate::stages::mobile_build::{locate_sdk, MobileProject};
use crate::util::context::DeployContext;
use crate::util::process::{self, Outcome, ProcessBuilder};

/// Result of a single health check.
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    /// Name of the check
    pub name: String,

    /// Whether the check passed
    pub passed: bool,

    /// Human-readable status message
    pub message: String,

    /// Path to the tool (if applicable)
    pub path: Option<PathBuf>,

    /// Version string (if applicable)
    pub version: Option<String>,

    /// How long the check took
    #[serde(skip)]
    pub duration: Duration,

    /// Whether this check is required or optional
    pub required: bool,
}

impl CheckResult {
    /// Create a passing check result.
    pub fn pass(name: impl Into<String>, message: impl Into<String>) -> Self {
        CheckResult {
            name: name.into(),
            passed: true,
            message: message.into(),
            path: None,
            version: None,
            duration: Duration::ZERO,
            required: true,
        }
    }

    /// Create a failing check result.
    pub fn fail(name: impl Into<String>, message: impl Into<String>) -> Self {
        CheckResult {
            passed: false,
            ..Self::pass(name, message)
        }
    }

    /// Mark this check as optional.
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn with_path(mut self, path: PathBuf) -> Self {
        self.path = Some(path);
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }
}

/// Summary of all health checks.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DoctorReport {
    /// Individual check results
    pub checks: Vec<CheckResult>,

    /// Serial ports present right now
    pub endpoints: Vec<SerialEndpoint>,

    /// Android devices ready right now
    pub devices: Vec<DeviceHandle>,

    /// Total time taken
    #[serde(skip)]
    pub total_duration: Duration,
}

impl DoctorReport {
    pub fn add(&mut self, check: CheckResult) {
        self.checks.push(check);
    }

    /// Check if all required checks passed.
    pub fn all_required_passed(&self) -> bool {
        self.checks.iter().filter(|c| c.required).all(|c| c.passed)
    }

    pub fn passed_count(&self) -> usize {
        self.checks.iter().filter(|c| c.passed).count()
    }

    pub fn failed_count(&self) -> usize {
        self.checks.iter().filter(|c| !c.passed).count()
    }

    pub fn required_failed_count(&self) -> usize {
        self.checks
            .iter()
            .filter(|c| c.required && !c.passed)
            .count()
    }
}

/// Options for the doctor command.
#[derive(Debug, Clone, Default)]
pub struct DoctorOptions {
    /// Android project directory
    pub mobile_dir: PathBuf,

    /// Android SDK override
    pub sdk: Option<PathBuf>,
}

/// Run the doctor command.
pub fn doctor(ctx: &DeployContext, options: &DoctorOptions) -> DoctorReport {
    let start = Instant::now();
    let mut report = DoctorReport::default();

    report.add(check_tool(ctx, "PlatformIO", &ctx.tools.pio, &["--version"]));
    report.add(check_tool(ctx, "adb", &ctx.tools.adb, &["version"]));
    report.add(check_tool(ctx, "lsof", &ctx.tools.lsof, &["-v"]).optional());
    report.add(check_tool(ctx, "fuser", &ctx.tools.fuser, &["-V"]).optional());
    report.add(check_wrapper(&MobileProject::new(&options.mobile_dir)));
    report.add(check_sdk(options.sdk.as_deref()));

    report.endpoints = discover_endpoints(ctx.system());
    report.devices = discover_devices(ctx);

    report.total_duration = start.elapsed();
    report
}

/// Check that a tool resolves and ask it for a version line.
fn check_tool(ctx: &DeployContext, name: &str, program: &str, version_args: &[&str]) -> CheckResult {
    let start = Instant::now();

    let Some(path) = ctx.system.find_executable(program) else {
        return CheckResult::fail(name, format!("`{}` not found on PATH", program))
            .with_duration(start.elapsed());
    };

    let mut check = CheckResult::pass(name, format!("Found {}", program)).with_path(path.clone());
    let cmd = ProcessBuilder::new(&path).args(version_args);
    // lsof and fuser print their version to stderr and may exit non-zero.
    let output = match process::run_tolerant(ctx.system(), &cmd) {
        Ok(Outcome::Succeeded(out)) => Some(format!("{}\n{}", out.stdout, out.stderr)),
        Ok(Outcome::FailedTolerated(f)) | Ok(Outcome::FailedFatal(f)) => {
            Some(format!("{}\n{}", f.stdout, f.stderr))
        }
        Err(e) => {
            tracing::debug!("{:#}", e);
            None
        }
    };
    if let Some(version) = output.as_deref().and_then(version_line) {
        check = check.with_version(version);
    }

    check.with_duration(start.elapsed())
}

fn version_line(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && l.to_lowercase().contains("version"))
        .or_else(|| text.lines().map(str::trim).find(|l| !l.is_empty()))
        .map(str::to_string)
}

fn check_wrapper(project: &MobileProject) -> CheckResult {
    let wrapper = project.wrapper_path();
    if wrapper.is_file() {
        CheckResult::pass("Gradle wrapper", "Found the Gradle wrapper").with_path(wrapper)
    } else {
        CheckResult::fail(
            "Gradle wrapper",
            format!("{} does not exist", wrapper.display()),
        )
    }
}

fn check_sdk(sdk: Option<&Path>) -> CheckResult {
    match locate_sdk(sdk) {
        Ok(path) => CheckResult::pass("Android SDK", "Found the Android SDK").with_path(path),
        Err(e) => CheckResult::fail("Android SDK", e.to_string()),
    }
}

/// Format a doctor report for display.
pub fn format_report(report: &DoctorReport, verbose: bool) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "meshdeploy doctor");
    let _ = writeln!(output, "=================\n");

    let _ = writeln!(output, "Checks:");
    for check in &report.checks {
        let status = if check.passed { "[OK]" } else { "[!!]" };
        let required = if check.required { "" } else { " (optional)" };

        let _ = writeln!(output, "  {} {}{}", status, check.name, required);

        if verbose || !check.passed {
            let _ = writeln!(output, "      {}", check.message);
        }
        if verbose {
            if let Some(path) = &check.path {
                let _ = writeln!(output, "      Path: {}", path.display());
            }
            if let Some(version) = &check.version {
                let _ = writeln!(output, "      Version: {}", version);
            }
        }
    }

    let _ = writeln!(output, "\nSerial ports:");
    if report.endpoints.is_empty() {
        let _ = writeln!(output, "  (none)");
    }
    for endpoint in &report.endpoints {
        let _ = writeln!(output, "  {}", endpoint);
    }

    let _ = writeln!(output, "\nAndroid devices:");
    if report.devices.is_empty() {
        let _ = writeln!(output, "  (none)");
    }
    for device in &report.devices {
        let _ = writeln!(output, "  {}", device);
    }

    let passed = report.passed_count();
    let failed = report.failed_count();
    let required_failed = report.required_failed_count();

    let _ = writeln!(output, "\nSummary: {} passed, {} failed", passed, failed);

    if required_failed > 0 {
        let _ = writeln!(
            output,
            "\nWarning: {} required check(s) failed. Deployment will not work.",
            required_failed
        );
    } else if failed > 0 {
        let _ = writeln!(
            output,
            "\nAll required checks passed. {} optional check(s) failed.",
            failed
        );
    } else {
        let _ = writeln!(output, "\nAll checks passed. Ready to deploy.");
    }

    output
}
