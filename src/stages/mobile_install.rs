//! Installing the app on attached devices and launching it.
//!
//! Everything here is per device and tolerant: a device that refuses an
//! APK or the launch is reported and the next one is tried.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::Result;
use regex::Regex;
use serde::Serialize;

use crate::core::{DeviceHandle, Variant};
use crate::stages::mobile_build::{self, MobileProject};
use crate::util::context::DeployContext;
use crate::util::diagnostic::suggestions;
use crate::util::fs;
use crate::util::process::{self, Outcome, ProcessBuilder};
use crate::util::shell::Status;

static MANIFEST_PACKAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<manifest\b[^>]*?\bpackage\s*=\s*"([^"]+)""#).expect("valid manifest regex")
});

/// Which APKs get installed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallMode {
    /// Build the chosen variant and install its one APK.
    Single,
    /// Install every file matching the pattern, relative to the project root.
    Glob(String),
}

/// Outcome of one install or launch attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Attempt {
    Ok,
    Failed { code: Option<i32>, message: String },
}

impl Attempt {
    pub fn is_ok(&self) -> bool {
        matches!(self, Attempt::Ok)
    }
}

/// One APK installed (or not) on one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallRecord {
    pub apk: PathBuf,
    pub result: Attempt,
}

/// Everything that happened on one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceReport {
    pub device: DeviceHandle,
    pub installs: Vec<InstallRecord>,
    /// `None` when launching was disabled or skipped.
    pub launch: Option<Attempt>,
}

impl DeviceReport {
    pub fn all_ok(&self) -> bool {
        self.installs.iter().all(|i| i.result.is_ok())
            && self.launch.as_ref().map_or(true, Attempt::is_ok)
    }
}

/// Inputs of the install stage.
#[derive(Debug, Clone)]
pub struct InstallPlan<'a> {
    pub project: &'a MobileProject,
    /// Base for [`InstallMode::Glob`] patterns.
    pub root: &'a Path,
    pub mode: &'a InstallMode,
    pub variant: Variant,
    pub sdk: &'a Path,
    pub launch: bool,
}

/// Extract the `package` attribute of the `<manifest>` element.
pub fn parse_package_name(manifest: &str) -> Option<String> {
    MANIFEST_PACKAGE
        .captures(manifest)
        .map(|caps| caps[1].trim().to_string())
        .filter(|p| !p.is_empty())
}

/// Package name from the project's `AndroidManifest.xml`.
pub fn read_package_name(project: &MobileProject) -> Option<String> {
    let path = project.manifest_path();
    match fs::read_to_string(&path) {
        Ok(content) => parse_package_name(&content),
        Err(e) => {
            tracing::debug!("{:#}", e);
            None
        }
    }
}

/// `adb -s SERIAL install -r -d APK`
pub fn install_command(adb: impl AsRef<Path>, device: &DeviceHandle, apk: &Path) -> ProcessBuilder {
    ProcessBuilder::new(adb)
        .args(["-s", device.serial(), "install", "-r", "-d"])
        .arg(apk)
}

/// `adb -s SERIAL shell monkey -p PKG -c android.intent.category.LAUNCHER 1`
pub fn launch_command(adb: impl AsRef<Path>, device: &DeviceHandle, package: &str) -> ProcessBuilder {
    ProcessBuilder::new(adb).args([
        "-s",
        device.serial(),
        "shell",
        "monkey",
        "-p",
        package,
        "-c",
        "android.intent.category.LAUNCHER",
        "1",
    ])
}

/// Resolve the APKs for `plan`, building when needed.
///
/// Single mode always builds. Glob mode builds only if the pattern matches
/// nothing yet, then matches again.
pub fn collect_apks(ctx: &DeployContext, plan: &InstallPlan<'_>) -> Result<Vec<PathBuf>> {
    match plan.mode {
        InstallMode::Single => {
            let artifact = mobile_build::build_apk(ctx, plan.project, plan.variant, plan.sdk)?;
            Ok(vec![artifact.path().to_path_buf()])
        }
        InstallMode::Glob(pattern) => {
            let mut matches = fs::glob_files(plan.root, pattern)?;
            if matches.is_empty() {
                ctx.shell
                    .note(format!("nothing matches `{}` yet; building first", pattern));
                mobile_build::build_apk(ctx, plan.project, plan.variant, plan.sdk)?;
                matches = fs::glob_files(plan.root, pattern)?;
            }
            if matches.is_empty() {
                ctx.shell.warn(format!(
                    "no APK matches `{}` even after building; nothing to install",
                    pattern
                ));
            }
            Ok(matches)
        }
    }
}

/// Install every APK on every device, then launch if asked.
pub fn install_all(
    ctx: &DeployContext,
    apks: &[PathBuf],
    devices: &[DeviceHandle],
    package: Option<&str>,
    launch: bool,
) -> Result<Vec<DeviceReport>> {
    let adb = ctx.require_tool(&ctx.tools.adb, suggestions::INSTALL_PLATFORM_TOOLS)?;

    let mut reports: Vec<DeviceReport> = devices
        .iter()
        .map(|device| {
            let installs = apks
                .iter()
                .map(|apk| InstallRecord {
                    apk: apk.clone(),
                    result: install_one(ctx, &adb, device, apk),
                })
                .collect();
            DeviceReport {
                device: device.clone(),
                installs,
                launch: None,
            }
        })
        .collect();

    if launch {
        match package {
            Some(package) => {
                for report in &mut reports {
                    report.launch = Some(launch_one(ctx, &adb, &report.device, package));
                }
            }
            None => ctx
                .shell
                .skip("launch: no package name found in AndroidManifest.xml"),
        }
    }

    Ok(reports)
}

fn install_one(ctx: &DeployContext, adb: &Path, device: &DeviceHandle, apk: &Path) -> Attempt {
    let name = apk.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    ctx.shell
        .status(Status::Installing, format!("{} on {}", name, device));

    let attempt = attempt(ctx, &install_command(adb, device, apk));
    match &attempt {
        Attempt::Ok => ctx.shell.status(Status::Installed, format!("{} on {}", name, device)),
        Attempt::Failed { message, .. } => {
            ctx.shell
                .warn(format!("install of {} on {} failed: {}", name, device, message))
        }
    }
    attempt
}

fn launch_one(ctx: &DeployContext, adb: &Path, device: &DeviceHandle, package: &str) -> Attempt {
    ctx.shell
        .status(Status::Launching, format!("{} on {}", package, device));

    let attempt = attempt(ctx, &launch_command(adb, device, package));
    if let Attempt::Failed { message, .. } = &attempt {
        ctx.shell
            .warn(format!("launch of {} on {} failed: {}", package, device, message));
    }
    attempt
}

fn attempt(ctx: &DeployContext, cmd: &ProcessBuilder) -> Attempt {
    match process::run_tolerant(ctx.system(), cmd) {
        Ok(Outcome::Succeeded(_)) => Attempt::Ok,
        Ok(Outcome::FailedTolerated(failure)) | Ok(Outcome::FailedFatal(failure)) => {
            Attempt::Failed {
                code: failure.code,
                message: failure.summary(),
            }
        }
        Err(e) => Attempt::Failed {
            code: None,
            message: format!("{:#}", e),
        },
    }
}

/// Run the whole install stage for `devices`.
///
/// With no devices the APKs are still built and nothing is installed.
pub fn run(
    ctx: &DeployContext,
    plan: &InstallPlan<'_>,
    devices: &[DeviceHandle],
) -> Result<Vec<DeviceReport>> {
    let apks = collect_apks(ctx, plan)?;

    if devices.is_empty() {
        ctx.shell
            .skip("install: no Android devices ready (check `adb devices`)");
        return Ok(Vec::new());
    }

    let package = if plan.launch {
        read_package_name(plan.project)
    } else {
        None
    };
    install_all(ctx, &apks, devices, package.as_deref(), plan.launch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use tempfile::TempDir;

    use crate::test_support::{exit, mock_context, ok, MockSystem};

    const MANIFEST: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<manifest xmlns:android="http://schemas.android.com/apk/res/android"
    xmlns:tools="http://schemas.android.com/tools"
    package="com.example.meshcompanion">

    <uses-permission android:name="android.permission.BLUETOOTH_SCAN" />
    <application android:label="Mesh">
        <activity android:name=".MainActivity" android:exported="true" />
    </application>
</manifest>
"#;

    fn devices(serials: &[&str]) -> Vec<DeviceHandle> {
        serials.iter().map(|s| DeviceHandle::new(*s)).collect()
    }

    #[test]
    fn test_parse_package_name() {
        assert_eq!(
            parse_package_name(MANIFEST).as_deref(),
            Some("com.example.meshcompanion")
        );
        assert_eq!(
            parse_package_name(r#"<manifest package = "a.b"/>"#).as_deref(),
            Some("a.b")
        );
        assert_eq!(parse_package_name("<manifest xmlns:android=\"x\"></manifest>"), None);
        assert_eq!(parse_package_name(r#"<activity package="not.this"/>"#), None);
    }

    #[test]
    fn test_install_failure_does_not_block_other_devices() {
        let sys = Arc::new(MockSystem::new());
        sys.add_tool("adb");
        sys.expect_contains(
            "-s AAA install",
            exit(1, "adb: failed to install app.apk: INSTALL_FAILED_VERSION_DOWNGRADE"),
        );
        sys.set_default(ok("Success"));

        let apks = vec![PathBuf::from("/out/app.apk")];
        let reports = install_all(
            &mock_context(&sys),
            &apks,
            &devices(&["AAA", "BBB"]),
            Some("com.example.meshcompanion"),
            true,
        )
        .unwrap();

        assert_eq!(reports.len(), 2);
        assert!(matches!(
            reports[0].installs[0].result,
            Attempt::Failed { code: Some(1), .. }
        ));
        assert!(!reports[0].all_ok());
        assert!(reports[1].all_ok());
        assert_eq!(sys.calls_containing("monkey").len(), 2);
        assert_eq!(
            sys.calls_containing("-s BBB install"),
            ["/usr/bin/adb -s BBB install -r -d /out/app.apk"]
        );
    }

    #[test]
    fn test_missing_package_skips_launch() {
        let sys = Arc::new(MockSystem::new());
        sys.add_tool("adb");
        sys.set_default(ok("Success"));

        let reports = install_all(
            &mock_context(&sys),
            &[PathBuf::from("/out/app.apk")],
            &devices(&["AAA"]),
            None,
            true,
        )
        .unwrap();

        assert_eq!(reports[0].launch, None);
        assert!(sys.calls_containing("monkey").is_empty());
    }

    #[test]
    fn test_launch_failure_is_reported() {
        let sys = Arc::new(MockSystem::new());
        sys.add_tool("adb");
        sys.expect_contains("monkey", exit(252, "** No activities found to run, monkey aborted."));
        sys.set_default(ok("Success"));

        let reports = install_all(
            &mock_context(&sys),
            &[PathBuf::from("/out/app.apk")],
            &devices(&["AAA"]),
            Some("com.example.meshcompanion"),
            true,
        )
        .unwrap();

        assert!(reports[0].installs[0].result.is_ok());
        assert_eq!(
            reports[0].launch,
            Some(Attempt::Failed {
                code: Some(252),
                message: "** No activities found to run, monkey aborted.".into()
            })
        );
    }

    #[test]
    fn test_missing_adb_is_fatal() {
        let sys = Arc::new(MockSystem::new());
        let err = install_all(&mock_context(&sys), &[], &devices(&["AAA"]), None, false).unwrap_err();
        assert!(err.to_string().contains("`adb` not found"));
    }

    #[test]
    fn test_glob_mode_uses_existing_matches() {
        let tmp = TempDir::new().unwrap();
        let project = MobileProject::new(tmp.path().join("android"));
        let out = project.apk_output_root().join("debug");
        std::fs::create_dir_all(&out).unwrap();
        std::fs::write(out.join("app-debug.apk"), "apk").unwrap();

        let sys = Arc::new(MockSystem::new());
        let mode = InstallMode::Glob("android/app/build/outputs/apk/debug/*.apk".into());
        let plan = InstallPlan {
            project: &project,
            root: tmp.path(),
            mode: &mode,
            variant: Variant::Debug,
            sdk: Path::new("/opt/sdk"),
            launch: false,
        };

        let apks = collect_apks(&mock_context(&sys), &plan).unwrap();
        assert_eq!(apks, vec![out.join("app-debug.apk")]);
        assert!(sys.calls().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_glob_mode_builds_when_nothing_matches() {
        let tmp = TempDir::new().unwrap();
        let project = MobileProject::new(tmp.path().join("android"));
        std::fs::create_dir_all(project.dir()).unwrap();
        std::fs::write(project.wrapper_path(), "#!/bin/sh\n").unwrap();

        // The "build" leaves its APK behind before the mock answers.
        let apk = project.expected_apk(Variant::Debug);
        std::fs::create_dir_all(apk.parent().unwrap()).unwrap();
        std::fs::write(&apk, "apk").unwrap();

        let sys = Arc::new(MockSystem::new());
        sys.expect_contains("assembleDebug", ok("BUILD SUCCESSFUL"));
        let mode = InstallMode::Glob("android/app/build/outputs/apk/debug/*-unsigned.apk".into());
        let plan = InstallPlan {
            project: &project,
            root: tmp.path(),
            mode: &mode,
            variant: Variant::Debug,
            sdk: Path::new("/opt/sdk"),
            launch: false,
        };

        let apks = collect_apks(&mock_context(&sys), &plan).unwrap();
        assert!(apks.is_empty());
        assert_eq!(sys.calls_containing("assembleDebug").len(), 1);
    }

    #[test]
    fn test_read_package_name_from_project() {
        let tmp = TempDir::new().unwrap();
        let project = MobileProject::new(tmp.path());
        assert_eq!(read_package_name(&project), None);

        let manifest = project.manifest_path();
        std::fs::create_dir_all(manifest.parent().unwrap()).unwrap();
        std::fs::write(&manifest, MANIFEST).unwrap();
        assert_eq!(
            read_package_name(&project).as_deref(),
            Some("com.example.meshcompanion")
        );
    }
}
