//! Android build through the Gradle wrapper.
//!
//! The SDK location is resolved once and threaded through as a value. It
//! reaches Gradle twice: as `sdk.dir` in `local.properties` and as
//! `ANDROID_SDK_ROOT`/`ANDROID_HOME` on the wrapper's own environment.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::core::{Artifact, Variant};
use crate::error::DeployError;
use crate::util::context::DeployContext;
use crate::util::fs;
use crate::util::process::{self, ProcessBuilder};
use crate::util::shell::Status;

/// SDK locations tried after the environment, relative to the home directory.
pub const DEFAULT_SDK_DIRS: [&str; 3] = ["android-sdk", "Android/Sdk", "Library/Android/sdk"];

/// Environment variables naming the SDK, in priority order.
pub const SDK_ENV_VARS: [&str; 2] = ["ANDROID_SDK_ROOT", "ANDROID_HOME"];

const SDK_DIR_KEY: &str = "sdk.dir=";

/// Layout of the Android project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MobileProject {
    dir: PathBuf,
}

impl MobileProject {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        MobileProject { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn wrapper_path(&self) -> PathBuf {
        let name = if cfg!(windows) { "gradlew.bat" } else { "gradlew" };
        self.dir.join(name)
    }

    pub fn local_properties(&self) -> PathBuf {
        self.dir.join("local.properties")
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.dir.join("app/src/main/AndroidManifest.xml")
    }

    pub fn apk_output_root(&self) -> PathBuf {
        self.dir.join("app/build/outputs/apk")
    }

    /// Where Gradle puts the APK of `variant` by default.
    pub fn expected_apk(&self, variant: Variant) -> PathBuf {
        self.apk_output_root()
            .join(variant.as_str())
            .join(variant.apk_file_name())
    }
}

/// Resolve the Android SDK.
///
/// An explicit path must exist; it is never silently replaced by a
/// discovered one. Otherwise the environment variables and then the
/// default install locations are tried, first existing directory wins.
pub fn resolve_sdk<F>(
    override_path: Option<&Path>,
    env: F,
    home: Option<&Path>,
) -> Result<PathBuf, DeployError>
where
    F: Fn(&str) -> Option<OsString>,
{
    if let Some(path) = override_path {
        let path = expand_home(path, home);
        return if path.is_dir() {
            Ok(absolute(path))
        } else {
            Err(DeployError::SdkNotFound {
                searched: vec![path],
            })
        };
    }

    let from_env = SDK_ENV_VARS
        .iter()
        .filter_map(|var| env(var))
        .filter(|v| !v.is_empty())
        .map(PathBuf::from);
    let defaults = home
        .into_iter()
        .flat_map(|h| DEFAULT_SDK_DIRS.iter().map(move |d| h.join(d)));

    let mut searched = Vec::new();
    for candidate in from_env.chain(defaults) {
        if candidate.is_dir() {
            tracing::debug!("using Android SDK at {}", candidate.display());
            return Ok(candidate);
        }
        searched.push(candidate);
    }
    Err(DeployError::SdkNotFound { searched })
}

/// [`resolve_sdk`] against the real environment and home directory.
pub fn locate_sdk(override_path: Option<&Path>) -> Result<PathBuf, DeployError> {
    let home = directories::BaseDirs::new().map(|b| b.home_dir().to_path_buf());
    resolve_sdk(override_path, |var| std::env::var_os(var), home.as_deref())
}

fn expand_home(path: &Path, home: Option<&Path>) -> PathBuf {
    match (path.strip_prefix("~"), home) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

fn absolute(path: PathBuf) -> PathBuf {
    std::fs::canonicalize(&path).unwrap_or(path)
}

/// Rewrite `local.properties` content so it declares exactly `sdk`.
///
/// The first `sdk.dir=` line is kept (or replaced if it names another
/// path), later ones are dropped and a missing one is appended. Applying
/// it to its own output changes nothing.
pub fn rewrite_sdk_dir(content: Option<&str>, sdk: &Path) -> String {
    let desired = format!("{}{}", SDK_DIR_KEY, sdk.display());
    let mut lines: Vec<String> = Vec::new();
    let mut declared = false;

    for line in content.unwrap_or_default().lines() {
        if line.trim_start().starts_with(SDK_DIR_KEY) {
            if !declared {
                let keep = if line.trim() == desired { line } else { desired.as_str() };
                lines.push(keep.to_string());
                declared = true;
            }
            continue;
        }
        lines.push(line.to_string());
    }

    if !declared {
        lines.push(desired);
    }

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

/// Make `local.properties` point at `sdk`, writing only on change.
///
/// Returns whether the file was written.
pub fn ensure_sdk_dir(project: &MobileProject, sdk: &Path) -> Result<bool> {
    let path = project.local_properties();
    let current = if path.exists() {
        Some(fs::read_to_string(&path)?)
    } else {
        None
    };

    let updated = rewrite_sdk_dir(current.as_deref(), sdk);
    if current.as_deref() == Some(updated.as_str()) {
        return Ok(false);
    }
    fs::write_string(&path, &updated)?;
    Ok(true)
}

/// Pick the APK for `variant` among `candidates`.
///
/// A file name containing the variant wins (first by path); otherwise the
/// most recently modified file.
pub fn pick_artifact(candidates: &[PathBuf], variant: Variant) -> Option<PathBuf> {
    let mut sorted = candidates.to_vec();
    sorted.sort();

    let by_name = sorted.iter().find(|p| {
        p.file_name()
            .map(|n| n.to_string_lossy().to_lowercase().contains(variant.as_str()))
            .unwrap_or(false)
    });

    by_name
        .or_else(|| sorted.iter().max_by_key(|p| fs::modified_time(p)))
        .cloned()
}

/// Find the APK a build of `variant` produced.
pub fn resolve_artifact(project: &MobileProject, variant: Variant) -> Result<Artifact, DeployError> {
    if let Some(artifact) = Artifact::existing(project.expected_apk(variant)) {
        return Ok(artifact);
    }

    let root = project.apk_output_root();
    let candidates = fs::find_files_with_extension(&root, "apk");
    tracing::debug!(
        "{} not found, {} APK(s) under {}",
        project.expected_apk(variant).display(),
        candidates.len(),
        root.display()
    );

    pick_artifact(&candidates, variant)
        .and_then(Artifact::existing)
        .ok_or(DeployError::NoArtifacts { root })
}

/// The wrapper invocation for `variant`.
pub fn gradle_command(project: &MobileProject, variant: Variant, sdk: &Path) -> ProcessBuilder {
    let mut cmd = ProcessBuilder::new(project.wrapper_path())
        .arg(variant.gradle_task())
        .cwd(project.dir());
    for var in SDK_ENV_VARS {
        cmd = cmd.env(var, sdk);
    }
    cmd
}

/// Build the app and return the resolved APK.
pub fn build_apk(
    ctx: &DeployContext,
    project: &MobileProject,
    variant: Variant,
    sdk: &Path,
) -> Result<Artifact> {
    let wrapper = project.wrapper_path();
    if !wrapper.is_file() {
        return Err(DeployError::WrapperNotFound { path: wrapper }.into());
    }

    if ensure_sdk_dir(project, sdk)? {
        ctx.shell.status(
            Status::Updated,
            format!("{} (sdk.dir={})", project.local_properties().display(), sdk.display()),
        );
    }
    fs::ensure_executable(&wrapper)?;

    let span = ctx.shell.span(
        Status::Building,
        format!("Android app ({}) in {}", variant, project.dir().display()),
    );
    process::run_checked(ctx.system(), &gradle_command(project, variant, sdk))?;
    span.finish_with_message(format!("{} build", variant));

    let artifact = resolve_artifact(project, variant)?;
    ctx.shell.status(Status::Using, format!("APK {}", artifact));
    Ok(artifact)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::{Duration, SystemTime};

    use tempfile::TempDir;

    use crate::test_support::{exit, mock_context, ok, MockSystem};

    fn no_env(_: &str) -> Option<OsString> {
        None
    }

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, "apk").unwrap();
    }

    fn set_mtime(path: &Path, secs_ago: u64) {
        let file = std::fs::File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - Duration::from_secs(secs_ago))
            .unwrap();
    }

    #[test]
    fn test_sdk_override_must_exist() {
        let tmp = TempDir::new().unwrap();
        let sdk = resolve_sdk(Some(tmp.path()), no_env, None).unwrap();
        assert_eq!(sdk, tmp.path().canonicalize().unwrap());

        let missing = tmp.path().join("nope");
        let err = resolve_sdk(Some(&missing), |_| Some(tmp.path().into()), None).unwrap_err();
        assert!(matches!(err, DeployError::SdkNotFound { searched } if searched == [missing]));
    }

    #[test]
    fn test_sdk_override_expands_home() {
        let home = TempDir::new().unwrap();
        std::fs::create_dir_all(home.path().join("sdks/android")).unwrap();

        let sdk = resolve_sdk(Some(Path::new("~/sdks/android")), no_env, Some(home.path())).unwrap();
        assert!(sdk.ends_with("sdks/android"));
    }

    #[test]
    fn test_sdk_env_priority() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("root");
        let home_var = tmp.path().join("home");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::create_dir_all(&home_var).unwrap();

        let env: HashMap<&str, OsString> = HashMap::from([
            ("ANDROID_SDK_ROOT", root.clone().into()),
            ("ANDROID_HOME", home_var.clone().into()),
        ]);
        assert_eq!(resolve_sdk(None, |v| env.get(v).cloned(), None).unwrap(), root);

        let env: HashMap<&str, OsString> = HashMap::from([
            ("ANDROID_SDK_ROOT", tmp.path().join("gone").into()),
            ("ANDROID_HOME", home_var.clone().into()),
        ]);
        assert_eq!(resolve_sdk(None, |v| env.get(v).cloned(), None).unwrap(), home_var);
    }

    #[test]
    fn test_sdk_default_locations() {
        let home = TempDir::new().unwrap();
        let sdk = home.path().join("Android/Sdk");
        std::fs::create_dir_all(&sdk).unwrap();

        assert_eq!(resolve_sdk(None, no_env, Some(home.path())).unwrap(), sdk);

        let empty = TempDir::new().unwrap();
        let err = resolve_sdk(None, no_env, Some(empty.path())).unwrap_err();
        let DeployError::SdkNotFound { searched } = err else {
            panic!("expected SdkNotFound");
        };
        assert_eq!(searched.len(), DEFAULT_SDK_DIRS.len());
    }

    #[test]
    fn test_rewrite_sdk_dir_cases() {
        let sdk = Path::new("/opt/android-sdk");

        assert_eq!(rewrite_sdk_dir(None, sdk), "sdk.dir=/opt/android-sdk\n");
        assert_eq!(
            rewrite_sdk_dir(Some("ndk.dir=/opt/ndk\n"), sdk),
            "ndk.dir=/opt/ndk\nsdk.dir=/opt/android-sdk\n"
        );
        assert_eq!(
            rewrite_sdk_dir(
                Some("# generated\nsdk.dir=/old\nfoo=bar\nsdk.dir=/older\n"),
                sdk
            ),
            "# generated\nsdk.dir=/opt/android-sdk\nfoo=bar\n"
        );
    }

    #[test]
    fn test_rewrite_sdk_dir_is_idempotent() {
        let sdk = Path::new("/home/dev/Android/Sdk");
        let inputs = [
            None,
            Some(""),
            Some("sdk.dir=/elsewhere"),
            Some("a=1\nsdk.dir=/x\nsdk.dir=/y\nb=2"),
        ];
        for input in inputs {
            let once = rewrite_sdk_dir(input, sdk);
            let twice = rewrite_sdk_dir(Some(&once), sdk);
            assert_eq!(once, twice, "input: {:?}", input);
            assert_eq!(once.matches("sdk.dir=").count(), 1);
        }
    }

    #[test]
    fn test_ensure_sdk_dir_writes_only_on_change() {
        let tmp = TempDir::new().unwrap();
        let project = MobileProject::new(tmp.path());
        let sdk = Path::new("/opt/sdk");

        assert!(ensure_sdk_dir(&project, sdk).unwrap());
        let first = std::fs::read(project.local_properties()).unwrap();
        assert!(!ensure_sdk_dir(&project, sdk).unwrap());
        assert_eq!(std::fs::read(project.local_properties()).unwrap(), first);
    }

    #[test]
    fn test_resolve_artifact_expected_path() {
        let tmp = TempDir::new().unwrap();
        let project = MobileProject::new(tmp.path());
        let apk = project.expected_apk(Variant::Release);
        touch(&apk);
        touch(&project.apk_output_root().join("debug/app-debug.apk"));

        assert_eq!(resolve_artifact(&project, Variant::Release).unwrap().path(), apk);
    }

    #[test]
    fn test_resolve_artifact_prefers_variant_name() {
        let tmp = TempDir::new().unwrap();
        let project = MobileProject::new(tmp.path());
        let root = project.apk_output_root();
        let named = root.join("universal/app-universal-Debug.apk");
        let newer = root.join("other/app.apk");
        touch(&named);
        touch(&newer);
        set_mtime(&named, 3600);

        assert_eq!(resolve_artifact(&project, Variant::Debug).unwrap().path(), named);
    }

    #[test]
    fn test_resolve_artifact_falls_back_to_newest() {
        let tmp = TempDir::new().unwrap();
        let project = MobileProject::new(tmp.path());
        let root = project.apk_output_root();
        let old = root.join("a/first.apk");
        let new = root.join("b/second.apk");
        touch(&old);
        touch(&new);
        set_mtime(&old, 7200);
        set_mtime(&new, 60);

        assert_eq!(resolve_artifact(&project, Variant::Release).unwrap().path(), new);
    }

    #[test]
    fn test_resolve_artifact_none_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let project = MobileProject::new(tmp.path());
        assert!(matches!(
            resolve_artifact(&project, Variant::Debug),
            Err(DeployError::NoArtifacts { .. })
        ));
    }

    #[test]
    fn test_gradle_command_sets_child_env() {
        let project = MobileProject::new("/work/android");
        let cmd = gradle_command(&project, Variant::Debug, Path::new("/opt/sdk"));

        assert_eq!(cmd.get_args(), ["assembleDebug"]);
        assert_eq!(cmd.get_cwd(), Some(Path::new("/work/android")));
        assert_eq!(
            cmd.get_envs(),
            [
                ("ANDROID_SDK_ROOT".to_string(), "/opt/sdk".to_string()),
                ("ANDROID_HOME".to_string(), "/opt/sdk".to_string()),
            ]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_build_apk() {
        let tmp = TempDir::new().unwrap();
        let project = MobileProject::new(tmp.path());
        std::fs::write(project.wrapper_path(), "#!/bin/sh\n").unwrap();
        touch(&project.expected_apk(Variant::Debug));

        let sys = Arc::new(MockSystem::new());
        sys.expect_contains("gradlew assembleDebug", ok("BUILD SUCCESSFUL"));

        let artifact = build_apk(&mock_context(&sys), &project, Variant::Debug, Path::new("/opt/sdk")).unwrap();
        assert_eq!(artifact.path(), project.expected_apk(Variant::Debug));
        assert_eq!(
            std::fs::read_to_string(project.local_properties()).unwrap(),
            "sdk.dir=/opt/sdk\n"
        );
    }

    #[test]
    fn test_build_apk_failures() {
        let tmp = TempDir::new().unwrap();
        let project = MobileProject::new(tmp.path());
        let sys = Arc::new(MockSystem::new());
        let ctx = mock_context(&sys);

        let err = build_apk(&ctx, &project, Variant::Debug, Path::new("/opt/sdk")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DeployError>(),
            Some(DeployError::WrapperNotFound { .. })
        ));

        std::fs::write(project.wrapper_path(), "#!/bin/sh\n").unwrap();
        sys.expect_contains("assembleDebug", exit(1, "FAILURE: Build failed with an exception."));
        let err = build_apk(&ctx, &project, Variant::Debug, Path::new("/opt/sdk")).unwrap_err();
        assert_eq!(err.downcast_ref::<DeployError>().unwrap().exit_code(), 1);
    }
}
