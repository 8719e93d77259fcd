//! [`EngineClient`] backed by the Docker CLI.
//!
//! Every operation spawns the `docker` executable with `kill_on_drop`, so
//! dropping an operation's future terminates the child process. Builds use
//! `docker build` on the legacy path and `docker buildx build` for a named
//! builder; the resulting image ID is read back from `--iidfile`.

use std::collections::VecDeque;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use berth_common::{BerthError, BerthResult};
use berth_image::{BuildBackend, BuildContext, DockerConfigFile, EngineBuildRequest, SecretSource};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::oneshot;

use crate::build_log::BuildLog;
use crate::engine::{EngineClient, ImageInspect};

/// Lines of output kept for error messages.
const OUTPUT_TAIL: usize = 20;

/// Running builds by `build_id`, each tagged with its registration number.
type CancelMap = DashMap<String, (u64, oneshot::Sender<()>)>;

/// Docker CLI engine client.
#[derive(Debug, Clone)]
pub struct DockerCli {
    program: PathBuf,
    running: Arc<CancelMap>,
    registrations: Arc<AtomicU64>,
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new("docker")
    }
}

impl DockerCli {
    /// Use `program` as the Docker executable.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            running: Arc::new(DashMap::new()),
            registrations: Arc::new(AtomicU64::new(0)),
        }
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.stdin(Stdio::null()).kill_on_drop(true);
        command
    }

    async fn output(&self, operation: &str, mut command: Command) -> BerthResult<std::process::Output> {
        tracing::debug!(operation, command = ?command.as_std(), "Running docker");
        command
            .output()
            .await
            .map_err(|e| spawn_failed(operation, &self.program, &e))
    }

    fn register(&self, build_id: &str) -> (Registration<'_>, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        let token = self.registrations.fetch_add(1, Ordering::Relaxed);
        if self.running.insert(build_id.to_string(), (token, tx)).is_some() {
            tracing::warn!(build_id, "Build ID already in use, replacing registration");
        }
        (
            Registration {
                running: &self.running,
                build_id: build_id.to_string(),
                token,
            },
            rx,
        )
    }

    async fn stream(
        &self,
        operation: &str,
        mut command: Command,
        log: &Mutex<BuildLog>,
        cancel: Option<oneshot::Receiver<()>>,
    ) -> BerthResult<()> {
        command.stdout(Stdio::piped()).stderr(Stdio::piped());
        tracing::debug!(operation, command = ?command.as_std(), "Running docker");

        let mut child = command
            .spawn()
            .map_err(|e| spawn_failed(operation, &self.program, &e))?;
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let run = async {
            tokio::join!(child.wait(), pump(stdout, log), pump(stderr, log))
        };
        let cancelled = async {
            match cancel {
                Some(rx) => {
                    if rx.await.is_err() {
                        std::future::pending::<()>().await;
                    }
                }
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            (status, out_tail, err_tail) = run => {
                let status = status?;
                if status.success() {
                    Ok(())
                } else {
                    Err(BerthError::engine(operation, failure_message(status, &err_tail, &out_tail)))
                }
            }
            () = cancelled => {
                tracing::info!(operation, "Build cancelled on request");
                Err(BerthError::engine(operation, "build cancelled"))
            }
        }
    }
}

/// Removes a build's cancel handle when the build ends, unless a later
/// build with the same ID has taken it over.
struct Registration<'a> {
    running: &'a CancelMap,
    build_id: String,
    token: u64,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.running
            .remove_if(&self.build_id, |_, (token, _)| *token == self.token);
    }
}

#[async_trait]
impl EngineClient for DockerCli {
    async fn pull_image(&self, name: &str, platform: &str) -> BerthResult<ImageInspect> {
        let mut command = self.command();
        command.args(pull_args(name, platform));

        let output = self.output("pull", command).await?;
        if !output.status.success() {
            return Err(BerthError::engine("pull", stderr_message(&output)));
        }

        self.inspect_image(name).await?.ok_or_else(|| {
            BerthError::engine("pull", format!("image '{name}' not found after pull"))
        })
    }

    async fn build_image(&self, request: &EngineBuildRequest) -> BerthResult<ImageInspect> {
        let scratch = tempfile::tempdir()?;
        let iidfile = scratch.path().join("image-id");

        let skipped = unsupported_options(request);
        if !skipped.is_empty() {
            tracing::warn!(options = ?skipped, "Options not supported by this build path, skipping");
        }
        if let Some(session_id) = &request.session_id {
            tracing::debug!(session_id = %session_id, "session_id has no CLI flag, skipping");
        }

        let mut command = self.command();
        command.args(build_args(request, &iidfile));
        configure_build_env(&mut command, request, scratch.path()).await?;

        let log = Mutex::new(BuildLog::open(request.log_file())?);
        let (_registration, cancel) = match request.build_id.as_deref() {
            Some(build_id) => {
                let (registration, rx) = self.register(build_id);
                (Some(registration), Some(rx))
            }
            None => (None, None),
        };

        self.stream("build", command, &log, cancel).await?;
        log.into_inner().finish()?;

        let id = tokio::fs::read_to_string(&iidfile).await?.trim().to_string();
        if id.is_empty() {
            return Err(BerthError::engine("build", "build produced no image ID"));
        }

        Ok(self.inspect_image(&id).await?.unwrap_or(ImageInspect {
            id,
            repo_digests: Vec::new(),
        }))
    }

    async fn inspect_image(&self, reference: &str) -> BerthResult<Option<ImageInspect>> {
        let mut command = self.command();
        command.args(["image", "inspect", "--format", "{{json .}}", reference]);

        let output = self.output("inspect", command).await?;
        if !output.status.success() {
            let message = stderr_message(&output);
            if is_missing(&message) {
                return Ok(None);
            }
            return Err(BerthError::engine("inspect", message));
        }

        parse_inspect(&output.stdout)
    }

    async fn remove_image(&self, reference: &str, force: bool) -> BerthResult<()> {
        let mut command = self.command();
        command.args(["image", "rm"]);
        if force {
            command.arg("--force");
        }
        command.arg(reference);

        let output = self.output("remove", command).await?;
        if output.status.success() {
            return Ok(());
        }

        let message = stderr_message(&output);
        if is_missing(&message) {
            tracing::debug!(reference, "Image already removed");
            return Ok(());
        }
        Err(BerthError::engine("remove", message))
    }

    async fn cancel_build(&self, build_id: &str) -> BerthResult<()> {
        match self.running.remove(build_id) {
            Some((_, (_, tx))) => {
                if tx.send(()).is_err() {
                    tracing::debug!(build_id, "Build already finished");
                } else {
                    tracing::info!(build_id, "Cancelling build");
                }
            }
            None => tracing::debug!(build_id, "No running build with this ID"),
        }
        Ok(())
    }
}

async fn pump<R: AsyncRead + Unpin>(reader: Option<R>, log: &Mutex<BuildLog>) -> VecDeque<String> {
    let mut tail = VecDeque::with_capacity(OUTPUT_TAIL);
    let Some(reader) = reader else {
        return tail;
    };

    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                log.lock().line(&line);
                if tail.len() == OUTPUT_TAIL {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(error = %e, "Stopped reading build output");
                break;
            }
        }
    }
    tail
}

fn failure_message(status: ExitStatus, stderr: &VecDeque<String>, stdout: &VecDeque<String>) -> String {
    let tail = if stderr.is_empty() { stdout } else { stderr };
    if tail.is_empty() {
        format!("docker exited with {status}")
    } else {
        tail.iter().map(String::as_str).collect::<Vec<_>>().join("\n")
    }
}

fn spawn_failed(operation: &str, program: &Path, e: &std::io::Error) -> BerthError {
    BerthError::engine(operation, format!("failed to run {}: {e}", program.display()))
}

fn stderr_message(output: &std::process::Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if stderr.is_empty() {
        format!("docker exited with {}", output.status)
    } else {
        stderr
    }
}

fn is_missing(message: &str) -> bool {
    message.contains("No such image") || message.contains("No such object")
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectOutput {
    id: String,
    #[serde(default)]
    repo_digests: Option<Vec<String>>,
}

fn parse_inspect(stdout: &[u8]) -> BerthResult<Option<ImageInspect>> {
    let text = String::from_utf8_lossy(stdout);
    let Some(line) = text.lines().map(str::trim).find(|l| !l.is_empty()) else {
        return Ok(None);
    };

    let parsed: InspectOutput = serde_json::from_str(line)
        .map_err(|e| BerthError::engine("inspect", format!("unexpected inspect output: {e}")))?;

    Ok(Some(ImageInspect {
        id: parsed.id,
        repo_digests: parsed.repo_digests.unwrap_or_default(),
    }))
}

fn pull_args(name: &str, platform: &str) -> Vec<String> {
    let mut args = vec!["pull".to_string()];
    if !platform.is_empty() {
        flag(&mut args, "--platform", platform);
    }
    args.push(name.to_string());
    args
}

/// Arguments for `docker build` or `docker buildx build`.
fn build_args(request: &EngineBuildRequest, iidfile: &Path) -> Vec<String> {
    let mut args = Vec::new();

    match &request.backend {
        BuildBackend::Legacy => {
            args.push("build".to_string());
            legacy_flags(&mut args, request);
        }
        BuildBackend::NamedBuilder { name, .. } => {
            args.extend(["buildx".to_string(), "build".to_string()]);
            flag(&mut args, "--builder", name);
            args.extend(["--load".to_string(), "--progress=plain".to_string()]);
            for secret in &request.secrets {
                let source = match &secret.source {
                    SecretSource::File(path) => format!("src={}", path.display()),
                    SecretSource::Env(var) => format!("env={var}"),
                };
                flag(&mut args, "--secret", format!("id={},{source}", secret.id));
            }
        }
    }

    shared_flags(&mut args, request);
    flag(&mut args, "--iidfile", iidfile.display());

    args.push(match &request.context {
        BuildContext::Local(dir) => dir.display().to_string(),
        BuildContext::Remote(uri) => uri.clone(),
    });
    args
}

fn shared_flags(args: &mut Vec<String>, request: &EngineBuildRequest) {
    let dockerfile = match &request.context {
        BuildContext::Local(dir) => dir.join(&request.dockerfile).display().to_string(),
        BuildContext::Remote(_) => request.dockerfile.clone(),
    };
    flag(args, "--file", dockerfile);

    for tag in &request.tags {
        flag(args, "--tag", tag);
    }
    switch(args, "--no-cache", request.no_cache);
    switch(args, "--pull", request.pull_parent);
    switch(args, "--quiet", request.suppress_output);

    let resources = &request.resources;
    optional(args, "--network", resources.network_mode.as_ref());
    optional(args, "--shm-size", resources.shm_size);
    optional(args, "--cgroup-parent", resources.cgroup_parent.as_ref());
    for ulimit in &resources.ulimits {
        flag(args, "--ulimit", format!("{}={}:{}", ulimit.name, ulimit.soft, ulimit.hard));
    }

    for (key, value) in &request.build_args {
        flag(args, "--build-arg", format!("{key}={value}"));
    }
    for (key, value) in &request.labels {
        flag(args, "--label", format!("{key}={value}"));
    }
    for source in &request.cache_from {
        flag(args, "--cache-from", source);
    }
    for host in &request.extra_hosts {
        flag(args, "--add-host", host);
    }
    optional(args, "--target", request.target.as_ref());
    optional(args, "--platform", request.platform.as_ref());
}

fn legacy_flags(args: &mut Vec<String>, request: &EngineBuildRequest) {
    if !request.remove {
        args.push("--rm=false".to_string());
    }
    switch(args, "--force-rm", request.force_remove);
    switch(args, "--squash", request.squash);
    optional(args, "--isolation", request.isolation.as_ref());

    let resources = &request.resources;
    optional(args, "--cpuset-cpus", resources.cpu_set_cpus.as_ref());
    optional(args, "--cpuset-mems", resources.cpu_set_mems.as_ref());
    optional(args, "--cpu-shares", resources.cpu_shares);
    optional(args, "--cpu-quota", resources.cpu_quota);
    optional(args, "--cpu-period", resources.cpu_period);
    optional(args, "--memory", resources.memory);
    optional(args, "--memory-swap", resources.memory_swap);

    for opt in &request.security_opt {
        flag(args, "--security-opt", opt);
    }
}

/// Set options a named builder has no flag for.
fn unsupported_options(request: &EngineBuildRequest) -> Vec<&'static str> {
    if matches!(request.backend, BuildBackend::Legacy) {
        return Vec::new();
    }

    let resources = &request.resources;
    [
        ("remove", !request.remove),
        ("force_remove", request.force_remove),
        ("squash", request.squash),
        ("isolation", request.isolation.is_some()),
        ("cpu_set_cpus", resources.cpu_set_cpus.is_some()),
        ("cpu_set_mems", resources.cpu_set_mems.is_some()),
        ("cpu_shares", resources.cpu_shares.is_some()),
        ("cpu_quota", resources.cpu_quota.is_some()),
        ("cpu_period", resources.cpu_period.is_some()),
        ("memory", resources.memory.is_some()),
        ("memory_swap", resources.memory_swap.is_some()),
        ("security_opt", !request.security_opt.is_empty()),
    ]
    .into_iter()
    .filter_map(|(name, set)| set.then_some(name))
    .collect()
}

/// `DOCKER_BUILDKIT` value for a builder `version`.
fn buildkit_env(version: Option<&str>) -> Option<&'static str> {
    match version {
        Some("1") => Some("0"),
        Some("2") => Some("1"),
        Some(other) => {
            tracing::warn!(version = other, "Unknown builder version, using engine default");
            None
        }
        None => None,
    }
}

async fn configure_build_env(
    command: &mut Command,
    request: &EngineBuildRequest,
    scratch: &Path,
) -> BerthResult<()> {
    if let BuildBackend::Legacy = request.backend {
        if let Some(value) = buildkit_env(request.version.as_deref()) {
            command.env("DOCKER_BUILDKIT", value);
        }
    } else if request.version.is_some() {
        tracing::debug!("version only applies to the legacy build path");
    }

    if request.auth_configs.is_empty() {
        return Ok(());
    }

    // Builder instances live under the Docker config dir; keep buildx
    // pointed at the user's one while credentials come from `scratch`.
    if matches!(request.backend, BuildBackend::NamedBuilder { .. }) {
        if let Some(dir) = buildx_config_dir() {
            command.env("BUILDX_CONFIG", dir);
        }
    }

    let config = DockerConfigFile::from_auths(&request.auth_configs).to_json()?;
    tokio::fs::write(scratch.join("config.json"), config).await?;
    command.env("DOCKER_CONFIG", scratch);

    tracing::debug!(
        registries = ?request.auth_configs.keys().collect::<Vec<_>>(),
        "Using build credentials"
    );
    Ok(())
}

fn buildx_config_dir() -> Option<PathBuf> {
    if let Some(dir) = std::env::var_os("BUILDX_CONFIG") {
        return Some(PathBuf::from(dir));
    }
    if let Some(dir) = std::env::var_os("DOCKER_CONFIG") {
        return Some(PathBuf::from(dir).join("buildx"));
    }
    dirs::home_dir().map(|home| home.join(".docker").join("buildx"))
}

fn flag(args: &mut Vec<String>, name: &str, value: impl Display) {
    args.push(name.to_string());
    args.push(value.to_string());
}

fn switch(args: &mut Vec<String>, name: &str, on: bool) {
    if on {
        args.push(name.to_string());
    }
}

fn optional<T: Display>(args: &mut Vec<String>, name: &str, value: Option<T>) {
    if let Some(value) = value {
        flag(args, name, value);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use berth_image::spec::Ulimit;
    use berth_image::translate::{BuildResources, SecretDescriptor};

    use super::*;

    fn request(context: BuildContext) -> EngineBuildRequest {
        EngineBuildRequest {
            backend: BuildBackend::Legacy,
            context,
            dockerfile: "Dockerfile".to_string(),
            tags: vec!["app:v1".to_string()],
            remove: true,
            force_remove: false,
            suppress_output: false,
            no_cache: false,
            pull_parent: false,
            squash: false,
            isolation: None,
            resources: BuildResources::default(),
            build_args: BTreeMap::new(),
            labels: BTreeMap::new(),
            auth_configs: BTreeMap::new(),
            secrets: Vec::new(),
            cache_from: Vec::new(),
            security_opt: Vec::new(),
            extra_hosts: Vec::new(),
            target: None,
            session_id: None,
            platform: None,
            version: None,
            build_id: None,
        }
    }

    #[test]
    fn minimal_legacy_build() {
        let req = request(BuildContext::Local(PathBuf::from("./app")));
        let args = build_args(&req, Path::new("/tmp/iid"));
        assert_eq!(
            args,
            vec![
                "build",
                "--file",
                "./app/Dockerfile",
                "--tag",
                "app:v1",
                "--iidfile",
                "/tmp/iid",
                "./app",
            ]
        );
    }

    #[test]
    fn legacy_build_flags() {
        let mut req = request(BuildContext::Local(PathBuf::from("/src")));
        req.remove = false;
        req.force_remove = true;
        req.no_cache = true;
        req.isolation = Some("process".to_string());
        req.resources = BuildResources {
            cpu_shares: Some(512),
            memory: Some(1_073_741_824),
            network_mode: Some("host".to_string()),
            ulimits: vec![Ulimit {
                name: "nofile".to_string(),
                soft: 1024,
                hard: 2048,
            }],
            ..BuildResources::default()
        };
        req.build_args.insert("VERSION".to_string(), "1.2".to_string());
        req.labels.insert("team".to_string(), "infra".to_string());
        req.extra_hosts = vec!["db:10.0.0.2".to_string()];
        req.target = Some("runtime".to_string());

        let args = build_args(&req, Path::new("/tmp/iid")).join("\n");
        insta::assert_snapshot!(args, @r"
        build
        --rm=false
        --force-rm
        --isolation
        process
        --cpu-shares
        512
        --memory
        1073741824
        --file
        /src/Dockerfile
        --tag
        app:v1
        --no-cache
        --network
        host
        --ulimit
        nofile=1024:2048
        --build-arg
        VERSION=1.2
        --label
        team=infra
        --add-host
        db:10.0.0.2
        --target
        runtime
        --iidfile
        /tmp/iid
        /src
        ");
    }

    #[test]
    fn named_builder_with_secrets() {
        let mut req = request(BuildContext::Local(PathBuf::from(".")));
        req.backend = BuildBackend::NamedBuilder {
            name: "ci".to_string(),
            log_file: None,
        };
        req.secrets = vec![
            SecretDescriptor {
                id: "npmrc".to_string(),
                source: SecretSource::File(PathBuf::from("/home/ci/.npmrc")),
            },
            SecretDescriptor {
                id: "token".to_string(),
                source: SecretSource::Env("GH_TOKEN".to_string()),
            },
        ];

        let args = build_args(&req, Path::new("/tmp/iid"));
        assert_eq!(
            &args[..10],
            &[
                "buildx",
                "build",
                "--builder",
                "ci",
                "--load",
                "--progress=plain",
                "--secret",
                "id=npmrc,src=/home/ci/.npmrc",
                "--secret",
                "id=token,env=GH_TOKEN",
            ]
        );
        assert!(!args.iter().any(|a| a.starts_with("--rm")));
    }

    #[test]
    fn remote_context_keeps_dockerfile_relative() {
        let req = request(BuildContext::Remote(
            "https://github.com/org/app.git#main".to_string(),
        ));
        let args = build_args(&req, Path::new("/tmp/iid"));
        assert_eq!(args[1..3], ["--file", "Dockerfile"]);
        assert_eq!(
            args.last().map(String::as_str),
            Some("https://github.com/org/app.git#main")
        );
    }

    #[test]
    fn named_builder_reports_unsupported_options() {
        let mut req = request(BuildContext::Local(PathBuf::from(".")));
        req.squash = true;
        req.resources.memory = Some(1);
        assert!(unsupported_options(&req).is_empty());

        req.backend = BuildBackend::NamedBuilder {
            name: "ci".to_string(),
            log_file: None,
        };
        assert_eq!(unsupported_options(&req), vec!["squash", "memory"]);
    }

    #[test]
    fn pull_platform() {
        assert_eq!(pull_args("alpine:3.18", ""), vec!["pull", "alpine:3.18"]);
        assert_eq!(
            pull_args("alpine:3.18", "linux/arm64"),
            vec!["pull", "--platform", "linux/arm64", "alpine:3.18"]
        );
    }

    #[test]
    fn buildkit_from_version() {
        assert_eq!(buildkit_env(Some("1")), Some("0"));
        assert_eq!(buildkit_env(Some("2")), Some("1"));
        assert_eq!(buildkit_env(Some("3")), None);
        assert_eq!(buildkit_env(None), None);
    }

    #[test]
    fn parses_inspect_output() {
        let out = br#"{"Id":"sha256:abc","RepoTags":["alpine:3.18"],"RepoDigests":["alpine@sha256:def"]}"#;
        let inspect = parse_inspect(out).unwrap().unwrap();
        assert_eq!(inspect.id, "sha256:abc");
        assert_eq!(inspect.repo_digests, vec!["alpine@sha256:def"]);

        let local = br#"{"Id":"sha256:abc","RepoDigests":null}"#;
        assert!(parse_inspect(local).unwrap().unwrap().repo_digests.is_empty());

        assert!(parse_inspect(b"").unwrap().is_none());
        assert!(parse_inspect(b"not json").is_err());
    }

    #[test]
    fn missing_image_messages() {
        assert!(is_missing("Error: No such image: app:v1"));
        assert!(is_missing("Error response from daemon: No such object: sha256:1"));
        assert!(!is_missing(
            "conflict: unable to remove repository reference (must force)"
        ));
    }

    #[tokio::test]
    async fn cancel_unknown_build_is_ok() {
        let docker = DockerCli::default();
        docker.cancel_build("nothing-running").await.unwrap();
    }

    #[tokio::test]
    async fn cancel_signals_registered_build() {
        let docker = DockerCli::default();
        let (registration, rx) = docker.register("b-1");

        docker.cancel_build("b-1").await.unwrap();
        assert!(rx.await.is_ok());
        assert!(docker.running.is_empty());
        drop(registration);
    }

    #[tokio::test]
    async fn registration_cleans_up_on_drop() {
        let docker = DockerCli::default();
        {
            let _registration = docker.register("b-2");
            assert!(docker.running.contains_key("b-2"));
        }
        assert!(!docker.running.contains_key("b-2"));
    }

    #[tokio::test]
    async fn build_credentials_go_to_scratch_config() {
        let mut req = request(BuildContext::Local(PathBuf::from(".")));
        req.version = Some("2".to_string());
        req.auth_configs.insert(
            "ghcr.io".to_string(),
            berth_image::RegistryAuth {
                identity_token: Some("tok".to_string()),
                ..Default::default()
            },
        );
        let scratch = tempfile::tempdir().unwrap();
        let mut command = Command::new("docker");

        configure_build_env(&mut command, &req, scratch.path())
            .await
            .unwrap();

        let config = std::fs::read_to_string(scratch.path().join("config.json")).unwrap();
        assert!(config.contains("ghcr.io"));
        assert!(config.contains("identitytoken"));

        let envs: BTreeMap<_, _> = command
            .as_std()
            .get_envs()
            .map(|(key, value)| (key.to_os_string(), value.map(ToOwned::to_owned)))
            .collect();
        assert_eq!(
            envs[std::ffi::OsStr::new("DOCKER_CONFIG")].as_deref(),
            Some(scratch.path().as_os_str())
        );
        assert_eq!(
            envs[std::ffi::OsStr::new("DOCKER_BUILDKIT")].as_deref(),
            Some(std::ffi::OsStr::new("1"))
        );
    }

    #[tokio::test]
    async fn finished_build_keeps_later_registration() {
        let docker = DockerCli::default();
        let (first, _first_rx) = docker.register("shared");
        let (second, second_rx) = docker.register("shared");

        drop(first);
        assert!(docker.running.contains_key("shared"));

        docker.cancel_build("shared").await.unwrap();
        assert!(second_rx.await.is_ok());
        drop(second);
        assert!(docker.running.is_empty());
    }

    #[tokio::test]
    async fn missing_executable_is_engine_error() {
        let docker = DockerCli::new("/nonexistent/docker-binary");
        let err = docker.inspect_image("alpine").await.unwrap_err();
        assert_eq!(err.kind(), berth_common::ErrorKind::EngineOperationFailed);
    }
}
