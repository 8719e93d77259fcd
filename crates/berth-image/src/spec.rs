//! Declared and normalized image specifications.
//!
//! `Raw*` types mirror the declarative surface field for field and are what
//! manifests deserialize into. [`normalize`](crate::normalize::normalize)
//! turns them into the validated [`ImageSpec`] that the reconciler consumes.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::fingerprint::{Fingerprint, fingerprint_map, fingerprint_set};

/// Default Dockerfile name inside the build context.
pub const DEFAULT_DOCKERFILE: &str = "Dockerfile";

/// Default deadline for create, update and delete.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20 * 60);

/// An image resource as declared by the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawImageSpec {
    /// Image name, including any tag or digest.
    pub name: String,

    /// Build configuration. Conflicts with `pull_triggers`.
    #[serde(default)]
    pub build: Option<RawBuildSpec>,

    /// Values which cause a fresh pull (by replacement) when changed.
    #[serde(default)]
    pub pull_triggers: Vec<String>,

    /// Arbitrary values which force replacement when changed.
    #[serde(default)]
    pub triggers: BTreeMap<String, String>,

    /// Keep the image in the engine on destroy.
    #[serde(default)]
    pub keep_locally: bool,

    /// Remove the image forcibly on destroy.
    #[serde(default)]
    pub force_remove: bool,

    /// Platform to pull for. Empty means engine default.
    #[serde(default)]
    pub platform: Option<String>,

    /// Per-operation deadlines.
    #[serde(default)]
    pub timeouts: Timeouts,
}

/// Build configuration as declared by the user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawBuildSpec {
    /// Build context path.
    pub context: String,
    /// Dockerfile name, defaults to `Dockerfile`.
    #[serde(default)]
    pub dockerfile: Option<String>,
    /// Tags in `name:tag` form.
    #[serde(default)]
    pub tag: Vec<String>,
    /// Remove intermediate containers after a successful build, defaults to true.
    #[serde(default)]
    pub remove: Option<bool>,
    /// Build-time secrets (named builder only).
    #[serde(default)]
    pub secrets: Vec<RawSecret>,
    /// Image labels.
    #[serde(default)]
    pub label: BTreeMap<String, String>,
    /// Legacy label map, merged into `label`.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Suppress build output.
    #[serde(default)]
    pub suppress_output: bool,
    /// Git or HTTP(S) context URI, ignored when `builder` is set.
    #[serde(default)]
    pub remote_context: Option<String>,
    /// Do not use the build cache.
    #[serde(default)]
    pub no_cache: bool,
    /// Always remove intermediate containers.
    #[serde(default)]
    pub force_remove: bool,
    /// Pull newer versions of parent images.
    #[serde(default)]
    pub pull_parent: bool,
    /// Isolation technology.
    #[serde(default)]
    pub isolation: Option<String>,
    /// CPUs in which to allow execution.
    #[serde(default)]
    pub cpu_set_cpus: Option<String>,
    /// Memory nodes in which to allow execution.
    #[serde(default)]
    pub cpu_set_mems: Option<String>,
    /// Relative CPU weight.
    #[serde(default)]
    pub cpu_shares: Option<i64>,
    /// CPU time per period in microseconds.
    #[serde(default)]
    pub cpu_quota: Option<i64>,
    /// CPU period length in microseconds.
    #[serde(default)]
    pub cpu_period: Option<i64>,
    /// Memory limit in bytes.
    #[serde(default)]
    pub memory: Option<i64>,
    /// Memory plus swap in bytes, -1 for unlimited swap.
    #[serde(default)]
    pub memory_swap: Option<i64>,
    /// Parent cgroup.
    #[serde(default)]
    pub cgroup_parent: Option<String>,
    /// Network mode for RUN instructions.
    #[serde(default)]
    pub network_mode: Option<String>,
    /// Size of /dev/shm in bytes.
    #[serde(default)]
    pub shm_size: Option<i64>,
    /// Ulimits for build containers.
    #[serde(default)]
    pub ulimit: Vec<Ulimit>,
    /// Build-time variables.
    #[serde(default)]
    pub build_args: BTreeMap<String, String>,
    /// Per-registry credentials.
    #[serde(default)]
    pub auth_config: Vec<AuthConfig>,
    /// Squash new layers into one.
    #[serde(default)]
    pub squash: bool,
    /// Images to consider as cache sources.
    #[serde(default)]
    pub cache_from: Vec<String>,
    /// Security options.
    #[serde(default)]
    pub security_opt: Vec<String>,
    /// `hostname:IP` mappings.
    #[serde(default)]
    pub extra_hosts: Vec<String>,
    /// Target build stage.
    #[serde(default)]
    pub target: Option<String>,
    /// Build session ID.
    #[serde(default)]
    pub session_id: Option<String>,
    /// Target platform for the build.
    #[serde(default)]
    pub platform: Option<String>,
    /// Builder version.
    #[serde(default)]
    pub version: Option<String>,
    /// Identifier that can later cancel this build.
    #[serde(default)]
    pub build_id: Option<String>,
    /// Named builder. Absent selects the legacy engine-native path.
    #[serde(default)]
    pub builder: Option<String>,
    /// File receiving named-builder output.
    #[serde(default)]
    pub build_log_file: Option<PathBuf>,
}

/// A build secret as declared; `src` takes precedence over `env`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawSecret {
    /// Secret ID, mounted at `/run/secrets/<id>` by default.
    pub id: String,
    /// File source.
    #[serde(default)]
    pub src: Option<String>,
    /// Environment variable source.
    #[serde(default)]
    pub env: Option<String>,
}

/// A ulimit applied to build containers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Ulimit {
    /// Limit type, e.g. `nofile`.
    pub name: String,
    /// Soft limit.
    pub soft: i64,
    /// Hard limit.
    pub hard: i64,
}

/// Credentials for one registry host.
///
/// Any combination of credential fields is accepted and passed through.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    /// Registry host name.
    pub host_name: String,
    /// User name.
    #[serde(default)]
    pub user_name: Option<String>,
    /// Password.
    #[serde(default)]
    pub password: Option<String>,
    /// Base64 `user:password` token.
    #[serde(default)]
    pub auth: Option<String>,
    /// E-mail.
    #[serde(default)]
    pub email: Option<String>,
    /// Server address.
    #[serde(default)]
    pub server_address: Option<String>,
    /// OAuth identity token.
    #[serde(default)]
    pub identity_token: Option<String>,
    /// Bearer registry token.
    #[serde(default)]
    pub registry_token: Option<String>,
}

/// Deadlines for the reconciliation steps of one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Timeouts {
    /// Create deadline.
    #[serde(default = "default_timeout", with = "berth_common::duration::human")]
    pub create: Duration,
    /// Update deadline.
    #[serde(default = "default_timeout", with = "berth_common::duration::human")]
    pub update: Duration,
    /// Delete deadline.
    #[serde(default = "default_timeout", with = "berth_common::duration::human")]
    pub delete: Duration,
}

const fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            create: DEFAULT_TIMEOUT,
            update: DEFAULT_TIMEOUT,
            delete: DEFAULT_TIMEOUT,
        }
    }
}

/// Normalized desired state of one image resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSpec {
    /// Image name.
    pub name: String,
    /// Build directive; `None` means the image is pulled.
    pub build: Option<BuildSpec>,
    /// Pull trigger set.
    pub pull_triggers: BTreeSet<String>,
    /// Replacement triggers.
    pub triggers: BTreeMap<String, String>,
    /// Keep the image on delete.
    pub keep_locally: bool,
    /// Force removal on delete.
    pub force_remove: bool,
    /// Pull platform, empty for engine default.
    pub platform: String,
    /// Per-operation deadlines.
    pub timeouts: Timeouts,
}

impl ImageSpec {
    /// A pull-only spec with defaults for everything but the name.
    #[must_use]
    pub fn pull(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            build: None,
            pull_triggers: BTreeSet::new(),
            triggers: BTreeMap::new(),
            keep_locally: false,
            force_remove: false,
            platform: String::new(),
            timeouts: Timeouts::default(),
        }
    }

    /// Fingerprint of the pull trigger set.
    #[must_use]
    pub fn pull_triggers_fingerprint(&self) -> Fingerprint {
        fingerprint_set(&self.pull_triggers)
    }

    /// Fingerprint of the trigger map.
    #[must_use]
    pub fn triggers_fingerprint(&self) -> Fingerprint {
        fingerprint_map(&self.triggers)
    }
}

/// Normalized build directive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSpec {
    /// Build context path.
    pub context: String,
    /// Dockerfile name.
    pub dockerfile: String,
    /// Tags.
    pub tag: Vec<String>,
    /// Remove intermediate containers.
    pub remove: bool,
    /// Secrets with resolved sources.
    pub secrets: Vec<BuildSecret>,
    /// Labels.
    pub label: BTreeMap<String, String>,
    /// Legacy labels.
    pub labels: BTreeMap<String, String>,
    /// Suppress output.
    pub suppress_output: bool,
    /// Remote context URI.
    pub remote_context: Option<String>,
    /// Disable cache.
    pub no_cache: bool,
    /// Always remove intermediate containers.
    pub force_remove: bool,
    /// Pull parent images.
    pub pull_parent: bool,
    /// Isolation technology.
    pub isolation: Option<String>,
    /// CPU set.
    pub cpu_set_cpus: Option<String>,
    /// Memory node set.
    pub cpu_set_mems: Option<String>,
    /// CPU shares.
    pub cpu_shares: Option<i64>,
    /// CPU quota.
    pub cpu_quota: Option<i64>,
    /// CPU period.
    pub cpu_period: Option<i64>,
    /// Memory limit.
    pub memory: Option<i64>,
    /// Memory plus swap.
    pub memory_swap: Option<i64>,
    /// Parent cgroup.
    pub cgroup_parent: Option<String>,
    /// Network mode.
    pub network_mode: Option<String>,
    /// Shared memory size.
    pub shm_size: Option<i64>,
    /// Ulimits.
    pub ulimit: Vec<Ulimit>,
    /// Build args.
    pub build_args: BTreeMap<String, String>,
    /// Registry credentials.
    pub auth_config: Vec<AuthConfig>,
    /// Squash layers.
    pub squash: bool,
    /// Cache sources.
    pub cache_from: Vec<String>,
    /// Security options.
    pub security_opt: Vec<String>,
    /// Extra hosts.
    pub extra_hosts: Vec<String>,
    /// Target stage.
    pub target: Option<String>,
    /// Session ID.
    pub session_id: Option<String>,
    /// Target platform.
    pub platform: Option<String>,
    /// Builder version.
    pub version: Option<String>,
    /// Cancellation correlation ID.
    pub build_id: Option<String>,
    /// Named builder.
    pub builder: Option<String>,
    /// Named-builder log file.
    pub build_log_file: Option<PathBuf>,
}

/// A build secret with exactly one resolved source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSecret {
    /// Secret ID.
    pub id: String,
    /// Where the secret value comes from.
    pub source: SecretSource,
}

/// Source of a build secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretSource {
    /// Read from a file.
    File(PathBuf),
    /// Read from an environment variable.
    Env(String),
}
