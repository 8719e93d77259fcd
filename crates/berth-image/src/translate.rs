//! Build directive translator: [`BuildSpec`] to [`EngineBuildRequest`].
//!
//! This is a pure mapping. It selects the build backend, resolves the build
//! context, merges labels and keys credentials by registry host. Resource
//! limits pass through verbatim; the engine decides what values it accepts.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use berth_common::{BerthError, BerthResult};
use serde::{Deserialize, Serialize};

use crate::auth::RegistryAuth;
use crate::spec::{BuildSecret, BuildSpec, SecretSource, Ulimit};

/// Which build implementation the engine should use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildBackend {
    /// The engine's native build endpoint.
    Legacy,
    /// A named (buildx-style) builder.
    NamedBuilder {
        /// Builder name.
        name: String,
        /// File receiving build output, if any.
        log_file: Option<PathBuf>,
    },
}

/// Where the build context comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildContext {
    /// A local directory.
    Local(PathBuf),
    /// A Git or HTTP(S) URI fetched by the engine.
    Remote(String),
}

/// A secret handed to the builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretDescriptor {
    /// Secret ID.
    pub id: String,
    /// Resolved source.
    pub source: SecretSource,
}

impl From<&BuildSecret> for SecretDescriptor {
    fn from(secret: &BuildSecret) -> Self {
        Self {
            id: secret.id.clone(),
            source: secret.source.clone(),
        }
    }
}

/// Resource limits for build containers, passed through unvalidated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildResources {
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
    /// Shared memory size.
    pub shm_size: Option<i64>,
    /// Parent cgroup.
    pub cgroup_parent: Option<String>,
    /// Network mode.
    pub network_mode: Option<String>,
    /// Ulimits.
    pub ulimits: Vec<Ulimit>,
}

/// A fully populated build request for the engine client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineBuildRequest {
    /// Build backend.
    pub backend: BuildBackend,
    /// Build context.
    pub context: BuildContext,
    /// Dockerfile name.
    pub dockerfile: String,
    /// Tags to apply.
    pub tags: Vec<String>,
    /// Remove intermediate containers after a successful build.
    pub remove: bool,
    /// Always remove intermediate containers.
    pub force_remove: bool,
    /// Suppress build output.
    pub suppress_output: bool,
    /// Disable cache.
    pub no_cache: bool,
    /// Pull parent images.
    pub pull_parent: bool,
    /// Squash layers.
    pub squash: bool,
    /// Isolation technology.
    pub isolation: Option<String>,
    /// Build container limits.
    pub resources: BuildResources,
    /// Build args.
    pub build_args: BTreeMap<String, String>,
    /// Merged labels.
    pub labels: BTreeMap<String, String>,
    /// Credentials keyed by registry host.
    pub auth_configs: BTreeMap<String, RegistryAuth>,
    /// Secrets (named builder only).
    pub secrets: Vec<SecretDescriptor>,
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
    /// Builder version, opaque to the core.
    pub version: Option<String>,
    /// Cancellation correlation ID, opaque to the core.
    pub build_id: Option<String>,
}

impl EngineBuildRequest {
    /// Append `tag` unless it is already present.
    pub fn ensure_tag(&mut self, tag: &str) {
        if !self.tags.iter().any(|t| t == tag) {
            self.tags.push(tag.to_string());
        }
    }

    /// Log file for the named builder path.
    #[must_use]
    pub fn log_file(&self) -> Option<&Path> {
        match &self.backend {
            BuildBackend::NamedBuilder { log_file, .. } => log_file.as_deref(),
            BuildBackend::Legacy => None,
        }
    }

    /// Builder name, if a named builder is selected.
    #[must_use]
    pub fn builder_name(&self) -> Option<&str> {
        match &self.backend {
            BuildBackend::NamedBuilder { name, .. } => Some(name),
            BuildBackend::Legacy => None,
        }
    }
}

/// Translate a normalized build spec into an engine build request.
///
/// # Errors
///
/// Returns [`BerthError::UnsupportedOption`] if secrets are requested without
/// a named builder.
pub fn translate(build: &BuildSpec) -> BerthResult<EngineBuildRequest> {
    let backend = match &build.builder {
        Some(name) => BuildBackend::NamedBuilder {
            name: name.clone(),
            log_file: build.build_log_file.clone(),
        },
        None => {
            if !build.secrets.is_empty() {
                return Err(BerthError::UnsupportedOption {
                    option: "build.secrets".to_string(),
                    reason: "secrets are only available with a named builder".to_string(),
                });
            }
            if let Some(path) = &build.build_log_file {
                tracing::warn!(
                    path = %path.display(),
                    "build_log_file is ignored without a named builder"
                );
            }
            BuildBackend::Legacy
        }
    };

    let context = match (&backend, &build.remote_context) {
        (BuildBackend::Legacy, Some(uri)) => BuildContext::Remote(uri.clone()),
        (BuildBackend::NamedBuilder { .. }, Some(uri)) => {
            tracing::debug!(uri = %uri, "remote_context is ignored with a named builder");
            BuildContext::Local(PathBuf::from(&build.context))
        }
        (_, None) => BuildContext::Local(PathBuf::from(&build.context)),
    };

    Ok(EngineBuildRequest {
        backend,
        context,
        dockerfile: build.dockerfile.clone(),
        tags: build.tag.clone(),
        remove: build.remove,
        force_remove: build.force_remove,
        suppress_output: build.suppress_output,
        no_cache: build.no_cache,
        pull_parent: build.pull_parent,
        squash: build.squash,
        isolation: build.isolation.clone(),
        resources: BuildResources {
            cpu_set_cpus: build.cpu_set_cpus.clone(),
            cpu_set_mems: build.cpu_set_mems.clone(),
            cpu_shares: build.cpu_shares,
            cpu_quota: build.cpu_quota,
            cpu_period: build.cpu_period,
            memory: build.memory,
            memory_swap: build.memory_swap,
            shm_size: build.shm_size,
            cgroup_parent: build.cgroup_parent.clone(),
            network_mode: build.network_mode.clone(),
            ulimits: build.ulimit.clone(),
        },
        build_args: build.build_args.clone(),
        labels: merge_labels(build),
        auth_configs: auth_by_host(build),
        secrets: build.secrets.iter().map(SecretDescriptor::from).collect(),
        cache_from: build.cache_from.clone(),
        security_opt: build.security_opt.clone(),
        extra_hosts: build.extra_hosts.clone(),
        target: build.target.clone(),
        session_id: build.session_id.clone(),
        platform: build.platform.clone(),
        version: build.version.clone(),
        build_id: build.build_id.clone(),
    })
}

/// `label` first, then legacy `labels`; on a key conflict `labels` wins.
fn merge_labels(build: &BuildSpec) -> BTreeMap<String, String> {
    let mut merged = build.label.clone();
    for (key, value) in &build.labels {
        match merged.insert(key.clone(), value.clone()) {
            Some(previous) if previous != *value => {
                tracing::warn!(
                    key = %key,
                    label = %previous,
                    labels = %value,
                    "Label set in both `label` and `labels`, using `labels`"
                );
            }
            _ => {}
        }
    }
    merged
}

fn auth_by_host(build: &BuildSpec) -> BTreeMap<String, RegistryAuth> {
    let mut auths = BTreeMap::new();
    for config in &build.auth_config {
        if auths
            .insert(config.host_name.clone(), RegistryAuth::from(config))
            .is_some()
        {
            tracing::warn!(host = %config.host_name, "Duplicate auth_config host, last entry wins");
        }
    }
    auths
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::AuthConfig;

    fn build_spec(context: &str) -> BuildSpec {
        BuildSpec {
            context: context.to_string(),
            dockerfile: "Dockerfile".to_string(),
            tag: Vec::new(),
            remove: true,
            secrets: Vec::new(),
            label: BTreeMap::new(),
            labels: BTreeMap::new(),
            suppress_output: false,
            remote_context: None,
            no_cache: false,
            force_remove: false,
            pull_parent: false,
            isolation: None,
            cpu_set_cpus: None,
            cpu_set_mems: None,
            cpu_shares: None,
            cpu_quota: None,
            cpu_period: None,
            memory: None,
            memory_swap: None,
            cgroup_parent: None,
            network_mode: None,
            shm_size: None,
            ulimit: Vec::new(),
            build_args: BTreeMap::new(),
            auth_config: Vec::new(),
            squash: false,
            cache_from: Vec::new(),
            security_opt: Vec::new(),
            extra_hosts: Vec::new(),
            target: None,
            session_id: None,
            platform: None,
            version: None,
            build_id: None,
            builder: None,
            build_log_file: None,
        }
    }

    #[test]
    fn minimal_build_request() {
        let mut build = build_spec("./app");
        build.tag = vec!["app:v1".to_string()];

        let request = translate(&build).unwrap();
        assert_eq!(request.backend, BuildBackend::Legacy);
        assert_eq!(request.context, BuildContext::Local(PathBuf::from("./app")));
        assert_eq!(request.dockerfile, "Dockerfile");
        assert_eq!(request.tags, vec!["app:v1".to_string()]);
        assert!(request.remove);
    }

    #[test]
    fn named_builder_keeps_log_file() {
        let mut build = build_spec(".");
        build.builder = Some("ci".to_string());
        build.build_log_file = Some(PathBuf::from("/tmp/build.log"));

        let request = translate(&build).unwrap();
        assert_eq!(request.builder_name(), Some("ci"));
        assert_eq!(request.log_file(), Some(Path::new("/tmp/build.log")));
    }

    #[test]
    fn legacy_path_drops_log_file() {
        let mut build = build_spec(".");
        build.build_log_file = Some(PathBuf::from("/tmp/build.log"));

        let request = translate(&build).unwrap();
        assert_eq!(request.backend, BuildBackend::Legacy);
        assert_eq!(request.log_file(), None);
    }

    #[test]
    fn secrets_need_named_builder() {
        let mut build = build_spec(".");
        build.secrets = vec![BuildSecret {
            id: "token".to_string(),
            source: SecretSource::Env("TOKEN".to_string()),
        }];

        let err = translate(&build).unwrap_err();
        assert_eq!(err.kind(), berth_common::ErrorKind::UnsupportedOption);

        build.builder = Some("ci".to_string());
        let request = translate(&build).unwrap();
        assert_eq!(request.secrets.len(), 1);
        assert_eq!(request.secrets[0].id, "token");
    }

    #[test]
    fn remote_context_overrides_on_legacy_path() {
        let mut build = build_spec("./app");
        build.remote_context = Some("https://github.com/org/app.git#main".to_string());

        let request = translate(&build).unwrap();
        assert_eq!(
            request.context,
            BuildContext::Remote("https://github.com/org/app.git#main".to_string())
        );

        build.builder = Some("ci".to_string());
        let request = translate(&build).unwrap();
        assert_eq!(request.context, BuildContext::Local(PathBuf::from("./app")));
    }

    #[test]
    fn legacy_labels_win_on_conflict() {
        let mut build = build_spec(".");
        build.label.insert("team".to_string(), "infra".to_string());
        build.label.insert("tier".to_string(), "web".to_string());
        build.labels.insert("team".to_string(), "platform".to_string());
        build.labels.insert("owner".to_string(), "ops".to_string());

        let labels = translate(&build).unwrap().labels;
        assert_eq!(labels.len(), 3);
        assert_eq!(labels["team"], "platform");
        assert_eq!(labels["tier"], "web");
        assert_eq!(labels["owner"], "ops");
    }

    #[test]
    fn auth_keyed_by_host() {
        let mut build = build_spec(".");
        build.auth_config = vec![
            AuthConfig {
                host_name: "ghcr.io".to_string(),
                auth: Some("Ym90OnMzY3JldA==".to_string()),
                ..AuthConfig::default()
            },
            AuthConfig {
                host_name: "registry.local".to_string(),
                user_name: Some("bot".to_string()),
                password: Some("pw".to_string()),
                ..AuthConfig::default()
            },
        ];

        let auths = translate(&build).unwrap().auth_configs;
        assert_eq!(auths["ghcr.io"].auth.as_deref(), Some("Ym90OnMzY3JldA=="));
        assert!(auths["ghcr.io"].username.is_none());
        assert_eq!(auths["registry.local"].username.as_deref(), Some("bot"));
        assert!(auths["registry.local"].auth.is_none());
    }

    #[test]
    fn limits_pass_through_verbatim() {
        let mut build = build_spec(".");
        build.memory = Some(-5);
        build.cpu_shares = Some(0);
        build.ulimit = vec![Ulimit {
            name: "nofile".to_string(),
            soft: 1024,
            hard: 512,
        }];

        let resources = translate(&build).unwrap().resources;
        assert_eq!(resources.memory, Some(-5));
        assert_eq!(resources.cpu_shares, Some(0));
        assert_eq!(resources.ulimits[0].hard, 512);
    }

    #[test]
    fn ensure_tag_is_idempotent() {
        let mut build = build_spec(".");
        build.tag = vec!["app:v1".to_string()];
        let mut request = translate(&build).unwrap();

        request.ensure_tag("app:latest");
        request.ensure_tag("app:v1");
        request.ensure_tag("app:latest");
        assert_eq!(request.tags, vec!["app:v1", "app:latest"]);
    }
}
