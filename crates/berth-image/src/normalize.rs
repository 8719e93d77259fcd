//! Option normalizer: declared specification to validated [`ImageSpec`].
//!
//! All defaults are applied here and nowhere else:
//! - `build.dockerfile` defaults to `Dockerfile`
//! - `build.remove` defaults to `true`
//! - `platform` defaults to the empty string (engine default)
//!
//! Empty strings in optional fields are treated as unset.

use std::collections::BTreeSet;

use berth_common::{BerthError, BerthResult};

use crate::reference::ImageReference;
use crate::spec::{
    AuthConfig, BuildSecret, BuildSpec, DEFAULT_DOCKERFILE, ImageSpec, RawBuildSpec,
    RawImageSpec, RawSecret, SecretSource, Ulimit,
};

/// Validate a declared spec and apply defaults.
///
/// # Errors
///
/// Returns [`BerthError::InvalidSpecification`] when:
/// - `name` is empty or not an image reference
/// - both `build` and a non-empty `pull_triggers` are set
/// - the build context is empty
/// - a secret has neither `src` nor `env`
/// - a secret, ulimit or auth entry lacks its required key
pub fn normalize(raw: RawImageSpec) -> BerthResult<ImageSpec> {
    let name = raw.name.trim().to_string();
    if name.is_empty() {
        return Err(BerthError::invalid_spec("`name` must not be empty"));
    }
    ImageReference::parse(&name)?;

    if raw.build.is_some() && !raw.pull_triggers.is_empty() {
        return Err(BerthError::invalid_spec(
            "`build` conflicts with `pull_triggers`: an image is either built or pulled",
        ));
    }

    let build = raw.build.map(normalize_build).transpose()?;

    let spec = ImageSpec {
        name,
        build,
        pull_triggers: raw.pull_triggers.into_iter().collect::<BTreeSet<_>>(),
        triggers: raw.triggers,
        keep_locally: raw.keep_locally,
        force_remove: raw.force_remove,
        platform: non_empty(raw.platform).unwrap_or_default(),
        timeouts: raw.timeouts,
    };

    tracing::debug!(
        name = %spec.name,
        build = spec.build.is_some(),
        pull_triggers = spec.pull_triggers.len(),
        "Normalized image spec"
    );

    Ok(spec)
}

fn normalize_build(raw: RawBuildSpec) -> BerthResult<BuildSpec> {
    if raw.context.trim().is_empty() {
        return Err(BerthError::invalid_spec("`build.context` is required"));
    }

    let secrets = raw
        .secrets
        .into_iter()
        .map(normalize_secret)
        .collect::<BerthResult<Vec<_>>>()?;

    let ulimit = raw
        .ulimit
        .into_iter()
        .map(|ulimit| {
            if ulimit.name.trim().is_empty() {
                Err(BerthError::invalid_spec("`build.ulimit[].name` is required"))
            } else {
                Ok(ulimit)
            }
        })
        .collect::<BerthResult<Vec<Ulimit>>>()?;

    let auth_config = raw
        .auth_config
        .into_iter()
        .map(normalize_auth)
        .collect::<BerthResult<Vec<_>>>()?;

    Ok(BuildSpec {
        context: raw.context,
        dockerfile: non_empty(raw.dockerfile).unwrap_or_else(|| DEFAULT_DOCKERFILE.to_string()),
        tag: raw.tag,
        remove: raw.remove.unwrap_or(true),
        secrets,
        label: raw.label,
        labels: raw.labels,
        suppress_output: raw.suppress_output,
        remote_context: non_empty(raw.remote_context),
        no_cache: raw.no_cache,
        force_remove: raw.force_remove,
        pull_parent: raw.pull_parent,
        isolation: non_empty(raw.isolation),
        cpu_set_cpus: non_empty(raw.cpu_set_cpus),
        cpu_set_mems: non_empty(raw.cpu_set_mems),
        cpu_shares: raw.cpu_shares,
        cpu_quota: raw.cpu_quota,
        cpu_period: raw.cpu_period,
        memory: raw.memory,
        memory_swap: raw.memory_swap,
        cgroup_parent: non_empty(raw.cgroup_parent),
        network_mode: non_empty(raw.network_mode),
        shm_size: raw.shm_size,
        ulimit,
        build_args: raw.build_args,
        auth_config,
        squash: raw.squash,
        cache_from: raw.cache_from,
        security_opt: raw.security_opt,
        extra_hosts: raw.extra_hosts,
        target: non_empty(raw.target),
        session_id: non_empty(raw.session_id),
        platform: non_empty(raw.platform),
        version: non_empty(raw.version),
        build_id: non_empty(raw.build_id),
        builder: non_empty(raw.builder),
        build_log_file: raw.build_log_file.filter(|p| !p.as_os_str().is_empty()),
    })
}

fn normalize_secret(raw: RawSecret) -> BerthResult<BuildSecret> {
    if raw.id.trim().is_empty() {
        return Err(BerthError::invalid_spec("`build.secrets[].id` is required"));
    }

    let source = match (non_empty(raw.src), non_empty(raw.env)) {
        (Some(src), env) => {
            if env.is_some() {
                tracing::debug!(id = %raw.id, "Secret has both src and env, using src");
            }
            SecretSource::File(src.into())
        }
        (None, Some(env)) => SecretSource::Env(env),
        (None, None) => {
            return Err(BerthError::invalid_spec(format!(
                "secret '{}' needs one of `src` or `env`",
                raw.id
            )));
        }
    };

    Ok(BuildSecret { id: raw.id, source })
}

fn normalize_auth(raw: AuthConfig) -> BerthResult<AuthConfig> {
    if raw.host_name.trim().is_empty() {
        return Err(BerthError::invalid_spec(
            "`build.auth_config[].host_name` is required",
        ));
    }

    Ok(AuthConfig {
        host_name: raw.host_name,
        user_name: non_empty(raw.user_name),
        password: non_empty(raw.password),
        auth: non_empty(raw.auth),
        email: non_empty(raw.email),
        server_address: non_empty(raw.server_address),
        identity_token: non_empty(raw.identity_token),
        registry_token: non_empty(raw.registry_token),
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}
