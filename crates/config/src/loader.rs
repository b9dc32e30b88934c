use std::{fmt::Write, path::Path, str::FromStr, time::Duration};

use anyhow::bail;
use indoc::formatdoc;
use serde::Deserialize;
use serde_dynamic_string::DynamicString;
use toml::Value;

use crate::{AdmissionConfig, Config, PolicyConfig};

pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let path = path.as_ref().to_path_buf();
    let content = std::fs::read_to_string(&path)?;
    let mut raw_config: Value = toml::from_str(&content)?;

    expand_dynamic_strings(&mut Vec::new(), &mut raw_config)?;

    let config = Config::deserialize(raw_config)?;
    let warnings = validate_admission(&config.admission)?;

    for warning in warnings {
        log::warn!("{warning}");
    }

    Ok(config)
}

fn expand_dynamic_strings<'a>(path: &mut Vec<Result<&'a str, usize>>, value: &'a mut Value) -> anyhow::Result<()> {
    match value {
        Value::String(s) => match DynamicString::<String>::from_str(s) {
            Ok(out) => *s = out.into_inner(),
            Err(err) => {
                let mut p = String::new();

                for segment in path {
                    match segment {
                        Ok(s) => {
                            p.push_str(s);
                            p.push('.');
                        }
                        Err(i) => write!(p, "[{i}]")?,
                    }
                }

                if p.ends_with('.') {
                    p.pop();
                }

                bail!("Failed to expand dynamic string at path '{p}': {err}");
            }
        },
        Value::Array(values) => {
            for (i, value) in values.iter_mut().enumerate() {
                path.push(Err(i));
                expand_dynamic_strings(path, value)?;
                path.pop();
            }
        }
        Value::Table(map) => {
            for (key, value) in map {
                path.push(Ok(key.as_str()));
                expand_dynamic_strings(path, value)?;
                path.pop();
            }
        }
        Value::Integer(_) | Value::Float(_) | Value::Boolean(_) | Value::Datetime(_) => (),
    }

    Ok(())
}

/// Validates the admission configuration. Hard errors fail loading, the returned strings are warnings.
pub(crate) fn validate_admission(config: &AdmissionConfig) -> anyhow::Result<Vec<String>> {
    let mut warnings = Vec::new();

    validate_policy("admission.default_policy", &config.default_policy)?;

    for (name, plan) in &config.plans {
        validate_policy(&format!("admission.plans.{name}"), plan)?;
    }

    let assignments = config
        .workspaces
        .iter()
        .map(|(id, plan)| ("workspace", id, plan))
        .chain(config.users.iter().map(|(id, plan)| ("user", id, plan)));

    for (kind, id, plan) in assignments {
        if !config.plans.contains_key(plan) {
            let known = config.plans.keys().map(String::as_str).collect::<Vec<_>>().join(", ");

            bail!(formatdoc! {r#"
                The {kind} '{id}' is assigned to plan '{plan}', which is not defined.
                Known plans: [{known}]

                Define the plan in your configuration, for example:

                  [admission.plans.{plan}]
                  limit = 1000
                  window = "60s"
            "#});
        }
    }

    for weight in &config.weights {
        validate_route_path("admission.weights", &weight.path)?;
    }

    for route in &config.fallback_routes {
        validate_route_path("admission.fallback_routes", &route.path)?;
    }

    if config.counters.sweep_interval.is_zero() {
        bail!("admission.counters.sweep_interval must be greater than zero");
    }

    if config.counters.max_entries == Some(0) {
        bail!("admission.counters.max_entries must be greater than zero when set");
    }

    if config.enabled && config.plans.is_empty() && config.fallback_routes.is_empty() {
        warnings.push(
            "Admission control is enabled without plans or fallback routes. Every subject is limited by the default policy and no route stays reachable once it is spent."
                .to_string(),
        );
    }

    if config.enabled && config.default_policy.unlimited {
        warnings.push(
            "The default admission policy is unlimited. Subjects without a plan and all fallback routes are never limited."
                .to_string(),
        );
    }

    Ok(warnings)
}

fn validate_policy(path: &str, policy: &PolicyConfig) -> anyhow::Result<()> {
    if !policy.unlimited && policy.window < Duration::from_secs(1) {
        bail!("{path}: the window must be at least one second, got {:?}", policy.window);
    }

    Ok(())
}

fn validate_route_path(section: &str, path: &str) -> anyhow::Result<()> {
    if !path.starts_with('/') {
        bail!("{section}: path prefix '{path}' must start with '/'");
    }

    Ok(())
}
