//! Scheduling-metadata injection into job-definition documents.
//!
//! The input is parsed into a [`JobDefinitionDocument`], which validates the
//! shape up front (root mapping, non-empty `jobs` mapping of mappings, `env`
//! mappings). The injection itself only touches the `env` mapping of each
//! job; everything else round-trips through `serde_yaml` untouched apart from
//! formatting. Comments are not preserved.

use std::collections::BTreeSet;

use serde_yaml::{Mapping, Value};

use crate::config::EnvSource;
use crate::error::{parse_err, TransformError};
use crate::types::{JobPolicy, SchedulingParameters};

const JOBS_KEY: &str = "jobs";
const ENV_KEY: &str = "env";

// ---------------------------------------------------------------------------
// Validated document
// ---------------------------------------------------------------------------

/// A parsed workflow document whose `jobs` section has been validated.
#[derive(Debug, Clone, PartialEq)]
pub struct JobDefinitionDocument {
    root: Mapping,
}

impl JobDefinitionDocument {
    /// Parse and validate `text`.
    pub fn parse(text: &str) -> Result<Self, TransformError> {
        let value: Value = serde_yaml::from_str(text).map_err(|e| parse_err(e.to_string()))?;
        let Value::Mapping(root) = value else {
            return Err(parse_err("document root is not a mapping"));
        };

        let jobs = match root.get(JOBS_KEY) {
            Some(Value::Mapping(jobs)) if !jobs.is_empty() => jobs,
            _ => return Err(TransformError::NoJobs),
        };
        for (name, job) in jobs {
            let Value::Mapping(job) = job else {
                return Err(parse_err(format!("job '{}' is not a mapping", key_label(name))));
            };
            match job.get(ENV_KEY) {
                None | Some(Value::Null) | Some(Value::Mapping(_)) => {}
                Some(_) => {
                    return Err(parse_err(format!(
                        "env of job '{}' is not a mapping",
                        key_label(name)
                    )))
                }
            }
        }

        Ok(Self { root })
    }

    /// Job names in document order.
    pub fn job_names(&self) -> Vec<String> {
        self.jobs()
            .map(|jobs| jobs.keys().map(key_label).collect())
            .unwrap_or_default()
    }

    pub fn job_count(&self) -> usize {
        self.jobs().map_or(0, Mapping::len)
    }

    /// The `env` mapping of `job`, if the job exists and has one.
    pub fn job_env(&self, job: &str) -> Option<&Mapping> {
        self.jobs()?.get(job)?.get(ENV_KEY)?.as_mapping()
    }

    /// String value of `key` in the `env` of `job`.
    pub fn env_value(&self, job: &str, key: &str) -> Option<&str> {
        self.job_env(job)?.get(key)?.as_str()
    }

    /// Call `f` with each job's name and `env` mapping, creating an empty
    /// `env` for jobs that have none.
    pub fn for_each_job_env(&mut self, mut f: impl FnMut(&str, &mut Mapping)) {
        let Some(Value::Mapping(jobs)) = self.root.get_mut(JOBS_KEY) else {
            return;
        };
        for (name, job) in jobs.iter_mut() {
            let name = key_label(name);
            let Value::Mapping(job) = job else {
                continue;
            };
            let env = job
                .entry(Value::String(ENV_KEY.to_string()))
                .or_insert_with(|| Value::Mapping(Mapping::new()));
            if env.is_null() {
                *env = Value::Mapping(Mapping::new());
            }
            if let Value::Mapping(env) = env {
                f(name.as_str(), env);
            }
        }
    }

    /// Serialize back to YAML.
    pub fn to_yaml(&self) -> Result<String, TransformError> {
        Ok(serde_yaml::to_string(&self.root)?)
    }

    fn jobs(&self) -> Option<&Mapping> {
        self.root.get(JOBS_KEY).and_then(Value::as_mapping)
    }
}

fn key_label(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}

// ---------------------------------------------------------------------------
// Transform
// ---------------------------------------------------------------------------

/// Parse `document`, inject the scheduling variables into its jobs and
/// serialize the result.
pub fn transform(
    document: &str,
    params: &SchedulingParameters,
    env: &impl EnvSource,
) -> Result<String, TransformError> {
    let mut doc = JobDefinitionDocument::parse(document)?;
    apply(&mut doc, params, env)?;
    doc.to_yaml()
}

/// Inject the scheduling variables into an already parsed document.
///
/// Variables listed in `copy_env_variables` are copied first so the
/// `DELAYED_JOB_*` values always win on a name clash.
pub fn apply(
    doc: &mut JobDefinitionDocument,
    params: &SchedulingParameters,
    env: &impl EnvSource,
) -> Result<(), TransformError> {
    let count = doc.job_count();
    if params.job_policy == JobPolicy::SingleJob && count > 1 {
        return Err(TransformError::MultipleJobs { count });
    }

    let copied = snapshot_env(&params.copy_env_variables, env);
    let injected = params.injected_vars();

    doc.for_each_job_env(|job, vars| {
        tracing::info!(job, "adding env variables to job");
        for (key, value) in &copied {
            vars.insert(Value::String(key.clone()), Value::String(value.clone()));
            tracing::info!(job, key = %key, value = %value, "copied env variable");
        }
        for (key, value) in &injected {
            vars.insert(Value::String((*key).to_string()), Value::String(value.clone()));
            tracing::info!(job, key = %key, value = %value, "injected env variable");
        }
    });
    Ok(())
}

/// Resolve the requested variable names against `env`. Names that are unset
/// are reported once and skipped.
fn snapshot_env(names: &[String], env: &impl EnvSource) -> Vec<(String, String)> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    for name in names {
        if !seen.insert(name.as_str()) {
            continue;
        }
        match env.var(name) {
            Some(value) => out.push((name.clone(), value)),
            None => tracing::warn!(variable = %name, "env variable to copy is not set; skipping"),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
