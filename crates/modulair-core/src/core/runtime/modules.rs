use std::collections::{BTreeMap, HashMap};
use std::env;

use anyhow::{bail, Result};
use modulair_domain::ModuleId;

use crate::errors::EnvError;
use crate::process::run_command;

/// Variables the child shell sets for itself; never copied back.
const SHELL_VARS: [&str; 4] = ["_", "SHLVL", "PWD", "OLDPWD"];

fn load_script(command: &str) -> String {
    format!("{command} load \"$@\" 1>&2 && env -0")
}

/// Loads `modules` in order by running the module command in a child shell
/// and applying the environment it ends with to this process.
pub(crate) fn load_into_process(command: &str, modules: &[ModuleId]) -> Result<()> {
    if modules.is_empty() {
        return Ok(());
    }
    let joined = modules
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ");
    let mut args = vec!["-c".to_string(), load_script(command), "modulair".to_string()];
    args.extend(modules.iter().map(ToString::to_string));
    let output = run_command("bash", &args)?;
    if !output.success() {
        return Err(EnvError::ModuleLoadFailed {
            modules: joined,
            reason: output.stderr_summary(),
        }
        .into());
    }
    if output.truncated {
        bail!("environment reported by `{command} load` exceeded the capture limit");
    }

    let current: HashMap<String, String> = env::vars_os()
        .map(|(k, v)| {
            (
                k.to_string_lossy().into_owned(),
                v.to_string_lossy().into_owned(),
            )
        })
        .collect();
    let loaded = parse_env_dump(&output.stdout);
    let (set, removed) = env_changes(&current, &loaded);
    tracing::debug!(modules = %joined, set = set.len(), removed = removed.len(), "applying module environment");
    for (key, value) in set {
        env::set_var(key, value);
    }
    for key in removed {
        env::remove_var(key);
    }
    Ok(())
}

fn parse_env_dump(dump: &str) -> BTreeMap<String, String> {
    dump.split('\0')
        .filter_map(|entry| entry.split_once('='))
        .filter(|(key, _)| !key.is_empty())
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

fn env_changes<'a>(
    current: &HashMap<String, String>,
    loaded: &'a BTreeMap<String, String>,
) -> (Vec<(&'a str, &'a str)>, Vec<String>) {
    let set = loaded
        .iter()
        .filter(|(key, _)| !SHELL_VARS.contains(&key.as_str()))
        .filter(|(key, value)| current.get(*key) != Some(*value))
        .map(|(key, value)| (key.as_str(), value.as_str()))
        .collect();
    let mut removed: Vec<String> = current
        .keys()
        .filter(|key| !SHELL_VARS.contains(&key.as_str()) && !loaded.contains_key(*key))
        .cloned()
        .collect();
    removed.sort();
    (set, removed)
}
