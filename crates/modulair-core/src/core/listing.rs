use anyhow::Result;
use modulair_domain::{EnvironmentRecord, Scope};
use serde::Serialize;

use crate::config::context::CommandContext;
use crate::core::lifecycle::{is_unavailable, user_groups};
use crate::core::registry::{LOCK_SUFFIX, METADATA_FILENAME};
use crate::core::scopes::ScopeLayout;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScopeSelection {
    /// Personal scope plus every group of the user that has environments.
    All,
    Personal,
    Group(String),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ListedEnvironment {
    Name(String),
    Full(EnvironmentRecord),
}

impl ListedEnvironment {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            ListedEnvironment::Name(name) => name,
            ListedEnvironment::Full(record) => &record.name,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ScopeListing {
    pub scope: Scope,
    pub environments: Vec<ListedEnvironment>,
}

/// Lists the selected scopes in order, grouped by scope. Names are not
/// deduplicated across scopes.
pub fn query(
    ctx: &CommandContext,
    selection: &ScopeSelection,
    name_only: bool,
) -> Result<Vec<ScopeListing>> {
    let project = |record: EnvironmentRecord| {
        if name_only {
            ListedEnvironment::Name(record.name)
        } else {
            ListedEnvironment::Full(record)
        }
    };
    let load = |scope: Scope| -> Result<ScopeListing> {
        let layout = ScopeLayout::resolve(ctx.config(), &scope)?;
        let records = layout.registry(ctx.config()).list()?;
        Ok(ScopeListing {
            scope,
            environments: records.into_iter().map(&project).collect(),
        })
    };

    match selection {
        ScopeSelection::Personal => Ok(vec![load(Scope::Personal)?]),
        ScopeSelection::Group(group) => Ok(vec![load(Scope::Group(group.clone()))?]),
        ScopeSelection::All => {
            let mut listings = vec![load(Scope::Personal)?];
            for group in user_groups(ctx) {
                match load(Scope::Group(group.clone())) {
                    Ok(listing) if listing.environments.is_empty() => {}
                    Ok(listing) => listings.push(listing),
                    Err(err) if is_unavailable(&err) => {
                        tracing::warn!(group = %group, "skipping group registry: {err}");
                    }
                    Err(err) => return Err(err),
                }
            }
            Ok(listings)
        }
    }
}

/// Disagreements between a scope's registry and its directory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DoctorReport {
    pub scope: Scope,
    /// Directories under the scope root that no record points at.
    pub orphaned: Vec<String>,
    /// Records whose directory is gone.
    pub dangling: Vec<String>,
}

impl DoctorReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.orphaned.is_empty() && self.dangling.is_empty()
    }
}

/// Compares one scope's registry with what is on disk. Never modifies either.
pub fn doctor(ctx: &CommandContext, group: Option<&str>) -> Result<DoctorReport> {
    let scope = group.map_or(Scope::Personal, Scope::group);
    let layout = ScopeLayout::resolve(ctx.config(), &scope)?;
    let records = layout.registry(ctx.config()).list()?;

    let dangling = records
        .iter()
        .filter(|record| !ctx.fs().exists(&record.path))
        .map(|record| record.name.clone())
        .collect();

    let lock_name = format!("{METADATA_FILENAME}{LOCK_SUFFIX}");
    let entries = if ctx.fs().exists(layout.root()) {
        ctx.fs().list_dir(layout.root())?
    } else {
        Vec::new()
    };
    let mut orphaned = Vec::new();
    for entry in entries {
        if entry == METADATA_FILENAME || entry == lock_name || entry.starts_with('.') {
            continue;
        }
        let path = layout.environment_path(&entry);
        if records.iter().any(|record| record.path == path) {
            continue;
        }
        tracing::warn!(scope = %scope, path = %path.display(), "orphaned environment directory");
        orphaned.push(entry);
    }

    Ok(DoctorReport {
        scope,
        orphaned,
        dangling,
    })
}
