use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::{Config, GlobalOptions};
use crate::effects::{self, SharedEffects};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandGroup {
    Create,
    List,
    Activate,
    Delete,
    Doctor,
}

impl fmt::Display for CommandGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CommandGroup::Create => "create",
            CommandGroup::List => "list",
            CommandGroup::Activate => "activate",
            CommandGroup::Delete => "delete",
            CommandGroup::Doctor => "doctor",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct CommandInfo {
    pub group: CommandGroup,
    pub name: &'static str,
}

impl CommandInfo {
    #[must_use]
    pub const fn new(group: CommandGroup, name: &'static str) -> Self {
        Self { group, name }
    }
}

pub struct CommandContext<'a> {
    pub global: &'a GlobalOptions,
    config: Config,
    effects: SharedEffects,
}

impl<'a> CommandContext<'a> {
    #[must_use]
    pub fn with_config(global: &'a GlobalOptions, config: Config, effects: SharedEffects) -> Self {
        Self {
            global,
            config,
            effects,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn modules(&self) -> &dyn effects::ModuleSystem {
        self.effects.modules()
    }

    pub fn python(&self) -> &dyn effects::PythonRuntime {
        self.effects.python()
    }

    pub fn accounts(&self) -> &dyn effects::Accounts {
        self.effects.accounts()
    }

    pub fn fs(&self) -> &dyn effects::FileSystem {
        self.effects.fs()
    }
}
