use clap::{ArgAction, Args, Parser, Subcommand};

pub const MODULAIR_BEFORE_HELP: &str = concat!(
    "modulair ",
    env!("CARGO_PKG_VERSION"),
    " – named Python environments for module-based clusters\n\n",
    "\x1b[1;36mEnvironments\x1b[0m\n",
    "  create           Build an environment from the loaded, requested or listed toolchain.\n",
    "  list             Show personal and group environments.\n",
    "  activate         Load the recorded toolchain; use with eval \"$(modulair activate NAME)\".\n",
    "  delete           Remove an environment directory and its record.\n\n",
    "\x1b[1;36mMaintenance\x1b[0m\n",
    "  doctor           Report directories without records and records without directories.\n",
);

pub const MODULAIR_HELP_TEMPLATE: &str =
    "{before-help}\nUsage:\n    {usage}\n\nGlobal options:\n{options}\n";

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    propagate_version = false,
    disable_help_subcommand = true,
    before_help = MODULAIR_BEFORE_HELP,
    help_template = MODULAIR_HELP_TEMPLATE
)]
#[allow(clippy::struct_excessive_bools)]
pub struct ModulairCli {
    #[arg(
        short,
        long,
        help = "Suppress human output (errors still print to stderr)",
        global = true
    )]
    pub quiet: bool,
    #[arg(short, long, action = ArgAction::Count, help = "Increase logging (-vv reaches trace)", global = true)]
    pub verbose: u8,
    #[arg(long, help = "Force trace logging regardless of -v/-q", global = true)]
    pub trace: bool,
    #[arg(
        long,
        help = "Emit {status,message,details} JSON envelopes",
        global = true
    )]
    pub json: bool,
    #[arg(long, help = "Disable colored human output", global = true)]
    pub no_color: bool,
    #[command(subcommand)]
    pub command: CommandGroupCli,
}

#[derive(Subcommand, Debug)]
pub enum CommandGroupCli {
    #[command(about = "Create a named environment.")]
    Create(CreateArgs),
    #[command(about = "List environments by scope.")]
    List(ListArgs),
    #[command(about = "Load an environment's toolchain and print the activation snippet.")]
    Activate(TargetArgs),
    #[command(about = "Delete an environment and its registry record.")]
    Delete(TargetArgs),
    #[command(about = "Compare a scope's registry with its directory.")]
    Doctor(DoctorArgs),
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    #[arg(value_name = "NAME")]
    pub name: String,
    #[arg(
        short = 'p',
        long = "python",
        value_name = "VERSION",
        conflicts_with = "toolchain",
        help = "Interpreter version to look up in the toolchain catalog"
    )]
    pub python: Option<String>,
    #[arg(
        short = 't',
        long = "toolchain",
        value_name = "MODULES",
        help = "Exact, space separated module list to load, in order"
    )]
    pub toolchain: Option<String>,
    #[arg(short, long, value_name = "GROUP", help = "Create in the group's shared scope")]
    pub group: Option<String>,
    #[arg(short, long, value_name = "TEXT")]
    pub description: Option<String>,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    #[arg(
        short = 'a',
        long = "all",
        conflicts_with_all = ["user", "group"],
        help = "Personal environments and every group you belong to (default)"
    )]
    pub all: bool,
    #[arg(short = 'u', long = "user", conflicts_with = "group", help = "Only personal environments")]
    pub user: bool,
    #[arg(short, long, value_name = "GROUP", help = "Only this group's environments")]
    pub group: Option<String>,
    #[arg(short = 'n', long = "names-only", help = "Print names only")]
    pub names_only: bool,
}

#[derive(Args, Debug)]
pub struct TargetArgs {
    #[arg(value_name = "NAME")]
    pub name: String,
    #[arg(
        short,
        long,
        value_name = "GROUP",
        help = "Only look in this group (default: personal, then your groups)"
    )]
    pub group: Option<String>,
}

#[derive(Args, Debug)]
pub struct DoctorArgs {
    #[arg(short, long, value_name = "GROUP", help = "Check this group instead of your personal scope")]
    pub group: Option<String>,
}
