use std::sync::Arc;

use atty::Stream;
use clap::Parser;
use color_eyre::Result;
use modulair_core::{
    self, error_outcome, CommandContext, CommandGroup, CommandInfo, CommandStatus, Config,
    ExecutionOutcome, GlobalOptions, SharedEffects, SystemEffects,
};
use serde_json::Value;

mod cli;
mod dispatch;
mod style;

use cli::ModulairCli;
use dispatch::{command_info, dispatch_command};
use style::Style;

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = ModulairCli::parse();
    init_tracing(cli.trace, cli.verbose, cli.quiet);

    let global = GlobalOptions {
        quiet: cli.quiet,
        verbose: cli.verbose,
        trace: cli.trace,
        json: cli.json,
    };

    let (info, outcome) = match Config::from_env() {
        Ok(config) => {
            let effects: SharedEffects = Arc::new(SystemEffects::new(config.modules()));
            let ctx = CommandContext::with_config(&global, config, effects);
            dispatch_command(&ctx, &cli.command)
        }
        Err(err) => (command_info(&cli.command), error_outcome(&err)),
    };
    let code = emit_output(&cli, info, &outcome)?;

    if code == 0 {
        Ok(())
    } else {
        std::process::exit(code);
    }
}

fn init_tracing(trace: bool, verbose: u8, quiet: bool) {
    let level = if trace {
        "trace"
    } else if quiet {
        "error"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = format!("modulair={level},modulair_core={level},modulair_cli={level}");
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// Prints the outcome and returns the process exit code. Failures go to
/// stderr so `eval "$(modulair activate ...)"` never evaluates them.
fn emit_output(cli: &ModulairCli, info: CommandInfo, outcome: &ExecutionOutcome) -> Result<i32> {
    let code = outcome.exit_code();
    let style = Style::new(cli.no_color, atty::is(Stream::Stdout));

    if cli.json {
        let payload = modulair_core::to_json_response(info, outcome);
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(code);
    }

    if outcome.status != CommandStatus::Ok {
        let style = Style::new(cli.no_color, atty::is(Stream::Stderr));
        let message = modulair_core::format_status_message(info, &outcome.message);
        eprintln!("{}", style.status(&outcome.status, &message));
        if let Some(hint) = hint_from_details(&outcome.details) {
            eprintln!("{}", style.info(&format!("Hint: {hint}")));
        }
        return Ok(code);
    }

    if is_passthrough(&outcome.details) {
        print!("{}", outcome.message);
        return Ok(code);
    }
    if cli.quiet {
        return Ok(code);
    }

    let message = modulair_core::format_status_message(info, &outcome.message);
    println!("{}", style.status(&outcome.status, &message));
    if let Some(hint) = hint_from_details(&outcome.details) {
        println!("{}", style.info(&format!("Hint: {hint}")));
    }
    if info.group == CommandGroup::List {
        if let Some(listing) = render_listing(&style, &outcome.details) {
            println!("{listing}");
        }
    }
    Ok(code)
}

fn hint_from_details(details: &Value) -> Option<&str> {
    details
        .as_object()
        .and_then(|map| map.get("hint"))
        .and_then(Value::as_str)
}

fn is_passthrough(details: &Value) -> bool {
    details
        .as_object()
        .and_then(|map| map.get("passthrough"))
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

fn render_listing(style: &Style, details: &Value) -> Option<String> {
    let scopes = details.get("scopes")?.as_array()?;
    let name_only = details
        .get("name_only")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let mut sections = Vec::new();
    for scope in scopes {
        let label = scope_label(scope.get("scope")?)?;
        let environments = scope.get("environments")?.as_array()?;
        let mut lines = vec![style.scope_header(&label)];
        if environments.is_empty() {
            lines.push("  (none)".to_string());
        } else if name_only {
            for env in environments {
                lines.push(format!("  {}", env.as_str()?));
            }
        } else {
            let mut rows = Vec::new();
            for env in environments {
                rows.push(EnvironmentRow::from_json(env)?);
            }
            lines.push(format_environment_table(style, &rows));
        }
        sections.push(lines.join("\n"));
    }
    Some(sections.join("\n\n"))
}

fn scope_label(scope: &Value) -> Option<String> {
    match scope.get("kind")?.as_str()? {
        "group" => Some(format!("group {}", scope.get("name")?.as_str()?)),
        other => Some(other.to_string()),
    }
}

struct EnvironmentRow {
    name: String,
    python: String,
    toolchain: String,
    created: String,
    description: String,
}

impl EnvironmentRow {
    fn from_json(env: &Value) -> Option<Self> {
        let obj = env.as_object()?;
        let toolchain = obj
            .get("toolchain_modules")?
            .as_array()?
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(" ");
        Some(Self {
            name: obj.get("name")?.as_str()?.to_string(),
            python: obj.get("python_version")?.as_str()?.to_string(),
            toolchain,
            created: obj
                .get("created_at")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string(),
            description: obj
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string(),
        })
    }

    fn cells(&self) -> [&str; 5] {
        [
            &self.name,
            &self.python,
            &self.toolchain,
            &self.created,
            &self.description,
        ]
    }
}

fn format_environment_table(style: &Style, rows: &[EnvironmentRow]) -> String {
    let headers = ["Name", "Python", "Toolchain", "Created", "Description"];
    let mut widths = headers.map(str::len);
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row.cells()) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let render = |cells: [&str; 5]| {
        let line = cells
            .iter()
            .zip(widths)
            .map(|(cell, width)| format!("{cell:<width$}"))
            .collect::<Vec<_>>()
            .join("  ");
        format!("  {}", line.trim_end())
    };

    let mut lines = Vec::new();
    lines.push(style.table_header(&render(headers)));
    let rule = widths.map(|width| "-".repeat(width));
    lines.push(render(rule.each_ref().map(String::as_str)));
    for row in rows {
        lines.push(render(row.cells()));
    }
    lines.join("\n")
}
