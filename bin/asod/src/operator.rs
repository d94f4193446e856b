//! ---
//! aso_section: "05-daemon"
//! aso_subsection: "module"
//! aso_type: "source"
//! aso_scope: "code"
//! aso_description: "Line-oriented operator console commands."
//! aso_version: "v0.0.0-prealpha"
//! aso_owner: "tbd"
//! ---
use std::fmt::Write as _;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use aso_logging::{log_operator_event, LogContext, OperatorOutcome};
use aso_telemetry::{Observatory, OperatorRole, Sample, TelemetryView};
use tracing::warn;

pub const HELP: &str = "commands: estop | reset | status <NAME> | window | latest | help | quit";

/// One line typed at the operator console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorCommand {
    EStop,
    Reset,
    SetStatus(String),
    Window,
    Latest,
    Help,
    Quit,
}

impl FromStr for OperatorCommand {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> Result<Self> {
        let mut words = line.split_whitespace();
        let verb = words
            .next()
            .ok_or_else(|| anyhow!("empty command"))?
            .to_ascii_lowercase();
        let command = match verb.as_str() {
            "estop" | "halt" => OperatorCommand::EStop,
            "reset" => OperatorCommand::Reset,
            "status" => {
                let name = words
                    .next()
                    .ok_or_else(|| anyhow!("usage: status <NAME>"))?;
                OperatorCommand::SetStatus(name.to_owned())
            }
            "window" => OperatorCommand::Window,
            "latest" => OperatorCommand::Latest,
            "help" | "?" => OperatorCommand::Help,
            "quit" | "exit" => OperatorCommand::Quit,
            other => return Err(anyhow!("unknown command '{}'; {}", other, HELP)),
        };
        if words.next().is_some() {
            return Err(anyhow!("unexpected trailing input; {}", HELP));
        }
        Ok(command)
    }
}

/// Result of running a console command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Text(String),
    Quit,
}

/// Console bound to the process observatory and its console view.
pub struct OperatorConsole<'a> {
    observatory: &'a Observatory,
    view: &'a TelemetryView,
    role: OperatorRole,
}

impl<'a> OperatorConsole<'a> {
    pub fn new(observatory: &'a Observatory, view: &'a TelemetryView, role: OperatorRole) -> Self {
        Self {
            observatory,
            view,
            role,
        }
    }

    /// Parse and run one input line. Rejected input is reported, never fatal.
    pub fn handle_line(&self, line: &str) -> Reply {
        let command = match line.parse::<OperatorCommand>() {
            Ok(command) => command,
            Err(err) => {
                log_operator_event(None, line.trim(), OperatorOutcome::Rejected);
                return Reply::Text(err.to_string());
            }
        };
        match self.execute(&command) {
            Ok(reply) => reply,
            Err(err) => {
                log_operator_event(None, line.trim(), OperatorOutcome::Rejected);
                Reply::Text(format!("error: {}", err))
            }
        }
    }

    pub fn execute(&self, command: &OperatorCommand) -> Result<Reply> {
        let applied = match command {
            OperatorCommand::EStop => ("estop", self.view.trigger_estop()?),
            OperatorCommand::Reset => ("reset", self.view.trigger_reset()?),
            OperatorCommand::SetStatus(name) => ("status", self.observatory.set_status_named(name)?),
            OperatorCommand::Window => return Ok(Reply::Text(render_window(&self.view.window()))),
            OperatorCommand::Latest => {
                let text = match self.view.latest() {
                    Some(sample) => render_sample(&sample),
                    None => "no samples yet".to_owned(),
                };
                return Ok(Reply::Text(text));
            }
            OperatorCommand::Help => return Ok(Reply::Text(HELP.to_owned())),
            OperatorCommand::Quit => return Ok(Reply::Quit),
        };
        let (verb, sample) = applied;
        if !self.role.may_override() {
            warn!(role = %self.role, command = verb, "override issued from a read-only role");
        }
        let ctx = LogContext::new()
            .with_status(sample.status().as_str())
            .with_origin(sample.origin().as_str());
        log_operator_event(Some(&ctx), verb, OperatorOutcome::Applied);
        Ok(Reply::Text(render_sample(&sample)))
    }
}

pub fn render_sample(sample: &Sample) -> String {
    let [x, y] = sample.latent_coordinates();
    format!(
        "{} {:<9} conf={:.3} entropy={:.3} latent=({:.1}, {:.1}) {}",
        sample.timestamp().format("%H:%M:%S%.3f"),
        sample.status().as_str(),
        sample.confidence(),
        sample.entropy(),
        x,
        y,
        sample.description()
    )
}

fn render_window(window: &[std::sync::Arc<Sample>]) -> String {
    let mut out = format!("{} samples", window.len());
    for sample in window {
        let _ = write!(out, "\n  {}", render_sample(sample));
    }
    out
}
