//! Crew definitions: agents and tasks as plain data.
//!
//! A crew file (TOML) declares named agents and an ordered list of tasks.
//! Text fields may contain `{name}` placeholders that are filled from the run
//! inputs before anything is sent to the model. Two crews ship with the
//! binary; others can be loaded from disk.

mod runner;

pub use runner::{CrewOutput, TaskOutput, kickoff};

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Datelike, TimeZone};
use serde::Deserialize;

use crate::tools;

const AI_RESEARCHER: &str = include_str!("../../crews/ai_researcher.toml");
const DEEP_RESEARCHER: &str = include_str!("../../crews/deep_researcher.toml");

/// Crews compiled into the binary, by name.
pub const BUILTIN: &[(&str, &str)] = &[
    ("ai-researcher", AI_RESEARCHER),
    ("deep-researcher", DEEP_RESEARCHER),
];

fn default_max_iterations() -> u32 {
    15
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Process {
    #[default]
    Sequential,
    Hierarchical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputSchema {
    ResearchOutput,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    pub role: String,
    pub goal: String,
    pub backstory: String,
    #[serde(default)]
    pub tools: Vec<String>,
    /// Tool-call rounds before the agent must answer.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskConfig {
    pub name: String,
    pub agent: String,
    pub description: String,
    pub expected_output: String,
    #[serde(default)]
    pub output_file: Option<PathBuf>,
    #[serde(default)]
    pub output_schema: Option<OutputSchema>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CrewConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub process: Process,
    pub agents: BTreeMap<String, AgentConfig>,
    pub tasks: Vec<TaskConfig>,
}

impl CrewConfig {
    pub fn from_toml(text: &str) -> Result<Self> {
        let crew: CrewConfig = toml::from_str(text).context("Invalid crew definition")?;
        crew.validate()?;
        Ok(crew)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("In {}", path.display()))
    }

    pub fn builtin(name: &str) -> Result<Self> {
        match BUILTIN.iter().find(|(n, _)| *n == name) {
            Some((_, text)) => Self::from_toml(text),
            None => {
                let known: Vec<&str> = BUILTIN.iter().map(|(n, _)| *n).collect();
                bail!("Unknown crew '{name}'. Built-in crews: {}", known.join(", "))
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.process != Process::Sequential {
            bail!("Crew '{}': only the sequential process is supported", self.name);
        }
        if self.tasks.is_empty() {
            bail!("Crew '{}' has no tasks", self.name);
        }
        for (name, agent) in &self.agents {
            for tool in &agent.tools {
                if !tools::ALL.contains(&tool.as_str()) {
                    bail!("Agent '{name}' uses unknown tool '{tool}'");
                }
            }
        }
        for task in &self.tasks {
            if !self.agents.contains_key(&task.agent) {
                bail!("Task '{}' names unknown agent '{}'", task.name, task.agent);
            }
        }
        Ok(())
    }

    /// Fill every placeholder from `inputs`. Fails on the first placeholder
    /// with no matching input.
    pub fn prepare(&self, inputs: &HashMap<String, String>) -> Result<PreparedCrew> {
        let mut tasks = Vec::with_capacity(self.tasks.len());
        for task in &self.tasks {
            let agent = &self.agents[&task.agent];
            let ctx = || format!("task '{}'", task.name);
            tasks.push(PreparedTask {
                name: task.name.clone(),
                agent_name: task.agent.clone(),
                system_prompt: system_prompt(
                    &interpolate(&agent.role, inputs).with_context(ctx)?,
                    &interpolate(&agent.goal, inputs).with_context(ctx)?,
                    &interpolate(&agent.backstory, inputs).with_context(ctx)?,
                ),
                description: interpolate(&task.description, inputs).with_context(ctx)?,
                expected_output: interpolate(&task.expected_output, inputs).with_context(ctx)?,
                tools: agent.tools.clone(),
                max_iterations: agent.max_iterations,
                output_file: task.output_file.clone(),
                output_schema: task.output_schema,
            });
        }
        Ok(PreparedCrew {
            name: self.name.clone(),
            tasks,
        })
    }
}

fn system_prompt(role: &str, goal: &str, backstory: &str) -> String {
    format!(
        "You are {role}.\n{backstory}\n\nYour personal goal is: {goal}\n\n\
         Use the tools available to you when they help. When you have everything \
         you need, reply with your final answer only."
    )
}

/// A crew with all placeholders filled, ready to run.
#[derive(Debug, Clone)]
pub struct PreparedCrew {
    pub name: String,
    pub tasks: Vec<PreparedTask>,
}

#[derive(Debug, Clone)]
pub struct PreparedTask {
    pub name: String,
    pub agent_name: String,
    pub system_prompt: String,
    pub description: String,
    pub expected_output: String,
    pub tools: Vec<String>,
    pub max_iterations: u32,
    pub output_file: Option<PathBuf>,
    pub output_schema: Option<OutputSchema>,
}

/// Replace `{name}` placeholders. Braces around anything other than a plain
/// identifier (JSON examples, for instance) are left alone.
pub fn interpolate(template: &str, inputs: &HashMap<String, String>) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let ident_len = after
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(after.len());
        if ident_len > 0 && after[ident_len..].starts_with('}') {
            let key = &after[..ident_len];
            match inputs.get(key) {
                Some(value) => out.push_str(value),
                None => bail!("Missing input '{key}'"),
            }
            rest = &after[ident_len + 1..];
        } else {
            out.push('{');
            rest = after;
        }
    }
    out.push_str(rest);
    Ok(out)
}

/// Standard run inputs: the topic (when given) plus date fields.
pub fn run_inputs<Tz: TimeZone>(topic: Option<&str>, now: &DateTime<Tz>) -> HashMap<String, String>
where
    Tz::Offset: std::fmt::Display,
{
    let mut inputs = HashMap::new();
    if let Some(topic) = topic {
        inputs.insert("topic".to_string(), topic.to_string());
    }
    inputs.insert("current_date".to_string(), now.format("%B %d, %Y").to_string());
    inputs.insert("current_year".to_string(), now.year().to_string());
    inputs.insert("current_month".to_string(), now.month().to_string());
    inputs
}
