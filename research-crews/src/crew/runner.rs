//! Sequential crew execution.
//!
//! Tasks run in declaration order. Each task is one conversation with its
//! agent: the agent may call its tools for up to `max_iterations` rounds and
//! then gives a final answer, which becomes context for every later task.

use std::path::Path;

use anyhow::{Context, Result, bail};

use super::{OutputSchema, PreparedCrew, PreparedTask};
use crate::llm::{
    ContentBlock, LlmClient, Message, MessageContent, ToolChoice, ToolDef, ToolResultBlock,
};
use crate::schema::{self, ResearchOutput};
use crate::tools::{self, Toolbox};

const FINAL_ANSWER_NUDGE: &str =
    "You have used all your tool calls. Give your final answer now, without calling tools.";

/// Output of one finished task.
#[derive(Debug, Clone)]
pub struct TaskOutput {
    pub name: String,
    pub agent: String,
    pub raw: String,
    /// Parsed and validated structured output, for tasks that declare one.
    pub research: Option<ResearchOutput>,
}

#[derive(Debug, Clone)]
pub struct CrewOutput {
    pub tasks: Vec<TaskOutput>,
}

impl CrewOutput {
    /// The last task's answer.
    pub fn final_output(&self) -> &str {
        self.tasks.last().map(|t| t.raw.as_str()).unwrap_or("")
    }
}

/// Run every task of `crew` in order.
///
/// `output_file` paths are resolved against `output_dir`.
pub async fn kickoff(
    crew: &PreparedCrew,
    llm: &LlmClient,
    toolbox: &Toolbox,
    output_dir: &Path,
) -> Result<CrewOutput> {
    tracing::info!(crew = %crew.name, tasks = crew.tasks.len(), "Crew kickoff");
    let mut outputs: Vec<TaskOutput> = Vec::with_capacity(crew.tasks.len());

    for task in &crew.tasks {
        tracing::info!(task = %task.name, agent = %task.agent_name, "Task started");
        let prompt = task_prompt(task, &outputs);
        let (raw, research) = run_task(task, prompt, llm, toolbox)
            .await
            .with_context(|| format!("Task '{}' failed", task.name))?;

        if let Some(rel) = &task.output_file {
            let path = output_dir.join(rel);
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&path, &raw)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            tracing::info!(task = %task.name, path = %path.display(), "Task output written");
        }

        tracing::info!(task = %task.name, chars = raw.chars().count(), "Task complete");
        outputs.push(TaskOutput {
            name: task.name.clone(),
            agent: task.agent_name.clone(),
            raw,
            research,
        });
    }

    Ok(CrewOutput { tasks: outputs })
}

fn task_prompt(task: &PreparedTask, previous: &[TaskOutput]) -> String {
    let mut prompt = format!(
        "{}\n\nThis is the expected criteria for your final answer: {}",
        task.description, task.expected_output
    );
    if task.output_schema == Some(OutputSchema::ResearchOutput) {
        prompt.push_str("\n\n");
        prompt.push_str(ResearchOutput::prompt_hint());
    }
    if !previous.is_empty() {
        prompt.push_str("\n\n# Context from previous tasks");
        for out in previous {
            prompt.push_str(&format!("\n\n## {} ({})\n{}", out.name, out.agent, out.raw));
        }
    }
    prompt
}

async fn run_task(
    task: &PreparedTask,
    prompt: String,
    llm: &LlmClient,
    toolbox: &Toolbox,
) -> Result<(String, Option<ResearchOutput>)> {
    let defs = tools::definitions(&task.tools);
    let mut messages = vec![Message::user(prompt)];
    let rounds = task.max_iterations.max(1);
    let mut answer = None;

    for round in 0..rounds {
        let resp = llm.chat(&task.system_prompt, &messages, &defs).await?;
        let tool_uses: Vec<_> = resp.tool_uses().into_iter().cloned().collect();
        if tool_uses.is_empty() {
            answer = Some(resp.text());
            break;
        }

        messages.push(Message::assistant(resp.content));

        let mut results = Vec::with_capacity(tool_uses.len());
        for tu in &tool_uses {
            if !task.tools.contains(&tu.name) {
                tracing::warn!(task = %task.name, tool = %tu.name, "Agent called a tool it does not have");
                results.push(ToolResultBlock::error(
                    &tu.id,
                    tools::error_payload(format!("Tool not available: {}", tu.name)),
                ));
                continue;
            }
            // Missing configuration aborts the whole run.
            let out = toolbox.execute(&tu.name, &tu.input).await?;
            results.push(ToolResultBlock::ok(&tu.id, out));
        }

        let mut reply = Message::tool_results(results);
        if round + 1 == rounds
            && let MessageContent::Blocks(blocks) = &mut reply.content
        {
            blocks.push(ContentBlock::Text {
                text: FINAL_ANSWER_NUDGE.to_string(),
            });
        }
        messages.push(reply);
    }

    let raw = match answer {
        Some(text) => text,
        None => forced_answer(task, &messages, &defs, llm).await?,
    };

    match task.output_schema {
        None => Ok((raw, None)),
        Some(OutputSchema::ResearchOutput) => match schema::parse_output(&raw) {
            Ok(parsed) => Ok((raw, Some(parsed))),
            Err(e) => {
                // One repair round with the validation error.
                tracing::warn!(task = %task.name, error = %e, "Structured output rejected, asking again");
                messages.push(Message::assistant(vec![ContentBlock::Text { text: raw }]));
                messages.push(Message::user(format!(
                    "Your answer was not valid: {e}. Reply with ONLY the corrected JSON object."
                )));
                let retry = forced_answer(task, &messages, &defs, llm).await?;
                let parsed = schema::parse_output(&retry)?;
                Ok((retry, Some(parsed)))
            }
        },
    }
}

/// Ask for an answer with tool calls disabled. A reply that still carries
/// tool calls or has no text fails the task.
async fn forced_answer(
    task: &PreparedTask,
    messages: &[Message],
    defs: &[ToolDef],
    llm: &LlmClient,
) -> Result<String> {
    let resp = llm
        .chat_with_choice(&task.system_prompt, messages, defs, Some(ToolChoice::None))
        .await?;
    if !resp.tool_uses().is_empty() {
        bail!("Agent '{}' kept calling tools after its budget ran out", task.agent_name);
    }
    let text = resp.text();
    if text.trim().is_empty() {
        bail!("Agent '{}' gave an empty final answer", task.agent_name);
    }
    Ok(text)
}
