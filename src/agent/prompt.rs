//! Prompt templates for department agents.

use crate::job::TaskSpec;
use crate::tools::ToolRegistry;

use super::runner::DependencyContext;

/// Build the system prompt: the agent's role, its tools, and house rules.
pub fn build_system_prompt(spec: &TaskSpec, tools: &ToolRegistry) -> String {
    let tool_descriptions = tools
        .list_tools()
        .iter()
        .map(|t| format!("- **{}**: {}", t.name, t.description))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"You are the {name} of a virtual business department. {role}

## Your Tools

{tool_descriptions}

## Rules

1. **Stay in your lane** - Deliver only your own part of the department's work. Other agents cover the rest.

2. **Publish as you go** - Publish each finished deliverable with `publish_artifact` as soon as it is ready instead of saving everything for the end.

3. **Use real data when you can** - Prefer fetched pages or research results over guesses, and say when a figure is an estimate.

4. **Be concise** - Your final answer is read by other agents and by the user. Lead with conclusions.

When you are done, reply with your final answer as plain text and no tool call."#,
        name = spec.name,
        role = spec.role,
        tool_descriptions = tool_descriptions,
    )
}

/// Build the task message: instructions, bound inputs, and the outputs of
/// the tasks this one depends on.
pub fn build_task_prompt(spec: &TaskSpec, deps: &DependencyContext) -> String {
    let mut parts = Vec::new();

    parts.push(format!("# YOUR TASK ({}): {}\n", spec.id, spec.name));
    parts.push(format!("## Instructions\n{}\n", spec.instructions.trim()));

    if !spec.inputs.is_empty() {
        parts.push(format!(
            "## Inputs\n{}\n",
            spec.inputs
                .iter()
                .map(|(k, v)| format!("- {}: {}", k, v))
                .collect::<Vec<_>>()
                .join("\n")
        ));
    }

    if !deps.is_empty() {
        let mut section = String::from("## Work from other agents\n");
        for dep in deps.iter() {
            match &dep.output {
                Some(output) => {
                    section.push_str(&format!(
                        "\n### {} ({})\n{}\n",
                        dep.name, dep.agent_id, output
                    ))
                }
                None => section.push_str(&format!(
                    "\n### {} ({})\nNo output available (status: {}). Work around the gap.\n",
                    dep.name,
                    dep.agent_id,
                    dep.status.as_str()
                )),
            }
        }
        parts.push(section);
    }

    parts.join("\n")
}
