//! Prompts for the fix team.
//!
//! Role instructions for the planner / coder / tester agents, the task
//! prompts for both orchestration modes, and the shared tool-usage preamble.

use std::path::Path;

/// Instructions for the planner (team lead).
pub const PLANNER_INSTRUCTIONS: &str = "You are the team lead of a team of developers. You get problems that you have to fix. \
Read the broken files with the read_file tool and locate them with find_file. \
Break the problem down into concrete coding tasks. After making a plan, hand the coding tasks to the coder with the delegate tool. \
You can verify the work using the tester. If there are still errors, hand the task to the coder again. \
When all the work is done, use the git_add tool on the changed files.";

/// Instructions for the coder.
pub const CODER_INSTRUCTIONS: &str = "You are a senior software engineer. Write the actual code that fixes the problem to the code files. \
Make sure the fix is minimal and only touches what is necessary to resolve the failing tests. \
Always write complete file contents: write_file replaces the whole file.";

/// Instructions for the tester.
pub const TESTER_INSTRUCTIONS: &str = "You are a software quality engineer with an eye for detail. \
Ensure that the code does the job it is supposed to do and fixes the problem. \
Check for missing imports, undeclared variables, mismatched brackets and syntax errors. \
If possible run the affected tests with run_command and report the outcome.";

/// Shared explanation of the tool call protocol.
pub const TOOL_USAGE_PROMPT: &str = r#"## Tool Usage

To use a tool, respond with a single JSON object containing "tool" and "arguments" keys, for example:

{"tool": "read_file", "arguments": {"path": "src/module.py"}}

You will receive the tool output in the next message. Use one tool per response.
When you are finished, respond WITHOUT a tool call: that response is your final answer and should summarise what you did."#;

/// Build the system prompt for one agent.
pub fn build_system_prompt(instructions: &str, repo_dir: &Path, tools_json: &serde_json::Value) -> String {
    format!(
        "{instructions}\n\n## Environment\n\n- Repository root: {}\n- Relative paths resolve against the repository root\n\n{TOOL_USAGE_PROMPT}\n\n{}",
        repo_dir.display(),
        build_tool_prompt(tools_json)
    )
}

/// Build the tool definitions prompt for LLM function calling.
pub fn build_tool_prompt(tools_json: &serde_json::Value) -> String {
    let tools = tools_json
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|tool| {
                    let function = tool.get("function")?;
                    let name = function.get("name")?.as_str()?;
                    let description = function.get("description")?.as_str()?;
                    let params = function.get("parameters")?;

                    Some(format!(
                        "### {}\n\n{}\n\nParameters:\n```json\n{}\n```",
                        name,
                        description,
                        serde_json::to_string_pretty(params).unwrap_or_default()
                    ))
                })
                .collect::<Vec<_>>()
                .join("\n\n---\n\n")
        })
        .unwrap_or_default();

    format!("## Tool Definitions\n\n{}", tools)
}

/// Task given to the planner in handoff mode.
pub fn handoff_task(repo_dir: &Path, issue: &str) -> String {
    format!(
        "Work in the directory: {}. This is a git repository. You can use read_file to read it and delegate changes to the coder. \
Your goal is to fix the problem described below. The fix will be verified by running the affected tests.\n\nProblem description:\n{issue}",
        repo_dir.display()
    )
}

/// First crew step: break the problem into work items.
pub fn plan_task(repo_dir: &Path, issue: &str) -> String {
    format!(
        "*Task* Break down the following problem into concrete, feasible subtasks for developers.\n\
*Description* You are working in a git project in the directory `{dir}`. Analyze the problem and break it down into individual work steps.\n\n\
**Parameters**\n- issue: {issue}\n- directory: {dir}\n\n\
Expected output: a clear list of work steps or files/code areas to be changed.",
        dir = repo_dir.display()
    )
}

/// Second crew step: implement the plan.
pub fn implement_task(repo_dir: &Path, issue: &str) -> String {
    format!(
        "*Task* Implement the fix in the code based on the plan.\n\
*Description* Work in the git directory `{dir}`. The problem is described as follows:\n`{issue}`\n\n\
Change the code so that the error is fixed. Write the changes directly to the files so they show up in `git diff`.\n\n\
**Notes**\n- The fix should be minimally invasive.\n- No unnecessary formatting or restructuring.\n- All changes must be syntactically correct and testable.\n\n\
Expected output: code changes in the relevant files that solve the problem.",
        dir = repo_dir.display()
    )
}

/// Third crew step: review and test the fix.
pub fn review_task(repo_dir: &Path, issue: &str) -> String {
    format!(
        "*Task* Check and test the fix.\n\
*Description* Check the implemented fix in the project directory `{dir}`. Make sure that the fix is correct, \
no new bugs have been introduced and all affected tests pass.\n\n\
You can understand the bug as follows:\n`{issue}`\n\n\
If possible, run automated tests (`pytest` or other relevant frameworks) and provide feedback.\n\n\
Expected output: an assessment of the fix and any remaining problems.",
        dir = repo_dir.display()
    )
}

/// Last crew step: the planner stages whatever changed.
pub fn stage_task(repo_dir: &Path) -> String {
    format!(
        "*Task* Stage the changes.\n\
*Description* The fix in `{}` has been implemented and reviewed. Use git_add to add every changed file to the git staging area \
(use '.' to stage all changes). Then report which files were staged.",
        repo_dir.display()
    )
}

/// Prefix the outputs of earlier crew steps to a task prompt.
pub fn with_context(task: &str, previous: &[String]) -> String {
    if previous.is_empty() {
        return task.to_string();
    }
    let context = previous
        .iter()
        .enumerate()
        .map(|(i, out)| format!("### Step {} output\n\n{}", i + 1, out))
        .collect::<Vec<_>>()
        .join("\n\n");
    format!("{task}\n\n## Context from previous steps\n\n{context}")
}

/// Summary of a run cut short by the turn budget or the step cap.
pub const TURN_LIMIT_MESSAGE: &str =
    "Turn or step limit reached before the agent produced a final answer.";

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_system_prompt_contains_repo_and_tools() {
        let tools = serde_json::json!([{
            "type": "function",
            "function": {
                "name": "read_file",
                "description": "Read a file",
                "parameters": {"type": "object"}
            }
        }]);
        let prompt = build_system_prompt(CODER_INSTRUCTIONS, &PathBuf::from("/repos/repo_7"), &tools);
        assert!(prompt.starts_with(CODER_INSTRUCTIONS));
        assert!(prompt.contains("/repos/repo_7"));
        assert!(prompt.contains("### read_file"));
        assert!(prompt.contains(r#""tool""#));
    }

    #[test]
    fn test_task_prompts_embed_issue() {
        let dir = PathBuf::from("repo_3");
        for prompt in [
            handoff_task(&dir, "crash on empty input"),
            plan_task(&dir, "crash on empty input"),
            implement_task(&dir, "crash on empty input"),
            review_task(&dir, "crash on empty input"),
        ] {
            assert!(prompt.contains("crash on empty input"));
            assert!(prompt.contains("repo_3"));
        }
    }

    #[test]
    fn test_with_context() {
        assert_eq!(with_context("do it", &[]), "do it");
        let out = with_context("do it", &["plan A".to_string()]);
        assert!(out.starts_with("do it"));
        assert!(out.contains("### Step 1 output\n\nplan A"));
    }
}
