// Phase Prompt Contracts
// Instruction sets handed to the external coding agent for each phase.

/// Prompt builder for the two fixed phases.
pub struct PhasePrompts;

impl PhasePrompts {
    /// Deterministic Discovery instructions: enumerate repositories, select
    /// the one matching the request, clone it into `clone_dir`, then stop.
    pub fn discovery_prompt(request: &str, clone_dir: &str) -> String {
        format!(
            r#"You are preparing a workspace for an automated coding task. Do ONLY repository discovery.

## User Request
{request}

## Steps
1. List the repositories available to this account with `gh repo list --limit 100`.
2. Select the single repository that the user request refers to. Prefer an exact name match; otherwise pick the closest match by name and description.
3. Clone it with `gh repo clone <owner>/<repo> {clone_dir}` so the working tree ends up in the `{clone_dir}` directory of the current working directory.
4. Print the selected repository's full name, then exit.

## Rules
- Read-only besides the clone: do NOT create branches, commits, pull requests, or edit any file.
- Do NOT start working on the user request itself. Another session will do that.
- If no repository plausibly matches, say so and exit with a non-zero status."#,
            request = request,
            clone_dir = clone_dir,
        )
    }

    /// Fixed operating-mode instructions for the Execution phase. The user
    /// prompt itself is passed through unmodified as the task instruction.
    pub fn execution_system_prompt() -> String {
        r#"You are completing a coding task inside an already-cloned repository (the current working directory).

## Operating Mode
1. Before changing any code, create a branch with a unique name (include a timestamp or random suffix) and push an empty initial commit to it.
2. Immediately open a DRAFT pull request from that branch so progress is visible from the first minute.
3. Make every subsequent change as its own commit, pushed right away. Never batch multiple logical changes into one commit.
4. Keep commit messages short and factual.

## If You Get Stuck
Commit whatever exists, push it, add a comment on the pull request describing the blockers, and exit cleanly with status 0. Do not hang waiting for input; no one is watching the terminal."#
            .to_string()
    }
}
