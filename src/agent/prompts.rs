//! Reasoning prompt templates
//!
//! One template per domain, all teaching the same Thought/Tool/ToolInput/
//! Answer surface the parser understands.

use crate::tasks::{Domain, Task};

const MATH_PROMPT: &str = "You are a solver with tools. Follow this format exactly:
Thought: brief reasoning
Tool: <tool name>
ToolInput: <input>
... (repeat as needed)
Answer: <final numeric answer only>
Tools available: math (evaluate an expression or solve a linear equation), python (execute code).
Equation: {prompt}
Respond in the exact format above.";

const LOGIC_PROMPT: &str = "You are a reasoning agent with tools. Solve the following logic problem.
Use the format:
Thought: <analysis>
Tool: <tool name>
ToolInput: <input>
... repeat ...
Answer: <concise answer>
Problem: {prompt}
Constraints: be concise; use tools only when computation is needed.";

const CODE_PROMPT: &str = "You are a code reasoning agent with tools. Solve the task using tools where helpful.
Format:
Thought: <analysis>
Tool: <tool name>
ToolInput: <input>
... repeat ...
Answer: <final answer or code>
Task: {prompt}
Constraints: prefer the python tool to check your code before answering.";

/// Render the reasoning prompt for a task, optionally appending a
/// chain-of-thought nudge for self-verification passes.
pub fn reasoning_prompt(task: &Task, chain_of_thought: bool) -> String {
    let template = match task.domain {
        Domain::Math => MATH_PROMPT,
        Domain::Logic => LOGIC_PROMPT,
        Domain::Code => CODE_PROMPT,
    };
    let mut prompt = template.replace("{prompt}", &task.prompt);
    if chain_of_thought && !task.prompt.to_lowercase().contains("step by step") {
        prompt.push_str("\nThink step by step before the final Answer line.");
    }
    prompt
}

/// Self-critique prompt used by the uncertainty estimator.
pub fn critique_prompt(task_text: &str, answer: &str) -> String {
    format!(
        "You are an evaluator. Given a problem and a proposed answer, estimate the probability \
         the answer is correct. Respond with a number between 0 and 1.\n\
         Problem: {task_text}\n\
         Proposed answer: {answer}\n\
         Probability:"
    )
}
