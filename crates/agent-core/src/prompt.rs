//! Prompt assembly for a single step.
//!
//! Contains the system prompt and the assembler that fits task, page and
//! history into a bounded budget.

use perceiver_structural::{render_tree, ReducedPage};
use serde::Serialize;
use tracing::{debug, warn};
use webagent_core_types::StepIndex;

use crate::model::{HistoryEntry, Task};

/// System prompt for step-wise action generation.
pub const STEP_SYSTEM_PROMPT: &str = r#"You are a web automation agent. You are given a task, the current page of a website and the actions taken so far. Decide the single next browser action.

## Page Format
Every usable element of the page is listed with an address in brackets:
```
[0-1f2e3d]<h1 role="heading">Sign in</h1>
[1-9a8b7c]<input name="username" placeholder="Username" role="textbox"></input>
[2-4d5e6f]<button type="submit">Log in</button>
```
- Indentation shows nesting.
- Addresses are only valid for the page they were shown with. Copy them exactly.

## Available Actions
- click: `{"action": "click", "address": "2-4d5e6f"}`
- type: `{"action": "type", "address": "1-9a8b7c", "text": "alice"}`
- select: `{"action": "select", "address": "5-0a1b2c", "value": "Large"}`
- scroll: `{"action": "scroll", "direction": "down"}` (up, down, left, right)
- navigate: `{"action": "navigate", "url": "https://example.com/cart"}`
- wait: `{"action": "wait", "seconds": 1}`
- done: `{"action": "done", "summary": "what was achieved", "success": true}`
- fail: `{"action": "fail", "reason": "why the task cannot be completed"}`

## Rules
- Fill form fields before submitting them.
- Only use addresses from the current page.
- Call done only when the task is complete and verified on the page.
- Call fail when the task is impossible on this website.

## Response Format
Respond with exactly one JSON object describing one action. You may add a "thinking" field with one or two sentences of reasoning. Do not wrap the object in prose."#;

/// A complete model input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

impl Prompt {
    /// Size in characters, the unit of the prompt budget.
    pub fn len(&self) -> usize {
        self.system.chars().count() + self.user.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.system.is_empty() && self.user.is_empty()
    }

    /// Copy of this prompt telling the model why its last answer was rejected.
    pub fn with_retry_note(&self, note: &str) -> Prompt {
        let mut user = self.user.clone();
        user.push_str("\n\n## Previous Answer Rejected\n");
        user.push_str(note.trim());
        user.push_str("\nRespond again with exactly one valid JSON action.\n");
        Prompt {
            system: self.system.clone(),
            user,
        }
    }
}

/// Per-step facts embedded in the prompt.
#[derive(Debug, Clone, Copy)]
pub struct PromptContext<'a> {
    pub task: &'a Task,
    pub url: &'a str,
    pub step_index: StepIndex,
    pub project_hint: Option<&'a str>,
}

/// Result of fitting a step into the prompt budget.
#[derive(Debug, Clone)]
pub struct AssembledPrompt {
    pub prompt: Prompt,
    /// Page actually serialized into the prompt; decisions must be validated
    /// against it.
    pub page: ReducedPage,
    pub history_used: usize,
    pub history_dropped: usize,
    pub elements_dropped: usize,
    /// Even the minimal prompt exceeds the budget.
    pub over_budget: bool,
}

/// Builds prompts within a character budget.
///
/// Degrade order: oldest history first, then fewer page elements, recapped
/// with the reducer's priority order. Elements are never cut in half.
#[derive(Debug, Clone)]
pub struct PromptAssembler {
    history_limit: usize,
}

impl Default for PromptAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptAssembler {
    pub fn new() -> Self {
        Self { history_limit: 10 }
    }

    /// Cap on history entries ever rendered.
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Assemble the prompt for one step.
    ///
    /// `history` is ordered oldest first.
    pub fn assemble(
        &self,
        context: PromptContext<'_>,
        reduced: ReducedPage,
        history: &[HistoryEntry],
        budget_chars: usize,
    ) -> AssembledPrompt {
        let initial_elements = reduced.len();
        let mut page = reduced;
        // Most recent first; dropping from the back drops the oldest entry.
        let mut kept: Vec<&HistoryEntry> = history.iter().rev().take(self.history_limit).collect();
        let mut history_dropped = history.len() - kept.len();

        loop {
            let prompt = self.render(context, &page, &kept);
            let size = prompt.len();
            if size <= budget_chars {
                return self.finish(prompt, page, kept.len(), history_dropped, initial_elements, false);
            }
            if kept.pop().is_some() {
                history_dropped += 1;
                continue;
            }
            if page.is_empty() {
                warn!(
                    target: "prompt",
                    size,
                    budget_chars,
                    "prompt exceeds budget with no history and no elements"
                );
                return self.finish(prompt, page, 0, history_dropped, initial_elements, true);
            }

            let current = page.len();
            let scaled = current.saturating_mul(budget_chars) / size.max(1);
            let target = scaled.min(current - 1);
            debug!(
                target: "prompt",
                size,
                budget_chars,
                from = current,
                to = target,
                "dropping page elements to fit prompt budget"
            );
            page = page.capped(target);
        }
    }

    fn finish(
        &self,
        prompt: Prompt,
        page: ReducedPage,
        history_used: usize,
        history_dropped: usize,
        initial_elements: usize,
        over_budget: bool,
    ) -> AssembledPrompt {
        let elements_dropped = initial_elements.saturating_sub(page.len());
        AssembledPrompt {
            prompt,
            page,
            history_used,
            history_dropped,
            elements_dropped,
            over_budget,
        }
    }

    fn render(
        &self,
        context: PromptContext<'_>,
        page: &ReducedPage,
        history: &[&HistoryEntry],
    ) -> Prompt {
        Prompt {
            system: STEP_SYSTEM_PROMPT.to_string(),
            user: format_user_message(context, page, history),
        }
    }
}

/// Formats the user message for one step.
pub fn format_user_message(
    context: PromptContext<'_>,
    page: &ReducedPage,
    history: &[&HistoryEntry],
) -> String {
    let mut message = String::new();

    message.push_str("## Task\n");
    message.push_str(context.task.prompt.trim());
    message.push_str("\n\n");

    message.push_str("## Step Info\n");
    message.push_str(&format!("Step: {}\n", context.step_index));
    message.push_str(&format!("URL: {}\n", context.url));
    if !context.task.web_project_id.is_empty() {
        message.push_str(&format!("Project: {}\n", context.task.web_project_id));
    }

    if let Some(hint) = context.project_hint.filter(|h| !h.trim().is_empty()) {
        message.push_str("\n## Project Notes\n");
        message.push_str(hint.trim());
        message.push('\n');
    }

    message.push_str("\n## Previous Actions (most recent first)\n");
    if history.is_empty() {
        message.push_str("No previous actions\n");
    } else {
        for entry in history {
            message.push_str(&entry.render());
            message.push('\n');
        }
    }

    message.push_str("\n## Current Page\n");
    if let Some(title) = &page.title {
        message.push_str(&format!("Title: {}\n", title));
    }
    if let Some(url) = page.url.as_deref().filter(|u| *u != context.url) {
        message.push_str(&format!("Declared URL: {}\n", url));
    }

    message.push_str(&format!(
        "\n## Page Elements ({} shown of {})\n",
        page.len(),
        page.diagnostics.candidates
    ));
    if page.is_empty() {
        message.push_str("(no usable elements on this page)\n");
    } else {
        message.push_str(&render_tree(page));
        message.push('\n');
    }

    message
}
