use anyhow::Result;

use super::context::CliContext;

pub async fn cmd_info(ctx: &CliContext) -> Result<()> {
    let config = ctx.config();

    println!("WebAgent System Information");
    println!("===========================");
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
    println!("Build Date: {}", env!("BUILD_DATE"));
    println!("Git Commit: {} ({})", env!("GIT_HASH"), env!("GIT_BRANCH"));
    println!();

    println!("Configuration:");
    println!(
        "- Config File: {}{}",
        ctx.config_path().display(),
        if ctx.config_loaded() {
            ""
        } else {
            " (not found, using defaults)"
        }
    );
    println!("- Listen Address: {}:{}", config.server.host, config.server.port);
    println!();

    println!("Model Backend:");
    println!("- Provider: {}", config.llm.provider);
    println!("- Model: {}", config.llm.model);
    println!("- API Base: {}", config.api_base());
    println!(
        "- API Key: {}",
        match config.api_keys() {
            Ok(keys) => format!("configured ({} key(s))", keys.len()),
            Err(_) => "missing".to_string(),
        }
    );
    println!();

    let agent = &config.agent;
    println!("Agent Limits:");
    println!("- Max Steps: {}", agent.max_steps);
    println!("- Max Elements: {}", agent.max_elements);
    println!("- Max DOM Depth: {}", agent.max_dom_depth);
    println!("- Prompt Budget: {} chars", agent.prompt_budget_chars);
    println!("- Decision Retries: {}", agent.max_decision_retries);
    println!(
        "- Timeouts: model {}ms, step {}ms",
        agent.llm_timeout_ms, agent.step_timeout_ms
    );
    println!("- Session Grace: {}s", agent.session_grace_secs);
    if !config.project_hints.is_empty() {
        println!(
            "- Project Hints: {}",
            config
                .project_hints
                .keys()
                .cloned()
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    if let Err(err) = config.validate() {
        println!();
        println!("Warning: {err}");
    }

    Ok(())
}
