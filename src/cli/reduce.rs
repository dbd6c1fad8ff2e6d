use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use perceiver_structural::{render_tree, ReducedPage};
use tokio::io::AsyncReadExt;
use tracing::{info, warn};
use webagent_kernel::Config;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ReduceFormat {
    Json,
    Text,
}

#[derive(Args, Clone)]
pub struct ReduceArgs {
    /// HTML snapshot to reduce, or `-` for stdin
    pub input: PathBuf,

    /// Element cap (defaults to agent.max_elements)
    #[arg(long)]
    pub max_elements: Option<usize>,

    /// Output format
    #[arg(long, value_enum, default_value = "json")]
    pub format: ReduceFormat,

    /// Page URL reported when the snapshot does not declare one
    #[arg(long)]
    pub url: Option<String>,
}

pub async fn cmd_reduce(args: ReduceArgs, config: &Config) -> Result<()> {
    let html = read_input(&args.input).await?;
    let max_elements = args
        .max_elements
        .unwrap_or(config.agent.max_elements as usize);

    let mut page = config.agent.reducer().reduce(&html, max_elements);
    if let Some(url) = args.url.clone() {
        page = page.with_url(url);
    }
    info!(
        elements = page.len(),
        dropped = page.diagnostics.dropped,
        degenerate = page.is_degenerate(),
        "Reduced snapshot"
    );
    if page.is_degenerate() {
        warn!("page has no usable elements");
    }

    match args.format {
        ReduceFormat::Json => {
            let rendered =
                serde_json::to_string_pretty(&page).context("failed to serialize reduced page")?;
            println!("{rendered}");
        }
        ReduceFormat::Text => print!("{}", render_text(&page)),
    }
    Ok(())
}

async fn read_input(input: &Path) -> Result<String> {
    if input.as_os_str() == "-" {
        let mut buffer = String::new();
        tokio::io::stdin()
            .read_to_string(&mut buffer)
            .await
            .context("failed to read HTML from stdin")?;
        return Ok(buffer);
    }
    tokio::fs::read_to_string(input)
        .await
        .with_context(|| format!("failed to read {}", input.display()))
}

fn render_text(page: &ReducedPage) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Title: {}\n",
        page.title.as_deref().unwrap_or("(untitled)")
    ));
    if let Some(url) = page.url.as_deref() {
        out.push_str(&format!("URL: {url}\n"));
    }
    out.push_str(&format!(
        "Elements: {} ({} interactive, {} dropped)\n\n",
        page.len(),
        page.interactive_count(),
        page.diagnostics.dropped
    ));
    out.push_str(&render_tree(page));
    if !out.ends_with('\n') {
        out.push('\n');
    }
    out
}
