use chrono::{DateTime, Utc};
use colored::*;
use comfy_table::{Attribute, Cell, CellAlignment, ContentArrangement, Table};

use super::chat::PromptOutcome;
use crate::config::ModelConfig;
use crate::inference::ModelState;

const PROMPT_PREVIEW_CHARS: usize = 40;

pub fn print_help() {
    println!("\n{}", "Chat Commands".cyan());
    println!("{}", "=".repeat(60).bright_cyan());
    println!("{}  - Exit the chat", "exit, bye, quit".green());
    println!("{}             - Show this help message", "help".green());
    println!("{}           - Show whether the model is loaded", "status".green());
    println!("{}           - Release the model from memory", "unload".green());
    println!("Anything else is sent to the model as a prompt.");
    println!();
}

pub fn print_status(state: ModelState, loaded_at: Option<DateTime<Utc>>) {
    match loaded_at {
        Some(at) => println!(
            "Model {} since {}",
            state.to_string().green(),
            at.format("%Y-%m-%d %H:%M:%S")
        ),
        None => println!("Model {}", state.to_string().yellow()),
    }
}

/// Prints one prompt and its response (or error) as the test run goes.
pub fn print_outcome(outcome: &PromptOutcome) {
    println!("\n{} {}", "Prompt:".bold(), outcome.prompt);
    match &outcome.result {
        Ok(response) => println!("{} {}", "Response:".green().bold(), response),
        Err(e) => println!("{} {}", "Error processing prompt:".red().bold(), e),
    }
    println!("{}", "-".repeat(50));
}

/// Summary table of a test run.
pub fn display_summary_table(outcomes: &[PromptOutcome]) {
    let mut table = Table::new();
    table
        .set_header(vec![
            Cell::new("#").fg(comfy_table::Color::Cyan).add_attribute(Attribute::Bold),
            Cell::new("Prompt").fg(comfy_table::Color::Cyan).add_attribute(Attribute::Bold),
            Cell::new("Status").fg(comfy_table::Color::Cyan).add_attribute(Attribute::Bold),
            Cell::new("Chars").fg(comfy_table::Color::Cyan).add_attribute(Attribute::Bold),
            Cell::new("Time (ms)").fg(comfy_table::Color::Cyan).add_attribute(Attribute::Bold),
        ])
        .load_preset(comfy_table::presets::UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    for (i, outcome) in outcomes.iter().enumerate() {
        let (status, chars) = match &outcome.result {
            Ok(text) => (Cell::new("ok").fg(comfy_table::Color::Green), text.chars().count().to_string()),
            Err(_) => (Cell::new("failed").fg(comfy_table::Color::Red), "-".to_string()),
        };
        table.add_row(vec![
            Cell::new(i + 1),
            Cell::new(preview(&outcome.prompt)),
            status,
            Cell::new(chars).set_alignment(CellAlignment::Right),
            Cell::new(outcome.elapsed.as_millis()).set_alignment(CellAlignment::Right),
        ]);
    }

    println!("{table}");
}

/// Table of the model section of the configuration.
pub fn display_config(config: &ModelConfig) {
    let mut table = Table::new();
    table
        .set_header(vec![
            Cell::new("Setting").add_attribute(Attribute::Bold),
            Cell::new("Value").add_attribute(Attribute::Bold),
        ])
        .load_preset(comfy_table::presets::UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    table.add_row(vec![Cell::new("name"), Cell::new(&config.name)]);
    table.add_row(vec![Cell::new("max_length"), Cell::new(config.max_length)]);
    table.add_row(vec![Cell::new("batch_size"), Cell::new(config.batch_size)]);
    table.add_row(vec![Cell::new("device"), Cell::new(&config.device)]);
    for (key, value) in &config.quantization {
        table.add_row(vec![Cell::new(format!("quantization.{}", key)), Cell::new(value.to_string())]);
    }

    println!("{table}");
}

fn preview(prompt: &str) -> String {
    if prompt.chars().count() <= PROMPT_PREVIEW_CHARS {
        prompt.to_string()
    } else {
        let cut: String = prompt.chars().take(PROMPT_PREVIEW_CHARS - 3).collect();
        format!("{}...", cut)
    }
}
