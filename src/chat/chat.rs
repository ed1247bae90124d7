use std::error::Error;
use std::time::{Duration, Instant};

use colored::*;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing::{error, info};

use super::display::{print_help, print_outcome, print_status};
use crate::inference::{InferenceWrapper, ModelBackend};

/// Prompts used by the inference test run
pub const TEST_PROMPTS: [&str; 3] = [
    "Explain what LLMs are in one sentence:",
    "Write a haiku about programming:",
    "What is the capital of France?",
];

/// Result of one prompt in a test run.
#[derive(Debug, Clone)]
pub struct PromptOutcome {
    pub prompt: String,
    pub result: Result<String, String>,
    pub elapsed: Duration,
}

impl PromptOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Runs every prompt through the wrapper, then releases the model.
///
/// A failing prompt is reported and the run moves on to the next one.
pub fn run_inference_test<B: ModelBackend>(
    wrapper: &mut InferenceWrapper<B>,
    prompts: &[&str],
) -> Vec<PromptOutcome> {
    println!("\nRunning inference tests...");
    println!("{}", "-".repeat(50));

    let mut outcomes = Vec::with_capacity(prompts.len());
    for prompt in prompts {
        let started = Instant::now();
        let result = wrapper.generate(prompt, None).map_err(|e| {
            error!(prompt = %prompt, error = %e, "Prompt failed");
            e.to_string()
        });

        let outcome = PromptOutcome {
            prompt: prompt.to_string(),
            result,
            elapsed: started.elapsed(),
        };
        print_outcome(&outcome);
        outcomes.push(outcome);
    }

    wrapper.clear_memory();
    let failed = outcomes.iter().filter(|o| !o.is_ok()).count();
    info!(prompts = outcomes.len(), failed, "Inference test run finished");
    outcomes
}

// --- Interactive loop ---

pub fn chat_loop<B: ModelBackend>(wrapper: &mut InferenceWrapper<B>) -> Result<(), Box<dyn Error + Send + Sync>> {
    println!("Starting chat session with {}", wrapper.config().name.bold());
    print_help();

    let mut rl = DefaultEditor::new()?;

    loop {
        let readline = rl.readline("[you] > ");
        let input = match readline {
            Ok(input) => input,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                println!("Goodbye!");
                break;
            }
            Err(e) => return Err(e.into()),
        };

        let input_trimmed = input.trim();
        if input_trimmed.is_empty() {
            continue;
        }
        let _ = rl.add_history_entry(input_trimmed);

        match input_trimmed.to_lowercase().as_str() {
            "exit" | "bye" | "quit" => {
                println!("Goodbye!");
                break;
            }
            "help" => print_help(),
            "status" => print_status(wrapper.state(), wrapper.loaded_at()),
            "unload" => {
                wrapper.clear_memory();
                println!("{}", "Model unloaded. The next prompt loads it again.".yellow());
            }
            _ => match wrapper.generate(input_trimmed, None) {
                Ok(response) => println!("{} {}", "[model]".bright_cyan().bold(), response),
                Err(e) => println!("{} {}", "Error:".red().bold(), e),
            },
        }
    }

    wrapper.clear_memory();
    Ok(())
}
