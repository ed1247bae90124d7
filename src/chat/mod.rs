// Terminal rendering for the test run and the chat loop
mod display;

// Test run over fixed prompts and the interactive loop
mod chat;

pub use chat::{chat_loop, run_inference_test, PromptOutcome, TEST_PROMPTS};
pub use display::{display_config, display_summary_table};
