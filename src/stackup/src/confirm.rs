//! Confirmation prompts as an injectable capability.
//!
//! Components never read stdin directly; they ask a [`ConfirmationPolicy`].
use async_trait::async_trait;
use std::io::{BufRead, IsTerminal, Write};

#[async_trait]
pub trait ConfirmationPolicy: Send + Sync {
    /// Ask `question`; `default` is the answer taken on an empty response.
    async fn confirm(&self, question: &str, default: bool) -> bool;
}

/// Prompt on the terminal. When stdin is not a terminal the default is taken.
#[derive(Debug, Default, Clone, Copy)]
pub struct InteractivePrompt;

#[async_trait]
impl ConfirmationPolicy for InteractivePrompt {
    async fn confirm(&self, question: &str, default: bool) -> bool {
        if !std::io::stdin().is_terminal() {
            tracing::info!(
                "[Confirm] Non-interactive stdin, taking default ({}) for: {}",
                yes_no(default),
                question
            );
            return default;
        }

        let hint = if default { "[Y/n]" } else { "[y/N]" };
        let mut stderr = std::io::stderr();
        let _ = write!(stderr, "{} {} ", question, hint);
        let _ = stderr.flush();

        // Read off the runtime so a pending Ctrl+C is still observed
        let answer = tokio::task::spawn_blocking(|| {
            let mut line = String::new();
            std::io::stdin().lock().read_line(&mut line).map(|_| line)
        })
        .await;

        match answer {
            Ok(Ok(line)) => parse_answer(&line).unwrap_or(default),
            _ => default,
        }
    }
}

/// Always take each prompt's default (CI and scripted runs).
#[derive(Debug, Default, Clone, Copy)]
pub struct UseDefaults;

#[async_trait]
impl ConfirmationPolicy for UseDefaults {
    async fn confirm(&self, question: &str, default: bool) -> bool {
        tracing::info!("[Confirm] {} -> {} (default)", question, yes_no(default));
        default
    }
}

/// Answer yes to everything (`--yes`).
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysYes;

#[async_trait]
impl ConfirmationPolicy for AlwaysYes {
    async fn confirm(&self, question: &str, _default: bool) -> bool {
        tracing::info!("[Confirm] {} -> yes (--yes)", question);
        true
    }
}

/// Give the same answer to every prompt.
#[derive(Debug, Clone, Copy)]
pub struct FixedAnswer(pub bool);

#[async_trait]
impl ConfirmationPolicy for FixedAnswer {
    async fn confirm(&self, _question: &str, _default: bool) -> bool {
        self.0
    }
}

/// `y`/`yes` and `n`/`no`, case-insensitive. Anything else is no answer.
pub fn parse_answer(input: &str) -> Option<bool> {
    match input.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => Some(true),
        "n" | "no" => Some(false),
        _ => None,
    }
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}
