//! ui::prompts
//!
//! Interactive prompts behind a trait, so phases are testable without a
//! terminal.
//!
//! # Design
//!
//! Phases receive a `&dyn Prompter`. The production implementation reads
//! stdin; [`ScriptedPrompter`] replays canned answers for tests. A
//! cancelled prompt (EOF, or an exhausted script) surfaces as
//! [`PromptError::Cancelled`] and phases translate it into an aborted
//! result without side effects.

use std::collections::VecDeque;
use std::io::{self, BufRead, Write};
use std::sync::Mutex;

use thiserror::Error;

/// Errors from prompts.
#[derive(Debug, Error)]
pub enum PromptError {
    #[error("prompt cancelled by user")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(String),
}

/// User interaction surface.
pub trait Prompter: Send + Sync {
    /// Yes/no confirmation.
    fn confirm(&self, message: &str, default: bool) -> Result<bool, PromptError>;

    /// Free-form text input. An empty answer returns the default when
    /// one is given.
    fn input(&self, message: &str, default: Option<&str>) -> Result<String, PromptError>;

    /// Select one option by index.
    fn select(&self, message: &str, options: &[String]) -> Result<usize, PromptError>;

    /// Masked input for secrets.
    fn password(&self, message: &str) -> Result<String, PromptError>;
}

/// Stdin-backed prompter for interactive sessions.
#[derive(Debug, Default)]
pub struct StdinPrompter;

impl StdinPrompter {
    pub fn new() -> Self {
        Self
    }

    fn read_line(&self) -> Result<String, PromptError> {
        let mut line = String::new();
        let read = io::stdin()
            .lock()
            .read_line(&mut line)
            .map_err(|e| PromptError::Io(e.to_string()))?;
        if read == 0 {
            // EOF
            return Err(PromptError::Cancelled);
        }
        Ok(line.trim().to_string())
    }
}

impl Prompter for StdinPrompter {
    fn confirm(&self, message: &str, default: bool) -> Result<bool, PromptError> {
        let hint = if default { "Y/n" } else { "y/N" };
        print!("{} [{}]: ", message, hint);
        let _ = io::stdout().flush();
        let answer = self.read_line()?;
        Ok(match answer.to_ascii_lowercase().as_str() {
            "" => default,
            "y" | "yes" => true,
            _ => false,
        })
    }

    fn input(&self, message: &str, default: Option<&str>) -> Result<String, PromptError> {
        match default {
            Some(default) => print!("{} [{}]: ", message, default),
            None => print!("{}: ", message),
        }
        let _ = io::stdout().flush();
        let answer = self.read_line()?;
        if answer.is_empty() {
            Ok(default.unwrap_or("").to_string())
        } else {
            Ok(answer)
        }
    }

    fn select(&self, message: &str, options: &[String]) -> Result<usize, PromptError> {
        println!("{}", message);
        for (i, option) in options.iter().enumerate() {
            println!("  {}. {}", i + 1, option);
        }
        loop {
            print!("番号を選択 [1-{}]: ", options.len());
            let _ = io::stdout().flush();
            let answer = self.read_line()?;
            if let Ok(n) = answer.parse::<usize>() {
                if (1..=options.len()).contains(&n) {
                    return Ok(n - 1);
                }
            }
            println!("1から{}の番号を入力してください", options.len());
        }
    }

    fn password(&self, message: &str) -> Result<String, PromptError> {
        rpassword::prompt_password(format!("{}: ", message))
            .map_err(|e| PromptError::Io(e.to_string()))
    }
}

/// One canned answer for [`ScriptedPrompter`].
#[derive(Debug, Clone)]
pub enum ScriptedAnswer {
    Confirm(bool),
    Input(String),
    Select(usize),
    Password(String),
    /// Simulate the user cancelling at this prompt.
    Cancel,
}

/// Replays canned answers in order. An exhausted script cancels, which
/// keeps a test from hanging when a phase asks more than expected.
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    answers: Mutex<VecDeque<ScriptedAnswer>>,
}

impl ScriptedPrompter {
    pub fn new(answers: Vec<ScriptedAnswer>) -> Self {
        Self {
            answers: Mutex::new(answers.into()),
        }
    }

    fn next(&self) -> Result<ScriptedAnswer, PromptError> {
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(PromptError::Cancelled)
    }

    /// Answers not yet consumed.
    pub fn remaining(&self) -> usize {
        self.answers.lock().unwrap().len()
    }
}

impl Prompter for ScriptedPrompter {
    fn confirm(&self, _message: &str, default: bool) -> Result<bool, PromptError> {
        match self.next()? {
            ScriptedAnswer::Confirm(answer) => Ok(answer),
            ScriptedAnswer::Cancel => Err(PromptError::Cancelled),
            // A scripted default: reuse the prompt default
            ScriptedAnswer::Input(ref s) if s.is_empty() => Ok(default),
            other => Err(PromptError::Io(format!(
                "script mismatch: confirm got {:?}",
                other
            ))),
        }
    }

    fn input(&self, _message: &str, default: Option<&str>) -> Result<String, PromptError> {
        match self.next()? {
            ScriptedAnswer::Input(answer) if answer.is_empty() => {
                Ok(default.unwrap_or("").to_string())
            }
            ScriptedAnswer::Input(answer) => Ok(answer),
            ScriptedAnswer::Cancel => Err(PromptError::Cancelled),
            other => Err(PromptError::Io(format!(
                "script mismatch: input got {:?}",
                other
            ))),
        }
    }

    fn select(&self, _message: &str, options: &[String]) -> Result<usize, PromptError> {
        match self.next()? {
            ScriptedAnswer::Select(index) if index < options.len() => Ok(index),
            ScriptedAnswer::Select(index) => Err(PromptError::Io(format!(
                "script mismatch: select index {} of {}",
                index,
                options.len()
            ))),
            ScriptedAnswer::Cancel => Err(PromptError::Cancelled),
            other => Err(PromptError::Io(format!(
                "script mismatch: select got {:?}",
                other
            ))),
        }
    }

    fn password(&self, _message: &str) -> Result<String, PromptError> {
        match self.next()? {
            ScriptedAnswer::Password(answer) => Ok(answer),
            ScriptedAnswer::Cancel => Err(PromptError::Cancelled),
            other => Err(PromptError::Io(format!(
                "script mismatch: password got {:?}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_answers_replay_in_order() {
        let prompter = ScriptedPrompter::new(vec![
            ScriptedAnswer::Confirm(true),
            ScriptedAnswer::Input("hello".to_string()),
            ScriptedAnswer::Select(2),
        ]);

        assert!(prompter.confirm("ok?", false).unwrap());
        assert_eq!(prompter.input("text", None).unwrap(), "hello");
        let options: Vec<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        assert_eq!(prompter.select("pick", &options).unwrap(), 2);
        assert_eq!(prompter.remaining(), 0);
    }

    #[test]
    fn exhausted_script_cancels() {
        let prompter = ScriptedPrompter::new(vec![]);
        assert!(matches!(
            prompter.confirm("ok?", true),
            Err(PromptError::Cancelled)
        ));
    }

    #[test]
    fn empty_input_uses_default() {
        let prompter = ScriptedPrompter::new(vec![ScriptedAnswer::Input(String::new())]);
        assert_eq!(
            prompter.input("msg", Some("fallback")).unwrap(),
            "fallback"
        );
    }

    #[test]
    fn explicit_cancel_answer() {
        let prompter = ScriptedPrompter::new(vec![ScriptedAnswer::Cancel]);
        assert!(matches!(
            prompter.input("msg", None),
            Err(PromptError::Cancelled)
        ));
    }

    #[test]
    fn out_of_range_select_is_script_error() {
        let prompter = ScriptedPrompter::new(vec![ScriptedAnswer::Select(5)]);
        let options = vec!["a".to_string()];
        assert!(matches!(
            prompter.select("pick", &options),
            Err(PromptError::Io(_))
        ));
    }
}
