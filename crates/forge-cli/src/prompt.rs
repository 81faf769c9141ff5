//! Terminal prompts

use console::{Term, style};
use forge_kube::{KubeError, Prompter};

/// Asks on the controlling terminal
pub struct TerminalPrompter {
    term: Term,
}

impl TerminalPrompter {
    pub fn new() -> Self {
        Self { term: Term::stderr() }
    }

    fn read_line(&self) -> forge_kube::Result<String> {
        self.term
            .read_line()
            .map(|line| line.trim().to_string())
            .map_err(|e| KubeError::Prompt(e.to_string()))
    }

    fn write_line(&self, line: &str) -> forge_kube::Result<()> {
        self.term
            .write_line(line)
            .map_err(|e| KubeError::Prompt(e.to_string()))
    }
}

impl Prompter for TerminalPrompter {
    fn confirm(&self, question: &str, default: bool) -> forge_kube::Result<bool> {
        let hint = if default { "[Y/n]" } else { "[y/N]" };
        loop {
            self.write_line(&format!("{} {} {}", style("?").cyan().bold(), question, style(hint).dim()))?;
            match parse_confirm(&self.read_line()?, default) {
                Some(answer) => return Ok(answer),
                None => self.write_line("Please answer y or n")?,
            }
        }
    }

    fn select(&self, title: &str, options: &[String]) -> forge_kube::Result<usize> {
        if options.is_empty() {
            return Err(KubeError::Prompt(format!("nothing to choose for '{title}'")));
        }
        self.write_line(&format!("{} {}", style("?").cyan().bold(), title))?;
        for (i, option) in options.iter().enumerate() {
            self.write_line(&format!("  {} {}", style(format!("{:>2})", i + 1)).dim(), option))?;
        }
        loop {
            self.write_line(&format!("{}", style(format!("Choose 1-{} [1]", options.len())).dim()))?;
            match parse_choice(&self.read_line()?, options.len()) {
                Some(index) => return Ok(index),
                None => self.write_line("Not a valid choice")?,
            }
        }
    }
}

fn parse_confirm(input: &str, default: bool) -> Option<bool> {
    match input.to_ascii_lowercase().as_str() {
        "" => Some(default),
        "y" | "yes" => Some(true),
        "n" | "no" => Some(false),
        _ => None,
    }
}

/// 1-based choice to index; empty picks the first
fn parse_choice(input: &str, count: usize) -> Option<usize> {
    if input.is_empty() {
        return Some(0);
    }
    match input.parse::<usize>() {
        Ok(n) if (1..=count).contains(&n) => Some(n - 1),
        _ => None,
    }
}
