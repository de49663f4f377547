use std::fmt;
use std::io::{BufRead, Write};

use anyhow::{anyhow, bail, Context};
use dialoguer::Select;

use crate::formats::{Resolution, ResolutionOption};
use crate::Result;

/// Why a line typed at the prompt was rejected
#[derive(Debug, PartialEq, Eq)]
pub enum SelectionError {
    Empty,
    NotANumber,
    OutOfRange,
}

impl fmt::Display for SelectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionError::Empty => write!(f, "Please enter a selection."),
            SelectionError::NotANumber => write!(f, "Please enter a numeric selection."),
            SelectionError::OutOfRange => write!(f, "Selection out of range. Try again."),
        }
    }
}

impl std::error::Error for SelectionError {}

/// Parses a 1-based menu entry and returns the 0-based index
pub fn parse_selection(input: &str, count: usize) -> std::result::Result<usize, SelectionError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(SelectionError::Empty);
    }
    if !input.chars().all(|c| c.is_ascii_digit()) {
        return Err(SelectionError::NotANumber);
    }
    // All digits, so a parse failure can only be an overflow
    let index: usize = input.parse().map_err(|_| SelectionError::OutOfRange)?;
    if index < 1 || index > count {
        return Err(SelectionError::OutOfRange);
    }
    Ok(index - 1)
}

/// Asks the user to pick one of the available resolutions
pub trait ResolutionPrompt {
    fn choose(&mut self, options: &[ResolutionOption]) -> Result<Resolution>;
}

/// Arrow-key menu, used when attached to a terminal
#[derive(Debug, Default)]
pub struct TerminalPrompt;

impl ResolutionPrompt for TerminalPrompt {
    fn choose(&mut self, options: &[ResolutionOption]) -> Result<Resolution> {
        if options.is_empty() {
            bail!("No resolutions to choose from");
        }
        let items: Vec<String> = options.iter().map(ResolutionOption::label).collect();
        let selection = Select::new()
            .with_prompt("Choose the desired resolution")
            .items(&items)
            .default(items.len() - 1)
            .interact()
            .context("Failed to read the resolution selection")?;
        Ok(options[selection].resolution)
    }
}

/// Numbered list read line by line, used for piped input
pub struct LinePrompt<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> LinePrompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl<R: BufRead, W: Write> ResolutionPrompt for LinePrompt<R, W> {
    fn choose(&mut self, options: &[ResolutionOption]) -> Result<Resolution> {
        if options.is_empty() {
            bail!("No resolutions to choose from");
        }

        writeln!(self.output, "Available download options:")?;
        for (idx, option) in options.iter().enumerate() {
            writeln!(self.output, "  {}. {}", idx + 1, option.label())?;
        }

        loop {
            write!(self.output, "Enter the number for the desired resolution: ")?;
            self.output.flush()?;

            let mut line = String::new();
            let read = self
                .input
                .read_line(&mut line)
                .context("Failed to read the resolution selection")?;
            if read == 0 {
                return Err(anyhow!("Input closed before a resolution was selected"));
            }

            match parse_selection(&line, options.len()) {
                Ok(index) => return Ok(options[index].resolution),
                Err(e) => writeln!(self.output, "{}", e)?,
            }
        }
    }
}
