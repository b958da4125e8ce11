//! Interactive prompts for connection details and the confirmation gate.
//!
//! On a terminal the prompts go through dialoguer; otherwise lines are read
//! from stdin so the tool can be driven by a pipe.

use dialoguer::{Confirm, Input, Password};
use meteo_migrate::{Manifest, MigrateError, SourceConfig, TargetConfig};
use std::io::{BufRead, IsTerminal, Write};
use std::path::PathBuf;

/// Result type for prompt operations.
pub type PromptResult<T> = Result<T, MigrateError>;

fn dialog_error(e: dialoguer::Error) -> MigrateError {
    MigrateError::Io(std::io::Error::other(e.to_string()))
}

fn interactive() -> bool {
    std::io::stdin().is_terminal()
}

/// Read one trimmed line from stdin after printing `prompt`.
fn read_line(prompt: &str) -> PromptResult<String> {
    print!("{}> ", prompt);
    std::io::stdout().flush()?;

    let mut line = String::new();
    let read = std::io::stdin().lock().read_line(&mut line)?;
    if read == 0 {
        return Err(MigrateError::MalformedInput(format!(
            "input ended while reading {}",
            prompt.to_lowercase()
        )));
    }
    Ok(line.trim().to_string())
}

fn prompt_text(prompt: &str) -> PromptResult<String> {
    if interactive() {
        Input::new()
            .with_prompt(prompt)
            .interact_text()
            .map_err(dialog_error)
    } else {
        read_line(prompt)
    }
}

fn prompt_password() -> PromptResult<String> {
    if interactive() {
        Password::new()
            .with_prompt("Password")
            .allow_empty_password(true)
            .interact()
            .map_err(dialog_error)
    } else {
        eprintln!("WARNING: Password will be shown in cleartext on prompt");
        read_line("Password (unprotected)")
    }
}

/// Ask for whatever part of the source connection is still missing.
pub fn complete_source(source: &mut SourceConfig) -> PromptResult<()> {
    let missing = source.host.is_empty() || source.database.is_empty() || source.user.is_empty();
    if missing {
        println!("Configuring MySQL Database:");
    }
    if source.host.is_empty() {
        source.host = prompt_text("Hostname")?;
    }
    if source.database.is_empty() {
        source.database = prompt_text("Database")?;
    }
    if source.user.is_empty() {
        source.user = prompt_text("Username")?;
    }
    if source.password.is_empty() {
        source.password = prompt_password()?;
    }
    Ok(())
}

/// Ask for the destination file when none was given.
pub fn complete_destination(target: &mut TargetConfig) -> PromptResult<()> {
    if target.path.as_os_str().is_empty() {
        println!("Configuring sqlite database:");
        target.path = PathBuf::from(prompt_text("Filename")?);
    }
    Ok(())
}

/// Print the manifest the way the run reports it before any write.
pub fn print_manifest(manifest: &Manifest) {
    println!("Database connected : {}", manifest.server_version);
    println!("Fetched {} stations:", manifest.stations.len());
    for entry in &manifest.stations {
        println!("\t{} [{} datapoints]", entry.station, entry.count);
    }
    println!("Counted {} datapoints in all stations", manifest.total);
    println!("Fetched {} tokens", manifest.tokens.len());
}

/// Show the manifest and ask whether to write the destination.
pub fn confirm_manifest(manifest: &Manifest) -> PromptResult<bool> {
    print_manifest(manifest);

    // No default on either path: a bare Enter never confirms
    if interactive() {
        return Confirm::new()
            .with_prompt("Continue?")
            .interact()
            .map_err(dialog_error);
    }

    loop {
        print!("Continue? [y/n] ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if std::io::stdin().lock().read_line(&mut line)? == 0 {
            return Ok(false);
        }
        if let Some(answer) = parse_answer(&line) {
            return Ok(answer);
        }
    }
}

/// Interpret a confirmation reply. Anything but yes or no, an empty line
/// included, asks again.
fn parse_answer(line: &str) -> Option<bool> {
    match line.trim().to_lowercase().as_str() {
        "yes" | "y" => Some(true),
        "no" | "n" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_answer() {
        assert_eq!(parse_answer("y\n"), Some(true));
        assert_eq!(parse_answer(" YES "), Some(true));
        assert_eq!(parse_answer("n"), Some(false));
        assert_eq!(parse_answer("No\n"), Some(false));
    }

    #[test]
    fn test_bare_enter_does_not_confirm() {
        assert_eq!(parse_answer("\n"), None);
        assert_eq!(parse_answer(""), None);
        assert_eq!(parse_answer("maybe"), None);
    }
}
