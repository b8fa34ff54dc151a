//! Shell completion scripts for `cairn`

use crate::cli::{Cli, CompletionsArgs};
use anyhow::Result;
use clap::CommandFactory;
use clap_complete::{generate, Shell};
use std::io::{self, Write};

pub fn run(args: CompletionsArgs) -> Result<()> {
    write_script(args.shell, &mut io::stdout().lock())
}

/// Render the completion script for `shell` into `out`
fn write_script(shell: Shell, out: &mut dyn Write) -> Result<()> {
    let mut cmd = Cli::command();
    let bin = cmd.get_name().to_string();
    generate(shell, &mut cmd, bin, out);
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bash_script_names_subcommands() {
        let mut buf = Vec::new();
        write_script(Shell::Bash, &mut buf).unwrap();
        let script = String::from_utf8(buf).unwrap();

        assert!(script.contains("cairn"));
        assert!(script.contains("check-urls"));
        assert!(script.contains("outdated"));
    }
}
