//! Writes `hwd.1` (plus one page per subcommand) and shell completions.
//!
//! Usage: `hwd-manpage [OUT_DIR]`, default `man/`. Completions land in
//! `OUT_DIR/completions/`.

use clap::CommandFactory;
use clap_complete::Shell;
use std::fs;
use std::io;
use std::path::PathBuf;

fn main() -> io::Result<()> {
    let out_dir = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("man"));
    fs::create_dir_all(&out_dir)?;

    clap_mangen::generate_to(hwd::cli::Cli::command(), &out_dir)?;

    let completions = out_dir.join("completions");
    fs::create_dir_all(&completions)?;
    for shell in [Shell::Bash, Shell::Zsh, Shell::Fish] {
        clap_complete::generate_to(shell, &mut hwd::cli::Cli::command(), "hwd", &completions)?;
    }

    let mut generated: Vec<PathBuf> = fs::read_dir(&out_dir)?
        .chain(fs::read_dir(&completions)?)
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .collect();
    generated.sort();
    for path in generated {
        println!("Generated {}", path.display());
    }

    Ok(())
}
