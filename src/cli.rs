use clap::Parser;
use std::path::PathBuf;

/// An autonomous code-editing agent
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Run this task once and exit instead of starting the interactive session
    pub prompt: Option<String>,

    /// Directory the agent may read and edit
    #[arg(short, long)]
    pub workspace: Option<PathBuf>,

    /// Provider to use, as named in the config file
    #[arg(short, long)]
    pub provider: Option<String>,

    /// Model id, overriding the provider's configured model
    #[arg(short, long)]
    pub model: Option<String>,

    /// Model requests allowed per task
    #[arg(long)]
    pub max_iterations: Option<usize>,

    /// Print every request payload before it is sent
    #[arg(long)]
    pub debug: bool,

    /// Config file to use instead of $XDG_CONFIG_HOME/autoedit/config.toml
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_shot_arguments() {
        let cli = Cli::parse_from([
            "autoedit",
            "--workspace",
            "/tmp/project",
            "--provider",
            "ollama",
            "--max-iterations",
            "3",
            "rename foo to bar",
        ]);
        assert_eq!(cli.prompt.as_deref(), Some("rename foo to bar"));
        assert_eq!(cli.workspace, Some(PathBuf::from("/tmp/project")));
        assert_eq!(cli.provider.as_deref(), Some("ollama"));
        assert_eq!(cli.max_iterations, Some(3));
        assert!(!cli.debug);
    }

    #[test]
    fn test_no_prompt_means_interactive() {
        let cli = Cli::parse_from(["autoedit", "--debug"]);
        assert!(cli.prompt.is_none());
        assert!(cli.debug);
    }
}
