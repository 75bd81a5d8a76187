use crate::agent::{AbortReason, Agent, LoopState, RunOutcome, TurnObserver};
use crate::commands::{HELP, SlashCommand, parse_slash_command};
use crate::config::Config;
use crate::error::ProviderError;
use crate::provider::{self, GenerateRequest, ModelAction, Provider};
use crate::session::{History, Session, Task, ToolOutcome, Turn};
use crate::tool_collection::ToolCollection;
use anyhow::{Result, anyhow};
use console::style;
use serde_json::Value;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Above this many bytes `/load` asks before reading the workspace.
const LOAD_WARNING_BYTES: u64 = 150_000;
const MAX_DISPLAY_CHARS: usize = 200;

/// Prints the transcript of a run as it happens.
pub struct ConsoleObserver {
    max_iterations: usize,
}

impl ConsoleObserver {
    pub fn new(max_iterations: usize) -> Self {
        Self { max_iterations }
    }
}

impl TurnObserver for ConsoleObserver {
    fn on_state(&self, state: LoopState) {
        if let LoopState::AwaitingModel { iteration } = state {
            println!(
                "{}",
                style(format!("thinking ({iteration}/{})", self.max_iterations)).dim()
            );
        }
    }

    fn on_turn(&self, turn: &Turn) {
        match turn {
            // The user just typed it.
            Turn::UserMessage { .. } => {}
            Turn::AssistantMessage { text } | Turn::FinalAnswer { text } => {
                println!("[{}]", style("assistant").blue());
                println!("{text}");
            }
            Turn::ToolCall {
                name, arguments, ..
            } => {
                println!(
                    "[{}] {}",
                    style(format!("tool: {name}")).magenta(),
                    style(truncate_for_display(&arguments.to_string(), MAX_DISPLAY_CHARS)).dim()
                );
            }
            Turn::ToolResult { outcome, .. } => match outcome {
                ToolOutcome::Success { output } => {
                    println!("  {} {}", style("ok").green(), describe_output(output));
                }
                ToolOutcome::Error { code, message, .. } => {
                    println!("  {} {message}", style(code).red());
                }
            },
        }
    }
}

/// One line summarizing a successful tool result. Bulky fields are left out.
fn describe_output(output: &Value) -> String {
    if let Some(message) = output.get("message").and_then(Value::as_str) {
        return message.to_string();
    }
    let mut summary = output.clone();
    if let Value::Object(map) = &mut summary {
        for bulky in ["content", "files", "output"] {
            map.remove(bulky);
        }
    }
    truncate_for_display(&summary.to_string(), MAX_DISPLAY_CHARS)
}

fn truncate_for_display(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

/// Replaces a leading `~` with the home directory.
fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), std::env::var_os("HOME")) {
        (Ok(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => path.to_path_buf(),
    }
}

pub struct App {
    pub config: Config,
    config_path: PathBuf,
    session: Session,
    tools: Arc<ToolCollection>,
    /// Workspace content queued by `/load` for the next prompt.
    loaded_context: Option<String>,
}

impl App {
    /// Creates the app, opening `workspace` or else the configured workspace.
    pub fn new(config: Config, config_path: PathBuf, workspace: Option<PathBuf>) -> Self {
        let workspace = workspace
            .or_else(|| config.workspace_path.clone())
            .and_then(|path| match config.open_workspace(&expand_home(&path)) {
                Ok(workspace) => Some(workspace),
                Err(e) => {
                    eprintln!("{}", style(format!("Workspace not opened: {e}")).yellow());
                    None
                }
            });
        Self {
            config,
            config_path,
            session: Session::new(workspace),
            tools: Arc::new(ToolCollection::with_default_tools()),
            loaded_context: None,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Runs one task in the current session. Returns `None` when nothing was sent.
    pub async fn run_task(&mut self, prompt: String) -> Option<RunOutcome> {
        if self.session.workspace().is_none() {
            eprintln!(
                "{}",
                style("INVALID_STATE: No workspace is set. Use /workspace <path> first.").red()
            );
            return None;
        }

        println!("[{}]", style("user").blue());
        println!("{}", style(&prompt).cyan());
        println!(
            "provider: {}, model: {}",
            self.config.active_provider,
            self.config
                .active_settings()
                .map(|s| s.model.as_str())
                .unwrap_or("?")
        );

        let outcome = match self.build_provider() {
            Ok(provider) => {
                let settings = self.config.loop_settings();
                let agent = Agent::new(provider, self.tools.clone(), settings)
                    .with_tool_settings(self.config.editor(), self.config.verify_settings())
                    .with_observer(Arc::new(ConsoleObserver::new(
                        self.config.max_iterations,
                    )));
                let task = match self.loaded_context.take() {
                    Some(context) => Task::new(format!("{context}\n\n{prompt}")),
                    None => Task::new(prompt),
                };

                let cancel = CancellationToken::new();
                let watcher = {
                    let cancel = cancel.clone();
                    tokio::spawn(async move {
                        if tokio::signal::ctrl_c().await.is_ok() {
                            println!("\n{}", style("Cancelling...").yellow());
                            cancel.cancel();
                        }
                    })
                };
                let outcome = agent.run(&mut self.session, task, &cancel).await;
                watcher.abort();
                outcome
            }
            Err(e) => RunOutcome::Aborted {
                reason: AbortReason::Provider(e),
            },
        };

        match &outcome {
            RunOutcome::Completed { .. } => println!("{}", style("Task completed.").green()),
            RunOutcome::Aborted { reason } => {
                eprintln!("{}", style(format!("Task incomplete: {reason}")).red())
            }
        }
        Some(outcome)
    }

    fn build_provider(&self) -> Result<Arc<dyn Provider>, ProviderError> {
        let settings = self
            .config
            .active_settings()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        provider::build_provider(
            &self.config.active_provider,
            settings,
            self.config.retry_policy(),
            self.config.provider_timeout(),
        )
    }

    pub async fn repl(&mut self) -> Result<()> {
        let mut stdin_receiver = spawn_stdin_channel();
        let mut ctrl_c_pressed = false;

        println!("{}", style("autoedit").bold());
        match self.session.workspace() {
            Some(workspace) => println!("workspace: {}", workspace.root().display()),
            None => println!("No workspace set. Use /workspace <path> to start."),
        }
        println!("{}", style("Type /help for commands.").dim());

        loop {
            print!("\x07{} ", style("user>").cyan().bold());
            io::stdout().flush()?;

            let input = tokio::select! {
                biased;
                _ = tokio::signal::ctrl_c() => {
                    if ctrl_c_pressed {
                        break;
                    }
                    println!("\nPress Ctrl+C again to exit.");
                    ctrl_c_pressed = true;
                    continue;
                }
                line_opt = stdin_receiver.recv() => match line_opt.flatten() {
                    Some(input) => input,
                    None => {
                        // Ctrl+D was pressed
                        println!();
                        break;
                    }
                },
            };
            ctrl_c_pressed = false;
            if input.is_empty() {
                continue;
            }

            match parse_slash_command(&input) {
                Some(SlashCommand::Exit) => break,
                Some(command) => {
                    if let Err(e) = self.handle_command(command, &mut stdin_receiver).await {
                        eprintln!("{}", style(format!("Error: {e}")).red());
                    }
                }
                None => {
                    self.run_task(input).await;
                }
            }
        }

        println!("\nShutting down...");
        Ok(())
    }

    async fn handle_command(
        &mut self,
        command: SlashCommand,
        stdin_receiver: &mut mpsc::Receiver<Option<String>>,
    ) -> Result<()> {
        match command {
            SlashCommand::Workspace(None) => match self.session.workspace() {
                Some(workspace) => println!("workspace: {}", workspace.root().display()),
                None => println!("No workspace set."),
            },
            SlashCommand::Workspace(Some(path)) => {
                let workspace = self.config.open_workspace(&expand_home(&path))?;
                println!(
                    "{}",
                    style(format!("Workspace set to {}", workspace.root().display())).green()
                );
                self.config.workspace_path = Some(workspace.root().to_path_buf());
                self.session = Session::new(Some(workspace));
                self.loaded_context = None;
                self.config.save(&self.config_path)?;
            }
            SlashCommand::Load => self.load_workspace(stdin_receiver).await?,
            SlashCommand::Clear => {
                self.loaded_context = None;
                println!("Loaded content cleared.");
            }
            SlashCommand::New => {
                self.session = self.session.reset();
                self.loaded_context = None;
                println!("Started a new session.");
            }
            SlashCommand::Debug => {
                self.config.debug = !self.config.debug;
                println!(
                    "Debug mode {}.",
                    if self.config.debug { "on" } else { "off" }
                );
            }
            SlashCommand::Status => self.print_status(),
            SlashCommand::Providers => {
                for (name, settings) in &self.config.providers {
                    let marker = if *name == self.config.active_provider {
                        "*"
                    } else {
                        " "
                    };
                    println!("{marker} {name} ({})", settings.model);
                }
            }
            SlashCommand::Provider(None) => {
                println!("provider: {}", self.config.active_provider);
            }
            SlashCommand::Provider(Some(name)) => {
                if !self.config.providers.contains_key(&name) {
                    return Err(anyhow!(
                        "Unknown provider '{name}'. Known providers: {}",
                        self.config.provider_names().join(", ")
                    ));
                }
                self.config.active_provider = name;
                self.config.save(&self.config_path)?;
                self.print_status();
            }
            SlashCommand::Model(None) => {
                println!("model: {}", self.config.active_settings()?.model);
            }
            SlashCommand::Model(Some(model)) => {
                self.config.active_settings_mut()?.model = model.clone();
                self.config.save(&self.config_path)?;
                println!("Model set to {model}.");
            }
            SlashCommand::Api(None) => {
                println!("Usage: /api <key>");
            }
            SlashCommand::Api(Some(key)) => {
                self.config.active_settings_mut()?.api_key = Some(key);
                self.config.save(&self.config_path)?;
                println!(
                    "API key for {} set to {}.",
                    self.config.active_provider,
                    self.config.active_settings()?.masked_api_key()
                );
            }
            SlashCommand::Verify => self.verify_connection().await,
            SlashCommand::Save(None) | SlashCommand::Resume(None) => {
                println!("Usage: /save <file> or /resume <file>");
            }
            SlashCommand::Save(Some(path)) => {
                self.session.save(&path)?;
                println!(
                    "Saved {} turns to {}.",
                    self.session.history().len(),
                    path.display()
                );
            }
            SlashCommand::Resume(Some(path)) => {
                self.session = Session::load(&path, self.config.ignored_paths.clone())?;
                self.loaded_context = None;
                println!(
                    "Resumed {} turns from {}.",
                    self.session.history().len(),
                    path.display()
                );
            }
            SlashCommand::Help => println!("{HELP}"),
            SlashCommand::Exit => {}
            SlashCommand::Unknown(command) => {
                println!("Unknown command: {command}. Type /help for the list of commands.");
            }
        }
        Ok(())
    }

    fn print_status(&self) {
        let settings = self.config.active_settings().ok();
        println!("provider:  {}", self.config.active_provider);
        if let Some(settings) = settings {
            println!("model:     {}", settings.model);
            println!("base url:  {}", settings.base_url);
            println!("api key:   {}", settings.masked_api_key());
        }
        match self.session.workspace() {
            Some(workspace) => println!("workspace: {}", workspace.root().display()),
            None => println!("workspace: Not Set"),
        }
        println!("turns:     {}", self.session.history().len());
        println!("loaded:    {}", self.loaded_context.is_some());
        println!("debug:     {}", self.config.debug);
    }

    /// Sends a tool-less request to check the provider settings.
    async fn verify_connection(&self) {
        println!("Verifying {}...", self.config.active_provider);
        let provider = match self.build_provider() {
            Ok(provider) => provider,
            Err(e) => {
                eprintln!("{}", style(format!("Verification failed: {e}")).red());
                return;
            }
        };

        let mut history = History::new();
        history.push(Turn::UserMessage {
            text: "Reply with a short greeting.".to_string(),
        });
        let request = GenerateRequest {
            instructions: "",
            history: &history,
            tools: &[],
            debug: self.config.debug,
        };
        match provider.generate(&request).await {
            Ok(action) => {
                println!("{}", style("Verification successful!").green());
                let reply = match action {
                    ModelAction::FinalAnswer(text) => text,
                    ModelAction::ToolCalls { text, .. } => text.unwrap_or_default(),
                };
                println!("{}", style(reply).dim());
            }
            Err(e) => eprintln!("{}", style(format!("Verification failed: {e}")).red()),
        }
    }

    /// Reads every text file of the workspace and queues it for the next prompt.
    async fn load_workspace(
        &mut self,
        stdin_receiver: &mut mpsc::Receiver<Option<String>>,
    ) -> Result<()> {
        let Some(workspace) = self.session.workspace() else {
            return Err(anyhow!(
                "INVALID_STATE: No workspace is set. Use /workspace <path> first."
            ));
        };
        let scan = workspace.text_files().map_err(|e| anyhow!("{e}"))?;
        if scan.text_files.is_empty() {
            println!("No text files found in the workspace.");
            return Ok(());
        }

        if scan.total_bytes > LOAD_WARNING_BYTES {
            println!(
                "{}",
                style(format!(
                    "The workspace holds {} bytes in {} text files. Loading it uses a large share of the model's context.",
                    scan.total_bytes,
                    scan.text_files.len()
                ))
                .yellow()
            );
            print!("{} ", style("Continue? [y/N]").dim());
            io::stdout().flush()?;
            let answer = stdin_receiver.recv().await.flatten().unwrap_or_default();
            if !answer.eq_ignore_ascii_case("y") {
                println!("Load cancelled.");
                return Ok(());
            }
        }

        let mut context = String::from(
            "The user has loaded the entire workspace. The content of every text file follows.\n",
        );
        let mut loaded = 0;
        for path in &scan.text_files {
            match workspace.read_file(path) {
                Ok(content) => {
                    context.push_str(&format!(
                        "\n--- START OF FILE {path} ---\n{content}\n--- END OF FILE {path} ---\n"
                    ));
                    loaded += 1;
                }
                Err(e) => eprintln!("{}", style(format!("Skipped {path}: {e}")).yellow()),
            }
        }

        println!(
            "{}",
            style(format!(
                "Loaded {loaded} files ({} bytes). They will be sent with your next prompt.",
                scan.total_bytes
            ))
            .green()
        );
        if !scan.skipped_binaries.is_empty() {
            println!(
                "{}",
                style(format!(
                    "Skipped {} binary files: {}",
                    scan.skipped_binaries.len(),
                    scan.skipped_binaries.join(", ")
                ))
                .dim()
            );
        }
        self.loaded_context = Some(context);
        Ok(())
    }
}

fn spawn_stdin_channel() -> mpsc::Receiver<Option<String>> {
    let (tx, rx) = mpsc::channel(1);
    tokio::spawn(async move {
        loop {
            let result = tokio::task::spawn_blocking(|| {
                let mut buffer = String::new();
                match io::stdin().read_line(&mut buffer) {
                    Ok(0) => Ok(None), // EOF (Ctrl+D)
                    Ok(_) => Ok(Some(buffer.trim().to_string())),
                    Err(e) => Err(e),
                }
            })
            .await;

            match result {
                Ok(Ok(line_opt)) => {
                    if tx.send(line_opt).await.is_err() {
                        // Receiver was dropped, so we can exit.
                        break;
                    }
                }
                _ => {
                    // An error occurred, signal EOF and exit the task.
                    tx.send(None).await.ok();
                    break;
                }
            }
        }
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_truncate_for_display() {
        assert_eq!(truncate_for_display("short", 10), "short");
        assert_eq!(truncate_for_display("äöüäöü", 3), "äöü...");
    }

    #[test]
    fn test_describe_output_prefers_message_and_drops_content() {
        assert_eq!(
            describe_output(&json!({"message": "Edited lines 1-2 of 'a.py'.", "path": "a.py"})),
            "Edited lines 1-2 of 'a.py'."
        );
        assert_eq!(
            describe_output(&json!({"path": "a.py", "lines": 3, "content": "x\ny\nz"})),
            r#"{"path":"a.py","lines":3}"#
        );
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(expand_home(Path::new("/abs")), PathBuf::from("/abs"));
        if let Some(home) = std::env::var_os("HOME") {
            assert_eq!(
                expand_home(Path::new("~/project")),
                PathBuf::from(home).join("project")
            );
        }
    }

    #[tokio::test]
    async fn test_prompt_without_workspace_is_not_sent() {
        let dir = tempfile::Builder::new()
            .prefix("autoedit-ui")
            .tempdir()
            .unwrap();
        let mut app = App::new(Config::default(), dir.path().join("config.toml"), None);
        assert!(app.run_task("do something".to_string()).await.is_none());
        assert!(app.session().history().is_empty());
    }
}
