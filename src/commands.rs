use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlashCommand {
    Workspace(Option<PathBuf>),
    Load,
    Clear,
    New,
    Debug,
    Status,
    Providers,
    Provider(Option<String>),
    Model(Option<String>),
    Api(Option<String>),
    Verify,
    Save(Option<PathBuf>),
    Resume(Option<PathBuf>),
    Help,
    Exit,
    Unknown(String),
}

pub const HELP: &str = "\
/workspace <path>  set the directory the agent works in (starts a new session)
/load              load every text file of the workspace into the next prompt
/clear             drop loaded file content
/new               start a new session on the same workspace
/debug             toggle printing request payloads
/status            show provider, model, key and workspace
/providers         list configured providers
/provider <name>   switch provider
/model <id>        set the model of the current provider
/api <key>         store an API key for the current provider
/verify            send a test request to the current provider
/save <file>       save the session history as JSON
/resume <file>     continue a saved session
/help              show this help
/exit              quit";

pub fn parse_slash_command(input: &str) -> Option<SlashCommand> {
    let trimmed = input.trim();
    if !trimmed.starts_with('/') {
        return None;
    }

    let (command, argument) = match trimmed.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, Some(rest.trim()).filter(|r| !r.is_empty())),
        None => (trimmed, None),
    };
    let text = || argument.map(str::to_string);
    let path = || argument.map(PathBuf::from);

    let parsed = match command {
        "/workspace" => SlashCommand::Workspace(path()),
        "/load" => SlashCommand::Load,
        "/clear" => SlashCommand::Clear,
        "/new" => SlashCommand::New,
        "/debug" => SlashCommand::Debug,
        "/status" => SlashCommand::Status,
        "/providers" => SlashCommand::Providers,
        "/provider" => SlashCommand::Provider(text()),
        "/model" => SlashCommand::Model(text()),
        "/api" => SlashCommand::Api(text()),
        "/verify" => SlashCommand::Verify,
        "/save" => SlashCommand::Save(path()),
        "/resume" => SlashCommand::Resume(path()),
        "/help" => SlashCommand::Help,
        "/exit" | "/quit" => SlashCommand::Exit,
        _ => SlashCommand::Unknown(command.to_string()),
    };

    Some(parsed)
}
