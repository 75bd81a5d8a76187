use anyhow::{Result, bail};
use autoedit::{cli::Cli, config, ui::App};
use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "autoedit=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => config::default_path()?,
    };
    let mut config = config::load_or_create(&config_path)?;

    if let Some(provider) = &cli.provider {
        if !config.providers.contains_key(provider) {
            bail!(
                "Unknown provider '{provider}'. Known providers: {}",
                config.provider_names().join(", ")
            );
        }
        config.active_provider = provider.clone();
    }
    if let Some(model) = &cli.model {
        config.active_settings_mut()?.model = model.clone();
    }
    if let Some(max_iterations) = cli.max_iterations {
        config.max_iterations = max_iterations.max(1);
    }
    config.debug |= cli.debug;

    let mut app = App::new(config, config_path, cli.workspace);

    if let Some(prompt) = cli.prompt {
        let completed = app
            .run_task(prompt)
            .await
            .is_some_and(|outcome| outcome.is_completed());
        return Ok(if completed {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        });
    }

    app.repl().await?;
    // The stdin reader thread never returns on its own and would keep the runtime alive.
    std::process::exit(0);
}
