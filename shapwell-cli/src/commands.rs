//! CLI subcommand handlers.

use crate::Commands;
use crate::ConfigAction;
use shapwell_core::config::WORKSPACE_CONFIG_FILE;
use shapwell_core::ShapwellConfig;
use shapwell_gateway::GatewayState;
use std::path::Path;
use std::sync::Arc;

/// Handle a CLI subcommand.
pub async fn handle_command(
    command: Commands,
    mut config: ShapwellConfig,
    workspace: &Path,
) -> anyhow::Result<()> {
    apply_overrides(&mut config, &command);
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    match command {
        Commands::Config { action } => handle_config(action, &config, workspace),
        Commands::Background { .. } => {
            config.artifacts = config.artifacts.resolved(workspace);
            handle_background(config).await
        }
        Commands::Train { .. } => {
            config.artifacts = config.artifacts.resolved(workspace);
            handle_train(config).await
        }
        Commands::Serve { .. } => {
            config.artifacts = config.artifacts.resolved(workspace);
            handle_serve(config).await
        }
    }
}

/// Apply command-line flags on top of the loaded configuration.
fn apply_overrides(config: &mut ShapwellConfig, command: &Commands) {
    match command {
        Commands::Background { count, seed } => {
            if let Some(count) = count {
                config.sampler.sample_count = *count;
            }
            if seed.is_some() {
                config.sampler.seed = *seed;
            }
        }
        Commands::Train {
            epochs,
            samples,
            seed,
            no_background,
        } => {
            if let Some(epochs) = epochs {
                config.training.epochs = *epochs;
            }
            if let Some(samples) = samples {
                config.training.samples = *samples;
            }
            if seed.is_some() {
                config.training.seed = *seed;
            }
            if *no_background {
                config.training.write_background = false;
            }
        }
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.server.host = host.clone();
            }
            if let Some(port) = port {
                config.server.port = *port;
            }
        }
        Commands::Config { .. } => {}
    }
}

/// Write a default `shapwell.toml` into the workspace unless one exists.
pub fn init_config(workspace: &Path) -> anyhow::Result<()> {
    let config_path = workspace.join(WORKSPACE_CONFIG_FILE);
    if config_path.exists() {
        println!(
            "Configuration file already exists at: {}",
            config_path.display()
        );
        return Ok(());
    }

    let toml_str = toml::to_string_pretty(&ShapwellConfig::default())?;
    std::fs::write(&config_path, &toml_str)?;
    println!(
        "Created default configuration at: {}",
        config_path.display()
    );
    Ok(())
}

fn handle_config(
    action: ConfigAction,
    config: &ShapwellConfig,
    workspace: &Path,
) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => init_config(workspace),
        ConfigAction::Show => {
            let toml_str = toml::to_string_pretty(config)?;
            println!("{}", toml_str);
            Ok(())
        }
    }
}

async fn handle_background(config: ShapwellConfig) -> anyhow::Result<()> {
    let manifest = tokio::task::spawn_blocking(move || shapwell_ml::run_sampler(&config))
        .await?
        .map_err(|e| anyhow::anyhow!("Background sampling failed: {}", e))?;
    println!(
        "Background sample of shape {} written to {} (sha256 {})",
        manifest.input_shape,
        manifest.file.display(),
        manifest.sha256
    );
    Ok(())
}

async fn handle_train(config: ShapwellConfig) -> anyhow::Result<()> {
    let outcome = tokio::task::spawn_blocking(move || shapwell_ml::run_training(&config))
        .await?
        .map_err(|e| anyhow::anyhow!("Training failed: {}", e))?;

    let report = &outcome.report;
    println!(
        "Trained {} parameters for {} of {} epochs on {} samples",
        report.parameter_count,
        report.metrics.epochs_completed,
        report.epochs_requested,
        report.train_samples
    );
    if let (Some(loss), Some(acc)) = (
        report.metrics.loss_history.last(),
        report.metrics.accuracy_history.last(),
    ) {
        println!("  final loss {:.4}, accuracy {:.3}", loss, acc);
    }
    if let Some(val) = &report.validation {
        println!(
            "  validation loss {:.4}, accuracy {:.3} ({} samples)",
            val.loss, val.accuracy, val.samples
        );
        for (signal, recall) in val.recall() {
            match recall {
                Some(r) => println!("    {:<4} recall {r:.3}", signal.label()),
                None => println!("    {:<4} recall n/a (no samples)", signal.label()),
            }
        }
    }
    if let Some(reason) = &report.stop_reason {
        println!("  stopped early: {}", reason);
    }
    println!("Model written to {}", outcome.model_manifest.file.display());
    if let Some(background) = &outcome.background_manifest {
        println!("Background sample written to {}", background.file.display());
    }
    Ok(())
}

async fn handle_serve(config: ShapwellConfig) -> anyhow::Result<()> {
    let startup = config.clone();
    let explainer = tokio::task::spawn_blocking(move || shapwell_ml::load_explainer(&startup))
        .await?
        .map_err(|e| anyhow::anyhow!("Service startup failed: {}", e))?;

    let state = GatewayState::new(Arc::new(explainer), config.server);
    shapwell_gateway::run(state)
        .await
        .map_err(|e| anyhow::anyhow!("Attribution service failed: {}", e))
}
