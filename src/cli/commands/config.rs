//! Config command - show or edit configuration

use crate::cli::args::{ConfigAction, ConfigArgs};
use crate::config::{Config, ConfigManager};
use crate::error::{ArtifactError, ArtifactResult};
use crate::ui::{self, UiContext};

/// Keys accepted by `config set`
const VALID_KEYS: &[&str] = &[
    "general.log_format",
    "general.audit_log",
    "identity.compat",
    "identity.use_flags",
    "identity.compiler",
    "identity.include_deps",
    "mirror.url",
    "mirror.timeout_secs",
    "mirror.cache_dir",
    "mirror.prefix",
    "fetch.max_concurrent",
    "fetch.rate_limit",
    "fetch.timeout_secs",
    "fetch.retries",
    "provenance.objcopy",
    "provenance.section",
    "env.passthrough",
];

/// Execute the config command
pub async fn execute(args: ConfigArgs, manager: &ConfigManager, config: &Config) -> ArtifactResult<()> {
    match args.action {
        None | Some(ConfigAction::Show) => show_config(config)?,
        Some(ConfigAction::Path) => println!("{}", manager.path().display()),
        Some(ConfigAction::Init { force }) => init_config(manager, force).await?,
        Some(ConfigAction::Set { key, value }) => set_value(manager, &key, &value).await?,
    }

    Ok(())
}

fn show_config(config: &Config) -> ArtifactResult<()> {
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

async fn init_config(manager: &ConfigManager, force: bool) -> ArtifactResult<()> {
    let ctx = UiContext::detect();
    let path = manager.path();

    if path.exists() && !force {
        ui::step_warn_hint(
            &ctx,
            &format!("Config already exists at {}", path.display()),
            "Use --force to overwrite",
        );
        return Ok(());
    }

    manager.save(&Config::default()).await?;
    ui::step_ok_detail(&ctx, "Configuration initialized", &path.display().to_string());
    Ok(())
}

async fn set_value(manager: &ConfigManager, key: &str, value: &str) -> ArtifactResult<()> {
    let ctx = UiContext::detect();

    if !VALID_KEYS.contains(&key) {
        ui::step_error_detail(&ctx, "Unknown config key", key);
        ui::remark(&ctx, &format!("Valid keys: {}", VALID_KEYS.join(", ")));
        return Err(ArtifactError::User(format!("Unknown config key: {}", key)));
    }

    manager.set_value(key, value).await?;
    ui::step_ok(&ctx, &format!("Set {} = {}", key, value));
    Ok(())
}
