//! Extension commands: list, install, uninstall, and state transitions.

use std::path::Path;

use colored::Colorize;
use forum_extensions::{ExtensionManifest, ExtensionStatus, LifecycleManager, RegistryEntry};

use crate::auth::generate_token;
use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::state::open_lifecycle;

/// State changes that share the same command shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Enable,
    Disable,
    Reload,
    Activate,
}

impl Transition {
    fn apply(self, lifecycle: &LifecycleManager, id: &str) -> forum_extensions::Result<ExtensionManifest> {
        match self {
            Self::Enable => lifecycle.enable(id),
            Self::Disable => lifecycle.disable(id),
            Self::Reload => lifecycle.reload(id),
            Self::Activate => lifecycle.activate(id),
        }
    }

    fn past_tense(self) -> &'static str {
        match self {
            Self::Enable => "Enabled",
            Self::Disable => "Disabled",
            Self::Reload => "Reloaded",
            Self::Activate => "Activated",
        }
    }
}

fn status_label(entry: &RegistryEntry) -> colored::ColoredString {
    match entry.status {
        ExtensionStatus::Active => "active".green(),
        ExtensionStatus::Inactive => "inactive".dimmed(),
        ExtensionStatus::Error => "error".red(),
        ExtensionStatus::Loading => "loading".yellow(),
    }
}

/// Handle `forum list [--json]`
pub fn run_list(config: &ServerConfig, json: bool) -> Result<()> {
    let lifecycle = open_lifecycle(config)?;
    let entries = lifecycle.registry().entries()?;

    if json {
        let rendered = serde_json::to_string_pretty(&entries)
            .map_err(|e| Error::user(format!("failed to render listing: {e}")))?;
        println!("{rendered}");
        return Ok(());
    }

    if entries.is_empty() {
        println!("No extensions installed in {}", config.extensions.root.display());
        return Ok(());
    }

    println!("{}", "Extensions".bold());
    for entry in &entries {
        println!(
            "  {:<24} {:<8} {:<10} {:<8} {}",
            entry.id.cyan(),
            entry.extension_type.to_string(),
            entry.version,
            status_label(entry),
            entry.name
        );
        if let Some(error) = &entry.error {
            println!("    {} {}", "error:".red(), error);
        }
    }
    Ok(())
}

/// Handle `forum install <ARCHIVE> [--user ID]`
///
/// `source` may be a zip archive or an unpacked extension directory.
pub fn run_install(config: &ServerConfig, source: &Path, user: &str) -> Result<()> {
    let lifecycle = open_lifecycle(config)?;

    let manifest = if source.is_dir() {
        lifecycle.install_from_dir(source, user)?
    } else {
        let bytes = std::fs::read(source).map_err(|e| forum_extensions::Error::io(source, e))?;
        lifecycle.install(&bytes, None, user)?
    };

    println!(
        "{} Installed '{}' v{} ({})",
        "=>".blue().bold(),
        manifest.name.cyan(),
        manifest.version,
        manifest.id
    );
    println!(
        "   {} Run {} to activate it",
        "Next:".dimmed(),
        format!("forum enable {}", manifest.id).bold()
    );
    Ok(())
}

/// Handle `forum uninstall <ID>`
pub fn run_uninstall(config: &ServerConfig, id: &str) -> Result<()> {
    let lifecycle = open_lifecycle(config)?;
    lifecycle.uninstall(id)?;
    println!("{} Uninstalled '{}'", "=>".blue().bold(), id.cyan());
    Ok(())
}

/// Handle `forum enable|disable|reload|activate <ID>`
pub fn run_transition(config: &ServerConfig, id: &str, transition: Transition) -> Result<()> {
    let lifecycle = open_lifecycle(config)?;
    let manifest = transition.apply(&lifecycle, id)?;
    println!(
        "{} {} '{}' v{}",
        "=>".blue().bold(),
        transition.past_tense(),
        manifest.name.cyan(),
        manifest.version
    );
    Ok(())
}

/// Handle `forum token`
pub fn run_token() -> Result<()> {
    println!("{}", generate_token());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use forum_test_utils::{ArchiveBuilder, TestExtensions};

    fn config_for(env: &TestExtensions) -> ServerConfig {
        let mut config = ServerConfig::default();
        config.extensions.root = env.root();
        config.extensions.configs_dir = env.configs_dir();
        config
    }

    #[test]
    fn install_from_archive_file() {
        let env = TestExtensions::new();
        let archive = env.base().join("alpha.zip");
        std::fs::write(&archive, ArchiveBuilder::plugin("alpha").build()).unwrap();

        run_install(&config_for(&env), &archive, "cli").unwrap();

        env.assert_file_exists("extensions/alpha/manifest.json");
        assert_eq!(env.read_json("extensions/extensions.json")["extensions"][0]["installedBy"], "cli");
    }

    #[test]
    fn install_from_directory() {
        let env = TestExtensions::new();
        let source = env.scratch_extension("beta");

        run_install(&config_for(&env), &source, "admin").unwrap();

        env.assert_file_exists("extensions/beta/assets/style.css");
        assert_eq!(env.read_json("extensions/beta/manifest.json")["enabled"], false);
    }

    #[test]
    fn install_missing_file_is_io_error() {
        let env = TestExtensions::new();
        let err = run_install(&config_for(&env), &env.base().join("nope.zip"), "admin").unwrap_err();
        assert_eq!(err.kind(), forum_extensions::ErrorKind::Io);
    }

    #[test]
    fn transitions_update_manifest() {
        let env = TestExtensions::new();
        env.write_plugin("alpha", false);
        let config = config_for(&env);

        run_transition(&config, "alpha", Transition::Enable).unwrap();
        assert_eq!(env.read_json("extensions/alpha/manifest.json")["enabled"], true);

        run_transition(&config, "alpha", Transition::Disable).unwrap();
        assert_eq!(env.read_json("extensions/alpha/manifest.json")["enabled"], false);
    }

    #[test]
    fn activate_rejects_plugins() {
        let env = TestExtensions::new();
        env.write_plugin("alpha", false);

        let err = run_transition(&config_for(&env), "alpha", Transition::Activate).unwrap_err();

        assert_eq!(err.kind(), forum_extensions::ErrorKind::Validation);
    }

    #[test]
    fn uninstall_protected_is_forbidden() {
        let env = TestExtensions::new();
        env.write_plugin("core-editor", true);
        let mut config = config_for(&env);
        config.extensions.protected.insert("core-editor".to_string());

        let err = run_uninstall(&config, "core-editor").unwrap_err();

        assert_eq!(err.kind(), forum_extensions::ErrorKind::Forbidden);
        env.assert_file_exists("extensions/core-editor/manifest.json");
    }

    #[test]
    fn list_handles_empty_root() {
        let env = TestExtensions::new();
        run_list(&config_for(&env), false).unwrap();
        run_list(&config_for(&env), true).unwrap();
    }
}
