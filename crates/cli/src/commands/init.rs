use anyhow::{Context, Result};
use comliner_core::{ConfigFile, ConfigLoader, OmissionPolicy, OverwritePolicy, Signature, ToolConfig};
use serde_json::Value;
use std::{env, fs, path::Path};
use tracing::info;

use crate::registry::Registry;

pub fn init_command(function: &str, cwd: Option<&Path>, force: bool) -> Result<i32> {
    let registry = Registry::builtin();
    let signature = registry
        .get(function)
        .map(|f| f.signature())
        .with_context(|| format!("unknown function '{}'", function))?;

    let dir = match cwd {
        Some(dir) => dir.to_path_buf(),
        None => env::current_dir().context("Failed to get current directory")?,
    };
    let config_path = ConfigLoader::path_for(&dir);

    let mut file = if config_path.exists() {
        ConfigLoader::load_file(&config_path)?
    } else {
        ConfigFile::default()
    };

    if file.functions.contains_key(function) && !force {
        println!(
            "❌ {} already configures '{}'",
            config_path.display(),
            function
        );
        println!("   Use --force to overwrite");
        return Ok(1);
    }

    file.functions
        .insert(function.to_string(), skeleton(signature));
    fs::write(&config_path, file.to_json()? + "\n")
        .with_context(|| format!("Failed to write config to {}", config_path.display()))?;

    info!("Created config: {}", config_path.display());
    println!("✅ Configured '{}' in {}", function, config_path.display());
    Ok(0)
}

/// Required parameters numbered `$0`, `$1`, ... and every output printed
fn skeleton(signature: &Signature) -> ToolConfig {
    let inmap = signature
        .params
        .iter()
        .filter(|p| p.is_required())
        .enumerate()
        .map(|(i, p)| (p.name.clone(), Value::String(format!("${}", i))))
        .collect();
    let outmap = signature
        .outputs
        .iter()
        .map(|slot| (slot.clone(), "#".to_string()))
        .collect();

    ToolConfig {
        inmap,
        outmap,
        missing: Some(OmissionPolicy::Fail),
        overwrite: Some(OverwritePolicy::Fail),
        close_gaps: Some(false),
        ..Default::default()
    }
}
