//! Init and Config commands.

use std::path::PathBuf;

use super::{CommandContext, emit};
use crate::config::{SETTINGS_DIR, SETTINGS_FILE};
use crate::error::{IndexError, IndexResult};
use crate::project::ProjectConfig;

/// Write a project configuration into `dir`, plus default settings at the
/// workspace root when there are none yet.
pub fn run_init(
    ctx: &CommandContext,
    unit: String,
    source_roots: Vec<PathBuf>,
    dir: PathBuf,
    force: bool,
) -> IndexResult<()> {
    let target_dir = ctx.absolute(&dir);
    let file_name = &ctx.settings.indexing.config_file_name;
    let target = target_dir.join(file_name);

    if target.exists() && !force {
        return Err(IndexError::InvalidConfiguration {
            path: target,
            reason: "already exists, use --force to overwrite".to_string(),
        });
    }
    std::fs::create_dir_all(&target_dir).map_err(|source| IndexError::FileWrite {
        path: target_dir.clone(),
        source,
    })?;

    let mut config = source_roots
        .into_iter()
        .fold(ProjectConfig::new(unit), |config, root| config.with_source_root(root));
    let written = config.save(&ctx.root, &target_dir, file_name)?;

    let settings_path = ctx.root.join(SETTINGS_DIR).join(SETTINGS_FILE);
    if !settings_path.exists() {
        ctx.settings
            .save(&settings_path)
            .map_err(|e| IndexError::InvalidConfiguration {
                path: settings_path.clone(),
                reason: e.to_string(),
            })?;
    }

    emit(&serde_json::json!({
        "config": written,
        "unit": config.unit,
        "source_roots": config.source_roots,
    }))
}

/// Display the active settings as TOML.
pub fn run_config(ctx: &CommandContext) -> IndexResult<()> {
    let toml_str = toml::to_string_pretty(&ctx.settings).map_err(|e| IndexError::InvalidConfiguration {
        path: ctx.root.join(SETTINGS_DIR).join(SETTINGS_FILE),
        reason: e.to_string(),
    })?;
    println!("{toml_str}");
    Ok(())
}
