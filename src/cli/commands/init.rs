//! `paygate init`: create `.paygate/` with a default config and a migrated database.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::cli::output::{output, CommandOutput};
use crate::infrastructure::setup::{
    create_config_dir, create_config_file, run_migrations, SetupPaths,
};

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Rewrite config.yaml even if it exists
    #[arg(long, short)]
    pub force: bool,

    /// Project root
    #[arg(default_value = ".")]
    pub path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DatabaseStatus {
    Created,
    Migrated,
    Untouched,
}

#[derive(Debug, Serialize)]
pub struct InitOutput {
    pub root: PathBuf,
    pub already_initialized: bool,
    pub created_dirs: Vec<PathBuf>,
    pub config_written: bool,
    pub database: DatabaseStatus,
}

impl CommandOutput for InitOutput {
    fn to_human(&self) -> String {
        if self.already_initialized {
            return format!(
                "{} is already initialized. Pass --force to rewrite the config.",
                self.root.display()
            );
        }

        let mut out = format!("Initialized paygate in {}", self.root.display());
        for dir in &self.created_dirs {
            out.push_str(&format!("\n  created {}/", dir.display()));
        }
        if self.config_written {
            out.push_str("\n  wrote .paygate/config.yaml");
        }
        match self.database {
            DatabaseStatus::Created => out.push_str("\n  created .paygate/paygate.db"),
            DatabaseStatus::Migrated => out.push_str("\n  migrated .paygate/paygate.db"),
            DatabaseStatus::Untouched => {}
        }
        out
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

fn relative_to(root: &Path, dir: PathBuf) -> PathBuf {
    dir.strip_prefix(root).map(Path::to_path_buf).unwrap_or(dir)
}

pub async fn execute(args: InitArgs, json_mode: bool) -> Result<()> {
    let root = std::env::current_dir()
        .context("Failed to get current directory")?
        .join(&args.path);
    let paths = SetupPaths::new(&root);

    let result = if paths.is_initialized() && !args.force {
        InitOutput {
            root,
            already_initialized: true,
            created_dirs: Vec::new(),
            config_written: false,
            database: DatabaseStatus::Untouched,
        }
    } else {
        let created_dirs = create_config_dir(&paths)?
            .into_iter()
            .map(|dir| relative_to(&root, dir))
            .collect();
        let config_written = create_config_file(&paths, args.force)?;
        let database = if run_migrations(&paths).await? {
            DatabaseStatus::Created
        } else {
            DatabaseStatus::Migrated
        };
        InitOutput {
            root,
            already_initialized: false,
            created_dirs,
            config_written,
            database,
        }
    };

    output(&result, json_mode);
    Ok(())
}
