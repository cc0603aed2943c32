use std::path::{Path, PathBuf};
use std::process::Output;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::OnceCell;

use super::state::AppliedState;
use super::{Applier, ApplyError};
use crate::render::RenderedConfig;
use crate::resource::Address;

const CONFIG_FILE: &str = "main.tf";
const IMPORT_STATE_FILE: &str = "import.tfstate";
const STDERR_TAIL_LINES: usize = 20;

/// Drives the `terraform` binary inside a dedicated working directory.
///
/// One instance owns one directory; concurrent runs need separate instances.
pub struct TerraformCli {
    binary: PathBuf,
    work_dir: PathBuf,
    env: Vec<(String, String)>,
    initialized: OnceCell<()>,
}

impl TerraformCli {
    pub fn new(binary: impl Into<PathBuf>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            work_dir: work_dir.into(),
            env: Vec::new(),
            initialized: OnceCell::new(),
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    async fn write_config(&self, config: &RenderedConfig) -> Result<(), ApplyError> {
        tokio::fs::create_dir_all(&self.work_dir).await?;
        tokio::fs::write(self.work_dir.join(CONFIG_FILE), &config.text).await?;
        Ok(())
    }

    async fn ensure_init(&self) -> Result<(), ApplyError> {
        self.initialized
            .get_or_try_init(|| async {
                self.run(&["init", "-input=false", "-no-color"]).await?;
                Ok::<(), ApplyError>(())
            })
            .await?;
        Ok(())
    }

    async fn run(&self, args: &[&str]) -> Result<String, ApplyError> {
        let command = format!("terraform {}", args.join(" "));
        tracing::debug!(%command, dir = %self.work_dir.display(), "running terraform");

        let output = Command::new(&self.binary)
            .args(args)
            .current_dir(&self.work_dir)
            .env("TF_IN_AUTOMATION", "1")
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .output()
            .await
            .map_err(|source| ApplyError::Spawn {
                command: command.clone(),
                source,
            })?;

        check_status(command, output)
    }

    async fn show(&self, state_file: Option<&str>) -> Result<AppliedState, ApplyError> {
        let mut args = vec!["show", "-json", "-no-color"];
        args.extend(state_file);
        let json = self.run(&args).await?;
        Ok(AppliedState::from_show_json(&json)?)
    }
}

fn check_status(command: String, output: Output) -> Result<String, ApplyError> {
    if output.status.success() {
        return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    let tail = lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..].join("\n");

    Err(ApplyError::Command {
        command,
        status: output.status.to_string(),
        stderr: tail,
    })
}

#[async_trait]
impl Applier for TerraformCli {
    async fn apply(&self, config: &RenderedConfig) -> Result<AppliedState, ApplyError> {
        self.write_config(config).await?;
        self.ensure_init().await?;
        self.run(&["apply", "-auto-approve", "-input=false", "-no-color"])
            .await?;
        let state = self.show(None).await?;
        tracing::info!(resources = state.len(), "terraform apply complete");
        Ok(state)
    }

    async fn import(
        &self,
        address: &Address,
        id: &str,
        config: &RenderedConfig,
    ) -> Result<AppliedState, ApplyError> {
        self.write_config(config).await?;
        self.ensure_init().await?;

        let import_state = self.work_dir.join(IMPORT_STATE_FILE);
        match tokio::fs::remove_file(&import_state).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let state_flag = format!("-state={IMPORT_STATE_FILE}");
        let target = address.to_string();
        self.run(&["import", "-input=false", "-no-color", &state_flag, &target, id])
            .await?;

        let state = self.show(Some(IMPORT_STATE_FILE)).await?;
        tokio::fs::remove_file(&import_state).await?;
        tracing::info!(%address, id, "terraform import complete");
        Ok(state)
    }

    async fn destroy(&self, config: &RenderedConfig) -> Result<(), ApplyError> {
        self.write_config(config).await?;
        self.ensure_init().await?;
        self.run(&["destroy", "-auto-approve", "-input=false", "-no-color"])
            .await?;
        tracing::info!(dir = %self.work_dir.display(), "terraform destroy complete");
        Ok(())
    }

    async fn state(&self) -> Result<AppliedState, ApplyError> {
        self.ensure_init().await?;
        self.show(None).await
    }
}

impl std::fmt::Debug for TerraformCli {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys: Vec<&str> = self.env.iter().map(|(k, _)| k.as_str()).collect();
        f.debug_struct("TerraformCli")
            .field("binary", &self.binary)
            .field("work_dir", &self.work_dir)
            .field("env", &keys)
            .finish()
    }
}
