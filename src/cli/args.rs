use std::path::PathBuf;

use acctest::config::HarnessConfig;
use acctest::scenarios::Scenario;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: ProviderCommand,
}

#[derive(Subcommand, Debug)]
pub enum ProviderCommand {
    /// AWS Cloud9 EC2 environments
    Cloud9 {
        #[command(subcommand)]
        command: Cloud9Command,
    },
}

#[derive(Subcommand, Debug)]
pub enum Cloud9Command {
    /// Create an environment, then rename it in place
    Basic(RunArgs),
    /// Create an environment with every optional argument inside a fresh VPC
    AllFields(RunArgs),
    /// Create an environment and verify it re-imports cleanly
    Import(RunArgs),
    /// Run every scenario concurrently
    All(RunArgs),
    /// Print the configuration a scenario step would apply
    Render(RenderArgs),
}

#[derive(clap::Args, Debug)]
pub struct RunArgs {
    #[arg(long, env = "AWS_REGION")]
    pub region: Option<String>,

    #[arg(long, env = "AWS_PROFILE")]
    pub profile: Option<String>,

    /// Terraform binary
    #[arg(long, env = "TF_ACC_TERRAFORM_PATH")]
    pub terraform: Option<PathBuf>,

    /// Parent directory for per-case working directories
    #[arg(long, env = "ACCTEST_WORK_DIR")]
    pub work_dir: Option<PathBuf>,

    /// Config file (defaults to the user config directory)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Resource name suffix; random when omitted
    #[arg(long)]
    pub suffix: Option<String>,

    /// Treat access-denied during destroy verification as a failure
    #[arg(long)]
    pub strict_destroy: bool,
}

impl RunArgs {
    /// Flags and environment win over the config file.
    pub fn apply_to(&self, config: &mut HarnessConfig) {
        if let Some(region) = &self.region {
            config.region = Some(region.clone());
        }
        if let Some(profile) = &self.profile {
            config.profile = Some(profile.clone());
        }
        if let Some(terraform) = &self.terraform {
            config.terraform_bin = terraform.clone();
        }
        if let Some(work_dir) = &self.work_dir {
            config.work_dir = work_dir.clone();
        }
        if self.strict_destroy {
            config.tolerate_access_revoked = false;
        }
    }
}

#[derive(clap::Args, Debug)]
pub struct RenderArgs {
    #[arg(value_enum)]
    pub scenario: Scenario,

    /// 1-based step to render
    #[arg(long, default_value_t = 1)]
    pub step: usize,

    #[arg(long)]
    pub suffix: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use serial_test::serial;

    const RUN_ENV: [&str; 4] = [
        "AWS_REGION",
        "AWS_PROFILE",
        "TF_ACC_TERRAFORM_PATH",
        "ACCTEST_WORK_DIR",
    ];

    fn parse_without_env(args: &[&str]) -> Cli {
        let backup: Vec<_> = RUN_ENV.iter().map(|k| (*k, std::env::var(k).ok())).collect();
        unsafe {
            for key in RUN_ENV {
                std::env::remove_var(key);
            }
        }

        let cli = Cli::parse_from(args.iter().copied());

        unsafe {
            for (key, value) in backup {
                if let Some(value) = value {
                    std::env::set_var(key, value);
                }
            }
        }
        cli
    }

    #[test]
    #[serial]
    fn test_basic_args_from_flags() {
        let cli = parse_without_env(&[
            "acctest",
            "cloud9",
            "basic",
            "--region=eu-west-1",
            "--terraform=/usr/local/bin/terraform",
            "--suffix=abcdefgh",
        ]);

        if let ProviderCommand::Cloud9 {
            command: Cloud9Command::Basic(args),
        } = cli.command
        {
            assert_eq!(args.region, Some("eu-west-1".to_string()));
            assert_eq!(args.terraform, Some(PathBuf::from("/usr/local/bin/terraform")));
            assert_eq!(args.suffix, Some("abcdefgh".to_string()));
            assert!(!args.strict_destroy);
        } else {
            panic!("Expected Cloud9 Basic command, got {:?}", cli.command);
        }
    }

    #[test]
    #[serial]
    fn test_no_flags_provided() {
        let cli = parse_without_env(&["acctest", "cloud9", "all"]);

        if let ProviderCommand::Cloud9 {
            command: Cloud9Command::All(args),
        } = cli.command
        {
            assert!(args.region.is_none());
            assert!(args.profile.is_none());
            assert!(args.work_dir.is_none());
        } else {
            panic!("Expected Cloud9 All command, got {:?}", cli.command);
        }
    }

    #[test]
    #[serial]
    fn test_region_from_env_var_fallback() {
        let backup = std::env::var("AWS_REGION").ok();
        unsafe {
            std::env::set_var("AWS_REGION", "ap-southeast-2");
        }

        let cli = Cli::parse_from(["acctest", "cloud9", "import"]);

        unsafe {
            match backup {
                Some(region) => std::env::set_var("AWS_REGION", region),
                None => std::env::remove_var("AWS_REGION"),
            }
        }

        if let ProviderCommand::Cloud9 {
            command: Cloud9Command::Import(args),
        } = cli.command
        {
            assert_eq!(args.region, Some("ap-southeast-2".to_string()));
        } else {
            panic!("Expected Cloud9 Import command, got {:?}", cli.command);
        }
    }

    #[test]
    #[serial]
    fn test_cli_flag_takes_precedence_over_env() {
        let backup = std::env::var("ACCTEST_WORK_DIR").ok();
        unsafe {
            std::env::set_var("ACCTEST_WORK_DIR", "/tmp/from-env");
        }

        let cli = Cli::parse_from(["acctest", "cloud9", "all-fields", "--work-dir=/tmp/from-flag"]);

        unsafe {
            match backup {
                Some(dir) => std::env::set_var("ACCTEST_WORK_DIR", dir),
                None => std::env::remove_var("ACCTEST_WORK_DIR"),
            }
        }

        if let ProviderCommand::Cloud9 {
            command: Cloud9Command::AllFields(args),
        } = cli.command
        {
            assert_eq!(args.work_dir, Some(PathBuf::from("/tmp/from-flag")));
        } else {
            panic!("Expected Cloud9 AllFields command, got {:?}", cli.command);
        }
    }

    #[test]
    #[serial]
    fn test_apply_to_overrides_config() {
        let cli = parse_without_env(&[
            "acctest",
            "cloud9",
            "basic",
            "--profile=sandbox",
            "--strict-destroy",
        ]);
        let ProviderCommand::Cloud9 {
            command: Cloud9Command::Basic(args),
        } = cli.command
        else {
            panic!("Expected Cloud9 Basic command");
        };

        let mut config = HarnessConfig {
            region: Some("us-east-1".to_string()),
            ..HarnessConfig::default()
        };
        args.apply_to(&mut config);

        assert_eq!(config.region.as_deref(), Some("us-east-1"));
        assert_eq!(config.profile.as_deref(), Some("sandbox"));
        assert!(!config.tolerate_access_revoked);
    }

    #[test]
    fn test_render_args() {
        let cli = Cli::parse_from(["acctest", "cloud9", "render", "all-fields", "--step=2"]);

        if let ProviderCommand::Cloud9 {
            command: Cloud9Command::Render(args),
        } = cli.command
        {
            assert_eq!(args.scenario, Scenario::AllFields);
            assert_eq!(args.step, 2);
            assert!(args.suffix.is_none());
        } else {
            panic!("Expected Cloud9 Render command, got {:?}", cli.command);
        }
    }
}
