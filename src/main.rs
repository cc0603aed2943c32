mod cli;

use std::sync::Arc;

use acctest::config::HarnessConfig;
use acctest::lifecycle::LifecycleRunner;
use acctest::output;
use acctest::precheck::EnvPreCheck;
use acctest::probe::cloud9::Cloud9Probe;
use acctest::render::render_all;
use acctest::scenarios::{Scenario, random_suffix};
use acctest::schema::Schema;
use acctest::terraform::TerraformCli;
use clap::Parser;
use color_eyre::eyre::{Result, bail, eyre};
use tokio::task::JoinSet;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Cloud9Command, ProviderCommand, RenderArgs, RunArgs};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        ProviderCommand::Cloud9 { command } => match command {
            Cloud9Command::Basic(args) => run(&[Scenario::Basic], args).await?,
            Cloud9Command::AllFields(args) => run(&[Scenario::AllFields], args).await?,
            Cloud9Command::Import(args) => run(&[Scenario::Import], args).await?,
            Cloud9Command::All(args) => run(&Scenario::ALL, args).await?,
            Cloud9Command::Render(args) => render(args)?,
        },
    }

    Ok(())
}

fn render(args: RenderArgs) -> Result<()> {
    let suffix = args.suffix.unwrap_or_else(random_suffix);
    let case = args.scenario.build(&suffix);
    let step = args
        .step
        .checked_sub(1)
        .and_then(|i| case.steps.get(i))
        .ok_or_else(|| eyre!("{} has {} steps", case.name, case.steps.len()))?;

    if let Some(import) = &step.import {
        println!("# step {} imports {} using the previous configuration", args.step, import.address);
        return Ok(());
    }

    let config = render_all(&step.resources, &Schema::aws())?;
    print!("{}", config.text);
    Ok(())
}

async fn run(scenarios: &[Scenario], args: RunArgs) -> Result<()> {
    let mut config = HarnessConfig::load(args.config.as_deref())?;
    args.apply_to(&mut config);
    let config = Arc::new(config);

    let sdk = config.sdk_config().await;
    let probe = Arc::new(Cloud9Probe::new(&sdk));
    let schema = Arc::new(Schema::aws());
    let pre_check = Arc::new(EnvPreCheck::acceptance(config.region.clone()));

    let mut set = JoinSet::new();
    for scenario in scenarios {
        let suffix = args.suffix.clone().unwrap_or_else(random_suffix);
        let case = scenario.build(&suffix);

        let mut applier = TerraformCli::new(&config.terraform_bin, config.work_dir.join(&case.name));
        if let Some(region) = &config.region {
            applier = applier.with_env("AWS_REGION", region);
        }
        if let Some(profile) = &config.profile {
            applier = applier.with_env("AWS_PROFILE", profile);
        }

        let runner = LifecycleRunner::new(Arc::new(applier), probe.clone(), schema.clone())
            .with_pre_check(pre_check.clone())
            .with_retry(config.retry_policy())
            .tolerate_access_revoked(config.tolerate_access_revoked);

        tracing::info!(case = %case.name, %suffix, "scheduling scenario");
        set.spawn(async move {
            let outcome = runner.run(&case).await;
            (case.name, outcome)
        });
    }

    let mut failed = 0;
    while let Some(joined) = set.join_next().await {
        let (name, outcome) = joined?;
        match outcome {
            Ok(report) => {
                println!("{}", output::case_tree(&report));
                println!("{}", output::step_table(&report));
            }
            Err(err) => {
                failed += 1;
                eprintln!("{}", output::failure_tree(&name, &err));
            }
        }
    }

    if failed > 0 {
        bail!("{failed} of {} scenarios failed", scenarios.len());
    }
    Ok(())
}
