//! Command line interface

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tracing::info;

use crate::armada::RestArmadaClient;
use crate::config::{ClientConfig, Defaults};
use crate::document::SubmissionDocument;
use crate::submit::{self, DEFAULT_POLL_INTERVAL};
use crate::Result;

/// Armada-Jupyter - run Jupyter notebooks as Armada jobs
#[derive(Parser, Debug)]
#[command(name = "armada-jupyter")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// YAML file overriding the built-in submission defaults
    #[arg(long, global = true, env = "ARMADA_JUPYTER_DEFAULTS")]
    pub defaults: Option<PathBuf>,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Translate a submission file and print the Armada requests
    Render(RenderArgs),
    /// Submit a submission file and wait for the notebooks to start
    Submit(SubmitArgs),
}

/// Arguments for `render`
#[derive(Args, Debug)]
pub struct RenderArgs {
    /// Submission file
    pub file: PathBuf,
}

/// Arguments for `submit`
#[derive(Args, Debug)]
pub struct SubmitArgs {
    /// Submission file
    pub file: PathBuf,

    /// Armada server host
    #[arg(long, env = "ARMADA_HOST", default_value = "localhost")]
    pub host: String,

    /// Armada server port
    #[arg(long, env = "ARMADA_PORT", default_value = "8080")]
    pub port: u16,

    /// Talk plain http to the Armada gateway
    #[arg(long, env = "DISABLE_SSL")]
    pub disable_ssl: bool,

    /// Seconds between event polls
    #[arg(long, default_value_t = DEFAULT_POLL_INTERVAL.as_secs())]
    pub poll_interval_secs: u64,
}

impl Cli {
    /// Run the CLI command
    pub async fn run(self) -> Result<()> {
        let defaults = match &self.defaults {
            Some(path) => Defaults::load(path)?,
            None => Defaults::default(),
        };

        match self.command {
            Commands::Render(args) => render(&args, &defaults),
            Commands::Submit(args) => run_submit(&args, &defaults).await,
        }
    }
}

fn render(args: &RenderArgs, defaults: &Defaults) -> Result<()> {
    let document = SubmissionDocument::load(&args.file, defaults)?;
    let requests = document.to_requests(defaults);
    print!("{}", serde_yaml::to_string(&requests)?);
    Ok(())
}

async fn run_submit(args: &SubmitArgs, defaults: &Defaults) -> Result<()> {
    let config = ClientConfig {
        host: args.host.clone(),
        port: args.port,
        disable_ssl: args.disable_ssl,
    };
    let client = RestArmadaClient::new(&config)?;
    info!(url = %config.base_url(), "using Armada gateway");

    let report = submit::submit_worker(
        &args.file,
        &client,
        defaults,
        Duration::from_secs(args.poll_interval_secs),
    )
    .await?;

    for job in &report.jobs {
        match &job.url {
            Some(url) => println!("{}\t{}", job.job_id, url),
            None => println!("{}\t{:?}", job.job_id, job.state),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_submit_with_flags() {
        let cli = Cli::try_parse_from([
            "armada-jupyter",
            "submit",
            "nb.yml",
            "--host",
            "armada.example.com",
            "--port",
            "443",
        ])
        .unwrap();

        let Commands::Submit(args) = cli.command else {
            panic!("expected submit");
        };
        assert_eq!(args.file, PathBuf::from("nb.yml"));
        assert_eq!(args.host, "armada.example.com");
        assert_eq!(args.port, 443);
        assert_eq!(args.poll_interval_secs, DEFAULT_POLL_INTERVAL.as_secs());
    }

    #[test]
    fn defaults_flag_is_global() {
        let cli =
            Cli::try_parse_from(["armada-jupyter", "render", "nb.yml", "--defaults", "d.yml"])
                .unwrap();
        assert_eq!(cli.defaults, Some(PathBuf::from("d.yml")));
        assert!(matches!(cli.command, Commands::Render(_)));
    }

    #[test]
    fn file_is_required() {
        assert!(Cli::try_parse_from(["armada-jupyter", "render"]).is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
