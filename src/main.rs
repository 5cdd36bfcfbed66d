mod config;
mod export;
mod github;
mod session;
mod stats;
mod svg;
mod wait;

use anyhow::{Context, Result, bail};
use chrono::{Datelike, Local, Utc};
use clap::Parser;
use config::Config;
use github::{FetchError, FetchProgress, GithubClient};
use session::Session;
use stats::AnalysisResult;
use std::io::{IsTerminal, Write};
use std::path::PathBuf;
use svg::Theme;
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Summarize a GitHub user's repositories: top languages, top topics and
/// repositories created per month this year.
#[derive(Parser, Debug)]
#[command(name = "ghprofile", version)]
struct Cli {
    /// GitHub username to analyze (prompted for when omitted)
    username: Option<String>,

    /// Personal access token; anonymous access is limited to 60 requests/hour
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Year used for the monthly activity chart (defaults to the current year)
    #[arg(long)]
    year: Option<i32>,

    /// Directory the report files are written to
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// File name prefix (default: github_analysis_<username>)
    #[arg(long)]
    prefix: Option<String>,

    #[arg(long, value_enum)]
    theme: Option<Theme>,

    /// Print the statistics without writing any files
    #[arg(long)]
    no_export: bool,

    /// GitHub API base URL (for GitHub Enterprise)
    #[arg(long)]
    api_url: Option<String>,

    /// Config file (default: platform config dir)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Never prompt; fail instead
    #[arg(long)]
    no_prompt: bool,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn,ghprofile=info",
        1 => "ghprofile=debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = Config::load(cli.config.as_deref())?;
    let interactive = !cli.no_prompt && std::io::stdin().is_terminal();

    let input = match cli.username.clone() {
        Some(u) => u,
        None if interactive => dialoguer::Input::<String>::new()
            .with_prompt("GitHub username")
            .allow_empty(true)
            .interact_text()?,
        None => bail!("no GitHub username given"),
    };

    let mut session = Session::new();
    let username = session.begin(&input)?;

    let mut token = cli
        .token
        .clone()
        .or_else(|| std::env::var("ACCESS_TOKEN").ok())
        .or_else(|| config.token.clone())
        .filter(|t| !t.trim().is_empty());
    if token.is_none() && interactive {
        token = prompt_token()?;
    }

    let api_url = cli.api_url.clone().unwrap_or_else(|| config.api_url.clone());
    let year = cli.year.unwrap_or_else(|| Local::now().year());
    let mut reprompted = false;

    let result = loop {
        if token.is_none() {
            warn!("no token: using guest access (60 requests/hour)");
        }
        let client = GithubClient::new(&api_url, token.clone(), &config.user_agent)?;

        let outcome = match validate(&client).await {
            Ok(()) => run_analysis(client, username.clone(), year).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(result) => break result,
            Err(AnalysisFailure::Fetch(FetchError::Auth)) if interactive && !reprompted => {
                warn!("the GitHub token was rejected; enter a new one");
                reprompted = true;
                token = prompt_token()?;
            }
            Err(failure) => {
                session.abort();
                return Err(failure.into_report());
            }
        }
    };

    session.complete(result);
    let Some(result) = session.result() else {
        bail!("analysis finished without a result");
    };
    print_summary(result);

    if !cli.no_export {
        let dir = cli.output_dir.clone().unwrap_or_else(|| config.output_dir.clone());
        let prefix = cli
            .prefix
            .clone()
            .unwrap_or_else(|| export::default_prefix(&result.subject_username));
        let theme = cli.theme.unwrap_or(config.theme);

        let written = export::export_report(result, &dir, &prefix, theme)?;
        println!("\nReport saved as:");
        for path in written {
            println!("  {}", path.display());
        }
    }

    session.clear();
    Ok(())
}

enum AnalysisFailure {
    Fetch(FetchError),
    Cancelled,
    Other(anyhow::Error),
}

impl AnalysisFailure {
    fn into_report(self) -> anyhow::Error {
        match self {
            AnalysisFailure::Fetch(FetchError::RateLimited { reset_at }) => anyhow::anyhow!(
                "GitHub API limit exceeded. {}",
                wait::wait_message(reset_at, Utc::now(), &Local)
            ),
            AnalysisFailure::Fetch(FetchError::Auth) => anyhow::anyhow!(
                "The GitHub token is invalid. Update it with --token, GITHUB_TOKEN or the config file."
            ),
            AnalysisFailure::Fetch(e) => anyhow::Error::new(e).context("Analysis failed"),
            AnalysisFailure::Cancelled => anyhow::anyhow!("Analysis cancelled"),
            AnalysisFailure::Other(e) => e,
        }
    }
}

async fn validate(client: &GithubClient) -> Result<(), AnalysisFailure> {
    session::check_token(client)
        .await
        .map(|_| ())
        .map_err(AnalysisFailure::Fetch)
}

/// Run fetch+aggregate as a background task, drawing progress on stderr.
/// Ctrl-C cancels the task.
async fn run_analysis(
    client: GithubClient,
    username: String,
    year: i32,
) -> Result<AnalysisResult, AnalysisFailure> {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    let mut task = tokio::spawn(async move {
        session::analyze(&client, &username, year, Some(&tx)).await
    });

    let printer = tokio::spawn(async move {
        let mut expected: Option<u64> = None;
        while let Some(event) = rx.recv().await {
            draw_progress(&event, &mut expected);
        }
        eprintln!();
    });

    let outcome = tokio::select! {
        joined = &mut task => match joined {
            Ok(res) => res.map_err(AnalysisFailure::Fetch),
            Err(e) => Err(AnalysisFailure::Other(
                anyhow::Error::new(e).context("analysis task failed"),
            )),
        },
        _ = tokio::signal::ctrl_c() => {
            task.abort();
            Err(AnalysisFailure::Cancelled)
        }
    };

    // The sender lives in the task, so the printer ends once the task is gone.
    let _ = printer.await;
    outcome
}

fn draw_progress(event: &FetchProgress, expected: &mut Option<u64>) {
    match event {
        FetchProgress::UserResolved {
            login,
            public_repos,
        } => {
            *expected = *public_repos;
            eprint!("\rResolved {login}");
        }
        FetchProgress::Page { page, fetched } => match expected {
            Some(total) => eprint!("\rPage {page}: {fetched}/{total} repositories"),
            None => eprint!("\rPage {page}: {fetched} repositories"),
        },
        FetchProgress::Topics { done, total } => {
            eprint!("\rTopics: {done}/{total} repositories          ");
        }
    }
    let _ = std::io::stderr().flush();
}

fn prompt_token() -> Result<Option<String>> {
    let token = dialoguer::Password::new()
        .with_prompt("GitHub token (empty for guest access)")
        .allow_empty_password(true)
        .interact()
        .context("Failed to read token")?;
    let token = token.trim().to_string();
    Ok((!token.is_empty()).then_some(token))
}

fn print_summary(result: &AnalysisResult) {
    println!("General statistics for {}", result.subject_username);

    println!("\nTop languages:");
    if result.language_counts.is_empty() {
        println!("  (none)");
    }
    for (lang, n) in &result.language_counts {
        println!("  {lang:<20} {n}");
    }

    if !result.topic_counts.is_empty() {
        println!("\nTop topics:");
        for (topic, n) in &result.topic_counts {
            println!("  {topic:<20} {n}");
        }
    }

    println!("\nActivity analysis for {}", result.subject_username);
    if result.monthly_activity.is_empty() {
        println!("  No new repositories in {}", result.analysis_year);
    } else {
        println!("  New repositories in {}:", result.analysis_year);
        for (month, n) in &result.monthly_activity {
            println!("  {month}  {n}");
        }
    }
}
