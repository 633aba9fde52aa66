use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use transit_dl::{Config, PipelineManager, SubmitOptions, run_with_shutdown};

mod cli;

type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

type InputLines = Lines<BufReader<Stdin>>;

const PROMPT: &str = "Command: s (status), q (quit) or <url> <name>";

/// Walk the user through the consent page until a code is accepted
async fn authorize(manager: &PipelineManager, input: &mut InputLines) -> Result<()> {
    loop {
        println!("{}", manager.authorization_url()?);
        println!("Visit the link above and paste the authorization code:");

        let Some(code) = input.next_line().await? else {
            return Err("input closed before authorization finished".into());
        };
        if manager.exchange_code(code.trim()).await? {
            println!("Authorized");
            return Ok(());
        }
        println!("Code rejected, starting over");
    }
}

async fn print_status(manager: &PipelineManager) {
    let report = manager.status().await;
    for line in report.downloads.iter().chain(&report.uploads) {
        println!("{line}");
    }
    for block in &report.errors {
        print!("{block}");
    }
}

/// Handle one input line; returns `false` when the user asked to quit
async fn handle_command(
    manager: &PipelineManager,
    line: &str,
    options: SubmitOptions,
) -> Result<bool> {
    match line.trim() {
        "" => {}
        "s" => print_status(manager).await,
        "q" => return Ok(false),
        command => match command.split_once(char::is_whitespace) {
            Some((url, name)) => match manager.submit(url, name, options).await {
                Ok(handle) => println!("Task {} queued: {}", handle.id, handle.name),
                Err(transit_dl::Error::InvalidArgument(reason)) => println!("{reason}"),
                Err(e) => return Err(e.into()),
            },
            None => println!("{PROMPT}"),
        },
    }
    Ok(true)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();

    // Logs go to stderr so status output stays readable
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    let options = SubmitOptions {
        upload: !args.no_upload,
        delete: !args.keep,
    };

    let manager = PipelineManager::from_config(config).await?;
    manager.start().await;

    let mut input = BufReader::new(tokio::io::stdin()).lines();
    if !manager.is_authorized() && options.upload {
        authorize(&manager, &mut input).await?;
    }

    // Resolves only after a signal-driven shutdown has finished
    let on_signal = run_with_shutdown(manager.clone());
    tokio::pin!(on_signal);

    println!("{PROMPT}");
    loop {
        tokio::select! {
            result = &mut on_signal => {
                result?;
                return Ok(());
            }
            line = input.next_line() => match line? {
                Some(line) => {
                    if !handle_command(&manager, &line, options).await? {
                        break;
                    }
                }
                None => {
                    warn!("Input closed, shutting down");
                    break;
                }
            },
        }
    }

    info!("Shutting down");
    manager.shutdown().await?;
    Ok(())
}
