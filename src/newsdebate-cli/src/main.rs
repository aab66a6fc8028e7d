//! NewsDebate CLI - AI News Anchors
//!
//! Runs debates between two AI news anchors in the terminal, serves the HTTP
//! API for the browser front end and maintains the news database.

use clap::{Parser, Subcommand};
use colored::Colorize;
use newsdebate_core::config::CastingMode;
use newsdebate_core::news::display_topic;
use newsdebate_core::reddit::RedditClient;
use newsdebate_core::story_filter::{FilterOptions, filter_stories, write_news_csv};
use newsdebate_core::{
    AudioPlayer, Casting, Config, DebateConfig, DebateEvent, DebateOrchestrator, DebateOutcome,
    ElevenLabsClient, NewsQueue, OpenAiChat, Secrets, TopicGenerator, UsedIdStore,
    fixed_characters,
};
use newsdebate_server::AppState;
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "newsdebate",
    version,
    about = "AI News Anchors - Watch two AI anchors debate the headlines",
    long_about = "Two AI news anchors take opposite sides of a headline, speaking in turn with synthesized voices."
)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP API used by the browser front end
    Serve {
        /// Address to listen on, e.g. 127.0.0.1:3000
        #[arg(long, value_name = "ADDR")]
        bind: Option<String>,
    },

    /// Run a debate in the terminal
    Run {
        /// The topic to debate (defaults to the next unused headline)
        #[arg(value_name = "TOPIC")]
        topic: Option<String>,

        /// Ask the model for a lighthearted topic instead of using the news
        #[arg(long, conflicts_with = "topic")]
        generate_topic: bool,

        /// Generate a contrasting pair of characters for the topic
        #[arg(long)]
        generated_cast: bool,

        /// Maximum number of messages in the debate
        #[arg(short, long, value_name = "N")]
        max_messages: Option<usize>,

        /// Play the voices on the default audio device
        #[arg(long)]
        speaker: bool,
    },

    /// Refresh the CSV news database from Reddit's popular posts
    PopulateNews {
        /// Number of posts to fetch
        #[arg(long, default_value = "30", value_name = "N")]
        limit: usize,

        /// Number of stories to keep
        #[arg(long, default_value = "10", value_name = "N")]
        max_stories: usize,

        /// Minimum relevance score (1-10)
        #[arg(long, default_value = "7", value_name = "SCORE")]
        min_score: f64,

        /// Output path (defaults to the configured CSV database)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Print the scrolling headline ticker
    Headlines,
}

struct RunOptions {
    topic: Option<String>,
    generate_topic: bool,
    generated_cast: bool,
    max_messages: Option<usize>,
    speaker: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Load environment variables from .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = Config::load_or_default(cli.config.as_deref())?;
    let secrets = Secrets::from_env();

    match cli.command {
        Command::Serve { bind } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            newsdebate_server::serve(AppState::from_config(config, &secrets)?).await?;
        }
        Command::Run {
            topic,
            generate_topic,
            generated_cast,
            max_messages,
            speaker,
        } => {
            let options = RunOptions {
                topic,
                generate_topic,
                generated_cast,
                max_messages,
                speaker,
            };
            run_debate(config, &secrets, options).await?;
        }
        Command::PopulateNews {
            limit,
            max_stories,
            min_score,
            output,
        } => {
            let options = FilterOptions {
                min_relevance_score: min_score,
                max_stories,
            };
            populate_news(&config, &secrets, limit, options, output).await?;
        }
        Command::Headlines => {
            let queue = NewsQueue::load(&config.news, UsedIdStore::in_memory());
            println!("{}", queue.ticker());
        }
    }

    Ok(())
}

async fn run_debate(mut config: Config, secrets: &Secrets, options: RunOptions) -> Result<(), Box<dyn Error>> {
    if let Some(max) = options.max_messages {
        config.debate.max_messages = max;
    }
    if options.generated_cast {
        config.debate.casting = CastingMode::Generated;
    }

    if secrets.openai_api_key.is_none() {
        eprintln!(
            "{}",
            "Warning: OPENAI_API_KEY not set. API calls will fail.".yellow()
        );
    }
    if secrets.eleven_labs_api_key.is_none() {
        eprintln!(
            "{}",
            "Warning: ELEVEN_LABS_API_KEY not set. Speech synthesis will fail.".yellow()
        );
    }

    let chat = Arc::new(OpenAiChat::new(&config, secrets)?);
    let speech = Arc::new(ElevenLabsClient::new(
        config.elevenlabs.clone(),
        secrets.eleven_labs_api_key.clone(),
    )?);

    let topic = match options.topic {
        Some(topic) => topic,
        None if options.generate_topic => chat.generate_topic().await?,
        None => {
            let store = UsedIdStore::new(&config.news.used_ids_path);
            NewsQueue::load(&config.news, store).next_item().title
        }
    };

    let casting = match config.debate.casting {
        CastingMode::Fixed => Casting::Fixed(fixed_characters()),
        CastingMode::Generated => Casting::Generated(chat.clone()),
    };

    let orchestrator = Arc::new(
        DebateOrchestrator::new(
            DebateConfig::from_settings(&config.debate)?,
            casting,
            chat,
            speech,
            Arc::new(audio_player(options.speaker)?),
        )?
        .with_callback(create_console_callback()),
    );
    orchestrator.set_topic(topic)?;

    // Print header
    println!();
    println!("{}", "═".repeat(70).bright_blue());
    println!(
        "{}",
        format!("  {} - Live Debate", "AI News Network".bold())
            .bright_blue()
            .bold()
    );
    println!("{}", "═".repeat(70).bright_blue());

    let stopper = orchestrator.clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stopper.stop().await;
        }
    });

    let outcome = orchestrator.start().await;
    interrupt.abort();

    println!();
    println!("{}", "═".repeat(70).bright_blue());
    match outcome? {
        DebateOutcome::Done => println!("{}", "  Debate concluded.".bright_green().bold()),
        DebateOutcome::Stopped => println!("{}", "  Debate stopped.".yellow().bold()),
    }
    println!("{}", "═".repeat(70).bright_blue());
    println!();

    Ok(())
}

fn audio_player(speaker: bool) -> Result<AudioPlayer, Box<dyn Error>> {
    if !speaker {
        return Ok(AudioPlayer::headless());
    }

    #[cfg(feature = "speaker")]
    {
        let output = newsdebate_core::SpeakerOutput::open_default()?;
        Ok(AudioPlayer::new(Arc::new(output)))
    }
    #[cfg(not(feature = "speaker"))]
    {
        Err("speaker output needs a build with `--features speaker`".into())
    }
}

async fn populate_news(
    config: &Config,
    secrets: &Secrets,
    limit: usize,
    options: FilterOptions,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn Error>> {
    let reddit = RedditClient::new(config.reddit.clone())?;
    let scorer = Arc::new(OpenAiChat::new(config, secrets)?);

    println!("{}", "Fetching stories from Reddit...".bright_blue());
    let stories = reddit.fetch_top_posts(limit).await?;

    println!(
        "{}",
        format!("Filtering and analyzing {} stories...", stories.len()).bright_blue()
    );
    let kept = filter_stories(stories, scorer, options).await;

    let path = output.unwrap_or_else(|| config.news.csv_path.clone());
    write_news_csv(&path, &kept)?;
    println!(
        "{}",
        format!("Wrote {} stories to {}", kept.len(), path.display()).bright_green()
    );
    Ok(())
}

/// Create a callback that prints debate events to the console.
fn create_console_callback() -> Box<dyn Fn(DebateEvent) + Send + Sync> {
    Box::new(move |event| match event {
        DebateEvent::TopicSelected { topic } => {
            println!();
            println!("{} {}", "Topic:".bold(), display_topic(&topic).bright_white());
        }
        DebateEvent::CastReady { characters } => {
            println!();
            println!("{}", "Anchors:".bold());
            for character in &characters {
                println!(
                    "  {}. {} ({})",
                    character.slot.number(),
                    character.name.bright_cyan(),
                    character.stance().display_name().yellow()
                );
            }
            println!();
            println!("{}", "─".repeat(70).dimmed());
        }
        DebateEvent::Thinking { name, .. } => {
            println!("{}", format!("  {} is thinking...", name).dimmed());
        }
        DebateEvent::MessageAppended { slot, name, text, .. } => {
            println!();
            println!(
                "{} {} {}",
                "▶".bright_cyan(),
                name.bright_cyan().bold(),
                format!("({})", slot.stance().display_name()).yellow()
            );
            // Word wrap and indent the content
            let wrapped = textwrap(&text, 66);
            for line in wrapped.lines() {
                println!("  {}", line);
            }
        }
        DebateEvent::Notice { title, description } => {
            eprintln!("{} {}", format!("{}:", title).red().bold(), description);
        }
        DebateEvent::Stopped => {
            println!("{}", "  Stopping...".yellow());
        }
        DebateEvent::SpeakingStarted { .. }
        | DebateEvent::SpeakingFinished { .. }
        | DebateEvent::DebateEnd { .. } => {
            // Handled in run_debate
        }
    })
}

/// Simple text wrapping function.
fn textwrap(text: &str, width: usize) -> String {
    let mut result = String::new();
    let mut current_line_len = 0;

    for word in text.split_whitespace() {
        if current_line_len + word.len() + 1 > width && current_line_len > 0 {
            result.push('\n');
            current_line_len = 0;
        }
        if current_line_len > 0 {
            result.push(' ');
            current_line_len += 1;
        }
        result.push_str(word);
        current_line_len += word.len();
    }

    result
}
