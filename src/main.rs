use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, anyhow};
use clap::{Parser, Subcommand};
use tracing::info;

use waav_call::{
    CallConfig, CallSettings, GeminiAssistant, GeminiLive, MessageKind, PersonaDirectory,
    SystemClock, VoiceCall, VoiceProfile, WavFileCapture, WavPlaybackSink, format_call_duration,
    respond,
};
use waav_call::core::audio::{Clock, PLAYBACK_SAMPLE_RATE};

/// WaaV Call - Realtime voice calls with AI personas
#[derive(Parser, Debug)]
#[command(name = "waav-call")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Subcommand to run
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the available contacts
    Contacts,

    /// Place a voice call, streaming a WAV file as the microphone
    Call {
        /// Contact id to call
        #[arg(long, default_value = "1")]
        contact: String,

        /// 16kHz mono WAV file used as microphone input
        #[arg(short = 'i', long = "input")]
        input: PathBuf,

        /// Where to write the received audio (24kHz mono WAV)
        #[arg(short = 'o', long = "output")]
        output: PathBuf,

        /// Voice name (overrides configuration)
        #[arg(long)]
        voice: Option<String>,

        /// Mute the microphone after this many seconds
        #[arg(long, value_name = "SECS")]
        mute_after: Option<u64>,

        /// Hang up after this many seconds
        #[arg(long, value_name = "SECS", default_value_t = 60)]
        max_duration: u64,
    },

    /// Send one text message to a contact and print the reply
    Chat {
        /// Contact id
        #[arg(long, default_value = "1")]
        contact: String,

        /// Message kind: text, image, audio or video
        #[arg(long, default_value = "text")]
        kind: String,

        /// Message text
        message: String,
    },
}

fn parse_kind(kind: &str) -> anyhow::Result<MessageKind> {
    match kind.trim().to_lowercase().as_str() {
        "text" => Ok(MessageKind::Text),
        "image" => Ok(MessageKind::Image),
        "audio" => Ok(MessageKind::Audio),
        "video" => Ok(MessageKind::Video),
        other => anyhow::bail!(
            "Invalid message kind '{}'. Must be text, image, audio or video",
            other
        ),
    }
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<CallConfig> {
    match path {
        Some(config_path) => {
            info!("Loading configuration from {}", config_path.display());
            CallConfig::from_file(&config_path)
                .with_context(|| format!("Failed to load {}", config_path.display()))
        }
        None => CallConfig::from_env().context("Failed to load configuration from environment"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (must be done before config loading)
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Initialize crypto provider for TLS connections
    // This must be done before any TLS connections are attempted
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();
    let directory = PersonaDirectory::built_in();

    match cli.command {
        Commands::Contacts => {
            for persona in directory.all() {
                let status = persona
                    .last_seen
                    .clone()
                    .unwrap_or_else(|| persona.presence.to_string());
                let kind = if persona.is_group { "group" } else { "contact" };
                println!("{:<8} {:<22} {:<8} {}", persona.id, persona.name, kind, status);
            }
            Ok(())
        }

        Commands::Chat {
            contact,
            kind,
            message,
        } => {
            let config = load_config(cli.config)?;
            let persona = directory
                .get(&contact)
                .ok_or_else(|| anyhow!("Unknown contact '{}'", contact))?;
            let kind = parse_kind(&kind)?;

            let assistant = GeminiAssistant::from_config(&config)?;
            let reply = respond(&assistant, persona, &message, kind).await?;

            let sender = directory
                .get(&reply.sender_id)
                .map(|p| p.name.as_str())
                .unwrap_or("Unknown");
            println!("{}: {}", sender, reply.text);
            if let Some(url) = reply.image_url {
                println!("[image] {}", url);
            }
            Ok(())
        }

        Commands::Call {
            contact,
            input,
            output,
            voice,
            mute_after,
            max_duration,
        } => {
            let config = load_config(cli.config)?;
            let persona = directory
                .get(&contact)
                .ok_or_else(|| anyhow!("Unknown contact '{}'", contact))?;
            let voice = match voice {
                Some(name) => VoiceProfile::new(name),
                None => VoiceProfile::new(config.gemini_voice().as_str()),
            };

            let transport = Arc::new(GeminiLive::new(
                config.require_api_key()?,
                config.live_url.clone(),
            )?);
            let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
            let sink = Arc::new(WavPlaybackSink::new(clock.clone(), PLAYBACK_SAMPLE_RATE));

            let call = VoiceCall::new(
                transport,
                Box::new(WavFileCapture::new(&input)),
                sink.clone(),
                clock,
                CallSettings::from(&config),
            );

            println!("Calling {} ({})...", persona.name, voice.name);
            call.start(persona, voice).await?;

            let mute_timer = async {
                match mute_after {
                    Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
                    None => std::future::pending::<()>().await,
                }
            };
            tokio::pin!(mute_timer);
            let deadline = tokio::time::sleep(Duration::from_secs(max_duration));
            tokio::pin!(deadline);

            loop {
                tokio::select! {
                    _ = call.ended() => break,
                    _ = &mut mute_timer, if !call.is_muted() => {
                        call.mute(true);
                        println!("Microphone muted");
                    }
                    _ = &mut deadline => {
                        info!("Maximum call duration reached");
                        break;
                    }
                    _ = tokio::signal::ctrl_c() => {
                        info!("Interrupted, hanging up");
                        break;
                    }
                }
            }

            call.end().await;
            call.join().await;

            sink.write_wav(&output)
                .with_context(|| format!("Failed to write {}", output.display()))?;

            let stats = call.stats();
            println!(
                "Call ended after {} ({} frames sent, {} muted, {} buffers received)",
                format_call_duration(stats.duration),
                stats.frames_sent,
                stats.frames_muted,
                stats.buffers_scheduled
            );
            println!("Received audio written to {}", output.display());

            match call.last_error() {
                Some(err) => Err(anyhow!("Call failed: {}", err)),
                None => Ok(()),
            }
        }
    }
}
