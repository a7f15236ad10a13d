//! Session flow simulator
//!
//! Drives a [`SessionFlowController`] against the in-memory collaborators and
//! prints the backstack after every scripted step.
//!
//! ```text
//! session-sim run --script push-room:!abc,replace-room:!xyz,pop,invites
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use lantern_session::testing::{FakeServices, RecordingFlowCallback, StubFeatures};
use lantern_session::{
    Destination, NetworkStatus, RoomId, SessionEvent, SessionFlowConfig, SessionFlowController,
    SessionFlowInputs, SessionId, StackOperation,
};

/// Upper bound on any single deep-link wait
const ATTACH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "session-sim")]
#[command(about = "Simulate a logged-in session flow", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a comma separated navigation script
    Run {
        /// Steps, e.g. `push-room:!abc,replace-room:!xyz,pop,invites`
        #[arg(short, long, value_delimiter = ',', required = true)]
        script: Vec<String>,

        /// Start with the network offline
        #[arg(long)]
        offline: bool,

        /// Start with onboarding pending
        #[arg(long)]
        onboarding: bool,

        /// Session id
        #[arg(long, default_value = "@sim:example.org")]
        session: String,

        /// Persisted backstack to restore from
        #[arg(long)]
        restore: Option<String>,
    },

    /// Print the effective configuration
    Config,
}

/// One scripted step
#[derive(Debug, Clone, PartialEq, Eq)]
enum Step {
    Navigate(StackOperation),
    Back,
    AttachRoot,
    AttachRoom(RoomId),
    AttachInvites,
    Emit(SessionEvent),
    Network(NetworkStatus),
    Background,
    Foreground,
    Wait(Duration),
}

fn parse_step(raw: &str) -> Result<Step> {
    let (verb, arg) = match raw.trim().split_once(':') {
        Some((verb, arg)) => (verb, Some(arg)),
        None => (raw.trim(), None),
    };
    let room = |arg: Option<&str>| -> Result<RoomId> {
        match arg {
            Some(id) if !id.is_empty() => Ok(RoomId::new(id)),
            _ => bail!("step `{raw}` needs a room id"),
        }
    };

    let step = match verb {
        "push-room" => Step::Navigate(StackOperation::Push(Destination::room(room(arg)?))),
        "replace-room" => Step::Navigate(StackOperation::Replace(Destination::room(room(arg)?))),
        "pop" => Step::Navigate(StackOperation::Pop),
        "settings" => Step::Navigate(StackOperation::Push(Destination::Settings)),
        "create-room" => Step::Navigate(StackOperation::Push(Destination::CreateRoom)),
        "home" => Step::Navigate(StackOperation::PopToRoot),
        "back" => Step::Back,
        "root" => Step::AttachRoot,
        "room" => Step::AttachRoom(room(arg)?),
        "invites" => Step::AttachInvites,
        "verify" => Step::Emit(SessionEvent::VerificationRequested),
        "online" => Step::Network(NetworkStatus::Online),
        "offline" => Step::Network(NetworkStatus::Offline),
        "stop" => Step::Background,
        "start" => Step::Foreground,
        "wait" => {
            let millis: u64 = arg
                .context("wait needs milliseconds, e.g. wait:250")?
                .parse()
                .with_context(|| format!("invalid wait in `{raw}`"))?;
            Step::Wait(Duration::from_millis(millis))
        }
        other => bail!("unknown step `{other}`"),
    };
    Ok(step)
}

fn describe(destination: &Destination) -> String {
    match destination {
        Destination::Room { room_id, .. } => format!("Room({room_id})"),
        other => other.name().to_string(),
    }
}

fn render_stack(controller: &SessionFlowController) -> String {
    let names: Vec<String> = controller
        .backstack()
        .snapshot()
        .entries()
        .iter()
        .map(|entry| describe(&entry.destination))
        .collect();
    format!("[{}]", names.join(", "))
}

async fn run_step(
    controller: &SessionFlowController,
    fakes: &FakeServices,
    step: &Step,
) -> Result<()> {
    match step {
        Step::Navigate(op) => {
            controller.navigate(op.clone())?;
        }
        Step::Back => {
            if !controller.on_back() {
                println!("  back not handled: already at the root");
            }
        }
        Step::AttachRoot => {
            let child = tokio::time::timeout(ATTACH_TIMEOUT, controller.attach_root()).await??;
            println!("  attached {}", child.node.name());
        }
        Step::AttachRoom(room_id) => {
            let child =
                tokio::time::timeout(ATTACH_TIMEOUT, controller.attach_room(room_id.clone()))
                    .await??;
            println!("  attached {}", child.node.name());
        }
        Step::AttachInvites => {
            let wait = controller.attach_invite_list(controller.session_id());
            let child = tokio::time::timeout(ATTACH_TIMEOUT, wait).await??;
            println!("  attached {}", child.node.name());
        }
        Step::Emit(event) => {
            fakes.events.emit(event.clone());
        }
        Step::Network(status) => fakes.network.set_status(*status),
        Step::Background => controller.on_stop()?,
        Step::Foreground => controller.on_start()?,
        Step::Wait(duration) => tokio::time::sleep(*duration).await,
    }
    // Let the mounter and observers catch up before printing.
    tokio::time::sleep(Duration::from_millis(10)).await;
    Ok(())
}

async fn run(
    config: SessionFlowConfig,
    script: &[String],
    offline: bool,
    onboarding: bool,
    session: String,
    restore: Option<String>,
) -> Result<()> {
    let steps = script
        .iter()
        .map(|raw| parse_step(raw))
        .collect::<Result<Vec<_>>>()?;

    let fakes = FakeServices::new();
    if offline {
        fakes.network.set_status(NetworkStatus::Offline);
    }
    fakes.onboarding.set(onboarding);
    let features = StubFeatures::new();

    let mut inputs = SessionFlowInputs::new(SessionId::new(session));
    if let Some(blob) = restore {
        inputs = inputs.with_persisted_state(blob);
    }
    let controller =
        SessionFlowController::new(config, inputs, fakes.services(), features.entry_points())?;
    let consumer = RecordingFlowCallback::new();
    controller.add_callback(consumer.clone());

    controller.on_create()?;
    controller.on_start()?;
    println!("{:<24} {}", "start", render_stack(&controller));

    for (raw, step) in script.iter().zip(&steps) {
        run_step(&controller, &fakes, step).await?;
        println!("{:<24} {}", raw, render_stack(&controller));
    }

    println!("saved state: {}", controller.save_state()?);
    if controller.lifecycle().is_started() {
        controller.on_stop()?;
    }
    controller.on_destroy()?;
    controller.wait_for_sync_stops().await;

    println!("sync commands: {:?}", fakes.sync.commands());
    println!("registry calls: {}", fakes.registry.calls().len());
    println!("nodes built: {}", features.built().len());
    if !consumer.events().is_empty() {
        println!("forwarded events: {:?}", consumer.events());
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = SessionFlowConfig::load(cli.config.as_deref()).context("loading config")?;

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Run {
            script,
            offline,
            onboarding,
            session,
            restore,
        } => run(config, &script, offline, onboarding, session, restore).await?,
        Commands::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }
    Ok(())
}
