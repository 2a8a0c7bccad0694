mod terminal;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use url::Url;

use exam_core::Clock;
use exam_core::model::{SimulationId, UserId};
use exam_core::route::RouteTarget;
use services::{AppServices, EngineConfig, TracingTelemetry};
use storage::RemoteProgressStore;
use storage::repository::{ProgressRepository, Storage};
use storage::sample::{SampleShape, sample_questions, seed_catalog};

const ROUTE_BASE: &str = "https://exam.local/";

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingArgument { name: &'static str },
    UnknownArg(String),
    InvalidDbUrl { raw: String },
    InvalidRemote { raw: String },
    InvalidUser { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingArgument { name } => write!(f, "missing {name}"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidRemote { raw } => write!(f, "invalid --remote value: {raw}"),
            ArgsError::InvalidUser { raw } => write!(f, "invalid --user value: {raw:?}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    /// Explicit start from a route such as `/simulation/topic/3`.
    Start { route: String, fresh: bool },
    /// Continue a stored attempt by simulation id.
    Resume { id: SimulationId },
    Status,
    Seed,
}

struct Args {
    command: Command,
    db_url: String,
    remote: Option<Url>,
    user: Option<UserId>,
    premium: bool,
    config: Option<PathBuf>,
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p exam-app -- start <route> [--fresh] [options]");
    eprintln!("  cargo run -p exam-app -- resume <simulation_id> [options]");
    eprintln!("  cargo run -p exam-app -- status [options]");
    eprintln!("  cargo run -p exam-app -- seed [options]");
    eprintln!();
    eprintln!("Routes:");
    eprintln!("  /simulation/topic/<id>");
    eprintln!("  /simulation/difficulty/<easy|medium|hard>/<type>");
    eprintln!("  /simulation/story/<id>");
    eprintln!("  /simulation/set/<id>?page=<n>");
    eprintln!("  /simulation/quick/<type>?limit=<n>");
    eprintln!("  /simulation/exam");
    eprintln!("  append ?exam=1 to run any mode under exam rules");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>     SQLite URL (default: sqlite://dev.sqlite3)");
    eprintln!("  --remote <url>        Remote progress service base URL");
    eprintln!("  --user <id>           Signed-in user id for the remote tier");
    eprintln!("  --premium             Tag telemetry events as premium");
    eprintln!("  --config <path>       Engine config file (default: exam.toml)");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  EXAM_DB_URL, EXAM_REMOTE_URL, EXAM_USER_ID, EXAM_CONFIG, RUST_LOG");
}

impl Args {
    fn parse(argv: Vec<String>) -> Result<Self, ArgsError> {
        let mut args = argv.into_iter();
        let command = match args.next().as_deref() {
            Some("start") => Command::Start {
                route: require_value(&mut args, "start")?,
                fresh: false,
            },
            Some("resume") => Command::Resume {
                id: SimulationId::from_persisted(require_value(&mut args, "resume")?),
            },
            Some("status") => Command::Status,
            Some("seed") => Command::Seed,
            Some("--help" | "-h") => {
                print_usage();
                std::process::exit(0);
            }
            Some(other) => return Err(ArgsError::UnknownArg(other.to_owned())),
            None => return Err(ArgsError::MissingArgument { name: "command" }),
        };

        let mut parsed = Self {
            command,
            db_url: std::env::var("EXAM_DB_URL")
                .ok()
                .map_or_else(|| "sqlite://dev.sqlite3".into(), normalize_sqlite_url),
            remote: None,
            user: None,
            premium: false,
            config: std::env::var("EXAM_CONFIG").ok().map(PathBuf::from),
        };
        if let Ok(raw) = std::env::var("EXAM_REMOTE_URL") {
            parsed.remote = Some(parse_remote(raw)?);
        }
        if let Ok(raw) = std::env::var("EXAM_USER_ID") {
            parsed.user = Some(parse_user(raw)?);
        }

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    parsed.db_url = normalize_sqlite_url(value);
                }
                "--remote" => {
                    parsed.remote = Some(parse_remote(require_value(&mut args, "--remote")?)?);
                }
                "--user" => {
                    parsed.user = Some(parse_user(require_value(&mut args, "--user")?)?);
                }
                "--config" => {
                    parsed.config = Some(PathBuf::from(require_value(&mut args, "--config")?));
                }
                "--premium" => parsed.premium = true,
                "--fresh" => match &mut parsed.command {
                    Command::Start { fresh, .. } => *fresh = true,
                    _ => return Err(ArgsError::UnknownArg(arg)),
                },
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(parsed)
    }
}

fn parse_remote(raw: String) -> Result<Url, ArgsError> {
    Url::parse(&raw).map_err(|_| ArgsError::InvalidRemote { raw })
}

fn parse_user(raw: String) -> Result<UserId, ArgsError> {
    UserId::new(raw.clone()).ok_or(ArgsError::InvalidUser { raw })
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

type RemoteTier = Option<Arc<dyn ProgressRepository>>;

fn remote_tier(args: &Args) -> Result<RemoteTier, Box<dyn std::error::Error>> {
    match (&args.remote, &args.user) {
        (Some(base), Some(user)) => {
            let store = RemoteProgressStore::new(base.clone(), user.clone())?;
            Ok(Some(Arc::new(store)))
        }
        (Some(_), None) => {
            tracing::warn!("remote progress configured without a user; staying local-only");
            Ok(None)
        }
        _ => Ok(None),
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let argv: Vec<String> = std::env::args().skip(1).collect();
    let args = Args::parse(argv).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from("exam.toml"));
    let config = EngineConfig::load(Some(config_path.as_path()))?;

    let storage = Storage::sqlite(&args.db_url).await?;

    if args.command == Command::Seed {
        let questions = sample_questions(SampleShape::default())?;
        let set_id = seed_catalog(storage.questions.as_ref(), &questions).await?;
        println!(
            "Seeded {} questions (set {}) into {}",
            questions.len(),
            set_id,
            args.db_url
        );
        return Ok(());
    }

    let remote = remote_tier(&args)?;
    let services = AppServices::new(storage, remote, Clock::system(), config)
        .with_telemetry(Arc::new(TracingTelemetry), args.premium);

    match args.command {
        Command::Start { route, fresh } => {
            let mut url = Url::parse(ROUTE_BASE)?.join(&route)?;
            let request = services.parse_launch(&mut url)?;
            let RouteTarget::Descriptor(descriptor) = request.target else {
                return Err(format!("{route} does not name a mode; use `resume`").into());
            };
            let launch = services.launcher().start(descriptor, fresh).await?;
            if !launch.reset.is_noop() {
                println!(
                    "Cleared unfinished progress of {} other simulation(s).",
                    launch.reset.cleared.len()
                );
            }
            terminal::drive(&services, launch.url).await
        }
        Command::Resume { id } => {
            if !services.resumable(&id).await {
                println!("No unfinished progress for {id}; starting it fresh.");
            }
            let url = services.launcher().resume_url(&id)?;
            terminal::drive(&services, url).await
        }
        Command::Status => {
            let store = services.progress_store();
            let ids = store.list_ids().await?;
            if ids.is_empty() {
                println!("No stored progress.");
            }
            for id in ids {
                let Some(record) = store.read(&id).await? else {
                    continue;
                };
                let state = if record.simulation_complete() {
                    format!("complete, score {:.0}", record.score())
                } else {
                    format!(
                        "question {}/{}",
                        record.current_question_index() + 1,
                        record.total_questions()
                    )
                };
                println!("{id:<40} {state}");
            }
            Ok(())
        }
        Command::Seed => Ok(()),
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
