use std::fmt;

use storage::repository::Storage;
use storage::sample::{SampleShape, sample_questions, seed_catalog};

#[derive(Debug, Clone)]
struct Args {
    db_url: String,
    shape: SampleShape,
}

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidDbUrl { raw: String },
    InvalidCount { flag: &'static str, raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidCount { flag, raw } => write!(f, "invalid {flag} value: {raw}"),
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

fn parse_count<T: std::str::FromStr>(flag: &'static str, raw: String) -> Result<T, ArgsError> {
    raw.parse::<T>()
        .map_err(|_| ArgsError::InvalidCount { flag, raw })
}

impl Args {
    fn parse() -> Result<Self, ArgsError> {
        let mut db_url =
            std::env::var("EXAM_DB_URL").unwrap_or_else(|_| "sqlite:dev.sqlite3".into());
        let mut shape = SampleShape::default();
        if let Some(value) = std::env::var("EXAM_SEED_PER_BUCKET")
            .ok()
            .and_then(|value| value.parse::<u32>().ok())
        {
            shape.per_bucket = value;
        }

        let mut args = std::env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = value;
                }
                "--per-bucket" => {
                    let value = require_value(&mut args, "--per-bucket")?;
                    shape.per_bucket = parse_count("--per-bucket", value)?;
                }
                "--topics" => {
                    let value = require_value(&mut args, "--topics")?;
                    shape.topics = parse_count("--topics", value)?;
                }
                "--stories" => {
                    let value = require_value(&mut args, "--stories")?;
                    shape.stories = parse_count("--stories", value)?;
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self { db_url, shape })
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p storage --bin seed -- [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>         SQLite URL (default: sqlite:dev.sqlite3)");
    eprintln!("  --per-bucket <n>          Questions per difficulty/type pair (default: 15)");
    eprintln!("  --topics <n>              Number of topics to spread questions over (default: 4)");
    eprintln!("  --stories <n>             Number of reading stories (default: 3)");
    eprintln!("  -h, --help                Show this help");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  EXAM_DB_URL, EXAM_SEED_PER_BUCKET");
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse().map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let storage = Storage::sqlite(&args.db_url).await?;
    let questions = sample_questions(args.shape)?;
    let set_id = seed_catalog(storage.questions.as_ref(), &questions).await?;

    println!(
        "Seeded {} questions (set {}) into {}",
        questions.len(),
        set_id,
        args.db_url
    );

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
