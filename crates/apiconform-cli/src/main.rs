//! apiconform CLI - API conformance suites with JSON and XML response checks

mod report;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use log::LevelFilter;

use apiconform_core::{
    BodyFormat, CaseStatus, Config, DiagnosticSink, DirectorySink, EntityProfile, ExpectedChecks,
    LogSink, Response, SuiteFile, validate_body,
};
use apiconform_runner::{ApiClient, SuiteRunner, obtain_challenger_token, persist_token};

const DEFAULT_CONFIG: &str = ".apiconform.toml";
const DEFAULT_SUITE: &str = "suites/api_challenges.toml";

#[derive(Parser)]
#[command(name = "apiconform")]
#[command(about = "API conformance suites with JSON and XML response verification")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, global = true, default_value = "terminal")]
    output: OutputFormat,

    /// Verbose output (debug logging)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a suite against the API
    Run {
        /// Suite file (TOML, JSON or YAML)
        #[arg(short, long, default_value = DEFAULT_SUITE)]
        suite: PathBuf,

        /// Config file (default: .apiconform.toml)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Write attachments and the run summary under this directory
        #[arg(long)]
        report_dir: Option<PathBuf>,
    },

    /// Obtain a challenger token and save it to the config file
    Token {
        /// Config file (default: .apiconform.toml)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Validate a saved response body against an entity schema
    Validate {
        /// Entity whose schema applies
        #[arg(short, long)]
        entity: EntityArg,

        /// Body format
        #[arg(short, long, default_value = "json")]
        format: FormatArg,

        /// Directory holding the XSD files (default: config `schema_dir`)
        #[arg(long)]
        schema_dir: Option<PathBuf>,

        /// Body file
        file: PathBuf,
    },

    /// Export JSON Schema for the suite format, or for an entity's JSON body
    Schema {
        #[arg(short, long)]
        entity: Option<EntityArg>,
    },

    /// Initialize config and example suite
    Init,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum EntityArg {
    Challenges,
    Todos,
}

impl EntityArg {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Challenges => "challenges",
            Self::Todos => "todos",
        }
    }

    fn profile(self, schema_dir: &Path) -> EntityProfile {
        match self {
            Self::Challenges => EntityProfile::challenges(schema_dir),
            Self::Todos => EntityProfile::todos(schema_dir),
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    Json,
    Xml,
}

impl From<FormatArg> for BodyFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Json => BodyFormat::Json,
            FormatArg::Xml => BodyFormat::Xml,
        }
    }
}

#[derive(Clone, Copy, ValueEnum, PartialEq, Eq)]
enum OutputFormat {
    Terminal,
    Json,
    Silent,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(3)
        }
    }
}

/// Config from `path` or the default locations, with `.env` and
/// environment overrides applied. Also returns the file token updates go to.
fn load_config(path: Option<&Path>) -> Result<(Config, PathBuf)> {
    let file = path
        .map(Path::to_path_buf)
        .or_else(Config::find_default)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));
    let mut cfg = if path.is_some() || file.exists() {
        Config::load(&file)?
    } else {
        Config::default()
    };
    cfg.apply_env_file(Path::new(".env"))?;
    cfg.validate()?;
    Ok((cfg, file))
}

fn init_logging(cli: &Cli, cfg: Option<&Config>) -> Result<()> {
    let level = if cli.output == OutputFormat::Silent {
        LevelFilter::Off
    } else if cli.verbose {
        LevelFilter::Debug
    } else {
        match cfg {
            Some(cfg) => cfg.level_filter()?,
            None => LevelFilter::Warn,
        }
    };
    let mut builder = env_logger::Builder::new();
    builder.filter_level(level);
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    builder.init();
    Ok(())
}

fn run(cli: Cli) -> Result<i32> {
    match &cli.command {
        Commands::Run {
            suite,
            config,
            report_dir,
        } => {
            let (cfg, _) = load_config(config.as_deref())?;
            init_logging(&cli, Some(&cfg))?;

            let suite_file = SuiteFile::load(suite)?;
            let client = ApiClient::from_config(&cfg)?;

            let session = report_dir
                .clone()
                .or_else(|| cfg.report_dir.clone())
                .map(|base| report::session_dir(&base, &cfg.base_url));
            let dir_sink = session
                .as_ref()
                .map(|dir| DirectorySink::new(dir.join("attachments")))
                .transpose()?;
            let sink: &dyn DiagnosticSink = match &dir_sink {
                Some(s) => s as &dyn DiagnosticSink,
                None => &LogSink,
            };

            if cli.output != OutputFormat::Silent {
                eprintln!("Config:");
                eprintln!("  base_url:   {}", cfg.base_url);
                eprintln!("  suite:      {}", suite.display());
                eprintln!("  schema_dir: {}", cfg.schema_dir.display());
                eprintln!(
                    "  token:      {}",
                    if cfg.x_challenger.is_some() { "set" } else { "none" }
                );
                eprintln!("  cases:      {}", suite_file.cases.len());
                eprintln!();
            }

            let start = Instant::now();
            let report = SuiteRunner::new(&client, cfg.schema_dir.clone(), sink).run(&suite_file);
            let duration_secs = start.elapsed().as_secs_f64();

            match cli.output {
                OutputFormat::Terminal => {
                    for case in &report.cases {
                        let code = case
                            .status_code
                            .map_or_else(|| "---".to_string(), |c| c.to_string());
                        let elapsed = case
                            .elapsed
                            .map_or_else(String::new, |e| format!(" {e:.3}s"));
                        println!(
                            "  [{}] {} ({}) {code}{elapsed}",
                            case.status, case.name, case.endpoint
                        );
                        if case.status != CaseStatus::Pass {
                            if let Some(msg) = &case.message {
                                println!("         {msg}");
                            }
                        }
                    }
                    let icon = if report.is_pass() { "PASS" } else { "FAIL" };
                    println!("\n{icon}: {}", report.reason());
                    println!("  Duration: {duration_secs:.2}s");
                    println!("  Exit code: {}", report.exit_code());
                }
                OutputFormat::Json => {
                    let json_output = serde_json::json!({
                        "verdict": {
                            "status": if report.is_pass() { "PASS" } else { "FAIL" },
                            "exit_code": report.exit_code(),
                            "reason": report.reason(),
                        },
                        "report": report,
                    });
                    println!("{}", serde_json::to_string_pretty(&json_output)?);
                }
                OutputFormat::Silent => {}
            }

            if let Some(dir) = &session {
                let data = report::ReportData {
                    config: &cfg,
                    suite,
                    report: &report,
                    duration_secs,
                };
                match report::save_report(dir, &data) {
                    Ok(()) => {
                        if cli.output != OutputFormat::Silent {
                            eprintln!("Report saved: {}", dir.display());
                        }
                    }
                    Err(e) => eprintln!("Warning: failed to save report: {e}"),
                }
            }

            Ok(report.exit_code())
        }

        Commands::Token { config } => {
            let (cfg, path) = load_config(config.as_deref())?;
            init_logging(&cli, Some(&cfg))?;

            let client = ApiClient::from_config(&cfg)?;
            let token = obtain_challenger_token(&client, &LogSink)?;

            // Persist into the file as written, not the env-overridden view.
            let mut file_cfg = if path.exists() {
                Config::load(&path)?
            } else {
                Config::default()
            };
            persist_token(&mut file_cfg, &path, &token)?;
            if cli.output != OutputFormat::Silent {
                println!("Token saved to {}", path.display());
            }
            Ok(0)
        }

        Commands::Validate {
            entity,
            format,
            schema_dir,
            file,
        } => {
            let schema_dir = match schema_dir {
                Some(dir) => dir.clone(),
                None => Config::load_default()?.schema_dir,
            };
            init_logging(&cli, None)?;

            let body = std::fs::read_to_string(file)
                .with_context(|| format!("cannot read {}", file.display()))?;
            let format = BodyFormat::from(*format);
            let media_type = format.media_type();
            let response = Response::new(200, body).with_header("Content-Type", media_type);
            let checks = ExpectedChecks {
                schema: true,
                request_headers: Some([("Accept".to_string(), media_type.to_string())].into()),
                ..ExpectedChecks::default()
            };
            let profile = entity.profile(&schema_dir);

            match validate_body(&response, &checks, &profile, &LogSink) {
                Ok(()) => {
                    if cli.output != OutputFormat::Silent {
                        println!(
                            "VALID: {} conforms to the {} {format} schema",
                            file.display(),
                            entity.as_str()
                        );
                    }
                    Ok(0)
                }
                Err(e) => {
                    if cli.output != OutputFormat::Silent {
                        println!("INVALID: {e}");
                    }
                    Ok(if e.is_setup_failure() { 3 } else { 1 })
                }
            }
        }

        Commands::Schema { entity } => {
            let schema = match entity {
                Some(entity) => {
                    let profile = entity.profile(Path::new("."));
                    let json = profile
                        .json_schema()
                        .map(|s| s.to_json_schema())
                        .with_context(|| format!("no JSON schema for {}", entity.as_str()))?;
                    serde_json::to_string_pretty(&json)?
                }
                None => apiconform_core::suite::generate_schema(),
            };
            println!("{schema}");
            Ok(0)
        }

        Commands::Init => {
            let targets = [
                (Path::new(DEFAULT_CONFIG), Config::example()),
                (Path::new(DEFAULT_SUITE), SuiteFile::example()),
            ];
            let mut created = 0;
            for (path, content) in targets {
                if path.exists() {
                    eprintln!("{} already exists", path.display());
                    continue;
                }
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(path, content)?;
                println!("Created {}", path.display());
                created += 1;
            }
            if created == 0 {
                return Ok(1);
            }

            println!("\nNext steps:");
            println!("  - base_url: API under test");
            println!("  - apiconform token: obtain an X-Challenger session");
            println!("  - apiconform run: execute {DEFAULT_SUITE}");
            Ok(0)
        }
    }
}
