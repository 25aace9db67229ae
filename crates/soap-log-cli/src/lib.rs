//! `soaplog` command surface.
//!
//! Trigger commands run the transcription pipeline against the `SQLite`
//! store and print a JSON report on stdout; logs go to stderr. The remaining
//! command groups seed and inspect the store.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::{Map, Value};
use soap_log_core::{
    derive_client_code, format_rfc3339, log_document_name, log_document_prefix, now_in_offset,
    parse_rfc3339, ClientCode, DocumentBody, DocumentId, DocumentMeta, Pipeline, PipelineConfig,
    Trigger,
};
use soap_log_store_sqlite::SqliteSoapStore;
use time::OffsetDateTime;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "soaplog")]
#[command(about = "Transcribes form responses into per-client SOAP note logs")]
pub struct Cli {
    #[arg(long, default_value = "./soap_log.sqlite3")]
    db: PathBuf,

    /// TOML file overriding the pipeline defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    Trigger {
        #[command(subcommand)]
        command: TriggerCommand,
    },
    Sheet {
        #[command(subcommand)]
        command: SheetCommand,
    },
    Drive {
        #[command(subcommand)]
        command: DriveCommand,
    },
    Doc {
        #[command(subcommand)]
        command: DocCommand,
    },
    Code {
        #[command(subcommand)]
        command: CodeCommand,
    },
}

#[derive(Debug, Subcommand)]
pub enum TriggerCommand {
    /// Process the most recent submission.
    FormSubmit(ClockArgs),
    /// Same selection as form-submit, fired by a manual edit.
    SheetChange(ClockArgs),
    /// Process every row from the first one without a tracking stamp (all rows when none is blank).
    Batch(ClockArgs),
    /// Reprocess one sheet row.
    Row(RowArgs),
}

#[derive(Debug, Args)]
pub struct ClockArgs {
    /// RFC3339 timestamp to use instead of the current time.
    #[arg(long)]
    now: Option<String>,
}

#[derive(Debug, Args)]
pub struct RowArgs {
    /// Spreadsheet row number; the first data row is 2.
    #[arg(long)]
    row_number: usize,
    #[command(flatten)]
    clock: ClockArgs,
}

#[derive(Debug, Subcommand)]
pub enum SheetCommand {
    Append(SheetAppendArgs),
    Show(SheetShowArgs),
}

#[derive(Debug, Args)]
pub struct SheetAppendArgs {
    /// Defaults to the configured sheet name.
    #[arg(long)]
    sheet: Option<String>,
    /// JSON object mapping question to answer.
    #[arg(long)]
    response_json: String,
    /// RFC3339 submission time used when the response has no timestamp.
    #[arg(long)]
    submitted_at: Option<String>,
}

#[derive(Debug, Args)]
pub struct SheetShowArgs {
    #[arg(long)]
    sheet: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum DriveCommand {
    AddContainer(AddContainerArgs),
    Tree,
}

#[derive(Debug, Args)]
pub struct AddContainerArgs {
    #[arg(long)]
    name: String,
}

#[derive(Debug, Subcommand)]
pub enum DocCommand {
    Show(DocShowArgs),
}

#[derive(Debug, Args)]
pub struct DocShowArgs {
    #[arg(long, conflicts_with = "name", required_unless_present = "name")]
    id: Option<String>,
    #[arg(long)]
    name: Option<String>,
    /// Print the plain text instead of the JSON body.
    #[arg(long)]
    text: bool,
}

#[derive(Debug, Subcommand)]
pub enum CodeCommand {
    Derive(CodeDeriveArgs),
}

#[derive(Debug, Args)]
pub struct CodeDeriveArgs {
    label: String,
    /// RFC3339 timestamp used to name a new log.
    #[arg(long)]
    now: Option<String>,
}

#[derive(Debug, Serialize)]
struct DerivedCode {
    label: String,
    code: Option<ClientCode>,
    document_prefix: Option<String>,
    new_log_name: String,
}

#[derive(Debug, Serialize)]
struct DocumentView {
    meta: DocumentMeta,
    body: DocumentBody,
}

/// Installs the stderr log subscriber. `RUST_LOG` overrides the `info` default.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Executes a parsed command.
///
/// # Errors
/// Returns an error when the configuration is invalid, the store cannot be
/// opened, or a support command fails. Trigger outcomes, including skips and
/// failures, are reported on stdout and are not errors.
pub fn run_cli(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;
    match cli.command {
        Command::Code {
            command: CodeCommand::Derive(args),
        } => print_json(&derive_code(&args, &config)?),
        command => {
            let mut store = SqliteSoapStore::open(&cli.db)?;
            store.migrate()?;
            run_command(command, &config, &mut store)
        }
    }
}

/// Reads `path` as TOML, or returns the defaults when no path is given.
///
/// # Errors
/// Returns an error when the file cannot be read, does not parse, or fails
/// validation.
pub fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    let config = match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            toml::from_str::<PipelineConfig>(&raw)
                .with_context(|| format!("invalid config file {}", path.display()))?
        }
        None => PipelineConfig::default(),
    };
    config
        .validate()
        .map_err(|err| anyhow!("invalid pipeline configuration: {err}"))?;
    Ok(config)
}

fn run_command(
    command: Command,
    config: &PipelineConfig,
    store: &mut SqliteSoapStore,
) -> Result<()> {
    match command {
        Command::Trigger { command } => run_trigger(command, config, store),
        Command::Sheet { command } => run_sheet(command, config, store),
        Command::Drive { command } => run_drive(command, store),
        Command::Doc { command } => run_doc(command, store),
        Command::Code { .. } => Err(anyhow!(
            "internal dispatch error: code commands should be handled before store initialization"
        )),
    }
}

fn run_trigger(
    command: TriggerCommand,
    config: &PipelineConfig,
    store: &mut SqliteSoapStore,
) -> Result<()> {
    let (trigger, clock) = match command {
        TriggerCommand::FormSubmit(clock) => (Trigger::FormSubmit, clock),
        TriggerCommand::SheetChange(clock) => (Trigger::SheetChange, clock),
        TriggerCommand::Batch(clock) => (Trigger::Batch, clock),
        TriggerCommand::Row(args) => (
            Trigger::Row {
                row_number: args.row_number,
            },
            args.clock,
        ),
    };
    let now = resolve_now(clock.now.as_deref(), config)?;

    let mut pipeline =
        Pipeline::new(store, config).map_err(|err| anyhow!("failed to start pipeline: {err}"))?;
    let report = pipeline.run(trigger, now);
    print_json(&report)
}

fn run_sheet(
    command: SheetCommand,
    config: &PipelineConfig,
    store: &SqliteSoapStore,
) -> Result<()> {
    match command {
        SheetCommand::Append(args) => {
            let sheet = args.sheet.unwrap_or_else(|| config.sheet_name.clone());
            let response = parse_response_json(&args.response_json)?;
            let submitted_at = resolve_now(args.submitted_at.as_deref(), config)?;
            let response = with_timestamp(response, &config.timestamp_column, submitted_at)?;
            let appended = store.append_response(&sheet, &response)?;
            print_json(&appended)
        }
        SheetCommand::Show(args) => {
            let sheet = args.sheet.unwrap_or_else(|| config.sheet_name.clone());
            let table = store
                .read_sheet(&sheet)?
                .ok_or_else(|| anyhow!("sheet not found: {sheet}"))?;
            print_json(&table)
        }
    }
}

fn run_drive(command: DriveCommand, store: &SqliteSoapStore) -> Result<()> {
    match command {
        DriveCommand::AddContainer(args) => {
            let container = store.add_container(&args.name)?;
            print_json(&container)
        }
        DriveCommand::Tree => print_json(&store.list_tree()?),
    }
}

fn run_doc(command: DocCommand, store: &SqliteSoapStore) -> Result<()> {
    match command {
        DocCommand::Show(args) => {
            let meta = match (args.id, args.name) {
                (Some(id), _) => store.document_meta(&DocumentId(id.clone()))?,
                (None, Some(name)) => store.find_document_by_name(&name)?,
                (None, None) => return Err(anyhow!("either --id or --name MUST be provided")),
            }
            .ok_or_else(|| anyhow!("document not found"))?;
            let body = store
                .read_document(&meta.id)?
                .ok_or_else(|| anyhow!("document {} not found", meta.id))?;

            if args.text {
                println!("{}", body.text());
                return Ok(());
            }
            print_json(&DocumentView { meta, body })
        }
    }
}

fn derive_code(args: &CodeDeriveArgs, config: &PipelineConfig) -> Result<DerivedCode> {
    let now = resolve_now(args.now.as_deref(), config)?;
    let code = derive_client_code(&args.label);
    Ok(DerivedCode {
        label: args.label.clone(),
        document_prefix: code.as_ref().map(log_document_prefix),
        new_log_name: log_document_name(code.as_ref(), now.date()),
        code,
    })
}

fn resolve_now(raw: Option<&str>, config: &PipelineConfig) -> Result<OffsetDateTime> {
    let offset = config
        .offset()
        .map_err(|err| anyhow!("invalid pipeline configuration: {err}"))?;
    match raw {
        Some(raw) => parse_rfc3339(raw)
            .map(|moment| moment.to_offset(offset))
            .map_err(|err| anyhow!("invalid --now value: {err}")),
        None => Ok(now_in_offset(offset)),
    }
}

fn parse_response_json(raw: &str) -> Result<Map<String, Value>> {
    let value: Value = serde_json::from_str(raw).context("response JSON must be valid JSON")?;
    match value {
        Value::Object(map) if !map.is_empty() => Ok(map),
        Value::Object(_) => Err(anyhow!("response JSON MUST have at least one answer")),
        _ => Err(anyhow!("response JSON MUST be an object")),
    }
}

/// Puts the timestamp answer first, filling it with `submitted_at` when the
/// response does not carry one.
fn with_timestamp(
    response: Map<String, Value>,
    timestamp_column: &str,
    submitted_at: OffsetDateTime,
) -> Result<Map<String, Value>> {
    if response.contains_key(timestamp_column) {
        return Ok(response);
    }
    let stamp = format_rfc3339(submitted_at).map_err(|err| anyhow!(err.to_string()))?;
    info!(column = timestamp_column, stamp = %stamp, "response has no timestamp; using submission time");

    let mut ordered = Map::new();
    ordered.insert(timestamp_column.to_string(), Value::String(stamp));
    ordered.extend(response);
    Ok(ordered)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;

    fn must<T>(result: Result<T>) -> T {
        match result {
            Ok(value) => value,
            Err(err) => panic!("test failure: {err:#}"),
        }
    }

    fn execute_cli(args: &[&str]) -> Result<()> {
        let cli = Cli::try_parse_from(args)?;
        run_cli(cli)
    }

    fn temp_path(stem: &str, extension: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "soap-log-cli-{stem}-{}.{extension}",
            ulid::Ulid::new()
        ))
    }

    #[test]
    fn trigger_commands_parse_with_optional_clock() {
        let cli = must(Cli::try_parse_from(["soaplog", "trigger", "form-submit"]).map_err(Into::into));
        assert!(matches!(
            cli.command,
            Command::Trigger {
                command: TriggerCommand::FormSubmit(ClockArgs { now: None })
            }
        ));

        let cli = must(
            Cli::try_parse_from([
                "soaplog",
                "trigger",
                "row",
                "--row-number",
                "5",
                "--now",
                "2024-03-15T14:05:09Z",
            ])
            .map_err(Into::into),
        );
        let Command::Trigger {
            command: TriggerCommand::Row(args),
        } = cli.command
        else {
            panic!("expected a row trigger");
        };
        assert_eq!(args.row_number, 5);
        assert_eq!(args.clock.now.as_deref(), Some("2024-03-15T14:05:09Z"));
    }

    #[test]
    fn doc_show_requires_exactly_one_selector() {
        assert!(Cli::try_parse_from(["soaplog", "doc", "show"]).is_err());
        assert!(
            Cli::try_parse_from(["soaplog", "doc", "show", "--id", "a", "--name", "b"]).is_err()
        );
        assert!(Cli::try_parse_from(["soaplog", "doc", "show", "--name", "b", "--text"]).is_ok());
    }

    #[test]
    fn config_file_overrides_defaults() {
        let path = temp_path("config", "toml");
        must(
            fs::write(
                &path,
                "sheet_name = \"Responses\"\nutc_offset = \"-05:00\"\nrequire_response_id = false\n",
            )
            .map_err(Into::into),
        );
        let config = must(load_config(Some(&path)));
        assert_eq!(config.sheet_name, "Responses");
        assert_eq!(config.utc_offset, "-05:00");
        assert!(!config.require_response_id);
        assert_eq!(config.notes_folder_name, "Session Notes (S.O.A.P.)");
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn invalid_config_files_are_rejected() {
        let unknown = temp_path("unknown-key", "toml");
        must(fs::write(&unknown, "sheet = \"typo\"\n").map_err(Into::into));
        assert!(load_config(Some(&unknown)).is_err());

        let empty_name = temp_path("empty-name", "toml");
        must(fs::write(&empty_name, "notes_folder_name = \"\"\n").map_err(Into::into));
        assert!(load_config(Some(&empty_name)).is_err());

        assert!(load_config(Some(&temp_path("missing", "toml"))).is_err());
        let _ = fs::remove_file(&unknown);
        let _ = fs::remove_file(&empty_name);
    }

    #[test]
    fn response_json_must_be_a_non_empty_object() {
        assert!(parse_response_json("[1, 2]").is_err());
        assert!(parse_response_json("{}").is_err());
        assert!(parse_response_json("{").is_err());
        let map = must(parse_response_json(r#"{"Job Code": "John S. (ABA)"}"#));
        assert_eq!(map["Job Code"], json!("John S. (ABA)"));
    }

    #[test]
    fn missing_timestamp_is_filled_and_placed_first() {
        let response = must(parse_response_json(r#"{"Job Code": "A", "Notes": "x"}"#));
        let submitted_at = must(parse_rfc3339("2024-03-15T14:05:09Z").map_err(|err| anyhow!(err)));
        let stamped = must(with_timestamp(response, "Timestamp", submitted_at));
        let keys: Vec<&str> = stamped.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["Timestamp", "Job Code", "Notes"]);
        assert_eq!(stamped["Timestamp"], json!("2024-03-15T14:05:09Z"));

        let explicit = must(parse_response_json(r#"{"Job Code": "A", "Timestamp": "3/15/2024"}"#));
        let kept = must(with_timestamp(explicit, "Timestamp", submitted_at));
        assert_eq!(kept["Timestamp"], json!("3/15/2024"));
    }

    #[test]
    fn derived_code_reports_prefix_and_new_log_name() {
        let args = CodeDeriveArgs {
            label: "John S. (ABA)".to_string(),
            now: Some("2024-03-15T14:05:09Z".to_string()),
        };
        let derived = must(derive_code(&args, &PipelineConfig::default()));
        assert_eq!(derived.code.as_ref().map(ClientCode::as_str), Some("JS"));
        assert_eq!(derived.document_prefix.as_deref(), Some("JS_SOAP_LOG_"));
        assert_eq!(derived.new_log_name, "JS_SOAP_LOG_031524");

        let args = CodeDeriveArgs {
            label: "(ABA)".to_string(),
            now: Some("2024-03-15T14:05:09Z".to_string()),
        };
        let derived = must(derive_code(&args, &PipelineConfig::default()));
        assert!(derived.code.is_none());
        assert_eq!(derived.new_log_name, "XX_SOAP_LOG_031524");
    }

    #[test]
    fn end_to_end_commands_against_temp_db() {
        let db = temp_path("e2e", "sqlite3");
        let db_arg = db.to_string_lossy().to_string();
        let run = |args: &[&str]| {
            let mut full = vec!["soaplog", "--db", db_arg.as_str()];
            full.extend_from_slice(args);
            execute_cli(&full)
        };

        must(run(&["drive", "add-container", "--name", "John S. (ABA)"]));
        must(run(&[
            "sheet",
            "append",
            "--response-json",
            r#"{"Timestamp":"3/15/2024 09:00:00","Job Code":"John S. (ABA)","Response ID":"resp-001","Session Date":"3/15/2024"}"#,
        ]));
        must(run(&["trigger", "form-submit", "--now", "2024-03-15T14:05:09Z"]));
        must(run(&["trigger", "batch"]));
        must(run(&["sheet", "show"]));
        must(run(&["drive", "tree"]));
        must(run(&["doc", "show", "--name", "JS_SOAP_LOG_031524", "--text"]));
        assert!(run(&["doc", "show", "--name", "missing"]).is_err());
        assert!(run(&["sheet", "show", "--sheet", "missing"]).is_err());
        assert!(run(&["trigger", "form-submit", "--now", "yesterday"]).is_err());

        let store = must(SqliteSoapStore::open(&db));
        let meta = store.find_document_by_name("JS_SOAP_LOG_031524");
        assert!(must(meta).is_some());
        let _ = fs::remove_file(&db);
    }
}
