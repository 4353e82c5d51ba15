// BANK BUILDER - turn exam PDFs into reviewed multiple-choice question banks
use anyhow::{bail, Context, Result};
use bank_builder::bank::{Bank, BankRepository, MergedEntry, Origin};
use bank_builder::config::{self, BuilderConfig, PublishConfig};
use bank_builder::pdf_extraction::image_cropper::to_data_uri;
use bank_builder::pdf_extraction::{ExtractionRouter, ImportRequest, ProgressReporter};
use bank_builder::publish::{GithubPublisher, LocalEndpointPublisher, Publisher};
use bank_builder::review::ReviewTable;
use bank_builder::storage::SqliteKv;
use bank_builder::types::{
    parse_answer, Question, QuestionEdit, QuestionRef, SectionId, CHOICE_COUNT,
    CHOICE_LETTERS,
};
use clap::{Parser, Subcommand};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const DEFAULT_REVIEW_FILE: &str = "review.json";

#[derive(Parser)]
#[command(name = "bank-builder", version, about = "Build multiple-choice question banks from exam PDFs")]
struct Cli {
    /// Config file (TOML)
    #[arg(long, global = true, default_value = config::DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Bank store (SQLite); overrides BANK_BUILDER_DB and the config file
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract candidate questions from a PDF into a review table
    Import {
        pdf: PathBuf,
        /// Skip the text layer and OCR every page
        #[arg(long)]
        ocr: bool,
        /// Never switch to OCR automatically
        #[arg(long)]
        no_auto_ocr: bool,
        /// Keep every numbered block, relying on the page crops
        #[arg(long)]
        image_only: bool,
        /// Check every row straight away
        #[arg(long)]
        select_all: bool,
        #[arg(short, long, default_value = DEFAULT_REVIEW_FILE)]
        out: PathBuf,
    },
    /// Inspect and edit a review table
    Review {
        #[arg(short, long, default_value = DEFAULT_REVIEW_FILE)]
        file: PathBuf,
        #[command(subcommand)]
        action: ReviewAction,
    },
    /// Add the checked review rows to the custom bank
    Commit {
        #[arg(short, long, default_value = DEFAULT_REVIEW_FILE)]
        file: PathBuf,
    },
    /// Add one question by hand
    Add {
        #[arg(long)]
        section: SectionId,
        #[arg(long, default_value = "general")]
        topic: String,
        #[arg(long)]
        text: String,
        #[arg(long, required = true, num_args = 4, value_names = ["A", "B", "C", "D"])]
        choices: Vec<String>,
        /// A-D or 0-3
        #[arg(long, value_parser = parse_answer)]
        answer: u8,
        /// Image file attached as a data URI
        #[arg(long)]
        image: Option<PathBuf>,
    },
    /// Show the merged bank
    List {
        #[arg(long)]
        section: Option<SectionId>,
        /// Print the merged bank as JSON
        #[arg(long)]
        json: bool,
    },
    /// Edit a question; unspecified fields keep their current value
    Edit {
        /// Reference as printed by `list`, e.g. s2/custom:0
        reference: QuestionRef,
        #[command(flatten)]
        fields: FieldArgs,
    },
    /// Remove a question (default questions are hidden, not deleted)
    Remove { reference: QuestionRef },
    /// Move a question to another section
    Move { reference: QuestionRef, to: SectionId },
    /// Drop a question's image
    ClearImage { reference: QuestionRef },
    /// Merge a bank JSON file ("-" for stdin) into the custom bank
    ImportJson { file: PathBuf },
    /// Write the custom bank as JSON
    Export {
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Empty the custom bank
    Clear {
        #[arg(long)]
        yes: bool,
    },
    /// Send the bank to a publish sink
    Publish {
        /// Publish the merged view instead of the custom bank
        #[arg(long)]
        merged: bool,
        #[command(subcommand)]
        sink: PublishTarget,
    },
    /// Give every question of a bank file a stable id
    StampIds {
        input: PathBuf,
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Replace the cached published bank, from a file or from GitHub
    RefreshPublished {
        #[arg(long)]
        file: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum ReviewAction {
    /// Print every row
    Show,
    /// Check rows (1-based numbers, or "all")
    Select { rows: Vec<String> },
    /// Uncheck rows (1-based numbers, or "all")
    Deselect { rows: Vec<String> },
    /// Change one row's fields
    Edit {
        row: usize,
        #[command(flatten)]
        fields: FieldArgs,
    },
}

#[derive(Subcommand)]
enum PublishTarget {
    /// Commit the bank file through the GitHub contents API
    Github {
        #[arg(long)]
        owner: Option<String>,
        #[arg(long)]
        repo: Option<String>,
        #[arg(long)]
        branch: Option<String>,
        #[arg(long)]
        path: Option<String>,
    },
    /// POST the bank to a local save endpoint
    Local {
        #[arg(long)]
        endpoint: Option<String>,
    },
}

#[derive(clap::Args)]
struct FieldArgs {
    #[arg(long)]
    section: Option<SectionId>,
    #[arg(long)]
    topic: Option<String>,
    #[arg(long)]
    text: Option<String>,
    #[arg(long, num_args = 4, value_names = ["A", "B", "C", "D"])]
    choices: Option<Vec<String>>,
    #[arg(long, value_parser = parse_answer)]
    answer: Option<u8>,
}

fn choice_array(choices: Vec<String>) -> Result<[String; CHOICE_COUNT]> {
    let n = choices.len();
    choices
        .try_into()
        .map_err(|_| anyhow::anyhow!("expected {} choices, got {}", CHOICE_COUNT, n))
}

impl FieldArgs {
    fn apply(&self, q: &mut Question) -> Result<()> {
        if let Some(topic) = &self.topic {
            q.topic = topic.clone();
        }
        if let Some(text) = &self.text {
            q.text = text.clone();
        }
        if let Some(choices) = &self.choices {
            q.choices = choice_array(choices.clone())?;
        }
        if let Some(answer) = self.answer {
            q.answer = answer;
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = BuilderConfig::load(&cli.config)
        .with_context(|| format!("reading config {}", cli.config.display()))?;

    match cli.command {
        Commands::Import {
            pdf,
            ocr,
            no_auto_ocr,
            image_only,
            select_all,
            out,
        } => {
            let request = ImportRequest {
                force_ocr: ocr,
                auto_ocr: !no_auto_ocr,
                image_only,
            };
            import_pdf(cfg, pdf, request, select_all, &out).await?;
        }
        Commands::Review { file, action } => review(&file, action)?,
        Commands::Commit { file } => {
            let table = ReviewTable::load(&file)?;
            let mut repo = open_repo(&cfg, cli.db)?;
            let added = table.commit(&mut repo)?;
            println!("Added {} of {} rows to the custom bank", added, table.rows.len());
        }
        Commands::Add {
            section,
            topic,
            text,
            choices,
            answer,
            image,
        } => {
            let mut question = Question {
                id: None,
                topic,
                text,
                choices: choice_array(choices)?,
                answer,
                image: None,
            }
            .tidy();
            if let Some(path) = image {
                let img = image::open(&path)
                    .with_context(|| format!("reading image {}", path.display()))?;
                question.image = Some(to_data_uri(&img.to_rgba8())?);
            }
            question.validate_complete()?;
            let mut repo = open_repo(&cfg, cli.db)?;
            let reference = repo.add_question(section, question)?;
            println!("Added {}", reference);
        }
        Commands::List { section, json } => {
            let repo = open_repo(&cfg, cli.db)?;
            if json {
                println!("{}", repo.merged().to_json_pretty()?);
            } else {
                list(&repo, section);
            }
        }
        Commands::Edit { reference, fields } => {
            let mut repo = open_repo(&cfg, cli.db)?;
            let mut question = repo.resolve(&reference)?;
            fields.apply(&mut question)?;
            let question = question.tidy();
            question.validate_complete()?;
            let edit = QuestionEdit {
                section: fields.section.unwrap_or(reference.section()),
                question,
            };
            let updated = repo.edit_question(&reference, edit)?;
            println!("Updated {}", updated);
        }
        Commands::Remove { reference } => {
            let mut repo = open_repo(&cfg, cli.db)?;
            let removed = repo.remove_question(&reference)?;
            println!("Removed {}: {}", reference, removed.text);
        }
        Commands::Move { reference, to } => {
            let mut repo = open_repo(&cfg, cli.db)?;
            let moved = repo.move_question(&reference, to)?;
            println!("Moved {} to {}", reference, moved);
        }
        Commands::ClearImage { reference } => {
            let mut repo = open_repo(&cfg, cli.db)?;
            repo.clear_image(&reference)?;
            println!("Cleared image of {}", reference);
        }
        Commands::ImportJson { file } => {
            let json = if file.as_os_str() == "-" {
                let mut buf = String::new();
                io::stdin().read_to_string(&mut buf)?;
                buf
            } else {
                fs::read_to_string(&file).with_context(|| format!("reading {}", file.display()))?
            };
            let mut repo = open_repo(&cfg, cli.db)?;
            let summary = repo.import_json(&json)?;
            println!(
                "Imported {} questions ({} duplicates skipped)",
                summary.added, summary.duplicates
            );
        }
        Commands::Export { out } => {
            let repo = open_repo(&cfg, cli.db)?;
            let json = repo.export_json()?;
            match out {
                Some(path) => {
                    fs::write(&path, json)?;
                    println!("Wrote {}", path.display());
                }
                None => println!("{}", json),
            }
        }
        Commands::Clear { yes } => {
            if !yes {
                bail!("refusing to clear the custom bank without --yes");
            }
            let mut repo = open_repo(&cfg, cli.db)?;
            repo.clear()?;
            println!("Custom bank cleared");
        }
        Commands::Publish { merged, sink } => {
            let mut repo = open_repo(&cfg, cli.db)?;
            publish(&cfg, &mut repo, sink, merged).await?;
        }
        Commands::StampIds { input, out } => {
            let json = fs::read_to_string(&input)
                .with_context(|| format!("reading {}", input.display()))?;
            let mut bank = Bank::from_json(&json)?;
            let stamped = bank.stamp_ids();
            let target = out.unwrap_or(input);
            fs::write(&target, bank.to_json_pretty()?)?;
            println!("Stamped {} ids into {}", stamped, target.display());
        }
        Commands::RefreshPublished { file } => {
            let mut repo = open_repo(&cfg, cli.db)?;
            let bank = match file {
                Some(path) => {
                    let json = fs::read_to_string(&path)
                        .with_context(|| format!("reading {}", path.display()))?;
                    Bank::from_json(&json)?
                }
                None => {
                    let publisher = github_publisher(&cfg, &repo, PublishOverrides::default())?;
                    match publisher.fetch().await? {
                        Some(bank) => bank,
                        None => bail!("{} does not exist yet", publisher.sink_name()),
                    }
                }
            };
            let count = bank.question_count();
            repo.set_published(bank)?;
            println!("Cached published bank ({} questions)", count);
        }
    }

    Ok(())
}

fn open_repo(cfg: &BuilderConfig, db: Option<PathBuf>) -> Result<BankRepository> {
    let path = db.unwrap_or_else(|| cfg.storage.resolved_db_path());
    let store = SqliteKv::open(&path)
        .with_context(|| format!("opening bank store {}", path.display()))?;
    Ok(BankRepository::open(Box::new(store))?)
}

async fn import_pdf(
    cfg: BuilderConfig,
    pdf: PathBuf,
    request: ImportRequest,
    select_all: bool,
    out: &Path,
) -> Result<()> {
    let router = ExtractionRouter::new(cfg);
    let (progress, mut rx) = ProgressReporter::channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            eprintln!("[{:>3}%] {}", event.percent, event.stage);
        }
    });

    let result = router
        .extract_file(pdf.clone(), request, progress)
        .await
        .with_context(|| format!("extracting {}", pdf.display()))?;
    let _ = printer.await;

    info!(
        method = %result.method,
        blocks = result.blocks_detected,
        misses = result.misses,
        "extraction finished"
    );
    let source = pdf
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| pdf.display().to_string());
    let mut table = ReviewTable::from_extraction(source, result);
    table.select_all(select_all);
    table.save(out)?;
    println!(
        "{} candidate questions written to {}",
        table.rows.len(),
        out.display()
    );
    Ok(())
}

fn parse_rows(rows: &[String], len: usize) -> Result<Vec<usize>> {
    if rows.iter().any(|r| r.eq_ignore_ascii_case("all")) {
        return Ok((0..len).collect());
    }
    rows.iter()
        .map(|r| {
            let n: usize = r.parse().with_context(|| format!("'{}' is not a row number", r))?;
            if n == 0 {
                bail!("rows are numbered from 1");
            }
            Ok(n - 1)
        })
        .collect()
}

fn review(file: &Path, action: ReviewAction) -> Result<()> {
    let mut table = ReviewTable::load(file)?;
    match action {
        ReviewAction::Show => {
            println!("{} ({} extraction)", table.source, table.method);
            for (i, row) in table.rows.iter().enumerate() {
                let mark = if row.include { "x" } else { " " };
                let image = if row.image.is_some() { " [image]" } else { "" };
                println!("[{}] {:>3}. {} {} {}{}", mark, i + 1, row.section, row.topic, row.text, image);
                for (i, choice) in row.choices.iter().enumerate() {
                    let key = if usize::from(row.answer) == i { "*" } else { " " };
                    println!("        {}{}) {}", key, CHOICE_LETTERS[i], choice);
                }
            }
            println!("{} of {} rows checked", table.selected_count(), table.rows.len());
            return Ok(());
        }
        ReviewAction::Select { rows } => {
            for i in parse_rows(&rows, table.rows.len())? {
                table.set_include(i, true)?;
            }
        }
        ReviewAction::Deselect { rows } => {
            for i in parse_rows(&rows, table.rows.len())? {
                table.set_include(i, false)?;
            }
        }
        ReviewAction::Edit { row, fields } => {
            let index = row.checked_sub(1).context("rows are numbered from 1")?;
            let target = table.row_mut(index)?;
            let mut question = target.to_question();
            fields.apply(&mut question)?;
            question.validate()?;
            target.topic = question.topic;
            target.text = question.text;
            target.choices = question.choices;
            target.answer = question.answer;
            if let Some(section) = fields.section {
                target.section = section;
            }
        }
    }
    table.save(file)?;
    println!("{} of {} rows checked", table.selected_count(), table.rows.len());
    Ok(())
}

fn origin_marker(entry: &MergedEntry) -> &'static str {
    match entry.origin {
        Origin::Default { .. } => "",
        Origin::Override { .. } => " (edited)",
        Origin::Custom { .. } => " (custom)",
    }
}

fn list(repo: &BankRepository, only: Option<SectionId>) {
    let view = repo.merged_view();
    for id in SectionId::ALL {
        if only.is_some_and(|s| s != id) {
            continue;
        }
        let entries = view.section(id);
        println!("{} ({} questions)", id.label(), entries.len());
        for entry in entries {
            let q = &entry.question;
            let image = if q.image.is_some() { " [image]" } else { "" };
            println!(
                "  {}  [{}] {} -> {}{}{}",
                entry.reference(),
                q.topic,
                q.text,
                q.answer_letter(),
                image,
                origin_marker(entry)
            );
        }
    }
}

#[derive(Default)]
struct PublishOverrides {
    owner: Option<String>,
    repo: Option<String>,
    branch: Option<String>,
    path: Option<String>,
}

/// Publish settings: config file, then the remembered settings, then flags.
fn github_publisher(
    cfg: &BuilderConfig,
    repo: &BankRepository,
    overrides: PublishOverrides,
) -> Result<GithubPublisher> {
    let mut settings: PublishConfig = match repo.publish_config()? {
        Some(stored) => PublishConfig {
            api_base: cfg.publish.api_base.clone(),
            endpoint: cfg.publish.endpoint.clone(),
            ..stored
        },
        None => cfg.publish.clone(),
    };
    if let Some(v) = overrides.owner {
        settings.owner = v;
    }
    if let Some(v) = overrides.repo {
        settings.repo = v;
    }
    if let Some(v) = overrides.branch {
        settings.branch = v;
    }
    if let Some(v) = overrides.path {
        settings.path = v;
    }
    let token = config::github_token()
        .with_context(|| format!("set {} to publish to GitHub", config::GITHUB_TOKEN_ENV))?;
    Ok(GithubPublisher::new(settings, token)?)
}

async fn publish(
    cfg: &BuilderConfig,
    repo: &mut BankRepository,
    sink: PublishTarget,
    merged: bool,
) -> Result<()> {
    let bank = if merged { repo.merged() } else { repo.custom().clone() };

    let (publisher, remember) = match sink {
        PublishTarget::Github {
            owner,
            repo: name,
            branch,
            path,
        } => {
            let publisher = github_publisher(
                cfg,
                repo,
                PublishOverrides {
                    owner,
                    repo: name,
                    branch,
                    path,
                },
            )?;
            let settings = publisher.settings().clone();
            (Box::new(publisher) as Box<dyn Publisher>, Some(settings))
        }
        PublishTarget::Local { endpoint } => {
            let endpoint = endpoint.unwrap_or_else(|| cfg.publish.endpoint.clone());
            (Box::new(LocalEndpointPublisher::new(endpoint)) as Box<dyn Publisher>, None)
        }
    };

    let receipt = match publisher.publish(&bank).await {
        Ok(receipt) => receipt,
        Err(e) => {
            warn!(sink = publisher.sink_name(), "publish failed: {}", e);
            return Err(e.into());
        }
    };
    if let Some(settings) = remember {
        repo.set_publish_config(&settings)?;
    }
    match receipt.revision {
        Some(rev) => println!("Published {} bytes to {} ({})", receipt.bytes, receipt.sink, rev),
        None => println!("Published {} bytes to {}", receipt.bytes, receipt.sink),
    }
    Ok(())
}
