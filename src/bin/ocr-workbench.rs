//! CLI binary for edgequake-ocr-workbench.
//!
//! A thin shim over [`OcrService`]: submit jobs, poll them behind a progress
//! bar, print or write the resulting Markdown.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use edgequake_ocr_workbench::batch::plan;
use edgequake_ocr_workbench::{
    JobSnapshot, JobStatus, OcrService, PageRenderer, PdfiumRenderer, ProcessorConfig,
    PromptStyle, ServiceConfig, WindowFailurePolicy,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Whole document to stdout (first 10 pages)
  ocr-workbench convert paper.pdf --max-pages 10

  # Pages 21-40 to a file, two-column layout
  ocr-workbench --two-column convert paper.pdf --start-page 21 --max-pages 20 -o part.md

  # Split a book into 10-page batches, run all, combine
  ocr-workbench batches book.pdf --batch-size 10

  # Only batches 0 and 3
  ocr-workbench batches book.pdf --only 0 --only 3

  # Show the batch plan (no API key needed)
  ocr-workbench plan book.pdf --batch-size 10

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to libpdfium (file or directory)
  RUST_LOG                Log filter, overrides --verbose / --quiet
"#;

#[derive(Parser, Debug)]
#[command(
    name = "ocr-workbench",
    version,
    about = "OCR PDFs to Markdown with Vision LLMs, as pollable jobs and batches",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct GlobalArgs {
    /// Vision model. Default: gpt-4.1-nano.
    #[arg(long, global = true, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider. Auto-detected from API key env vars if not set.
    #[arg(long, global = true, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Pages per OCR call. 1 is strongly recommended.
    #[arg(long, global = true, env = "OCR_CHUNK_SIZE", default_value_t = 1)]
    chunk_size: usize,

    /// Use the two-column reading-order prompt.
    #[arg(long, global = true)]
    two_column: bool,

    /// Write an HTML comment where a window failed instead of omitting it.
    #[arg(long, global = true)]
    mark_failures: bool,

    /// Where result files are written.
    #[arg(long, global = true, env = "OCR_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    #[arg(long, global = true, env = "OCR_PASSWORD")]
    password: Option<String>,

    #[arg(long, global = true, env = "OCR_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    #[arg(long, global = true, env = "OCR_MAX_TOKENS", default_value_t = 16000)]
    max_tokens: usize,

    /// Print the terminal job snapshot(s) as JSON.
    #[arg(long, global = true)]
    json: bool,

    #[arg(long, global = true)]
    no_progress: bool,

    #[arg(short, long, global = true)]
    verbose: bool,

    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// OCR a page range of one document (local path or URL).
    Convert {
        input: String,

        /// First page, 1-indexed.
        #[arg(long)]
        start_page: Option<usize>,

        #[arg(long)]
        max_pages: Option<usize>,

        /// Write Markdown here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Split a document into batches, run them, and combine the output.
    Batches {
        input: PathBuf,

        #[arg(long, default_value_t = 5)]
        batch_size: usize,

        /// Run only these batch indices (0-based). Repeatable.
        #[arg(long)]
        only: Vec<usize>,

        /// Batches running at once.
        #[arg(long, default_value_t = 2)]
        concurrency: usize,
    },

    /// Print the batch plan of a document.
    Plan {
        input: PathBuf,

        #[arg(long, default_value_t = 5)]
        batch_size: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let g = &cli.global;

    // The progress bar is the user-facing feedback; keep library logs quiet
    // under it unless asked.
    let show_progress = !g.quiet && !g.no_progress && !g.json;
    let filter = if g.verbose {
        "debug"
    } else if g.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match &cli.command {
        Command::Plan { input, batch_size } => {
            let renderer = PdfiumRenderer::new(2.0, 4000);
            let total = renderer
                .page_count(input)
                .await
                .with_context(|| format!("Failed to open {}", input.display()))?;
            let batches = plan(total, *batch_size)?;
            println!("{}", serde_json::to_string_pretty(&batches)?);
            Ok(())
        }
        Command::Convert {
            input,
            start_page,
            max_pages,
            output,
        } => {
            let service = build_service(g, None)?;
            let ticket = service
                .submit_document(input, *start_page, *max_pages)
                .await
                .with_context(|| format!("Could not start OCR of {input}"))?;
            if !g.quiet {
                eprintln!(
                    "{} {}",
                    cyan("◆"),
                    bold(&format!(
                        "OCR pages {}-{} of {}",
                        ticket.start_page,
                        ticket.start_page + ticket.page_count - 1,
                        ticket.total_pages
                    ))
                );
            }

            let bar = show_progress.then(|| page_bar(ticket.total_pages));
            let done = watch(&service, &ticket.job_id, bar.as_ref()).await?;
            report(g, &done)?;
            if done.status != JobStatus::Complete {
                bail!("OCR failed: {}", done.message);
            }

            let reference = done
                .result
                .clone()
                .context("Job finished without a result")?;
            let markdown = service.read_result(&reference).await?;
            match output {
                Some(path) => {
                    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::write(path, &markdown)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    if !g.quiet {
                        eprintln!("{} Written to {}", green("✔"), path.display());
                    }
                }
                None => {
                    let mut stdout = io::stdout().lock();
                    stdout.write_all(markdown.as_bytes())?;
                    stdout.flush()?;
                }
            }
            Ok(())
        }
        Command::Batches {
            input,
            batch_size,
            only,
            concurrency,
        } => {
            let service = build_service(g, Some(*concurrency))?;
            let bytes = std::fs::read(input)
                .with_context(|| format!("Failed to read {}", input.display()))?;
            let filename = input
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "document.pdf".to_string());
            let receipt = service
                .upload_document(&filename, &bytes, Some(*batch_size))
                .await?;
            if !g.quiet {
                eprintln!(
                    "{} {} pages in {} batch(es)",
                    cyan("◆"),
                    receipt.total_pages,
                    receipt.batches.len()
                );
            }

            let indices: Vec<usize> = if only.is_empty() {
                (0..receipt.batches.len()).collect()
            } else {
                only.clone()
            };
            let mut tickets = Vec::with_capacity(indices.len());
            for index in indices {
                tickets.push(service.submit_batch(&receipt.doc_id, index).await?);
            }

            let mut failed = 0;
            for ticket in &tickets {
                let bar = show_progress.then(|| page_bar(receipt.total_pages));
                if let Some(bar) = &bar {
                    bar.set_prefix(format!("Batch {}", ticket.batch_index));
                }
                let done = watch(&service, &ticket.job_id, bar.as_ref()).await?;
                if done.status == JobStatus::Error {
                    failed += 1;
                }
                report(g, &done)?;
            }

            let combined = service.combine_document_to_file(&receipt.doc_id).await?;
            let path = service.result_path(&combined)?;
            eprintln!("{} Combined output: {}", green("✔"), path.display());
            if failed > 0 {
                bail!("{failed} batch(es) failed");
            }
            Ok(())
        }
    }
}

fn build_service(g: &GlobalArgs, concurrency: Option<usize>) -> Result<OcrService> {
    let mut builder = ProcessorConfig::builder()
        .chunk_size(g.chunk_size)
        .max_retries(g.max_retries)
        .max_tokens(g.max_tokens);
    if let Some(model) = &g.model {
        builder = builder.model(model);
    }
    if let Some(provider) = &g.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(password) = &g.password {
        builder = builder.password(password);
    }
    if g.two_column {
        builder = builder.prompt_style(PromptStyle::TwoColumn);
    }
    if g.mark_failures {
        builder = builder.failure_policy(WindowFailurePolicy::Marker);
    }
    let processor_config = builder.build()?;

    let mut service_config = match &g.output_dir {
        Some(dir) => ServiceConfig::rooted_at(dir),
        None => ServiceConfig::default(),
    };
    if let Some(n) = concurrency {
        service_config = service_config.with_max_concurrent_jobs(n);
    }

    OcrService::from_config(processor_config, service_config)
        .context("Failed to set up the OCR service")
}

fn page_bar(total: usize) -> ProgressBar {
    let bar = ProgressBar::new(total as u64);
    bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}/{len} pages  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  "),
    );
    bar.set_prefix("OCR");
    bar.enable_steady_tick(Duration::from_millis(80));
    bar
}

/// Poll a job to completion, mirroring its snapshot onto `bar`.
async fn watch(
    service: &OcrService,
    job_id: &str,
    bar: Option<&ProgressBar>,
) -> Result<JobSnapshot> {
    loop {
        let snapshot = service.poll(job_id);
        if let Some(bar) = bar {
            bar.set_position(snapshot.current_page as u64);
            bar.set_message(snapshot.message.clone());
        }
        match snapshot.status {
            JobStatus::Processing => tokio::time::sleep(Duration::from_millis(250)).await,
            JobStatus::NotFound => bail!("Job {job_id} disappeared"),
            JobStatus::Complete | JobStatus::Error => {
                if let Some(bar) = bar {
                    bar.finish_and_clear();
                }
                return Ok(snapshot);
            }
        }
    }
}

fn report(g: &GlobalArgs, snapshot: &JobSnapshot) -> Result<()> {
    if g.json {
        println!("{}", serde_json::to_string_pretty(snapshot)?);
        return Ok(());
    }
    if g.quiet {
        return Ok(());
    }
    match snapshot.status {
        JobStatus::Complete if snapshot.skipped_windows == 0 => {
            eprintln!("{} {}", green("✔"), snapshot.message)
        }
        JobStatus::Complete => eprintln!(
            "{} {}",
            cyan("⚠"),
            red(&format!("{} window(s) skipped", snapshot.skipped_windows))
        ),
        _ => eprintln!("{} {}", red("✘"), snapshot.message),
    }
    Ok(())
}
