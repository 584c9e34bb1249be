use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pdf_markup_core::{Annotation, EngineConfig};
use pdf_markup_engine::{OpenSource, PageSource, PdfDocument};
use pdf_markup_render::{export_flattened, FontBook, StampOptions};
use pdf_markup_storage::{migrate_json, AnnotationRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "pdf-markup")]
#[command(about = "PDF annotation tools")]
pub struct Cli {
    /// Log debug output to stderr
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print machine-readable PDF page geometry.
    Info {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Stamp saved annotations into a copy of a PDF.
    Export {
        #[arg(value_name = "PDF")]
        pdf: PathBuf,
        #[arg(value_name = "ANNOTATIONS")]
        annotations: PathBuf,
        #[arg(long, short)]
        output: PathBuf,
        /// Raster pixels per PDF unit
        #[arg(long, default_value_t = 2.0)]
        scale: f32,
        /// TrueType/OpenType font for text annotations
        #[arg(long, value_name = "FONT")]
        font: Option<PathBuf>,
    },
    /// Convert a legacy annotation export into current records.
    Migrate {
        #[arg(value_name = "LEGACY")]
        legacy: PathBuf,
        #[arg(long, short)]
        output: PathBuf,
    },
    /// Summarize an annotations file.
    Inspect {
        #[arg(value_name = "ANNOTATIONS")]
        annotations: PathBuf,
    },
    /// Print CLI version.
    Version,
}

#[derive(Debug, Serialize)]
struct InfoOutput {
    path: String,
    page_count: u32,
    pages: Vec<PageSizeOutput>,
}

#[derive(Debug, Serialize)]
struct PageSizeOutput {
    width: f32,
    height: f32,
}

#[derive(Debug, Serialize)]
struct ExportOutput {
    output: String,
    stamped: usize,
    skipped: Vec<SkippedOutput>,
}

#[derive(Debug, Serialize)]
struct SkippedOutput {
    id: String,
    reason: String,
}

#[derive(Debug, Serialize)]
struct MigrateOutput {
    migrated: usize,
    dropped: Vec<DroppedOutput>,
}

#[derive(Debug, Serialize)]
struct DroppedOutput {
    index: usize,
    reason: String,
}

#[derive(Debug, Serialize)]
struct InspectOutput {
    total: usize,
    unreadable: usize,
    pages: BTreeMap<u32, usize>,
    tools: BTreeMap<&'static str, usize>,
}

/// Either a bare record list or a saved document file
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RecordsFile {
    List(Vec<AnnotationRecord>),
    Envelope { records: Vec<AnnotationRecord> },
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Info { file } => run_info(&file),
        Commands::Export { pdf, annotations, output, scale, font } => {
            run_export(&pdf, &annotations, &output, scale, font.as_deref())
        }
        Commands::Migrate { legacy, output } => run_migrate(&legacy, &output),
        Commands::Inspect { annotations } => run_inspect(&annotations),
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // A second init in the same process keeps the first subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run_info(file: &Path) -> Result<()> {
    ensure_file_exists(file)?;

    let doc = PdfDocument::open(OpenSource::from(file)).context("failed to open PDF")?;
    let pages = (0..doc.page_count())
        .map(|index| {
            let media_box = doc.media_box(index)?;
            Ok(PageSizeOutput { width: media_box.width(), height: media_box.height() })
        })
        .collect::<Result<Vec<_>>>()?;

    let payload =
        InfoOutput { path: file.display().to_string(), page_count: doc.page_count(), pages };
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

fn run_export(
    pdf: &Path,
    annotations: &Path,
    output: &Path,
    scale: f32,
    font: Option<&Path>,
) -> Result<()> {
    ensure_file_exists(pdf)?;
    let annotations = read_annotations(annotations)?.0;
    let source = fs::read(pdf).with_context(|| format!("failed to read {}", pdf.display()))?;

    let fonts = match font {
        Some(path) => {
            let bytes =
                fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
            let mut fonts = FontBook::new();
            fonts.set_fallback(bytes).context("unusable font file")?;
            fonts
        }
        None => FontBook::with_system_fonts(),
    };

    let (bytes, report) = export_flattened(&source, &annotations, &fonts, &StampOptions { scale })
        .context("failed to export PDF")?;
    write_output(output, &bytes)?;

    let payload = ExportOutput {
        output: output.display().to_string(),
        stamped: report.stamped.len(),
        skipped: report
            .skipped
            .iter()
            .map(|(id, reason)| SkippedOutput { id: id.to_string(), reason: reason.to_string() })
            .collect(),
    };
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

fn run_migrate(legacy: &Path, output: &Path) -> Result<()> {
    ensure_file_exists(legacy)?;
    let bytes = fs::read(legacy).with_context(|| format!("failed to read {}", legacy.display()))?;
    let config = EngineConfig::from_env().context("invalid engine configuration")?;
    let outcome = migrate_json(&bytes, &config).context("failed to read legacy annotations")?;

    let records = outcome
        .annotations
        .iter()
        .map(AnnotationRecord::from_annotation)
        .collect::<Result<Vec<_>, _>>()
        .context("failed to encode migrated annotation")?;
    write_output(output, &serde_json::to_vec_pretty(&records)?)?;

    let payload = MigrateOutput {
        migrated: records.len(),
        dropped: outcome
            .dropped
            .iter()
            .map(|(index, err)| DroppedOutput { index: *index, reason: err.to_string() })
            .collect(),
    };
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

fn run_inspect(annotations: &Path) -> Result<()> {
    let (annotations, unreadable) = read_annotations(annotations)?;

    let mut pages = BTreeMap::new();
    let mut tools = BTreeMap::new();
    for annotation in &annotations {
        *pages.entry(annotation.page_index()).or_insert(0) += 1;
        *tools.entry(annotation.tool().as_str()).or_insert(0) += 1;
    }

    let payload = InspectOutput { total: annotations.len(), unreadable, pages, tools };
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

/// Decoded annotations and the number of records that did not decode
fn read_annotations(path: &Path) -> Result<(Vec<Annotation>, usize)> {
    ensure_file_exists(path)?;
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let records = match serde_json::from_slice(&bytes)
        .with_context(|| format!("malformed annotations file {}", path.display()))?
    {
        RecordsFile::List(records) | RecordsFile::Envelope { records } => records,
    };

    let mut annotations = Vec::with_capacity(records.len());
    for record in &records {
        match record.to_annotation() {
            Ok(annotation) => annotations.push(annotation),
            Err(err) => tracing::warn!(id = %record.id, %err, "skipping unreadable record"),
        }
    }
    let unreadable = records.len() - annotations.len();
    Ok((annotations, unreadable))
}

fn write_output(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, bytes).with_context(|| format!("failed to write {}", path.display()))
}

fn ensure_file_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("file does not exist: {}", path.display());
    }

    if !path.is_file() {
        anyhow::bail!("path is not a file: {}", path.display());
    }

    Ok(())
}
