use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use gesture_annotator::report::ReportAggregator;
use gesture_annotator::{
    AnnotateRequest, AnnotationWorkflow, AnnotatorError, AppConfig, Region, ReportLinks,
    VariantPolicy,
};

#[derive(Parser, Debug)]
#[command(
    name = "gesture-annotator",
    version,
    about = "Annotate gesture regions on images, catalogue icon metadata, and render reports"
)]
struct Cli {
    /// Data directory (default: $GESTURE_ANNOTATOR_HOME or the platform data dir)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    /// Reject iconographic_variant_id values that do not exist
    #[arg(long, global = true, action = ArgAction::SetTrue)]
    require_existing_variants: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Upload an image file, or every image under a folder
    Upload(UploadArgs),
    /// Annotate a region of an uploaded image
    Annotate(AnnotateArgs),
    /// List the gesture vocabulary, or add to it
    Gestures(GesturesArgs),
    /// Curate the iconographic hierarchy and gesture classification systems
    Catalog(CatalogArgs),
    /// Resolve an uploaded original or a crop artifact by filename
    #[command(name = "serve-path")]
    ServePath(ServePathArgs),
    /// Render the grouped report
    Report(ReportArgs),
}

#[derive(Args, Debug)]
struct UploadArgs {
    /// Image file or folder
    path: PathBuf,
}

#[derive(Args, Debug)]
struct AnnotateArgs {
    /// JSON request body file (or - for stdin); replaces the other flags
    #[arg(long, conflicts_with_all = ["image_id", "region", "gesture_id", "notes", "notes_file"])]
    request: Option<String>,
    #[arg(long)]
    image_id: Option<i64>,
    /// Selection in the 600x400 canvas: X,Y,WIDTH,HEIGHT
    #[arg(long, allow_hyphen_values = true, value_parser = parse_region)]
    region: Option<Region>,
    #[arg(long)]
    gesture_id: Option<i64>,
    /// Free text, or a JSON object with catalogue metadata
    #[arg(long, conflicts_with = "notes_file")]
    notes: Option<String>,
    /// Read notes from a file
    #[arg(long)]
    notes_file: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct GesturesArgs {
    #[command(subcommand)]
    action: Option<GestureAction>,
}

#[derive(Subcommand, Debug)]
enum GestureAction {
    /// Add a gesture to the vocabulary
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        description: Option<String>,
    },
}

#[derive(Args, Debug)]
struct CatalogArgs {
    #[command(subcommand)]
    action: CatalogAction,
}

#[derive(Subcommand, Debug)]
enum CatalogAction {
    /// Add an iconographic type
    AddType {
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        feast_association: Option<String>,
    },
    /// Add a variant under an existing type
    AddVariant {
        #[arg(long)]
        type_id: i64,
        #[arg(long)]
        title: String,
        #[arg(long)]
        regional_school: Option<String>,
        #[arg(long)]
        date_range: Option<String>,
    },
    /// Add a gesture classification system
    AddSystem {
        #[arg(long)]
        name: String,
        #[arg(long)]
        description: Option<String>,
    },
    /// Label a gesture within a classification system
    LabelGesture {
        #[arg(long)]
        system_id: i64,
        #[arg(long)]
        gesture_id: i64,
        #[arg(long)]
        label: Option<String>,
    },
    /// List the labels of a classification system
    Labels {
        #[arg(long)]
        system_id: i64,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ServeKind {
    Uploads,
    Crops,
}

#[derive(Args, Debug)]
struct ServePathArgs {
    kind: ServeKind,
    filename: String,
}

#[derive(Clone, Copy, Debug, Default, ValueEnum)]
enum ReportFormat {
    #[default]
    Html,
    Json,
}

#[derive(Args, Debug)]
struct ReportArgs {
    /// Write to this file instead of stdout
    #[arg(long)]
    out: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = ReportFormat::Html)]
    format: ReportFormat,
    /// URL prefix for uploaded originals
    #[arg(long, default_value = "/uploads/")]
    uploads_url: String,
    /// URL prefix for crop artifacts
    #[arg(long, default_value = "/crops/")]
    crops_url: String,
    /// URL prefix for gesture header photos
    #[arg(long, default_value = "/gesture_photos/")]
    gesture_photos_url: String,
}

fn main() {
    init_tracing();

    if let Err(err) = run() {
        let code = match err.downcast_ref::<AnnotatorError>() {
            Some(annotator_err) => {
                let body = serde_json::to_string(&annotator_err.to_response())
                    .unwrap_or_else(|_| annotator_err.to_string());
                eprintln!("{body}");
                if annotator_err.is_client_error() {
                    2
                } else {
                    1
                }
            }
            None => {
                eprintln!("error: {err:#}");
                1
            }
        };
        std::process::exit(code);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::resolve(cli.data_dir)?;
    if cli.require_existing_variants {
        config.variant_policy = VariantPolicy::RequireExisting;
    }
    let mut workflow = AnnotationWorkflow::open(config)?;
    tracing::debug!(images = workflow.library().image_count()?, "catalogue ready");

    match cli.command {
        Commands::Upload(args) => command_upload(&workflow, args),
        Commands::Annotate(args) => command_annotate(&mut workflow, args),
        Commands::Gestures(args) => command_gestures(&workflow, args),
        Commands::Catalog(args) => command_catalog(&workflow, args),
        Commands::ServePath(args) => command_serve_path(&workflow, args),
        Commands::Report(args) => command_report(&workflow, args),
    }
}

fn command_upload(workflow: &AnnotationWorkflow, args: UploadArgs) -> Result<()> {
    if args.path.is_dir() {
        let summary = workflow.import_folder(&args.path);
        return print_json(&summary);
    }
    let uploaded = workflow.upload_path(&args.path)?;
    print_json(&uploaded)
}

fn command_annotate(workflow: &mut AnnotationWorkflow, args: AnnotateArgs) -> Result<()> {
    let request = match args.request {
        Some(source) => {
            let body = read_text(&source)?;
            serde_json::from_str::<AnnotateRequest>(&body)
                .map_err(|e| AnnotatorError::validation(format!("malformed request body: {e}")))?
        }
        None => {
            let notes = match args.notes_file {
                Some(path) => Some(
                    fs::read_to_string(&path)
                        .with_context(|| format!("failed to read notes: {}", path.display()))?,
                ),
                None => args.notes,
            };
            AnnotateRequest {
                image_id: args.image_id,
                region_coordinates: args.region,
                gesture_id: args.gesture_id,
                notes,
            }
        }
    };

    let saved = workflow.annotate(&request)?;
    print_json(&saved)
}

fn command_gestures(workflow: &AnnotationWorkflow, args: GesturesArgs) -> Result<()> {
    match args.action {
        None => print_json(&workflow.list_gestures()?),
        Some(GestureAction::Add { name, description }) => {
            let gesture = workflow.add_gesture(&name, description.as_deref())?;
            print_json(&gesture)
        }
    }
}

fn command_catalog(workflow: &AnnotationWorkflow, args: CatalogArgs) -> Result<()> {
    let library = workflow.library();
    let id = match args.action {
        CatalogAction::AddType {
            title,
            description,
            feast_association,
        } => library.add_iconographic_type(
            &title,
            description.as_deref(),
            feast_association.as_deref(),
        )?,
        CatalogAction::AddVariant {
            type_id,
            title,
            regional_school,
            date_range,
        } => library.add_iconographic_variant(
            type_id,
            &title,
            regional_school.as_deref(),
            date_range.as_deref(),
        )?,
        CatalogAction::AddSystem { name, description } => {
            library.add_classification_system(&name, description.as_deref())?
        }
        CatalogAction::LabelGesture {
            system_id,
            gesture_id,
            label,
        } => library.label_gesture(system_id, gesture_id, label.as_deref())?,
        CatalogAction::Labels { system_id } => {
            return print_json(&library.classification_labels(system_id)?);
        }
    };
    print_json(&serde_json::json!({ "id": id }))
}

fn command_serve_path(workflow: &AnnotationWorkflow, args: ServePathArgs) -> Result<()> {
    let config = workflow.config();
    let path = match args.kind {
        ServeKind::Uploads => config.upload_file(&args.filename)?,
        ServeKind::Crops => config.crop_file(&args.filename)?,
    };
    println!("{}", path.display());
    Ok(())
}

fn command_report(workflow: &AnnotationWorkflow, args: ReportArgs) -> Result<()> {
    let aggregator = ReportAggregator::new(workflow.library());
    let output = match args.format {
        ReportFormat::Html => {
            let links = ReportLinks {
                uploads: args.uploads_url,
                crops: args.crops_url,
                gesture_photos: args.gesture_photos_url,
            };
            aggregator.render_html(&links)?
        }
        ReportFormat::Json => serde_json::to_string_pretty(&aggregator.image_summaries()?)?,
    };

    match args.out {
        Some(path) => {
            fs::write(&path, output)
                .with_context(|| format!("failed to write report: {}", path.display()))?;
            tracing::info!(path = %path.display(), "report written");
        }
        None => println!("{output}"),
    }
    Ok(())
}

fn parse_region(value: &str) -> std::result::Result<Region, String> {
    let parts = value
        .split(',')
        .map(|part| part.trim().parse::<f64>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| format!("invalid region {value:?}: {e}"))?;
    match parts.as_slice() {
        [x, y, width, height] => Ok(Region::new(*x, *y, *width, *height)),
        _ => Err(format!("region must be X,Y,WIDTH,HEIGHT, got {value:?}")),
    }
}

fn read_text(source: &str) -> Result<String> {
    if source == "-" {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read request from stdin")?;
        return Ok(buf);
    }
    fs::read_to_string(source).with_context(|| format!("failed to read request: {source}"))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_region_with_negative_extent() {
        let region = parse_region("300, 200, -100, 50").unwrap();
        assert_eq!(region, Region::new(300.0, 200.0, -100.0, 50.0));
    }

    #[test]
    fn test_rejects_short_region() {
        assert!(parse_region("1,2,3").is_err());
        assert!(parse_region("a,b,c,d").is_err());
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
