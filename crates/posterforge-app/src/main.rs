//! PosterForge command line: create, import, list and export projects.

use std::path::PathBuf;

use anyhow::{Context as _, bail};
use clap::{Parser, Subcommand};
use posterforge_core::storage::{FileStorage, Storage};
use posterforge_core::{EditorConfig, EditorSession, InsertRequest, Project};
use posterforge_render::{
    DirectorySink, DownloadSink, ExportDefaults, ExportFormat, ExportJob, ExportPipeline,
    FileLoader, HttpLoader, ResvgRasterizer,
};

#[derive(Parser, Debug)]
#[command(name = "posterforge", version)]
struct Cli {
    /// Project store directory. Defaults to the user data directory.
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an empty project.
    New(NewArgs),
    /// Create a project from a scene JSON file.
    Import(ImportArgs),
    /// List stored projects.
    List,
    /// Export a stored project.
    Export(ExportArgs),
}

#[derive(Parser, Debug)]
struct NewArgs {
    name: String,

    #[arg(long, default_value_t = 1080.0)]
    width: f64,

    #[arg(long, default_value_t = 1080.0)]
    height: f64,

    /// Number of blank pages.
    #[arg(long, default_value_t = 1)]
    pages: usize,
}

#[derive(Parser, Debug)]
struct ImportArgs {
    /// Scene JSON, as produced by `export --format json`.
    #[arg(long = "in")]
    in_path: PathBuf,

    #[arg(long)]
    name: Option<String>,
}

#[derive(Parser, Debug)]
struct ExportArgs {
    /// Project id.
    id: String,

    /// png, jpg, webp, svg, pdf or json.
    #[arg(long, default_value = "png")]
    format: String,

    #[arg(long, default_value_t = 1.0)]
    scale: f64,

    /// Encoder quality for jpg/webp (1-100).
    #[arg(long, default_value_t = 90)]
    quality: u8,

    /// Lower quality until the file fits this many megabytes.
    #[arg(long)]
    max_size_mb: Option<f64>,

    #[arg(long, default_value_t = false)]
    transparent: bool,

    /// Export every page into one PDF.
    #[arg(long, default_value_t = false)]
    all_pages: bool,

    /// Output directory.
    #[arg(long, default_value = ".")]
    out: PathBuf,

    /// File name without extension. Defaults to the project name.
    #[arg(long)]
    filename: Option<String>,

    /// Directory local image paths are resolved against. Remote images are
    /// fetched over HTTP.
    #[arg(long)]
    assets: Option<PathBuf>,

    /// Origin the project's remote images are considered same-origin with.
    #[arg(long)]
    origin: Option<String>,

    /// Editor settings JSON.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Export settings JSON (quality policy, page size, DPI).
    #[arg(long)]
    export_config: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let storage = open_store(cli.store)?;
    match cli.cmd {
        Command::New(args) => cmd_new(&storage, args),
        Command::Import(args) => cmd_import(&storage, args),
        Command::List => cmd_list(&storage),
        Command::Export(args) => cmd_export(&storage, args),
    }
}

fn open_store(dir: Option<PathBuf>) -> anyhow::Result<FileStorage> {
    let storage = match dir {
        Some(dir) => FileStorage::new(dir)?,
        None => FileStorage::default_location()?,
    };
    log::debug!("Using project store at {}", storage.base_path().display());
    Ok(storage)
}

fn cmd_new(storage: &FileStorage, args: NewArgs) -> anyhow::Result<()> {
    if args.width <= 0.0 || args.height <= 0.0 {
        bail!("workspace size must be positive");
    }
    let mut project = Project::new(args.name, args.width, args.height);
    for _ in 1..args.pages.max(1) {
        project.add_page(args.width, args.height);
    }
    pollster::block_on(storage.save(&project.id, &project))?;
    println!("{}", project.id);
    Ok(())
}

fn cmd_import(storage: &FileStorage, args: ImportArgs) -> anyhow::Result<()> {
    let json = std::fs::read_to_string(&args.in_path)
        .with_context(|| format!("read scene '{}'", args.in_path.display()))?;
    let mut session = EditorSession::new(EditorConfig::default(), 1080.0, 1080.0);
    session
        .insert(InsertRequest::Template { json })
        .with_context(|| format!("load scene '{}'", args.in_path.display()))?;

    let name = args.name.unwrap_or_else(|| {
        args.in_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "Imported".to_string())
    });
    session.project_mut().name = name;
    pollster::block_on(session.save_to(storage))?;
    println!("{}", session.project().id);
    Ok(())
}

fn cmd_list(storage: &FileStorage) -> anyhow::Result<()> {
    for id in pollster::block_on(storage.list())? {
        match pollster::block_on(storage.load(&id)) {
            Ok(project) => println!(
                "{id}\t{}\t{} page(s)",
                project.name,
                project.page_count()
            ),
            Err(e) => log::warn!("Skipping project {}: {}", id, e),
        }
    }
    Ok(())
}

fn cmd_export(storage: &FileStorage, args: ExportArgs) -> anyhow::Result<()> {
    let format: ExportFormat = args.format.parse()?;
    if args.all_pages && format != ExportFormat::Pdf {
        bail!("--all-pages is only supported for pdf");
    }

    let config = match &args.config {
        Some(path) => EditorConfig::from_json(
            &std::fs::read_to_string(path)
                .with_context(|| format!("read config '{}'", path.display()))?,
        )?,
        None => EditorConfig::default(),
    };
    let defaults = match &args.export_config {
        Some(path) => ExportDefaults::from_json(
            &std::fs::read_to_string(path)
                .with_context(|| format!("read export config '{}'", path.display()))?,
        )?,
        None => ExportDefaults::default(),
    };

    let project = pollster::block_on(storage.load(&args.id))?;
    let filename = args
        .filename
        .unwrap_or_else(|| file_stem_for(&project.name));
    let mut session = EditorSession::open_project(config, project)?;

    let assets = args.assets.unwrap_or_else(|| PathBuf::from("."));
    let rasterizer = ResvgRasterizer::new().with_resources_dir(assets.clone());
    let mut pipeline = ExportPipeline::new(rasterizer)
        .with_loader(HttpLoader::new()?.with_fallback(FileLoader::new(assets)))
        .with_defaults(defaults);
    if let Some(origin) = args.origin {
        pipeline = pipeline.with_origin(origin);
    }

    let mut job = ExportJob::new(format)
        .with_scale(args.scale)
        .with_quality(args.quality)
        .transparent(args.transparent)
        .with_filename(filename);
    if let Some(mb) = args.max_size_mb {
        job = job.limit_file_size(mb);
    }

    let artifact = if args.all_pages {
        pollster::block_on(pipeline.export_pages(&mut session, &job, None))?
    } else {
        pipeline.export(&mut session, &job)?
    };

    let path = DirectorySink::new(args.out)
        .deliver(&artifact)
        .context("write artifact")?;
    match artifact.quality {
        Some(q) => eprintln!("wrote {} (quality {q})", path.display()),
        None => eprintln!("wrote {}", path.display()),
    }
    Ok(())
}

/// Project name reduced to a safe file stem.
fn file_stem_for(name: &str) -> String {
    let stem: String = name
        .trim()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
        .collect();
    if stem.is_empty() {
        "poster".to_string()
    } else {
        stem
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_stem_for() {
        assert_eq!(file_stem_for("Summer Sale!"), "Summer-Sale-");
        assert_eq!(file_stem_for("  "), "poster");
    }

    #[test]
    fn test_cli_parses_export() {
        let cli = Cli::parse_from([
            "posterforge",
            "--store",
            "/tmp/projects",
            "export",
            "abc",
            "--format",
            "jpg",
            "--max-size-mb",
            "0.5",
        ]);
        let Command::Export(args) = cli.cmd else {
            panic!("expected export");
        };
        assert_eq!(args.format, "jpg");
        assert_eq!(args.max_size_mb, Some(0.5));
        assert_eq!(args.quality, 90);
    }
}
