use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use folio_cache::{CacheConfig, CacheManager, MemoryCacheStorage, UreqFetcher};
use folio_pdf_engine::{default_engine, DocumentKind, OpenSource};
use folio_storage::{PreferenceStore, Storage, Theme};
use folio_viewer::{DocumentViewer, RenderStats};
use folio_viewer_core::{KeyInput, PageVisibility, UiEvent, ViewerConfig, Viewport};
use serde::Serialize;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(name = "folio")]
#[command(about = "Document viewer and offline cache tools")]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print machine-readable document metadata.
    Info {
        /// Path, URL or data: URI
        #[arg(value_name = "SOURCE")]
        source: String,
    },
    /// Render one page to a PNG file.
    Render {
        #[arg(value_name = "SOURCE")]
        source: String,
        #[arg(long, default_value_t = 1)]
        page: u32,
        /// Zoom factor; defaults to the profile's initial fit
        #[arg(long)]
        scale: Option<f32>,
        #[command(flatten)]
        viewport: ViewportArgs,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Replay UI events against a viewer and print the resulting state.
    View {
        #[arg(value_name = "SOURCE")]
        source: String,
        #[command(flatten)]
        viewport: ViewportArgs,
        /// Event such as `next`, `goto 3`, `scale 2`, `key ctrl+0`; repeatable
        #[arg(long = "event", value_name = "EVENT")]
        events: Vec<String>,
        /// File with one event per line
        #[arg(long, value_name = "FILE")]
        script: Option<PathBuf>,
    },
    /// Read or change the persisted theme.
    Theme {
        #[arg(long, value_name = "DIR")]
        data_dir: Option<PathBuf>,
        #[command(subcommand)]
        action: ThemeAction,
    },
    /// Offline cache operations.
    Cache {
        /// JSON config file; environment variables are used otherwise
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Print CLI version.
    Version,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Profile {
    Resume,
    Certificate,
}

#[derive(Debug, clap::Args)]
struct ViewportArgs {
    #[arg(long, value_enum, default_value_t = Profile::Resume)]
    profile: Profile,
    #[arg(long, default_value_t = 1280.0)]
    width: f32,
    #[arg(long, default_value_t = 800.0)]
    height: f32,
    #[arg(long, default_value_t = 1.0)]
    dpr: f32,
}

impl ViewportArgs {
    fn config(&self) -> ViewerConfig {
        match self.profile {
            Profile::Resume => ViewerConfig::resume(),
            Profile::Certificate => ViewerConfig::certificate(),
        }
    }

    fn viewport(&self) -> Viewport {
        Viewport::new(self.width, self.height).with_device_pixel_ratio(self.dpr)
    }
}

#[derive(Debug, Subcommand)]
enum ThemeAction {
    Get,
    Set {
        #[arg(value_name = "THEME")]
        theme: String,
    },
    Toggle,
}

#[derive(Debug, Subcommand)]
enum CacheAction {
    /// Print the effective cache configuration.
    Config,
    /// Fetch the manifest and report what would be cached.
    Install,
}

#[derive(Debug, Serialize)]
struct InfoOutput {
    source: String,
    kind: &'static str,
    page_count: u32,
    first_page_size: PageSizeOutput,
}

#[derive(Debug, Serialize)]
struct PageSizeOutput {
    width: f32,
    height: f32,
}

#[derive(Debug, Serialize)]
struct ViewOutput {
    page_count: u32,
    current_page: u32,
    page_label: String,
    page_count_label: String,
    scale: f32,
    zoom_label: String,
    prev_enabled: bool,
    next_enabled: bool,
    renders: RenderStatsOutput,
}

#[derive(Debug, Serialize)]
struct RenderStatsOutput {
    completed: u64,
    cancelled: u64,
    failed: u64,
}

impl From<RenderStats> for RenderStatsOutput {
    fn from(stats: RenderStats) -> Self {
        Self { completed: stats.completed, cancelled: stats.cancelled, failed: stats.failed }
    }
}

#[derive(Debug, Serialize)]
struct InstallOutput {
    version: String,
    entries: usize,
    bytes: u64,
}

/// Log to stderr, filtered by `RUST_LOG` (default `warn`)
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);

    match cli.command {
        Commands::Info { source } => block_on(run_info(&source)),
        Commands::Render { source, page, scale, viewport, output } => {
            block_on(run_render(&source, page, scale, &viewport, output.as_deref()))
        }
        Commands::View { source, viewport, events, script } => {
            block_on(run_view(&source, &viewport, events, script.as_deref()))
        }
        Commands::Theme { data_dir, action } => run_theme(data_dir, action),
        Commands::Cache { config, action } => run_cache(config.as_deref(), action),
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn block_on<F: std::future::Future<Output = Result<()>>>(future: F) -> Result<()> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?
        .block_on(future)
}

fn open_source(locator: &str) -> Result<OpenSource> {
    let source = OpenSource::parse(locator);
    if let OpenSource::Path(path) = &source {
        ensure_file_exists(path)?;
    }
    Ok(source)
}

async fn open_viewer(locator: &str, args: &ViewportArgs) -> Result<DocumentViewer> {
    let source = open_source(locator)?;
    let viewer = DocumentViewer::new(Arc::new(default_engine()), args.config())
        .with_viewport(args.viewport());

    viewer.load(source).await.context("failed to open document")?;
    Ok(viewer)
}

async fn run_info(locator: &str) -> Result<()> {
    let source = open_source(locator)?;
    let viewer = DocumentViewer::new(Arc::new(default_engine()), ViewerConfig::default());
    let info = viewer.load(source).await.context("failed to open document")?;

    let kind = match info.kind {
        DocumentKind::Pdf => "pdf",
        DocumentKind::Image => "image",
    };
    let payload = InfoOutput {
        source: locator.to_string(),
        kind,
        page_count: info.page_count,
        first_page_size: PageSizeOutput {
            width: info.first_page.width,
            height: info.first_page.height,
        },
    };

    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

async fn run_render(
    locator: &str,
    page: u32,
    scale: Option<f32>,
    args: &ViewportArgs,
    output: Option<&Path>,
) -> Result<()> {
    if page == 0 {
        anyhow::bail!("--page is 1-based and must be >= 1");
    }

    let viewer = open_viewer(locator, args).await?;
    let scale = scale.unwrap_or_else(|| viewer.scale());
    let surface = viewer
        .render_page(page, scale)
        .await
        .with_context(|| format!("failed to render page {page}"))?;

    let output = output.map(ToOwned::to_owned).unwrap_or_else(|| default_render_output(locator, page));
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }

    surface
        .image
        .save(&output)
        .with_context(|| format!("failed to write image to {}", output.display()))?;

    println!("{}", output.display());
    Ok(())
}

async fn run_view(
    locator: &str,
    args: &ViewportArgs,
    mut events: Vec<String>,
    script: Option<&Path>,
) -> Result<()> {
    if let Some(script) = script {
        let contents = fs::read_to_string(script)
            .with_context(|| format!("failed to read event script {}", script.display()))?;
        events.extend(
            contents
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .map(String::from),
        );
    }

    let events = events
        .iter()
        .map(|line| parse_event(line).with_context(|| format!("invalid event '{line}'")))
        .collect::<Result<Vec<_>>>()?;

    let viewer = open_viewer(locator, args).await?;
    for event in events {
        let dispatch = viewer.dispatch(event).await;
        for render in &dispatch.renders {
            if let Err(err) = &render.result {
                if !err.is_cancelled() {
                    tracing::warn!(page = render.page, error = %err, "page render failed");
                }
            }
        }
    }

    let controls = viewer.nav_controls();
    let payload = ViewOutput {
        page_count: controls.page_count,
        current_page: controls.current_page,
        page_label: controls.page_label(),
        page_count_label: controls.page_count_label(),
        scale: viewer.scale(),
        zoom_label: controls.zoom_label,
        prev_enabled: controls.prev_enabled,
        next_enabled: controls.next_enabled,
        renders: viewer.stats().into(),
    };

    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

/// One line of an event script
fn parse_event(line: &str) -> Result<UiEvent> {
    let mut words = line.split_whitespace();
    let command = words.next().context("empty event")?;
    let args: Vec<&str> = words.collect();

    let event = match (command, args.as_slice()) {
        ("prev", []) => UiEvent::PrevPage,
        ("next", []) => UiEvent::NextPage,
        ("goto", [page]) => UiEvent::GoToPage(page.parse().context("page must be a number")?),
        ("zoom-in", []) => UiEvent::ZoomIn,
        ("zoom-out", []) => UiEvent::ZoomOut,
        ("scale", [scale]) => UiEvent::SetScale(scale.parse().context("scale must be a number")?),
        ("fit-width", []) => UiEvent::FitWidth,
        ("fit-page", []) => UiEvent::FitPage,
        ("reset", []) => UiEvent::ResetZoom,
        ("key", [key]) => UiEvent::Key(parse_key(key)),
        ("wheel", [delta, rest @ ..]) => UiEvent::Wheel {
            ctrl: rest.contains(&"ctrl"),
            delta_y: delta.parse().context("wheel delta must be a number")?,
        },
        ("visible", entries) if !entries.is_empty() => UiEvent::Intersection(
            entries.iter().map(|entry| parse_visibility(entry)).collect::<Result<_>>()?,
        ),
        ("resize", [width, height, rest @ ..]) => {
            let mut viewport = Viewport::new(width.parse()?, height.parse()?);
            if let [dpr] = rest {
                viewport = viewport.with_device_pixel_ratio(dpr.parse()?);
            }
            UiEvent::Resize(viewport)
        }
        ("close", []) => UiEvent::Close,
        _ => anyhow::bail!("unknown event"),
    };

    Ok(event)
}

/// `ctrl+0`, `meta+=`, `ArrowRight`
fn parse_key(text: &str) -> KeyInput {
    let mut key = KeyInput::plain(text);
    if text.len() > 1 {
        if let Some((modifiers, name)) = text.rsplit_once('+').filter(|(_, name)| !name.is_empty()) {
            key = KeyInput::plain(name);
            for modifier in modifiers.split('+') {
                match modifier.to_ascii_lowercase().as_str() {
                    "ctrl" => key.ctrl = true,
                    "meta" | "cmd" => key.meta = true,
                    "shift" => key.shift = true,
                    _ => {}
                }
            }
        }
    }
    key
}

/// `page:ratio`
fn parse_visibility(entry: &str) -> Result<PageVisibility> {
    let (page, ratio) = entry.split_once(':').context("expected page:ratio")?;
    Ok(PageVisibility::new(page.parse()?, ratio.parse()?))
}

fn run_theme(data_dir: Option<PathBuf>, action: ThemeAction) -> Result<()> {
    let storage = match data_dir {
        Some(dir) => Storage::with_root(dir),
        None => Storage::from_default_project()?,
    };
    let client = PreferenceStore::new(storage).attach();

    let theme = match action {
        ThemeAction::Get => client.theme().context("failed to read preferences")?,
        ThemeAction::Set { theme } => {
            let theme: Theme = theme.parse()?;
            client.set_theme(theme).context("failed to save preferences")?;
            theme
        }
        ThemeAction::Toggle => client.toggle_theme().context("failed to save preferences")?,
    };

    println!("{theme}");
    Ok(())
}

fn run_cache(config_path: Option<&Path>, action: CacheAction) -> Result<()> {
    let config = match config_path {
        Some(path) => CacheConfig::from_file(path)
            .with_context(|| format!("failed to load cache config {}", path.display()))?,
        None => CacheConfig::from_env().context("invalid cache environment")?,
    };

    match action {
        CacheAction::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        CacheAction::Install => block_on(run_cache_install(config)),
    }
}

async fn run_cache_install(config: CacheConfig) -> Result<()> {
    let fetcher = UreqFetcher::with_timeout(config.origin.clone(), Duration::from_secs(15));
    let manager = CacheManager::new(config, Arc::new(MemoryCacheStorage::new()), Arc::new(fetcher));

    let entries = manager.install().await.context("cache install failed")?;
    let bytes = manager.bucket_size().await?;

    let payload = InstallOutput { version: manager.version().to_string(), entries, bytes };
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
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

fn default_render_output(locator: &str, page: u32) -> PathBuf {
    let path = Path::new(locator);
    let stem = path.file_stem().and_then(|name| name.to_str()).unwrap_or("page");

    match OpenSource::parse(locator) {
        OpenSource::Path(_) => path.with_file_name(format!("{stem}-page-{page}.png")),
        _ => PathBuf::from(format!("page-{page}.png")),
    }
}
