use std::io::Read;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{anyhow, bail, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use studypipe_core::{PageDump, SummaryStyle};
use studypipe_local::dom::Document;
use studypipe_local::pipeline::{PipelineCfg, StudyPipeline, DEFAULT_CALL_TIMEOUT_MS};
use studypipe_local::{extract, highlight, model_from_env, ModelHandles, PageFetcher};

#[derive(Parser, Debug)]
#[command(name = "studypipe", version)]
#[command(about = "Turn a web page into a summary, key concepts, highlights, and a quiz")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fetch a page and print its readable text. No model calls.
    Extract(ExtractArgs),
    /// Summarize a page and mine its key concepts.
    Summarize(SummarizeArgs),
    /// Generate a four-question multiple-choice quiz from a page.
    Quiz(QuizArgs),
    /// Explain one concept in the context of a page.
    Explain(ExplainArgs),
    /// Strip concept marks from previously annotated HTML.
    ClearHighlights(ClearHighlightsArgs),
    /// Report what is configured. Booleans only, never secrets.
    Doctor(DoctorArgs),
    /// Print version info.
    Version(VersionArgs),
}

/// Where the page content comes from. At most one may be set; with none,
/// text is read from stdin.
#[derive(Args, Debug)]
struct SourceArgs {
    /// Page URL. Allowed schemes: http, https, file
    #[arg(long)]
    url: Option<String>,

    /// Local file holding HTML or plain text.
    #[arg(long)]
    file: Option<PathBuf>,

    /// Literal text to study ("-" reads stdin).
    #[arg(long)]
    text: Option<String>,
}

#[derive(Args, Debug)]
struct ExtractArgs {
    #[command(flatten)]
    source: SourceArgs,

    /// Output format. Allowed: text, json
    #[arg(long, default_value = "text")]
    output: String,
}

#[derive(Args, Debug)]
struct SummarizeArgs {
    #[command(flatten)]
    source: SourceArgs,

    /// Summary style. Allowed: tldr, bullets, study-notes
    #[arg(long, default_value = "tldr")]
    style: String,

    /// Write the page HTML back out with key concepts wrapped in mark tags.
    /// Needs an HTML source (--url or an HTML --file).
    #[arg(long)]
    annotate_out: Option<PathBuf>,

    /// Deadline for one model call before the short-input retry, in ms.
    #[arg(long, default_value_t = DEFAULT_CALL_TIMEOUT_MS)]
    timeout_ms: u64,

    /// Output format. Allowed: text, json
    #[arg(long, default_value = "text")]
    output: String,
}

#[derive(Args, Debug)]
struct QuizArgs {
    #[command(flatten)]
    source: SourceArgs,

    /// Deadline for one model call before the short-input retry, in ms.
    #[arg(long, default_value_t = DEFAULT_CALL_TIMEOUT_MS)]
    timeout_ms: u64,

    /// Output format. Allowed: text, json
    #[arg(long, default_value = "text")]
    output: String,
}

#[derive(Args, Debug)]
struct ExplainArgs {
    #[command(flatten)]
    source: SourceArgs,

    /// Concept to explain.
    #[arg(long)]
    term: String,

    /// Deadline for one model call before the short-input retry, in ms.
    #[arg(long, default_value_t = DEFAULT_CALL_TIMEOUT_MS)]
    timeout_ms: u64,

    /// Output format. Allowed: text, json
    #[arg(long, default_value = "text")]
    output: String,
}

#[derive(Args, Debug)]
struct ClearHighlightsArgs {
    /// Annotated HTML file.
    #[arg(long)]
    file: PathBuf,

    /// Where to write the cleaned HTML (stdout when omitted).
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct DoctorArgs {
    /// Output format. Allowed: json, text
    #[arg(long, default_value = "json")]
    output: String,
}

#[derive(Args, Debug)]
struct VersionArgs {
    /// Output format. Allowed: json, text
    #[arg(long, default_value = "json")]
    output: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    load_env_file();
    let cli = Cli::parse();
    match cli.command {
        Commands::Extract(args) => run_extract(args).await,
        Commands::Summarize(args) => run_summarize(args).await,
        Commands::Quiz(args) => run_quiz(args).await,
        Commands::Explain(args) => run_explain(args).await,
        Commands::ClearHighlights(args) => run_clear_highlights(args),
        Commands::Doctor(args) => run_doctor(args),
        Commands::Version(args) => {
            run_version(args);
            Ok(())
        }
    }
}

/// Opt-in KEY=VALUE file pointed at by STUDYPIPE_ENV_FILE. Existing
/// variables win; values are never logged.
fn load_env_file() {
    let Ok(path) = std::env::var("STUDYPIPE_ENV_FILE") else {
        return;
    };
    let path = path.trim();
    if path.is_empty() {
        return;
    }
    let Ok(body) = std::fs::read_to_string(path) else {
        return;
    };
    for raw in body.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() || std::env::var_os(key).is_some() {
            continue;
        }
        std::env::set_var(key, value.trim());
    }
}

/// A loaded page: the dump the pipeline consumes, plus the raw HTML and
/// extraction detail when the source was an HTML page.
struct LoadedPage {
    dump: PageDump,
    html: Option<String>,
    detail: Option<extract::PageExtract>,
}

async fn load_page(source: &SourceArgs) -> Result<LoadedPage> {
    let picked = [
        source.url.is_some(),
        source.file.is_some(),
        source.text.is_some(),
    ]
    .iter()
    .filter(|set| **set)
    .count();
    if picked > 1 {
        bail!("pass at most one of --url, --file, --text");
    }

    if let Some(url) = &source.url {
        let fetcher = PageFetcher::new()?;
        let page = fetcher.fetch_page(url).await?;
        return Ok(from_html(page.html, &page.final_url));
    }

    if let Some(path) = &source.file {
        let body = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("read {}: {e}", path.display()))?;
        if extract::looks_like_html(&body) {
            let url = format!("file://{}", path.display());
            return Ok(from_html(body, &url));
        }
        return Ok(from_text(body));
    }

    let text = match &source.text {
        Some(t) if t == "-" => read_stdin()?,
        Some(t) => t.clone(),
        None => read_stdin()?,
    };
    Ok(from_text(text))
}

fn from_html(html: String, url: &str) -> LoadedPage {
    let detail = extract::extract_page(&html);
    let dump = PageDump {
        title: detail.title.clone(),
        url: url.to_string(),
        text: detail.text.clone(),
    };
    LoadedPage {
        dump,
        html: Some(html),
        detail: Some(detail),
    }
}

fn from_text(text: String) -> LoadedPage {
    LoadedPage {
        dump: PageDump::from_text(text.trim()),
        html: None,
        detail: None,
    }
}

fn read_stdin() -> Result<String> {
    let mut buf = String::new();
    std::io::stdin()
        .read_to_string(&mut buf)
        .map_err(|e| anyhow!("read stdin: {e}"))?;
    Ok(buf)
}

fn require_text(page: &LoadedPage) -> Result<()> {
    if page.dump.text.is_empty() {
        bail!("no readable text in the source");
    }
    Ok(())
}

fn http_client() -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .user_agent(concat!("studypipe/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

fn models() -> Result<ModelHandles> {
    Ok(model_from_env(http_client()?)?)
}

fn pipeline_for(handles: &ModelHandles, timeout_ms: u64) -> StudyPipeline {
    let cfg = PipelineCfg {
        call_timeout_ms: timeout_ms,
        ..Default::default()
    };
    StudyPipeline::new(handles.summarizer.clone(), handles.generator.clone(), cfg)
}

async fn run_extract(args: ExtractArgs) -> Result<()> {
    let page = load_page(&args.source).await?;
    require_text(&page)?;
    match args.output.to_ascii_lowercase().as_str() {
        "json" => {
            let (engine, truncated, warnings) = match &page.detail {
                Some(d) => (d.engine, d.truncated, d.warnings.clone()),
                None => ("text", false, Vec::new()),
            };
            let payload = serde_json::json!({
                "schema_version": 1,
                "kind": "extract",
                "ok": true,
                "title": page.dump.title,
                "url": page.dump.url,
                "engine": engine,
                "truncated": truncated,
                "warnings": warnings,
                "chars": page.dump.text.chars().count(),
                "text": page.dump.text,
            });
            println!("{payload}");
        }
        _ => println!("{}", page.dump.text),
    }
    Ok(())
}

async fn run_summarize(args: SummarizeArgs) -> Result<()> {
    let style = SummaryStyle::parse(&args.style).ok_or_else(|| {
        anyhow!(
            "unknown style {:?} (allowed: tldr, bullets, study-notes)",
            args.style
        )
    })?;
    let page = load_page(&args.source).await?;
    require_text(&page)?;

    let handles = models()?;
    let pipe = pipeline_for(&handles, args.timeout_ms);
    let run = pipe.run_summary(&page.dump, style).await?;

    let annotation = match &args.annotate_out {
        Some(out_path) => {
            let html = page.html.as_deref().ok_or_else(|| {
                anyhow!("--annotate-out needs an HTML source (--url or an HTML --file)")
            })?;
            let (annotated, outcome) = highlight::annotate_html(html, &run.concepts)?;
            std::fs::write(out_path, annotated)
                .map_err(|e| anyhow!("write {}: {e}", out_path.display()))?;
            Some(outcome)
        }
        None => None,
    };

    match args.output.to_ascii_lowercase().as_str() {
        "json" => {
            let payload = serde_json::json!({
                "schema_version": 1,
                "kind": "summary",
                "ok": true,
                "provider": handles.provider,
                "title": page.dump.title,
                "url": page.dump.url,
                "style": run.style,
                "summary": run.summary,
                "concepts": run.concepts,
                "condensed_chars": run.condensed_chars,
                "fallback_used": run.fallback_used,
                "timings_ms": run.timings_ms,
                "highlights": annotation,
            });
            println!("{payload}");
        }
        _ => {
            println!("{}", run.summary);
            if !run.concepts.is_empty() {
                println!();
                println!("Key concepts:");
                for concept in &run.concepts {
                    println!("- {concept}");
                }
            }
            if let (Some(outcome), Some(path)) = (&annotation, &args.annotate_out) {
                println!();
                println!(
                    "annotated {} ({} of {} concepts marked)",
                    path.display(),
                    outcome.marks_placed,
                    outcome.requested
                );
            }
        }
    }
    Ok(())
}

async fn run_quiz(args: QuizArgs) -> Result<()> {
    let page = load_page(&args.source).await?;
    require_text(&page)?;

    let handles = models()?;
    let pipe = pipeline_for(&handles, args.timeout_ms);
    let quiz = pipe.generate_quiz(&page.dump.text).await?;

    match args.output.to_ascii_lowercase().as_str() {
        "json" => {
            let payload = serde_json::json!({
                "schema_version": 1,
                "kind": "quiz",
                "ok": true,
                "provider": handles.provider,
                "title": page.dump.title,
                "url": page.dump.url,
                "quiz": quiz,
            });
            println!("{payload}");
        }
        _ => match quiz {
            Some(q) => print!("{}", q.render_text()),
            None => println!("Couldn't produce a quiz from this content. Try a richer page."),
        },
    }
    Ok(())
}

async fn run_explain(args: ExplainArgs) -> Result<()> {
    let page = load_page(&args.source).await?;
    require_text(&page)?;

    let handles = models()?;
    let pipe = pipeline_for(&handles, args.timeout_ms);
    let explanation = pipe.explain(&args.term, &page.dump.text).await?;

    match args.output.to_ascii_lowercase().as_str() {
        "json" => {
            let payload = serde_json::json!({
                "schema_version": 1,
                "kind": "explain",
                "ok": true,
                "provider": handles.provider,
                "term": args.term,
                "explanation": explanation,
            });
            println!("{payload}");
        }
        _ => println!("{explanation}"),
    }
    Ok(())
}

fn run_clear_highlights(args: ClearHighlightsArgs) -> Result<()> {
    let html = std::fs::read_to_string(&args.file)
        .map_err(|e| anyhow!("read {}: {e}", args.file.display()))?;
    let mut doc = Document::parse(&html);
    let removed = highlight::clear_marks(&mut doc);
    let cleaned = doc.to_html();
    match &args.out {
        Some(path) => {
            std::fs::write(path, cleaned).map_err(|e| anyhow!("write {}: {e}", path.display()))?;
            println!("removed {removed} marks -> {}", path.display());
        }
        None => println!("{cleaned}"),
    }
    Ok(())
}

/// Doctor payload. Config is reported as booleans and sizes only; key
/// material never appears here.
#[derive(Debug, Clone, Serialize)]
struct DoctorReport {
    schema_version: u32,
    kind: &'static str,
    ok: bool,
    name: &'static str,
    version: &'static str,
    platform: DoctorPlatform,
    configured: DoctorConfig,
    elapsed_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
struct DoctorPlatform {
    os: &'static str,
    arch: &'static str,
}

#[derive(Debug, Clone, Serialize)]
struct DoctorConfig {
    model: DoctorModelConfig,
    fetch: DoctorFetchConfig,
}

#[derive(Debug, Clone, Serialize)]
struct DoctorModelConfig {
    provider_env: Option<String>,
    openai_compat: bool,
    ollama: bool,
    selected: &'static str,
}

#[derive(Debug, Clone, Serialize)]
struct DoctorFetchConfig {
    max_bytes: u64,
}

fn run_doctor(args: DoctorArgs) -> Result<()> {
    let started = Instant::now();

    fn has_env(key: &str) -> bool {
        std::env::var(key)
            .map(|v| !v.trim().is_empty())
            .unwrap_or(false)
    }

    let openai_compat =
        has_env("STUDYPIPE_OPENAI_COMPAT_BASE_URL") && has_env("STUDYPIPE_OPENAI_COMPAT_MODEL");
    let ollama = std::env::var("STUDYPIPE_OLLAMA_ENABLE")
        .ok()
        .and_then(|v| v.trim().parse::<bool>().ok())
        .unwrap_or(false);
    let selected = match models() {
        Ok(handles) => handles.provider,
        Err(_) => "none",
    };
    let max_bytes = std::env::var("STUDYPIPE_FETCH_MAX_BYTES")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(studypipe_local::DEFAULT_FETCH_MAX_BYTES);

    let report = DoctorReport {
        schema_version: 1,
        kind: "doctor",
        ok: true,
        name: "studypipe",
        version: env!("CARGO_PKG_VERSION"),
        platform: DoctorPlatform {
            os: std::env::consts::OS,
            arch: std::env::consts::ARCH,
        },
        configured: DoctorConfig {
            model: DoctorModelConfig {
                provider_env: std::env::var("STUDYPIPE_MODEL_PROVIDER").ok(),
                openai_compat,
                ollama,
                selected,
            },
            fetch: DoctorFetchConfig { max_bytes },
        },
        elapsed_ms: started.elapsed().as_millis() as u64,
    };
    match args.output.to_ascii_lowercase().as_str() {
        "text" => {
            println!("studypipe {}", report.version);
            println!("model provider: {selected}");
            println!("openai-compat configured: {openai_compat}");
            println!("ollama configured: {ollama}");
            println!("fetch max bytes: {max_bytes}");
        }
        _ => println!("{}", serde_json::to_string(&report)?),
    }
    Ok(())
}

fn run_version(args: VersionArgs) {
    let payload = serde_json::json!({
        "schema_version": 1,
        "kind": "version",
        "ok": true,
        "name": "studypipe",
        "version": env!("CARGO_PKG_VERSION"),
    });
    match args.output.to_ascii_lowercase().as_str() {
        "text" => println!("studypipe {}", env!("CARGO_PKG_VERSION")),
        _ => println!("{payload}"),
    }
}
