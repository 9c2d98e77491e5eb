//! Artgate CLI - provider routing for creative image generation

use std::path::{Path, PathBuf};

use artgate_core::config::credentials::EnvCredentials;
use artgate_core::config::{Config, ProviderConfig, resolve_provider_config_with};
use artgate_core::generation::prompt::{decode_data_uri, extension_for_mime};
use artgate_core::generation::{
    AnimateExtra, GenerateParams, GenerateResult, InpaintExtra, RotateExtra, SceneExtra,
    StylePreset, ToolRequest, generate, generate_batch, generate_with_failover,
    list_provider_status, variants,
};
use artgate_core::providers::PollPolicy;
use artgate_core::routing::{
    ProviderName, ProviderResolver, resolve_text_provider, resolve_voice_provider,
};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};

#[cfg(test)]
mod main_tests;

#[derive(Parser)]
#[command(name = "artgate")]
#[command(author, version, about = "Provider routing for creative image generation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Show which provider a request would route to
    Resolve {
        /// Creative mode (pixel, game, ui, social, business)
        #[arg(short, long)]
        mode: Option<String>,
        /// Tool (generate, animate, rotate, inpaint, scene)
        #[arg(short, long, default_value = "generate")]
        tool: String,
        /// Use the HD matrix
        #[arg(long)]
        hd: bool,
        /// Style preset
        #[arg(short, long)]
        style: Option<String>,
        /// Also show the full failover order
        #[arg(long)]
        all: bool,
    },

    /// List providers and whether they are configured
    Providers,

    /// Run a generation
    Generate(GenerateArgs),

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Args)]
struct GenerateArgs {
    /// Prompt text
    prompt: String,

    /// Provider to call (defaults to the routed provider)
    #[arg(short, long)]
    provider: Option<ProviderName>,

    /// Fall back down the ranked candidates on provider failures
    #[arg(long, conflicts_with_all = ["provider", "count"])]
    failover: bool,

    /// Creative mode used for routing
    #[arg(short, long)]
    mode: Option<String>,

    /// Use the HD matrix
    #[arg(long)]
    hd: bool,

    /// Style preset
    #[arg(short, long)]
    style: Option<StylePreset>,

    #[arg(long, default_value_t = 512)]
    width: u32,

    #[arg(long, default_value_t = 512)]
    height: u32,

    #[arg(long)]
    seed: Option<u64>,

    #[arg(long)]
    steps: Option<u32>,

    #[arg(long)]
    negative: Option<String>,

    /// Vendor model or checkpoint to use instead of the default
    #[arg(long)]
    model: Option<String>,

    /// Generate this many variants concurrently
    #[arg(long, default_value_t = 1)]
    count: usize,

    /// Your own API key, sent only to the provider named with --provider
    #[arg(long, requires = "provider")]
    api_key: Option<String>,

    /// ComfyUI host to use instead of the configured one
    #[arg(long)]
    comfyui_host: Option<String>,

    /// Write images here (data URIs are decoded, remote URLs are printed)
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[command(subcommand)]
    tool: Option<ToolArgs>,
}

#[derive(Subcommand, Clone)]
enum ToolArgs {
    /// Sprite animation frames
    Animate {
        #[arg(long, default_value_t = 4)]
        frames: u32,
        #[arg(long, default_value_t = 8)]
        fps: u32,
        #[arg(long)]
        reference: Option<String>,
    },
    /// Rotated views of a reference image
    Rotate {
        reference: String,
        #[arg(long, default_value_t = 4)]
        directions: u32,
    },
    /// Repaint the masked region of an image
    Inpaint { image: String, mask: String },
    /// Tile grid for a scene
    Scene {
        #[arg(long)]
        grid_width: u32,
        #[arg(long)]
        grid_height: u32,
        #[arg(long, default_value_t = 32)]
        tile_size: u32,
    },
}

impl From<ToolArgs> for ToolRequest {
    fn from(args: ToolArgs) -> Self {
        match args {
            ToolArgs::Animate {
                frames,
                fps,
                reference,
            } => ToolRequest::Animate(AnimateExtra {
                frames,
                fps,
                looping: true,
                reference_image_url: reference,
            }),
            ToolArgs::Rotate {
                reference,
                directions,
            } => ToolRequest::Rotate(RotateExtra {
                reference_image_url: reference,
                directions,
            }),
            ToolArgs::Inpaint { image, mask } => ToolRequest::Inpaint(InpaintExtra {
                image_url: image,
                mask_url: mask,
            }),
            ToolArgs::Scene {
                grid_width,
                grid_height,
                tile_size,
            } => ToolRequest::Scene(SceneExtra {
                grid_width,
                grid_height,
                tile_size,
            }),
        }
    }
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a configuration value
    Get { key: String },
    /// Set a configuration value
    Set { key: String, value: String },
    /// List all configuration values
    List,
    /// Reset configuration to defaults
    Reset,
    /// Show config file path
    Path,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is normal
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("artgate=info".parse()?)
                .add_directive("artgate_core=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Resolve {
            mode,
            tool,
            hd,
            style,
            all,
        } => cmd_resolve(mode, &tool, hd, style.as_deref(), all, cli.format),
        Commands::Providers => cmd_providers(cli.format, cli.quiet),
        Commands::Generate(args) => cmd_generate(args, cli.format, cli.quiet).await,
        Commands::Config { action } => cmd_config(action, cli.quiet),
    }
}

fn cmd_resolve(
    mode: Option<String>,
    tool: &str,
    hd: bool,
    style: Option<&str>,
    all: bool,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let config = Config::load()?;
    let mode = mode.unwrap_or(config.routing.default_mode);
    let use_hd = hd || config.routing.prefer_hd;

    let resolver = ProviderResolver::from_env();
    let provider = resolver.resolve(&mode, tool, use_hd, style);
    let candidates = resolver.candidates(&mode, tool, use_hd, style);
    let voice = resolve_voice_provider();
    let text = resolve_text_provider();

    if format == OutputFormat::Json {
        let out = serde_json::json!({
            "provider": provider,
            "candidates": if all { Some(&candidates) } else { None },
            "voice": voice,
            "text": text,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("Image: {}", provider);
    if all {
        let order: Vec<String> = candidates.iter().map(ToString::to_string).collect();
        println!("  Failover order: {}", order.join(" -> "));
    }
    println!(
        "Voice: {}",
        voice.map_or_else(|| "none configured".to_string(), |v| v.to_string())
    );
    println!(
        "Text:  {}",
        text.map_or_else(|| "none configured".to_string(), |t| t.to_string())
    );
    Ok(())
}

fn cmd_providers(format: OutputFormat, quiet: bool) -> anyhow::Result<()> {
    let status = list_provider_status();

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    if !quiet {
        println!("Providers:");
    }
    for s in status {
        let marker = if s.configured { "[OK]" } else { "[--]" };
        let cost = if s.free { " (free)" } else { "" };
        println!("  {} {}{}", marker, s.display_name, cost);
        if !s.configured
            && !quiet
            && let Some(var) = s.env_var
        {
            println!("       Set {} ({})", var, s.key_url);
        }
    }
    Ok(())
}

/// Per-provider config from the environment, BYOK flags and the settings file
fn provider_config(
    settings: &Config,
    provider: ProviderName,
    api_key: Option<&str>,
    comfyui_host: Option<&str>,
) -> ProviderConfig {
    let config = resolve_provider_config_with(
        &EnvCredentials,
        &settings.generation,
        provider,
        api_key,
        comfyui_host,
    );
    if settings.polling.is_set() {
        config.with_poll_policy(settings.polling.apply(PollPolicy::for_provider(provider)))
    } else {
        config
    }
}

async fn cmd_generate(args: GenerateArgs, format: OutputFormat, quiet: bool) -> anyhow::Result<()> {
    let settings = Config::load()?;
    let mode = args
        .mode
        .clone()
        .unwrap_or_else(|| settings.routing.default_mode.clone());
    let use_hd = args.hd || settings.routing.prefer_hd;

    let mut params = GenerateParams::new(&args.prompt).with_size(args.width, args.height);
    if let Some(tool) = args.tool.clone() {
        params = params.with_request(tool.into());
    }
    if let Some(style) = args.style {
        params = params.with_style(style);
    }
    if let Some(seed) = args.seed {
        params = params.with_seed(seed);
    }
    if let Some(steps) = args.steps {
        params = params.with_steps(steps);
    }
    if let Some(negative) = &args.negative {
        params = params.with_negative_prompt(negative);
    }
    if let Some(model) = &args.model {
        params = params.with_model(model);
    }

    let api_key = args.api_key.as_deref();
    let host = args.comfyui_host.as_deref();

    let results = if args.failover {
        let resolver = ProviderResolver::from_env();
        // BYOK keys are bound to --provider, so every candidate uses env credentials
        let result = generate_with_failover(&resolver, &mode, use_hd, &params, |provider| {
            provider_config(&settings, provider, None, host)
        })
        .await?;
        vec![result]
    } else {
        let provider = match args.provider {
            Some(p) => p,
            None => ProviderResolver::from_env().resolve(
                &mode,
                &params.tool().to_string(),
                use_hd,
                args.style.map(|s| s.id()),
            ),
        };
        let config = provider_config(&settings, provider, api_key, host);
        info!(%provider, tool = %params.tool(), count = args.count, "Generating");

        if args.count > 1 {
            let outcome = generate_batch(provider, &variants(&params, args.count), &config).await?;
            for (index, e) in &outcome.failures {
                warn!(index, error = %e, "Variant failed");
            }
            outcome.results
        } else {
            vec![generate(provider, &params, &config).await?]
        }
    };

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        for result in &results {
            print_result(result, quiet);
        }
    }

    if let Some(output) = &args.output {
        let written = write_outputs(output, &results)?;
        if !quiet {
            for path in written {
                println!("Wrote {}", path.display());
            }
        }
    }
    Ok(())
}

fn print_result(result: &GenerateResult, quiet: bool) {
    if quiet {
        for url in result.all_urls() {
            println!("{}", shorten(url));
        }
        return;
    }

    println!("Provider: {}", result.provider);
    println!("  Model: {}", result.model);
    if let Some(job) = &result.provider_job_id {
        println!("  Job: {}", job);
    }
    if let Some(seed) = result.resolved_seed {
        println!("  Seed: {}", seed);
    }
    println!("  Duration: {} ms", result.duration_ms);
    println!("  Prompt: {}", result.prompt_used);
    for url in result.all_urls() {
        println!("  Image: {}", shorten(url));
    }
}

/// Data URIs are unreadable in a terminal
fn shorten(url: &str) -> String {
    if url.starts_with("data:") {
        let mime = url
            .trim_start_matches("data:")
            .split(';')
            .next()
            .unwrap_or("image");
        format!("<{} data, {} bytes encoded>", mime, url.len())
    } else {
        url.to_string()
    }
}

/// Write every inline image under `output`, numbering files after the first
fn write_outputs(output: &Path, results: &[GenerateResult]) -> anyhow::Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    let urls: Vec<&str> = results.iter().flat_map(|r| r.all_urls()).collect();

    for (index, url) in urls.iter().enumerate() {
        let Some((mime, bytes)) = decode_data_uri(url) else {
            println!("Remote image (not downloaded): {}", url);
            continue;
        };
        let path = output_path(output, index, extension_for_mime(&mime));
        if let Some(dir) = path.parent()
            && !dir.as_os_str().is_empty()
        {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(&path, bytes)?;
        written.push(path);
    }
    Ok(written)
}

fn output_path(output: &Path, index: usize, extension: &str) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    let ext = output
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| extension.to_string());
    let name = if index == 0 {
        format!("{}.{}", stem, ext)
    } else {
        format!("{}-{}.{}", stem, index + 1, ext)
    };
    output.with_file_name(name)
}

fn cmd_config(action: ConfigAction, quiet: bool) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            println!("{}", config.get(&key)?);
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            config.save()?;
            if !quiet {
                println!("Set {} = {}", key, value);
            }
        }
        ConfigAction::List => {
            let config = Config::load()?;
            for (key, value) in config.list()? {
                println!("{} = {}", key, value);
            }
        }
        ConfigAction::Reset => {
            Config::reset()?;
            if !quiet {
                println!("Configuration reset to defaults.");
            }
        }
        ConfigAction::Path => {
            println!("{}", Config::config_path()?.display());
        }
    }
    Ok(())
}
