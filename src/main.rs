use clap::{Args, Parser, Subcommand, ValueEnum};
use futures::StreamExt;
use messages_bridge::config::config_search_paths;
use messages_bridge::translate::convert::{request_convert, response_convert, stream_convert};
use messages_bridge::translate::sse::{decode_byte_stream, SseFrame};
use messages_bridge::translate::{ConvertOptions, Direction};
use messages_bridge::{build_router, AppState, ProxyConfig, SharedLog, TranslateError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio_stream::wrappers::LinesStream;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "messages-bridge",
    about = "Translate between the Anthropic Messages API and the OpenAI Responses API",
    version
)]
struct Cli {
    /// Path to config file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Address to bind (overrides config)
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Journal file path (overrides config)
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Always stream from upstream, even for non-streaming clients
    #[arg(long)]
    force_stream: bool,

    /// Print config search paths and exit
    #[arg(long)]
    show_config_paths: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP bridge (the default)
    Serve,
    /// Translate one request body
    Request(ConvertArgs),
    /// Translate one completed response body
    Response(ConvertArgs),
    /// Translate a recorded event stream
    Stream(StreamArgs),
}

#[derive(Args)]
struct ConvertArgs {
    /// responses-to-messages or messages-to-responses
    #[arg(short, long)]
    direction: Direction,

    /// Input file (stdin when omitted or "-")
    #[arg(long = "in")]
    input: Option<PathBuf>,

    /// Output file (stdout when omitted or "-")
    #[arg(long = "out")]
    output: Option<PathBuf>,

    /// Model name to report in the translated payload
    #[arg(long)]
    model: Option<String>,

    /// max_tokens for Responses requests that omit max_output_tokens
    #[arg(long)]
    default_max_tokens: Option<u64>,
}

#[derive(Args)]
struct StreamArgs {
    #[command(flatten)]
    common: ConvertArgs,

    /// Input and output framing
    #[arg(long, value_enum, default_value_t = StreamFormat::Sse)]
    format: StreamFormat,

    /// Id for the synthesized message_start
    #[arg(long)]
    message_id: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum StreamFormat {
    /// `event:`/`data:` frames separated by blank lines
    Sse,
    /// One JSON event per line
    Ndjson,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "messages_bridge=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if cli.show_config_paths {
        println!("Config search paths:");
        for (i, path) in config_search_paths().iter().enumerate() {
            println!("  {}. {}", i + 1, path.display());
        }
        return Ok(());
    }

    let config = ProxyConfig::find_and_load(cli.config.as_deref())?;

    match cli.command {
        Some(Command::Request(ref args)) => convert_document(args, &config, Kind::Request).await,
        Some(Command::Response(ref args)) => convert_document(args, &config, Kind::Response).await,
        Some(Command::Stream(ref args)) => convert_stream(args).await,
        Some(Command::Serve) | None => serve(&cli, config).await,
    }
}

async fn serve(cli: &Cli, mut config: ProxyConfig) -> anyhow::Result<()> {
    if let Some(ref host) = cli.host {
        config.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(ref file) = cli.log_file {
        config.logging.file = file.clone();
    }
    if cli.force_stream {
        config.upstream.force_stream = true;
    }

    let log = SharedLog::new(
        &config.logging.file,
        config.logging.payloads,
        config.logging.max_chars,
    )?;

    if config.resolve_api_key().is_err() {
        tracing::warn!(
            env = %config.upstream.api_key_env,
            "API key not set; requests must carry the x-openai-api-key header"
        );
    }

    info!("messages-bridge v{}", env!("CARGO_PKG_VERSION"));
    info!("  Upstream:     {}", config.responses_url());
    info!("  Force stream: {}", config.upstream.force_stream);
    info!("  Models:       {} mapped", config.models.len());
    info!("  Journal:      {}", config.logging.file.display());

    log.info(
        messages_bridge::logging::Stage::Startup,
        format!(
            "Starting messages-bridge upstream={} port={}",
            config.responses_url(),
            config.port
        ),
    );

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(config.upstream.timeout_secs))
        .build()?;

    let bind_addr = format!("{}:{}", config.host, config.port);
    let state = Arc::new(AppState::new(config, client, log)?);
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    info!("Listening on http://{}", bind_addr);
    info!("  Point Anthropic clients at it with ANTHROPIC_BASE_URL=http://{}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

#[derive(Clone, Copy)]
enum Kind {
    Request,
    Response,
}

fn options(args: &ConvertArgs, config: &ProxyConfig) -> ConvertOptions {
    ConvertOptions {
        default_max_tokens: args.default_max_tokens.or(config.conversion.default_max_tokens),
        model: args.model.clone(),
        message_id: None,
    }
}

async fn convert_document(
    args: &ConvertArgs,
    config: &ProxyConfig,
    kind: Kind,
) -> anyhow::Result<()> {
    let mut text = String::new();
    open_input(args.input.as_deref()).await?.read_to_string(&mut text).await?;
    let payload: serde_json::Value = serde_json::from_str(&text)?;

    let opts = options(args, config);
    let converted = match kind {
        Kind::Request => request_convert(args.direction, &payload, &opts)?,
        Kind::Response => response_convert(args.direction, &payload, &opts)?,
    };

    let mut out = open_output(args.output.as_deref()).await?;
    out.write_all(serde_json::to_string_pretty(&converted)?.as_bytes()).await?;
    out.write_all(b"\n").await?;
    out.flush().await?;
    Ok(())
}

async fn convert_stream(args: &StreamArgs) -> anyhow::Result<()> {
    let reader = BufReader::new(open_input(args.common.input.as_deref()).await?);
    let lines = LinesStream::new(reader.lines());
    let opts = ConvertOptions {
        default_max_tokens: args.common.default_max_tokens,
        model: args.common.model.clone(),
        message_id: args.message_id.clone(),
    };

    let frames = match args.format {
        StreamFormat::Sse => {
            let bytes = lines.map(|line| {
                line.map(|mut l| {
                    l.push('\n');
                    l.into_bytes()
                })
            });
            stream_convert(args.common.direction, decode_byte_stream(bytes), opts).boxed()
        }
        StreamFormat::Ndjson => {
            let frames = lines.filter_map(|line| async move {
                match line {
                    Ok(l) if l.trim().is_empty() => None,
                    Ok(l) => Some(Ok(SseFrame::data_only(l))),
                    Err(e) => Some(Err(TranslateError::interrupted(e.to_string()))),
                }
            });
            stream_convert(args.common.direction, frames, opts).boxed()
        }
    };

    let mut out = open_output(args.common.output.as_deref()).await?;
    futures::pin_mut!(frames);
    while let Some(frame) = frames.next().await {
        let text = match args.format {
            StreamFormat::Sse => frame.to_wire(),
            StreamFormat::Ndjson => format!("{}\n", frame.data),
        };
        out.write_all(text.as_bytes()).await?;
    }
    out.flush().await?;
    Ok(())
}

async fn open_input(path: Option<&Path>) -> anyhow::Result<Box<dyn AsyncRead + Unpin + Send>> {
    Ok(match path {
        Some(p) if p != Path::new("-") => Box::new(tokio::fs::File::open(p).await?),
        _ => Box::new(tokio::io::stdin()),
    })
}

async fn open_output(path: Option<&Path>) -> anyhow::Result<Box<dyn AsyncWrite + Unpin + Send>> {
    Ok(match path {
        Some(p) if p != Path::new("-") => Box::new(tokio::fs::File::create(p).await?),
        _ => Box::new(tokio::io::stdout()),
    })
}
