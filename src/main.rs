use anyhow::{bail, Context};
use bytes::Bytes;
use redis_lua_mock::{Store, StoreConfig};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: redis-lua-mock [--config FILE] SCRIPT [KEY...] [-- ARG...]";

struct Args {
    config: Option<PathBuf>,
    script: PathBuf,
    keys: Vec<Bytes>,
    argv: Vec<Bytes>,
}

fn parse_args(mut raw: impl Iterator<Item = String>) -> anyhow::Result<Args> {
    let mut config = None;
    let mut script = None;
    let mut keys = Vec::new();
    let mut argv = Vec::new();
    let mut after_separator = false;

    while let Some(arg) = raw.next() {
        if after_separator {
            argv.push(Bytes::from(arg));
            continue;
        }
        match arg.as_str() {
            "--" => after_separator = true,
            "--config" | "-c" => match raw.next() {
                Some(path) => config = Some(PathBuf::from(path)),
                None => bail!("--config needs a file\n{}", USAGE),
            },
            "--help" | "-h" => bail!("{}", USAGE),
            _ if script.is_none() => script = Some(PathBuf::from(arg)),
            _ => keys.push(Bytes::from(arg)),
        }
    }

    let Some(script) = script else {
        bail!("missing SCRIPT\n{}", USAGE);
    };
    Ok(Args {
        config,
        script,
        keys,
        argv,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging; stdout carries the result, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = parse_args(std::env::args().skip(1))?;

    let config = match &args.config {
        Some(path) => StoreConfig::from_file(path)?,
        None => StoreConfig::default(),
    };

    let source = std::fs::read_to_string(&args.script)
        .with_context(|| format!("Failed to read script {}", args.script.display()))?;

    info!("Running {}", args.script.display());

    let store = Store::with_config(config)?;
    let result = store.eval(&source, &args.keys, &args.argv).await?;
    store.disconnect();

    println!("{}", serde_json::to_string(&result)?);
    Ok(())
}
