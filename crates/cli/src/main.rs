use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use receiptly_analysis::{AzureDocumentClient, ReceiptAnalyzer};
use receiptly_core::{Diagnostics, Settings};
use receiptly_ocr::OcrBackend;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "receiptly")]
#[command(about = "Analyze a receipt image and print the extracted fields as JSON")]
struct Cli {
    /// Local file path or http(s) URL.
    input: String,

    /// TOML settings file. Missing sections fall back to defaults.
    #[arg(long, env = "RECEIPTLY_CONFIG")]
    config: Option<PathBuf>,

    /// Tag every log line with a per-input session id.
    #[arg(long)]
    diagnostics: bool,

    #[arg(long)]
    pretty: bool,

    /// Tesseract data directory (tesseract builds only).
    #[arg(long, env = "TESSDATA_PREFIX")]
    tessdata: Option<String>,

    #[arg(long, default_value = "eng")]
    lang: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = match &cli.config {
        Some(path) => Settings::load(path).with_context(|| format!("loading settings from {}", path.display()))?,
        None => {
            let mut settings = Settings::default();
            settings.apply_env(&std::env::vars().collect());
            settings
        }
    };

    #[cfg(feature = "tesseract")]
    let recognizer = receiptly_ocr::TesseractRecognizer::new(cli.tessdata.clone(), &cli.lang);
    #[cfg(not(feature = "tesseract"))]
    let recognizer = {
        if cli.tessdata.is_some() {
            tracing::warn!("--tessdata ignored; built without the tesseract feature");
        }
        receiptly_ocr::UnavailableRecognizer
    };

    run(&cli, &settings, recognizer).await
}

async fn run<R: OcrBackend + 'static>(cli: &Cli, settings: &Settings, recognizer: R) -> anyhow::Result<()> {
    let cloud = AzureDocumentClient::new(settings.document.clone())?;
    let analyzer = ReceiptAnalyzer::new(settings, cloud, recognizer)?;

    let is_url = cli.input.starts_with("http://") || cli.input.starts_with("https://");
    let analysis = if is_url {
        let diagnostics = cli.diagnostics.then(|| Diagnostics::for_input(cli.input.as_bytes()));
        analyzer.analyze_url(&cli.input, diagnostics.as_ref()).await?
    } else {
        let bytes = tokio::fs::read(&cli.input).await.with_context(|| format!("reading {}", cli.input))?;
        let diagnostics = cli.diagnostics.then(|| Diagnostics::for_input(&bytes));
        analyzer.analyze_bytes(bytes, diagnostics.as_ref()).await?
    };

    let json = if cli.pretty { serde_json::to_string_pretty(&analysis)? } else { serde_json::to_string(&analysis)? };
    println!("{json}");
    Ok(())
}
