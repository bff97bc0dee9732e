use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use docscan_ocr::{DocumentProcessor, DocumentResult, EngineSettings, OcrBackend};

#[derive(Debug, Parser)]
#[command(name = "ocr")]
#[command(about = "Extract structured fields from receipt and invoice images")]
#[command(version)]
struct Cli {
    /// Images to process
    #[arg(required = true)]
    images: Vec<PathBuf>,

    /// Template name; unknown names fall back to the default template
    #[arg(short, long)]
    template: Option<String>,

    /// Write the JSON result here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Directory holding template JSON files
    #[arg(long)]
    templates_dir: Option<PathBuf>,

    /// Engine settings file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Cli {
    fn settings(&self) -> Result<EngineSettings> {
        let mut settings = match &self.config {
            Some(path) => EngineSettings::load(path)
                .with_context(|| format!("loading settings from {}", path.display()))?,
            None => EngineSettings::default(),
        };
        if let Some(dir) = &self.templates_dir {
            settings.templates_dir = dir.clone();
        }
        Ok(settings)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(feature = "tesseract")]
async fn run(cli: Cli) -> Result<bool> {
    let settings = cli.settings()?;
    let data_path = settings.tessdata_dir.as_ref().map(|p| p.to_string_lossy().into_owned());
    let recognizer = docscan_ocr::TesseractRecognizer::new(data_path);
    execute(cli, settings, recognizer).await
}

#[cfg(not(feature = "tesseract"))]
async fn run(cli: Cli) -> Result<bool> {
    let settings = cli.settings()?;
    tracing::warn!("built without the `tesseract` feature; every region will come back empty");
    execute(cli, settings, docscan_ocr::UnavailableRecognizer).await
}

async fn execute<R: OcrBackend + 'static>(cli: Cli, settings: EngineSettings, recognizer: R) -> Result<bool> {
    let processor = DocumentProcessor::open(recognizer, settings).context("opening template registry")?;
    info!(
        images = cli.images.len(),
        templates = ?processor.registry().names(),
        "processing"
    );

    let (json, all_ok) = if let [single] = cli.images.as_slice() {
        let result = processor.process_document(single, cli.template.as_deref());
        let ok = result.success;
        (serde_json::to_string_pretty(&result)?, ok)
    } else {
        let results = processor.process_batch(cli.images.clone(), cli.template.clone()).await;
        let ok = all_succeeded(&results);
        (serde_json::to_string_pretty(&results)?, ok)
    };

    match &cli.output {
        Some(path) => {
            std::fs::write(path, &json).with_context(|| format!("writing {}", path.display()))?;
            println!("Results saved to {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(all_ok)
}

fn all_succeeded(results: &[DocumentResult]) -> bool {
    results.iter().all(|r| r.success)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_image_with_template() {
        let cli = Cli::try_parse_from(["ocr", "bon.jpg", "-t", "invoice"]).unwrap();
        assert_eq!(cli.images, vec![PathBuf::from("bon.jpg")]);
        assert_eq!(cli.template.as_deref(), Some("invoice"));
        assert!(cli.output.is_none());
    }

    #[test]
    fn parses_many_images_and_output() {
        let cli = Cli::try_parse_from(["ocr", "a.png", "b.png", "c.png", "--output", "out.json"]).unwrap();
        assert_eq!(cli.images.len(), 3);
        assert_eq!(cli.output, Some(PathBuf::from("out.json")));
    }

    #[test]
    fn requires_at_least_one_image() {
        assert!(Cli::try_parse_from(["ocr"]).is_err());
        assert!(Cli::try_parse_from(["ocr", "-t", "invoice"]).is_err());
    }

    #[test]
    fn templates_dir_overrides_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("docscan.toml");
        std::fs::write(&config, "templates_dir = \"/etc/docscan\"\nlanguages = \"eng\"\n").unwrap();

        let cli = Cli::try_parse_from([
            "ocr",
            "x.png",
            "--config",
            config.to_str().unwrap(),
            "--templates-dir",
            "/tmp/tpl",
        ])
        .unwrap();
        let settings = cli.settings().unwrap();
        assert_eq!(settings.templates_dir, PathBuf::from("/tmp/tpl"));
        assert_eq!(settings.languages, "eng");
    }

    #[test]
    fn missing_config_is_an_error() {
        let cli = Cli::try_parse_from(["ocr", "x.png", "--config", "/nonexistent/docscan.toml"]).unwrap();
        assert!(cli.settings().is_err());
    }

    #[test]
    fn exit_status_reflects_every_result() {
        let failed = DocumentResult::failed("a", "x");
        assert!(!all_succeeded(&[failed]));
        assert!(all_succeeded(&[]));
    }

    #[tokio::test]
    async fn unreadable_image_writes_failure_and_reports_false() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.json");
        let cli = Cli::try_parse_from([
            "ocr",
            dir.path().join("missing.png").to_str().unwrap(),
            "--templates-dir",
            dir.path().join("templates").to_str().unwrap(),
            "-o",
            out.to_str().unwrap(),
        ])
        .unwrap();
        let settings = cli.settings().unwrap();
        let ok = execute(cli, settings, docscan_ocr::MockRecognizer::new("TOTAL 10,00")).await.unwrap();
        assert!(!ok);
        let written: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(written["success"], false);
        assert!(written["error"].as_str().unwrap().starts_with("Could not load image"));
    }
}
