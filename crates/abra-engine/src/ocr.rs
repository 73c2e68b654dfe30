use std::path::PathBuf;
use std::process::Command;

use anyhow::{bail, Context, Result};
use image::{GrayImage, ImageFormat};
use tracing::debug;

use crate::config::non_empty_env;

pub const DEFAULT_TESSERACT_CMD: &str = "tesseract";
pub const DEFAULT_LANGUAGE: &str = "eng";
pub const DEFAULT_ENGINE_MODE: &str = "3";

/// Turns a preprocessed image into text.
pub trait TextRecognizer: Send + Sync {
    fn recognize(&self, image: &GrayImage) -> Result<String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcrConfig {
    pub binary: PathBuf,
    pub language: String,
    pub engine_mode: String,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from(DEFAULT_TESSERACT_CMD),
            language: DEFAULT_LANGUAGE.to_string(),
            engine_mode: DEFAULT_ENGINE_MODE.to_string(),
        }
    }
}

impl OcrConfig {
    /// `TESSERACT_CMD` overrides the executable; language and engine mode are
    /// fixed.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(binary) = non_empty_env("TESSERACT_CMD") {
            config.binary = PathBuf::from(binary);
        }
        config
    }
}

/// Runs the `tesseract` executable on a temporary PNG and reads stdout.
#[derive(Debug, Clone, Default)]
pub struct TesseractCli {
    config: OcrConfig,
}

impl TesseractCli {
    pub fn new(config: OcrConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &OcrConfig {
        &self.config
    }
}

impl TextRecognizer for TesseractCli {
    fn recognize(&self, image: &GrayImage) -> Result<String> {
        let input = tempfile::Builder::new()
            .prefix("abra-ocr-")
            .suffix(".png")
            .tempfile()
            .context("failed to create OCR input file")?;
        image
            .save_with_format(input.path(), ImageFormat::Png)
            .context("failed to write OCR input image")?;

        debug!(
            binary = %self.config.binary.display(),
            width = image.width(),
            height = image.height(),
            "running tesseract"
        );
        let output = Command::new(&self.config.binary)
            .arg(input.path())
            .arg("stdout")
            .arg("--oem")
            .arg(&self.config.engine_mode)
            .arg("-l")
            .arg(&self.config.language)
            .output()
            .with_context(|| {
                format!(
                    "failed to launch OCR engine ({})",
                    self.config.binary.display()
                )
            })?;
        if !output.status.success() {
            bail!(
                "OCR engine exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_use_english_and_lstm_engine() {
        let config = OcrConfig::default();
        assert_eq!(config.binary, PathBuf::from("tesseract"));
        assert_eq!(config.language, "eng");
        assert_eq!(config.engine_mode, "3");
    }

    #[test]
    fn missing_binary_reports_launch_failure() {
        let recognizer = TesseractCli::new(OcrConfig {
            binary: PathBuf::from("/nonexistent/abra-tesseract"),
            ..OcrConfig::default()
        });
        let err = recognizer.recognize(&GrayImage::new(4, 4)).unwrap_err();
        assert!(err.to_string().contains("failed to launch OCR engine"));
    }
}
