use image::DynamicImage;
use thiserror::Error;
use tracing::{info, warn};

use crate::client::MetaAiClient;
use crate::config::{non_empty_env, ClientConfig};
use crate::image_pipeline::{decode_image, preprocess_image};
use crate::ocr::{OcrConfig, TesseractCli, TextRecognizer};
use crate::transport::{HttpTransport, Transport};

/// Instructions appended to OCR text when asking the conversational backend
/// to structure an invoice.
pub const INVOICE_PROMPT: &str = include_str!("../resources/invoice_prompt.txt");

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Failed to retrieve image {0}")]
    ImageRetrieval(String),
    #[error("Failed to process image {0}")]
    Processing(String),
}

impl ServiceError {
    fn processing(err: impl std::fmt::Display) -> Self {
        Self::Processing(err.to_string())
    }
}

/// Post-processes OCR output into its final form.
pub trait Refiner: Send + Sync {
    fn refine(&self, text: &str) -> anyhow::Result<String>;
}

/// Sends OCR text plus [`INVOICE_PROMPT`] through a fresh client session and
/// returns the reply text.
#[derive(Debug, Clone)]
pub struct MetaAiRefiner {
    config: ClientConfig,
}

impl MetaAiRefiner {
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }
}

impl Refiner for MetaAiRefiner {
    fn refine(&self, text: &str) -> anyhow::Result<String> {
        let mut client = MetaAiClient::connect(self.config.clone())?;
        let reply = client.prompt(&refinement_prompt(text), false)?;
        Ok(reply.message)
    }
}

pub fn refinement_prompt(ocr_text: &str) -> String {
    format!("{ocr_text}{INVOICE_PROMPT}")
}

/// Download, preprocess, recognize and optionally refine.
pub struct TextExtractionService {
    downloader: Box<dyn Transport>,
    recognizer: Box<dyn TextRecognizer>,
    refiner: Option<Box<dyn Refiner>>,
    refine_default: bool,
}

impl TextExtractionService {
    pub fn new(downloader: Box<dyn Transport>, recognizer: Box<dyn TextRecognizer>) -> Self {
        Self {
            downloader,
            recognizer,
            refiner: None,
            refine_default: false,
        }
    }

    /// Wires the HTTP downloader, the tesseract CLI and a backend refiner from
    /// environment configuration. `ABRA_REFINE_DEFAULT` decides refinement for
    /// requests that do not say.
    pub fn from_env() -> abra_contracts::Result<Self> {
        let client_config = ClientConfig::from_env();
        let downloader = HttpTransport::new(&client_config)?;
        let refine_default = non_empty_env("ABRA_REFINE_DEFAULT")
            .map(|value| parse_flag(&value))
            .unwrap_or(false);
        Ok(Self::new(
            Box::new(downloader),
            Box::new(TesseractCli::new(OcrConfig::from_env())),
        )
        .with_refiner(Box::new(MetaAiRefiner::new(client_config)))
        .with_refine_default(refine_default))
    }

    pub fn with_refiner(mut self, refiner: Box<dyn Refiner>) -> Self {
        self.refiner = Some(refiner);
        self
    }

    pub fn with_refine_default(mut self, refine_default: bool) -> Self {
        self.refine_default = refine_default;
        self
    }

    pub fn refine_default(&self) -> bool {
        self.refine_default
    }

    pub fn fetch_image(&self, url: &str) -> Result<Vec<u8>, ServiceError> {
        self.downloader
            .get_bytes(url)
            .map_err(|err| ServiceError::ImageRetrieval(err.to_string()))
    }

    /// Full pipeline for an image behind `url`.
    pub fn retrieve_text(&self, url: &str, refine: Option<bool>) -> Result<String, ServiceError> {
        let bytes = self.fetch_image(url)?;
        info!(url, bytes = bytes.len(), "retrieved image");
        self.extract_from_bytes(&bytes, refine)
    }

    pub fn extract_from_bytes(
        &self,
        bytes: &[u8],
        refine: Option<bool>,
    ) -> Result<String, ServiceError> {
        let image =
            decode_image(bytes).map_err(|err| ServiceError::processing(format!("{err:#}")))?;
        self.extract_from_image(&image, refine)
    }

    pub fn extract_from_image(
        &self,
        image: &DynamicImage,
        refine: Option<bool>,
    ) -> Result<String, ServiceError> {
        let processed = preprocess_image(image);
        let text = self
            .recognizer
            .recognize(&processed)
            .map_err(|err| ServiceError::processing(format!("{err:#}")))?;
        if !refine.unwrap_or(self.refine_default) {
            return Ok(text);
        }
        let Some(refiner) = self.refiner.as_ref() else {
            warn!("refinement requested without a configured refiner");
            return Err(ServiceError::processing("refinement is not configured"));
        };
        refiner
            .refine(&text)
            .map_err(|err| ServiceError::processing(format!("{err:#}")))
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
