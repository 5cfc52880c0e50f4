//! End-to-end diagnosis of an uploaded image.
//!
//! [`DiagnosisService`] owns everything a request needs: the upload
//! store, a shared [`Classifier`] and the [`NarrativeEnricher`]. A request
//! stores and decodes the upload, preprocesses and predicts, then runs the
//! optional enrichment. Features are measured on the decoded upload at its
//! own resolution. The result is a [`DiagnosisReport`].

use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use time::OffsetDateTime;

use crate::analysis::extract_image_features;
use crate::classifier::Classifier;
use crate::conditions::{ConditionInfo, condition_info, recommendations};
use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::models::{FeatureReport, Prediction};
use crate::narrative::{Narrative, NarrativeEnricher};
use crate::preprocess::{Preprocessor, load_image};
use crate::upload::{StoredUpload, UploadStore};

const TIMESTAMP_FORMAT: &str = "[year]-[month]-[day] [hour]:[minute]:[second]";

/// Everything known about one diagnosed image.
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosisReport {
    /// Stored `<uuid>.<ext>` name
    pub filename: String,
    pub original_filename: String,
    pub prediction: Prediction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub narrative: Option<Narrative>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub features: Option<FeatureReport>,
    pub condition: &'static ConditionInfo,
    pub recommendations: Vec<&'static str>,
    /// Local time, `YYYY-MM-DD HH:MM:SS`
    pub timestamp: String,
}

impl DiagnosisReport {
    /// Human-readable result page.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Image:       {} ({})", self.original_filename, self.filename);
        let _ = writeln!(out, "Analyzed:    {}", self.timestamp);
        let _ = writeln!(out, "Prediction:  {}", self.condition.name);
        let _ = writeln!(out, "Confidence:  {:.2}%", self.prediction.confidence());

        match &self.prediction {
            Prediction::Diagnosed(diagnosis) => {
                if diagnosis.model.is_placeholder() {
                    let _ = writeln!(out, "WARNING: placeholder model in use; this result is not a diagnosis.");
                }
                let mut ranked: Vec<_> = self.prediction.probabilities().into_iter().collect();
                ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
                let _ = writeln!(out, "\nProbabilities:");
                for (label, p) in ranked {
                    let _ = writeln!(out, "  {label:<28} {:>6.2}%", p * 100.0);
                }
            }
            Prediction::Unknown { .. } => {
                let _ = writeln!(out, "The image could not be classified.");
            }
        }

        let _ = writeln!(out, "\nAbout {}", self.condition.name);
        let _ = writeln!(out, "  {}", self.condition.description);
        let _ = writeln!(
            out,
            "  Severity: {}  Prevalence: {}",
            self.condition.severity, self.condition.prevalence
        );
        if !self.condition.warning_signs.is_empty() {
            let _ = writeln!(out, "  Warning signs:");
            for sign in self.condition.warning_signs {
                let _ = writeln!(out, "    - {sign}");
            }
        }
        if !self.condition.treatments.is_empty() {
            let _ = writeln!(out, "  Treatments:");
            for treatment in self.condition.treatments {
                let _ = writeln!(out, "    - {treatment}");
            }
        }
        let _ = writeln!(out, "  Learn more: {}", self.condition.learn_more_url);

        let _ = writeln!(out, "\nRecommendations:");
        for rec in &self.recommendations {
            let _ = writeln!(out, "  - {rec}");
        }

        match &self.narrative {
            Some(Narrative::Analysis(analysis)) => {
                let _ = writeln!(out, "\nAI analysis:");
                let _ = writeln!(out, "  {}", analysis.description);
                for c in &analysis.key_characteristics {
                    let _ = writeln!(out, "    * {c}");
                }
                let _ = writeln!(
                    out,
                    "  Urgency: {} ({})",
                    analysis.urgency_level, analysis.urgency_explanation
                );
                for q in &analysis.followup_questions {
                    let _ = writeln!(out, "    ? {q}");
                }
            }
            Some(Narrative::Failed { .. }) => {
                let _ = writeln!(out, "\nAI analysis unavailable.");
            }
            None => {}
        }

        if let Some(features) = self.features.as_ref().and_then(FeatureReport::features) {
            let _ = writeln!(out, "\nFeatures:");
            let _ = writeln!(
                out,
                "  HSV mean: {:.1} / {:.1} / {:.1}",
                features.color.hue_avg, features.color.saturation_avg, features.color.value_avg
            );
            let _ = writeln!(
                out,
                "  Contrast {:.2}  Energy {:.1}",
                features.texture.contrast, features.texture.energy
            );
            let _ = writeln!(
                out,
                "  Area {:.0}  Circularity {:.3}  Solidity {:.3}",
                features.shape.area, features.shape.circularity, features.shape.solidity
            );
        }

        out.push_str("\nThis tool is for educational purposes only and is not a substitute for professional medical advice.\n");
        out
    }
}

pub struct DiagnosisService {
    uploads: UploadStore,
    classifier: Arc<Classifier>,
    enricher: NarrativeEnricher,
    preprocessor: Preprocessor,
    extract_features: bool,
}

impl DiagnosisService {
    /// Build every collaborator from configuration.
    ///
    /// The model itself is not loaded until the first diagnosis.
    pub fn new(config: &AppConfig) -> Result<Self> {
        config.validate()?;
        let uploads = UploadStore::new(&config.upload.dir, config.upload.policy.clone())?;
        let classifier = Arc::new(Classifier::from_model_dir(
            &config.classifier.model_dir,
            config.classifier.placeholder_seed,
        ));
        let enricher = NarrativeEnricher::new(config.narrative.clone())?;
        Ok(Self::with_parts(uploads, classifier, enricher, Preprocessor::new(config.classifier.input_size))
            .with_features(config.extract_features))
    }

    pub fn with_parts(
        uploads: UploadStore,
        classifier: Arc<Classifier>,
        enricher: NarrativeEnricher,
        preprocessor: Preprocessor,
    ) -> Self {
        Self {
            uploads,
            classifier,
            enricher,
            preprocessor,
            extract_features: false,
        }
    }

    pub fn with_features(mut self, enabled: bool) -> Self {
        self.extract_features = enabled;
        self
    }

    pub fn with_preprocessor(mut self, preprocessor: Preprocessor) -> Self {
        self.preprocessor = preprocessor;
        self
    }

    pub fn classifier(&self) -> &Arc<Classifier> {
        &self.classifier
    }

    pub fn uploads(&self) -> &UploadStore {
        &self.uploads
    }

    /// Diagnose an uploaded payload.
    ///
    /// # Errors
    ///
    /// Upload validation failures and unreadable images. Classifier,
    /// enrichment and feature failures are reported inside the report.
    pub fn diagnose_upload(&self, filename: Option<&str>, bytes: &[u8]) -> Result<DiagnosisReport> {
        let stored = self.uploads.store(filename, bytes)?;
        self.diagnose_stored(stored)
    }

    /// Diagnose a local file by passing it through the upload store.
    pub fn diagnose_file(&self, path: &Path) -> Result<DiagnosisReport> {
        let stored = self.uploads.store_file(path)?;
        self.diagnose_stored(stored)
    }

    fn diagnose_stored(&self, stored: StoredUpload) -> Result<DiagnosisReport> {
        let image = load_image(&stored.path).inspect_err(|err| {
            tracing::error!("Error preprocessing image: {err}");
        })?;
        // Shape features are measured in pixels of the upload itself
        let features = self.extract_features.then(|| extract_image_features(&image));

        let tensor = self.preprocessor.run_image(image)?;
        let prediction = self.classifier.predict(&tensor);
        tracing::info!(
            "Prediction for {}: {} ({:.2}%)",
            stored.filename,
            prediction.label(),
            prediction.confidence()
        );

        let narrative = match &prediction {
            Prediction::Diagnosed(d) => self.enricher.enrich(d.label, d.confidence),
            Prediction::Unknown { .. } => None,
        };

        Ok(DiagnosisReport {
            filename: stored.filename,
            original_filename: stored.original_filename,
            condition: condition_info(prediction.label()),
            recommendations: recommendations(prediction.label()),
            prediction,
            narrative,
            features,
            timestamp: timestamp(now())?,
        })
    }
}

fn now() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

/// Format as `YYYY-MM-DD HH:MM:SS`.
pub fn timestamp(at: OffsetDateTime) -> Result<String> {
    let format =
        time::format_description::parse(TIMESTAMP_FORMAT).map_err(|e| Error::Timestamp(e.to_string()))?;
    at.format(&format).map_err(|e| Error::Timestamp(e.to_string()))
}

/// JSON API envelope: `{success: true, result}` or `{success: false, error}`.
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<DiagnosisReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip)]
    status: u16,
}

impl ApiResponse {
    pub fn from_result(result: Result<DiagnosisReport>) -> Self {
        match result {
            Ok(report) => Self {
                success: true,
                result: Some(report),
                error: None,
                status: 200,
            },
            Err(err) => {
                let status = if err.is_client_error() { 400 } else { 500 };
                if status == 500 {
                    tracing::error!("Error processing request: {err}");
                } else {
                    tracing::warn!("Rejected request: {err}");
                }
                Self {
                    success: false,
                    result: None,
                    error: Some(err.user_message()),
                    status,
                }
            }
        }
    }

    /// HTTP-style status: 200, 400 for client errors, 500 otherwise
    pub fn status_code(&self) -> u16 {
        self.status
    }
}
