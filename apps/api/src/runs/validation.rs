//! Run form validation. Every problem is reported at once, one message per field,
//! before any collaborator is built.

use serde::Serialize;

use crate::config::Config;
use crate::pipeline::{ExperienceLevel, SalaryBand, SearchPreferences, WorkArrangement};
use crate::runs::collaborators::Credentials;
use crate::runs::upload::ResumeUpload;

pub const MAX_TOPIC_CHARS: usize = 200;

/// Raw multipart fields, before validation.
#[derive(Debug, Default)]
pub struct RunForm {
    pub topic: String,
    pub work_arrangement: String,
    pub experience_level: String,
    pub salary_band: String,
    pub deep_search: bool,
    pub model_api_key: String,
    pub search_api_key: String,
    pub resume: Option<ResumeUpload>,
    pub resume_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

#[derive(Debug)]
pub enum ResumeSource {
    Upload(ResumeUpload),
    Pasted(String),
}

/// A form that passed validation.
#[derive(Debug)]
pub struct ValidRun {
    pub preferences: SearchPreferences,
    pub credentials: Credentials,
    pub resume: ResumeSource,
}

/// Blank credentials fall back to the keys configured for the server.
pub fn validate(form: RunForm, config: &Config) -> Result<ValidRun, Vec<FieldError>> {
    let mut errors = Vec::new();

    let model_api_key = credential(&form.model_api_key, config.google_api_key.as_deref());
    if model_api_key.is_none() {
        errors.push(FieldError::new(
            "model_api_key",
            "Please enter your Google Gemini API key.",
        ));
    }
    let search_api_key = credential(&form.search_api_key, config.serper_api_key.as_deref());
    if search_api_key.is_none() {
        errors.push(FieldError::new(
            "search_api_key",
            "Please enter your Serper API key.",
        ));
    }

    let topic = form.topic.trim().to_string();
    if topic.is_empty() {
        errors.push(FieldError::new("topic", "Please enter a job title or topic."));
    } else if topic.chars().count() > MAX_TOPIC_CHARS {
        errors.push(FieldError::new(
            "topic",
            format!("Job title or topic must be at most {MAX_TOPIC_CHARS} characters."),
        ));
    }

    let work_arrangement = option_field(
        &mut errors,
        "work_arrangement",
        &form.work_arrangement,
        WorkArrangement::parse,
    );
    let experience_level = option_field(
        &mut errors,
        "experience_level",
        &form.experience_level,
        ExperienceLevel::parse,
    );
    let salary_band = option_field(&mut errors, "salary_band", &form.salary_band, SalaryBand::parse);

    let pasted = form.resume_text.trim();
    let resume = match form.resume {
        Some(upload) if !upload.bytes.is_empty() => Some(ResumeSource::Upload(upload)),
        _ if !pasted.is_empty() => Some(ResumeSource::Pasted(pasted.to_string())),
        _ => {
            errors.push(FieldError::new(
                "resume",
                "Please upload your résumé (PDF or text file) or paste its text.",
            ));
            None
        }
    };

    match (model_api_key, search_api_key, resume) {
        (Some(model_api_key), Some(search_api_key), Some(resume)) if errors.is_empty() => {
            Ok(ValidRun {
                preferences: SearchPreferences {
                    topic,
                    work_arrangement,
                    experience_level,
                    salary_band,
                    deep_search: form.deep_search,
                },
                credentials: Credentials {
                    model_api_key,
                    search_api_key,
                },
                resume,
            })
        }
        _ => Err(errors),
    }
}

fn credential(submitted: &str, configured: Option<&str>) -> Option<String> {
    let submitted = submitted.trim();
    if !submitted.is_empty() {
        return Some(submitted.to_string());
    }
    configured.map(str::to_string)
}

/// Blank selects the default option.
fn option_field<T: Default>(
    errors: &mut Vec<FieldError>,
    field: &'static str,
    raw: &str,
    parse: fn(&str) -> Option<T>,
) -> T {
    if raw.trim().is_empty() {
        return T::default();
    }
    parse(raw).unwrap_or_else(|| {
        errors.push(FieldError::new(field, format!("Unknown option '{}'.", raw.trim())));
        T::default()
    })
}

/// Parses checkbox-style booleans.
pub fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "true" | "on" | "1" | "yes"
    )
}
