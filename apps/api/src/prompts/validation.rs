use serde::Deserialize;
use uuid::Uuid;

use crate::errors::AppError;

const TITLE_CHARS: (usize, usize) = (3, 100);
const DESCRIPTION_CHARS: (usize, usize) = (10, 500);
const MIN_CONTENT_CHARS: usize = 10;

/// Body of `POST /api/prompts`. Every field is optional at the wire level so
/// that a missing field is reported as a validation error rather than a
/// deserialization rejection.
#[derive(Debug, Default, Deserialize)]
pub struct CreatePromptRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub content: Option<String>,
    pub model: Option<String>,
    pub price: Option<f64>,
    pub category_id: Option<Uuid>,
    pub published: Option<bool>,
}

/// Body of `PATCH /api/prompts/:id`; absent fields are left unchanged.
#[derive(Debug, Default, Deserialize)]
pub struct UpdatePromptRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub content: Option<String>,
    pub model: Option<String>,
    pub price: Option<f64>,
    pub category_id: Option<Uuid>,
    pub published: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewPrompt {
    pub title: String,
    pub description: String,
    pub content: String,
    pub model: String,
    pub price: f64,
    pub category_id: Uuid,
    pub published: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PromptChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub content: Option<String>,
    pub model: Option<String>,
    pub price: Option<f64>,
    pub category_id: Option<Uuid>,
    pub published: Option<bool>,
}

impl CreatePromptRequest {
    pub fn validate(self) -> Result<NewPrompt, AppError> {
        let (Some(title), Some(description), Some(content), Some(model), Some(category_id)) = (
            self.title,
            self.description,
            self.content,
            self.model,
            self.category_id,
        ) else {
            return Err(AppError::Validation("Missing required fields".to_string()));
        };

        Ok(NewPrompt {
            title: title_field(&title)?,
            description: description_field(&description)?,
            content: content_field(content)?,
            model: model_field(&model)?,
            price: price_field(self.price.unwrap_or(0.0))?,
            category_id,
            published: self.published.unwrap_or(true),
        })
    }
}

impl UpdatePromptRequest {
    pub fn validate(self) -> Result<PromptChanges, AppError> {
        Ok(PromptChanges {
            title: self.title.as_deref().map(title_field).transpose()?,
            description: self.description.as_deref().map(description_field).transpose()?,
            content: self.content.map(content_field).transpose()?,
            model: self.model.as_deref().map(model_field).transpose()?,
            price: self.price.map(price_field).transpose()?,
            category_id: self.category_id,
            published: self.published,
        })
    }
}

fn bounded(field: &str, raw: &str, (min, max): (usize, usize)) -> Result<String, AppError> {
    let value = raw.trim();
    let len = value.chars().count();
    if len < min || len > max {
        return Err(AppError::Validation(format!(
            "{field} must be between {min} and {max} characters"
        )));
    }
    Ok(value.to_string())
}

fn title_field(raw: &str) -> Result<String, AppError> {
    bounded("Title", raw, TITLE_CHARS)
}

fn description_field(raw: &str) -> Result<String, AppError> {
    bounded("Description", raw, DESCRIPTION_CHARS)
}

/// Content is stored verbatim; only its trimmed length is checked.
fn content_field(raw: String) -> Result<String, AppError> {
    if raw.trim().chars().count() < MIN_CONTENT_CHARS {
        return Err(AppError::Validation(format!(
            "Content must be at least {MIN_CONTENT_CHARS} characters"
        )));
    }
    Ok(raw)
}

fn model_field(raw: &str) -> Result<String, AppError> {
    let model = raw.trim();
    if model.is_empty() {
        return Err(AppError::Validation("Model is required".to_string()));
    }
    Ok(model.to_string())
}

fn price_field(price: f64) -> Result<f64, AppError> {
    if !price.is_finite() || price < 0.0 {
        return Err(AppError::Validation(
            "Price must be a non-negative number".to_string(),
        ));
    }
    Ok(price)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_request() -> CreatePromptRequest {
        CreatePromptRequest {
            title: Some("  SEO Blog Writer ".to_string()),
            description: Some("Writes long-form SEO articles".to_string()),
            content: Some("Write a blog post about {{input}}".to_string()),
            model: Some("gpt-4".to_string()),
            price: None,
            category_id: Some(Uuid::nil()),
            published: None,
        }
    }

    #[test]
    fn test_create_applies_defaults_and_trims() {
        let prompt = valid_request().validate().unwrap();
        assert_eq!(prompt.title, "SEO Blog Writer");
        assert_eq!(prompt.price, 0.0);
        assert!(prompt.published);
    }

    #[test]
    fn test_create_reports_missing_fields() {
        let req = CreatePromptRequest {
            model: None,
            ..valid_request()
        };
        let err = req.validate().unwrap_err();
        assert!(matches!(err, AppError::Validation(ref m) if m == "Missing required fields"));
    }

    #[test]
    fn test_title_length_bounds() {
        let longest = "x".repeat(100);
        let too_long = "x".repeat(101);
        for (title, ok) in [("ab", false), ("abc", true), (&longest[..], true), (&too_long[..], false)] {
            let req = CreatePromptRequest {
                title: Some(title.to_string()),
                ..valid_request()
            };
            assert_eq!(req.validate().is_ok(), ok, "title of {} chars", title.len());
        }
    }

    #[test]
    fn test_description_and_content_minimums() {
        let short_description = CreatePromptRequest {
            description: Some("too short".to_string()),
            ..valid_request()
        };
        assert!(short_description.validate().is_err());

        let short_content = CreatePromptRequest {
            content: Some("   hi   ".to_string()),
            ..valid_request()
        };
        assert!(short_content.validate().is_err());
    }

    #[test]
    fn test_price_must_be_non_negative_and_finite() {
        for price in [-0.01, f64::NAN, f64::INFINITY] {
            let req = CreatePromptRequest {
                price: Some(price),
                ..valid_request()
            };
            assert!(req.validate().is_err(), "price {price} accepted");
        }
        let free = CreatePromptRequest {
            price: Some(0.0),
            ..valid_request()
        };
        assert_eq!(free.validate().unwrap().price, 0.0);
    }

    #[test]
    fn test_blank_model_is_rejected() {
        let req = CreatePromptRequest {
            model: Some("   ".to_string()),
            ..valid_request()
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_update_checks_only_present_fields() {
        let changes = UpdatePromptRequest {
            price: Some(4.99),
            published: Some(false),
            ..Default::default()
        }
        .validate()
        .unwrap();
        assert_eq!(changes.price, Some(4.99));
        assert_eq!(changes.published, Some(false));
        assert_eq!(changes.title, None);

        let bad = UpdatePromptRequest {
            title: Some("x".to_string()),
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }
}
