//! HTML rendering with `tera`.
//!
//! All templates are compiled into the binary and parsed once at startup.
//! Pages extend `base.html` and include the navigation partial.

use anyhow::{bail, Context as _, Result};
use chrono::{DateTime, Datelike, TimeZone, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use tera::{Context, Tera};

use crate::{models::Snippet, validator::Validator};

/// Pages that handlers may render.
pub const PAGES: [&str; 5] = [
    "home.html",
    "view.html",
    "create.html",
    "signup.html",
    "login.html",
];

const SOURCES: [(&str, &str); 7] = [
    ("base.html", include_str!("../ui/html/base.html")),
    ("partials/nav.html", include_str!("../ui/html/partials/nav.html")),
    ("home.html", include_str!("../ui/html/pages/home.html")),
    ("view.html", include_str!("../ui/html/pages/view.html")),
    ("create.html", include_str!("../ui/html/pages/create.html")),
    ("signup.html", include_str!("../ui/html/pages/signup.html")),
    ("login.html", include_str!("../ui/html/pages/login.html")),
];

/// Data available to every page.
#[derive(Debug, Default, Serialize)]
pub struct TemplateData {
    pub current_year: i32,
    pub snippet: Option<Snippet>,
    pub snippets: Vec<Snippet>,
    pub form: Option<Value>,
    pub flash: String,
    pub is_authenticated: bool,
    pub csrf_token: String,
}

impl TemplateData {
    #[must_use]
    pub fn new() -> Self {
        Self {
            current_year: Utc::now().year(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_snippet(mut self, snippet: Snippet) -> Self {
        self.snippet = Some(snippet);
        self
    }

    #[must_use]
    pub fn with_snippets(mut self, snippets: Vec<Snippet>) -> Self {
        self.snippets = snippets;
        self
    }

    /// Attach a form and its validation errors for re-rendering.
    ///
    /// The template sees the form fields next to `field_errors` and
    /// `non_field_errors`.
    ///
    /// # Errors
    /// Returns an error if the form does not serialize to an object.
    pub fn with_form<T: Serialize>(mut self, form: &T, validator: &Validator) -> Result<Self> {
        let Value::Object(mut fields) =
            serde_json::to_value(form).context("failed to serialize form")?
        else {
            bail!("form must serialize to an object");
        };
        fields.insert(
            "field_errors".to_string(),
            serde_json::to_value(&validator.field_errors)?,
        );
        fields.insert(
            "non_field_errors".to_string(),
            serde_json::to_value(&validator.non_field_errors)?,
        );
        self.form = Some(Value::Object(fields));
        Ok(self)
    }
}

/// Format a timestamp as `17 Mar 2024 at 10:15`, always in UTC.
#[must_use]
pub fn human_date<Tz: TimeZone>(t: &DateTime<Tz>) -> String {
    t.with_timezone(&Utc).format("%d %b %Y at %H:%M").to_string()
}

fn human_date_filter(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
    match value {
        Value::Null => Ok(Value::String(String::new())),
        Value::String(s) if s.is_empty() => Ok(Value::String(String::new())),
        Value::String(s) => {
            let parsed = DateTime::parse_from_rfc3339(s)
                .map_err(|e| tera::Error::msg(format!("human_date: invalid timestamp {s}: {e}")))?;
            Ok(Value::String(human_date(&parsed)))
        }
        other => Err(tera::Error::msg(format!(
            "human_date: expected a timestamp, got {other}"
        ))),
    }
}

/// Parsed templates, immutable after construction and shared by reference.
#[derive(Debug)]
pub struct TemplateCache {
    tera: Tera,
}

impl TemplateCache {
    /// Parse every embedded template.
    ///
    /// # Errors
    /// Returns an error if a template fails to parse.
    pub fn new() -> Result<Self> {
        let mut tera = Tera::default();
        tera.register_filter("human_date", human_date_filter);
        tera.add_raw_templates(SOURCES.to_vec())
            .context("failed to parse templates")?;
        Ok(Self { tera })
    }

    /// Render `page` fully into memory.
    ///
    /// # Errors
    /// Returns an error for unknown pages or if rendering fails.
    pub fn render(&self, page: &str, data: &TemplateData) -> Result<String> {
        if !PAGES.contains(&page) {
            bail!("the template {page} does not exist");
        }
        let context = Context::from_serialize(data).context("failed to build template context")?;
        self.tera
            .render(page, &context)
            .with_context(|| format!("failed to render {page}"))
    }
}
