//! View template loading.
//!
//! Rendering is not this crate's concern; loaders only produce template text
//! for a view, which is then published as the view's `$template` value.

use std::fmt;
use std::path::PathBuf;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use crate::resolve::BoxError;
use crate::url::types::value_text;

lazy_static! {
    static ref URL_TOKEN: Regex = Regex::new(r"\{(\w+)\}").expect("valid regex");
}

/// What a view asks a loader for.
#[derive(Debug, Clone, Serialize)]
pub struct TemplateRequest {
    pub place: String,
    /// Fully-qualified view name (`name@place`).
    pub view: String,
    pub template: Option<String>,
    pub template_url: Option<String>,
    /// The transition's parameter values.
    pub params: Value,
}

impl TemplateRequest {
    /// `template_url` with `{param}` tokens replaced by parameter values.
    pub fn resolved_url(&self) -> Option<String> {
        let url = self.template_url.as_deref()?;
        let resolved = URL_TOKEN.replace_all(url, |caps: &regex::Captures<'_>| {
            self.params
                .get(&caps[1])
                .map(value_text)
                .unwrap_or_default()
        });
        Some(resolved.into_owned())
    }
}

/// Fetches template text for views.
pub trait TemplateLoader: Send + Sync + fmt::Debug {
    fn load(&self, request: TemplateRequest) -> BoxFuture<'static, Result<Option<String>, BoxError>>;
}

/// Serves inline templates only.
#[derive(Debug, Default, Clone)]
pub struct InlineTemplates;

impl TemplateLoader for InlineTemplates {
    fn load(&self, request: TemplateRequest) -> BoxFuture<'static, Result<Option<String>, BoxError>> {
        let result: Result<Option<String>, BoxError> = match (&request.template, request.resolved_url()) {
            (Some(template), _) => Ok(Some(template.clone())),
            (None, Some(url)) => Err(format!("no template loader configured for '{url}'").into()),
            (None, None) => Ok(None),
        };
        futures_util::future::ready(result).boxed()
    }
}

/// Reads `template_url` relative to a root directory; inline templates win.
#[derive(Debug, Clone)]
pub struct FileTemplates {
    root: PathBuf,
}

impl FileTemplates {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl TemplateLoader for FileTemplates {
    fn load(&self, request: TemplateRequest) -> BoxFuture<'static, Result<Option<String>, BoxError>> {
        if let Some(template) = request.template.clone() {
            return futures_util::future::ready(Ok(Some(template))).boxed();
        }
        let Some(url) = request.resolved_url() else {
            return futures_util::future::ready(Ok(None)).boxed();
        };
        let path = self.root.join(url.trim_start_matches('/'));
        async move {
            tracing::debug!(path = %path.display(), view = %request.view, "Loading template");
            let text = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| format!("failed to read template {}: {e}", path.display()))?;
            Ok::<_, BoxError>(Some(text))
        }
        .boxed()
    }
}
