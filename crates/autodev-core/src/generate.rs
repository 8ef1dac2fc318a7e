//! Change-generation adapter: prompt assembly and response parsing.
//!
//! The generation service is untrusted. It may return prose, partial JSON,
//! or unsafe paths; parsing is therefore two explicit stages (strict, then
//! a lenient salvage of the outermost JSON object) and the guardrail
//! validator always runs downstream of this module.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;

use crate::domain::{AutodevError, EditSet, FileEdit, Result};

/// Fixed system prompt demanding a single structured object in response.
pub const SYSTEM_PROMPT: &str = "\
You are a careful software engineer.
You must output ONLY valid JSON. No markdown. No commentary.

Return JSON in this exact shape:
{
  \"summary\": \"<short summary>\",
  \"files\": [
    {\"path\": \"<repo-relative path>\", \"content\": \"<FULL file content>\"}
  ]
}

Rules:
- Only edit files that are necessary.
- Keep changes small.
- Do not invent new dependencies unless required.
- Ensure the test suite passes.
";

/// Raw-completion seam to the generation service.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Run one completion and return the raw model text.
    async fn complete(&self, system: &str, prompt: &str) -> Result<String>;
}

/// Builds generation requests and parses responses into edit sets.
pub struct ChangeGenerator<B> {
    backend: B,
}

impl<B: CompletionBackend> ChangeGenerator<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Produce an edit set for a work item.
    ///
    /// `context` maps repo-relative paths to their current content;
    /// `feedback` carries the prior attempt's CI failure summary, absent on
    /// the first attempt.
    pub async fn generate(
        &self,
        title: &str,
        body: &str,
        context: &BTreeMap<String, String>,
        feedback: Option<&str>,
    ) -> Result<EditSet> {
        let prompt = build_prompt(title, body, context, feedback);
        let raw = self.backend.complete(SYSTEM_PROMPT, &prompt).await?;
        parse_edit_set(&raw)
    }
}

/// Assemble the user prompt: task framing, issue text, optional feedback
/// block, and the serialized file-content bundle.
pub fn build_prompt(
    title: &str,
    body: &str,
    context: &BTreeMap<String, String>,
    feedback: Option<&str>,
) -> String {
    let files_block = context
        .iter()
        .map(|(path, content)| format!("--- FILE: {path} ---\n{content}"))
        .collect::<Vec<_>>()
        .join("\n\n");

    let feedback_block = match feedback {
        Some(text) => format!("\nCI FEEDBACK (the previous attempt failed):\n{text}\n"),
        None => String::new(),
    };

    format!(
        "TASK:\n\
         You are working on a source repository. Implement this issue.\n\n\
         ISSUE TITLE:\n{title}\n\n\
         ISSUE BODY:\n{body}\n\
         {feedback_block}\n\
         REPO CONTEXT (current file contents):\n{files_block}\n\n\
         OUTPUT REQUIREMENTS:\n\
         - Output ONLY valid JSON matching the schema in the system prompt.\n\
         - Include FULL content for each file you modify (not diffs).\n\
         - Prefer editing existing files over creating many new ones.\n"
    )
}

#[derive(Deserialize)]
struct RawEditSet {
    #[serde(default)]
    summary: String,
    files: Vec<RawEdit>,
}

#[derive(Deserialize)]
struct RawEdit {
    path: String,
    content: String,
}

/// Parse raw model output into an edit set.
///
/// Stage one parses the full text strictly. Stage two salvages the slice
/// between the outermost `{`..`}` pair and re-parses it; models sometimes
/// wrap the object in stray prose. Any remaining failure, including an
/// edit entry missing its path or content, is `MalformedGeneration`.
pub fn parse_edit_set(raw: &str) -> Result<EditSet> {
    let parsed = match serde_json::from_str::<RawEditSet>(raw) {
        Ok(parsed) => parsed,
        Err(strict_err) => {
            let slice = extract_json_object(raw).ok_or_else(|| {
                AutodevError::MalformedGeneration(format!(
                    "no JSON object in response: {strict_err}"
                ))
            })?;
            serde_json::from_str::<RawEditSet>(slice)
                .map_err(|e| AutodevError::MalformedGeneration(e.to_string()))?
        }
    };

    Ok(EditSet {
        summary: parsed.summary,
        edits: parsed
            .files
            .into_iter()
            .map(|f| FileEdit {
                path: f.path,
                content: f.content,
            })
            .collect(),
    })
}

/// Slice from the first `{` to the last `}` inclusive, if any.
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end >= start {
        Some(&text[start..=end])
    } else {
        None
    }
}
