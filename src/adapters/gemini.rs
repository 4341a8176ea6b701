//! Generative-language client used for project generation and for turning
//! free text into a design document.

use std::sync::LazyLock;

use anyhow::{Context, bail};
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::json;

use crate::config::GeneratorSection;
use crate::errors::StageError;
use crate::jobs::stages::{CodeGenerator, DesignTree, ProjectFiles, StructureGenerator};

const TEMPERATURE: f64 = 0.1;
const MAX_OUTPUT_TOKENS: u32 = 8000;

/// Files the generator is asked to emit, in the order they are requested.
pub const KNOWN_FILES: &[&str] = &[
    "app.component.ts",
    "app.component.html",
    "app.component.css",
    "main.ts",
    "styles.css",
    "index.html",
    "angular.json",
];

// A header line names one known file, optionally wrapped in markdown
// decoration or preceded by an opening fence.
static FILE_HEADER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(?:```[a-z]*\s*)?[#*/>\-\s]*(app\.component\.(?:ts|html|css)|main\.ts|styles\.css|index\.html|angular\.json)[*:`\s]*$",
    )
    .unwrap()
});

const PROJECT_PROMPT: &str = r#"Convert this design JSON into an Angular application.

Requirements:
- Standalone AppComponent (standalone: true, imports: [CommonModule]); no NgModules.
- Separate files for template, styles and class (templateUrl and styleUrls).
- Preserve the layout of the design: explicit widths, heights, margins and spacing.
  Order elements top to bottom by absoluteBoundingBox.y.
- Convert design colors from the 0-1 range to rgb/rgba by multiplying r, g, b by 255.
- Rectangles containing text become buttons with (click) handlers named after
  their label that show an alert.
- Global styles go in styles.css, component styles in app.component.css, and
  index.html links styles.css and any fonts used.
- Every CSS class referenced in the template must be defined.
- Write e-mail addresses in templates with &#64; instead of @.

Output format: no explanations. For each of app.component.ts, app.component.html,
app.component.css, main.ts, styles.css, index.html and angular.json, write the file
name on its own line followed by the file content.

Design JSON:
"#;

const STRUCTURE_PROMPT: &str = r#"Design a single-page web UI for the description below and return it as a
Figma-style document JSON object with this shape:

{"name": "...", "document": {"type": "DOCUMENT", "children": [{"type": "CANVAS", "name": "Page 1",
 "children": [ frames, rectangles and text nodes with "name", "type", "characters" (for text),
 "absoluteBoundingBox": {"x", "y", "width", "height"}, "fills": [{"type": "SOLID", "color": {"r", "g", "b", "a"}}],
 "style": {"fontFamily", "fontSize", "fontWeight"} and nested "children" ]}]}}

Colors use the 0-1 range. Return only the JSON object.

Description:
"#;

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: reqwest::Client,
    api_base: String,
    model: String,
    api_key: Option<String>,
}

impl GeminiClient {
    pub fn new(client: reqwest::Client, config: &GeneratorSection) -> Self {
        Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.api_base, self.model)
    }

    /// Send one prompt and return the text of the first candidate.
    pub async fn complete(&self, prompt: &str) -> anyhow::Result<String> {
        let Some(ref api_key) = self.api_key else {
            bail!("GEMINI_API_KEY is not configured");
        };

        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "temperature": TEMPERATURE,
                "maxOutputTokens": MAX_OUTPUT_TOKENS,
            },
        });

        let resp = self
            .client
            .post(self.endpoint())
            .query(&[("key", api_key.as_str())])
            .json(&body)
            .send()
            .await
            .context("Failed to send request to the generation API")?;

        let status = resp.status();
        if !status.is_success() {
            let detail = match resp.json::<ErrorEnvelope>().await {
                Ok(envelope) => envelope.error.message,
                Err(_) => status.to_string(),
            };
            bail!("Generation API error: {}", detail);
        }

        let parsed: GenerateResponse = resp
            .json()
            .await
            .context("Failed to parse generation API response")?;
        first_candidate_text(parsed).context("No response generated from the generation API")
    }
}

fn first_candidate_text(resp: GenerateResponse) -> Option<String> {
    let content = resp.candidates.into_iter().next()?.content?;
    let text: String = content.parts.into_iter().map(|p| p.text).collect();
    if text.trim().is_empty() { None } else { Some(text) }
}

#[async_trait]
impl CodeGenerator for GeminiClient {
    async fn generate_project_files(&self, design: &DesignTree) -> Result<ProjectFiles, StageError> {
        let design_json = serde_json::to_string_pretty(&design.0)
            .map_err(|e| StageError::Generate(e.to_string()))?;
        let prompt = format!("{}{}", PROJECT_PROMPT, design_json);
        let raw = self
            .complete(&prompt)
            .await
            .map_err(|e| StageError::Generate(format!("{:#}", e)))?;
        Ok(parse_project_files(&raw))
    }
}

#[async_trait]
impl StructureGenerator for GeminiClient {
    async fn generate_structure(&self, text: &str) -> Result<DesignTree, StageError> {
        let prompt = format!("{}{}", STRUCTURE_PROMPT, text);
        let raw = self
            .complete(&prompt)
            .await
            .map_err(|e| StageError::Generate(format!("{:#}", e)))?;
        parse_design_tree(&raw)
    }
}

/// Split a generation reply into files.
///
/// A line naming a known file starts that file; code-fence lines are
/// dropped; text before the first header is ignored. Files that end up
/// empty are omitted.
pub fn parse_project_files(raw: &str) -> ProjectFiles {
    let mut files = ProjectFiles::new();
    let mut current: Option<String> = None;

    for line in raw.lines() {
        if let Some(caps) = FILE_HEADER_REGEX.captures(line) {
            let name = caps[1].to_lowercase();
            files.entry(name.clone()).or_default();
            current = Some(name);
            continue;
        }
        if line.trim_start().starts_with("```") {
            continue;
        }
        if let Some(content) = current.as_ref().and_then(|name| files.get_mut(name)) {
            content.push_str(line);
            content.push('\n');
        }
    }

    files.retain(|_, content| {
        *content = content.trim().to_string();
        !content.is_empty()
    });
    files
}

/// Parse the outermost JSON object in a reply as a design document.
pub fn parse_design_tree(raw: &str) -> Result<DesignTree, StageError> {
    let (Some(start), Some(end)) = (raw.find('{'), raw.rfind('}')) else {
        return Err(StageError::Generate(
            "design structure reply contained no JSON object".into(),
        ));
    };
    if end < start {
        return Err(StageError::Generate(
            "design structure reply contained no JSON object".into(),
        ));
    }
    serde_json::from_str(&raw[start..=end])
        .map(DesignTree)
        .map_err(|e| StageError::Generate(format!("invalid design structure JSON: {}", e)))
}
