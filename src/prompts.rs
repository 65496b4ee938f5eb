//! Prompt templates for section extraction and consolidation.
//!
//! Templates are looked up once, when the configuration is built, from a
//! table keyed by `(Language, ModelFamily)`. Adding a language or a model
//! family with different formatting needs is a new table row, not a new
//! branch in the extractor.
//!
//! Placeholders (`{section}`, `{schema}`, `{text}`, `{examples}`,
//! `{information}`) are filled by the `render_*` helpers below.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Language of the source documents and of the prompts sent about them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Es,
}

impl Language {
    pub fn code(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Es => "es",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" | "english" => Ok(Language::En),
            "es" | "spanish" | "español" => Ok(Language::Es),
            other => Err(format!("unsupported language '{other}' (expected en or es)")),
        }
    }
}

/// Capability tag derived from a model identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelFamily {
    /// Anthropic Claude models; respond well to XML-tagged sections.
    Claude,
    /// Amazon Titan models.
    Titan,
    Other,
}

impl ModelFamily {
    pub fn from_model_id(model_id: &str) -> Self {
        let id = model_id.to_ascii_lowercase();
        if id.contains("claude") {
            ModelFamily::Claude
        } else if id.contains("titan") {
            ModelFamily::Titan
        } else {
            ModelFamily::Other
        }
    }
}

/// The four templates one run needs.
#[derive(Debug, PartialEq, Eq)]
pub struct PromptSet {
    pub extraction_system: &'static str,
    pub extraction_user: &'static str,
    pub consolidation_system: &'static str,
    pub consolidation_user: &'static str,
}

const EXTRACTION_SYSTEM_EN: &str = r#"You are a meticulous legal analyst reviewing a fragment of a company charter.
Your task is to extract one section of a report, "{section}", from the fragment.

Rules:
- Only report values that are written in the fragment. Never invent or complete a value.
- Leave a field empty when the fragment does not state it.
- Rate how much of the section the fragment actually contains with confidence_level (0-100):
  below 20 means no evidence at all, 20-60 means the information is partial or inferred,
  60-90 means it is partially present, above 90 means it is fully present.
- Set conclusion to true only when the fragment lets you extract the section.

Answer with a single JSON object and nothing else:
{"thinking": string, "confidence_level": integer, "conclusion": boolean, "extracted_information": object}

extracted_information must follow this JSON schema:
{schema}"#;

const EXTRACTION_USER_EN: &str = r#"{examples}Here is the document fragment:

<text>
{text}
</text>

Extract the "{section}" section and answer with the JSON object only."#;

const CONSOLIDATION_SYSTEM_EN: &str = r#"You are a careful legal analyst condensing several extractions of the same report section, "{section}", each taken from a different part of one document.

Rules:
- A value that repeats across versions is very likely correct.
- A value that appears in a single version is still usable.
- Ignore empty values and values that express uncertainty or missing information.
- When the right value for a field is not obvious, leave it empty. Never guess and never write a value that is not in the versions.

Answer with one JSON object that follows this schema, placed between <json_report> and </json_report>:
{schema}"#;

const CONSOLIDATION_USER_EN: &str = r#"Here are the extracted versions:

<information>
{information}
</information>

Condense them into the final section and place it between <json_report> tags."#;

const EXTRACTION_SYSTEM_ES: &str = r#"Eres un analista legal meticuloso que revisa un fragmento de un acta constitutiva.
Tu tarea es extraer una sección del reporte, "{section}", a partir del fragmento.

Reglas:
- Reporta solo valores que estén escritos en el fragmento. Nunca inventes ni completes un valor.
- Deja vacío un campo cuando el fragmento no lo indique.
- Califica con confidence_level (0-100) cuánto de la sección contiene el fragmento:
  menos de 20 significa que no hay evidencia, 20-60 que la información es parcial o inferida,
  60-90 que está parcialmente presente, más de 90 que está completamente presente.
- Usa conclusion = true solo cuando el fragmento te permita extraer la sección.

Responde con un único objeto JSON y nada más:
{"thinking": string, "confidence_level": integer, "conclusion": boolean, "extracted_information": object}

extracted_information debe seguir este esquema JSON:
{schema}"#;

const EXTRACTION_USER_ES: &str = r#"{examples}Este es el fragmento del documento:

<text>
{text}
</text>

Extrae la sección "{section}" y responde solo con el objeto JSON."#;

const CONSOLIDATION_SYSTEM_ES: &str = r#"Eres un analista legal cauteloso que condensa varias extracciones de la misma sección del reporte, "{section}", tomadas de distintas partes de un mismo documento.

Reglas:
- Un valor que se repite entre versiones muy probablemente es correcto.
- Un valor que aparece en una sola versión también puede usarse.
- Ignora los valores vacíos y los que expresen incertidumbre o falta de información.
- Cuando el valor correcto de un campo no sea evidente, déjalo vacío. Nunca adivines ni escribas un valor que no esté en las versiones.

Responde con un objeto JSON que siga este esquema, entre <json_report> y </json_report>:
{schema}"#;

const CONSOLIDATION_USER_ES: &str = r#"Estas son las versiones extraídas:

<information>
{information}
</information>

Condénsalas en la sección final y colócala entre etiquetas <json_report>."#;

static PROMPTS_EN: PromptSet = PromptSet {
    extraction_system: EXTRACTION_SYSTEM_EN,
    extraction_user: EXTRACTION_USER_EN,
    consolidation_system: CONSOLIDATION_SYSTEM_EN,
    consolidation_user: CONSOLIDATION_USER_EN,
};

static PROMPTS_ES: PromptSet = PromptSet {
    extraction_system: EXTRACTION_SYSTEM_ES,
    extraction_user: EXTRACTION_USER_ES,
    consolidation_system: CONSOLIDATION_SYSTEM_ES,
    consolidation_user: CONSOLIDATION_USER_ES,
};

/// Rows of the lookup table. Missing `(language, family)` pairs fall back to
/// the language's `Other` row.
static PROMPT_TABLE: &[((Language, ModelFamily), &PromptSet)] = &[
    ((Language::En, ModelFamily::Claude), &PROMPTS_EN),
    ((Language::En, ModelFamily::Titan), &PROMPTS_EN),
    ((Language::En, ModelFamily::Other), &PROMPTS_EN),
    ((Language::Es, ModelFamily::Claude), &PROMPTS_ES),
    ((Language::Es, ModelFamily::Titan), &PROMPTS_ES),
    ((Language::Es, ModelFamily::Other), &PROMPTS_ES),
];

impl PromptSet {
    /// Look up the templates for a language and model identifier.
    pub fn resolve(language: Language, model_id: &str) -> &'static PromptSet {
        let family = ModelFamily::from_model_id(model_id);
        let lookup = |fam: ModelFamily| {
            PROMPT_TABLE
                .iter()
                .find(|(key, _)| *key == (language, fam))
                .map(|(_, set)| *set)
        };
        lookup(family)
            .or_else(|| lookup(ModelFamily::Other))
            .unwrap_or(&PROMPTS_EN)
    }
}

/// Fill the extraction templates. Returns `(system, user)`.
pub fn render_extraction(
    set: &PromptSet,
    section: &str,
    schema: &str,
    text: &str,
    examples: &[String],
) -> (String, String) {
    let system = set
        .extraction_system
        .replace("{section}", section)
        .replace("{schema}", schema);
    let user = set
        .extraction_user
        .replace("{examples}", &format_examples(examples))
        .replace("{section}", section)
        .replace("{text}", text);
    (system, user)
}

/// Fill the consolidation templates. Returns `(system, user)`.
pub fn render_consolidation(
    set: &PromptSet,
    section: &str,
    schema: &str,
    information: &str,
) -> (String, String) {
    let system = set
        .consolidation_system
        .replace("{section}", section)
        .replace("{schema}", schema);
    let user = set.consolidation_user.replace("{information}", information);
    (system, user)
}

fn format_examples(examples: &[String]) -> String {
    if examples.is_empty() {
        return String::new();
    }
    let mut out = String::from("Examples of correct extractions:\n\n");
    for (i, example) in examples.iter().enumerate() {
        out.push_str(&format!(
            "<example_{n}>\n{}\n</example_{n}>\n\n",
            example.trim(),
            n = i + 1
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_family_from_id() {
        assert_eq!(
            ModelFamily::from_model_id("anthropic.claude-3-sonnet-20240229-v1:0"),
            ModelFamily::Claude
        );
        assert_eq!(
            ModelFamily::from_model_id("amazon.titan-text-premier-v1:0"),
            ModelFamily::Titan
        );
        assert_eq!(ModelFamily::from_model_id("gpt-4.1-mini"), ModelFamily::Other);
    }

    #[test]
    fn resolve_picks_language() {
        let es = PromptSet::resolve(Language::Es, "claude-3-haiku");
        assert!(es.extraction_system.contains("acta constitutiva"));
        let en = PromptSet::resolve(Language::En, "gpt-4o");
        assert!(en.extraction_system.contains("company charter"));
    }

    #[test]
    fn every_language_has_a_fallback_row() {
        for lang in [Language::En, Language::Es] {
            assert!(PROMPT_TABLE
                .iter()
                .any(|((l, f), _)| *l == lang && *f == ModelFamily::Other));
        }
    }

    #[test]
    fn language_parses_codes_and_names() {
        assert_eq!("ES".parse::<Language>(), Ok(Language::Es));
        assert_eq!("english".parse::<Language>(), Ok(Language::En));
        assert!("fr".parse::<Language>().is_err());
    }

    #[test]
    fn extraction_render_fills_every_placeholder() {
        let set = PromptSet::resolve(Language::En, "claude");
        let (system, user) = render_extraction(
            set,
            "shareholders",
            "{\"type\":\"object\"}",
            "ACME S.A. de C.V.",
            &["example one".to_string()],
        );
        assert!(system.contains("\"shareholders\""));
        assert!(system.contains("{\"type\":\"object\"}"));
        assert!(user.contains("ACME S.A. de C.V."));
        assert!(user.contains("<example_1>"));
        assert!(!user.contains("{examples}"));
        assert!(!user.contains("{text}"));
    }

    #[test]
    fn no_examples_leaves_no_header() {
        let set = PromptSet::resolve(Language::En, "x");
        let (_, user) = render_extraction(set, "s", "{}", "t", &[]);
        assert!(user.starts_with("Here is the document fragment"));
    }

    #[test]
    fn consolidation_render_embeds_candidates() {
        let set = PromptSet::resolve(Language::Es, "claude");
        let (system, user) = render_consolidation(set, "administration", "{}", "[{\"a\":1}]");
        assert!(system.contains("administration"));
        assert!(user.contains("[{\"a\":1}]"));
    }
}
