//! Deterministic in-memory collaborators
//!
//! Used by the CLI (there is no live backend wiring in this crate) and by
//! tests. The generation stub routes on the stable first line of each
//! stage prompt and answers with fixed, irrigation-flavored payloads so a
//! full pipeline run is reproducible end to end.

use super::{
    CollabResult, CollaboratorError, Classifier, DocumentFetcher, GenerationBackend,
    PatentDocument, SearchBackend, SearchHit,
};
use crate::state::IpcPrediction;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};

/// Stub generation backend with canned per-prompt-kind responses.
///
/// Responses can be overridden per marker; a marker registered with
/// [`StubGeneration::with_failure`] fails instead. Unmatched prompts
/// return a generic response rather than erroring, mirroring how a real
/// model always answers something.
pub struct StubGeneration {
    overrides: HashMap<String, CollabResult<String>>,
}

impl Default for StubGeneration {
    fn default() -> Self {
        Self::new()
    }
}

impl StubGeneration {
    pub fn new() -> Self {
        Self {
            overrides: HashMap::new(),
        }
    }

    /// Override the response for prompts containing `marker`.
    pub fn with_response(mut self, marker: impl Into<String>, response: impl Into<String>) -> Self {
        self.overrides.insert(marker.into(), Ok(response.into()));
        self
    }

    /// Fail prompts containing `marker`.
    pub fn with_failure(mut self, marker: impl Into<String>) -> Self {
        self.overrides.insert(
            marker.into(),
            Err(CollaboratorError::Unavailable("stub failure".to_string())),
        );
        self
    }

    fn builtin(prompt: &str) -> String {
        if prompt.starts_with("Normalize the following invention disclosure") {
            return r#"{
  "problem": "Optimize water usage in agricultural irrigation while ensuring adequate crop moisture",
  "technical": "Smart irrigation system using IoT soil sensors, weather data integration, and automated valve control"
}"#
            .to_string();
        }
        if prompt.starts_with("Extract the core patent search concepts") {
            return r#"{
  "problem_purpose": "Optimize water usage through real-time monitoring and automated adjustment",
  "object_system": "Smart irrigation system with IoT sensors and automated control mechanisms",
  "environment_field": "Agricultural field management and precision farming"
}"#
            .to_string();
        }
        if prompt.starts_with("Generate seed keywords") {
            return r#"{
  "problem_purpose": ["water optimization", "irrigation control", "moisture monitoring"],
  "object_system": ["IoT sensors", "soil monitors", "irrigation system"],
  "environment_field": ["agriculture", "precision farming", "water conservation"]
}"#
            .to_string();
        }
        if prompt.starts_with("Summarize the following invention disclosure") {
            return "A smart irrigation system integrating IoT sensors for real-time soil \
                    moisture monitoring and automated water distribution control across \
                    agricultural fields."
                .to_string();
        }
        if prompt.starts_with("List synonyms and related terms") {
            let keyword = prompt
                .lines()
                .find_map(|line| line.strip_prefix("Keyword: "))
                .unwrap_or("term")
                .trim();
            let synonyms = match keyword {
                "water optimization" => {
                    vec!["irrigation efficiency", "water conservation", "moisture control"]
                }
                "irrigation control" => {
                    vec!["watering management", "irrigation automation", "water distribution"]
                }
                "IoT sensors" => vec!["smart sensors", "wireless sensors", "connected devices"],
                "agriculture" => vec!["farming", "crop production", "agricultural sector"],
                "precision farming" => {
                    vec!["smart agriculture", "digital farming", "precision agriculture"]
                }
                other => {
                    return format!(
                        r#"{{"synonyms": ["{} equipment", "automated {}"]}}"#,
                        other, other
                    )
                }
            };
            let quoted: Vec<String> = synonyms.iter().map(|s| format!("\"{}\"", s)).collect();
            return format!(r#"{{"synonyms": [{}]}}"#, quoted.join(", "));
        }
        if prompt.starts_with("Generate boolean patent search queries") {
            return r#"{
  "queries": [
    "(irrigation OR watering) AND (IoT OR sensor) AND (agriculture OR farming)",
    "(soil moisture OR water content) AND (monitoring OR detection) AND (automatic OR control)",
    "(smart irrigation OR precision watering) AND (wireless sensor OR remote monitoring)",
    "(agricultural automation OR farm management) AND (water optimization OR conservation)",
    "(crop irrigation OR plant watering) AND (sensor network OR IoT system)"
  ]
}"#
            .to_string();
        }
        if prompt.starts_with("Rate how well the patent matches the use scenario") {
            return r#"{"score": 0.82}"#.to_string();
        }
        if prompt.starts_with("Rate how well the patent addresses the stated problem") {
            return r#"{"score": 0.74}"#.to_string();
        }
        "Stub generation response".to_string()
    }
}

#[async_trait]
impl GenerationBackend for StubGeneration {
    async fn generate(&self, prompt: &str) -> CollabResult<String> {
        for (marker, response) in &self.overrides {
            if prompt.contains(marker.as_str()) {
                return match response {
                    Ok(text) => Ok(text.clone()),
                    Err(_) => Err(CollaboratorError::Unavailable(format!(
                        "stub failure for marker '{}'",
                        marker
                    ))),
                };
            }
        }
        Ok(Self::builtin(prompt))
    }
}

/// Stub search backend deriving result URLs from the query text.
pub struct StubSearch {
    fixed_hits: Option<Vec<SearchHit>>,
    fail: bool,
}

impl Default for StubSearch {
    fn default() -> Self {
        Self::new()
    }
}

impl StubSearch {
    pub fn new() -> Self {
        Self {
            fixed_hits: None,
            fail: false,
        }
    }

    /// Return the same hit list for every query.
    pub fn with_fixed_hits(mut self, hits: Vec<SearchHit>) -> Self {
        self.fixed_hits = Some(hits);
        self
    }

    /// Fail every search call.
    pub fn failing() -> Self {
        Self {
            fixed_hits: None,
            fail: true,
        }
    }

    fn slug(query: &str) -> String {
        let mut slug = String::with_capacity(query.len());
        let mut last_dash = true;
        for ch in query.chars() {
            if ch.is_ascii_alphanumeric() {
                slug.push(ch.to_ascii_lowercase());
                last_dash = false;
            } else if !last_dash {
                slug.push('-');
                last_dash = true;
            }
        }
        slug.trim_matches('-').to_string()
    }
}

#[async_trait]
impl SearchBackend for StubSearch {
    async fn search(&self, query: &str, max_results: usize) -> CollabResult<Vec<SearchHit>> {
        if self.fail {
            return Err(CollaboratorError::Unavailable(
                "stub search configured to fail".to_string(),
            ));
        }
        if let Some(hits) = &self.fixed_hits {
            return Ok(hits.iter().take(max_results).cloned().collect());
        }
        let slug = Self::slug(query);
        let hits = (1..=2)
            .map(|n| SearchHit {
                content: format!("Result {} for {}", n, query),
                url: format!("https://patents.example.com/{}/{}", slug, n),
            })
            .take(max_results)
            .collect();
        Ok(hits)
    }
}

/// Stub patent fetcher with a fixed document; selected URLs can fail.
pub struct StubFetcher {
    failing_urls: HashSet<String>,
}

impl Default for StubFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl StubFetcher {
    pub fn new() -> Self {
        Self {
            failing_urls: HashSet::new(),
        }
    }

    /// Make fetches of `url` fail.
    pub fn failing_for(mut self, url: impl Into<String>) -> Self {
        self.failing_urls.insert(url.into());
        self
    }
}

#[async_trait]
impl DocumentFetcher for StubFetcher {
    async fn fetch(&self, url: &str) -> CollabResult<PatentDocument> {
        if self.failing_urls.contains(url) {
            return Err(CollaboratorError::Unavailable(format!(
                "stub fetch failure for {}",
                url
            )));
        }
        Ok(PatentDocument {
            abstract_text: "Irrigation apparatus with networked soil moisture sensing".to_string(),
            description: "A controller polls distributed soil sensors and actuates zone valves"
                .to_string(),
            claims: "1. An irrigation system comprising a moisture sensor network".to_string(),
        })
    }
}

/// Stub IPC classifier returning a fixed ranked prediction list.
pub struct StubClassifier {
    predictions: Vec<IpcPrediction>,
    fail: bool,
}

impl Default for StubClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl StubClassifier {
    pub fn new() -> Self {
        Self {
            predictions: vec![
                IpcPrediction {
                    category: "A01G25/16".to_string(),
                    score: 0.95,
                },
                IpcPrediction {
                    category: "G05B15/02".to_string(),
                    score: 0.87,
                },
                IpcPrediction {
                    category: "H04L12/28".to_string(),
                    score: 0.82,
                },
            ],
            fail: false,
        }
    }

    pub fn with_predictions(mut self, predictions: Vec<IpcPrediction>) -> Self {
        self.predictions = predictions;
        self
    }

    pub fn failing() -> Self {
        Self {
            predictions: Vec::new(),
            fail: true,
        }
    }
}

#[async_trait]
impl Classifier for StubClassifier {
    async fn classify(&self, _text: &str) -> CollabResult<Vec<IpcPrediction>> {
        if self.fail {
            return Err(CollaboratorError::Unavailable(
                "stub classifier configured to fail".to_string(),
            ));
        }
        Ok(self.predictions.clone())
    }
}
