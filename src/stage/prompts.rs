//! Prompt builders for the generation backend
//!
//! Each prompt opens with a stable instruction line; the stub backend
//! routes on those lines, and the concept-extraction prompt is where
//! reviewer feedback from a rejected attempt is folded back in.

use crate::collab::PatentDocument;
use crate::state::ConceptMatrix;

pub fn normalize(input_text: &str) -> String {
    format!(
        "Normalize the following invention disclosure into a concise problem \
         statement and a technical description.\n\
         Respond with JSON: {{\"problem\": \"...\", \"technical\": \"...\"}}\n\n\
         Disclosure:\n{}",
        input_text
    )
}

pub fn extract_concepts(
    input_text: &str,
    problem: Option<&str>,
    technical: Option<&str>,
    feedback: Option<&str>,
) -> String {
    let mut prompt = String::from(
        "Extract the core patent search concepts from the disclosure below.\n\
         Respond with JSON: {\"problem_purpose\": \"...\", \"object_system\": \"...\", \
         \"environment_field\": \"...\"}\n",
    );
    if let Some(feedback) = feedback {
        prompt.push_str(&format!(
            "\nA reviewer rejected the previous extraction with this feedback — \
             produce a different extraction that addresses it:\n{}\n",
            feedback
        ));
    }
    if let Some(problem) = problem {
        prompt.push_str(&format!("\nProblem: {}", problem));
    }
    if let Some(technical) = technical {
        prompt.push_str(&format!("\nTechnical context: {}", technical));
    }
    prompt.push_str(&format!("\n\nDisclosure:\n{}", input_text));
    prompt
}

pub fn generate_keywords(matrix: &ConceptMatrix) -> String {
    format!(
        "Generate seed keywords for each concept category below.\n\
         Respond with JSON: {{\"problem_purpose\": [...], \"object_system\": [...], \
         \"environment_field\": [...]}}\n\n\
         Problem / purpose: {}\n\
         Object / system: {}\n\
         Environment / field: {}",
        matrix.problem_purpose, matrix.object_system, matrix.environment_field
    )
}

pub fn summarize(input_text: &str) -> String {
    format!(
        "Summarize the following invention disclosure in two or three sentences \
         suitable for patent classification.\n\n{}",
        input_text
    )
}

pub fn expand_keyword(keyword: &str, concept_context: &str, snippets: &[String]) -> String {
    let mut prompt = format!(
        "List synonyms and related terms for the patent search keyword.\n\
         Respond with JSON: {{\"synonyms\": [...]}}\n\
         Keyword: {}\n\
         Concept context: {}\n",
        keyword, concept_context
    );
    if !snippets.is_empty() {
        prompt.push_str("Usage snippets:\n");
        for snippet in snippets {
            prompt.push_str(&format!("- {}\n", snippet));
        }
    }
    prompt
}

pub fn build_queries(
    problem: &str,
    problem_purpose_terms: &[String],
    object_system_terms: &[String],
    environment_field_terms: &[String],
    ipc_categories: &[&str],
    max_queries: usize,
) -> String {
    format!(
        "Generate boolean patent search queries combining the term groups below.\n\
         Produce at most {} queries. Respond with JSON: {{\"queries\": [...]}} — \
         leave the list empty if none apply.\n\n\
         Problem: {}\n\
         Problem / purpose terms: {}\n\
         Object / system terms: {}\n\
         Environment / field terms: {}\n\
         IPC classifications: {}",
        max_queries,
        problem,
        problem_purpose_terms.join(", "),
        object_system_terms.join(", "),
        environment_field_terms.join(", "),
        ipc_categories.join(", ")
    )
}

pub fn score_scenario(scenario: &str, document: &PatentDocument) -> String {
    format!(
        "Rate how well the patent matches the use scenario, from 0.0 to 1.0.\n\
         Respond with JSON: {{\"score\": 0.0}}\n\n\
         Scenario:\n{}\n\n\
         Patent abstract:\n{}\n\nDescription:\n{}\n\nClaims:\n{}",
        scenario, document.abstract_text, document.description, document.claims
    )
}

pub fn score_problem(problem: &str, document: &PatentDocument) -> String {
    format!(
        "Rate how well the patent addresses the stated problem, from 0.0 to 1.0.\n\
         Respond with JSON: {{\"score\": 0.0}}\n\n\
         Problem:\n{}\n\n\
         Patent abstract:\n{}\n\nDescription:\n{}\n\nClaims:\n{}",
        problem, document.abstract_text, document.description, document.claims
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_feedback_lands_in_concept_prompt() {
        let prompt = extract_concepts(
            "irrigation disclosure",
            None,
            None,
            Some("keywords were far too generic"),
        );
        assert!(prompt.contains("keywords were far too generic"));
    }

    #[test]
    fn concept_prompt_without_feedback_has_no_reviewer_section() {
        let prompt = extract_concepts("irrigation disclosure", Some("p"), Some("t"), None);
        assert!(!prompt.contains("reviewer rejected"));
        assert!(prompt.contains("Problem: p"));
    }
}
