//! Structural parsing of feature files
//!
//! Produces an outline (feature, background, scenarios, steps) without
//! interpreting step text. Used to inspect and validate feature files before
//! they are queued for remote execution.

use std::collections::BTreeSet;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

static TAGS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"@[\w-]+").unwrap());

const STEP_KEYWORDS: [&str; 6] = ["Given ", "When ", "Then ", "And ", "But ", "* "];

#[derive(Debug, Clone, Serialize)]
pub struct FeatureOutline {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub background: Option<Background>,

    pub scenarios: Vec<Scenario>,

    pub line_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Background {
    pub line_number: usize,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Scenario {
    pub name: String,
    pub line_number: usize,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    pub steps: Vec<Step>,

    pub is_outline: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub examples: Option<Vec<IndexMap<String, String>>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Step {
    pub keyword: String,
    pub text: String,
    pub line_number: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub docstring: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_table: Option<Vec<Vec<String>>>,
}

impl FeatureOutline {
    /// Structural problems that would make the feature unrunnable.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.name.is_empty() {
            problems.push("Feature name is required".to_string());
        }
        if self.scenarios.is_empty() {
            problems.push("Feature has no scenarios".to_string());
        }

        for scenario in &self.scenarios {
            if scenario.name.is_empty() {
                problems.push(format!(
                    "Scenario at line {} has no name",
                    scenario.line_number
                ));
            }
            if scenario.steps.is_empty() {
                problems.push(format!("Scenario '{}' has no steps", scenario.name));
            }
            if scenario.is_outline
                && scenario.examples.as_ref().map_or(true, |e| e.is_empty())
            {
                problems.push(format!(
                    "Scenario Outline '{}' has no Examples",
                    scenario.name
                ));
            }
        }

        problems
    }

    /// Feature and scenario tags, deduplicated and sorted.
    pub fn all_tags(&self) -> Vec<String> {
        let mut tags: BTreeSet<String> = self.tags.iter().cloned().collect();
        for scenario in &self.scenarios {
            tags.extend(scenario.tags.iter().cloned());
        }
        tags.into_iter().collect()
    }

    pub fn scenario_names(&self) -> Vec<String> {
        self.scenarios.iter().map(|s| s.name.clone()).collect()
    }
}

/// Parse feature text into its structural outline.
pub fn parse(content: &str) -> FeatureOutline {
    let lines: Vec<&str> = content.lines().collect();

    let mut outline = FeatureOutline {
        name: String::new(),
        description: None,
        tags: Vec::new(),
        background: None,
        scenarios: Vec::new(),
        line_count: lines.len(),
    };

    let mut background: Option<Background> = None;
    let mut current_scenario: Option<Scenario> = None;
    let mut current_tags: Vec<String> = Vec::new();
    let mut in_background = false;
    let mut in_examples = false;
    let mut example_headers: Option<Vec<String>> = None;
    let mut example_rows: Vec<Vec<String>> = Vec::new();
    let mut docstring_fence: Option<&'static str> = None;
    let mut docstring_lines: Vec<String> = Vec::new();

    let mut i = 0;
    while i < lines.len() {
        let raw = lines[i];
        let stripped = raw.trim();
        let line_number = i + 1;

        // docstring fences take precedence over every other construct
        if stripped == "\"\"\"" || stripped == "'''" {
            let fence: &'static str = if stripped.starts_with('"') { "\"\"\"" } else { "'''" };
            match docstring_fence {
                Some(open) if open == fence => {
                    attach_docstring(
                        current_scenario.as_mut(),
                        background.as_mut(),
                        docstring_lines.join("\n"),
                    );
                    docstring_lines.clear();
                    docstring_fence = None;
                }
                Some(_) => docstring_lines.push(raw.to_string()),
                None => docstring_fence = Some(fence),
            }
            i += 1;
            continue;
        }
        if docstring_fence.is_some() {
            // content is preserved verbatim, indentation included
            docstring_lines.push(raw.to_string());
            i += 1;
            continue;
        }

        if stripped.is_empty() || stripped.starts_with('#') {
            i += 1;
            continue;
        }

        if stripped.starts_with('@') {
            current_tags.extend(TAGS_RE.find_iter(stripped).map(|m| m.as_str().to_string()));
            i += 1;
            continue;
        }

        if let Some(rest) = stripped.strip_prefix("Feature:") {
            outline.name = rest.trim().to_string();
            outline.tags = std::mem::take(&mut current_tags);

            // description is the prose between the Feature line and the
            // first Background/Scenario/tag line
            let mut description = Vec::new();
            let mut j = i + 1;
            while j < lines.len() {
                let peek = lines[j].trim();
                if peek.starts_with("Background:")
                    || peek.starts_with("Scenario:")
                    || peek.starts_with("Scenario Outline:")
                    || peek.starts_with('@')
                {
                    break;
                }
                if !peek.is_empty() && !peek.starts_with('#') {
                    description.push(peek.to_string());
                }
                j += 1;
            }
            if !description.is_empty() {
                outline.description = Some(description.join("\n"));
            }

            i += 1;
            continue;
        }

        if stripped.starts_with("Background:") {
            background = Some(Background {
                line_number,
                steps: Vec::new(),
            });
            in_background = true;
            in_examples = false;
            i += 1;
            continue;
        }

        if stripped.starts_with("Scenario Outline:") || stripped.starts_with("Scenario:") {
            if let Some(mut done) = current_scenario.take() {
                done.examples = take_examples(&mut example_headers, &mut example_rows);
                outline.scenarios.push(done);
            }
            in_examples = false;
            in_background = false;
            if outline.background.is_none() {
                outline.background = background.take();
            }

            let is_outline = stripped.starts_with("Scenario Outline:");
            let name = stripped
                .splitn(2, ':')
                .nth(1)
                .unwrap_or_default()
                .trim()
                .to_string();
            current_scenario = Some(Scenario {
                name,
                line_number,
                tags: std::mem::take(&mut current_tags),
                steps: Vec::new(),
                is_outline,
                examples: None,
            });
            i += 1;
            continue;
        }

        if stripped.starts_with("Examples:") {
            in_examples = true;
            i += 1;
            continue;
        }

        if in_examples && stripped.starts_with('|') {
            let row = parse_table_row(stripped);
            if example_headers.is_none() {
                example_headers = Some(row);
            } else {
                example_rows.push(row);
            }
            i += 1;
            continue;
        }

        if let Some((keyword, text)) = split_step(stripped) {
            let mut step = Step {
                keyword: keyword.trim().to_string(),
                text: text.to_string(),
                line_number,
                docstring: None,
                data_table: None,
            };

            // consecutive pipe rows right after a step are its data table
            let mut table = Vec::new();
            let mut j = i + 1;
            while j < lines.len() && lines[j].trim().starts_with('|') {
                table.push(parse_table_row(lines[j].trim()));
                j += 1;
            }
            if table.is_empty() {
                i += 1;
            } else {
                step.data_table = Some(table);
                i = j;
            }

            if let Some(scenario) = current_scenario.as_mut() {
                scenario.steps.push(step);
            } else if in_background {
                if let Some(bg) = background.as_mut() {
                    bg.steps.push(step);
                }
            }
            continue;
        }

        i += 1;
    }

    if let Some(mut done) = current_scenario.take() {
        done.examples = take_examples(&mut example_headers, &mut example_rows);
        outline.scenarios.push(done);
    }
    if outline.background.is_none() {
        outline.background = background.take();
    }

    outline
}

fn attach_docstring(
    scenario: Option<&mut Scenario>,
    background: Option<&mut Background>,
    text: String,
) {
    let target = scenario
        .and_then(|s| s.steps.last_mut())
        .or_else(|| background.and_then(|b| b.steps.last_mut()));
    if let Some(step) = target {
        step.docstring = Some(text);
    }
}

fn take_examples(
    headers: &mut Option<Vec<String>>,
    rows: &mut Vec<Vec<String>>,
) -> Option<Vec<IndexMap<String, String>>> {
    let headers = headers.take()?;
    let mapped = rows
        .drain(..)
        .map(|row| headers.iter().cloned().zip(row).collect())
        .collect();
    Some(mapped)
}

fn parse_table_row(line: &str) -> Vec<String> {
    line.trim_matches('|')
        .split('|')
        .map(|cell| cell.trim().to_string())
        .collect()
}

fn split_step(line: &str) -> Option<(&str, &str)> {
    for keyword in STEP_KEYWORDS {
        if let Some(rest) = line.strip_prefix(keyword) {
            return Some((keyword, rest.trim()));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEATURE: &str = r#"@smoke @api
Feature: User management
  Covers the user CRUD surface.

  Background:
    * url 'https://api.example.com'
    * header Accept = 'application/json'

  @create
  Scenario: Create a user
    Given path '/users'
    And request
    """
    {"name": "ada"}
    """
    When method post
    Then status 201

  Scenario Outline: Fetch by id
    Given path '/users/<id>'
    When method get
    Then status <status>

    Examples:
      | id | status |
      | 1  | 200    |
      | 99 | 404    |
"#;

    #[test]
    fn test_parse_structure() {
        let outline = parse(FEATURE);

        assert_eq!(outline.name, "User management");
        assert_eq!(
            outline.description.as_deref(),
            Some("Covers the user CRUD surface.")
        );
        assert_eq!(outline.tags, vec!["@smoke", "@api"]);

        let background = outline.background.as_ref().unwrap();
        assert_eq!(background.steps.len(), 2);
        assert_eq!(background.steps[0].keyword, "*");
        assert_eq!(background.steps[0].text, "url 'https://api.example.com'");

        assert_eq!(outline.scenarios.len(), 2);
        assert_eq!(outline.scenarios[0].name, "Create a user");
        assert_eq!(outline.scenarios[0].tags, vec!["@create"]);
        assert!(!outline.scenarios[0].is_outline);
        assert_eq!(outline.scenarios[1].name, "Fetch by id");
        assert!(outline.scenarios[1].is_outline);
    }

    #[test]
    fn test_parse_docstring_attaches_to_step() {
        let outline = parse(FEATURE);
        let steps = &outline.scenarios[0].steps;

        let request_step = steps.iter().find(|s| s.text == "request").unwrap();
        assert_eq!(request_step.docstring.as_deref(), Some("    {\"name\": \"ada\"}"));
    }

    #[test]
    fn test_parse_examples_rows() {
        let outline = parse(FEATURE);
        let examples = outline.scenarios[1].examples.as_ref().unwrap();

        assert_eq!(examples.len(), 2);
        assert_eq!(examples[0].get("id").map(String::as_str), Some("1"));
        assert_eq!(examples[0].get("status").map(String::as_str), Some("200"));
        assert_eq!(examples[1].get("id").map(String::as_str), Some("99"));
    }

    #[test]
    fn test_parse_data_table() {
        let feature = "Feature: T\n\n  Scenario: S\n    Given table rows\n      | a | b |\n      | 1 | 2 |\n    When method get\n";
        let outline = parse(feature);

        let steps = &outline.scenarios[0].steps;
        assert_eq!(steps.len(), 2);
        let table = steps[0].data_table.as_ref().unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table[0], vec!["a", "b"]);
        assert_eq!(table[1], vec!["1", "2"]);
    }

    #[test]
    fn test_validate_reports_problems() {
        let outline = parse("Feature:\n");
        let problems = outline.validate();
        assert!(problems.contains(&"Feature name is required".to_string()));
        assert!(problems.contains(&"Feature has no scenarios".to_string()));

        let outline = parse("Feature: T\n\n  Scenario: Empty\n\n  Scenario Outline: NoRows\n    Given path '/x'\n");
        let problems = outline.validate();
        assert!(problems.contains(&"Scenario 'Empty' has no steps".to_string()));
        assert!(problems.contains(&"Scenario Outline 'NoRows' has no Examples".to_string()));
    }

    #[test]
    fn test_all_tags_sorted_unique() {
        let outline = parse(FEATURE);
        assert_eq!(outline.all_tags(), vec!["@api", "@create", "@smoke"]);
    }
}
