//! Conversion between request definitions and Gherkin feature text
//!
//! The feature text is the wire format consumed by the remote worker pool.
//! Forward conversion emits one scenario per request plus a synthesized
//! trailing scenario that writes captured request/response pairs to a side
//! file; the capture channel is the only way wire-level detail gets back to
//! the caller, since step results alone only prove pass/fail.
//!
//! Reverse conversion is a simplified line-walker, not a full
//! grammar: it recognizes a fixed set of step prefixes and ignores anything
//! else.

pub mod outline;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::{json, Value as JsonValue};

use crate::models::{
    ApiKeyLocation, AssertionSpec, AuthConfig, Check, CheckSpec, CollectionConfig, CompareOp,
    ExtractionSource, JsonpathCheck, RequestBody, RequestDef, StatusCheck, StatusOp, TimingCheck,
    VariableExtraction,
};

/// Name of the synthesized scenario that persists HTTP captures; skipped by
/// the reverse parser and by the report parser.
pub const CAPTURE_SCENARIO_NAME: &str = "Write HTTP Captures to File";

static TEMPLATE_TOKEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{\{([\w.]+)\}\}").unwrap());
static KARATE_TOKEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"#\(([\w.]+)\)").unwrap());
static HEADER_STEP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"header\s+(\S+)\s*=\s*['"]?(.+?)['"]?$"#).unwrap());
static PARAM_STEP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"param\s+(\S+)\s*=\s*['"]?(.+?)['"]?$"#).unwrap());
static FORM_FIELD_STEP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"form field\s+(\S+)\s*=\s*['"]?(.+?)['"]?$"#).unwrap());
static DEF_STEP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^def\s+(\w+)\s*=\s*(.+)$").unwrap());
static HEADER_EXPR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^responseHeaders\['([^']+)'\]").unwrap());
static BEARER_STEP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^header Authorization = 'Bearer ' \+ (.+)$").unwrap());
static BARE_IDENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\w.]+$").unwrap());

/// Options for forward conversion.
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    /// Feature name; defaults to the collection name
    pub feature_name: Option<String>,
    /// Emit a Background section with shared base_url/auth/headers
    pub include_background: bool,
    /// Inject capture steps so the worker reports wire-level detail
    pub capture_http_details: bool,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        ConvertOptions {
            feature_name: None,
            include_background: true,
            capture_http_details: true,
        }
    }
}

/// Convert requests plus their collection config to feature text.
pub fn to_feature(requests: &[RequestDef], collection: &CollectionConfig) -> String {
    to_feature_with(requests, collection, &ConvertOptions::default())
}

pub fn to_feature_with(
    requests: &[RequestDef],
    collection: &CollectionConfig,
    options: &ConvertOptions,
) -> String {
    let mut lines: Vec<String> = Vec::new();

    let name = options
        .feature_name
        .as_deref()
        .unwrap_or(if collection.name.is_empty() {
            "API Tests"
        } else {
            &collection.name
        });
    lines.push(format!("Feature: {}", name));
    lines.push(String::new());

    if !collection.description.is_empty() {
        for line in collection.description.lines() {
            lines.push(format!("  {}", line));
        }
        lines.push(String::new());
    }

    let has_base_url = collection
        .base_url
        .as_deref()
        .map(|u| !u.is_empty())
        .unwrap_or(false);
    let has_auth = collection.auth_config.is_some();

    if options.include_background && (has_base_url || has_auth || options.capture_http_details) {
        lines.push("  Background:".to_string());

        if options.capture_http_details {
            lines.push("    * def httpCaptures = karate.get('httpCaptures') || []".to_string());
        }

        if has_base_url {
            if let Some(base_url) = collection.base_url.as_deref() {
                lines.push(format!("    * url '{}'", base_url));
            }
        }

        if let Some(auth) = &collection.auth_config {
            for step in auth_to_steps(auth) {
                lines.push(format!("    {}", step));
            }
        }

        for (key, value) in &collection.default_headers {
            lines.push(format!("    * header {} = '{}'", key, value));
        }

        lines.push(String::new());
    }

    for request in requests {
        lines.extend(scenario_lines(request, options.capture_http_details));
        lines.push(String::new());
    }

    if options.capture_http_details {
        lines.push("  @http-capture-output".to_string());
        lines.push(format!("  Scenario: {}", CAPTURE_SCENARIO_NAME));
        lines.push("    * def httpCaptures = karate.get('httpCaptures') || []".to_string());
        lines.push("    * def outputPath = karate.properties['karate.output.dir'] || '.'".to_string());
        lines.push("    * def filePath = outputPath + '/http-captures.json'".to_string());
        lines.push("    * def jsonString = karate.toJson(httpCaptures)".to_string());
        lines.push("    * karate.write(jsonString, filePath)".to_string());
        lines.push(String::new());
    }

    lines.join("\n")
}

fn scenario_lines(request: &RequestDef, capture_http_details: bool) -> Vec<String> {
    let mut lines = Vec::new();

    let method = request.method.to_lowercase();
    let mut tags = vec![format!("@{}", method)];
    if !request.folder_path.is_empty() {
        tags.push(format!("@{}", folder_slug(&request.folder_path)));
    }
    lines.push(format!("  {}", tags.join(" ")));

    lines.push(format!("  Scenario: {}", request.name));

    if !request.description.is_empty() {
        for line in request.description.lines() {
            lines.push(format!("    # {}", line));
        }
    }

    lines.push(format!(
        "    Given path '{}'",
        vars_to_karate(&request.url_path)
    ));

    for (key, value) in &request.query_params {
        lines.push(format!("    And param {} = '{}'", key, vars_to_karate(value)));
    }

    for (key, value) in &request.headers {
        lines.push(format!("    And header {} = '{}'", key, vars_to_karate(value)));
    }

    match &request.body {
        RequestBody::Json(content) if !content.is_null() => {
            push_docstring_body(&mut lines, content);
        }
        RequestBody::Form(fields) => {
            for (key, value) in fields {
                let rendered = render_scalar(value);
                lines.push(format!(
                    "    And form field {} = '{}'",
                    key,
                    vars_to_karate(&rendered)
                ));
            }
        }
        RequestBody::Raw(content) if !content.is_empty() => {
            lines.push(format!("    And request '{}'", vars_to_karate(content)));
        }
        RequestBody::Graphql(graphql) => {
            let body = json!({
                "query": graphql.query,
                "variables": graphql.variables,
            });
            push_docstring_body(&mut lines, &body);
        }
        _ => {}
    }

    lines.push(format!("    When method {}", method));

    if capture_http_details {
        let escaped = request.name.replace('\'', "\\'");
        lines.push(format!(
            "    * def captureData = {{ scenarioName: '{}', request: karate.prevRequest, \
             response: {{ status: responseStatus, headers: responseHeaders, body: response, \
             time: responseTime }} }}",
            escaped
        ));
        lines.push("    * def httpCaptures = httpCaptures + [captureData]".to_string());
        lines.push("    * karate.set('httpCaptures', httpCaptures)".to_string());
    }

    for assertion in &request.assertions {
        for step in assertion_to_steps(assertion) {
            lines.push(format!("    {}", step));
        }
    }

    for extraction in &request.variable_extractions {
        if let Some(step) = extraction_to_step(extraction) {
            lines.push(format!("    {}", step));
        }
    }

    lines
}

fn push_docstring_body(lines: &mut Vec<String>, content: &JsonValue) {
    let pretty = vars_to_karate(&to_json_indent6(content));
    lines.push("    And request".to_string());
    lines.push("    \"\"\"".to_string());
    for line in pretty.lines() {
        lines.push(format!("    {}", line));
    }
    lines.push("    \"\"\"".to_string());
}

fn auth_to_steps(auth: &AuthConfig) -> Vec<String> {
    match auth {
        AuthConfig::Bearer { token } => vec![format!(
            "* header Authorization = 'Bearer ' + {}",
            karate_expr(token)
        )],
        AuthConfig::Basic { username, password } => vec![format!(
            "* configure headers = {{ Authorization: 'Basic ' + karate.toBase64({} + ':' + {}) }}",
            karate_expr(username),
            karate_expr(password)
        )],
        AuthConfig::ApiKey {
            key,
            value,
            location,
        } => match location {
            ApiKeyLocation::Header => {
                vec![format!("* header {} = '{}'", key, vars_to_karate(value))]
            }
            // query-located keys have no background step form
            ApiKeyLocation::Query => Vec::new(),
        },
        AuthConfig::None => Vec::new(),
    }
}

fn assertion_to_steps(assertion: &AssertionSpec) -> Vec<String> {
    let mut lines = Vec::new();
    let check = match &assertion.check {
        CheckSpec::Known(check) => check,
        // unsupported types have no step translation
        CheckSpec::Unknown(_) => return lines,
    };

    match check {
        Check::Status(c) => match c.operator {
            StatusOp::Equals => {
                lines.push(format!("Then status {}", render_scalar(&c.expected)));
            }
            StatusOp::In => {
                if let JsonValue::Array(codes) = &c.expected {
                    let conditions = codes
                        .iter()
                        .map(|code| format!("responseStatus == {}", render_scalar(code)))
                        .collect::<Vec<_>>()
                        .join(" || ");
                    lines.push(format!("Then assert {}", conditions));
                } else {
                    lines.push(format!("Then status {}", render_scalar(&c.expected)));
                }
            }
            StatusOp::Range => {
                if let JsonValue::Array(bounds) = &c.expected {
                    if bounds.len() == 2 {
                        lines.push(format!(
                            "Then assert responseStatus >= {} && responseStatus <= {}",
                            render_scalar(&bounds[0]),
                            render_scalar(&bounds[1])
                        ));
                    }
                }
            }
        },
        Check::Jsonpath(c) => {
            let path = jsonpath_to_karate(&c.path);
            match c.operator {
                CompareOp::Exists => lines.push(format!("And match {} == '#present'", path)),
                CompareOp::NotExists => {
                    lines.push(format!("And match {} == '#notpresent'", path));
                }
                CompareOp::Equals => {
                    lines.push(format!("And match {} == {}", path, quote_expected(&c.expected)));
                }
                CompareOp::NotEquals => {
                    lines.push(format!("And match {} != {}", path, quote_expected(&c.expected)));
                }
                CompareOp::Contains => {
                    lines.push(format!(
                        "And match {} contains '{}'",
                        path,
                        render_scalar(&c.expected)
                    ));
                }
                // numeric and regex operators have no step translation
                _ => {}
            }
        }
        Check::Header(c) => match c.operator {
            CompareOp::Exists => {
                lines.push(format!("And match responseHeaders['{}'] == '#present'", c.name));
            }
            CompareOp::Equals => {
                lines.push(format!(
                    "And match responseHeaders['{}'][0] == '{}'",
                    c.name,
                    render_scalar(&c.expected)
                ));
            }
            CompareOp::Contains => {
                lines.push(format!(
                    "And match responseHeaders['{}'][0] contains '{}'",
                    c.name,
                    render_scalar(&c.expected)
                ));
            }
            _ => {}
        },
        Check::Timing(c) => {
            lines.push(format!("And assert responseTime < {}", c.max_ms));
        }
        Check::Schema(c) => {
            lines.push(format!("And match response == '#({})'", c.schema));
        }
        Check::BodyContains(c) => {
            lines.push(format!("And match response contains '{}'", c.expected));
        }
        // exact body comparison has no step translation
        Check::BodyEquals(_) => {}
    }

    lines
}

fn extraction_to_step(extraction: &VariableExtraction) -> Option<String> {
    if extraction.name.is_empty() {
        return None;
    }
    match extraction.source {
        ExtractionSource::Jsonpath => Some(format!(
            "* def {} = {}",
            extraction.name,
            jsonpath_to_karate(&extraction.path)
        )),
        ExtractionSource::Header => Some(format!(
            "* def {} = responseHeaders['{}'][0]",
            extraction.name, extraction.path
        )),
        ExtractionSource::Status => Some(format!("* def {} = responseStatus", extraction.name)),
        ExtractionSource::Body => Some(format!("* def {} = response", extraction.name)),
        // regex extraction has no step form
        ExtractionSource::Regex => None,
    }
}

/// Parse feature text back into a collection and its requests.
///
/// Simplified parser: unrecognized lines are ignored rather than erroring,
/// and the synthesized capture scenario is dropped.
pub fn to_requests(feature_content: &str) -> (CollectionConfig, Vec<RequestDef>) {
    let mut collection = CollectionConfig {
        name: "Imported Feature".to_string(),
        ..Default::default()
    };

    let mut requests: Vec<RequestDef> = Vec::new();
    let mut current: Option<RequestDef> = None;
    let mut in_background = false;
    let mut in_docstring = false;
    let mut docstring: Vec<String> = Vec::new();

    for raw in feature_content.lines() {
        let stripped = raw.trim();

        if stripped.is_empty() || stripped.starts_with('#') {
            continue;
        }

        if let Some(rest) = stripped.strip_prefix("Feature:") {
            collection.name = rest.trim().to_string();
            continue;
        }

        if stripped.starts_with("Background:") {
            in_background = true;
            continue;
        }

        if stripped.starts_with("Scenario:") || stripped.starts_with("Scenario Outline:") {
            in_background = false;
            push_parsed(&mut requests, current.take());
            let name = stripped
                .splitn(2, ':')
                .nth(1)
                .unwrap_or_default()
                .trim()
                .to_string();
            current = Some(blank_request(name));
            continue;
        }

        if stripped == "\"\"\"" {
            if in_docstring {
                in_docstring = false;
                if let Some(request) = current.as_mut() {
                    if !docstring.is_empty() {
                        request.body = docstring_body(&docstring);
                    }
                }
                docstring.clear();
            } else {
                in_docstring = true;
            }
            continue;
        }

        if in_docstring {
            docstring.push(stripped.to_string());
            continue;
        }

        if in_background {
            parse_background_step(stripped, &mut collection);
        } else if let Some(request) = current.as_mut() {
            parse_scenario_step(stripped, request);
        }
    }

    push_parsed(&mut requests, current.take());

    for (index, request) in requests.iter_mut().enumerate() {
        request.order_index = index as i64;
    }

    (collection, requests)
}

fn push_parsed(requests: &mut Vec<RequestDef>, scenario: Option<RequestDef>) {
    if let Some(request) = scenario {
        if request.name != CAPTURE_SCENARIO_NAME {
            requests.push(request);
        }
    }
}

fn blank_request(name: String) -> RequestDef {
    RequestDef {
        id: None,
        name,
        description: String::new(),
        method: "GET".to_string(),
        url_path: "/".to_string(),
        headers: IndexMap::new(),
        query_params: IndexMap::new(),
        body: RequestBody::None,
        assertions: Vec::new(),
        variable_extractions: Vec::new(),
        timeout_ms: None,
        order_index: 0,
        folder_path: String::new(),
    }
}

fn docstring_body(lines: &[String]) -> RequestBody {
    let content = karate_to_vars(&lines.join("\n"));
    match serde_json::from_str::<JsonValue>(&content) {
        Ok(json) => RequestBody::Json(json),
        Err(_) => RequestBody::Raw(content),
    }
}

fn parse_background_step(line: &str, collection: &mut CollectionConfig) {
    let step = strip_step_keyword(line);

    if let Some(rest) = step.strip_prefix("url ") {
        let url = rest.trim().trim_matches(|c| c == '\'' || c == '"');
        collection.base_url = Some(url.to_string());
    } else if let Some(caps) = BEARER_STEP_RE.captures(step) {
        collection.auth_config = Some(AuthConfig::Bearer {
            token: expr_to_vars(&caps[1]),
        });
    } else if step.starts_with("header ") {
        if let Some(caps) = HEADER_STEP_RE.captures(step) {
            collection
                .default_headers
                .insert(caps[1].to_string(), caps[2].to_string());
        }
    }
}

fn parse_scenario_step(line: &str, request: &mut RequestDef) {
    let step = strip_step_keyword(line);

    if let Some(rest) = step.strip_prefix("path ") {
        let path = rest.trim().trim_matches(|c| c == '\'' || c == '"');
        request.url_path = karate_to_vars(path);
    } else if let Some(rest) = step.strip_prefix("method ") {
        request.method = rest.trim().to_uppercase();
    } else if step.starts_with("header ") {
        if let Some(caps) = HEADER_STEP_RE.captures(step) {
            request
                .headers
                .insert(caps[1].to_string(), karate_to_vars(&caps[2]));
        }
    } else if step.starts_with("param ") {
        if let Some(caps) = PARAM_STEP_RE.captures(step) {
            request
                .query_params
                .insert(caps[1].to_string(), karate_to_vars(&caps[2]));
        }
    } else if step.starts_with("form field ") {
        if let Some(caps) = FORM_FIELD_STEP_RE.captures(step) {
            let value = JsonValue::String(karate_to_vars(&caps[2]));
            if let RequestBody::Form(fields) = &mut request.body {
                fields.insert(caps[1].to_string(), value);
            } else {
                let mut fields = IndexMap::new();
                fields.insert(caps[1].to_string(), value);
                request.body = RequestBody::Form(fields);
            }
        }
    } else if let Some(rest) = step.strip_prefix("request ") {
        // single-line body; multiline bodies arrive as docstrings
        let content = rest.trim().trim_matches(|c| c == '\'' || c == '"');
        request.body = docstring_body(&[content.to_string()]);
    } else if let Some(rest) = step.strip_prefix("status ") {
        if let Ok(code) = rest.trim().parse::<u16>() {
            request.assertions.push(AssertionSpec::of(Check::Status(StatusCheck {
                operator: StatusOp::Equals,
                expected: JsonValue::from(code),
            })));
        }
    } else if step.starts_with("match ") {
        parse_match_step(step, request);
    } else if let Some(rest) = step.strip_prefix("assert responseTime < ") {
        if let Ok(max_ms) = rest.trim().parse::<u64>() {
            request
                .assertions
                .push(AssertionSpec::of(Check::Timing(TimingCheck { max_ms })));
        }
    } else if step.starts_with("def ") {
        parse_def_step(step, request);
    }
}

fn parse_match_step(step: &str, request: &mut RequestDef) {
    let rest = &step["match ".len()..];
    let Some((left, right)) = rest.split_once("==") else {
        return;
    };

    let path = karate_to_jsonpath(left.trim());
    let expected = parse_expected(right);
    let (operator, expected) = if expected.as_str() == Some("#present") {
        (CompareOp::Exists, JsonValue::Null)
    } else if expected.as_str() == Some("#notpresent") {
        (CompareOp::NotExists, JsonValue::Null)
    } else {
        (CompareOp::Equals, expected)
    };
    request.assertions.push(AssertionSpec::of(Check::Jsonpath(JsonpathCheck {
        path,
        operator,
        expected,
    })));
}

fn parse_def_step(step: &str, request: &mut RequestDef) {
    let Some(caps) = DEF_STEP_RE.captures(step) else {
        return;
    };
    let name = caps[1].to_string();
    let expr = caps[2].trim();

    let extraction = if let Some(rest) = expr.strip_prefix("response.") {
        VariableExtraction {
            name,
            source: ExtractionSource::Jsonpath,
            path: format!("$.{}", rest),
            default: None,
        }
    } else if expr == "responseStatus" {
        VariableExtraction {
            name,
            source: ExtractionSource::Status,
            path: String::new(),
            default: None,
        }
    } else if expr == "response" {
        VariableExtraction {
            name,
            source: ExtractionSource::Body,
            path: String::new(),
            default: None,
        }
    } else if let Some(header) = HEADER_EXPR_RE.captures(expr) {
        VariableExtraction {
            name,
            source: ExtractionSource::Header,
            path: header[1].to_string(),
            default: None,
        }
    } else {
        // worker-side defs (captures, helpers) are not extractions
        return;
    };

    request.variable_extractions.push(extraction);
}

fn parse_expected(raw: &str) -> JsonValue {
    let trimmed = raw.trim();
    let quoted = (trimmed.starts_with('\'') && trimmed.ends_with('\'') && trimmed.len() >= 2)
        || (trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() >= 2);
    if quoted {
        return JsonValue::String(trimmed[1..trimmed.len() - 1].to_string());
    }
    serde_json::from_str(trimmed)
        .unwrap_or_else(|_| JsonValue::String(trimmed.to_string()))
}

fn strip_step_keyword(line: &str) -> &str {
    for keyword in ["* ", "Given ", "And ", "When ", "Then "] {
        if let Some(rest) = line.strip_prefix(keyword) {
            return rest;
        }
    }
    line
}

/// `{{var}}` and `{{var.path}}` become `#(var)` / `#(var.path)`.
pub fn vars_to_karate(text: &str) -> String {
    TEMPLATE_TOKEN_RE.replace_all(text, "#($1)").into_owned()
}

/// `#(var)` tokens back to `{{var}}` form.
pub fn karate_to_vars(text: &str) -> String {
    KARATE_TOKEN_RE.replace_all(text, "{{$1}}").into_owned()
}

/// Render text as a Karate right-hand-side expression: `{{var}}` tokens
/// become bare identifiers, literal pieces are quoted, mixed content
/// concatenates.
fn karate_expr(text: &str) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut last = 0;
    for caps in TEMPLATE_TOKEN_RE.captures_iter(text) {
        let token = caps.get(0).unwrap();
        if token.start() > last {
            parts.push(format!("'{}'", &text[last..token.start()]));
        }
        parts.push(caps[1].to_string());
        last = token.end();
    }
    if last < text.len() || parts.is_empty() {
        parts.push(format!("'{}'", &text[last..]));
    }
    parts.join(" + ")
}

/// One expression piece back to collection form: quoted text is a literal,
/// a bare identifier is a variable reference.
fn expr_to_vars(expr: &str) -> String {
    let trimmed = expr.trim();
    let quoted = (trimmed.starts_with('\'') && trimmed.ends_with('\'') && trimmed.len() >= 2)
        || (trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() >= 2);
    if quoted {
        return trimmed[1..trimmed.len() - 1].to_string();
    }
    if BARE_IDENT_RE.is_match(trimmed) {
        return format!("{{{{{}}}}}", trimmed);
    }
    trimmed.to_string()
}

/// `$.data.items[0].name` becomes `response.data.items[0].name`.
fn jsonpath_to_karate(jsonpath: &str) -> String {
    let path = jsonpath
        .strip_prefix("$.")
        .or_else(|| jsonpath.strip_prefix('$'))
        .unwrap_or(jsonpath);
    if path.is_empty() {
        "response".to_string()
    } else {
        format!("response.{}", path)
    }
}

fn karate_to_jsonpath(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("response.") {
        format!("$.{}", rest)
    } else if path == "response" {
        "$".to_string()
    } else {
        format!("$.{}", path)
    }
}

fn folder_slug(folder: &str) -> String {
    folder.replace('/', "_").replace(' ', "_").to_lowercase()
}

/// Strings render bare, everything else as compact JSON.
fn render_scalar(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Strings are single-quoted, everything else renders as JSON.
fn quote_expected(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => format!("'{}'", s),
        other => other.to_string(),
    }
}

fn to_json_indent6(value: &JsonValue) -> String {
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"      ");
    let mut out = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut out, formatter);
    if value.serialize(&mut ser).is_err() {
        return value.to_string();
    }
    String::from_utf8(out).unwrap_or_else(|_| value.to_string())
}
