//! Feature conversion round trips through the public API

use apipulse::gherkin::{self, outline, ConvertOptions, CAPTURE_SCENARIO_NAME};
use apipulse::models::{CollectionFile, CompareOp, RequestBody};
use serde_json::json;

const COLLECTION_YAML: &str = r#"
name: User API
description: Smoke tests for the user service
base_url: https://api.example.com
auth_config:
  type: bearer
  config:
    token: "{{api_token}}"
default_headers:
  Accept: application/json
requests:
  - name: List users
    method: GET
    url_path: /users
    folder_path: Users/Admin
    query_params:
      page: "1"
    assertions:
      - type: status
        config:
          operator: equals
          expected: 200
      - type: jsonpath
        config:
          path: $.items
          operator: exists
  - name: Create user
    method: POST
    url_path: /users
    body:
      type: json
      content:
        name: "{{user_name}}"
        role: admin
    assertions:
      - type: status
        config:
          operator: equals
          expected: 201
"#;

fn load_fixture() -> CollectionFile {
    serde_yaml::from_str(COLLECTION_YAML).expect("fixture must parse")
}

#[test]
fn test_generated_feature_structure() {
    let file = load_fixture();
    let feature = gherkin::to_feature(&file.requests, &file.collection);

    assert!(feature.starts_with("Feature: User API"));
    assert!(feature.contains("  Background:"));
    assert!(feature.contains("    * url 'https://api.example.com'"));
    assert!(feature.contains("* header Authorization = 'Bearer ' + api_token"));
    assert!(feature.contains("    * header Accept = 'application/json'"));

    assert!(feature.contains("  @get @users_admin"));
    assert!(feature.contains("  Scenario: List users"));
    assert!(feature.contains("    Given path '/users'"));
    assert!(feature.contains("    And param page = '1'"));
    assert!(feature.contains("    Then status 200"));
    assert!(feature.contains("And match response.items == '#present'"));

    // JSON bodies render as docstrings with template tokens converted
    assert!(feature.contains("  @post"));
    assert!(feature.contains("    And request"));
    assert!(feature.contains(r##""name": "#(user_name)""##));
    assert!(feature.contains("    When method post"));

    // the trailing capture scenario writes collected traffic to disk
    assert!(feature.contains("  @http-capture-output"));
    assert!(feature.contains(&format!("  Scenario: {}", CAPTURE_SCENARIO_NAME)));
}

#[test]
fn test_convert_options_suppress_background_and_capture() {
    let file = load_fixture();
    let options = ConvertOptions {
        feature_name: Some("Renamed Feature".to_string()),
        include_background: false,
        capture_http_details: false,
    };
    let feature = gherkin::to_feature_with(&file.requests, &file.collection, &options);

    assert!(feature.starts_with("Feature: Renamed Feature"));
    assert!(!feature.contains("Background:"));
    assert!(!feature.contains("httpCaptures"));
    assert!(!feature.contains(CAPTURE_SCENARIO_NAME));
}

#[test]
fn test_feature_round_trips_to_requests() {
    let file = load_fixture();
    let feature = gherkin::to_feature(&file.requests, &file.collection);

    let (collection, requests) = gherkin::to_requests(&feature);

    assert_eq!(collection.name, "User API");
    assert_eq!(collection.base_url.as_deref(), Some("https://api.example.com"));
    assert_eq!(
        collection.default_headers.get("Accept").map(String::as_str),
        Some("application/json")
    );

    // the capture scenario must not come back as a request
    assert_eq!(requests.len(), 2);

    let list = &requests[0];
    assert_eq!(list.name, "List users");
    assert_eq!(list.method, "GET");
    assert_eq!(list.url_path, "/users");
    assert_eq!(list.query_params.get("page").map(String::as_str), Some("1"));
    assert_eq!(list.order_index, 0);

    let create = &requests[1];
    assert_eq!(create.method, "POST");
    assert_eq!(create.order_index, 1);
    match &create.body {
        RequestBody::Json(value) => {
            // karate tokens inside the docstring convert back to templates
            assert_eq!(value["name"], json!("{{user_name}}"));
            assert_eq!(value["role"], json!("admin"));
        }
        other => panic!("expected JSON body, got {:?}", other),
    }

    // status assertions survive the trip
    let kinds: Vec<&str> = list.assertions.iter().map(|a| a.kind()).collect();
    assert!(kinds.contains(&"status"));
}

#[test]
fn test_present_marker_round_trips_as_exists() {
    let file = load_fixture();
    let feature = gherkin::to_feature(&file.requests, &file.collection);
    let (_, requests) = gherkin::to_requests(&feature);

    let list = &requests[0];
    let exists = list
        .assertions
        .iter()
        .filter_map(|a| match &a.check {
            apipulse::models::CheckSpec::Known(apipulse::models::Check::Jsonpath(check)) => {
                Some(check)
            }
            _ => None,
        })
        .find(|check| check.path == "$.items")
        .expect("jsonpath assertion must survive");
    assert_eq!(exists.operator, CompareOp::Exists);
}

#[test]
fn test_generated_feature_parses_cleanly() {
    let file = load_fixture();
    let feature = gherkin::to_feature(&file.requests, &file.collection);

    let parsed = outline::parse(&feature);
    assert!(parsed.validate().is_empty(), "{:?}", parsed.validate());
    assert_eq!(parsed.name, "User API");
    assert!(parsed.background.is_some());

    let names = parsed.scenario_names();
    assert_eq!(
        names,
        vec![
            "List users".to_string(),
            "Create user".to_string(),
            CAPTURE_SCENARIO_NAME.to_string(),
        ]
    );

    let tags = parsed.all_tags();
    assert!(tags.contains(&"@get".to_string()));
    assert!(tags.contains(&"@http-capture-output".to_string()));
}
