//! Integration tests for the mapping example files in testdata/mappings.

use serde_json::{Map, Value, json};
use std::fs;
use std::path::PathBuf;
use tripmap_mapping::{
    ActionSpec, DiagnosticKind, MappingDsl, MappingSpec, Providers, Severity, TransformEngine,
};

fn testdata_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../testdata")
}

fn parse_mapping_file(file_name: &str) -> MappingSpec {
    let mapping_path = testdata_dir().join("mappings").join(file_name);
    MappingDsl::parse_file(&mapping_path)
        .unwrap_or_else(|err| panic!("failed to parse {}: {}", mapping_path.display(), err))
}

fn load_payload(file_name: &str) -> Value {
    let path = testdata_dir().join("payloads").join(file_name);
    let raw = fs::read_to_string(&path)
        .unwrap_or_else(|err| panic!("failed to read {}: {}", path.display(), err));
    serde_json::from_str(&raw).unwrap()
}

fn agency_config() -> Map<String, Value> {
    let raw = fs::read_to_string(testdata_dir().join("providers/agency.yaml")).unwrap();
    serde_yaml::from_str(&raw).unwrap()
}

#[test]
fn mapping_examples_parse_successfully() {
    let flights = parse_mapping_file("skylane_flight_offers.yaml");
    let hotels = parse_mapping_file("lakeside_hotel_availability.yaml");
    let fares = parse_mapping_file("legacy_fare_rules.yaml");

    assert_eq!(flights.name.as_deref(), Some("skylane_flight_offers"));
    assert_eq!(hotels.name.as_deref(), Some("lakeside_hotel_availability"));
    assert_eq!(fares.name.as_deref(), Some("legacy_fare_rules"));

    assert_eq!(flights.max_depth(), 3);
    assert_eq!(hotels.max_depth(), 2);
}

#[test]
fn mapping_examples_cover_expected_actions() {
    let hotels = parse_mapping_file("lakeside_hotel_availability.yaml");
    let names: Vec<&str> = hotels.actions().into_iter().map(ActionSpec::name).collect();

    for expected in [
        "capitalise",
        "chain",
        "uppercase",
        "prepend",
        "type_cast",
        "extract_index_data",
        "list_to_dict",
        "trim",
        "value_in",
        "sum_field_in_dict_list",
    ] {
        assert!(names.contains(&expected), "missing action {expected}: {names:?}");
    }

    let fares = parse_mapping_file("legacy_fare_rules.yaml");
    assert!(fares.actions().iter().any(|action| !action.is_implemented()));
}

#[test]
fn flight_offers_map_to_canonical_offers() {
    let spec = parse_mapping_file("skylane_flight_offers.yaml");
    let source = load_payload("skylane_flight_offers.json");
    let engine = TransformEngine::with_providers(Providers::new().with_config(agency_config()));

    let outcome = engine.run(&source, &spec).unwrap();

    assert_eq!(
        outcome.document,
        json!({
            "search": {
                "id": "S-1001",
                "currency": "EUR",
                "agency": "AG-42",
                "markup_percent": 3
            },
            "offers": [
                {
                    "offer_id": "OF-1",
                    "price": {"amount": 249.9, "currency": "EUR", "taxes": 35.5},
                    "route": "LH,LH",
                    "stops": [],
                    "segments": [
                        {"flight_number": "LH101", "departure": "FRA", "arrival": "MUC", "offer_id": "OF-1"},
                        {"flight_number": "LH410", "departure": "MUC", "arrival": "JFK", "offer_id": "OF-1"}
                    ],
                    "cabin": "Economy Class",
                    "refundable": true,
                    "baggage": "1PC"
                },
                {
                    "offer_id": "OF-2",
                    "price": {"amount": 310.0, "currency": "EUR", "taxes": 25},
                    "route": "UA",
                    "stops": ["YYZ"],
                    "segments": [
                        {"flight_number": "UA961", "departure": "FRA", "arrival": "JFK", "offer_id": "OF-2"}
                    ],
                    "cabin": "Premium Economy",
                    "refundable": false,
                    "baggage": null
                }
            ]
        })
    );
    assert_eq!(outcome.unique_ids, vec![json!("OF-1"), json!("OF-2")]);

    // only the null baggage of OF-2 is downgraded, and quietly
    assert_eq!(outcome.diagnostics.len(), 1);
    assert_eq!(outcome.diagnostics[0].severity, Severity::Debug);
    assert_eq!(outcome.diagnostics[0].target, "baggage");
}

#[test]
fn flight_offers_without_config_provider_fail() {
    let spec = parse_mapping_file("skylane_flight_offers.yaml");
    let source = load_payload("skylane_flight_offers.json");

    let err = TransformEngine::new().transform(&source, &spec).unwrap_err();
    assert!(matches!(
        err,
        tripmap_mapping::Error::MissingProvider { ref scope } if scope == "config"
    ));
}

#[test]
fn hotel_availability_keys_rooms_by_code() {
    let spec = parse_mapping_file("lakeside_hotel_availability.yaml");
    let source = load_payload("lakeside_hotel_availability.json");

    let outcome = TransformEngine::new().run(&source, &spec).unwrap();

    assert_eq!(
        outcome.document,
        json!({
            "property": {
                "id": "H-778",
                "name": "Grand Hotel Du Lac",
                "location": "H-778 / GENEVA",
                "stars": 4,
                "postal_line": "1201 Geneva",
                "rating": null,
                "source": "lakeside"
            },
            "rooms": {
                "DBL": {
                    "code": "DBL",
                    "name": "Double room, lake view",
                    "breakfast_included": true,
                    "total": 460,
                    "property_id": "H-778"
                },
                "SGL": {
                    "code": "SGL",
                    "name": "Single room",
                    "breakfast_included": false,
                    "total": 240,
                    "property_id": "H-778"
                }
            }
        })
    );
    assert_eq!(outcome.unique_ids, vec![json!("H-778")]);
    assert!(
        outcome
            .diagnostics
            .iter()
            .all(|d| d.kind == DiagnosticKind::MissingField && d.severity == Severity::Debug)
    );
}

#[test]
fn legacy_fare_rules_downgrade_unimplemented_action() {
    let spec = parse_mapping_file("legacy_fare_rules.yaml");
    let source = json!({"fare": {"base": "YOWUS", "amount": 120}});

    let outcome = TransformEngine::new().run(&source, &spec).unwrap();

    assert_eq!(
        outcome.document,
        json!({"fare": {"base": "YOWUS", "amount_with_markup": null}})
    );
    assert_eq!(outcome.diagnostics[0].kind, DiagnosticKind::ActionFailed);
    assert!(outcome.diagnostics[0].message.contains("multiply"));
}

#[test]
fn mapping_yaml_roundtrip_preserves_rules() {
    let spec = parse_mapping_file("lakeside_hotel_availability.yaml");
    let yaml = MappingDsl::to_yaml(&spec).unwrap();
    let reparsed = MappingDsl::parse(&yaml).unwrap();

    assert_eq!(reparsed, spec);
}
