mod common;

use std::collections::{BTreeMap, HashMap};

use cqlmap::{
    data::Value,
    error::TemplateError,
    template::{ObjectSource, PlaceholderTemplate},
};
use proptest::prelude::*;

use common::{Address, Customer, classes};

fn values(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect()
}

#[test]
fn prefix_tokens_do_not_clobber_longer_ones() {
    let template = PlaceholderTemplate::parse("MATCH (n) WHERE n.a = '#A' AND n.b = '#AA'").unwrap();
    let rendered = template
        .substitute(&values(&[("A", Value::from("x")), ("AA", Value::from("y"))]))
        .unwrap();
    assert_eq!(rendered, "MATCH (n) WHERE n.a = 'x' AND n.b = 'y'");
    assert_eq!(template.tokens(), ["A", "AA"]);
    assert_eq!(template.tokens_by_length(), ["AA", "A"]);

    // Only the longer token has a value: `#AA` must not be read as `#A` + "A".
    let partial = template.substitute(&values(&[("AA", Value::from("y"))]));
    assert_eq!(
        partial,
        Err(TemplateError::MissingValue {
            token: "A".to_string()
        })
    );
}

#[test]
fn templates_report_whether_they_carry_placeholders() {
    assert!(PlaceholderTemplate::parse("RETURN #a").unwrap().has_placeholders());
    let plain = PlaceholderTemplate::parse("MATCH (n) RETURN n").unwrap();
    assert!(!plain.has_placeholders());
    assert!(plain.tokens_by_length().is_empty());
}

#[test]
fn optional_segment_is_dropped_when_a_token_is_missing() {
    let template =
        PlaceholderTemplate::parse("MATCH (n:`#label`) <[WHERE n.id = #id]> RETURN n").unwrap();
    assert_eq!(template.optional_segment_count(), 1);

    let without = template
        .substitute(&values(&[("label", Value::from("Person"))]))
        .unwrap();
    assert_eq!(without, "MATCH (n:`Person`)  RETURN n");

    let with = template
        .substitute(&values(&[
            ("label", Value::from("Person")),
            ("id", Value::Long(7)),
        ]))
        .unwrap();
    assert_eq!(with, "MATCH (n:`Person`) WHERE n.id = 7 RETURN n");
}

#[test]
fn null_map_value_elides_optional_segment_but_renders_mandatory() {
    let template = PlaceholderTemplate::parse("RETURN #a<[, #b]>").unwrap();
    let mut map = HashMap::<String, Value>::new();
    map.insert("a".into(), Value::Null);
    map.insert("b".into(), Value::Null);
    assert_eq!(template.substitute(&map).unwrap(), "RETURN null");
}

#[test]
fn missing_mandatory_token_is_an_error() {
    let template = PlaceholderTemplate::parse("MATCH (n) WHERE n.id = #id RETURN n").unwrap();
    assert_eq!(
        template.substitute(&BTreeMap::new()),
        Err(TemplateError::MissingValue { token: "id".into() })
    );
}

#[test]
fn lookup_falls_back_to_case_insensitive_names() {
    let template = PlaceholderTemplate::parse("RETURN #tableName").unwrap();
    let rendered = template
        .substitute(&values(&[("TABLENAME", Value::from("orders"))]))
        .unwrap();
    assert_eq!(rendered, "RETURN orders");
}

#[test]
fn text_values_are_escaped_for_quoted_literals() {
    let template = PlaceholderTemplate::parse("WHERE n.name = '#name'").unwrap();
    let rendered = template
        .substitute(&values(&[("name", Value::from("O'Brien"))]))
        .unwrap();
    assert_eq!(rendered, r"WHERE n.name = 'O\'Brien'");
}

#[test]
fn object_source_reads_getters_and_nested_paths() {
    let classes = classes();
    let customer = Customer {
        id: 0,
        name: None,
        address: Some(Address {
            city: Some("Oslo".into()),
            zip: None,
        }),
        ..Customer::default()
    };
    let source = ObjectSource::new(&classes.customer, &customer);
    let template = PlaceholderTemplate::parse(
        "MATCH (c {id: #id}) <[WHERE c.name = '#name']> <[AND c.city = '#address.city']>",
    )
    .unwrap();
    // The primitive id stays even at its zero value; the absent name drops its segment.
    assert_eq!(
        template.substitute(&source).unwrap(),
        "MATCH (c {id: 0})  AND c.city = 'Oslo'"
    );
}

#[test]
fn primitive_tokens_keep_their_optional_segment() {
    let classes = classes();
    let customer = Customer::default();
    let source = ObjectSource::new(&classes.customer, &customer);
    let template =
        PlaceholderTemplate::parse("MATCH (c)<[ WHERE c.id = #id]><[ AND c.age = #age]> RETURN c")
            .unwrap();
    assert_eq!(
        template.substitute(&source).unwrap(),
        "MATCH (c) WHERE c.id = 0 RETURN c"
    );
}

#[test]
fn object_source_treats_absent_nested_object_as_null() {
    let classes = classes();
    let customer = Customer {
        id: 3,
        name: Some("Ada".into()),
        ..Customer::default()
    };
    let source = ObjectSource::new(&classes.customer, &customer);
    let template =
        PlaceholderTemplate::parse("MATCH (c {id: #id, name: '#name'})<[ WHERE c.city = '#address.city']>")
            .unwrap();
    assert_eq!(
        template.substitute(&source).unwrap(),
        "MATCH (c {id: 3, name: 'Ada'})"
    );

    let unknown = PlaceholderTemplate::parse("RETURN #nickname").unwrap();
    assert_eq!(
        unknown.substitute(&source),
        Err(TemplateError::MissingValue {
            token: "nickname".into()
        })
    );
}

proptest! {
    #[test]
    fn tokens_by_length_never_increase(names in prop::collection::vec("[a-z][a-z0-9_]{0,8}", 1..6)) {
        let text = names
            .iter()
            .map(|name| format!("#{name}"))
            .collect::<Vec<_>>()
            .join(" , ");
        let template = PlaceholderTemplate::parse(&text).unwrap();
        let lengths = template
            .tokens_by_length()
            .iter()
            .map(String::len)
            .collect::<Vec<_>>();
        prop_assert!(lengths.windows(2).all(|pair| pair[0] >= pair[1]));
        prop_assert_eq!(template.tokens().len(), template.tokens_by_length().len());
    }

    #[test]
    fn substitution_replaces_every_token(names in prop::collection::btree_set("[a-z]{1,6}", 1..5)) {
        let text = names
            .iter()
            .map(|name| format!("#{name}"))
            .collect::<Vec<_>>()
            .join(" ");
        let template = PlaceholderTemplate::parse(&text).unwrap();
        let map = names
            .iter()
            .map(|name| (name.clone(), Value::Long(name.len() as i64)))
            .collect::<BTreeMap<_, _>>();
        let rendered = template.substitute(&map).unwrap();
        prop_assert!(!rendered.contains('#'));
        let expected = names
            .iter()
            .map(|name| name.len().to_string())
            .collect::<Vec<_>>()
            .join(" ");
        prop_assert_eq!(rendered, expected);
    }
}
