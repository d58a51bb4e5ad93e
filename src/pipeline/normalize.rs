//! Entity normalization: one chunk's entity tree → one [`ExtractedRecord`].
//!
//! The walk is depth-first, pre-order, with the accumulator passed explicitly
//! so every placement decision is made in one of two small functions:
//!
//! * [`place_child`]: a child entity always lands in the **top-level** slot
//!   named after its parent's type. If that slot holds a scalar it is replaced
//!   by an empty group first.
//! * [`place_top_level`]: resolves a top-level name collision:
//!
//! | Existing slot | Incoming entity | Result |
//! |---|---|---|
//! | absent | any | `Scalar(text)` |
//! | Scalar | no children | `Scalar(text)` (last wins) |
//! | Scalar | has children | `{"value": old}`; children follow |
//! | Group  | no children | `group["value"] = text` (last wins) |
//! | Group  | has children | unchanged; children follow |

use crate::record::{ExtractedRecord, FieldValue, RawEntity, VALUE_KEY};
use tracing::debug;

/// Normalize the top-level entities of one chunk into a record.
pub fn normalize_entities(entities: &[RawEntity]) -> ExtractedRecord {
    let mut record = ExtractedRecord::new();
    for entity in entities {
        visit(entity, None, &mut record);
    }
    debug!("Normalized {} entities into {} fields", entities.len(), record.len());
    record
}

/// Place `entity`, then recurse into its children with `entity` as parent.
pub fn visit(entity: &RawEntity, parent: Option<&str>, record: &mut ExtractedRecord) {
    match parent {
        Some(parent) => place_child(entity, parent, record),
        None => place_top_level(entity, record),
    }
    for child in &entity.children {
        visit(child, Some(&entity.entity_type), record);
    }
}

fn place_child(entity: &RawEntity, parent: &str, record: &mut ExtractedRecord) {
    let slot = record
        .entry(parent.to_string())
        .or_insert_with(FieldValue::empty_group);

    if !slot.is_group() {
        debug!("Field '{}' is a parent; discarding its scalar value '{}'", parent, slot);
        *slot = FieldValue::empty_group();
    }

    if let FieldValue::Group(children) = slot {
        children.insert(entity.entity_type.clone(), FieldValue::scalar(&entity.text));
    }
}

fn place_top_level(entity: &RawEntity, record: &mut ExtractedRecord) {
    let name = entity.entity_type.as_str();
    let has_children = !entity.children.is_empty();

    if !record.contains_key(name) {
        record.insert(name.to_string(), FieldValue::scalar(&entity.text));
        return;
    }
    let Some(slot) = record.get_mut(name) else {
        return;
    };

    match slot {
        FieldValue::Group(group) => {
            if !has_children {
                group.insert(VALUE_KEY.to_string(), FieldValue::scalar(&entity.text));
            }
        }
        _ if has_children => {
            let previous = slot.as_scalar().unwrap_or_default().to_string();
            *slot = FieldValue::wrapped(previous);
        }
        _ => {
            debug!("Field '{}' repeated; '{}' replaces '{}'", name, entity.text, slot);
            *slot = FieldValue::scalar(&entity.text);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::FieldGroup;

    fn group(pairs: &[(&str, &str)]) -> FieldValue {
        let mut g = FieldGroup::new();
        for (k, v) in pairs {
            g.insert((*k).to_string(), FieldValue::scalar(*v));
        }
        FieldValue::Group(g)
    }

    #[test]
    fn flat_entities_become_scalars() {
        let record = normalize_entities(&[
            RawEntity::leaf("Year", "2023"),
            RawEntity::leaf("Company", "Acme"),
        ]);
        assert_eq!(record.len(), 2);
        assert_eq!(record["Year"], FieldValue::scalar("2023"));
        assert_eq!(record.get_index(1).map(|(k, _)| k.as_str()), Some("Company"));
    }

    #[test]
    fn duplicate_top_level_scalar_keeps_last() {
        let record = normalize_entities(&[
            RawEntity::leaf("Year", "2022"),
            RawEntity::leaf("Year", "2023"),
            RawEntity::leaf("Year", "2024"),
        ]);
        assert_eq!(record["Year"], FieldValue::scalar("2024"));
    }

    #[test]
    fn parent_text_is_replaced_by_children() {
        let record = normalize_entities(&[RawEntity::parent(
            "Assets",
            "Assets section",
            vec![
                RawEntity::leaf("Total-Assets", "$1,000"),
                RawEntity::leaf("Investments", "200"),
            ],
        )]);
        assert_eq!(
            record["Assets"],
            group(&[("Total-Assets", "$1,000"), ("Investments", "200")])
        );
    }

    /// Captures formatted log output for one test.
    #[derive(Clone, Default)]
    struct LogBuffer(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn ordinary_sections_log_no_warnings() {
        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .with_writer(move || writer.clone())
            .finish();

        let record = tracing::subscriber::with_default(subscriber, || {
            normalize_entities(&[
                RawEntity::parent("Assets", "Assets", vec![RawEntity::leaf("Total-Assets", "1")]),
                RawEntity::parent(
                    "Liabilities",
                    "Liabilities",
                    vec![RawEntity::leaf("Total-Liabilities", "2")],
                ),
            ])
        });

        assert_eq!(record.len(), 2);
        assert!(logs.0.lock().unwrap().is_empty());
    }

    #[test]
    fn repeated_name_without_children_replaces_any_non_group_slot() {
        let mut record = ExtractedRecord::new();
        record.insert(
            "Year".into(),
            FieldValue::Sequence(vec![FieldValue::scalar("2022")]),
        );
        visit(&RawEntity::leaf("Year", "2023"), None, &mut record);
        assert_eq!(record["Year"], FieldValue::scalar("2023"));

        visit(
            &RawEntity::parent("Year", "", vec![RawEntity::leaf("Fiscal", "FY23")]),
            None,
            &mut record,
        );
        assert_eq!(record["Year"], group(&[("value", "2023"), ("Fiscal", "FY23")]));
    }

    #[test]
    fn scalar_then_parent_promotes_to_value_group() {
        let record = normalize_entities(&[
            RawEntity::leaf("Liabilities", "see note 4"),
            RawEntity::parent(
                "Liabilities",
                "",
                vec![RawEntity::leaf("Total-Liabilities", "500")],
            ),
        ]);
        assert_eq!(
            record["Liabilities"],
            group(&[("value", "see note 4"), ("Total-Liabilities", "500")])
        );
    }

    #[test]
    fn later_children_land_under_existing_group() {
        let record = normalize_entities(&[
            RawEntity::parent("Assets", "", vec![RawEntity::leaf("Total-Assets", "1")]),
            RawEntity::parent(
                "Assets",
                "",
                vec![
                    RawEntity::leaf("Fixed-Assets", "2"),
                    RawEntity::leaf("Total-Assets", "3"),
                ],
            ),
        ]);
        assert_eq!(
            record["Assets"],
            group(&[("Total-Assets", "3"), ("Fixed-Assets", "2")])
        );
    }

    #[test]
    fn scalar_after_group_goes_under_value() {
        let record = normalize_entities(&[
            RawEntity::parent("Assets", "", vec![RawEntity::leaf("Total-Assets", "1")]),
            RawEntity::leaf("Assets", "first"),
            RawEntity::leaf("Assets", "second"),
        ]);
        assert_eq!(
            record["Assets"],
            group(&[("Total-Assets", "1"), ("value", "second")])
        );
    }

    #[test]
    fn grandchildren_are_keyed_by_their_parent_at_top_level() {
        let record = normalize_entities(&[RawEntity::parent(
            "Assets",
            "",
            vec![RawEntity::parent(
                "Current",
                "12",
                vec![RawEntity::leaf("Cash", "5")],
            )],
        )]);
        assert_eq!(record["Assets"], group(&[("Current", "12")]));
        assert_eq!(record["Current"], group(&[("Cash", "5")]));
    }

    #[test]
    fn child_overwrites_unrelated_top_level_scalar() {
        let record = normalize_entities(&[
            RawEntity::leaf("Current", "orphan"),
            RawEntity::parent(
                "Assets",
                "",
                vec![RawEntity::parent("Current", "", vec![RawEntity::leaf("Cash", "5")])],
            ),
        ]);
        assert_eq!(record["Current"], group(&[("Cash", "5")]));
    }

    #[test]
    fn every_entity_type_appears_somewhere() {
        let entities = vec![
            RawEntity::leaf("Year", "2023"),
            RawEntity::parent(
                "Profit-Loss-Statement",
                "",
                vec![
                    RawEntity::leaf("Net-Profit", "10"),
                    RawEntity::leaf("EBIDTA", "20"),
                ],
            ),
            RawEntity::leaf("Year", "2024"),
        ];
        let record = normalize_entities(&entities);
        for name in ["Year", "Profit-Loss-Statement"] {
            assert!(record.contains_key(name), "missing top-level {name}");
        }
        let pl = record["Profit-Loss-Statement"].as_group().unwrap();
        assert!(pl.contains_key("Net-Profit"));
        assert!(pl.contains_key("EBIDTA"));
    }

    #[test]
    fn empty_chunk_yields_empty_record() {
        assert!(normalize_entities(&[]).is_empty());
    }
}
