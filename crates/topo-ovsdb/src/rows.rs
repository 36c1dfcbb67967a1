use std::collections::HashMap;

use crate::json::Json;

/// One row's worth of change, already merged against the cache (§4.E
/// "local row cache keyed by OVSDB UUID").
#[derive(Clone, Debug, PartialEq)]
pub enum RowChange {
    Upserted { table: String, uuid: String, row: Json },
    Deleted { table: String, uuid: String },
}

/// Per-table row cache. OVSDB `update` notifications carry only the
/// columns that changed, not the full row, so reconciliation needs the
/// merged view to see e.g. a bridge's full port list after a single port
/// was added.
#[derive(Default)]
pub struct RowCache {
    tables: HashMap<String, HashMap<String, Json>>,
}

impl RowCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, table: &str, uuid: &str) -> Option<&Json> {
        self.tables.get(table)?.get(uuid)
    }

    /// Every currently-cached row of one table, keyed by UUID. Used to find
    /// the owning side of a containment relationship (e.g. which `Bridge`
    /// row lists a given `Port` UUID) when the containing row arrived
    /// before the contained one (§4.E).
    pub fn rows(&self, table: &str) -> impl Iterator<Item = (&String, &Json)> {
        self.tables.get(table).into_iter().flat_map(|t| t.iter())
    }

    /// Apply one `update`/monitor-reply payload (`{table: {uuid: {old?,
    /// new?}}}`) and return the merged row changes in map iteration order.
    pub fn apply(&mut self, update: &Json) -> Vec<RowChange> {
        let mut changes = Vec::new();
        let Some(tables) = update.as_object() else {
            return changes;
        };

        for (table, rows) in tables {
            let Some(rows) = rows.as_object() else {
                continue;
            };
            for (uuid, row_update) in rows {
                let new = row_update.get("new");
                match new {
                    None => {
                        self.tables.get_mut(table).map(|t| t.remove(uuid));
                        changes.push(RowChange::Deleted {
                            table: table.clone(),
                            uuid: uuid.clone(),
                        });
                    }
                    Some(new_row) => {
                        let merged = merge_row(self.tables.entry(table.clone()).or_default().get(uuid), new_row);
                        self.tables.entry(table.clone()).or_default().insert(uuid.clone(), merged.clone());
                        changes.push(RowChange::Upserted {
                            table: table.clone(),
                            uuid: uuid.clone(),
                            row: merged,
                        });
                    }
                }
            }
        }
        changes
    }
}

fn merge_row(existing: Option<&Json>, update: &Json) -> Json {
    let Some(update_cols) = update.as_object() else {
        return update.clone();
    };
    let mut merged = existing.and_then(Json::as_object).cloned().unwrap_or_default();
    for (k, v) in update_cols {
        merged.insert(k.clone(), v.clone());
    }
    Json::Object(merged)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(table: &str, uuid: &str, old: Option<Json>, new: Option<Json>) -> Json {
        let mut row_update = std::collections::BTreeMap::new();
        if let Some(old) = old {
            row_update.insert("old".to_string(), old);
        }
        if let Some(new) = new {
            row_update.insert("new".to_string(), new);
        }
        Json::object([(table.to_string(), Json::object([(uuid.to_string(), Json::Object(row_update))]))])
    }

    #[test]
    fn initial_row_is_cached_in_full() {
        let mut cache = RowCache::new();
        let row = Json::object([("name".to_string(), Json::string("br0"))]);
        let changes = cache.apply(&update("Bridge", "u1", None, Some(row.clone())));
        assert_eq!(changes, vec![RowChange::Upserted { table: "Bridge".into(), uuid: "u1".into(), row }]);
    }

    #[test]
    fn partial_update_merges_onto_cached_row() {
        let mut cache = RowCache::new();
        cache.apply(&update(
            "Bridge",
            "u1",
            None,
            Some(Json::object([
                ("name".to_string(), Json::string("br0")),
                ("ports".to_string(), Json::Array(vec![])),
            ])),
        ));

        let changes = cache.apply(&update(
            "Bridge",
            "u1",
            None,
            Some(Json::object([("ports".to_string(), Json::Array(vec![Json::string("p1")]))])),
        ));

        let Some(RowChange::Upserted { row, .. }) = changes.into_iter().next() else {
            panic!("expected an upsert");
        };
        assert_eq!(row.get("name").and_then(Json::as_str), Some("br0"));
        assert_eq!(row.get("ports").and_then(Json::as_array).map(|a| a.len()), Some(1));
    }

    #[test]
    fn row_without_new_is_a_deletion_and_drops_from_cache() {
        let mut cache = RowCache::new();
        cache.apply(&update("Bridge", "u1", None, Some(Json::object([("name".to_string(), Json::string("br0"))]))));

        let changes = cache.apply(&update("Bridge", "u1", Some(Json::object([("name".to_string(), Json::string("br0"))])), None));
        assert_eq!(changes, vec![RowChange::Deleted { table: "Bridge".into(), uuid: "u1".into() }]);
        assert!(cache.get("Bridge", "u1").is_none());
    }
}
