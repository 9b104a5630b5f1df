//! Domain objects (classes, functions, modules, ...) documented on each page.
//!
//! Persisted as three tables: `objects` (prefix → name → entry), `objnames` (type id → domain,
//! role, display name) and `objtypes` (type id → `domain:role`).

use crate::DocId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An object as supplied by the documentation build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectDef {
    /// Fully qualified, dot separated name such as `api.client.lib.search`.
    pub name: String,
    pub domain: String,
    pub role: String,
    #[serde(default)]
    pub display: Option<String>,
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default)]
    pub anchor: String,
}

fn default_priority() -> i32 {
    1
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectEntry {
    pub doc_id: DocId,
    pub objtype: u32,
    pub priority: i32,
    pub anchor: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjType {
    pub domain: String,
    pub role: String,
    pub display: String,
}

impl ObjType {
    /// The `objtypes` spelling, e.g. `py:function`.
    pub fn qualified(&self) -> String {
        format!("{}:{}", self.domain, self.role)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectIndex {
    objects: BTreeMap<String, BTreeMap<String, ObjectEntry>>,
    objtypes: Vec<ObjType>,
}

impl ObjectIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an object on `doc_id`. Object types get ids in first-seen order.
    ///
    /// Full names are unique: adding a name that is already present replaces the earlier
    /// entry, so the last definition wins.
    pub fn add(&mut self, doc_id: DocId, def: &ObjectDef) -> u32 {
        let objtype = self.intern_type(&def.domain, &def.role, def.display.as_deref());
        let (prefix, short) = split_name(&def.name);
        self.objects.entry(prefix.to_string()).or_default().insert(
            short.to_string(),
            ObjectEntry { doc_id, objtype, priority: def.priority, anchor: def.anchor.clone() },
        );
        objtype
    }

    fn intern_type(&mut self, domain: &str, role: &str, display: Option<&str>) -> u32 {
        if let Some(pos) = self.objtypes.iter().position(|t| t.domain == domain && t.role == role) {
            return pos as u32;
        }
        self.objtypes.push(ObjType {
            domain: domain.to_string(),
            role: role.to_string(),
            display: display.map(str::to_string).unwrap_or_else(|| format!("{domain} {role}")),
        });
        (self.objtypes.len() - 1) as u32
    }

    pub(crate) fn insert_raw(&mut self, prefix: String, name: String, entry: ObjectEntry) {
        self.objects.entry(prefix).or_default().insert(name, entry);
    }

    pub(crate) fn set_types(&mut self, objtypes: Vec<ObjType>) {
        self.objtypes = objtypes;
    }

    pub fn objtype(&self, id: u32) -> Option<&ObjType> {
        self.objtypes.get(id as usize)
    }

    pub fn objtypes(&self) -> &[ObjType] {
        &self.objtypes
    }

    /// Objects grouped by prefix, in name order.
    pub fn prefixes(&self) -> impl Iterator<Item = (&str, &BTreeMap<String, ObjectEntry>)> {
        self.objects.iter().map(|(p, m)| (p.as_str(), m))
    }

    /// Every object with its fully qualified name.
    pub fn iter(&self) -> impl Iterator<Item = (String, &ObjectEntry)> {
        self.objects.iter().flat_map(|(prefix, names)| {
            names.iter().map(move |(name, entry)| (join_name(prefix, name), entry))
        })
    }

    pub fn len(&self) -> usize {
        self.objects.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

fn split_name(full: &str) -> (&str, &str) {
    full.rsplit_once('.').unwrap_or(("", full))
}

pub(crate) fn join_name(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(name: &str, role: &str) -> ObjectDef {
        ObjectDef {
            name: name.into(),
            domain: "py".into(),
            role: role.into(),
            display: None,
            priority: 1,
            anchor: String::new(),
        }
    }

    #[test]
    fn types_are_interned_in_first_seen_order() {
        let mut idx = ObjectIndex::new();
        assert_eq!(idx.add(0, &def("api.client.Client", "class")), 0);
        assert_eq!(idx.add(0, &def("api.client.lib.search", "function")), 1);
        assert_eq!(idx.add(1, &def("api.client.lib.lookup", "function")), 1);
        assert_eq!(idx.objtype(1).unwrap().qualified(), "py:function");
        assert_eq!(idx.len(), 3);
        let names: Vec<String> = idx.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["api.client.Client", "api.client.lib.lookup", "api.client.lib.search"]);
    }

    #[test]
    fn top_level_names_have_empty_prefix() {
        let mut idx = ObjectIndex::new();
        idx.add(0, &def("requests", "module"));
        let (prefix, names) = idx.prefixes().next().unwrap();
        assert_eq!(prefix, "");
        assert!(names.contains_key("requests"));
    }

    #[test]
    fn redefinition_replaces_earlier_entry() {
        let mut idx = ObjectIndex::new();
        idx.add(0, &def("api.Client", "class"));
        idx.add(2, &def("api.Client", "function"));
        assert_eq!(idx.len(), 1);
        let (name, entry) = idx.iter().next().unwrap();
        assert_eq!(name, "api.Client");
        assert_eq!(entry.doc_id, 2);
        assert_eq!(entry.objtype, 1);
    }
}
