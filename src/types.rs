//! Data structures shared by the fetcher, differ and notifier.
//!
//! A [`Record`] is the last-known field state of one tracked user as the
//! remote store returned it.  The [`Snapshot`] is what the poll loop
//! currently believes is true, and a [`ChangeEvent`] is one classified
//! difference between two snapshots.  Records are compared structurally
//! over a key-sorted map, so the key order of the wire text never matters.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Shown when a record carries neither a name nor an email.
pub const PLACEHOLDER_NAME: &str = "Usuario";

const FIRST_NAME: &str = "nombre";
const LAST_NAME: &str = "apellido";
const EMAIL: &str = "email";
const PHOTO_URL: &str = "fotoUrl";

/// One tracked entity's fields, keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: BTreeMap<String, Value>,
}

impl Record {
    pub fn new(fields: BTreeMap<String, Value>) -> Self {
        Self { fields }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    /// Text form of a field.  Null and missing fields read as `None`,
    /// numbers and booleans use their JSON rendering.
    pub fn text(&self, field: &str) -> Option<String> {
        match self.fields.get(field)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// `"<nombre> <apellido>"` trimmed; empty when neither is set.
    pub fn announce_name(&self) -> String {
        let first = self.text(FIRST_NAME).unwrap_or_default();
        let last = self.text(LAST_NAME).unwrap_or_default();
        format!("{} {}", first, last).trim().to_string()
    }

    /// Name fields, then email, then [`PLACEHOLDER_NAME`].
    pub fn display_name(&self) -> String {
        let name = self.announce_name();
        if !name.is_empty() {
            return name;
        }
        match self.email() {
            Some(email) if !email.trim().is_empty() => email,
            _ => PLACEHOLDER_NAME.to_string(),
        }
    }

    pub fn email(&self) -> Option<String> {
        self.text(EMAIL)
    }

    pub fn photo_url(&self) -> Option<String> {
        self.text(PHOTO_URL).filter(|url| !url.is_empty())
    }

    /// Latitude and longitude, each read from `latitud`/`longitud` first and
    /// `lat`/`lng` second.  `None` unless both axes are numeric.
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        let axis = |primary: &str, fallback: &str| {
            self.get(primary)
                .and_then(Value::as_f64)
                .or_else(|| self.get(fallback).and_then(Value::as_f64))
        };
        Some((axis("latitud", "lat")?, axis("longitud", "lng")?))
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Identifier → record, as last reconciled.
///
/// Only the differ builds new snapshots; everyone else gets read access.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    entries: BTreeMap<String, Record>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_entries(entries: BTreeMap<String, Record>) -> Self {
        Self { entries }
    }

    pub(crate) fn into_entries(self) -> BTreeMap<String, Record> {
        self.entries
    }

    pub fn get(&self, id: &str) -> Option<&Record> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Record)> {
        self.entries.iter().map(|(id, r)| (id.as_str(), r))
    }
}

/// A classified difference produced by one reconciliation cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    /// The id was not tracked before this cycle.
    Added { id: String, record: Record },
    /// The id was tracked and at least one field differs.
    Changed { id: String, record: Record },
    /// The id was tracked and is absent from the fresh fetch.
    Removed { id: String },
}

impl ChangeEvent {
    pub fn id(&self) -> &str {
        match self {
            ChangeEvent::Added { id, .. }
            | ChangeEvent::Changed { id, .. }
            | ChangeEvent::Removed { id } => id,
        }
    }

    pub fn record(&self) -> Option<&Record> {
        match self {
            ChangeEvent::Added { record, .. } | ChangeEvent::Changed { record, .. } => Some(record),
            ChangeEvent::Removed { .. } => None,
        }
    }

    pub fn display_name(&self) -> Option<String> {
        self.record().map(Record::display_name)
    }
}
