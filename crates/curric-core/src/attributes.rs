//! Free-form per-tag attribute document.
//!
//! Attributes are stored as an ordered key → JSON value map. Known keys get
//! typed accessors; unknown keys are carried through unchanged so a read,
//! patch, and write cycle never drops data written by other producers.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const COLOR: &str = "color";
pub const PIC: &str = "pic";
pub const FULL_NAME: &str = "full_name";
pub const IS_DEFAULT: &str = "is_default";
pub const MULTI_GRADE: &str = "multi_grade";

/// One `multi_grade` entry: grade tags that also count as this grade in a country.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiGrade {
    pub country_id: String,
    pub grade_tag_ids: Vec<String>,
}

/// Ordered attribute document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attributes(Map<String, Value>);

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    fn str_value(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// True when the key is absent or explicitly null.
    fn is_unset(&self, key: &str) -> bool {
        matches!(self.0.get(key), None | Some(Value::Null))
    }

    pub fn color(&self) -> Option<&str> {
        self.str_value(COLOR)
    }

    pub fn pic(&self) -> Option<&str> {
        self.str_value(PIC)
    }

    pub fn full_name(&self) -> Option<&str> {
        self.str_value(FULL_NAME)
    }

    pub fn is_default(&self) -> bool {
        self.0
            .get(IS_DEFAULT)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn set_is_default(&mut self, value: bool) {
        self.insert(IS_DEFAULT, value);
    }

    /// Parse `multi_grade`, skipping malformed entries.
    pub fn multi_grade(&self) -> Vec<MultiGrade> {
        let Some(Value::Array(entries)) = self.0.get(MULTI_GRADE) else {
            return Vec::new();
        };
        entries
            .iter()
            .filter_map(|entry| {
                let obj = entry.as_object()?;
                let country_id = obj.get("country_id")?.as_str()?.to_string();
                let grade_tag_ids = obj
                    .get("grade_tag_ids")?
                    .as_array()?
                    .iter()
                    .filter_map(|g| g.as_str().map(str::to_string))
                    .collect();
                Some(MultiGrade {
                    country_id,
                    grade_tag_ids,
                })
            })
            .collect()
    }

    /// True when a `multi_grade` entry for `country_id` lists `grade_tag_id`.
    pub fn shares_grade(&self, country_id: &str, grade_tag_id: &str) -> bool {
        self.multi_grade().iter().any(|mg| {
            mg.country_id == country_id && mg.grade_tag_ids.iter().any(|g| g == grade_tag_id)
        })
    }

    /// Fill `color` and `pic` when they are unset and a non-empty default exists.
    pub fn apply_display_defaults(&mut self, default_color: &str, default_pic: &str) {
        if self.is_unset(COLOR) && !default_color.is_empty() {
            self.insert(COLOR, default_color);
        }
        if self.is_unset(PIC) && !default_pic.is_empty() {
            self.insert(PIC, default_pic);
        }
    }

    /// Copy every key of `existing` not present in `self`.
    pub fn merge_missing_from(&mut self, existing: &Attributes) {
        for (key, value) in existing.iter() {
            if !self.0.contains_key(key) {
                self.0.insert(key.clone(), value.clone());
            }
        }
    }
}

impl From<Map<String, Value>> for Attributes {
    fn from(map: Map<String, Value>) -> Self {
        Attributes(map)
    }
}

impl From<Attributes> for Value {
    fn from(attrs: Attributes) -> Self {
        Value::Object(attrs.0)
    }
}
