//! Index-addressed property rows used by older protocol generations.
//!
//! A [`LegacyProperty`] is a named list of rows, each row a list of named
//! values. Rows can be filled in any order, but before the tree is sent every
//! row from 0 up must be present and all rows must have as many elements as
//! row 0.

use super::{Node, Property, Value};
use crate::config::RESERVED_REQUEST_ID;
use crate::error::*;

#[derive(Debug, Clone, PartialEq)]
pub struct LegacyProperty {
    name: String,
    message_id: u32,
    rows: Vec<Option<Vec<Node>>>,
}

impl LegacyProperty {
    /// Creates a tree with `rows` empty rows already in place.
    pub fn new(name: impl Into<String>, rows: usize) -> Self {
        LegacyProperty {
            name: name.into(),
            message_id: RESERVED_REQUEST_ID,
            rows: vec![Some(Vec::new()); rows],
        }
    }

    /// Takes over the request tag of a response tree handed out by the
    /// endpoint. The response tree itself is consumed.
    pub fn for_response(response: Property, name: impl Into<String>) -> Self {
        let mut legacy = LegacyProperty::new(name, 0);
        legacy.message_id = response.message_id();
        legacy
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn message_id(&self) -> u32 {
        self.message_id
    }

    pub fn rows(&self) -> usize {
        self.rows.len()
    }

    /// Adds `key = value` to row `index`, creating the row if needed. Rows
    /// skipped over stay unpopulated.
    pub fn add(&mut self, index: usize, key: &str, value: impl Into<Value>) -> &mut Self {
        if index >= self.rows.len() {
            self.rows.resize(index + 1, None);
        }
        self.rows[index]
            .get_or_insert_with(Vec::new)
            .push(Node::leaf(Some(key.into()), value.into()));
        self
    }

    /// Checks that there are no gaps and that all rows are equally long.
    pub fn check(&self) -> Result<()> {
        let width = match self.rows.first() {
            None => return Err(ErrorKind::Structural("no rows".into()).into()),
            Some(None) => return Err(ErrorKind::Structural("row 0 is missing".into()).into()),
            Some(Some(row)) => row.len(),
        };
        if width == 0 {
            return Err(ErrorKind::Structural("row 0 has no elements".into()).into());
        }
        for (i, row) in self.rows.iter().enumerate().skip(1) {
            match row {
                None => {
                    return Err(ErrorKind::Structural(format!("row {} is missing", i)).into())
                }
                Some(row) if row.len() != width => {
                    return Err(ErrorKind::Structural(format!(
                        "row {} has {} elements, row 0 has {}",
                        i,
                        row.len(),
                        width
                    ))
                    .into())
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    pub fn is_sound(&self) -> bool {
        self.check().is_ok()
    }

    /// Converts to the nested shape: one element named after this tree with
    /// one unnamed child per row.
    pub fn into_property(self) -> Result<Property> {
        self.check()?;
        let rows = self
            .rows
            .into_iter()
            .flatten()
            .map(|row| Node::nested(None, row))
            .collect();
        let mut property = Property::new().with_message_id(self.message_id);
        property.push(Node::nested(Some(self.name), rows));
        Ok(property)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties::ValueType;

    fn row(p: &mut LegacyProperty, index: usize) {
        p.add(index, "name", "button").add(index, "id", 1u64);
    }

    #[test]
    fn sound_rows_convert() {
        let mut p = LegacyProperty::new("buttonInputDescriptions", 0);
        row(&mut p, 1);
        row(&mut p, 0);
        assert!(p.is_sound());

        let property = p.into_property().unwrap();
        assert_eq!(property.len(), 1);
        assert_eq!(property.name(0).unwrap(), Some("buttonInputDescriptions"));
        let rows = property.get_property_by_index(0).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows.name(0).unwrap(), None);
        assert_eq!(rows.value_type(1).unwrap(), ValueType::Nested);
        let first = rows.get_property_by_index(0).unwrap();
        assert_eq!(first.get_string(0).unwrap(), "button");
        assert_eq!(first.get_uint(1).unwrap(), 1);
    }

    #[test]
    fn gap_is_unsound() {
        let mut p = LegacyProperty::new("x", 0);
        row(&mut p, 0);
        row(&mut p, 2);
        let e = p.check().unwrap_err();
        assert_eq!(*e.kind(), ErrorKind::Structural("row 1 is missing".into()));
    }

    #[test]
    fn missing_first_row_is_unsound() {
        let mut p = LegacyProperty::new("x", 0);
        row(&mut p, 1);
        row(&mut p, 2);
        assert!(!p.is_sound());
    }

    #[test]
    fn empty_rows_are_unsound() {
        assert!(!LegacyProperty::new("x", 2).is_sound());
        assert!(!LegacyProperty::new("x", 1).is_sound());
        assert!(!LegacyProperty::new("x", 0).is_sound());
    }

    #[test]
    fn differing_widths_are_unsound() {
        let mut p = LegacyProperty::new("x", 0);
        row(&mut p, 0);
        p.add(1, "name", "short");
        assert!(matches!(
            p.into_property().unwrap_err().kind(),
            ErrorKind::Structural(_)
        ));
    }

    #[test]
    fn response_tag_is_kept() {
        let mut p = LegacyProperty::for_response(Property::for_request(42), "x");
        row(&mut p, 0);
        assert_eq!(p.into_property().unwrap().message_id(), 42);
    }
}
