//! Persisting property trees under string keys

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::*;
use crate::message::PropertyElement;
use crate::properties::Property;

pub trait PropertyStore {
    fn load(&self, key: &str) -> Result<Property>;
    fn save(&mut self, key: &str, property: &Property) -> Result<()>;
}

/// All keys in one JSON document, rewritten atomically on every save.
///
/// ```no_run
/// use dsvdc::{JsonFileStore, Property, PropertyStore};
///
/// let mut store = JsonFileStore::open("/var/lib/vdc/properties.json", true)?;
/// let mut p = Property::new();
/// p.add_double("brightness", 42.0);
/// store.save("lamp", &p)?;
/// # Ok::<(), dsvdc::Error>(())
/// ```
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    writable: bool,
    records: BTreeMap<String, Vec<PropertyElement>>,
}

impl JsonFileStore {
    /// Open the store at `path`. A missing file is an error unless `writable`,
    /// in which case the store starts out empty.
    pub fn open<P: AsRef<Path>>(path: P, writable: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let records = match File::open(&path) {
            Ok(file) => serde_json::from_reader(BufReader::new(file))?,
            Err(e) if e.kind() == io::ErrorKind::NotFound && writable => BTreeMap::new(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(Error::with_source(
                    ErrorKind::NotFound(path.display().to_string()),
                    e,
                ))
            }
            Err(e) => return Err(e.into()),
        };
        Ok(JsonFileStore {
            path,
            writable,
            records,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }

    /// Write `records` to a temporary file next to the store and move it over
    /// the store. Nothing touches the store file unless encoding succeeded.
    fn write(&self, records: &BTreeMap<String, Vec<PropertyElement>>) -> Result<()> {
        let mut document = serde_json::to_vec_pretty(records)
            .map_err(|e| Error::with_source(ErrorKind::Param(e.to_string()), e))?;
        document.push(b'\n');

        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let mut file = tempfile::NamedTempFile::new_in(dir)?;
        file.write_all(&document)?;
        file.as_file().sync_all()?;
        file.persist(&self.path).map_err(|e| Error::from(e.error))?;
        debug!(path = %self.path.display(), "property store written");
        Ok(())
    }
}

impl PropertyStore for JsonFileStore {
    fn load(&self, key: &str) -> Result<Property> {
        let elements = self
            .records
            .get(key)
            .ok_or_else(|| Error::from(ErrorKind::NotFound(key.into())))?;
        Property::from_elements(elements.clone())
    }

    fn save(&mut self, key: &str, property: &Property) -> Result<()> {
        if !self.writable {
            return Err(ErrorKind::Param(format!(
                "{} is opened read-only",
                self.path.display()
            ))
            .into());
        }
        let mut records = self.records.clone();
        records.insert(key.into(), property.to_elements());
        self.write(&records)?;
        self.records = records;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Property {
        let mut state = Property::new();
        state.add_uint("scene", 17).add_bytes("raw", vec![0, 1, 254]);

        let mut p = Property::new();
        p.add_bool("on", true)
            .add_int("offset", -1)
            .add_double("brightness", 33.5)
            .add_string("name", "lamp")
            .add_property("state", state);
        p
    }

    #[test]
    fn test_roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        let mut store = JsonFileStore::open(&path, true).unwrap();
        store.save("lamp", &sample()).unwrap();

        let store = JsonFileStore::open(&path, false).unwrap();
        let loaded = store.load("lamp").unwrap();
        assert_eq!(loaded, sample());
        assert_eq!(store.keys().collect::<Vec<_>>(), vec!["lamp"]);
    }

    #[test]
    fn test_missing_file_read_only() {
        let dir = tempfile::tempdir().unwrap();
        let e = JsonFileStore::open(dir.path().join("none.json"), false).unwrap_err();
        assert!(matches!(e.kind(), ErrorKind::NotFound(_)));
    }

    #[test]
    fn test_non_finite_double_is_not_stored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        let mut store = JsonFileStore::open(&path, true).unwrap();
        store.save("good", &sample()).unwrap();

        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let mut p = Property::new();
            p.add_double("brightness", bad);
            let e = store.save("bad", &p).unwrap_err();
            assert!(matches!(e.kind(), ErrorKind::Param(_)));
        }
        assert!(store.load("bad").is_err());

        let store = JsonFileStore::open(&path, false).unwrap();
        assert_eq!(store.load("good").unwrap(), sample());
        assert_eq!(store.keys().collect::<Vec<_>>(), vec!["good"]);
    }

    #[test]
    fn test_failed_write_keeps_previous_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone").join("store.json");

        let mut store = JsonFileStore::open(&path, true).unwrap();
        assert!(store.save("lamp", &sample()).is_err());
        assert_eq!(
            *store.load("lamp").unwrap_err().kind(),
            ErrorKind::NotFound("lamp".into())
        );
        assert_eq!(store.keys().count(), 0);

        std::fs::create_dir(dir.path().join("gone")).unwrap();
        store.save("other", &sample()).unwrap();
        let store = JsonFileStore::open(&path, false).unwrap();
        assert_eq!(store.keys().collect::<Vec<_>>(), vec!["other"]);
    }

    #[test]
    fn test_unknown_key_and_read_only_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        JsonFileStore::open(&path, true)
            .unwrap()
            .save("a", &sample())
            .unwrap();

        let mut store = JsonFileStore::open(&path, false).unwrap();
        assert_eq!(
            *store.load("b").unwrap_err().kind(),
            ErrorKind::NotFound("b".into())
        );
        assert!(matches!(
            store.save("b", &sample()).unwrap_err().kind(),
            ErrorKind::Param(_)
        ));
    }
}
