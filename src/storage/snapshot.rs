//! Binary snapshots of [`Facts`]
//!
//! A snapshot is a bincode-encoded list of (predicate, tuples) pairs with a
//! format version in front. Loading rebuilds the relation indexes.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::datalog::types::{Predicate, Tuple};
use crate::error::{KbError, Result, StorageError};
use crate::facts::Facts;

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct SnapshotFile {
    version: u32,
    relations: Vec<(Predicate, Vec<Tuple>)>,
}

/// Write every relation of `facts` to `path`
pub fn save(facts: &Facts, path: &Path) -> Result<()> {
    let mut relations: Vec<(Predicate, Vec<Tuple>)> = facts
        .iter()
        .map(|(p, r)| (p.clone(), r.iter().cloned().collect()))
        .collect();
    relations.sort_by(|a, b| a.0.cmp(&b.0));

    let snapshot = SnapshotFile {
        version: SNAPSHOT_VERSION,
        relations,
    };

    let mut writer = BufWriter::new(File::create(path)?);
    bincode::serialize_into(&mut writer, &snapshot)?;
    writer.flush()?;

    tracing::debug!(
        "snapshot written: {} ({} tuples)",
        path.display(),
        facts.tuple_count()
    );
    Ok(())
}

/// Read a snapshot written by [`save`]
pub fn load(path: &Path) -> Result<Facts> {
    let reader = BufReader::new(File::open(path)?);
    let snapshot: SnapshotFile = bincode::deserialize_from(reader)?;

    if snapshot.version != SNAPSHOT_VERSION {
        return Err(KbError::Storage(StorageError::Snapshot(format!(
            "unsupported snapshot version {}",
            snapshot.version
        ))));
    }

    let mut facts = Facts::new();
    for (predicate, tuples) in snapshot.relations {
        facts.ensure(&predicate);
        for tuple in tuples {
            facts.add(&predicate, tuple)?;
        }
    }
    Ok(facts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datalog::types::Value;
    use tempfile::tempdir;

    #[test]
    fn test_save_and_load_preserves_relations() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("facts.snapshot");

        let mut facts = Facts::new();
        let edge = Predicate::new("edge", 2);
        let empty = Predicate::new("unused", 3);
        facts
            .add(&edge, Tuple::ground(vec![Value::from("a"), Value::Integer(1)]))
            .unwrap();
        facts
            .add(&edge, Tuple::ground(vec![Value::from("b"), Value::Double(2.5)]))
            .unwrap();
        facts.ensure(&empty);

        save(&facts, &path).unwrap();
        let loaded = load(&path).unwrap();

        assert_eq!(loaded.tuple_count(), 2);
        assert!(loaded.contains(&edge, &Tuple::ground(vec![Value::from("b"), Value::Double(2.5)])));
        assert!(loaded.relation(&empty).is_some());
    }

    #[test]
    fn test_load_missing_file_is_storage_error() {
        let dir = tempdir().unwrap();
        let err = load(&dir.path().join("missing")).unwrap_err();
        assert_eq!(err.code(), "STORAGE_ERROR");
    }

    #[test]
    fn test_load_garbage_is_storage_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("garbage");
        std::fs::write(&path, b"not a snapshot").unwrap();
        assert!(matches!(load(&path), Err(KbError::Storage(_))));
    }
}
