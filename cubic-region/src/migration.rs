//! Forward migrations between schema versions.
//!
//! Each step moves a region from exactly one version to the next and rewrites
//! the stored version in the same transaction as its data changes, so a crash
//! leaves the file either fully migrated or untouched. Steps re-check the
//! version inside that transaction and do nothing if it has moved on already.

use std::collections::BTreeMap;

use cubic_tag::Tag;
use log::{info, warn};
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::{Db, IVec, Transactional, Tree};

use crate::error::RegionError;
use crate::key::{TopographyPos, TOPOGRAPHY_KEY_LEN};
use crate::metadata::{self, decode_version, encode_value};
use crate::schema::{CURRENT_VERSION, TOPOGRAPHY_TREE, VERSION_KEY};

struct MigrationStep {
    from: i64,
    name: &'static str,
    /// Returns whether anything was changed.
    apply: fn(&Db, &Tree) -> Result<bool, RegionError>,
}

const STEPS: &[MigrationStep] = &[MigrationStep {
    from: 1,
    name: "unique_topography_rows",
    apply: unique_topography_rows,
}];

/// Applies every step needed to bring a region at version `from` up to
/// [`CURRENT_VERSION`], returning the version it ends at.
pub(crate) fn migrate(db: &Db, metadata: &Tree, from: i64) -> Result<i64, RegionError> {
    let mut version = from;
    while version < CURRENT_VERSION {
        let step = STEPS
            .iter()
            .find(|step| step.from == version)
            .ok_or_else(|| RegionError::unsupported_version(version))?;

        let changed = (step.apply)(db, metadata)?;
        let next = metadata::read_version(metadata)?;
        if next <= version {
            return Err(RegionError::CorruptMetadata(format!(
                "migration {} left the schema at version {next}",
                step.name
            )));
        }
        if changed {
            info!("Migrated region schema {version} -> {next} ({})", step.name);
        }
        version = next;
    }
    Ok(version)
}

/// Legacy topography key: the position followed by a big-endian row sequence.
const LEGACY_TOPOGRAPHY_KEY_LEN: usize = TOPOGRAPHY_KEY_LEN + 8;

enum Survivor {
    /// A row already stored under the unique key.
    Current,
    Legacy { sequence: u64, value: IVec },
}

#[derive(Default)]
struct TopographyRewrite {
    remove: Vec<IVec>,
    insert: Vec<([u8; TOPOGRAPHY_KEY_LEN], IVec)>,
}

/// Schema 1 allowed several rows per topography position. Only the newest
/// row of each position is kept, under the plain position key; a row that is
/// already stored under that key wins over any legacy one.
fn plan_topography_rewrite(topography: &Tree) -> Result<TopographyRewrite, RegionError> {
    let mut plan = TopographyRewrite::default();
    let mut survivors = BTreeMap::new();

    for entry in topography.iter() {
        let (key, value) = entry?;
        match key.len() {
            TOPOGRAPHY_KEY_LEN => {
                survivors.insert(TopographyPos::from_key(&key)?, Survivor::Current);
            }
            LEGACY_TOPOGRAPHY_KEY_LEN => {
                let pos = TopographyPos::from_key_prefix(&key)?;
                let mut sequence = [0; 8];
                sequence.copy_from_slice(&key[TOPOGRAPHY_KEY_LEN..]);
                let sequence = u64::from_be_bytes(sequence);

                let newer = match survivors.get(&pos) {
                    None => true,
                    Some(Survivor::Current) => false,
                    Some(Survivor::Legacy { sequence: kept, .. }) => sequence >= *kept,
                };
                if newer {
                    survivors.insert(pos, Survivor::Legacy { sequence, value });
                }
                plan.remove.push(key);
            }
            len => {
                return Err(RegionError::CorruptKey {
                    table: TOPOGRAPHY_TREE,
                    len,
                })
            }
        }
    }

    plan.insert = survivors
        .into_iter()
        .filter_map(|(pos, survivor)| match survivor {
            Survivor::Current => None,
            Survivor::Legacy { value, .. } => Some((pos.to_key(), value)),
        })
        .collect();
    Ok(plan)
}

fn unique_topography_rows(db: &Db, metadata: &Tree) -> Result<bool, RegionError> {
    let topography = db.open_tree(TOPOGRAPHY_TREE)?;
    let plan = plan_topography_rewrite(&topography)?;
    let version = encode_value(VERSION_KEY, &Tag::Int(2))?;
    if plan.remove.len() > plan.insert.len() {
        warn!(
            "Dropping {} superseded topography rows",
            plan.remove.len() - plan.insert.len()
        );
    }

    let result = (metadata, &topography).transaction(|(metadata, topography)| {
        let current = metadata.get(VERSION_KEY)?;
        let current =
            decode_version(current.as_deref()).map_err(ConflictableTransactionError::Abort)?;
        if current != 1 {
            return Ok(false);
        }

        for key in &plan.remove {
            topography.remove(key.clone())?;
        }
        for (key, value) in &plan.insert {
            topography.insert(&key[..], value.clone())?;
        }
        metadata.insert(VERSION_KEY, &version[..])?;
        Ok(true)
    });

    match result {
        Ok(changed) => Ok(changed),
        Err(TransactionError::Abort(err)) => Err(err),
        Err(TransactionError::Storage(err)) => Err(err.into()),
    }
}
