use std::collections::VecDeque;
use std::ops::Bound;

use sled::{IVec, Tree};

use crate::error::RegionError;
use crate::region::{RegionFile, RegionTables};

/// Keys fetched per trip to the tables.
pub(crate) const SCAN_BATCH: usize = 128;

/// Walks the keys of one table in order, a batch at a time.
///
/// No storage handle is held between batches: every batch goes through
/// [`RegionFile::with_tables`], so a closed region fails the next fetch with
/// [`RegionError::AlreadyClosed`] and doesn't stay locked by a forgotten
/// iterator.
pub(crate) struct KeyScan<'a> {
    region: &'a RegionFile,
    table: fn(&RegionTables) -> &Tree,
    prefix: Vec<u8>,
    last: Option<IVec>,
    pending: VecDeque<IVec>,
    exhausted: bool,
}

impl<'a> KeyScan<'a> {
    pub(crate) fn new(
        region: &'a RegionFile,
        table: fn(&RegionTables) -> &Tree,
        prefix: &[u8],
    ) -> Self {
        Self {
            region,
            table,
            prefix: prefix.to_vec(),
            last: None,
            pending: VecDeque::new(),
            exhausted: false,
        }
    }

    fn fetch(&mut self) -> Result<(), RegionError> {
        let start = match &self.last {
            Some(last) => Bound::Excluded(last.clone()),
            None if self.prefix.is_empty() => Bound::Unbounded,
            None => Bound::Included(IVec::from(self.prefix.as_slice())),
        };

        let (batch, exhausted) = self.region.with_tables(|tables| {
            let mut batch = Vec::with_capacity(SCAN_BATCH);
            for key in (self.table)(tables).range((start, Bound::Unbounded)).keys() {
                let key = key?;
                if !key.starts_with(&self.prefix) {
                    return Ok((batch, true));
                }
                batch.push(key);
                if batch.len() == SCAN_BATCH {
                    return Ok((batch, false));
                }
            }
            Ok((batch, true))
        })?;

        self.exhausted = exhausted;
        self.last = batch.last().cloned().or(self.last.take());
        self.pending.extend(batch);
        Ok(())
    }
}

impl Iterator for KeyScan<'_> {
    type Item = Result<IVec, RegionError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pending.is_empty() && !self.exhausted {
            if let Err(err) = self.fetch() {
                // Report once, then stop
                self.exhausted = true;
                return Some(Err(err));
            }
        }
        self.pending.pop_front().map(Ok)
    }
}
