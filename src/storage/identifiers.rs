use chrono::{DateTime, Utc};
use redb::{ReadableTable, ReadableTableMetadata, Table, WriteTransaction};

use super::db::{finish, renewal_key, Database, DatabaseError};
use super::models::{stored_precision, Identifier, Lease, PoolCounts};
use super::store::{ClaimOutcome, LeaseStore, ReleaseOutcome, RenewOutcome};
use super::tables::*;

/// Every pool table, opened inside one write transaction.
struct PoolTables<'txn> {
    free: Table<'txn, u64, ()>,
    holders: Table<'txn, &'static str, u64>,
    identifiers: Table<'txn, u64, &'static [u8]>,
    renewals: Table<'txn, (i64, u64), ()>,
    values: Table<'txn, &'static str, u64>,
}

impl<'txn> PoolTables<'txn> {
    fn open(write_txn: &'txn WriteTransaction) -> Result<Self, DatabaseError> {
        Ok(Self {
            free: write_txn.open_table(FREE_IDENTIFIERS)?,
            holders: write_txn.open_table(HOLDERS)?,
            identifiers: write_txn.open_table(IDENTIFIERS)?,
            renewals: write_txn.open_table(RENEWALS)?,
            values: write_txn.open_table(IDENTIFIER_VALUES)?,
        })
    }

    fn load(&self, seq: u64) -> Result<Identifier, DatabaseError> {
        load_record(&self.identifiers, seq)?
            .ok_or_else(|| DatabaseError::Inconsistent(format!("missing identifier #{seq}")))
    }

    fn put(&mut self, seq: u64, record: &Identifier) -> Result<(), DatabaseError> {
        debug_assert_eq!(
            record.holder.is_some(),
            record.last_renewed_at.is_some(),
            "holder and last_renewed_at must be set together"
        );
        let data = rmp_serde::to_vec_named(record)?;
        self.identifiers.insert(seq, data.as_slice())?;
        Ok(())
    }

    fn seq_of(&self, value: &str) -> Result<Option<u64>, DatabaseError> {
        Ok(self.values.get(value)?.map(|v| v.value()))
    }

    /// Clear the lease on `record` and return the identifier to the free list.
    fn clear_lease(
        &mut self,
        seq: u64,
        mut record: Identifier,
    ) -> Result<Option<Lease>, DatabaseError> {
        let Some(lease) = record.lease() else {
            return Ok(None);
        };

        self.holders.remove(lease.holder.as_str())?;
        self.renewals.remove(renewal_key(&lease.last_renewed_at, seq))?;
        self.free.insert(seq, ())?;

        record.holder = None;
        record.last_renewed_at = None;
        self.put(seq, &record)?;

        Ok(Some(lease))
    }
}

fn load_record<T>(table: &T, seq: u64) -> Result<Option<Identifier>, DatabaseError>
where
    T: ReadableTable<u64, &'static [u8]>,
{
    match table.get(seq)? {
        Some(data) => Ok(Some(rmp_serde::from_slice(data.value())?)),
        None => Ok(None),
    }
}

/// Upper bound of the stale prefix of the renewal index.
///
/// Stored renewals are whole microseconds, so `m < threshold` holds exactly
/// when `m` is below the threshold rounded up to the next microsecond.
/// Sequences start at 1, so `(t, 0)` sorts before every entry renewed at `t`.
fn threshold_key(threshold: &DateTime<Utc>) -> (i64, u64) {
    let (micros, _) = renewal_key(threshold, 0);
    if threshold.timestamp_subsec_nanos() % 1_000 == 0 {
        (micros, 0)
    } else {
        (micros.saturating_add(1), 0)
    }
}

impl LeaseStore for Database {
    fn seed(&self, values: &[String]) -> Result<usize, DatabaseError> {
        let write_txn = self.begin_write()?;
        let mut inserted = 0;
        {
            let mut tables = PoolTables::open(&write_txn)?;
            let mut next_seq = match tables.identifiers.last()? {
                Some((key, _)) => key.value() + 1,
                None => 1,
            };

            for value in values {
                if tables.seq_of(value)?.is_some() {
                    continue;
                }
                tables.put(next_seq, &Identifier::free(value.as_str()))?;
                tables.values.insert(value.as_str(), next_seq)?;
                tables.free.insert(next_seq, ())?;
                next_seq += 1;
                inserted += 1;
            }
        }
        finish(write_txn, inserted > 0)?;
        Ok(inserted)
    }

    fn find_by_holder(&self, holder: &str) -> Result<Option<Identifier>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let holders = read_txn.open_table(HOLDERS)?;

        let seq = match holders.get(holder)? {
            Some(seq) => seq.value(),
            None => return Ok(None),
        };

        let identifiers = read_txn.open_table(IDENTIFIERS)?;
        load_record(&identifiers, seq)
    }

    fn find_by_value(&self, value: &str) -> Result<Option<Identifier>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let values = read_txn.open_table(IDENTIFIER_VALUES)?;

        let seq = match values.get(value)? {
            Some(seq) => seq.value(),
            None => return Ok(None),
        };

        let identifiers = read_txn.open_table(IDENTIFIERS)?;
        load_record(&identifiers, seq)
    }

    fn try_claim_any_free(
        &self,
        holder: &str,
        now: DateTime<Utc>,
    ) -> Result<ClaimOutcome, DatabaseError> {
        let now = stored_precision(now);
        let write_txn = self.begin_write()?;
        let outcome = {
            let mut tables = PoolTables::open(&write_txn)?;
            let existing = tables.holders.get(holder)?.map(|seq| seq.value());

            if let Some(seq) = existing {
                ClaimOutcome::Existing(tables.load(seq)?)
            } else {
                let next_free = tables.free.pop_first()?.map(|(seq, _)| seq.value());
                match next_free {
                    Some(seq) => {
                        let mut record = tables.load(seq)?;
                        record.holder = Some(holder.to_string());
                        record.last_renewed_at = Some(now);
                        tables.put(seq, &record)?;
                        tables.holders.insert(holder, seq)?;
                        tables.renewals.insert(renewal_key(&now, seq), ())?;
                        ClaimOutcome::Claimed(record)
                    }
                    None => ClaimOutcome::Exhausted,
                }
            }
        };
        finish(write_txn, matches!(outcome, ClaimOutcome::Claimed(_)))?;
        Ok(outcome)
    }

    fn renew(
        &self,
        value: &str,
        holder: &str,
        now: DateTime<Utc>,
    ) -> Result<RenewOutcome, DatabaseError> {
        let now = stored_precision(now);
        let write_txn = self.begin_write()?;
        let outcome = {
            let mut tables = PoolTables::open(&write_txn)?;

            match tables.seq_of(value)? {
                None => RenewOutcome::NotFound,
                Some(seq) => {
                    let mut record = tables.load(seq)?;
                    if record.holder.as_deref() == Some(holder) {
                        if let Some(previous) = record.last_renewed_at {
                            tables.renewals.remove(renewal_key(&previous, seq))?;
                        }
                        record.last_renewed_at = Some(now);
                        tables.put(seq, &record)?;
                        tables.renewals.insert(renewal_key(&now, seq), ())?;
                        RenewOutcome::Renewed(record)
                    } else {
                        RenewOutcome::OwnerMismatch(record.holder)
                    }
                }
            }
        };
        finish(write_txn, matches!(outcome, RenewOutcome::Renewed(_)))?;
        Ok(outcome)
    }

    fn release(&self, value: &str, holder: &str) -> Result<ReleaseOutcome, DatabaseError> {
        let write_txn = self.begin_write()?;
        let outcome = {
            let mut tables = PoolTables::open(&write_txn)?;

            match tables.seq_of(value)? {
                None => ReleaseOutcome::NoOp,
                Some(seq) => {
                    let record = tables.load(seq)?;
                    if record.holder.as_deref() == Some(holder) {
                        tables.clear_lease(seq, record)?;
                        ReleaseOutcome::Released
                    } else {
                        ReleaseOutcome::NoOp
                    }
                }
            }
        };
        finish(write_txn, outcome == ReleaseOutcome::Released)?;
        Ok(outcome)
    }

    fn reclaim_expired(&self, threshold: DateTime<Utc>) -> Result<Vec<Lease>, DatabaseError> {
        let write_txn = self.begin_write()?;
        let mut reclaimed = Vec::new();
        {
            let mut tables = PoolTables::open(&write_txn)?;

            // The renewal index is ordered by timestamp, so everything stale is a prefix.
            let expired: Vec<u64> = tables
                .renewals
                .range(..threshold_key(&threshold))?
                .map(|entry| entry.map(|(key, _)| key.value().1))
                .collect::<Result<Vec<_>, _>>()?;

            for seq in expired {
                let record = tables.load(seq)?;
                if let Some(lease) = tables.clear_lease(seq, record)? {
                    reclaimed.push(lease);
                }
            }
        }
        finish(write_txn, !reclaimed.is_empty())?;
        Ok(reclaimed)
    }

    fn list_all(&self) -> Result<Vec<Identifier>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(IDENTIFIERS)?;

        let mut identifiers = Vec::new();
        for result in table.iter()? {
            let (_, value) = result?;
            let identifier: Identifier = rmp_serde::from_slice(value.value())?;
            identifiers.push(identifier);
        }

        Ok(identifiers)
    }

    fn counts(&self, threshold: DateTime<Utc>) -> Result<PoolCounts, DatabaseError> {
        let read_txn = self.begin_read()?;
        let total = read_txn.open_table(IDENTIFIERS)?.len()?;
        let free = read_txn.open_table(FREE_IDENTIFIERS)?.len()?;

        let renewals = read_txn.open_table(RENEWALS)?;
        let mut stale = 0;
        for entry in renewals.range(..threshold_key(&threshold))? {
            entry?;
            stale += 1;
        }

        Ok(PoolCounts {
            free,
            leased: total - free,
            stale,
            total,
        })
    }
}
