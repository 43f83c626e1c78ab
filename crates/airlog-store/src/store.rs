//! Record reconciliation and persistence.

use std::collections::btree_map::Entry as MapEntry;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

use time::{OffsetDateTime, UtcOffset};
use tracing::{debug, info, warn};

use airlog_types::{DeviceId, MeasurementRecord, RecordSink};

use crate::codec;
use crate::error::{Error, Result};
use crate::ledger;
use crate::models::{ImportReport, RecordStats};
use crate::queries::RecordQuery;

/// A record and the insert that wrote it.
#[derive(Debug, Clone, Copy)]
struct Slot {
    seq: u64,
    record: MeasurementRecord,
}

/// Slots keyed by unix second.
type Partition = BTreeMap<i64, Slot>;

const SYNC_LOG_PREFIX: &str = "sync-";
const UNATTRIBUTED_LABEL: &str = "unattributed";

/// Deduplicated record set persisted as one canonical CSV file.
///
/// Every record is floored to the whole second on the way in and at most one
/// record exists per second, both globally and within each device partition.
/// Records inserted without a device land in an unattributed partition so
/// that recomputing the global set never loses them.
///
/// Each insert is numbered. Where partitions share a second, the global set
/// shows the record from the most recent insert.
///
/// The canonical file is rewritten in full after every mutation, together
/// with a ledger holding every partition entry. A failed write is logged and
/// the in-memory state stays authoritative.
pub struct ReconciliationStore {
    path: PathBuf,
    records: Vec<MeasurementRecord>,
    unattributed: Partition,
    partitions: BTreeMap<DeviceId, Partition>,
    next_seq: u64,
}

impl ReconciliationStore {
    /// Open or create a store backed by the CSV file at `path`.
    ///
    /// Partitions are restored from the ledger beside the file. Seconds of
    /// the canonical file the ledger does not cover are loaded as
    /// unattributed records older than any ledger entry.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| Error::CreateDirectory {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        info!("Opening record store at {}", path.display());
        let mut store = Self {
            path,
            records: Vec::new(),
            unattributed: Partition::new(),
            partitions: BTreeMap::new(),
            next_seq: 1,
        };

        let text = match std::fs::read_to_string(&store.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(store),
            Err(e) => return Err(e.into()),
        };

        match ledger::read(&store.ledger_path()) {
            Ok(Some(entries)) => store.restore(entries),
            Ok(None) => {}
            Err(e) => warn!("Ignoring unreadable ledger for {}: {}", store.path.display(), e),
        }

        let parsed = codec::parse_with_offset(&text, UtcOffset::UTC);
        if parsed.errors + parsed.warnings > 0 {
            warn!(
                errors = parsed.errors,
                warnings = parsed.warnings,
                "Skipped unreadable rows in {}",
                store.path.display()
            );
        }
        let covered = store.covered_seconds();
        for record in parsed.records {
            let record = record.normalized();
            let key = record.second_key();
            if !covered.contains(&key) {
                store.unattributed.insert(key, Slot { seq: 0, record });
            }
        }

        store.recompute();
        debug!(
            records = store.records.len(),
            devices = store.partitions.len(),
            "Loaded store"
        );
        Ok(store)
    }

    /// Open the store at the default platform location.
    pub fn open_default() -> Result<Self> {
        Self::open(crate::default_store_path())
    }

    /// Path of the canonical CSV file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ledger_path(&self) -> PathBuf {
        ledger::path_for(&self.path)
    }

    fn directory(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    fn restore(&mut self, entries: Vec<ledger::LedgerEntry>) {
        for entry in entries {
            self.next_seq = self.next_seq.max(entry.seq + 1);
            let record = entry.record.normalized();
            let slot = Slot {
                seq: entry.seq,
                record,
            };
            let partition = match entry.device {
                Some(device) => self.partitions.entry(device).or_default(),
                None => &mut self.unattributed,
            };
            partition.insert(record.second_key(), slot);
        }
    }

    fn covered_seconds(&self) -> HashSet<i64> {
        std::iter::once(&self.unattributed)
            .chain(self.partitions.values())
            .flat_map(|p| p.keys().copied())
            .collect()
    }

    fn persist(&self) {
        if let Err(e) = codec::export(&self.records, &self.path) {
            warn!("Failed to write {}: {}", self.path.display(), e);
        }

        let entries = self
            .unattributed
            .values()
            .map(|slot| (None, slot))
            .chain(
                self.partitions
                    .iter()
                    .flat_map(|(device, p)| p.values().map(move |slot| (Some(device), slot))),
            )
            .map(|(device, slot)| (device, slot.seq, &slot.record));
        let ledger_path = self.ledger_path();
        if let Err(e) = ledger::write(&ledger_path, entries) {
            warn!("Failed to write {}: {}", ledger_path.display(), e);
        }
    }

    /// Rebuild the global set as the union of all partitions.
    ///
    /// On a shared second the slot with the highest insert number wins.
    fn recompute(&mut self) {
        let mut merged: BTreeMap<i64, Slot> = BTreeMap::new();
        for partition in std::iter::once(&self.unattributed).chain(self.partitions.values()) {
            for (key, slot) in partition {
                match merged.entry(*key) {
                    MapEntry::Vacant(vacant) => {
                        vacant.insert(*slot);
                    }
                    MapEntry::Occupied(mut occupied) => {
                        if slot.seq > occupied.get().seq {
                            occupied.insert(*slot);
                        }
                    }
                }
            }
        }
        self.records = merged.into_values().map(|slot| slot.record).collect();
    }
}

// --- mutation ---

impl ReconciliationStore {
    /// Merge records into the store, returning how many new seconds were added.
    ///
    /// A record whose second is already present replaces the existing one,
    /// including earlier records of the same call.
    pub fn insert(&mut self, records: &[MeasurementRecord], device: Option<&DeviceId>) -> usize {
        if records.is_empty() {
            return 0;
        }

        let seq = self.next_seq;
        self.next_seq += 1;

        let present: HashSet<i64> = self.records.iter().map(MeasurementRecord::second_key).collect();
        let partition = match device {
            Some(device) => self.partitions.entry(device.clone()).or_default(),
            None => &mut self.unattributed,
        };
        let mut seconds = BTreeSet::new();
        for record in records {
            let record = record.normalized();
            let key = record.second_key();
            partition.insert(key, Slot { seq, record });
            seconds.insert(key);
        }
        let added = seconds.iter().filter(|k| !present.contains(k)).count();

        self.recompute();
        debug!(
            device = device.map(DeviceId::as_str),
            received = records.len(),
            added,
            seq,
            "Merged records"
        );
        self.persist();
        added
    }

    /// Delete records inside `range` from one device, or from every partition
    /// when `device` is `None`. Returns how many records left the global set.
    pub fn delete_records(
        &mut self,
        range: RangeInclusive<OffsetDateTime>,
        device: Option<&DeviceId>,
    ) -> Result<usize> {
        let (start, end) = (*range.start(), *range.end());
        if start > end {
            return Err(Error::InvalidRange { start, end });
        }

        let outside = |_: &i64, slot: &mut Slot| !range.contains(&slot.record.timestamp);
        match device {
            Some(device) => {
                if let Some(partition) = self.partitions.get_mut(device) {
                    partition.retain(outside);
                }
            }
            None => {
                self.unattributed.retain(outside);
                for partition in self.partitions.values_mut() {
                    partition.retain(outside);
                }
            }
        }
        self.partitions.retain(|_, partition| !partition.is_empty());

        let before = self.records.len();
        self.recompute();
        self.persist();
        let removed = before.saturating_sub(self.records.len());
        info!("Deleted {} records between {} and {}", removed, start, end);
        Ok(removed)
    }

    /// Drop one device's partition. Returns how many records left the global set.
    pub fn remove_all(&mut self, device: &DeviceId) -> usize {
        let before = self.records.len();
        if self.partitions.remove(device).is_some() {
            self.recompute();
        }
        self.persist();
        let removed = before.saturating_sub(self.records.len());
        info!("Removed device {} ({} records)", device, removed);
        removed
    }

    /// Clear everything, deleting the canonical file, its ledger and every
    /// sync log.
    pub fn delete_all_records(&mut self) -> Result<()> {
        self.records.clear();
        self.unattributed.clear();
        self.partitions.clear();

        for path in self.sync_logs()? {
            std::fs::remove_file(&path)?;
        }
        for path in [self.ledger_path(), self.path.clone()] {
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        info!("Deleted all records in {}", self.directory().display());
        Ok(())
    }
}

// --- reads ---

impl ReconciliationStore {
    /// The global record set, oldest first.
    #[must_use]
    pub fn records(&self) -> &[MeasurementRecord] {
        &self.records
    }

    /// Records attributed to one device, oldest first.
    #[must_use]
    pub fn records_for(&self, device: &DeviceId) -> Vec<MeasurementRecord> {
        self.partitions
            .get(device)
            .map(|p| p.values().map(|slot| slot.record).collect())
            .unwrap_or_default()
    }

    /// Records inside an inclusive time range.
    #[must_use]
    pub fn records_in(
        &self,
        range: RangeInclusive<OffsetDateTime>,
        device: Option<&DeviceId>,
    ) -> Vec<MeasurementRecord> {
        let query = RecordQuery {
            device: device.cloned(),
            since: Some(*range.start()),
            until: Some(*range.end()),
            ..RecordQuery::default()
        };
        self.query(&query)
    }

    /// Run a query against the global set or one device partition.
    #[must_use]
    pub fn query(&self, query: &RecordQuery) -> Vec<MeasurementRecord> {
        let base = match &query.device {
            Some(device) => self.records_for(device),
            None => self.records.clone(),
        };
        query.apply(base)
    }

    /// Number of records in the global set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when the global set holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Devices that have a partition.
    #[must_use]
    pub fn devices(&self) -> impl Iterator<Item = &DeviceId> + '_ {
        self.partitions.keys()
    }

    /// Summary of the global set or one device.
    #[must_use]
    pub fn stats(&self, device: Option<&DeviceId>) -> Option<RecordStats> {
        match device {
            Some(device) => {
                RecordStats::compute(self.partitions.get(device)?.values().map(|slot| &slot.record))
            }
            None => RecordStats::compute(&self.records),
        }
    }
}

// --- import / export ---

impl ReconciliationStore {
    /// Parse CSV text and merge the records that survived.
    pub fn import_text(&mut self, text: &str, device: Option<&DeviceId>) -> ImportReport {
        let parsed = codec::parse(text);
        let imported = parsed.records.len();
        self.insert(&parsed.records, device);

        info!(
            imported,
            errors = parsed.errors,
            warnings = parsed.warnings,
            "Imported CSV"
        );
        ImportReport {
            imported,
            errors: parsed.errors,
            warnings: parsed.warnings,
            issues: parsed.issues,
        }
    }

    /// Read and import a CSV file.
    pub fn import_file<P: AsRef<Path>>(
        &mut self,
        path: P,
        device: Option<&DeviceId>,
    ) -> Result<ImportReport> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Ok(self.import_text(&text, device))
    }

    /// Export the global set or one device in the canonical format.
    pub fn export_to<P: AsRef<Path>>(&self, path: P, device: Option<&DeviceId>) -> Result<usize> {
        let records = match device {
            Some(device) => self.records_for(device),
            None => self.records.clone(),
        };
        codec::export(&records, path.as_ref())?;
        Ok(records.len())
    }

    /// Write the records of one completed backfill to a sync log beside the
    /// canonical file.
    pub fn archive(
        &self,
        device: Option<&DeviceId>,
        records: &[MeasurementRecord],
    ) -> Result<PathBuf> {
        let label = device.map_or_else(|| UNATTRIBUTED_LABEL.to_string(), |d| sanitize(d.as_str()));
        let stamp = OffsetDateTime::now_utc().unix_timestamp();

        let dir = self.directory();
        let mut path = dir.join(format!("{SYNC_LOG_PREFIX}{label}-{stamp}.csv"));
        let mut suffix = 1;
        while path.exists() {
            path = dir.join(format!("{SYNC_LOG_PREFIX}{label}-{stamp}-{suffix}.csv"));
            suffix += 1;
        }

        let normalized: Vec<_> = records.iter().map(MeasurementRecord::normalized).collect();
        codec::export(&normalized, &path)?;
        info!("Archived {} records to {}", records.len(), path.display());
        Ok(path)
    }

    /// Sync log files beside the canonical file, sorted by name.
    pub fn sync_logs(&self) -> Result<Vec<PathBuf>> {
        let entries = match std::fs::read_dir(self.directory()) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut logs = Vec::new();
        for entry in entries {
            let path = entry?.path();
            let is_log = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(SYNC_LOG_PREFIX) && n.ends_with(".csv"));
            if is_log && path.is_file() {
                logs.push(path);
            }
        }
        logs.sort();
        Ok(logs)
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

impl RecordSink for ReconciliationStore {
    fn insert(&mut self, records: &[MeasurementRecord], device: Option<&DeviceId>) {
        ReconciliationStore::insert(self, records, device);
    }

    fn archive_backfill(&mut self, device: Option<&DeviceId>, records: &[MeasurementRecord]) {
        if records.is_empty() {
            return;
        }
        if let Err(e) = self.archive(device, records) {
            warn!("Failed to archive backfill: {}", e);
        }
    }
}
