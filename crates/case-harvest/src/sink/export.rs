//! Flat-file export of a full record.

use crate::error::Result;
use crate::types::CaseRecord;
use std::path::Path;

/// Write `record` as a two-line CSV: field names, then values.
///
/// Every field is exported in insertion order, including the ones the
/// persisted schema drops.
pub fn write_csv(record: &CaseRecord, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(record.keys())?;
    writer.write_record(record.iter().map(|(_, v)| v))?;
    writer.flush()?;
    Ok(())
}
