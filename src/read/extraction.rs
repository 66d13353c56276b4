//! Folder decoding and per-entry extraction.
//!
//! Folders are always decoded whole; an entry's bytes are a slice of its
//! folder's output. When a folder fails part way, the output produced up to
//! the failure is kept and entries that lie fully inside it and carry a
//! matching CRC still succeed.

use std::io::{Read, Seek, SeekFrom};
use std::ops::Range;

use crate::checksum::verify_crc32;
use crate::codec::pipeline::decode_folder_into;
use crate::format::SIGNATURE_HEADER_SIZE;
use crate::progress::{NoProgress, ProgressReporter};
use crate::{Error, ErrorKind, Result};

use super::{Archive, Entry, ItemOutcome};

/// Classifies the files of a folder after a (possibly failed) decode.
pub(crate) fn classify_folder_files(
    entries: &[Entry],
    ranges: &[(usize, Range<u64>)],
    produced: u64,
    folder_error: Option<&Error>,
) -> Vec<(usize, ItemOutcome)> {
    ranges
        .iter()
        .map(|(index, range)| {
            let entry = &entries[*index];
            let complete = range.end <= produced;
            let outcome = match (folder_error, complete) {
                (Some(Error::CrcMismatch { .. }), true) if entry.crc32.is_none() => {
                    ItemOutcome::CrcError
                }
                (Some(err), false) => ItemOutcome::from_error(err),
                (Some(err), true) if entry.crc32.is_none() => ItemOutcome::from_error(err),
                _ => ItemOutcome::Ok,
            };
            (*index, outcome)
        })
        .collect()
}

/// Checks a complete entry slice against its stored CRC.
pub(crate) fn verify_entry(entry: &Entry, data: &[u8], outcome: ItemOutcome) -> ItemOutcome {
    if outcome.is_ok() && !verify_crc32(data, entry.crc32).is_ok() {
        ItemOutcome::CrcError
    } else {
        outcome
    }
}

/// Clamps a folder-relative range to the produced output.
pub(crate) fn produced_slice<'a>(out: &'a [u8], range: &Range<u64>) -> &'a [u8] {
    let len = out.len() as u64;
    &out[range.start.min(len) as usize..range.end.min(len) as usize]
}

impl<R: Read + Seek> Archive<R> {
    /// Absolute byte range of a folder's packed data.
    fn folder_pack_range(&self, folder: usize) -> Range<u64> {
        let base = self.report.archive_offset + SIGNATURE_HEADER_SIZE;
        let range = self.db.folders().folder_data_range(folder);
        base + range.start..base + range.end
    }

    /// Reads the packed bytes of `folder` into memory.
    pub(crate) fn read_folder_packed(&mut self, folder: usize) -> Result<Vec<u8>> {
        let range = self.folder_pack_range(folder);
        let len = range.end - range.start;
        if len > self.options.limits.max_pack_read {
            return Err(Error::ResourceLimitExceeded(format!(
                "folder {folder} packs {len} bytes"
            )));
        }
        let mut packed = vec![0u8; len as usize];
        self.reader.seek(SeekFrom::Start(range.start))?;
        self.reader.read_exact(&mut packed)?;
        Ok(packed)
    }

    pub(crate) fn check_folder_index(&self, folder: usize) -> Result<()> {
        if folder >= self.db.num_folders() {
            return Err(Error::InvalidFormat(format!(
                "folder index {folder} out of range"
            )));
        }
        let size = self.db.folders().folder_unpack_size(folder);
        if size > self.options.limits.max_folder_unpack {
            return Err(Error::ResourceLimitExceeded(format!(
                "folder {folder} unpacks to {size} bytes"
            )));
        }
        Ok(())
    }

    /// Decodes `folder` into `out`, leaving partial output on failure.
    fn decode_folder_partial(
        &mut self,
        folder: usize,
        progress: &mut dyn ProgressReporter,
        out: &mut Vec<u8>,
    ) -> Result<()> {
        self.check_folder_index(folder)?;
        let table = self.db.folders();
        progress.on_folder_start(folder, table.folder_unpack_size(folder));
        let graph = table.parse_folder(folder)?;
        let pack_sizes = table.folder_pack_sizes(folder);
        let expected_crc = table.folder_crcs[folder];
        let coder_sizes = table.coder_sizes(folder).to_vec();

        let packed = self.read_folder_packed(folder)?;
        decode_folder_into(
            &graph,
            &coder_sizes,
            &packed,
            &pack_sizes,
            expected_crc,
            &self.options.pipeline,
            progress,
            out,
        )
    }

    /// Decodes a whole folder and returns its output.
    pub fn decode_folder(&mut self, folder: usize) -> Result<Vec<u8>> {
        self.decode_folder_with_progress(folder, &mut NoProgress)
    }

    /// Decodes a whole folder, reporting progress.
    pub fn decode_folder_with_progress(
        &mut self,
        folder: usize,
        progress: &mut dyn ProgressReporter,
    ) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.decode_folder_partial(folder, progress, &mut out)?;
        Ok(out)
    }

    /// Reads the data of one entry.
    ///
    /// Directories and empty files yield an empty vector. The whole folder
    /// holding the entry is decoded. A folder failure is returned only when
    /// it affects this entry: a complete slice with a matching CRC succeeds.
    pub fn read_entry(&mut self, index: usize) -> Result<Vec<u8>> {
        let entry = self
            .entries
            .get(index)
            .ok_or_else(|| Error::InvalidFormat(format!("entry index {index} out of range")))?
            .clone();
        let Some(folder) = entry.folder_index else {
            return Ok(Vec::new());
        };
        let range = self
            .db
            .folder_file_ranges(folder)
            .into_iter()
            .find(|(i, _)| *i == index)
            .map(|(_, r)| r)
            .ok_or(Error::Internal("entry missing from its folder"))?;

        let mut out = Vec::new();
        let result = self.decode_folder_partial(folder, &mut NoProgress, &mut out);
        let produced = out.len() as u64;
        let outcome = classify_folder_files(
            &self.entries,
            &[(index, range.clone())],
            produced,
            result.as_ref().err(),
        )
        .pop()
        .map_or(ItemOutcome::Ok, |(_, outcome)| outcome);
        if !outcome.is_ok() {
            result?;
        }

        let data = produced_slice(&out, &range).to_vec();
        if data.len() as u64 != entry.size {
            return Err(Error::EndOfData {
                context: "entry data",
            });
        }
        verify_crc32(&data, entry.crc32).into_result(Some(index), Some(&entry.path))?;
        Ok(data)
    }

    /// Decodes every entry and hands it to `f` with its outcome.
    ///
    /// Entries without data come first with empty slices, then folder by
    /// folder. For failed entries the slice holds whatever was produced.
    /// An error returned by `f` stops the walk; a cancelled folder stops it
    /// with [`Error::Cancelled`] after its entries were reported.
    pub fn extract_with<F>(&mut self, f: F) -> Result<()>
    where
        F: FnMut(&Entry, &[u8], ItemOutcome) -> Result<()>,
    {
        self.extract_with_progress(&mut NoProgress, f)
    }

    /// Like [`extract_with`](Self::extract_with), reporting progress.
    pub fn extract_with_progress<F>(
        &mut self,
        progress: &mut dyn ProgressReporter,
        mut f: F,
    ) -> Result<()>
    where
        F: FnMut(&Entry, &[u8], ItemOutcome) -> Result<()>,
    {
        progress.on_total(self.db.total_unpack_size());
        for entry in self.entries.iter().filter(|e| e.folder_index.is_none()) {
            f(entry, &[], ItemOutcome::Ok)?;
        }

        for folder in 0..self.db.num_folders() {
            let ranges = self.db.folder_file_ranges(folder);
            if ranges.is_empty() {
                continue;
            }
            let mut out = Vec::new();
            let result = self.decode_folder_partial(folder, progress, &mut out);
            if let Err(err) = &result {
                log::warn!("folder {folder} failed: {err}");
            }
            let cancelled = matches!(&result, Err(e) if e.kind() == ErrorKind::Cancelled);
            let outcomes =
                classify_folder_files(&self.entries, &ranges, out.len() as u64, result.as_ref().err());
            for ((index, outcome), (_, range)) in outcomes.into_iter().zip(&ranges) {
                let entry = &self.entries[index];
                let data = produced_slice(&out, range);
                let outcome = if range.end <= out.len() as u64 {
                    verify_entry(entry, data, outcome)
                } else {
                    outcome
                };
                f(entry, data, outcome)?;
            }
            if cancelled {
                return Err(Error::Cancelled);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::Crc32;

    fn entry(index: usize, crc: Option<u32>) -> Entry {
        let file = crate::format::files::FileEntry {
            name: format!("f{index}"),
            size: 4,
            crc,
            has_stream: true,
            ..Default::default()
        };
        Entry::from_file(index, &file, Some(0))
    }

    #[test]
    fn test_classify_partial_output() {
        let entries = vec![entry(0, Some(1)), entry(1, None), entry(2, Some(3))];
        let ranges = vec![(0, 0..4), (1, 4..8), (2, 8..12)];
        let err = Error::DataError("broken".into());
        let outcomes = classify_folder_files(&entries, &ranges, 9, Some(&err));
        assert_eq!(
            outcomes,
            vec![
                (0, ItemOutcome::Ok),
                (1, ItemOutcome::DataError),
                (2, ItemOutcome::DataError),
            ]
        );
    }

    #[test]
    fn test_classify_folder_crc_error() {
        let entries = vec![entry(0, None), entry(1, Some(5))];
        let ranges = vec![(0, 0..4), (1, 4..8)];
        let err = Error::crc_mismatch(None, None, 1, 2);
        let outcomes = classify_folder_files(&entries, &ranges, 8, Some(&err));
        assert_eq!(outcomes, vec![(0, ItemOutcome::CrcError), (1, ItemOutcome::Ok)]);
    }

    #[test]
    fn test_verify_entry_crc() {
        let data = b"abcd";
        let good = entry(0, Some(Crc32::compute(data)));
        assert_eq!(verify_entry(&good, data, ItemOutcome::Ok), ItemOutcome::Ok);
        let bad = entry(0, Some(0));
        assert_eq!(verify_entry(&bad, data, ItemOutcome::Ok), ItemOutcome::CrcError);
        assert_eq!(
            verify_entry(&bad, data, ItemOutcome::DataError),
            ItemOutcome::DataError
        );
    }

    #[test]
    fn test_produced_slice_clamps() {
        let out = [1u8, 2, 3];
        assert_eq!(produced_slice(&out, &(1..10)), &[2, 3]);
        assert!(produced_slice(&out, &(5..9)).is_empty());
    }
}
