//! Folder execution: wiring coders along the bond graph.
//!
//! Decoding pulls from the main coder. Each coder input is either a pack
//! stream (a slice of the folder's packed bytes) or the output of the coder
//! bonded to it, built recursively, so every coder is instantiated once per
//! decode. Encoding walks the same graph from the main coder outward.

use std::io::{Cursor, Read, Write};

use super::bcj2::{self, Bcj2Decoder, Bcj2EncoderOptions, Bcj2Options};
use super::{build_decoder, encode_all, method};
use crate::checksum::Crc32Writer;
use crate::error::map_io_error;
use crate::format::folder::{Bond, CoderInfo, Folder};
use crate::progress::{BYTES_MIB, ProgressReporter};
use crate::{Error, READ_BUFFER_SIZE, Result};

/// Options for running folders through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Buffer sizes of BCJ2 decoders.
    pub bcj2: Bcj2Options,
    /// Minimum number of output bytes between progress callbacks.
    pub progress_interval: u64,
    /// Check folder CRCs after decoding.
    pub verify_crc: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            bcj2: Bcj2Options::default(),
            progress_interval: BYTES_MIB,
            verify_crc: true,
        }
    }
}

impl PipelineOptions {
    /// Creates default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the BCJ2 buffer sizes.
    pub fn bcj2(mut self, bcj2: Bcj2Options) -> Self {
        self.bcj2 = bcj2;
        self
    }

    /// Sets the progress interval in bytes.
    pub fn progress_interval(mut self, bytes: u64) -> Self {
        self.progress_interval = bytes.max(1);
        self
    }

    /// Enables or disables folder CRC checks.
    pub fn verify_crc(mut self, verify: bool) -> Self {
        self.verify_crc = verify;
        self
    }
}

/// Copies a decoder's output into `output`, reporting progress.
///
/// With `out_size` exactly that many bytes must be produced: a short stream
/// is [`Error::EndOfData`], and a further byte after the last one is
/// [`Error::DataError`]. The read that probes for it also lets multi-stream
/// coders run their finish checks. `packed_size` is only reported.
pub fn code(
    input: &mut dyn Read,
    output: &mut dyn Write,
    out_size: Option<u64>,
    packed_size: u64,
    options: &PipelineOptions,
    progress: &mut dyn ProgressReporter,
) -> Result<u64> {
    let interval = options.progress_interval.max(1);
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    let mut produced = 0u64;
    let mut next_report = interval;

    loop {
        let want = match out_size {
            Some(size) if produced >= size => break,
            Some(size) => usize::try_from(size - produced).map_or(buf.len(), |r| r.min(buf.len())),
            None => buf.len(),
        };
        let n = input.read(&mut buf[..want]).map_err(map_io_error)?;
        if n == 0 {
            if out_size.is_some() {
                return Err(Error::EndOfData {
                    context: "coder output",
                });
            }
            break;
        }
        output.write_all(&buf[..n])?;
        produced += n as u64;
        if produced >= next_report {
            if !progress.on_progress(packed_size, produced) {
                return Err(Error::Cancelled);
            }
            next_report = produced + interval;
        }
    }

    if out_size.is_some() {
        let mut extra = [0u8; 1];
        if input.read(&mut extra).map_err(map_io_error)? != 0 {
            return Err(Error::DataError(
                "coder produced more data than declared".into(),
            ));
        }
    }
    if !progress.on_progress(packed_size, produced) {
        return Err(Error::Cancelled);
    }
    Ok(produced)
}

/// Builds coder readers on demand while walking the bond graph.
struct ChainBuilder<'a, 'f> {
    folder: &'f Folder,
    coder_sizes: &'f [u64],
    pack_slices: Vec<&'a [u8]>,
    built: Vec<bool>,
    bcj2: Bcj2Options,
}

impl<'a> ChainBuilder<'a, '_> {
    fn build_coder(&mut self, coder: usize) -> Result<Box<dyn Read + 'a>> {
        if std::mem::replace(&mut self.built[coder], true) {
            return Err(Error::Internal("coder output consumed twice"));
        }
        let info = &self.folder.coders[coder];
        let unpack_size = self.coder_sizes[coder];
        let first = self.folder.coder_first_in_stream(coder);

        let mut inputs = Vec::with_capacity(info.num_streams);
        let mut in_sizes = Vec::with_capacity(info.num_streams);
        for in_index in first..first + info.num_streams {
            let (reader, size) = self.build_input(in_index)?;
            inputs.push(reader);
            in_sizes.push(size);
        }

        if info.method_id == method::BCJ2 {
            let (Ok(inputs), Ok(in_sizes)) = (
                <[Box<dyn Read + 'a>; bcj2::NUM_STREAMS]>::try_from(inputs),
                <[u64; bcj2::NUM_STREAMS]>::try_from(in_sizes),
            ) else {
                return Err(Error::UnsupportedFeature {
                    feature: "BCJ2 coder without exactly four inputs",
                });
            };
            return Ok(Box::new(Bcj2Decoder::new(
                inputs,
                Some(in_sizes),
                unpack_size,
                &self.bcj2,
            )));
        }

        let Some(input) = inputs.pop().filter(|_| info.num_streams == 1) else {
            return Err(Error::UnsupportedMethod {
                method_id: info.method_id,
            });
        };
        Ok(build_decoder(input, info, unpack_size)?)
    }

    fn build_input(&mut self, in_index: usize) -> Result<(Box<dyn Read + 'a>, u64)> {
        if let Some(bond) = self.folder.bond_for_in_stream(in_index) {
            let size = self.coder_sizes[bond.coder_index];
            let reader = self.build_coder(bond.coder_index)?;
            return Ok((reader, size));
        }
        match self.folder.pack_position_of(in_index) {
            Some(position) => {
                let slice = self.pack_slices[position];
                Ok((Box::new(Cursor::new(slice)), slice.len() as u64))
            }
            None => Err(Error::Internal("input stream is neither bonded nor packed")),
        }
    }
}

/// Decodes one folder into `out`.
///
/// `packed` holds the folder's pack streams back to back with the sizes in
/// `pack_sizes`; `coder_sizes` are the unpack sizes of the folder's coders.
/// On error `out` keeps whatever was produced before the failure. A defined
/// `expected_crc` that does not match is [`Error::CrcMismatch`].
#[allow(clippy::too_many_arguments)]
pub fn decode_folder_into(
    folder: &Folder,
    coder_sizes: &[u64],
    packed: &[u8],
    pack_sizes: &[u64],
    expected_crc: Option<u32>,
    options: &PipelineOptions,
    progress: &mut dyn ProgressReporter,
    out: &mut Vec<u8>,
) -> Result<()> {
    if coder_sizes.len() != folder.coders.len() || pack_sizes.len() != folder.pack_streams.len() {
        return Err(Error::Internal("folder sizes do not match its graph"));
    }

    let mut pack_slices = Vec::with_capacity(pack_sizes.len());
    let mut rest = packed;
    for &size in pack_sizes {
        let size = usize::try_from(size).map_err(|_| Error::EndOfData {
            context: "pack stream",
        })?;
        if size > rest.len() {
            return Err(Error::EndOfData {
                context: "pack stream",
            });
        }
        let (head, tail) = rest.split_at(size);
        pack_slices.push(head);
        rest = tail;
    }
    let packed_size = (packed.len() - rest.len()) as u64;

    let main = folder.main_coder();
    let unpack_size = coder_sizes[main];
    let mut builder = ChainBuilder {
        folder,
        coder_sizes,
        pack_slices,
        built: vec![false; folder.coders.len()],
        bcj2: options.bcj2,
    };
    let mut reader = builder.build_coder(main)?;

    out.reserve(usize::try_from(unpack_size).unwrap_or(0).min(64 << 20));
    let mut writer = Crc32Writer::new(&mut *out);
    code(
        &mut reader,
        &mut writer,
        Some(unpack_size),
        packed_size,
        options,
        progress,
    )?;
    let actual = writer.crc();

    if let (true, Some(expected)) = (options.verify_crc, expected_crc) {
        if expected != actual {
            return Err(Error::crc_mismatch(None, None, expected, actual));
        }
    }
    Ok(())
}

/// Decodes one folder and returns its output.
pub fn decode_folder(
    folder: &Folder,
    coder_sizes: &[u64],
    packed: &[u8],
    pack_sizes: &[u64],
    expected_crc: Option<u32>,
    options: &PipelineOptions,
    progress: &mut dyn ProgressReporter,
) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    decode_folder_into(
        folder,
        coder_sizes,
        packed,
        pack_sizes,
        expected_crc,
        options,
        progress,
        &mut out,
    )?;
    Ok(out)
}

/// Coder layout of a folder to encode. Properties are filled in by
/// [`encode_folder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderLayout {
    /// Coders in declaration order.
    pub coders: Vec<CoderInfo>,
    /// Bonds between coders.
    pub bonds: Vec<Bond>,
    /// Input streams that become pack streams, in pack order.
    pub pack_streams: Vec<usize>,
}

impl FolderLayout {
    /// A single coder with one pack stream.
    pub fn single(method_id: u64) -> Self {
        Self {
            coders: vec![CoderInfo::new(method_id, Vec::new())],
            bonds: Vec::new(),
            pack_streams: vec![0],
        }
    }

    /// BCJ2 with LZMA2 on the main stream, LZMA on CALL and JUMP, and the
    /// range-coder stream stored as is.
    pub fn bcj2() -> Self {
        Self {
            coders: vec![
                CoderInfo {
                    method_id: method::BCJ2,
                    num_streams: bcj2::NUM_STREAMS,
                    props: Vec::new(),
                },
                CoderInfo::new(method::LZMA2, Vec::new()),
                CoderInfo::new(method::LZMA, Vec::new()),
                CoderInfo::new(method::LZMA, Vec::new()),
            ],
            bonds: vec![
                Bond { in_index: 0, coder_index: 1 },
                Bond { in_index: 1, coder_index: 2 },
                Bond { in_index: 2, coder_index: 3 },
            ],
            pack_streams: vec![4, 5, 6, 3],
        }
    }

    fn main_coder(&self) -> Result<usize> {
        (0..self.coders.len())
            .find(|&c| !self.bonds.iter().any(|b| b.coder_index == c))
            .ok_or(Error::Internal("folder layout has no main coder"))
    }
}

/// Result of [`encode_folder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFolder {
    /// The folder description with coder properties.
    pub folder: Folder,
    /// Unpack size of every coder.
    pub coder_unpack_sizes: Vec<u64>,
    /// Pack streams in pack order.
    pub pack_streams: Vec<Vec<u8>>,
}

impl EncodedFolder {
    /// Returns the pack stream sizes.
    pub fn pack_sizes(&self) -> Vec<u64> {
        self.pack_streams.iter().map(|s| s.len() as u64).collect()
    }
}

struct EncodeWalk<'l> {
    layout: &'l FolderLayout,
    level: u32,
    sub_stream_sizes: &'l [u64],
    bcj2: Bcj2EncoderOptions,
    props: Vec<Vec<u8>>,
    unpack_sizes: Vec<u64>,
    pack_streams: Vec<Option<Vec<u8>>>,
}

impl EncodeWalk<'_> {
    fn encode_coder(&mut self, coder: usize, data: &[u8]) -> Result<()> {
        let info = &self.layout.coders[coder];
        self.unpack_sizes[coder] = data.len() as u64;
        let first: usize = self.layout.coders[..coder].iter().map(|c| c.num_streams).sum();

        let outputs = if info.method_id == method::BCJ2 {
            let streams = bcj2::bcj2_encode_with_hint(data, &self.bcj2, self.sub_stream_sizes);
            vec![streams.main, streams.call, streams.jump, streams.rc]
        } else {
            let (packed, props) = encode_all(info.method_id, self.level, data)?;
            self.props[coder] = props;
            vec![packed]
        };
        if outputs.len() != info.num_streams {
            return Err(Error::Internal("encoder stream count differs from layout"));
        }

        for (offset, stream) in outputs.into_iter().enumerate() {
            let in_index = first + offset;
            if let Some(bond) = self.layout.bonds.iter().find(|b| b.in_index == in_index) {
                self.encode_coder(bond.coder_index, &stream)?;
            } else if let Some(position) = self.layout.pack_streams.iter().position(|&s| s == in_index) {
                self.pack_streams[position] = Some(stream);
            } else {
                return Err(Error::Internal("encoder output has no destination"));
            }
        }
        Ok(())
    }
}

/// Encodes `data` through `layout`.
///
/// `sub_stream_sizes` are the sizes of the files packed into `data`; BCJ2
/// uses them to keep conversions inside a file.
pub fn encode_folder(
    layout: &FolderLayout,
    data: &[u8],
    level: u32,
    sub_stream_sizes: &[u64],
    bcj2: &Bcj2EncoderOptions,
) -> Result<EncodedFolder> {
    let main = layout.main_coder()?;
    let mut walk = EncodeWalk {
        layout,
        level,
        sub_stream_sizes,
        bcj2: *bcj2,
        props: vec![Vec::new(); layout.coders.len()],
        unpack_sizes: vec![0; layout.coders.len()],
        pack_streams: vec![None; layout.pack_streams.len()],
    };
    walk.encode_coder(main, data)?;

    let coders = layout
        .coders
        .iter()
        .zip(walk.props)
        .map(|(c, props)| CoderInfo {
            method_id: c.method_id,
            num_streams: c.num_streams,
            props,
        })
        .collect();
    let pack_streams = walk
        .pack_streams
        .into_iter()
        .collect::<Option<Vec<_>>>()
        .ok_or(Error::Internal("pack stream left unfilled"))?;
    let folder = Folder::new(coders, layout.bonds.clone(), layout.pack_streams.clone())?;

    Ok(EncodedFolder {
        folder,
        coder_unpack_sizes: walk.unpack_sizes,
        pack_streams,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use crate::checksum::Crc32;
    use crate::progress::{NoProgress, progress_fn};

    fn decode_encoded(encoded: &EncodedFolder, crc: Option<u32>) -> Result<Vec<u8>> {
        let packed = encoded.pack_streams.concat();
        decode_folder(
            &encoded.folder,
            &encoded.coder_unpack_sizes,
            &packed,
            &encoded.pack_sizes(),
            crc,
            &PipelineOptions::default(),
            &mut NoProgress,
        )
    }

    #[test]
    fn test_copy_folder_round_trip() {
        let data = b"stored folder contents".to_vec();
        let encoded = encode_folder(
            &FolderLayout::single(method::COPY),
            &data,
            0,
            &[],
            &Bcj2EncoderOptions::default(),
        )
        .unwrap();
        assert_eq!(encoded.pack_streams, vec![data.clone()]);
        let out = decode_encoded(&encoded, Some(Crc32::compute(&data))).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn test_crc_mismatch_keeps_output() {
        let data = b"abc".to_vec();
        let encoded = encode_folder(
            &FolderLayout::single(method::COPY),
            &data,
            0,
            &[],
            &Bcj2EncoderOptions::default(),
        )
        .unwrap();
        let mut out = Vec::new();
        let err = decode_folder_into(
            &encoded.folder,
            &encoded.coder_unpack_sizes,
            &data,
            &encoded.pack_sizes(),
            Some(0x1234_5678),
            &PipelineOptions::default(),
            &mut NoProgress,
            &mut out,
        )
        .unwrap_err();
        assert!(matches!(err, Error::CrcMismatch { expected: 0x1234_5678, .. }));
        assert_eq!(out, data);
    }

    #[test]
    fn test_short_pack_data_is_end_of_data() {
        let folder = Folder::new(vec![CoderInfo::new(method::COPY, Vec::new())], vec![], vec![0]).unwrap();
        let err = decode_folder(
            &folder,
            &[10],
            b"short",
            &[10],
            None,
            &PipelineOptions::default(),
            &mut NoProgress,
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EndOfData);
    }

    #[test]
    fn test_unknown_method_is_unsupported() {
        let folder = Folder::new(vec![CoderInfo::new(0x7F_7F, Vec::new())], vec![], vec![0]).unwrap();
        let err = decode_folder(
            &folder,
            &[1],
            b"x",
            &[1],
            None,
            &PipelineOptions::default(),
            &mut NoProgress,
        )
        .unwrap_err();
        assert!(matches!(err, Error::UnsupportedMethod { method_id: 0x7F7F }));
    }

    #[test]
    fn test_progress_can_cancel() {
        let data = vec![7u8; 300_000];
        let folder = Folder::new(vec![CoderInfo::new(method::COPY, Vec::new())], vec![], vec![0]).unwrap();
        let mut calls = 0;
        let mut progress = progress_fn(|_, _| {
            calls += 1;
            false
        });
        let err = decode_folder(
            &folder,
            &[data.len() as u64],
            &data,
            &[data.len() as u64],
            None,
            &PipelineOptions::default().progress_interval(100_000),
            &mut progress,
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        drop(progress);
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_progress_interval_and_final_report() {
        let data = vec![1u8; 250_000];
        let folder = Folder::new(vec![CoderInfo::new(method::COPY, Vec::new())], vec![], vec![0]).unwrap();
        let mut reports = Vec::new();
        let mut progress = progress_fn(|_, unpacked| {
            reports.push(unpacked);
            true
        });
        decode_folder(
            &folder,
            &[data.len() as u64],
            &data,
            &[data.len() as u64],
            None,
            &PipelineOptions::default().progress_interval(100_000),
            &mut progress,
        )
        .unwrap();
        drop(progress);
        assert_eq!(reports.last(), Some(&250_000));
        assert!(reports.len() >= 3);
        assert!(reports.windows(2).all(|w| w[0] <= w[1]));
    }

    #[cfg(feature = "lzma")]
    #[test]
    fn test_bcj2_folder_round_trip() {
        let mut data = Vec::new();
        for i in 0..2000u32 {
            data.extend_from_slice(&[0x55, 0xE8]);
            data.extend_from_slice(&(i * 16).to_le_bytes());
            data.extend_from_slice(&[0x0F, 0x84, 0x10, 0x00, 0x00, 0x00, 0xC3]);
        }
        let encoded = encode_folder(
            &FolderLayout::bcj2(),
            &data,
            1,
            &[data.len() as u64],
            &Bcj2EncoderOptions::default(),
        )
        .unwrap();
        assert_eq!(encoded.folder.main_coder(), 0);
        assert_eq!(encoded.coder_unpack_sizes[0], data.len() as u64);
        assert_eq!(encoded.pack_streams.len(), 4);
        let out = decode_encoded(&encoded, Some(Crc32::compute(&data))).unwrap();
        assert_eq!(out, data);
    }

    #[cfg(feature = "lzma")]
    #[test]
    fn test_bcj2_folder_truncated_rc_stream() {
        let data = [0xE8u8, 0x10, 0, 0, 0, 0x90].repeat(100);
        let mut encoded = encode_folder(
            &FolderLayout::bcj2(),
            &data,
            1,
            &[],
            &Bcj2EncoderOptions::default(),
        )
        .unwrap();
        encoded.pack_streams[3].pop();
        let err = decode_encoded(&encoded, None).unwrap_err();
        assert!(err.is_corruption(), "{err}");
    }

    #[test]
    fn test_code_without_size_copies_all() {
        let mut input: &[u8] = b"unbounded";
        let mut out = Vec::new();
        let n = code(&mut input, &mut out, None, 9, &PipelineOptions::default(), &mut NoProgress).unwrap();
        assert_eq!(n, 9);
        assert_eq!(out, b"unbounded");
    }

    #[test]
    fn test_code_extra_data_is_data_error() {
        let mut input: &[u8] = b"too long";
        let mut out = Vec::new();
        let err = code(&mut input, &mut out, Some(3), 8, &PipelineOptions::default(), &mut NoProgress)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DataError);
    }
}
