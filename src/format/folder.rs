//! Folder (coder graph) descriptions.
//!
//! A folder is described by its coders followed by bonds and pack stream
//! indices. Parsing happens in two phases: [`scan_folder`] validates the
//! description straight from the header window while recording only the
//! counts needed for stream accounting, and [`Folder::parse`] later rebuilds
//! the full graph from the recorded bytes when the folder is decoded.
//!
//! Both phases share [`read_graph`], which works on fixed-size arrays so the
//! accounting scan allocates nothing per folder.

use crate::{Error, Result};

use super::reader::{ByteReader, ByteWindow, write_number};
use super::{MAX_CODERS, MAX_FOLDER_IN_STREAMS, MAX_TRACKED_METHODS};
use crate::codec::method;

/// One coder of a folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoderInfo {
    /// Method id, assembled big-endian from 1 to 8 bytes.
    pub method_id: u64,
    /// Number of input streams (1 unless the coder is complex).
    pub num_streams: usize,
    /// Method properties.
    pub props: Vec<u8>,
}

impl CoderInfo {
    /// Creates a single-input coder.
    pub fn new(method_id: u64, props: Vec<u8>) -> Self {
        Self {
            method_id,
            num_streams: 1,
            props,
        }
    }

    /// Returns true for coders with more than one input stream.
    pub fn is_complex(&self) -> bool {
        self.num_streams != 1
    }
}

/// A bond: input stream `in_index` is fed by the output of coder `coder_index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bond {
    /// Folder-global input stream index.
    pub in_index: usize,
    /// Source coder index.
    pub coder_index: usize,
}

/// A fully parsed folder graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Folder {
    /// Coders in declaration order.
    pub coders: Vec<CoderInfo>,
    /// Bonds between coders.
    pub bonds: Vec<Bond>,
    /// Folder-global input stream index of each pack stream, in pack order.
    pub pack_streams: Vec<usize>,
    main_coder: usize,
}

/// What the accounting scan remembers about one folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FolderScan {
    /// Number of coders.
    pub num_coders: usize,
    /// Number of pack streams.
    pub num_pack_streams: usize,
    /// Index of the coder producing the folder output.
    pub main_coder: usize,
}

/// Method roll-ups gathered during the accounting scan, for archive info.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MethodStats {
    /// Largest LZMA dictionary size seen.
    pub lzma_max_dict: Option<u32>,
    /// Largest LZMA2 property byte seen.
    pub lzma2_max_prop: Option<u8>,
    /// Sorted unique method ids, at most 128.
    pub method_ids: Vec<u64>,
}

impl MethodStats {
    fn record(&mut self, method_id: u64, props: &[u8]) {
        if method_id == method::LZMA2 && props.len() == 1 {
            self.lzma2_max_prop = Some(self.lzma2_max_prop.map_or(props[0], |v| v.max(props[0])));
        }
        if method_id == method::LZMA && props.len() == 5 {
            let dict = u32::from_le_bytes([props[1], props[2], props[3], props[4]]);
            self.lzma_max_dict = Some(self.lzma_max_dict.map_or(dict, |v| v.max(dict)));
        }
        if let Err(at) = self.method_ids.binary_search(&method_id) {
            if self.method_ids.len() < MAX_TRACKED_METHODS {
                self.method_ids.insert(at, method_id);
            }
        }
    }
}

/// Validated folder topology on fixed-size arrays.
struct Graph {
    num_coders: usize,
    num_in_streams: usize,
    coder_streams: [u8; MAX_CODERS],
    bonds: [(u8, u8); MAX_CODERS],
    num_bonds: usize,
    pack_streams: [u8; MAX_FOLDER_IN_STREAMS],
    num_pack_streams: usize,
    main_coder: usize,
}

fn unsupported(feature: &'static str) -> Error {
    Error::UnsupportedFeature { feature }
}

/// Reads and validates one folder description.
///
/// When `coders` is given, each coder is appended to it; `stats` receives
/// method roll-ups.
fn read_graph<W: ByteWindow>(
    w: &mut W,
    mut coders: Option<&mut Vec<CoderInfo>>,
    mut stats: Option<&mut MethodStats>,
) -> Result<Graph> {
    let num_coders = w.read_num()? as usize;
    if num_coders == 0 || num_coders > MAX_CODERS {
        return Err(unsupported("coder count outside 1..=64"));
    }

    let mut graph = Graph {
        num_coders,
        num_in_streams: 0,
        coder_streams: [0; MAX_CODERS],
        bonds: [(0, 0); MAX_CODERS],
        num_bonds: 0,
        pack_streams: [0; MAX_FOLDER_IN_STREAMS],
        num_pack_streams: 0,
        main_coder: 0,
    };

    for ci in 0..num_coders {
        let main_byte = w.read_u8()?;
        if main_byte & 0xC0 != 0 {
            return Err(unsupported("reserved coder flag bits"));
        }
        let id_size = usize::from(main_byte & 0x0F);
        if id_size > 8 {
            return Err(unsupported("method id longer than 8 bytes"));
        }
        let method_id = w
            .read_slice(id_size)?
            .iter()
            .fold(0u64, |acc, &b| (acc << 8) | u64::from(b));

        let num_streams = if main_byte & 0x10 != 0 {
            let n = w.read_num()? as usize;
            if n > MAX_FOLDER_IN_STREAMS {
                return Err(unsupported("too many coder input streams"));
            }
            if w.read_num()? != 1 {
                return Err(unsupported("coder with more than one output stream"));
            }
            n
        } else {
            1
        };
        graph.coder_streams[ci] = num_streams as u8;
        graph.num_in_streams += num_streams;
        if graph.num_in_streams > MAX_FOLDER_IN_STREAMS {
            return Err(unsupported("too many input streams in folder"));
        }

        let props: &[u8] = if main_byte & 0x20 != 0 {
            let size = w.read_num()? as usize;
            w.read_slice(size)?
        } else {
            &[]
        };
        if let Some(stats) = stats.as_deref_mut() {
            stats.record(method_id, props);
        }
        if let Some(coders) = coders.as_deref_mut() {
            coders.push(CoderInfo {
                method_id,
                num_streams,
                props: props.to_vec(),
            });
        }
    }

    let num_in_streams = graph.num_in_streams;
    if num_coders == 1 && num_in_streams == 1 {
        graph.pack_streams[0] = 0;
        graph.num_pack_streams = 1;
        graph.main_coder = 0;
        return Ok(graph);
    }

    let num_bonds = num_coders - 1;
    if num_in_streams < num_bonds {
        return Err(unsupported("fewer input streams than bonds"));
    }
    let mut stream_used = [false; MAX_FOLDER_IN_STREAMS];
    let mut coder_used = [false; MAX_CODERS];
    for b in 0..num_bonds {
        let in_index = w.read_num()? as usize;
        if in_index >= num_in_streams || stream_used[in_index] {
            return Err(unsupported("bond input stream out of range or reused"));
        }
        stream_used[in_index] = true;
        let coder_index = w.read_num()? as usize;
        if coder_index >= num_coders || coder_used[coder_index] {
            return Err(unsupported("bond source coder out of range or reused"));
        }
        coder_used[coder_index] = true;
        graph.bonds[b] = (in_index as u8, coder_index as u8);
    }
    graph.num_bonds = num_bonds;

    let num_pack_streams = num_in_streams - num_bonds;
    if num_pack_streams == 0 {
        return Err(unsupported("folder without pack streams"));
    }
    if num_pack_streams == 1 {
        let free = (0..num_in_streams)
            .find(|&i| !stream_used[i])
            .ok_or_else(|| unsupported("no unbound input stream"))?;
        graph.pack_streams[0] = free as u8;
    } else {
        for k in 0..num_pack_streams {
            let index = w.read_num()? as usize;
            if index >= num_in_streams || stream_used[index] {
                return Err(unsupported("pack stream index out of range or already bound"));
            }
            stream_used[index] = true;
            graph.pack_streams[k] = index as u8;
        }
    }
    graph.num_pack_streams = num_pack_streams;

    graph.main_coder = (0..num_coders)
        .find(|&c| !coder_used[c])
        .ok_or_else(|| unsupported("folder has no main coder"))?;

    check_acyclic(&graph)?;
    Ok(graph)
}

/// Every non-main coder feeds exactly one bond, so following the consumer
/// chain from any coder must reach the main coder within `num_coders` steps.
fn check_acyclic(graph: &Graph) -> Result<()> {
    let mut owner = [0u8; MAX_FOLDER_IN_STREAMS];
    let mut next = 0usize;
    for c in 0..graph.num_coders {
        for _ in 0..graph.coder_streams[c] {
            owner[next] = c as u8;
            next += 1;
        }
    }
    let mut consumer = [u8::MAX; MAX_CODERS];
    for &(in_index, coder_index) in &graph.bonds[..graph.num_bonds] {
        consumer[usize::from(coder_index)] = owner[usize::from(in_index)];
    }
    for start in 0..graph.num_coders {
        let mut c = start;
        let mut steps = 0;
        while c != graph.main_coder {
            if steps > graph.num_coders || consumer[c] == u8::MAX {
                return Err(unsupported("cyclic coder graph"));
            }
            c = usize::from(consumer[c]);
            steps += 1;
        }
    }
    Ok(())
}

/// Phase A: validates one folder description from the live window.
pub fn scan_folder<W: ByteWindow>(w: &mut W, stats: &mut MethodStats) -> Result<FolderScan> {
    let graph = read_graph(w, None, Some(stats))?;
    Ok(FolderScan {
        num_coders: graph.num_coders,
        num_pack_streams: graph.num_pack_streams,
        main_coder: graph.main_coder,
    })
}

impl Folder {
    /// Builds a folder from parts, validating it the same way a parsed one is.
    pub fn new(coders: Vec<CoderInfo>, bonds: Vec<Bond>, pack_streams: Vec<usize>) -> Result<Self> {
        let mut bytes = Vec::new();
        encode_parts(&mut bytes, &coders, &bonds, &pack_streams);
        Self::parse(&bytes)
    }

    /// Phase B: parses a complete folder description.
    ///
    /// Bytes left after the description are a header error.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(bytes);
        let mut coders = Vec::new();
        let graph = read_graph(&mut reader, Some(&mut coders), None)?;
        if !reader.is_exhausted() {
            return Err(reader.corrupt("trailing bytes after folder description"));
        }
        Ok(Self {
            coders,
            bonds: graph.bonds[..graph.num_bonds]
                .iter()
                .map(|&(i, c)| Bond {
                    in_index: usize::from(i),
                    coder_index: usize::from(c),
                })
                .collect(),
            pack_streams: graph.pack_streams[..graph.num_pack_streams]
                .iter()
                .map(|&i| usize::from(i))
                .collect(),
            main_coder: graph.main_coder,
        })
    }

    /// Returns the coder whose output is the folder output.
    pub fn main_coder(&self) -> usize {
        self.main_coder
    }

    /// Returns the total number of input streams.
    pub fn num_in_streams(&self) -> usize {
        self.coders.iter().map(|c| c.num_streams).sum()
    }

    /// Returns the folder-global index of the first input of `coder`.
    pub fn coder_first_in_stream(&self, coder: usize) -> usize {
        self.coders[..coder].iter().map(|c| c.num_streams).sum()
    }

    /// Returns the bond feeding input stream `in_index`, if any.
    pub fn bond_for_in_stream(&self, in_index: usize) -> Option<&Bond> {
        self.bonds.iter().find(|b| b.in_index == in_index)
    }

    /// Returns the pack position of input stream `in_index`, if it is a pack stream.
    pub fn pack_position_of(&self, in_index: usize) -> Option<usize> {
        self.pack_streams.iter().position(|&s| s == in_index)
    }

    /// Returns true when any coder uses `method_id`.
    pub fn uses_method(&self, method_id: u64) -> bool {
        self.coders.iter().any(|c| c.method_id == method_id)
    }

    /// Appends the wire description of this folder.
    pub fn encode(&self, buf: &mut Vec<u8>) {
        encode_parts(buf, &self.coders, &self.bonds, &self.pack_streams);
    }
}

fn encode_parts(buf: &mut Vec<u8>, coders: &[CoderInfo], bonds: &[Bond], pack_streams: &[usize]) {
    write_number(buf, coders.len() as u64);
    for coder in coders {
        let id_bytes = coder.method_id.to_be_bytes();
        let id_size = (8 - coder.method_id.leading_zeros() as usize / 8).max(1);
        let mut main_byte = id_size as u8;
        if coder.is_complex() {
            main_byte |= 0x10;
        }
        if !coder.props.is_empty() {
            main_byte |= 0x20;
        }
        buf.push(main_byte);
        buf.extend_from_slice(&id_bytes[8 - id_size..]);
        if coder.is_complex() {
            write_number(buf, coder.num_streams as u64);
            write_number(buf, 1);
        }
        if !coder.props.is_empty() {
            write_number(buf, coder.props.len() as u64);
            buf.extend_from_slice(&coder.props);
        }
    }
    let num_in_streams: usize = coders.iter().map(|c| c.num_streams).sum();
    if coders.len() == 1 && num_in_streams == 1 {
        return;
    }
    for bond in bonds {
        write_number(buf, bond.in_index as u64);
        write_number(buf, bond.coder_index as u64);
    }
    if pack_streams.len() > 1 {
        for &index in pack_streams {
            write_number(buf, index as u64);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    fn bcj2_folder() -> Folder {
        Folder::new(
            vec![
                CoderInfo {
                    method_id: method::BCJ2,
                    num_streams: 4,
                    props: Vec::new(),
                },
                CoderInfo::new(method::LZMA2, vec![0x10]),
                CoderInfo::new(method::LZMA, vec![0x5D, 0, 0, 1, 0]),
                CoderInfo::new(method::LZMA, vec![0x5D, 0, 0, 1, 0]),
            ],
            vec![
                Bond { in_index: 0, coder_index: 1 },
                Bond { in_index: 1, coder_index: 2 },
                Bond { in_index: 2, coder_index: 3 },
            ],
            vec![4, 5, 6, 3],
        )
        .unwrap()
    }

    #[test]
    fn test_single_coder_folder() {
        let bytes = [0x01, 0x00];
        let folder = Folder::parse(&bytes).unwrap();
        assert_eq!(folder.coders.len(), 1);
        assert_eq!(folder.coders[0].method_id, method::COPY);
        assert_eq!(folder.pack_streams, vec![0]);
        assert_eq!(folder.main_coder(), 0);
        assert!(folder.bonds.is_empty());
    }

    #[test]
    fn test_bcj2_layout() {
        let folder = bcj2_folder();
        assert_eq!(folder.main_coder(), 0);
        assert_eq!(folder.num_in_streams(), 7);
        assert_eq!(folder.num_in_streams(), folder.bonds.len() + folder.pack_streams.len());
        assert_eq!(folder.coder_first_in_stream(2), 5);
        assert_eq!(folder.bond_for_in_stream(1).unwrap().coder_index, 2);
        assert_eq!(folder.pack_position_of(3), Some(3));
        assert!(folder.uses_method(method::BCJ2));

        let mut bytes = Vec::new();
        folder.encode(&mut bytes);
        let mut stats = MethodStats::default();
        let scan = scan_folder(&mut ByteReader::new(&bytes), &mut stats).unwrap();
        assert_eq!(scan.num_pack_streams, 4);
        assert_eq!(scan.main_coder, 0);
        assert_eq!(stats.lzma2_max_prop, Some(0x10));
        assert_eq!(stats.lzma_max_dict, Some(1 << 16));
        assert_eq!(stats.method_ids, vec![method::LZMA2, method::LZMA, method::BCJ2]);
    }

    #[test]
    fn test_duplicate_bond_target_is_unsupported() {
        // Both BCJ2 inputs are bonded to the output of coder 1.
        let err = Folder::new(
            vec![
                CoderInfo { method_id: method::BCJ2, num_streams: 2, props: vec![] },
                CoderInfo::new(method::COPY, vec![]),
                CoderInfo::new(method::COPY, vec![]),
            ],
            vec![
                Bond { in_index: 0, coder_index: 1 },
                Bond { in_index: 1, coder_index: 1 },
            ],
            vec![2, 3],
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);
    }

    #[test]
    fn test_cycle_is_unsupported() {
        // Coder 1 feeds coder 2 and coder 2 feeds coder 1; coder 0 is main.
        let err = Folder::new(
            vec![
                CoderInfo::new(method::COPY, vec![]),
                CoderInfo::new(method::COPY, vec![]),
                CoderInfo::new(method::COPY, vec![]),
            ],
            vec![
                Bond { in_index: 1, coder_index: 2 },
                Bond { in_index: 2, coder_index: 1 },
            ],
            vec![0],
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);
    }

    #[test]
    fn test_reserved_bits_and_bounds() {
        assert_eq!(Folder::parse(&[0x01, 0x40]).unwrap_err().kind(), ErrorKind::Unsupported);
        assert_eq!(Folder::parse(&[0x01, 0x09]).unwrap_err().kind(), ErrorKind::Unsupported);
        assert_eq!(Folder::parse(&[0x00]).unwrap_err().kind(), ErrorKind::Unsupported);
        assert_eq!(Folder::parse(&[0x41]).unwrap_err().kind(), ErrorKind::Unsupported);
        // Method id longer than the remaining bytes.
        assert_eq!(Folder::parse(&[0x01, 0x04, 0x03]).unwrap_err().kind(), ErrorKind::EndOfData);
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let err = Folder::parse(&[0x01, 0x00, 0x00]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Incorrect);
    }

    #[test]
    fn test_method_stats_bound() {
        let mut stats = MethodStats::default();
        for id in (0..200u64).rev() {
            stats.record(id, &[]);
        }
        assert_eq!(stats.method_ids.len(), MAX_TRACKED_METHODS);
        assert!(stats.method_ids.windows(2).all(|w| w[0] < w[1]));
    }
}
