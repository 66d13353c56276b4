//! 7z container format: constants, header structures and the header parser.
//!
//! The parse proceeds leaf-first: [`reader`] decodes primitive fields,
//! [`switch`] redirects reads between the header blob and external data
//! blocks, [`folder`] and [`streams`] describe coder graphs and packed
//! streams, [`files`] decodes the file table, and [`parser`] drives the
//! section state machine that produces a [`database::Database`].

pub mod database;
pub mod files;
pub mod folder;
pub mod header;
pub mod parser;
pub mod reader;
pub mod streams;
pub mod switch;

/// The 7z file signature (magic bytes).
///
/// Every valid 7z archive starts with these 6 bytes: `'7' 'z' 0xBC 0xAF 0x27 0x1C`
pub const SIGNATURE: &[u8; 6] = &[0x37, 0x7A, 0xBC, 0xAF, 0x27, 0x1C];

/// Size of the signature header in bytes.
///
/// The signature header contains:
/// - 6 bytes: signature
/// - 2 bytes: version (major, minor)
/// - 4 bytes: start header CRC
/// - 8 bytes: next header offset
/// - 8 bytes: next header size
/// - 4 bytes: next header CRC
pub const SIGNATURE_HEADER_SIZE: u64 = 32;

/// Archive version written by this crate - major.
pub const VERSION_MAJOR: u8 = 0;

/// Archive version written by this crate - minor.
pub const VERSION_MINOR: u8 = 4;

/// Upper bound accepted by counted reads (`read_num`).
///
/// Values above it are well-formed numbers but not sane counts and are
/// reported as unsupported rather than truncated.
pub const NUM_MAX: u64 = 1 << 30;

/// Maximum number of coders in one folder.
pub const MAX_CODERS: usize = 64;

/// Maximum number of input streams across all coders of one folder.
pub const MAX_FOLDER_IN_STREAMS: usize = 64;

/// Maximum number of distinct method ids remembered for archive info.
pub const MAX_TRACKED_METHODS: usize = 128;

/// Property IDs used in 7z archive headers.
pub mod property_id {
    /// End of header marker.
    pub const END: u64 = 0x00;
    /// Header marker.
    pub const HEADER: u64 = 0x01;
    /// Archive properties.
    pub const ARCHIVE_PROPERTIES: u64 = 0x02;
    /// Additional streams info.
    pub const ADDITIONAL_STREAMS_INFO: u64 = 0x03;
    /// Main streams info.
    pub const MAIN_STREAMS_INFO: u64 = 0x04;
    /// Files info.
    pub const FILES_INFO: u64 = 0x05;
    /// Pack info.
    pub const PACK_INFO: u64 = 0x06;
    /// Unpack info.
    pub const UNPACK_INFO: u64 = 0x07;
    /// Substreams info.
    pub const SUBSTREAMS_INFO: u64 = 0x08;
    /// Size info.
    pub const SIZE: u64 = 0x09;
    /// CRC info.
    pub const CRC: u64 = 0x0A;
    /// Folder info.
    pub const FOLDER: u64 = 0x0B;
    /// Coders unpack size.
    pub const CODERS_UNPACK_SIZE: u64 = 0x0C;
    /// Number of unpack streams in folders.
    pub const NUM_UNPACK_STREAM: u64 = 0x0D;
    /// Empty stream indicator.
    pub const EMPTY_STREAM: u64 = 0x0E;
    /// Empty file indicator.
    pub const EMPTY_FILE: u64 = 0x0F;
    /// Anti-file indicator.
    pub const ANTI: u64 = 0x10;
    /// File names.
    pub const NAME: u64 = 0x11;
    /// Creation time.
    pub const CTIME: u64 = 0x12;
    /// Access time.
    pub const ATIME: u64 = 0x13;
    /// Modification time.
    pub const MTIME: u64 = 0x14;
    /// Windows file attributes.
    pub const WIN_ATTRIBUTES: u64 = 0x15;
    /// Comment.
    pub const COMMENT: u64 = 0x16;
    /// Encoded header.
    pub const ENCODED_HEADER: u64 = 0x17;
    /// Start position.
    pub const START_POS: u64 = 0x18;
    /// Dummy (alignment padding).
    pub const DUMMY: u64 = 0x19;
}

/// Windows file attribute constants.
pub mod attributes {
    /// Read-only file.
    pub const READONLY: u32 = 0x01;
    /// Directory.
    pub const DIRECTORY: u32 = 0x10;
    /// Archive file.
    pub const ARCHIVE: u32 = 0x20;
}
