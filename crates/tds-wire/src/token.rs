//! TDS response token stream.
//!
//! A tabular response payload is a sequence of tokens: one discriminator
//! byte, then a type-specific layout (fixed size, 2-byte length prefix, or
//! a structure whose extent is defined by column metadata). [`TokenParser`]
//! walks one assembled message payload lazily and strictly forward.

use bytes::{Buf, BufMut, Bytes};

use crate::codec::{read_b_varchar, read_us_varchar};
use crate::error::ProtocolError;
use crate::types::TypeId;

/// Token type identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TokenType {
    /// Column metadata (COLMETADATA).
    ColMetaData = 0x81,
    /// Error message (ERROR).
    Error = 0xAA,
    /// Informational message (INFO).
    Info = 0xAB,
    /// Login acknowledgment (LOGINACK).
    LoginAck = 0xAD,
    /// Row data (ROW).
    Row = 0xD1,
    /// Null bitmap compressed row (NBCROW).
    NbcRow = 0xD2,
    /// Environment change (ENVCHANGE).
    EnvChange = 0xE3,
    /// Done (DONE).
    Done = 0xFD,
    /// Done in procedure (DONEINPROC).
    DoneInProc = 0xFF,
    /// Done procedure (DONEPROC).
    DoneProc = 0xFE,
    /// Return status (RETURNSTATUS).
    ReturnStatus = 0x79,
    /// Return value (RETURNVALUE).
    ReturnValue = 0xAC,
    /// Order (ORDER).
    Order = 0xA9,
    /// Column info (COLINFO), skipped.
    ColInfo = 0xA5,
    /// Table name (TABNAME), skipped.
    TabName = 0xA4,
}

impl TokenType {
    /// Create a token type from a raw byte.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x81 => Some(Self::ColMetaData),
            0xAA => Some(Self::Error),
            0xAB => Some(Self::Info),
            0xAD => Some(Self::LoginAck),
            0xD1 => Some(Self::Row),
            0xD2 => Some(Self::NbcRow),
            0xE3 => Some(Self::EnvChange),
            0xFD => Some(Self::Done),
            0xFF => Some(Self::DoneInProc),
            0xFE => Some(Self::DoneProc),
            0x79 => Some(Self::ReturnStatus),
            0xAC => Some(Self::ReturnValue),
            0xA9 => Some(Self::Order),
            0xA5 => Some(Self::ColInfo),
            0xA4 => Some(Self::TabName),
            _ => None,
        }
    }
}

/// Parsed TDS token.
///
/// Closed tagged variant: new token kinds are added by extending this enum.
/// Unknown extension tokens with the high bit set and a 2-byte length
/// prefix are skipped by the parser rather than represented here.
#[derive(Debug, Clone)]
pub enum Token {
    /// Column metadata describing result set structure.
    ColMetaData(ColMetaData),
    /// Row data, captured against the current column metadata.
    Row(RawRow),
    /// Null bitmap compressed row.
    NbcRow(NbcRow),
    /// Completion of a SQL statement.
    Done(Done),
    /// Completion of a stored procedure.
    DoneProc(Done),
    /// Completion of a statement within a stored procedure.
    DoneInProc(Done),
    /// Return status from a stored procedure.
    ReturnStatus(i32),
    /// Return value (output parameter) from a stored procedure.
    ReturnValue(ReturnValue),
    /// Error message from the server.
    Error(ServerError),
    /// Informational message from the server.
    Info(ServerInfo),
    /// Login acknowledgment.
    LoginAck(LoginAck),
    /// Environment change notification.
    EnvChange(EnvChange),
    /// Column ordering information.
    Order(Order),
}

/// Column metadata token.
#[derive(Debug, Clone, Default)]
pub struct ColMetaData {
    /// Column definitions, in result-set order.
    pub columns: Vec<ColumnData>,
}

/// Column definition within metadata.
#[derive(Debug, Clone)]
pub struct ColumnData {
    /// Column name.
    pub name: String,
    /// Column data type.
    pub type_id: TypeId,
    /// Column flags (bit 0: nullable).
    pub flags: u16,
    /// User type ID.
    pub user_type: u32,
    /// Type-specific metadata.
    pub type_info: TypeInfo,
}

impl ColumnData {
    /// Check if this column is nullable.
    #[must_use]
    pub fn is_nullable(&self) -> bool {
        (self.flags & 0x0001) != 0
    }
}

/// Type-specific column metadata.
#[derive(Debug, Clone, Default)]
pub struct TypeInfo {
    /// Maximum length for variable-length types.
    pub max_length: Option<u32>,
    /// Precision for numeric types.
    pub precision: Option<u8>,
    /// Scale for numeric and time types.
    pub scale: Option<u8>,
    /// Collation for character types.
    pub collation: Option<Collation>,
}

/// Server collation: locale id + sort id, as carried on character columns.
///
/// The LCID selects the code page used for non-Unicode character data.
/// UTF-8 collations (bit 27 of the LCID) carry UTF-8 directly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Collation {
    /// Locale ID.
    pub lcid: u32,
    /// Sort ID.
    pub sort_id: u8,
}

/// Raw row data, captured column by column but not yet decoded to values.
///
/// The capture preserves each column's length prefix (legacy textptr LOBs
/// are normalized to PLP) so value decoding needs only the type metadata.
#[derive(Debug, Clone)]
pub struct RawRow {
    /// Captured column bytes.
    pub data: Bytes,
}

/// Null bitmap compressed row: a bitmap marks NULL columns, and only the
/// non-NULL values follow.
#[derive(Debug, Clone)]
pub struct NbcRow {
    /// Null bitmap, one bit per column, LSB first.
    pub null_bitmap: Vec<u8>,
    /// Captured bytes of the non-NULL columns.
    pub data: Bytes,
}

impl NbcRow {
    /// Check if the column at `index` is NULL.
    #[must_use]
    pub fn is_null(&self, index: usize) -> bool {
        match self.null_bitmap.get(index / 8) {
            Some(byte) => (byte & (1 << (index % 8))) != 0,
            None => true,
        }
    }
}

/// DONE/DONEPROC/DONEINPROC token.
#[derive(Debug, Clone, Copy)]
pub struct Done {
    /// Status flags.
    pub status: DoneStatus,
    /// Token of the current command.
    pub cur_cmd: u16,
    /// Row count, valid when `status.count` is set.
    pub row_count: u64,
}

/// DONE status flags.
#[derive(Debug, Clone, Copy, Default)]
pub struct DoneStatus {
    /// More results follow this one.
    pub more: bool,
    /// The statement ended in error.
    pub error: bool,
    /// A transaction is in progress.
    pub in_xact: bool,
    /// The row count field is valid.
    pub count: bool,
    /// Acknowledges an attention (cancel) signal.
    pub attention: bool,
    /// A server error terminated the statement.
    pub srverror: bool,
}

mod done_bits {
    pub const MORE: u16 = 0x0001;
    pub const ERROR: u16 = 0x0002;
    pub const INXACT: u16 = 0x0004;
    pub const COUNT: u16 = 0x0010;
    pub const ATTN: u16 = 0x0020;
    pub const SRVERROR: u16 = 0x0100;
}

impl DoneStatus {
    /// Parse status from raw bits.
    #[must_use]
    pub fn from_bits(bits: u16) -> Self {
        Self {
            more: (bits & done_bits::MORE) != 0,
            error: (bits & done_bits::ERROR) != 0,
            in_xact: (bits & done_bits::INXACT) != 0,
            count: (bits & done_bits::COUNT) != 0,
            attention: (bits & done_bits::ATTN) != 0,
            srverror: (bits & done_bits::SRVERROR) != 0,
        }
    }

    /// Convert back to raw bits.
    #[must_use]
    pub fn to_bits(&self) -> u16 {
        let mut bits = 0u16;
        if self.more {
            bits |= done_bits::MORE;
        }
        if self.error {
            bits |= done_bits::ERROR;
        }
        if self.in_xact {
            bits |= done_bits::INXACT;
        }
        if self.count {
            bits |= done_bits::COUNT;
        }
        if self.attention {
            bits |= done_bits::ATTN;
        }
        if self.srverror {
            bits |= done_bits::SRVERROR;
        }
        bits
    }
}

impl Done {
    /// Size of the token body in bytes (excluding the type byte).
    pub const SIZE: usize = 12;

    /// Decode a DONE-family token body.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        if src.remaining() < Self::SIZE {
            return Err(ProtocolError::truncated(Self::SIZE, src.remaining()));
        }

        let status = DoneStatus::from_bits(src.get_u16_le());
        let cur_cmd = src.get_u16_le();
        let row_count = src.get_u64_le();

        Ok(Self {
            status,
            cur_cmd,
            row_count,
        })
    }

    /// Encode the token including its type byte.
    pub fn encode(&self, token_type: TokenType, dst: &mut impl BufMut) {
        dst.put_u8(token_type as u8);
        dst.put_u16_le(self.status.to_bits());
        dst.put_u16_le(self.cur_cmd);
        dst.put_u64_le(self.row_count);
    }

    /// Check if more results follow.
    #[must_use]
    pub const fn has_more(&self) -> bool {
        self.status.more
    }
}

/// Return value (output parameter) token.
#[derive(Debug, Clone)]
pub struct ReturnValue {
    /// Parameter ordinal.
    pub param_ordinal: u16,
    /// Parameter name.
    pub param_name: String,
    /// Parameter type.
    pub type_id: TypeId,
    /// Type metadata.
    pub type_info: TypeInfo,
    /// Captured value bytes, same layout as a row column.
    pub value: Bytes,
}

/// Server error message.
#[derive(Debug, Clone)]
pub struct ServerError {
    /// Error number.
    pub number: i32,
    /// Error state.
    pub state: u8,
    /// Severity class.
    pub class: u8,
    /// Message text.
    pub message: String,
    /// Reporting server name.
    pub server: String,
    /// Originating procedure, empty for ad-hoc batches.
    pub procedure: String,
    /// Line number within the batch or procedure.
    pub line: i32,
}

impl ServerError {
    /// Check if this severity terminates the connection on the server side.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        self.class >= 20
    }
}

/// Server informational message. Same layout as an error, lower severity.
#[derive(Debug, Clone)]
pub struct ServerInfo {
    /// Message number.
    pub number: i32,
    /// Message state.
    pub state: u8,
    /// Severity class.
    pub class: u8,
    /// Message text.
    pub message: String,
    /// Reporting server name.
    pub server: String,
    /// Originating procedure.
    pub procedure: String,
    /// Line number.
    pub line: i32,
}

/// Login acknowledgment token.
#[derive(Debug, Clone)]
pub struct LoginAck {
    /// Interface type.
    pub interface: u8,
    /// Negotiated TDS version (raw).
    pub tds_version: u32,
    /// Server program name.
    pub prog_name: String,
    /// Server program version.
    pub prog_version: u32,
}

impl LoginAck {
    /// Negotiated TDS version.
    #[must_use]
    pub fn version(&self) -> crate::version::TdsVersion {
        crate::version::TdsVersion::new(self.tds_version)
    }
}

/// Environment change token.
#[derive(Debug, Clone)]
pub struct EnvChange {
    /// What changed.
    pub env_type: EnvChangeType,
    /// New value.
    pub new_value: EnvChangeValue,
    /// Old value.
    pub old_value: EnvChangeValue,
}

/// Environment change type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvChangeType {
    /// Database changed.
    Database,
    /// Language changed.
    Language,
    /// Character set changed.
    CharacterSet,
    /// Packet size changed.
    PacketSize,
    /// SQL collation changed.
    SqlCollation,
    /// A change this client records but does not act on.
    Other(u8),
}

impl EnvChangeType {
    /// Create from the raw type byte.
    #[must_use]
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Database,
            2 => Self::Language,
            3 => Self::CharacterSet,
            4 => Self::PacketSize,
            7 => Self::SqlCollation,
            other => Self::Other(other),
        }
    }
}

/// Environment change value.
#[derive(Debug, Clone)]
pub enum EnvChangeValue {
    /// String value.
    String(String),
    /// Binary value.
    Binary(Bytes),
}

impl EnvChangeValue {
    /// The value as a string, if it is one.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            Self::Binary(_) => None,
        }
    }
}

/// Column ordering information.
#[derive(Debug, Clone)]
pub struct Order {
    /// Ordered column indices.
    pub columns: Vec<u16>,
}

// =============================================================================
// Decoding
// =============================================================================

impl ColMetaData {
    /// Sentinel column count meaning "no metadata".
    pub const NO_METADATA: u16 = 0xFFFF;

    /// Decode a COLMETADATA token body.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        if src.remaining() < 2 {
            return Err(ProtocolError::truncated(2, src.remaining()));
        }

        let column_count = src.get_u16_le();
        if column_count == Self::NO_METADATA {
            return Ok(Self::default());
        }

        let mut columns = Vec::with_capacity(column_count as usize);
        for _ in 0..column_count {
            columns.push(Self::decode_column(src)?);
        }

        Ok(Self { columns })
    }

    fn decode_column(src: &mut impl Buf) -> Result<ColumnData, ProtocolError> {
        // UserType (4) + Flags (2) + TypeId (1)
        if src.remaining() < 7 {
            return Err(ProtocolError::truncated(7, src.remaining()));
        }

        let user_type = src.get_u32_le();
        let flags = src.get_u16_le();
        let type_byte = src.get_u8();
        let type_id =
            TypeId::from_u8(type_byte).ok_or(ProtocolError::UnsupportedType(type_byte))?;

        let type_info = decode_type_info(src, type_id)?;
        let name = read_b_varchar(src)
            .ok_or_else(|| ProtocolError::truncated(1, src.remaining()))?;

        Ok(ColumnData {
            name,
            type_id,
            flags,
            user_type,
            type_info,
        })
    }

    /// Get the number of columns.
    #[must_use]
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Check if this represents no metadata.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Decode the type-specific metadata that follows a column's type byte.
fn decode_type_info(src: &mut impl Buf, type_id: TypeId) -> Result<TypeInfo, ProtocolError> {
    fn need(src: &impl Buf, n: usize) -> Result<(), ProtocolError> {
        if src.remaining() < n {
            Err(ProtocolError::truncated(n, src.remaining()))
        } else {
            Ok(())
        }
    }

    match type_id {
        // Fixed-length types carry no additional metadata.
        _ if type_id.is_fixed_length() => Ok(TypeInfo::default()),

        // 1-byte max length.
        TypeId::IntN
        | TypeId::BitN
        | TypeId::FloatN
        | TypeId::MoneyN
        | TypeId::DateTimeN
        | TypeId::Guid => {
            need(src, 1)?;
            Ok(TypeInfo {
                max_length: Some(src.get_u8() as u32),
                ..Default::default()
            })
        }

        // 1-byte length + precision + scale.
        TypeId::DecimalN | TypeId::NumericN => {
            need(src, 3)?;
            let max_length = src.get_u8() as u32;
            let precision = src.get_u8();
            let scale = src.get_u8();
            Ok(TypeInfo {
                max_length: Some(max_length),
                precision: Some(precision),
                scale: Some(scale),
                ..Default::default()
            })
        }

        // 2-byte max length + 5-byte collation.
        TypeId::BigVarChar | TypeId::BigChar | TypeId::NVarChar | TypeId::NChar => {
            need(src, 7)?;
            let max_length = src.get_u16_le() as u32;
            let collation = decode_collation(src)?;
            Ok(TypeInfo {
                max_length: Some(max_length),
                collation: Some(collation),
                ..Default::default()
            })
        }

        // 2-byte max length, no collation.
        TypeId::BigVarBinary | TypeId::BigBinary => {
            need(src, 2)?;
            Ok(TypeInfo {
                max_length: Some(src.get_u16_le() as u32),
                ..Default::default()
            })
        }

        // Date has no metadata; the other 7.3+ time types carry a scale.
        TypeId::Date => Ok(TypeInfo::default()),
        TypeId::Time | TypeId::DateTime2 | TypeId::DateTimeOffset => {
            need(src, 1)?;
            Ok(TypeInfo {
                scale: Some(src.get_u8()),
                ..Default::default()
            })
        }

        // Legacy LOBs: 4-byte length, collation for the character kinds,
        // then a table-name list we discard.
        TypeId::Text | TypeId::NText | TypeId::Image => {
            need(src, 4)?;
            let max_length = src.get_u32_le();

            let collation = if matches!(type_id, TypeId::Text | TypeId::NText) {
                Some(decode_collation(src)?)
            } else {
                None
            };

            need(src, 1)?;
            let num_parts = src.get_u8();
            for _ in 0..num_parts {
                read_us_varchar(src)
                    .ok_or_else(|| ProtocolError::truncated(2, src.remaining()))?;
            }

            Ok(TypeInfo {
                max_length: Some(max_length),
                collation,
                ..Default::default()
            })
        }

        _ => Ok(TypeInfo::default()),
    }
}

fn decode_collation(src: &mut impl Buf) -> Result<Collation, ProtocolError> {
    if src.remaining() < 5 {
        return Err(ProtocolError::truncated(5, src.remaining()));
    }
    let lcid = src.get_u32_le();
    let sort_id = src.get_u8();
    Ok(Collation { lcid, sort_id })
}

impl RawRow {
    /// Decode a ROW token body against the current column metadata.
    pub fn decode(src: &mut impl Buf, metadata: &ColMetaData) -> Result<Self, ProtocolError> {
        let mut data = bytes::BytesMut::new();

        for col in &metadata.columns {
            capture_column_value(src, col, &mut data)?;
        }

        Ok(Self {
            data: data.freeze(),
        })
    }
}

impl NbcRow {
    /// Decode an NBCROW token body against the current column metadata.
    pub fn decode(src: &mut impl Buf, metadata: &ColMetaData) -> Result<Self, ProtocolError> {
        let col_count = metadata.columns.len();
        let bitmap_len = col_count.div_ceil(8);

        if src.remaining() < bitmap_len {
            return Err(ProtocolError::truncated(bitmap_len, src.remaining()));
        }

        let mut null_bitmap = vec![0u8; bitmap_len];
        for byte in &mut null_bitmap {
            *byte = src.get_u8();
        }

        let mut data = bytes::BytesMut::new();
        for (i, col) in metadata.columns.iter().enumerate() {
            let is_null = (null_bitmap[i / 8] & (1 << (i % 8))) != 0;
            if !is_null {
                capture_column_value(src, col, &mut data)?;
            }
        }

        Ok(Self {
            null_bitmap,
            data: data.freeze(),
        })
    }
}

/// Capture one column value, preserving its length prefix so the value
/// decoder can work from the captured bytes alone. Legacy textptr LOBs are
/// rewritten into PLP form.
fn capture_column_value(
    src: &mut impl Buf,
    col: &ColumnData,
    dst: &mut bytes::BytesMut,
) -> Result<(), ProtocolError> {
    fn need(src: &impl Buf, n: usize) -> Result<(), ProtocolError> {
        if src.remaining() < n {
            Err(ProtocolError::truncated(n, src.remaining()))
        } else {
            Ok(())
        }
    }

    fn copy(src: &mut impl Buf, dst: &mut bytes::BytesMut, n: usize) {
        dst.extend_from_slice(&src.copy_to_bytes(n));
    }

    match col.type_id {
        TypeId::Null => {}

        TypeId::Int1
        | TypeId::Bit
        | TypeId::Int2
        | TypeId::Int4
        | TypeId::Int8
        | TypeId::Float4
        | TypeId::Float8
        | TypeId::Money
        | TypeId::Money4
        | TypeId::DateTime
        | TypeId::DateTime4 => {
            let size = col.type_id.fixed_size().unwrap_or(0);
            need(src, size)?;
            copy(src, dst, size);
        }

        // 1-byte length prefix (0 = NULL for these nullable scalars).
        TypeId::IntN
        | TypeId::BitN
        | TypeId::FloatN
        | TypeId::MoneyN
        | TypeId::DateTimeN
        | TypeId::Guid
        | TypeId::DecimalN
        | TypeId::NumericN
        | TypeId::Date
        | TypeId::Time
        | TypeId::DateTime2
        | TypeId::DateTimeOffset => {
            need(src, 1)?;
            let len = src.get_u8() as usize;
            dst.extend_from_slice(&[len as u8]);
            need(src, len)?;
            copy(src, dst, len);
        }

        // 2-byte length prefix, 0xFFFF = NULL; MAX variants use PLP.
        TypeId::BigVarChar | TypeId::BigVarBinary | TypeId::NVarChar => {
            if col.type_info.max_length == Some(0xFFFF) {
                capture_plp(src, dst)?;
            } else {
                capture_ushortlen(src, dst)?;
            }
        }
        TypeId::BigChar | TypeId::BigBinary | TypeId::NChar => {
            capture_ushortlen(src, dst)?;
        }

        TypeId::Text | TypeId::NText | TypeId::Image => {
            capture_textptr_as_plp(src, dst)?;
        }
    }

    Ok(())
}

/// Capture a 2-byte length-prefixed value (0xFFFF = NULL).
fn capture_ushortlen(src: &mut impl Buf, dst: &mut bytes::BytesMut) -> Result<(), ProtocolError> {
    if src.remaining() < 2 {
        return Err(ProtocolError::truncated(2, src.remaining()));
    }
    let len = src.get_u16_le();
    dst.extend_from_slice(&len.to_le_bytes());
    if len == 0xFFFF {
        return Ok(());
    }
    let len = len as usize;
    if src.remaining() < len {
        return Err(ProtocolError::truncated(len, src.remaining()));
    }
    dst.extend_from_slice(&src.copy_to_bytes(len));
    Ok(())
}

/// Capture a PLP value: 8-byte total length, then chunks of 4-byte length +
/// data until a zero-length terminator.
fn capture_plp(src: &mut impl Buf, dst: &mut bytes::BytesMut) -> Result<(), ProtocolError> {
    if src.remaining() < 8 {
        return Err(ProtocolError::truncated(8, src.remaining()));
    }

    let total_len = src.get_u64_le();
    dst.extend_from_slice(&total_len.to_le_bytes());

    if total_len == 0xFFFF_FFFF_FFFF_FFFF {
        // NULL
        return Ok(());
    }

    loop {
        if src.remaining() < 4 {
            return Err(ProtocolError::truncated(4, src.remaining()));
        }
        let chunk_len = src.get_u32_le();
        dst.extend_from_slice(&chunk_len.to_le_bytes());

        if chunk_len == 0 {
            return Ok(());
        }

        let chunk_len = chunk_len as usize;
        if src.remaining() < chunk_len {
            return Err(ProtocolError::truncated(chunk_len, src.remaining()));
        }
        dst.extend_from_slice(&src.copy_to_bytes(chunk_len));
    }
}

/// Capture a legacy textptr LOB and rewrite it as PLP: a zero textptr
/// length means NULL; otherwise the textptr and timestamp are dropped and
/// the data is emitted as one PLP chunk.
fn capture_textptr_as_plp(
    src: &mut impl Buf,
    dst: &mut bytes::BytesMut,
) -> Result<(), ProtocolError> {
    if src.remaining() < 1 {
        return Err(ProtocolError::truncated(1, src.remaining()));
    }

    let textptr_len = src.get_u8() as usize;
    if textptr_len == 0 {
        dst.extend_from_slice(&0xFFFF_FFFF_FFFF_FFFFu64.to_le_bytes());
        return Ok(());
    }

    if src.remaining() < textptr_len + 8 + 4 {
        return Err(ProtocolError::truncated(textptr_len + 12, src.remaining()));
    }
    src.advance(textptr_len); // textptr
    src.advance(8); // timestamp

    let data_len = src.get_u32_le() as usize;
    if src.remaining() < data_len {
        return Err(ProtocolError::truncated(data_len, src.remaining()));
    }

    dst.extend_from_slice(&(data_len as u64).to_le_bytes());
    dst.extend_from_slice(&(data_len as u32).to_le_bytes());
    dst.extend_from_slice(&src.copy_to_bytes(data_len));
    dst.extend_from_slice(&0u32.to_le_bytes());

    Ok(())
}

impl ReturnValue {
    /// Decode a RETURNVALUE token body.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        if src.remaining() < 2 {
            return Err(ProtocolError::truncated(2, src.remaining()));
        }
        let param_ordinal = src.get_u16_le();

        let param_name = read_b_varchar(src)
            .ok_or_else(|| ProtocolError::truncated(1, src.remaining()))?;

        // Status (1) + user type (4) + flags (2) + type id (1)
        if src.remaining() < 8 {
            return Err(ProtocolError::truncated(8, src.remaining()));
        }
        let _status = src.get_u8();
        let user_type = src.get_u32_le();
        let flags = src.get_u16_le();
        let type_byte = src.get_u8();
        let type_id =
            TypeId::from_u8(type_byte).ok_or(ProtocolError::UnsupportedType(type_byte))?;

        let type_info = decode_type_info(src, type_id)?;

        let mut value = bytes::BytesMut::new();
        let col = ColumnData {
            name: String::new(),
            type_id,
            flags,
            user_type,
            type_info: type_info.clone(),
        };
        capture_column_value(src, &col, &mut value)?;

        Ok(Self {
            param_ordinal,
            param_name,
            type_id,
            type_info,
            value: value.freeze(),
        })
    }
}

fn decode_server_message(
    src: &mut impl Buf,
) -> Result<(i32, u8, u8, String, String, String, i32), ProtocolError> {
    // length (2) + number (4) + state (1) + class (1)
    if src.remaining() < 8 {
        return Err(ProtocolError::truncated(8, src.remaining()));
    }
    let _length = src.get_u16_le();
    let number = src.get_i32_le();
    let state = src.get_u8();
    let class = src.get_u8();

    let message =
        read_us_varchar(src).ok_or_else(|| ProtocolError::truncated(2, src.remaining()))?;
    let server =
        read_b_varchar(src).ok_or_else(|| ProtocolError::truncated(1, src.remaining()))?;
    let procedure =
        read_b_varchar(src).ok_or_else(|| ProtocolError::truncated(1, src.remaining()))?;

    if src.remaining() < 4 {
        return Err(ProtocolError::truncated(4, src.remaining()));
    }
    let line = src.get_i32_le();

    Ok((number, state, class, message, server, procedure, line))
}

impl ServerError {
    /// Decode an ERROR token body.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        let (number, state, class, message, server, procedure, line) =
            decode_server_message(src)?;
        Ok(Self {
            number,
            state,
            class,
            message,
            server,
            procedure,
            line,
        })
    }
}

impl ServerInfo {
    /// Decode an INFO token body.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        let (number, state, class, message, server, procedure, line) =
            decode_server_message(src)?;
        Ok(Self {
            number,
            state,
            class,
            message,
            server,
            procedure,
            line,
        })
    }
}

impl LoginAck {
    /// Decode a LOGINACK token body.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        // length (2) + interface (1) + tds_version (4)
        if src.remaining() < 7 {
            return Err(ProtocolError::truncated(7, src.remaining()));
        }
        let _length = src.get_u16_le();
        let interface = src.get_u8();
        let tds_version = src.get_u32_le();

        let prog_name =
            read_b_varchar(src).ok_or_else(|| ProtocolError::truncated(1, src.remaining()))?;

        if src.remaining() < 4 {
            return Err(ProtocolError::truncated(4, src.remaining()));
        }
        let prog_version = src.get_u32_le();

        Ok(Self {
            interface,
            tds_version,
            prog_name,
            prog_version,
        })
    }
}

impl EnvChange {
    /// Decode an ENVCHANGE token body.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        if src.remaining() < 3 {
            return Err(ProtocolError::truncated(3, src.remaining()));
        }

        let length = src.get_u16_le() as usize;
        if src.remaining() < length {
            return Err(ProtocolError::truncated(length, src.remaining()));
        }

        // Bound the body so over-reads cannot desynchronize the stream.
        let mut body = src.copy_to_bytes(length);
        let env_type = EnvChangeType::from_u8(body.get_u8());

        let (new_value, old_value) = match env_type {
            EnvChangeType::SqlCollation | EnvChangeType::Other(_) => {
                let new_value = read_binary_env_value(&mut body);
                let old_value = read_binary_env_value(&mut body);
                (new_value, old_value)
            }
            _ => {
                let new_value = read_b_varchar(&mut body)
                    .map_or_else(|| EnvChangeValue::String(String::new()), EnvChangeValue::String);
                let old_value = read_b_varchar(&mut body)
                    .map_or_else(|| EnvChangeValue::String(String::new()), EnvChangeValue::String);
                (new_value, old_value)
            }
        };

        Ok(Self {
            env_type,
            new_value,
            old_value,
        })
    }

    /// The new packet size, when this is a packet-size change.
    #[must_use]
    pub fn new_packet_size(&self) -> Option<u32> {
        if self.env_type == EnvChangeType::PacketSize {
            self.new_value.as_str()?.parse().ok()
        } else {
            None
        }
    }

    /// The new database name, when this is a database change.
    #[must_use]
    pub fn new_database(&self) -> Option<&str> {
        if self.env_type == EnvChangeType::Database {
            self.new_value.as_str()
        } else {
            None
        }
    }
}

fn read_binary_env_value(src: &mut impl Buf) -> EnvChangeValue {
    if src.remaining() < 1 {
        return EnvChangeValue::Binary(Bytes::new());
    }
    let len = src.get_u8() as usize;
    if len == 0 || src.remaining() < len {
        return EnvChangeValue::Binary(Bytes::new());
    }
    EnvChangeValue::Binary(src.copy_to_bytes(len))
}

impl Order {
    /// Decode an ORDER token body.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        if src.remaining() < 2 {
            return Err(ProtocolError::truncated(2, src.remaining()));
        }

        let length = src.get_u16_le() as usize;
        if src.remaining() < length {
            return Err(ProtocolError::truncated(length, src.remaining()));
        }

        let mut columns = Vec::with_capacity(length / 2);
        for _ in 0..length / 2 {
            columns.push(src.get_u16_le());
        }

        Ok(Self { columns })
    }
}

// =============================================================================
// Token parser
// =============================================================================

/// Lazy, forward-only parser over one assembled response payload.
///
/// Row tokens need the result set's column metadata to be parsed; pass the
/// most recent `ColMetaData` to
/// [`next_token_with_metadata`](TokenParser::next_token_with_metadata).
pub struct TokenParser {
    data: Bytes,
    position: usize,
}

impl TokenParser {
    /// Create a parser over a message payload.
    #[must_use]
    pub fn new(data: Bytes) -> Self {
        Self { data, position: 0 }
    }

    /// Remaining unparsed bytes.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.position)
    }

    /// Check whether any bytes remain.
    #[must_use]
    pub fn has_remaining(&self) -> bool {
        self.position < self.data.len()
    }

    /// Peek the next token type without consuming it.
    #[must_use]
    pub fn peek_token_type(&self) -> Option<TokenType> {
        self.data
            .get(self.position)
            .and_then(|&b| TokenType::from_u8(b))
    }

    /// Parse the next context-independent token.
    ///
    /// Returns `Ok(None)` at the end of the payload. Row tokens fail
    /// without metadata; use
    /// [`next_token_with_metadata`](TokenParser::next_token_with_metadata)
    /// inside result sets.
    pub fn next_token(&mut self) -> Result<Option<Token>, ProtocolError> {
        self.next_token_with_metadata(None)
    }

    /// Parse the next token, with column metadata context for row tokens.
    pub fn next_token_with_metadata(
        &mut self,
        metadata: Option<&ColMetaData>,
    ) -> Result<Option<Token>, ProtocolError> {
        loop {
            if !self.has_remaining() {
                return Ok(None);
            }

            let start = self.position;
            let mut buf = &self.data[start..];
            let type_byte = buf.get_u8();

            let token = match TokenType::from_u8(type_byte) {
                Some(TokenType::Done) => Token::Done(Done::decode(&mut buf)?),
                Some(TokenType::DoneProc) => Token::DoneProc(Done::decode(&mut buf)?),
                Some(TokenType::DoneInProc) => Token::DoneInProc(Done::decode(&mut buf)?),
                Some(TokenType::Error) => Token::Error(ServerError::decode(&mut buf)?),
                Some(TokenType::Info) => Token::Info(ServerInfo::decode(&mut buf)?),
                Some(TokenType::LoginAck) => Token::LoginAck(LoginAck::decode(&mut buf)?),
                Some(TokenType::EnvChange) => Token::EnvChange(EnvChange::decode(&mut buf)?),
                Some(TokenType::Order) => Token::Order(Order::decode(&mut buf)?),
                Some(TokenType::ReturnValue) => {
                    Token::ReturnValue(ReturnValue::decode(&mut buf)?)
                }
                Some(TokenType::ReturnStatus) => {
                    if buf.remaining() < 4 {
                        return Err(ProtocolError::truncated(4, buf.remaining()));
                    }
                    Token::ReturnStatus(buf.get_i32_le())
                }
                Some(TokenType::ColMetaData) => Token::ColMetaData(ColMetaData::decode(&mut buf)?),
                Some(TokenType::Row) => {
                    let meta = metadata.ok_or(ProtocolError::MalformedToken(
                        "row token before column metadata",
                    ))?;
                    Token::Row(RawRow::decode(&mut buf, meta)?)
                }
                Some(TokenType::NbcRow) => {
                    let meta = metadata.ok_or(ProtocolError::MalformedToken(
                        "row token before column metadata",
                    ))?;
                    Token::NbcRow(NbcRow::decode(&mut buf, meta)?)
                }
                Some(TokenType::ColInfo) | Some(TokenType::TabName) => {
                    // Known but uninteresting: skip via the length prefix.
                    Self::skip_length_prefixed(&mut buf)?;
                    self.position = start + (self.data.len() - start - buf.remaining());
                    continue;
                }
                None => {
                    // Skippable-extension fallback: an unknown token with
                    // the high bit set declares its length in the next two
                    // bytes. Anything else means the stream has drifted.
                    if type_byte & 0x80 != 0 {
                        Self::skip_length_prefixed(&mut buf)?;
                        self.position = start + (self.data.len() - start - buf.remaining());
                        continue;
                    }
                    return Err(ProtocolError::UnknownToken(type_byte));
                }
            };

            let consumed = self.data.len() - start - buf.remaining();
            self.position = start + consumed;

            return Ok(Some(token));
        }
    }

    fn skip_length_prefixed(buf: &mut &[u8]) -> Result<(), ProtocolError> {
        if buf.remaining() < 2 {
            return Err(ProtocolError::truncated(2, buf.remaining()));
        }
        let length = buf.get_u16_le() as usize;
        if buf.remaining() < length {
            return Err(ProtocolError::truncated(length, buf.remaining()));
        }
        buf.advance(length);
        Ok(())
    }

    /// Current byte position within the payload.
    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    fn int4_metadata(name: &str) -> Vec<u8> {
        let mut buf = BytesMut::new();
        buf.put_u8(TokenType::ColMetaData as u8);
        buf.put_u16_le(1); // one column
        buf.put_u32_le(0); // user type
        buf.put_u16_le(0); // flags
        buf.put_u8(TypeId::Int4 as u8);
        crate::codec::write_b_varchar(&mut buf, name);
        buf.to_vec()
    }

    #[test]
    fn done_roundtrip() {
        let done = Done {
            status: DoneStatus {
                count: true,
                ..Default::default()
            },
            cur_cmd: 193,
            row_count: 42,
        };

        let mut buf = BytesMut::new();
        done.encode(TokenType::Done, &mut buf);

        let mut cursor = &buf[1..];
        let decoded = Done::decode(&mut cursor).unwrap();
        assert!(decoded.status.count);
        assert_eq!(decoded.cur_cmd, 193);
        assert_eq!(decoded.row_count, 42);
    }

    #[test]
    fn done_status_bits_roundtrip() {
        let status = DoneStatus {
            more: true,
            error: true,
            attention: true,
            ..Default::default()
        };
        let restored = DoneStatus::from_bits(status.to_bits());
        assert!(restored.more);
        assert!(restored.error);
        assert!(restored.attention);
        assert!(!restored.count);
    }

    #[test]
    fn parse_done_token() {
        let data = Bytes::from_static(&[
            0xFD, // DONE
            0x10, 0x00, // status: count valid
            0xC1, 0x00, // cur_cmd
            0x05, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // row_count: 5
        ]);

        let mut parser = TokenParser::new(data);
        match parser.next_token().unwrap().unwrap() {
            Token::Done(done) => {
                assert_eq!(done.row_count, 5);
                assert!(done.status.count);
                assert!(!done.has_more());
            }
            other => panic!("expected Done, got {other:?}"),
        }
        assert!(parser.next_token().unwrap().is_none());
    }

    #[test]
    fn parse_metadata_then_row() {
        let mut raw = int4_metadata("id");
        // ROW with a single INT4 value 7
        raw.push(TokenType::Row as u8);
        raw.extend_from_slice(&7i32.to_le_bytes());

        let mut parser = TokenParser::new(Bytes::from(raw));
        let meta = match parser.next_token().unwrap().unwrap() {
            Token::ColMetaData(meta) => meta,
            other => panic!("expected ColMetaData, got {other:?}"),
        };
        assert_eq!(meta.column_count(), 1);
        assert_eq!(meta.columns[0].name, "id");
        assert_eq!(meta.columns[0].type_id, TypeId::Int4);

        match parser.next_token_with_metadata(Some(&meta)).unwrap().unwrap() {
            Token::Row(row) => assert_eq!(&row.data[..], &7i32.to_le_bytes()),
            other => panic!("expected Row, got {other:?}"),
        }
    }

    #[test]
    fn row_without_metadata_is_rejected() {
        let raw = vec![TokenType::Row as u8, 1, 0, 0, 0];
        let mut parser = TokenParser::new(Bytes::from(raw));
        assert!(parser.next_token().is_err());
    }

    #[test]
    fn nbcrow_null_bitmap() {
        // Two nullable INT4 columns; second is NULL.
        let mut raw = BytesMut::new();
        raw.put_u8(TokenType::ColMetaData as u8);
        raw.put_u16_le(2);
        for name in ["a", "b"] {
            raw.put_u32_le(0);
            raw.put_u16_le(0x0001);
            raw.put_u8(TypeId::IntN as u8);
            raw.put_u8(4); // max length
            crate::codec::write_b_varchar(&mut raw, name);
        }
        raw.put_u8(TokenType::NbcRow as u8);
        raw.put_u8(0b0000_0010); // column 1 NULL
        raw.put_u8(4); // value length for column 0
        raw.put_i32_le(11);

        let mut parser = TokenParser::new(raw.freeze());
        let meta = match parser.next_token().unwrap().unwrap() {
            Token::ColMetaData(meta) => meta,
            other => panic!("expected ColMetaData, got {other:?}"),
        };
        match parser.next_token_with_metadata(Some(&meta)).unwrap().unwrap() {
            Token::NbcRow(row) => {
                assert!(!row.is_null(0));
                assert!(row.is_null(1));
                assert_eq!(&row.data[..], &[4, 11, 0, 0, 0]);
            }
            other => panic!("expected NbcRow, got {other:?}"),
        }
    }

    #[test]
    fn error_token_fields() {
        let mut raw = BytesMut::new();
        raw.put_u8(TokenType::Error as u8);

        let mut body = BytesMut::new();
        body.put_i32_le(18456);
        body.put_u8(1); // state
        body.put_u8(14); // class
        crate::codec::write_us_varchar(&mut body, "Login failed for user 'sa'.");
        crate::codec::write_b_varchar(&mut body, "testsrv");
        crate::codec::write_b_varchar(&mut body, "");
        body.put_i32_le(1);

        raw.put_u16_le(body.len() as u16);
        raw.extend_from_slice(&body);

        let mut parser = TokenParser::new(raw.freeze());
        match parser.next_token().unwrap().unwrap() {
            Token::Error(err) => {
                assert_eq!(err.number, 18456);
                assert_eq!(err.class, 14);
                assert!(!err.is_fatal());
                assert_eq!(err.server, "testsrv");
            }
            other => panic!("expected Error, got {other:?}"),
        }
    }

    #[test]
    fn env_change_packet_size() {
        let mut raw = BytesMut::new();
        raw.put_u8(TokenType::EnvChange as u8);

        let mut body = BytesMut::new();
        body.put_u8(4); // packet size change
        crate::codec::write_b_varchar(&mut body, "8192");
        crate::codec::write_b_varchar(&mut body, "4096");

        raw.put_u16_le(body.len() as u16);
        raw.extend_from_slice(&body);

        let mut parser = TokenParser::new(raw.freeze());
        match parser.next_token().unwrap().unwrap() {
            Token::EnvChange(env) => {
                assert_eq!(env.env_type, EnvChangeType::PacketSize);
                assert_eq!(env.new_packet_size(), Some(8192));
            }
            other => panic!("expected EnvChange, got {other:?}"),
        }
    }

    #[test]
    fn login_ack_roundtrip() {
        let mut raw = BytesMut::new();
        raw.put_u8(TokenType::LoginAck as u8);

        let mut body = BytesMut::new();
        body.put_u8(1); // interface
        body.put_u32_le(0x74000004);
        crate::codec::write_b_varchar(&mut body, "Microsoft SQL Server");
        body.put_u32_le(0x10000000);

        raw.put_u16_le(body.len() as u16);
        raw.extend_from_slice(&body);

        let mut parser = TokenParser::new(raw.freeze());
        match parser.next_token().unwrap().unwrap() {
            Token::LoginAck(ack) => {
                assert_eq!(ack.version(), crate::version::TdsVersion::V7_4);
                assert_eq!(ack.prog_name, "Microsoft SQL Server");
            }
            other => panic!("expected LoginAck, got {other:?}"),
        }
    }

    #[test]
    fn skippable_extension_token() {
        // 0xE4 (unknown here, high bit set) with a 3-byte body, then DONE.
        let mut raw = BytesMut::new();
        raw.put_u8(0xE4);
        raw.put_u16_le(3);
        raw.extend_from_slice(&[0xAB, 0xCD, 0xEF]);
        Done {
            status: DoneStatus::default(),
            cur_cmd: 0,
            row_count: 0,
        }
        .encode(TokenType::Done, &mut raw);

        let mut parser = TokenParser::new(raw.freeze());
        assert!(matches!(
            parser.next_token().unwrap(),
            Some(Token::Done(_))
        ));
    }

    #[test]
    fn unknown_low_token_is_fatal() {
        let raw = Bytes::from_static(&[0x42, 0x00, 0x00]);
        let mut parser = TokenParser::new(raw);
        assert_eq!(
            parser.next_token().unwrap_err(),
            ProtocolError::UnknownToken(0x42)
        );
    }

    #[test]
    fn plp_value_capture() {
        // NVARCHAR(MAX) column, one row whose value arrives in two chunks.
        let mut raw = BytesMut::new();
        raw.put_u8(TokenType::ColMetaData as u8);
        raw.put_u16_le(1);
        raw.put_u32_le(0);
        raw.put_u16_le(0x0001);
        raw.put_u8(TypeId::NVarChar as u8);
        raw.put_u16_le(0xFFFF); // MAX
        raw.extend_from_slice(&[0x09, 0x04, 0xD0, 0x00, 0x34]); // collation
        crate::codec::write_b_varchar(&mut raw, "doc");

        raw.put_u8(TokenType::Row as u8);
        raw.put_u64_le(8); // total length
        raw.put_u32_le(4);
        raw.extend_from_slice(&[b'a', 0, b'b', 0]);
        raw.put_u32_le(4);
        raw.extend_from_slice(&[b'c', 0, b'd', 0]);
        raw.put_u32_le(0); // terminator

        let mut parser = TokenParser::new(raw.freeze());
        let meta = match parser.next_token().unwrap().unwrap() {
            Token::ColMetaData(meta) => meta,
            other => panic!("expected ColMetaData, got {other:?}"),
        };
        match parser.next_token_with_metadata(Some(&meta)).unwrap().unwrap() {
            Token::Row(row) => {
                // 8 total + (4 + 4) + (4 + 4) + 4 terminator
                assert_eq!(row.data.len(), 28);
            }
            other => panic!("expected Row, got {other:?}"),
        }
    }

    #[test]
    fn truncated_row_reports_shortfall() {
        let mut raw = int4_metadata("n");
        raw.push(TokenType::Row as u8);
        raw.extend_from_slice(&[0x01, 0x02]); // 2 of 4 bytes

        let mut parser = TokenParser::new(Bytes::from(raw));
        let meta = match parser.next_token().unwrap().unwrap() {
            Token::ColMetaData(meta) => meta,
            other => panic!("expected ColMetaData, got {other:?}"),
        };
        let err = parser.next_token_with_metadata(Some(&meta)).unwrap_err();
        assert!(err.is_recoverable());
    }
}
