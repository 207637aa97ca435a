//! RPC request encoding.
//!
//! Parameterized statements go through `sp_executesql` (packet type 0x03,
//! well-known procedure id 0x000A): the statement text, a declaration
//! string for the placeholders, and the typed parameter values.

use bytes::{BufMut, Bytes, BytesMut};

use crate::codec::write_utf16_string;
use crate::sql_batch::write_all_headers;

/// Well-known stored procedure IDs addressed without a name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ProcId {
    /// sp_executesql — parameterized statement execution.
    ExecuteSql = 0x000A,
}

/// RPC option flags.
#[derive(Debug, Clone, Copy, Default)]
pub struct RpcOptionFlags {
    /// Recompile the procedure before execution.
    pub with_recompile: bool,
}

impl RpcOptionFlags {
    /// Encode to the wire format (2 bytes).
    #[must_use]
    pub fn encode(&self) -> u16 {
        if self.with_recompile { 0x0001 } else { 0x0000 }
    }
}

/// RPC parameter status flags.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParamFlags {
    /// Parameter is passed by reference (OUTPUT parameter).
    pub by_ref: bool,
}

impl ParamFlags {
    /// Encode to the wire format (1 byte).
    #[must_use]
    pub fn encode(&self) -> u8 {
        if self.by_ref { 0x01 } else { 0x00 }
    }
}

/// Parameter type descriptor for RPC requests.
#[derive(Debug, Clone)]
pub struct RpcTypeInfo {
    /// TDS type byte.
    pub type_id: u8,
    /// Maximum length for variable-length types.
    pub max_length: Option<u16>,
    /// Precision for decimal types.
    pub precision: Option<u8>,
    /// Scale for decimal and time types.
    pub scale: Option<u8>,
    /// Collation bytes for character types.
    pub collation: Option<[u8; 5]>,
}

/// Default collation sent with character parameters
/// (Latin1_General, case-insensitive, accent-sensitive).
const DEFAULT_COLLATION: [u8; 5] = [0x09, 0x04, 0xD0, 0x00, 0x34];

impl RpcTypeInfo {
    fn scalar(type_id: u8, max_length: u16) -> Self {
        Self {
            type_id,
            max_length: Some(max_length),
            precision: None,
            scale: None,
            collation: None,
        }
    }

    /// INTNTYPE of the given width (1/2/4/8).
    #[must_use]
    pub fn intn(width: u16) -> Self {
        Self::scalar(0x26, width)
    }

    /// BITNTYPE.
    #[must_use]
    pub fn bit() -> Self {
        Self::scalar(0x68, 1)
    }

    /// FLTNTYPE of the given width (4/8).
    #[must_use]
    pub fn floatn(width: u16) -> Self {
        Self::scalar(0x6D, width)
    }

    /// NVARCHAR of the given character count (`0xFFFF` length = MAX).
    #[must_use]
    pub fn nvarchar(char_count: u16) -> Self {
        Self {
            type_id: 0xE7,
            max_length: Some(char_count.saturating_mul(2).max(2)),
            precision: None,
            scale: None,
            collation: Some(DEFAULT_COLLATION),
        }
    }

    /// NVARCHAR(MAX).
    #[must_use]
    pub fn nvarchar_max() -> Self {
        Self {
            type_id: 0xE7,
            max_length: Some(0xFFFF),
            precision: None,
            scale: None,
            collation: Some(DEFAULT_COLLATION),
        }
    }

    /// VARBINARY of the given byte count.
    #[must_use]
    pub fn varbinary(byte_count: u16) -> Self {
        Self::scalar(0xA5, byte_count.max(1))
    }

    /// VARBINARY(MAX).
    #[must_use]
    pub fn varbinary_max() -> Self {
        Self::scalar(0xA5, 0xFFFF)
    }

    /// DECIMALN with the given precision and scale.
    #[must_use]
    pub fn decimal(precision: u8, scale: u8) -> Self {
        Self {
            type_id: 0x6A,
            max_length: Some(17),
            precision: Some(precision),
            scale: Some(scale),
            collation: None,
        }
    }

    /// DATETIMEN (8 bytes).
    #[must_use]
    pub fn datetime() -> Self {
        Self::scalar(0x6F, 8)
    }

    /// DATE.
    #[must_use]
    pub fn date() -> Self {
        Self {
            type_id: 0x28,
            max_length: None,
            precision: None,
            scale: None,
            collation: None,
        }
    }

    /// TIME with the given scale.
    #[must_use]
    pub fn time(scale: u8) -> Self {
        Self {
            type_id: 0x29,
            max_length: None,
            precision: None,
            scale: Some(scale),
            collation: None,
        }
    }

    /// DATETIME2 with the given scale.
    #[must_use]
    pub fn datetime2(scale: u8) -> Self {
        Self {
            type_id: 0x2A,
            max_length: None,
            precision: None,
            scale: Some(scale),
            collation: None,
        }
    }

    /// Encode the type descriptor.
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.type_id);

        match self.type_id {
            // 1-byte max length scalars
            0x26 | 0x68 | 0x6D | 0x6F => {
                if let Some(len) = self.max_length {
                    buf.put_u8(len as u8);
                }
            }
            // 2-byte max length, collation for character types
            0xE7 | 0xA5 => {
                if let Some(len) = self.max_length {
                    buf.put_u16_le(len);
                }
                if let Some(collation) = self.collation {
                    buf.put_slice(&collation);
                }
            }
            // Decimal: length + precision + scale
            0x6A | 0x6C => {
                if let Some(len) = self.max_length {
                    buf.put_u8(len as u8);
                }
                if let Some(precision) = self.precision {
                    buf.put_u8(precision);
                }
                if let Some(scale) = self.scale {
                    buf.put_u8(scale);
                }
            }
            // Time types: scale only; DATE: nothing
            0x29..=0x2B => {
                if let Some(scale) = self.scale {
                    buf.put_u8(scale);
                }
            }
            _ => {}
        }
    }

    /// SQL type name used in sp_executesql declarations.
    #[must_use]
    pub fn declaration(&self) -> String {
        match self.type_id {
            0x26 => match self.max_length {
                Some(1) => "tinyint".to_string(),
                Some(2) => "smallint".to_string(),
                Some(8) => "bigint".to_string(),
                _ => "int".to_string(),
            },
            0x68 => "bit".to_string(),
            0x6D => match self.max_length {
                Some(4) => "real".to_string(),
                _ => "float".to_string(),
            },
            0xE7 => {
                if self.max_length == Some(0xFFFF) {
                    "nvarchar(max)".to_string()
                } else {
                    let chars = self.max_length.unwrap_or(8000) / 2;
                    format!("nvarchar({chars})")
                }
            }
            0xA5 => {
                if self.max_length == Some(0xFFFF) {
                    "varbinary(max)".to_string()
                } else {
                    format!("varbinary({})", self.max_length.unwrap_or(8000))
                }
            }
            0x6A | 0x6C => format!(
                "decimal({}, {})",
                self.precision.unwrap_or(18),
                self.scale.unwrap_or(0)
            ),
            0x6F => "datetime".to_string(),
            0x28 => "date".to_string(),
            0x29 => format!("time({})", self.scale.unwrap_or(7)),
            0x2A => format!("datetime2({})", self.scale.unwrap_or(7)),
            _ => "sql_variant".to_string(),
        }
    }
}

/// An RPC parameter: name, flags, type, and raw value bytes.
#[derive(Debug, Clone)]
pub struct RpcParam {
    /// Parameter name (`@pN`; empty for the positional statement params).
    pub name: String,
    /// Status flags.
    pub flags: ParamFlags,
    /// Type information.
    pub type_info: RpcTypeInfo,
    /// Encoded value bytes; `None` sends NULL.
    pub value: Option<Bytes>,
}

impl RpcParam {
    /// Create a parameter with a value.
    pub fn new(name: impl Into<String>, type_info: RpcTypeInfo, value: Bytes) -> Self {
        Self {
            name: name.into(),
            flags: ParamFlags::default(),
            type_info,
            value: Some(value),
        }
    }

    /// Create a NULL parameter.
    pub fn null(name: impl Into<String>, type_info: RpcTypeInfo) -> Self {
        Self {
            name: name.into(),
            flags: ParamFlags::default(),
            type_info,
            value: None,
        }
    }

    /// Create an NVARCHAR parameter from a string.
    pub fn nvarchar(name: impl Into<String>, value: &str) -> Self {
        let mut buf = BytesMut::new();
        write_utf16_string(&mut buf, value);

        let char_len = value.encode_utf16().count();
        let type_info = if char_len > 4000 {
            RpcTypeInfo::nvarchar_max()
        } else {
            RpcTypeInfo::nvarchar(char_len.max(1) as u16)
        };
        Self::new(name, type_info, buf.freeze())
    }

    /// Encode the parameter.
    pub fn encode(&self, buf: &mut BytesMut) {
        // Name as B_VARCHAR
        let name_len = self.name.encode_utf16().count() as u8;
        buf.put_u8(name_len);
        write_utf16_string(buf, &self.name);

        buf.put_u8(self.flags.encode());
        self.type_info.encode(buf);

        match &self.value {
            Some(value) => match self.type_info.type_id {
                // 1-byte length prefix
                0x26 | 0x68 | 0x6D | 0x6F | 0x6A | 0x6C | 0x28 | 0x29 | 0x2A => {
                    buf.put_u8(value.len() as u8);
                    buf.put_slice(value);
                }
                // 2-byte length, or PLP for MAX
                0xE7 | 0xA5 => {
                    if self.type_info.max_length == Some(0xFFFF) {
                        buf.put_u64_le(value.len() as u64);
                        if !value.is_empty() {
                            buf.put_u32_le(value.len() as u32);
                            buf.put_slice(value);
                        }
                        buf.put_u32_le(0); // terminator
                    } else {
                        buf.put_u16_le(value.len() as u16);
                        buf.put_slice(value);
                    }
                }
                _ => {
                    buf.put_u8(value.len() as u8);
                    buf.put_slice(value);
                }
            },
            None => match self.type_info.type_id {
                0xE7 | 0xA5 => {
                    if self.type_info.max_length == Some(0xFFFF) {
                        buf.put_u64_le(0xFFFF_FFFF_FFFF_FFFF); // PLP NULL
                    } else {
                        buf.put_u16_le(0xFFFF);
                    }
                }
                _ => buf.put_u8(0),
            },
        }
    }
}

/// An RPC request addressed by well-known procedure id.
#[derive(Debug, Clone)]
pub struct RpcRequest {
    /// Procedure to invoke.
    pub proc_id: ProcId,
    /// Option flags.
    pub options: RpcOptionFlags,
    /// Parameters, in order.
    pub params: Vec<RpcParam>,
}

impl RpcRequest {
    /// Create an `sp_executesql` request for a parameterized statement.
    ///
    /// The first two parameters are the statement text and the placeholder
    /// declaration string; the caller's parameters follow.
    pub fn execute_sql(sql: &str, params: Vec<RpcParam>) -> Self {
        let mut all_params = Vec::with_capacity(params.len() + 2);
        all_params.push(RpcParam::nvarchar("", sql));

        if !params.is_empty() {
            let declarations = Self::build_declarations(&params);
            all_params.push(RpcParam::nvarchar("", &declarations));
        }

        all_params.extend(params);

        Self {
            proc_id: ProcId::ExecuteSql,
            options: RpcOptionFlags::default(),
            params: all_params,
        }
    }

    fn build_declarations(params: &[RpcParam]) -> String {
        params
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let name = if p.name.is_empty() {
                    format!("@p{}", i + 1)
                } else {
                    p.name.clone()
                };
                format!("{name} {}", p.type_info.declaration())
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Encode the RPC request payload (without the packet header).
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(256);

        write_all_headers(&mut buf);

        // PROCID addressing: 0xFFFF name length, then the id.
        buf.put_u16_le(0xFFFF);
        buf.put_u16_le(self.proc_id as u16);

        buf.put_u16_le(self.options.encode());

        for param in &self.params {
            param.encode(&mut buf);
        }

        buf.freeze()
    }
}
