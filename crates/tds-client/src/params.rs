//! Mapping of parameter values to RPC parameters.

use tds_values::{SqlValue, encode::encode_value};
use tds_wire::rpc::{RpcParam, RpcTypeInfo};

use crate::error::Result;

/// Map positional parameter values to `sp_executesql` parameters named
/// `@p1..@pN`.
pub(crate) fn to_rpc_params(values: &[SqlValue]) -> Result<Vec<RpcParam>> {
    values
        .iter()
        .enumerate()
        .map(|(i, value)| to_rpc_param(format!("@p{}", i + 1), value))
        .collect()
}

fn to_rpc_param(name: String, value: &SqlValue) -> Result<RpcParam> {
    let type_info = match value {
        // Untyped NULL travels as a unit-length NVARCHAR.
        SqlValue::Null => RpcTypeInfo::nvarchar(1),
        SqlValue::Bool(_) => RpcTypeInfo::bit(),
        SqlValue::TinyInt(_) => RpcTypeInfo::intn(1),
        SqlValue::SmallInt(_) => RpcTypeInfo::intn(2),
        SqlValue::Int(_) => RpcTypeInfo::intn(4),
        SqlValue::BigInt(_) => RpcTypeInfo::intn(8),
        SqlValue::Float(_) => RpcTypeInfo::floatn(4),
        SqlValue::Double(_) => RpcTypeInfo::floatn(8),
        SqlValue::Decimal(v) => RpcTypeInfo::decimal(28, v.scale() as u8),
        SqlValue::String(v) => {
            return Ok(RpcParam::nvarchar(name, v));
        }
        SqlValue::Binary(v) => {
            if v.len() > 8000 {
                RpcTypeInfo::varbinary_max()
            } else {
                RpcTypeInfo::varbinary(v.len() as u16)
            }
        }
        SqlValue::Date(_) => RpcTypeInfo::date(),
        SqlValue::Time(_) => RpcTypeInfo::time(7),
        SqlValue::DateTime(_) => RpcTypeInfo::datetime(),
        SqlValue::DateTimeOffset(_) => RpcTypeInfo {
            type_id: 0x2B,
            max_length: None,
            precision: None,
            scale: Some(7),
            collation: None,
        },
    };

    if value.is_null() {
        return Ok(RpcParam::null(name, type_info));
    }

    let encoded = encode_value(value)?;
    Ok(RpcParam::new(name, type_info, encoded))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn positional_names() {
        let params =
            to_rpc_params(&[SqlValue::Int(1), SqlValue::String("x".to_string())]).unwrap();
        assert_eq!(params.len(), 2);
        assert_eq!(params[0].name, "@p1");
        assert_eq!(params[1].name, "@p2");
    }

    #[test]
    fn null_has_no_value() {
        let params = to_rpc_params(&[SqlValue::Null]).unwrap();
        assert!(params[0].value.is_none());
    }

    #[test]
    fn int_width_mapping() {
        let params = to_rpc_params(&[SqlValue::BigInt(1)]).unwrap();
        assert_eq!(params[0].type_info.max_length, Some(8));
        assert_eq!(params[0].type_info.declaration(), "bigint");
    }

    #[test]
    fn decimal_scale_travels() {
        let value = SqlValue::Decimal(rust_decimal::Decimal::new(12345, 3));
        let params = to_rpc_params(&[value]).unwrap();
        assert_eq!(params[0].type_info.scale, Some(3));
    }
}
