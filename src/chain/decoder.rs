//! Decodes raw pending extrinsics against the node's runtime metadata.
//!
//! Layout of a v4 extrinsic:
//!   compact(len) ++ version ++ [address ++ signature ++ extra]? ++ call
//! where the signed part is present when the top bit of `version` is set and
//! `extra` is the concatenation of every signed extension's payload.

use crate::chain::value::{account_ss58, render};
use crate::chain::{DecodeError, DecodedCall, ExtrinsicDecoder};
use subxt::ext::codec::{Compact, Decode};
use subxt::ext::scale_value::{self, Composite, Value, ValueDef};
use subxt::Metadata;

const SIGNED_BIT: u8 = 0b1000_0000;
const SUPPORTED_VERSION: u8 = 4;

pub struct MetadataDecoder {
    metadata: Metadata,
}

impl MetadataDecoder {
    pub fn new(metadata: Metadata) -> Self {
        Self { metadata }
    }

    fn decode_part(
        &self,
        cursor: &mut &[u8],
        ty_id: u32,
        part: &'static str,
    ) -> Result<Value<u32>, DecodeError> {
        scale_value::scale::decode_as_type(cursor, ty_id, self.metadata.types()).map_err(|e| {
            DecodeError::Scale {
                part,
                reason: e.to_string(),
            }
        })
    }
}

impl ExtrinsicDecoder for MetadataDecoder {
    fn decode(&self, raw_hex: &str) -> Result<DecodedCall, DecodeError> {
        let bytes = hex::decode(raw_hex.trim_start_matches("0x"))?;
        let mut cursor: &[u8] = &bytes;

        let expected = Compact::<u32>::decode(&mut cursor)
            .map_err(|e| DecodeError::Scale {
                part: "length",
                reason: e.to_string(),
            })?
            .0 as usize;
        if cursor.len() != expected {
            return Err(DecodeError::Length {
                expected,
                actual: cursor.len(),
            });
        }

        let (&version, rest) = cursor
            .split_first()
            .ok_or(DecodeError::UnexpectedShape("version"))?;
        cursor = rest;
        if version & !SIGNED_BIT != SUPPORTED_VERSION {
            return Err(DecodeError::UnsupportedVersion(version));
        }

        let extrinsic = self.metadata.extrinsic();
        let caller = if version & SIGNED_BIT != 0 {
            let address = self.decode_part(&mut cursor, extrinsic.address_ty(), "address")?;
            self.decode_part(&mut cursor, extrinsic.signature_ty(), "signature")?;
            for extension in extrinsic.signed_extensions() {
                self.decode_part(&mut cursor, extension.extra_ty(), "signed extension")?;
            }
            Some(account_ss58(&address).ok_or(DecodeError::UnexpectedShape("address"))?)
        } else {
            None
        };

        let call = self.decode_part(&mut cursor, extrinsic.call_ty(), "call")?;
        if !cursor.is_empty() {
            return Err(DecodeError::TrailingBytes(cursor.len()));
        }

        call_from_value(&call, caller)
    }
}

/// `RuntimeCall` decodes as `Pallet(call_variant { ..fields })`.
fn call_from_value<T>(call: &Value<T>, caller: Option<String>) -> Result<DecodedCall, DecodeError> {
    let ValueDef::Variant(pallet) = &call.value else {
        return Err(DecodeError::UnexpectedShape("call"));
    };
    let inner = match &pallet.values {
        Composite::Unnamed(values) if values.len() == 1 => &values[0],
        _ => return Err(DecodeError::UnexpectedShape("pallet call")),
    };
    let ValueDef::Variant(function) = &inner.value else {
        return Err(DecodeError::UnexpectedShape("pallet call"));
    };

    let args = match &function.values {
        Composite::Named(fields) => fields
            .iter()
            .map(|(name, value)| (name.clone(), render(value)))
            .collect(),
        Composite::Unnamed(fields) => fields
            .iter()
            .enumerate()
            .map(|(i, value)| (i.to_string(), render(value)))
            .collect(),
    };

    Ok(DecodedCall {
        module: pallet.name.clone(),
        function: function.name.clone(),
        caller,
        args,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use subxt::utils::AccountId32;

    #[test]
    fn test_call_from_value() {
        let new_key = [9u8; 32];
        let call = Value::unnamed_variant(
            "SubtensorModule",
            [Value::named_variant(
                "schedule_swap_coldkey",
                [("new_coldkey", Value::unnamed_composite([Value::from_bytes(new_key)]))],
            )],
        );
        let decoded = call_from_value(&call, Some("A".to_string())).unwrap();
        assert!(decoded.is_call("SubtensorModule", "schedule_swap_coldkey"));
        assert_eq!(decoded.caller.as_deref(), Some("A"));
        assert_eq!(
            decoded.arg("new_coldkey"),
            Some(AccountId32(new_key).to_string().as_str())
        );
    }

    #[test]
    fn test_call_from_value_rejects_non_variant() {
        let err = call_from_value(&Value::u128(1), None).unwrap_err();
        assert!(matches!(err, DecodeError::UnexpectedShape("call")));
    }
}
