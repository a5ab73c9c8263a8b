//! Helpers for picking typed data out of dynamically decoded SCALE values.

use subxt::ext::scale_value::{Composite, Primitive, Value, ValueDef};
use subxt::utils::AccountId32;

/// 32 raw bytes of an account, unwrapping `MultiAddress::Id` and newtype
/// wrappers. `None` if the value is not exactly 32 bytes.
pub fn account_bytes<T>(value: &Value<T>) -> Option<[u8; 32]> {
    let mut bytes = Vec::with_capacity(32);
    if !collect_bytes(value, &mut bytes) {
        return None;
    }
    bytes.try_into().ok()
}

fn collect_bytes<T>(value: &Value<T>, out: &mut Vec<u8>) -> bool {
    match &value.value {
        ValueDef::Primitive(Primitive::U128(n)) => match u8::try_from(*n) {
            Ok(b) => {
                out.push(b);
                true
            }
            Err(_) => false,
        },
        ValueDef::Composite(composite) => collect_composite(composite, out),
        // Only a single-field variant such as `MultiAddress::Id(..)` carries an account
        ValueDef::Variant(variant) => {
            composite_len(&variant.values) == 1 && collect_composite(&variant.values, out)
        }
        _ => false,
    }
}

fn collect_composite<T>(composite: &Composite<T>, out: &mut Vec<u8>) -> bool {
    match composite {
        Composite::Named(fields) => fields.iter().all(|(_, v)| collect_bytes(v, out)),
        Composite::Unnamed(fields) => fields.iter().all(|v| collect_bytes(v, out)),
    }
}

fn composite_len<T>(composite: &Composite<T>) -> usize {
    match composite {
        Composite::Named(fields) => fields.len(),
        Composite::Unnamed(fields) => fields.len(),
    }
}

/// SS58 rendering of an account-shaped value.
pub fn account_ss58<T>(value: &Value<T>) -> Option<String> {
    account_bytes(value).map(|b| AccountId32(b).to_string())
}

/// Unsigned integer, looking through single-field newtypes (e.g. `TaoCurrency(u64)`).
pub fn as_u128<T>(value: &Value<T>) -> Option<u128> {
    match &value.value {
        ValueDef::Primitive(Primitive::U128(n)) => Some(*n),
        ValueDef::Composite(Composite::Unnamed(fields)) if fields.len() == 1 => as_u128(&fields[0]),
        ValueDef::Composite(Composite::Named(fields)) if fields.len() == 1 => as_u128(&fields[0].1),
        _ => None,
    }
}

/// Human-readable argument value: accounts as SS58, numbers plain, the rest as
/// scale-value's own notation.
pub fn render<T>(value: &Value<T>) -> String {
    if let Some(account) = account_ss58(value) {
        return account;
    }
    if let Some(n) = as_u128(value) {
        return n.to_string();
    }
    value.to_string()
}
