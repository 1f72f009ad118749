// https://www.w3.org/TR/xpath-functions/#map-functions and
// #array-functions
//
// `map:get`/`array:get` (and `size`) share local names, so the shared
// handlers dispatch on the first argument's type.

use crate::error::{Error, ErrorCode, Result};
use crate::eval::Evaluator;
use crate::value::{MapKey, XPathArray, XPathMap, XPathVal};

use super::BuiltinFunction;

fn require_key(value: &XPathVal) -> Result<MapKey> {
    MapKey::from_value(value).ok_or_else(|| {
        Error::with_message(ErrorCode::XPTY0004, "map keys must be atomic values")
    })
}

fn get(_eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    match &args[0] {
        XPathVal::Map(map) => {
            let key = require_key(&args[1])?;
            Ok(map.get(&key).cloned().unwrap_or(XPathVal::Empty))
        }
        XPathVal::Array(array) => {
            let index = args[1].to_number();
            if index.fract() != 0.0 || index < 1.0 || index as usize > array.len() {
                return Err(Error::with_message(
                    ErrorCode::FOAY0001,
                    format!("array index {index} out of bounds"),
                ));
            }
            Ok(array.members[index as usize - 1].clone())
        }
        _ => Err(Error::with_message(
            ErrorCode::XPTY0004,
            "get requires a map or an array",
        )),
    }
}

fn size(_eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    match &args[0] {
        XPathVal::Map(map) => Ok(XPathVal::Number(map.len() as f64)),
        XPathVal::Array(array) => Ok(XPathVal::Number(array.len() as f64)),
        _ => Err(Error::with_message(
            ErrorCode::XPTY0004,
            "size requires a map or an array",
        )),
    }
}

fn keys(_eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    let XPathVal::Map(map) = &args[0] else {
        return Err(Error::with_message(
            ErrorCode::XPTY0004,
            "keys requires a map",
        ));
    };
    let keys: Vec<XPathVal> = map
        .entries
        .iter()
        .map(|(key, _)| match key {
            MapKey::String(text) => XPathVal::String(text.clone()),
            MapKey::Number(number) => XPathVal::Number(number.0),
            MapKey::Boolean(flag) => XPathVal::Boolean(*flag),
        })
        .collect();
    Ok(XPathVal::concatenate(keys))
}

// map:contains shares its local name with fn:contains; the string
// module's handler dispatches here for map arguments
pub(super) fn map_contains(map: &XPathMap, key: &XPathVal) -> Result<XPathVal> {
    let key = require_key(key)?;
    Ok(XPathVal::Boolean(map.get(&key).is_some()))
}

fn entry(_eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    let key = require_key(&args[0])?;
    let mut map = XPathMap::default();
    map.insert(key, args[1].clone());
    Ok(XPathVal::Map(map))
}

fn put(_eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    let XPathVal::Map(map) = &args[0] else {
        return Err(Error::with_message(
            ErrorCode::XPTY0004,
            "put requires a map",
        ));
    };
    let key = require_key(&args[1])?;
    let mut updated = map.clone();
    updated.insert(key, args[2].clone());
    Ok(XPathVal::Map(updated))
}

fn append(_eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    let XPathVal::Array(array) = &args[0] else {
        return Err(Error::with_message(
            ErrorCode::XPTY0004,
            "append requires an array",
        ));
    };
    let mut updated: XPathArray = array.clone();
    updated.members.push(args[1].clone());
    Ok(XPathVal::Array(updated))
}

fn flatten(_eval: &mut Evaluator, args: Vec<XPathVal>) -> Result<XPathVal> {
    fn collect(value: &XPathVal, into: &mut Vec<XPathVal>) {
        match value {
            XPathVal::Array(array) => {
                for member in &array.members {
                    collect(member, into);
                }
            }
            XPathVal::Sequence(items) => {
                for item in items {
                    collect(item, into);
                }
            }
            XPathVal::Empty => {}
            other => into.push(other.clone()),
        }
    }
    let mut items = Vec::new();
    collect(&args[0], &mut items);
    Ok(XPathVal::concatenate(items))
}

pub(crate) fn functions() -> Vec<BuiltinFunction> {
    vec![
        BuiltinFunction::new("get", 2, 2, get),
        BuiltinFunction::new("size", 1, 1, size),
        BuiltinFunction::new("keys", 1, 1, keys),
        BuiltinFunction::new("entry", 2, 2, entry),
        BuiltinFunction::new("put", 3, 3, put),
        BuiltinFunction::new("append", 2, 2, append),
        BuiltinFunction::new("flatten", 1, 1, flatten),
    ]
}
