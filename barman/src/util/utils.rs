//! Utility functions for value conversion and call timeouts.
//!
//! Provides helpers for converting between bus variants and
//! [`PropertyValue`], and for bounding a remote call by a timeout.

use futures::{FutureExt, select};
use futures_timer::Delay;
use log::warn;
use std::collections::HashMap;
use std::future::Future;
use std::pin::pin;
use std::time::Duration;
use zvariant::{ObjectPath, OwnedValue, Value};

use crate::Result;
use crate::api::models::BarmanError;
use crate::core::directory::PropertyMap;
use crate::core::value::PropertyValue;

/// Runs `call`, failing with [`BarmanError::Timeout`] if it has not finished
/// after `limit`. With no limit the call is awaited as is.
pub(crate) async fn with_timeout<F, T>(limit: Option<Duration>, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let Some(limit) = limit else {
        return call.await;
    };

    // runtime-agnostic
    let mut timeout_delay = pin!(Delay::new(limit).fuse());
    let mut call = pin!(call.fuse());

    select! {
        _ = timeout_delay => {
            warn!("Call timed out after {limit:?}");
            Err(BarmanError::Timeout(limit))
        }
        result = call => result,
    }
}

/// Converts a received variant into a [`PropertyValue`].
///
/// Returns `None` for shapes barman never sends (signed and wide integers,
/// structures, file descriptors).
pub(crate) fn property_value(value: &Value<'_>) -> Option<PropertyValue> {
    match value {
        Value::Bool(b) => Some(PropertyValue::Bool(*b)),
        Value::U8(b) => Some(PropertyValue::Byte(*b)),
        Value::U16(n) => u8::try_from(*n).ok().map(PropertyValue::Byte),
        Value::Str(s) => Some(PropertyValue::Str(s.as_str().to_owned())),
        Value::ObjectPath(p) => Some(PropertyValue::Str(p.as_str().to_owned())),
        Value::Value(inner) => property_value(inner),
        Value::Array(array) => {
            let mut strings = Vec::with_capacity(array.len());
            let mut paths = false;
            for item in array.iter() {
                match item {
                    Value::Str(s) => strings.push(s.as_str().to_owned()),
                    Value::ObjectPath(p) => {
                        paths = true;
                        strings.push(p.as_str().to_owned());
                    }
                    _ => return None,
                }
            }
            Some(if paths {
                PropertyValue::PathList(strings)
            } else {
                PropertyValue::StrList(strings)
            })
        }
        Value::Dict(dict) => {
            let mut map = HashMap::new();
            for (key, value) in dict.iter() {
                let Value::Str(key) = key else {
                    return None;
                };
                if let Some(value) = property_value(value) {
                    map.insert(key.as_str().to_owned(), value);
                }
            }
            Some(PropertyValue::Dict(map))
        }
        _ => None,
    }
}

/// Converts a `GetProperties` reply, dropping (and logging) values of an
/// unsupported shape.
pub(crate) fn property_map(raw: HashMap<String, OwnedValue>) -> PropertyMap {
    raw.into_iter()
        .filter_map(|(name, value)| match property_value(&value) {
            Some(value) => Some((name, value)),
            None => {
                warn!("Ignoring property {name} with unsupported signature");
                None
            }
        })
        .collect()
}

/// Converts a [`PropertyValue`] into the variant sent with `SetProperty`.
///
/// Lists go out as `as` (or `ao`), dictionaries as `a{ss}`.
pub(crate) fn to_variant(value: &PropertyValue) -> Result<Value<'static>> {
    Ok(match value {
        PropertyValue::Bool(b) => Value::from(*b),
        PropertyValue::Byte(b) => Value::from(*b),
        PropertyValue::Str(s) => Value::from(s.clone()),
        PropertyValue::StrList(list) => Value::from(list.clone()),
        PropertyValue::PathList(list) => {
            let paths = list
                .iter()
                .map(|p| ObjectPath::try_from(p.clone()))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Value::from(paths)
        }
        PropertyValue::Dict(map) => {
            let mut pairs = HashMap::with_capacity(map.len());
            for (key, value) in map {
                let value = value.as_str().ok_or(BarmanError::UnexpectedType {
                    property: "dictionary entry",
                    expected: "string",
                })?;
                pairs.insert(key.clone(), value.to_owned());
            }
            Value::from(pairs)
        }
    })
}
