//! Replacer / Transform Pipeline (spec 4.3).
//!
//! Restructured from the teacher's eager whole-tree `transform_children`
//! pass into a single per-node function invoked from inside `submit()` at
//! the moment a value is actually visited. This is required rather than
//! stylistic: sections 1-2 describe async sub-sources whose children don't
//! exist yet when their parent is first submitted, so there is no whole
//! tree to walk up front.

use crate::error::{EncodeError, Result};
use crate::options::Replacer;
use crate::value::Value;

const MAX_TO_JSON_CHAIN: usize = 64;

/// Apply the `toJSON` hook (repeatedly, in case a hook resolves to another
/// `Custom` value) and then the user replacer, in that order, per spec 4.3.
pub(crate) fn resolve_value(
    key: &str,
    mut value: Value,
    replacer: Option<&Replacer>,
) -> Result<Value> {
    let mut resolved = false;
    for _ in 0..MAX_TO_JSON_CHAIN {
        let Value::Custom(hook) = value else {
            resolved = true;
            break;
        };
        value = hook.to_json(key)?;
    }
    if !resolved {
        // A `toJSON` hook that keeps resolving to another `Custom` value
        // (the direct analogue of a hook returning `this`, spec 9's known
        // hazard) never reaches a classifiable value. Surfacing this as a
        // typed error keeps `classify::classify`'s `Value::Custom` arm
        // genuinely unreachable rather than a latent panic.
        return Err(EncodeError::unsupported_type(
            "toJSON hook chain did not resolve to a value after the maximum chain length",
        ));
    }

    if let Some(Replacer::Transform(transform)) = replacer {
        value = match transform(key, &value)? {
            Some(replaced) => replaced,
            None => Value::undefined(),
        };
    }

    Ok(value)
}

/// Filter an object's entries to the allow-list's own keys, in the
/// allow-list's own order (spec 4.3's two replacer shapes; the Open
/// Question on ordering is resolved in favor of allow-list order — see
/// DESIGN.md).
pub(crate) fn filter_object_entries(
    entries: Vec<(String, Value)>,
    replacer: Option<&Replacer>,
) -> Vec<(String, Value)> {
    let Some(Replacer::Keys(keys)) = replacer else {
        return entries;
    };
    keys.iter()
        .filter_map(|wanted| {
            entries
                .iter()
                .find(|(key, _)| key == wanted)
                .map(|(_, value)| (wanted.clone(), value.clone()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_replacer_passes_value_through() {
        let resolved = resolve_value("k", Value::from(1.0), None).unwrap();
        assert!(matches!(resolved, Value::Primitive(_)));
    }

    #[test]
    fn allow_list_filters_and_reorders() {
        let entries = vec![
            ("a".to_string(), Value::from(1.0)),
            ("b".to_string(), Value::from(2.0)),
            ("c".to_string(), Value::from(3.0)),
        ];
        let replacer = Replacer::Keys(vec!["c".to_string(), "a".to_string()]);
        let filtered = filter_object_entries(entries, Some(&replacer));
        let keys: Vec<&str> = filtered.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["c", "a"]);
    }

    #[test]
    fn transform_none_becomes_undefined() {
        use std::rc::Rc;
        let transform: crate::options::TransformFn = Rc::new(|_, _| Ok(None));
        let replacer = Replacer::Transform(transform);
        let resolved = resolve_value("k", Value::from(1.0), Some(&replacer)).unwrap();
        assert!(matches!(
            resolved,
            Value::Primitive(crate::value::Primitive::Undefined)
        ));
    }

    /// A `toJSON` hook that always resolves to another `Custom` value (the
    /// direct analogue of a hook returning `this`) must surface a typed
    /// error rather than leave a `Custom` value for `classify` to panic on.
    struct AlwaysItself;

    impl crate::value::ToJson for AlwaysItself {
        fn to_json(&self, _key: &str) -> crate::error::Result<Value> {
            Ok(Value::Custom(std::rc::Rc::new(AlwaysItself)))
        }
    }

    #[test]
    fn to_json_chain_that_never_bottoms_out_is_a_typed_error() {
        let value = Value::Custom(std::rc::Rc::new(AlwaysItself));
        let err = resolve_value("k", value, None).unwrap_err();
        assert!(matches!(err, crate::error::EncodeError::UnsupportedType { .. }));
    }
}
