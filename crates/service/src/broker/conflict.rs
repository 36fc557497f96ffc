use std::collections::HashMap;
use std::hash::Hash;

/// True when `key` is already registered with a value different from `candidate`.
///
/// An identical repeat is not a conflict: re-provisioning or re-binding with
/// the exact same request is accepted.
pub fn conflicts<K, V, Q>(map: &HashMap<K, V>, key: &Q, candidate: &V) -> bool
where
    K: Eq + Hash + std::borrow::Borrow<Q>,
    Q: Eq + Hash + ?Sized,
    V: PartialEq,
{
    map.get(key).is_some_and(|existing| existing != candidate)
}
