use std::collections::BTreeMap;

use crate::value::PersistValue;

fn segments(path: &str) -> Vec<&str> {
    path.split('.').filter(|s| !s.is_empty()).collect()
}

pub fn get<'a>(root: &'a PersistValue, path: &str) -> Option<&'a PersistValue> {
    let mut current = root;
    for segment in segments(path) {
        current = current.as_map()?.get(segment)?;
    }
    Some(current)
}

pub fn set(root: &mut PersistValue, path: &str, value: PersistValue) {
    let segs = segments(path);
    if segs.is_empty() {
        *root = value;
        return;
    }
    let mut current = root;
    let (last, parents) = segs.split_last().unwrap();
    for segment in parents {
        if !matches!(current, PersistValue::Map(_)) {
            *current = PersistValue::empty_map();
        }
        let map = match current {
            PersistValue::Map(m) => m,
            _ => unreachable!(),
        };
        current = map
            .entry(segment.to_string())
            .or_insert_with(PersistValue::empty_map);
    }
    if !matches!(current, PersistValue::Map(_)) {
        *current = PersistValue::empty_map();
    }
    let map = match current {
        PersistValue::Map(m) => m,
        _ => unreachable!(),
    };
    map.insert(last.to_string(), value);
}

/// Append `value` to the list at `path`, creating an empty list there first
/// if nothing (or a non-list) is currently present.
pub fn add(root: &mut PersistValue, path: &str, value: PersistValue) {
    let segs = segments(path);
    if segs.is_empty() {
        *root = PersistValue::List(vec![value]);
        return;
    }
    let mut current = root;
    let (last, parents) = segs.split_last().unwrap();
    for segment in parents {
        if !matches!(current, PersistValue::Map(_)) {
            *current = PersistValue::empty_map();
        }
        let map = match current {
            PersistValue::Map(m) => m,
            _ => unreachable!(),
        };
        current = map
            .entry(segment.to_string())
            .or_insert_with(PersistValue::empty_map);
    }
    if !matches!(current, PersistValue::Map(_)) {
        *current = PersistValue::empty_map();
    }
    let map = match current {
        PersistValue::Map(m) => m,
        _ => unreachable!(),
    };
    match map.entry(last.to_string()).or_insert_with(|| PersistValue::List(vec![])) {
        PersistValue::List(list) => list.push(value),
        slot => {
            *slot = PersistValue::List(vec![value]);
        }
    }
}

pub fn remove(root: &mut PersistValue, path: &str) -> Option<PersistValue> {
    let segs = segments(path);
    if segs.is_empty() {
        let old = std::mem::replace(root, PersistValue::empty_map());
        return Some(old);
    }
    let (last, parents) = segs.split_last().unwrap();
    let mut current = root;
    for segment in parents {
        current = match current {
            PersistValue::Map(m) => m.get_mut(*segment)?,
            _ => return None,
        };
    }
    match current {
        PersistValue::Map(m) => m.remove(*last),
        _ => None,
    }
}

pub fn empty_root() -> PersistValue {
    PersistValue::Map(BTreeMap::new())
}
