//! # Patch Application
//!
//! Applies [`Patch`]es to a `serde_json::Value` tree.
//!
//! - `add` on an object inserts or overwrites the key; on an array it inserts
//!   at the index (`-` appends)
//! - `remove` requires the target to exist
//! - `replace` requires the target to exist; the empty path replaces the root

use serde_json::Value;

use crate::pointer::{format_pointer, parse_pointer};
use crate::{Patch, PatchError, PatchOp};

/// Apply one patch, returning the value previously stored at its path.
pub fn apply_patch(doc: &mut Value, patch: &Patch) -> Result<Option<Value>, PatchError> {
    let path = parse_pointer(&patch.path)?;

    match patch.op {
        PatchOp::Add => apply_add(doc, &patch.path, &path, required_value(patch)?),
        PatchOp::Remove => apply_remove(doc, &patch.path, &path).map(Some),
        PatchOp::Replace => apply_replace(doc, &patch.path, &path, required_value(patch)?).map(Some),
    }
}

/// Apply patches in order. Either every patch applies or `doc` is left untouched.
pub fn apply_patches(doc: &mut Value, patches: &[Patch]) -> Result<(), PatchError> {
    let mut next = doc.clone();
    for patch in patches {
        apply_patch(&mut next, patch)?;
    }
    *doc = next;
    Ok(())
}

/// Apply inverse patches in reverse order, undoing the patches they pair with.
pub fn revert_patches(doc: &mut Value, inverse_patches: &[Patch]) -> Result<(), PatchError> {
    let mut next = doc.clone();
    for patch in inverse_patches.iter().rev() {
        apply_patch(&mut next, patch)?;
    }
    *doc = next;
    Ok(())
}

fn required_value(patch: &Patch) -> Result<Value, PatchError> {
    patch
        .value
        .clone()
        .ok_or_else(|| PatchError::MissingValue(patch.path.clone()))
}

fn parent_mut<'a>(
    doc: &'a mut Value,
    pointer: &str,
    path: &'a [String],
) -> Result<(&'a mut Value, &'a str), PatchError> {
    let (key, parent_path) = path
        .split_last()
        .ok_or_else(|| PatchError::InvalidTarget(pointer.to_string()))?;
    let parent = doc
        .pointer_mut(&format_pointer(parent_path))
        .ok_or_else(|| PatchError::NotFound(pointer.to_string()))?;
    Ok((parent, key.as_str()))
}

fn array_index(pointer: &str, key: &str) -> Result<usize, PatchError> {
    key.parse::<usize>()
        .map_err(|_| PatchError::InvalidIndex(pointer.to_string()))
}

fn apply_add(
    doc: &mut Value,
    pointer: &str,
    path: &[String],
    value: Value,
) -> Result<Option<Value>, PatchError> {
    if path.is_empty() {
        return Ok(Some(std::mem::replace(doc, value)));
    }

    let (parent, key) = parent_mut(doc, pointer, path)?;
    match parent {
        Value::Object(map) => Ok(map.insert(key.to_string(), value)),
        Value::Array(items) => {
            if key == "-" {
                items.push(value);
                return Ok(None);
            }
            let index = array_index(pointer, key)?;
            if index > items.len() {
                return Err(PatchError::InvalidIndex(pointer.to_string()));
            }
            items.insert(index, value);
            Ok(None)
        }
        _ => Err(PatchError::InvalidTarget(pointer.to_string())),
    }
}

fn apply_remove(doc: &mut Value, pointer: &str, path: &[String]) -> Result<Value, PatchError> {
    let (parent, key) = parent_mut(doc, pointer, path)?;
    match parent {
        Value::Object(map) => map
            .remove(key)
            .ok_or_else(|| PatchError::NotFound(pointer.to_string())),
        Value::Array(items) => {
            let index = array_index(pointer, key)?;
            if index >= items.len() {
                return Err(PatchError::NotFound(pointer.to_string()));
            }
            Ok(items.remove(index))
        }
        _ => Err(PatchError::InvalidTarget(pointer.to_string())),
    }
}

fn apply_replace(
    doc: &mut Value,
    pointer: &str,
    path: &[String],
    value: Value,
) -> Result<Value, PatchError> {
    if path.is_empty() {
        return Ok(std::mem::replace(doc, value));
    }

    let (parent, key) = parent_mut(doc, pointer, path)?;
    match parent {
        Value::Object(map) => match map.get_mut(key) {
            Some(slot) => Ok(std::mem::replace(slot, value)),
            None => Err(PatchError::NotFound(pointer.to_string())),
        },
        Value::Array(items) => {
            let index = array_index(pointer, key)?;
            match items.get_mut(index) {
                Some(slot) => Ok(std::mem::replace(slot, value)),
                None => Err(PatchError::NotFound(pointer.to_string())),
            }
        }
        _ => Err(PatchError::InvalidTarget(pointer.to_string())),
    }
}
