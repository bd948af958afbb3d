//! # Draft
//!
//! The mutation surface over a tree's JSON state. Each write computes its
//! inverse from the current value, applies the patch, then offers the pair to
//! every attached [`PatchRecorder`].
//!
//! ```rust,ignore
//! let call = CallEnv::root(ids.next_id(), "setTileField");
//! let mut recorder = PatchRecorder::start(&call);
//! let mut draft = Draft::new(&mut state, &mut ids, call);
//! draft.attach(&mut recorder);
//! draft.set("/tiles/t1/content/flag", json!(true))?;
//! ```

use serde_json::Value;

use crate::pointer::{format_pointer, join_pointer, parse_pointer};
use crate::{apply_patch, CallEnv, CallIdGenerator, Patch, PatchError, PatchEvent, PatchOp, PatchRecorder};

pub struct Draft<'a> {
    root: &'a mut Value,
    ids: &'a mut CallIdGenerator,
    current: CallEnv,
    recorders: Vec<&'a mut PatchRecorder>,
    suppressed: usize,
    from_manager: usize,
}

impl<'a> Draft<'a> {
    pub fn new(root: &'a mut Value, ids: &'a mut CallIdGenerator, call: CallEnv) -> Self {
        Self {
            root,
            ids,
            current: call,
            recorders: Vec::new(),
            suppressed: 0,
            from_manager: 0,
        }
    }

    pub fn attach(&mut self, recorder: &'a mut PatchRecorder) {
        self.recorders.push(recorder);
    }

    /// The call mutations are currently attributed to
    pub fn call(&self) -> &CallEnv {
        &self.current
    }

    pub fn root(&self) -> &Value {
        &*self.root
    }

    pub fn get(&self, path: &str) -> Option<&Value> {
        self.root.pointer(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// Add a value. An existing object key is replaced (and recorded as a replace).
    pub fn add(&mut self, path: &str, value: Value) -> Result<(), PatchError> {
        self.add_inner(path, value, false)
    }

    /// Replace an existing value
    pub fn replace(&mut self, path: &str, value: Value) -> Result<(), PatchError> {
        let old = self
            .get(path)
            .cloned()
            .ok_or_else(|| PatchError::NotFound(path.to_string()))?;
        self.commit(Patch::replace(path, value), Patch::replace(path, old), false)
    }

    /// Remove a value, returning it
    pub fn remove(&mut self, path: &str) -> Result<Value, PatchError> {
        if path.is_empty() {
            return Err(PatchError::InvalidTarget(path.to_string()));
        }
        let old = self
            .get(path)
            .cloned()
            .ok_or_else(|| PatchError::NotFound(path.to_string()))?;
        self.commit(Patch::remove(path), Patch::add(path, old.clone()), false)?;
        Ok(old)
    }

    /// Add or replace. Records nothing when the value is unchanged.
    pub fn set(&mut self, path: &str, value: Value) -> Result<(), PatchError> {
        self.set_inner(path, value, false)
    }

    /// Like [`Self::set`], for a non-historical field
    pub fn set_volatile(&mut self, path: &str, value: Value) -> Result<(), PatchError> {
        self.set_inner(path, value, true)
    }

    /// Apply an externally produced patch, deriving its inverse
    pub fn apply(&mut self, patch: &Patch) -> Result<(), PatchError> {
        match patch.op {
            PatchOp::Add => self.add(&patch.path, required(patch)?),
            PatchOp::Remove => self.remove(&patch.path).map(drop),
            PatchOp::Replace => self.replace(&patch.path, required(patch)?),
        }
    }

    /// Run `f` as a child call of the current one
    pub fn nested<R>(&mut self, action: &str, f: impl FnOnce(&mut Self) -> R) -> R {
        let child = self.current.child(self.ids.next_id(), action);
        let parent = std::mem::replace(&mut self.current, child);
        let result = f(self);
        self.current = parent;
        result
    }

    /// Run `f` with recording suppressed: writes land in the tree, no recorder sees them
    pub fn without_undo<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.suppressed += 1;
        let result = f(self);
        self.suppressed -= 1;
        result
    }

    /// Run `f` with writes marked as manager-applied
    pub fn applying_from_manager<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.from_manager += 1;
        let result = f(self);
        self.from_manager -= 1;
        result
    }

    pub fn is_suppressed(&self) -> bool {
        self.suppressed > 0
    }

    fn set_inner(&mut self, path: &str, value: Value, volatile: bool) -> Result<(), PatchError> {
        match self.get(path).cloned() {
            Some(current) if current == value => Ok(()),
            Some(current) => {
                self.commit(Patch::replace(path, value), Patch::replace(path, current), volatile)
            }
            None => self.add_inner(path, value, volatile),
        }
    }

    fn add_inner(&mut self, path: &str, value: Value, volatile: bool) -> Result<(), PatchError> {
        let segments = parse_pointer(path)?;
        let (key, parent_segments) = segments
            .split_last()
            .ok_or_else(|| PatchError::InvalidTarget(path.to_string()))?;
        let parent_path = format_pointer(parent_segments);
        let parent = self
            .get(&parent_path)
            .ok_or_else(|| PatchError::NotFound(path.to_string()))?;

        let (patch, inverse) = match parent {
            Value::Object(map) => match map.get(key) {
                Some(old) => (Patch::replace(path, value), Patch::replace(path, old.clone())),
                None => (Patch::add(path, value), Patch::remove(path)),
            },
            Value::Array(items) => {
                let index = if key == "-" {
                    items.len()
                } else {
                    key.parse::<usize>()
                        .map_err(|_| PatchError::InvalidIndex(path.to_string()))?
                };
                if index > items.len() {
                    return Err(PatchError::InvalidIndex(path.to_string()));
                }
                let concrete = join_pointer(&parent_path, &index.to_string());
                (Patch::add(concrete.clone(), value), Patch::remove(concrete))
            }
            _ => return Err(PatchError::InvalidTarget(path.to_string())),
        };

        self.commit(patch, inverse, volatile)
    }

    fn commit(&mut self, patch: Patch, inverse: Patch, volatile: bool) -> Result<(), PatchError> {
        apply_patch(&mut *self.root, &patch)?;

        let event = PatchEvent {
            patch: &patch,
            inverse: &inverse,
            origin: &self.current,
            suppressed: self.suppressed > 0,
            volatile,
            from_manager: self.from_manager > 0,
        };

        let mut accepted = 0;
        for recorder in self.recorders.iter_mut() {
            if recorder.observe(&event) {
                accepted += 1;
            }
        }

        tracing::trace!(path = %patch.path, call = %self.current.id, accepted, "draft write");
        Ok(())
    }
}

fn required(patch: &Patch) -> Result<Value, PatchError> {
    patch
        .value
        .clone()
        .ok_or_else(|| PatchError::MissingValue(patch.path.clone()))
}
