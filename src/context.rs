//! Calling contexts: call strings truncated to a bounded depth.
//!
//! Contexts are interned in an arena and addressed by [`ContextId`]. Two call
//! chains whose last `depth` call sites agree share a context, and hence a
//! summary. Depth `0` makes the analysis context-insensitive.

use std::collections::{BTreeSet, HashMap};

use log::debug;

use crate::types::{CallSiteId, ContextId};

#[derive(Debug, Clone)]
pub struct ContextTable {
    depth: usize,
    strings: Vec<Option<Vec<CallSiteId>>>,
    lookup: HashMap<Vec<CallSiteId>, ContextId>,
    free: Vec<ContextId>,
    created: usize,
    collected: usize,
}

impl ContextTable {
    pub fn new(depth: usize) -> Self {
        let root = Vec::new();
        Self {
            depth,
            strings: vec![Some(root.clone())],
            lookup: HashMap::from([(root, ContextId::ROOT)]),
            free: Vec::new(),
            created: 1,
            collected: 0,
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Context of a call made at `call_site` from within `ctx`.
    pub fn extend(&mut self, ctx: ContextId, call_site: CallSiteId) -> ContextId {
        if self.depth == 0 {
            return ContextId::ROOT;
        }
        let mut string = self.get(ctx).to_vec();
        string.push(call_site);
        if string.len() > self.depth {
            string.drain(..string.len() - self.depth);
        }
        self.intern(string)
    }

    fn intern(&mut self, string: Vec<CallSiteId>) -> ContextId {
        if let Some(&id) = self.lookup.get(&string) {
            return id;
        }
        self.created += 1;
        let id = match self.free.pop() {
            Some(id) => {
                self.strings[id.index()] = Some(string.clone());
                id
            }
            None => {
                self.strings.push(Some(string.clone()));
                ContextId::new(self.strings.len() - 1)
            }
        };
        self.lookup.insert(string, id);
        id
    }

    /// Call string of a live context. Collected contexts read as empty.
    pub fn get(&self, ctx: ContextId) -> &[CallSiteId] {
        self.strings
            .get(ctx.index())
            .and_then(|s| s.as_deref())
            .unwrap_or(&[])
    }

    pub fn is_live(&self, ctx: ContextId) -> bool {
        matches!(self.strings.get(ctx.index()), Some(Some(_)))
    }

    /// Number of live contexts.
    pub fn len(&self) -> usize {
        self.lookup.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lookup.is_empty()
    }

    /// Total contexts ever allocated.
    pub fn created(&self) -> usize {
        self.created
    }

    pub fn collected(&self) -> usize {
        self.collected
    }

    /// Drop every context not in `live`. The root context is always kept.
    pub fn collect_garbage(&mut self, live: &BTreeSet<ContextId>) {
        let mut dropped = 0;
        for (i, slot) in self.strings.iter_mut().enumerate() {
            let id = ContextId::new(i);
            if id == ContextId::ROOT || live.contains(&id) {
                continue;
            }
            if let Some(string) = slot.take() {
                self.lookup.remove(&string);
                self.free.push(id);
                dropped += 1;
            }
        }
        self.collected += dropped;
        debug!("collected {} contexts, {} live", dropped, self.lookup.len());
    }
}
