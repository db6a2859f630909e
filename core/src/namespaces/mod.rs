//! Namespace tree
//!
//! Namespaces form a tree rooted at the global namespace `::`. Each one owns a
//! variable frame, a command table and a set of export patterns. Nodes live in
//! an arena and link to their parent and children by [`NamespaceId`].
//!
//! The tree itself knows nothing about the call stack; operations that need
//! the current namespace or in-use checks are implemented on the interpreter
//! in [`resolver`].

use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use tracing::debug;

use crate::arena::{Arena, ArenaKey, Handle};
use crate::error::EngineError;
use crate::frames::{Frame, FrameArena, FrameFlags, FrameId};
use crate::glob::{self, Glob};

pub mod names;
pub mod resolver;

pub use resolver::OverlayKind;

/* ===================== Handles ===================== */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NamespaceId(Handle);

impl ArenaKey for NamespaceId {
    fn from_handle(handle: Handle) -> Self {
        NamespaceId(handle)
    }
    fn handle(self) -> Handle {
        self.0
    }
}

/* ===================== Commands ===================== */

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub default: Option<String>,
}

/// Script-defined procedure
#[derive(Debug, Clone, PartialEq)]
pub struct Procedure {
    pub params: Vec<Param>,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Procedure(Arc<Procedure>),
    /// Imported command; `origin` is the fully qualified name it came from
    Import { origin: String },
}

/* ===================== Namespace ===================== */

#[derive(Debug)]
pub struct Namespace {
    /// Local (tail) name; empty for the global namespace
    pub name: String,
    pub parent: Option<NamespaceId>,
    pub children: IndexMap<String, NamespaceId>,
    pub export_patterns: IndexSet<String>,
    pub unknown: Option<String>,
    /// Variable frame of the namespace
    pub frame: FrameId,
    pub commands: IndexMap<String, Command>,
    /// Deleted but still referenced by a live frame
    pub deleted: bool,
}

impl Namespace {
    fn new(name: &str, parent: Option<NamespaceId>, frame: FrameId) -> Self {
        Self {
            name: name.to_string(),
            parent,
            children: IndexMap::new(),
            export_patterns: IndexSet::new(),
            unknown: None,
            frame,
            commands: IndexMap::new(),
            deleted: false,
        }
    }
}

/* ===================== Tree ===================== */

#[derive(Debug)]
pub struct NamespaceTree {
    arena: Arena<NamespaceId, Namespace>,
    global: NamespaceId,
    /// Name mappings consulted before lookup (`namespace mappings`)
    pub mappings: IndexMap<String, String>,
    pub enabled: bool,
}

impl NamespaceTree {
    /// Build a tree whose global namespace uses `global_frame` for variables
    pub fn new(frames: &mut FrameArena, global_frame: FrameId) -> Self {
        let mut arena = Arena::new();
        let global = arena.insert(Namespace::new("", None, global_frame));
        if let Some(frame) = frames.get_mut(global_frame) {
            frame.namespace = Some(global);
        }
        Self {
            arena,
            global,
            mappings: IndexMap::new(),
            enabled: true,
        }
    }

    pub fn global(&self) -> NamespaceId {
        self.global
    }

    pub fn get(&self, id: NamespaceId) -> Option<&Namespace> {
        self.arena.get(id)
    }

    pub fn get_mut(&mut self, id: NamespaceId) -> Option<&mut Namespace> {
        self.arena.get_mut(id)
    }

    /// Present and not marked deleted
    pub fn is_live(&self, id: NamespaceId) -> bool {
        self.get(id).is_some_and(|ns| !ns.deleted)
    }

    pub fn frame_of(&self, id: NamespaceId) -> Option<FrameId> {
        self.get(id).map(|ns| ns.frame)
    }

    pub fn parent_of(&self, id: NamespaceId) -> Option<NamespaceId> {
        self.get(id).and_then(|ns| ns.parent)
    }

    pub fn qualified_name(&self, id: NamespaceId) -> String {
        let mut parts = Vec::new();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let Some(ns) = self.get(current) else {
                break;
            };
            if ns.parent.is_some() {
                parts.push(ns.name.as_str());
            }
            cursor = ns.parent;
        }
        if parts.is_empty() {
            return names::SEPARATOR.to_string();
        }
        parts.reverse();
        format!("{}{}", names::SEPARATOR, parts.join(names::SEPARATOR))
    }

    /// True when `id` is `ancestor` or lies beneath it
    pub fn is_within(&self, id: NamespaceId, ancestor: NamespaceId) -> bool {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.parent_of(current);
        }
        false
    }

    fn child(&self, parent: NamespaceId, name: &str) -> Option<NamespaceId> {
        let id = *self.get(parent)?.children.get(name)?;
        self.is_live(id).then_some(id)
    }

    fn walk(&self, start: NamespaceId, parts: &[&str]) -> Option<NamespaceId> {
        parts
            .iter()
            .try_fold(start, |current, part| self.child(current, part))
    }

    /* ===================== Lookup ===================== */

    /// Resolve `name` without creating anything; relative names are walked
    /// from `current` only
    pub fn find(&self, current: NamespaceId, name: &str) -> Result<Option<NamespaceId>, EngineError> {
        let name = self.mapped(name);
        let parts = names::components(name)?;
        let start = if names::is_absolute(name) || name.is_empty() {
            self.global
        } else {
            current
        };
        Ok(self.walk(start, &parts))
    }

    /// Resolve `name`, creating missing namespaces along the way
    pub fn find_or_create(
        &mut self,
        current: NamespaceId,
        name: &str,
        frames: &mut FrameArena,
    ) -> Result<NamespaceId, EngineError> {
        if let Some(existing) = self.find(current, name)? {
            return Ok(existing);
        }
        let name = self.mapped(name).to_string();
        let parts = names::components(&name)?;
        let mut cursor = if names::is_absolute(&name) { self.global } else { current };
        for part in parts {
            cursor = match self.child(cursor, part) {
                Some(existing) => existing,
                None => self.create_child(cursor, part, frames)?,
            };
        }
        Ok(cursor)
    }

    fn mapped<'a>(&'a self, name: &'a str) -> &'a str {
        self.mappings.get(name).map_or(name, String::as_str)
    }

    pub fn create_child(
        &mut self,
        parent: NamespaceId,
        name: &str,
        frames: &mut FrameArena,
    ) -> Result<NamespaceId, EngineError> {
        if name.is_empty() {
            return Err(EngineError::InvalidName(
                "can't create namespace \"\": only global namespace can have empty name".to_string(),
            ));
        }
        if !self.is_live(parent) {
            return Err(EngineError::NotFound("parent namespace is deleted".to_string()));
        }
        let qualified = names::join(&self.qualified_name(parent), name);
        let frame = frames.insert(Frame::new(qualified.clone(), FrameFlags::NAMESPACE));
        let id = self.arena.insert(Namespace::new(name, Some(parent), frame));
        if let Some(frame) = frames.get_mut(frame) {
            frame.namespace = Some(id);
        }
        if let Some(parent) = self.get_mut(parent) {
            parent.children.insert(name.to_string(), id);
        }
        debug!(namespace = %qualified, "created namespace");
        Ok(id)
    }

    /// Unknown handler, inheriting the global namespace's when unset
    pub fn unknown_for(&self, id: NamespaceId) -> Option<String> {
        let ns = self.get(id)?;
        match &ns.unknown {
            Some(handler) => Some(handler.clone()),
            None if id != self.global => self.get(self.global)?.unknown.clone(),
            None => None,
        }
    }

    /* ===================== Enumeration ===================== */

    pub fn children(&self, id: NamespaceId, pattern: Option<&str>) -> Result<NamespaceList, EngineError> {
        NamespaceList::new(id, false, pattern)
    }

    pub fn descendants(&self, id: NamespaceId, pattern: Option<&str>) -> Result<NamespaceList, EngineError> {
        NamespaceList::new(id, true, pattern)
    }

    fn live_children(&self, id: NamespaceId) -> Vec<NamespaceId> {
        self.get(id)
            .map(|ns| {
                ns.children
                    .values()
                    .copied()
                    .filter(|child| self.is_live(*child))
                    .collect()
            })
            .unwrap_or_default()
    }

    /* ===================== Export / Import ===================== */

    /// Add (or with `clear`, replace) export patterns; returns the current list
    pub fn export(&mut self, id: NamespaceId, patterns: &[String], clear: bool) -> Result<Vec<String>, EngineError> {
        for pattern in patterns {
            if names::is_qualified(pattern) {
                return Err(EngineError::invalid(format!(
                    "invalid export pattern \"{}\": pattern can't specify a namespace",
                    pattern
                )));
            }
        }
        let ns = self
            .get_mut(id)
            .ok_or_else(|| EngineError::invalid("current namespace is invalid"))?;
        if clear {
            ns.export_patterns.clear();
        }
        ns.export_patterns.extend(patterns.iter().cloned());
        Ok(ns.export_patterns.iter().cloned().collect())
    }

    /// Import exported commands matching each qualified pattern into `target`
    ///
    /// All patterns are checked before anything is imported, so a conflict
    /// leaves the command table untouched.
    pub fn import(&mut self, target: NamespaceId, patterns: &[String], force: bool) -> Result<Vec<String>, EngineError> {
        let mut pending: Vec<(String, String)> = Vec::new();

        for pattern in patterns {
            if pattern.is_empty() {
                return Err(EngineError::invalid("empty import pattern"));
            }
            if !names::is_qualified(pattern) {
                return Err(EngineError::invalid("import patterns must be qualified"));
            }
            let source = self.find(target, names::qualifiers(pattern))?.ok_or_else(|| {
                EngineError::NotFound(format!("unknown namespace in import pattern \"{}\"", pattern))
            })?;
            if source == target {
                return Err(EngineError::invalid(format!(
                    "import pattern \"{}\" tries to import from namespace \"{}\" into itself",
                    pattern,
                    self.qualified_name(source)
                )));
            }

            let tail = Glob::new(names::tail(pattern))?;
            let source_name = self.qualified_name(source);
            let Some(source_ns) = self.get(source) else {
                continue;
            };
            let exports: Vec<Glob> = source_ns
                .export_patterns
                .iter()
                .map(|p| Glob::new(p))
                .collect::<Result<_, _>>()?;

            for (name, command) in &source_ns.commands {
                if !tail.is_match(name) || !exports.iter().any(|e| e.is_match(name)) {
                    continue;
                }
                let origin = match command {
                    Command::Import { origin } => origin.clone(),
                    Command::Procedure(_) => names::join(&source_name, name),
                };
                pending.push((name.clone(), origin));
            }
        }

        let ns = self
            .get_mut(target)
            .ok_or_else(|| EngineError::invalid("current namespace is invalid"))?;
        if !force {
            if let Some((name, _)) = pending.iter().find(|(name, _)| ns.commands.contains_key(name)) {
                return Err(EngineError::AlreadyExists(format!(
                    "can't import command \"{}\": already exists",
                    name
                )));
            }
        }
        let mut imported = Vec::with_capacity(pending.len());
        for (name, origin) in pending {
            ns.commands.insert(name.clone(), Command::Import { origin });
            imported.push(name);
        }
        Ok(imported)
    }

    /// Remove imported commands matching the patterns from `target`
    pub fn forget(&mut self, target: NamespaceId, patterns: &[String]) -> Result<Vec<String>, EngineError> {
        let mut removals = Vec::new();
        for pattern in patterns {
            let tail = Glob::new(names::tail(pattern))?;
            let source = if names::is_qualified(pattern) {
                let source = self.find(target, names::qualifiers(pattern))?.ok_or_else(|| {
                    EngineError::NotFound(format!(
                        "unknown namespace in namespace forget pattern \"{}\"",
                        pattern
                    ))
                })?;
                Some(self.qualified_name(source))
            } else {
                None
            };
            let Some(ns) = self.get(target) else {
                continue;
            };
            for (name, command) in &ns.commands {
                let Command::Import { origin } = command else {
                    continue;
                };
                let from_source = source
                    .as_deref()
                    .map_or(true, |source| names::qualifiers(origin) == source);
                if from_source && tail.is_match(name) {
                    removals.push(name.clone());
                }
            }
        }
        if let Some(ns) = self.get_mut(target) {
            for name in &removals {
                ns.commands.shift_remove(name);
            }
        }
        Ok(removals)
    }

    /* ===================== Deletion ===================== */

    /// Mark `id` and its descendants deleted
    pub fn mark_deleted(&mut self, id: NamespaceId) {
        let mut pending = vec![id];
        while let Some(current) = pending.pop() {
            let Some(ns) = self.get_mut(current) else {
                continue;
            };
            ns.deleted = true;
            pending.extend(ns.children.values().copied());
        }
    }

    /// Free a deleted namespace subtree along with its frames
    pub fn reclaim(&mut self, id: NamespaceId, frames: &mut FrameArena) {
        if id == self.global {
            return;
        }
        if let Some(parent) = self.parent_of(id) {
            if let Some(parent_ns) = self.get_mut(parent) {
                parent_ns.children.retain(|_, child| *child != id);
            }
        }
        let mut pending = vec![id];
        while let Some(current) = pending.pop() {
            let Some(ns) = self.arena.remove(current) else {
                continue;
            };
            frames.remove(ns.frame);
            pending.extend(ns.children.values().copied());
        }
    }

    /// Deleted namespaces whose subtree is no longer referenced per `in_use`
    pub fn reclaimable(&self, in_use: impl Fn(NamespaceId) -> bool) -> Vec<NamespaceId> {
        let mut found = Vec::new();
        let mut pending = vec![self.global];
        while let Some(current) = pending.pop() {
            let Some(ns) = self.get(current) else {
                continue;
            };
            if ns.deleted {
                let busy = NamespaceList::subtree(self, current).any(|id| in_use(id));
                if !busy {
                    found.push(current);
                }
                continue;
            }
            pending.extend(ns.children.values().copied());
        }
        found
    }

    /// Move `id` under `new_parent` with local name `new_name`
    pub fn relink(&mut self, id: NamespaceId, new_parent: NamespaceId, new_name: &str) {
        if let Some(old_parent) = self.parent_of(id) {
            if let Some(old_parent_ns) = self.get_mut(old_parent) {
                old_parent_ns.children.retain(|_, child| *child != id);
            }
        }
        if let Some(parent_ns) = self.get_mut(new_parent) {
            parent_ns.children.insert(new_name.to_string(), id);
        }
        if let Some(ns) = self.get_mut(id) {
            ns.name = new_name.to_string();
            ns.parent = Some(new_parent);
        }
    }

    /// Rename frames of a subtree after a move so diagnostics stay accurate
    pub fn refresh_frame_names(&self, id: NamespaceId, frames: &mut FrameArena) {
        for current in NamespaceList::subtree(self, id).collect::<Vec<_>>() {
            let qualified = self.qualified_name(current);
            if let Some(frame) = self.frame_of(current).and_then(|f| frames.get_mut(f)) {
                if !frame.flags.contains(FrameFlags::GLOBAL) {
                    frame.name = qualified;
                }
            }
        }
    }
}

/* ===================== Lazy Listing ===================== */

/// Restartable listing of the children or descendants of a namespace
///
/// Each call to [`NamespaceList::iter`] walks the tree afresh, so the list
/// reflects whatever the tree looks like at that moment.
#[derive(Debug, Clone)]
pub struct NamespaceList {
    root: NamespaceId,
    recursive: bool,
    pattern: Option<Glob>,
    match_qualified: bool,
}

impl NamespaceList {
    fn new(root: NamespaceId, recursive: bool, pattern: Option<&str>) -> Result<Self, EngineError> {
        let match_qualified = pattern.is_some_and(names::is_absolute);
        let pattern = pattern.map(Glob::new).transpose()?;
        Ok(Self {
            root,
            recursive,
            pattern,
            match_qualified,
        })
    }

    pub fn iter<'a>(&'a self, tree: &'a NamespaceTree) -> NamespaceIter<'a> {
        let mut pending = tree.live_children(self.root);
        pending.reverse();
        NamespaceIter {
            tree,
            list: Some(self),
            pending,
        }
    }

    /// `root` and everything beneath it, deleted or not
    fn subtree(tree: &NamespaceTree, root: NamespaceId) -> NamespaceIter<'_> {
        NamespaceIter {
            tree,
            list: None,
            pending: vec![root],
        }
    }

    /// Qualified names of every match
    pub fn qualified_names(&self, tree: &NamespaceTree) -> Vec<String> {
        self.iter(tree).map(|id| tree.qualified_name(id)).collect()
    }

    fn accepts(&self, tree: &NamespaceTree, id: NamespaceId) -> bool {
        let Some(pattern) = &self.pattern else {
            return true;
        };
        if self.match_qualified {
            pattern.is_match(&tree.qualified_name(id))
        } else {
            tree.get(id).is_some_and(|ns| glob::matches(Some(pattern), &ns.name))
        }
    }
}

pub struct NamespaceIter<'a> {
    tree: &'a NamespaceTree,
    /// `None` walks the raw subtree including deleted nodes
    list: Option<&'a NamespaceList>,
    pending: Vec<NamespaceId>,
}

impl Iterator for NamespaceIter<'_> {
    type Item = NamespaceId;

    fn next(&mut self) -> Option<NamespaceId> {
        while let Some(id) = self.pending.pop() {
            let Some(list) = self.list else {
                if let Some(ns) = self.tree.get(id) {
                    self.pending.extend(ns.children.values().rev().copied());
                }
                return Some(id);
            };
            if list.recursive {
                let mut children = self.tree.live_children(id);
                children.reverse();
                self.pending.extend(children);
            }
            if list.accepts(self.tree, id) {
                return Some(id);
            }
        }
        None
    }
}
