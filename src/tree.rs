use crate::model::{FileKind, FileMetadata};
use crate::path_norm;
use serde::{Deserialize, Serialize};
use std::path::{PathBuf, MAIN_SEPARATOR};
use thiserror::Error;

/// Stable handle into the tree arena. Handles stay valid across
/// structural edits; operations on a node that has been removed fail
/// with [`TreeError::Stale`], which callers treat as a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// Why a structural edit was refused. Every variant leaves the tree
/// untouched; callers treat them all as no-ops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TreeError {
    /// The node was removed by an earlier edit.
    #[error("stale tree node reference")]
    Stale,
    /// A directory-only operation was aimed at a file.
    #[error("target is not a directory")]
    NotADirectory,
    /// The move target lies inside the node being moved.
    #[error("cannot move a node into its own subtree")]
    IntoOwnSubtree,
}

/// Leaf payload: where the file came from and what is known about it.
/// `source_dir` indexes the scan's root-directory list; `relative_source`
/// is the file's path below that root, so the full original path is not
/// duplicated per entry.
#[derive(Debug, Clone)]
pub struct LeafData {
    pub source_dir: usize,
    pub relative_source: PathBuf,
    pub original_name: String,
    pub extension: String,
    pub kind: FileKind,
    pub metadata: FileMetadata,
}

#[derive(Debug)]
enum NodeKind {
    Directory { children: Vec<NodeId> },
    File(LeafData),
}

#[derive(Debug)]
struct Node {
    parent: Option<NodeId>,
    name: String,
    duplicate: bool,
    contains_duplicate: bool,
    transferred: bool,
    removed: bool,
    kind: NodeKind,
}

impl Node {
    fn directory(parent: Option<NodeId>, name: String) -> Self {
        Self {
            parent,
            name,
            duplicate: false,
            contains_duplicate: false,
            transferred: false,
            removed: false,
            kind: NodeKind::Directory {
                children: Vec::new(),
            },
        }
    }

    fn file(parent: NodeId, name: String, leaf: LeafData) -> Self {
        Self {
            parent: Some(parent),
            name,
            duplicate: false,
            contains_duplicate: false,
            transferred: false,
            removed: false,
            kind: NodeKind::File(leaf),
        }
    }
}

/// Aggregate result of a duplicate-detection pass. Directories are never
/// counted as files; `bytes` sums leaf sizes only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeSummary {
    pub files: usize,
    pub duplicates: usize,
    pub bytes: u64,
}

/// The proposed destination hierarchy: built from empty by a scan,
/// edited interactively (rename, delete, new directory, drag-move), then
/// walked read-only by the transfer executor. Children of a directory
/// are kept sorted by display name; duplicate detection relies on that.
#[derive(Debug)]
pub struct FileTree {
    nodes: Vec<Node>,
}

impl Default for FileTree {
    fn default() -> Self {
        Self::new()
    }
}

impl FileTree {
    pub const ROOT: NodeId = NodeId(0);

    pub fn new() -> Self {
        Self {
            nodes: vec![Node::directory(None, String::new())],
        }
    }

    fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    fn live(&self, id: NodeId) -> Result<(), TreeError> {
        if self.node(id).removed {
            Err(TreeError::Stale)
        } else {
            Ok(())
        }
    }

    fn push(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    pub fn is_directory(&self, id: NodeId) -> bool {
        matches!(self.node(id).kind, NodeKind::Directory { .. })
    }

    pub fn display_name(&self, id: NodeId) -> &str {
        &self.node(id).name
    }

    pub fn is_duplicate(&self, id: NodeId) -> bool {
        self.node(id).duplicate
    }

    /// For directories: "this subtree contains at least one duplicate".
    /// A clash of the directory's own name is tracked by `is_duplicate`
    /// at the parent level instead.
    pub fn contains_duplicate(&self, id: NodeId) -> bool {
        self.node(id).contains_duplicate
    }

    pub fn is_transferred(&self, id: NodeId) -> bool {
        self.node(id).transferred
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    pub fn leaf(&self, id: NodeId) -> Option<&LeafData> {
        match &self.node(id).kind {
            NodeKind::File(leaf) => Some(leaf),
            NodeKind::Directory { .. } => None,
        }
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        match &self.node(id).kind {
            NodeKind::Directory { children } => children,
            NodeKind::File(_) => &[],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.children(Self::ROOT).is_empty()
    }

    /// Inserts a scanned file under `relative_dir` (components separated
    /// by the native separator; empty components ignored). Directory
    /// components match existing sibling *directories* by exact name;
    /// a file with the same name never absorbs them.
    pub fn insert(&mut self, relative_dir: &str, file_name: &str, leaf: LeafData) -> NodeId {
        let mut parent = Self::ROOT;
        for component in relative_dir.split(MAIN_SEPARATOR) {
            if component.is_empty() {
                continue;
            }
            parent = self.ensure_directory(parent, component);
        }
        let node = Node::file(parent, file_name.to_string(), leaf);
        self.attach(parent, node)
    }

    fn ensure_directory(&mut self, parent: NodeId, name: &str) -> NodeId {
        let existing = self
            .children(parent)
            .iter()
            .copied()
            .find(|&child| self.is_directory(child) && self.node(child).name == name);
        if let Some(id) = existing {
            return id;
        }
        let node = Node::directory(Some(parent), name.to_string());
        self.attach(parent, node)
    }

    fn attach(&mut self, parent: NodeId, node: Node) -> NodeId {
        let id = self.push(node);
        self.attach_existing(parent, id);
        id
    }

    /// Inserts into the parent's child list at the sorted position.
    fn attach_existing(&mut self, parent: NodeId, id: NodeId) {
        self.node_mut(id).parent = Some(parent);
        let name = self.node(id).name.clone();
        let position = self
            .children(parent)
            .partition_point(|&child| self.node(child).name.as_str() <= name.as_str());
        match &mut self.node_mut(parent).kind {
            NodeKind::Directory { children } => children.insert(position, id),
            NodeKind::File(_) => unreachable!("files have no children"),
        }
    }

    fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.node(id).parent {
            if let NodeKind::Directory { children } = &mut self.node_mut(parent).kind {
                children.retain(|&child| child != id);
            }
        }
    }

    /// Creates an empty directory under `parent` (a live directory).
    pub fn new_directory(&mut self, parent: NodeId, name: &str) -> Result<NodeId, TreeError> {
        self.live(parent)?;
        if !self.is_directory(parent) {
            return Err(TreeError::NotADirectory);
        }
        let name = path_norm::validate_file_name(name, None);
        let node = Node::directory(Some(parent), name);
        let id = self.attach(parent, node);
        self.check_level(parent, false);
        Ok(id)
    }

    /// Renames a node to a validated form of `new_name`. Files get their
    /// original extension forced back on regardless of what was typed;
    /// duplicate flags on the sibling level are refreshed.
    pub fn rename(&mut self, id: NodeId, new_name: &str) -> Result<(), TreeError> {
        self.live(id)?;
        let forced_ext = self.leaf(id).map(|leaf| leaf.extension.clone());
        let validated = path_norm::validate_file_name(new_name, forced_ext.as_deref());
        self.node_mut(id).name = validated;
        if let Some(parent) = self.node(id).parent {
            self.resort(parent, id);
            self.check_level(parent, false);
        }
        Ok(())
    }

    /// Restores a leaf's display name to the untouched original.
    pub fn revert_to_original(&mut self, id: NodeId) -> Result<(), TreeError> {
        self.live(id)?;
        let Some(original) = self.leaf(id).map(|leaf| leaf.original_name.clone()) else {
            return Ok(());
        };
        self.node_mut(id).name = original;
        if let Some(parent) = self.node(id).parent {
            self.resort(parent, id);
            self.check_level(parent, false);
        }
        Ok(())
    }

    fn resort(&mut self, parent: NodeId, id: NodeId) {
        self.detach(id);
        self.attach_existing(parent, id);
    }

    /// Detaches a node (subtree included) and prunes directories left
    /// empty on the way up. Duplicate flags of the former siblings are
    /// refreshed, so removing one of two equal names clears the other.
    pub fn remove(&mut self, id: NodeId) -> Result<(), TreeError> {
        self.live(id)?;
        if id == Self::ROOT {
            return Err(TreeError::Stale);
        }
        let parent = self.node(id).parent;
        self.detach(id);
        self.mark_removed(id);

        let mut cursor = parent;
        while let Some(dir) = cursor {
            if dir == Self::ROOT || !self.children(dir).is_empty() {
                break;
            }
            let next = self.node(dir).parent;
            self.detach(dir);
            self.node_mut(dir).removed = true;
            cursor = next;
        }
        if let Some(dir) = cursor {
            if !self.node(dir).removed {
                self.check_level(dir, false);
            }
        }
        Ok(())
    }

    fn mark_removed(&mut self, id: NodeId) {
        self.node_mut(id).removed = true;
        let children: Vec<NodeId> = self.children(id).to_vec();
        for child in children {
            self.mark_removed(child);
        }
    }

    /// Drag-move: re-parents a node under a live directory. The node is
    /// re-inserted at the sorted position; both affected levels get a
    /// fresh duplicate pass.
    pub fn move_node(&mut self, id: NodeId, new_parent: NodeId) -> Result<(), TreeError> {
        self.live(id)?;
        self.live(new_parent)?;
        if id == Self::ROOT {
            return Err(TreeError::Stale);
        }
        if !self.is_directory(new_parent) {
            return Err(TreeError::NotADirectory);
        }
        // A target inside the moved subtree would detach it from the
        // root and close a parent cycle.
        let mut cursor = Some(new_parent);
        while let Some(node) = cursor {
            if node == id {
                return Err(TreeError::IntoOwnSubtree);
            }
            cursor = self.node(node).parent;
        }
        let old_parent = self.node(id).parent;
        self.detach(id);
        self.attach_existing(new_parent, id);
        self.check_level(new_parent, false);
        if let Some(old) = old_parent {
            if old != new_parent && !self.node(old).removed {
                self.check_level(old, false);
            }
        }
        Ok(())
    }

    pub fn mark_transferred(&mut self, id: NodeId) {
        self.node_mut(id).transferred = true;
    }

    /// Re-sorts a directory's children by display name. Sorting is
    /// maintained on every structural edit; this exists for hosts that
    /// suspend it during bulk reordering.
    pub fn sort_children(&mut self, dir: NodeId) {
        let mut children: Vec<NodeId> = self.children(dir).to_vec();
        children.sort_by(|&a, &b| self.node(a).name.cmp(&self.node(b).name));
        if let NodeKind::Directory { children: slot } = &mut self.node_mut(dir).kind {
            *slot = children;
        }
    }

    /// Duplicate-detection pass over one directory level, or the whole
    /// subtree when `recursive`. Adjacent sorted siblings with equal
    /// names are flagged, the first of a run never, the rest always.
    /// Directories take part in the comparison (a file and a directory
    /// must not share a name) but only leaves are counted.
    pub fn check_duplicates(
        &mut self,
        scope: NodeId,
        recursive: bool,
    ) -> Result<TreeSummary, TreeError> {
        self.live(scope)?;
        if !self.is_directory(scope) {
            return Err(TreeError::NotADirectory);
        }
        let summary = self.check_level(scope, recursive);
        Ok(summary)
    }

    fn check_level(&mut self, dir: NodeId, recursive: bool) -> TreeSummary {
        let children: Vec<NodeId> = self.children(dir).to_vec();
        let mut summary = TreeSummary::default();
        let mut subtree_has_duplicate = false;
        let mut previous_name: Option<String> = None;

        for child in children {
            let name = self.node(child).name.clone();
            let duplicate = previous_name.as_deref() == Some(name.as_str());
            self.node_mut(child).duplicate = duplicate;

            match &self.node(child).kind {
                NodeKind::File(leaf) => {
                    summary.files += 1;
                    summary.bytes += leaf.metadata.file_size;
                    if duplicate {
                        summary.duplicates += 1;
                    }
                }
                NodeKind::Directory { .. } => {
                    if recursive {
                        let nested = self.check_level(child, true);
                        summary.files += nested.files;
                        summary.duplicates += nested.duplicates;
                        summary.bytes += nested.bytes;
                    }
                }
            }
            if duplicate || self.node(child).contains_duplicate {
                subtree_has_duplicate = true;
            }
            previous_name = Some(name);
        }

        self.node_mut(dir).contains_duplicate = subtree_has_duplicate;
        summary
    }

    /// Path of display names from the root down to `id`, used to build
    /// the destination path during a transfer.
    pub fn full_path(&self, id: NodeId) -> PathBuf {
        let mut names = Vec::new();
        let mut cursor = Some(id);
        while let Some(node) = cursor {
            if node == Self::ROOT {
                break;
            }
            names.push(self.node(node).name.clone());
            cursor = self.node(node).parent;
        }
        names.reverse();
        names.iter().collect()
    }

    /// All live leaves in display (sorted, depth-first) order.
    pub fn leaves_in_order(&self) -> Vec<NodeId> {
        let mut leaves = Vec::new();
        self.collect_leaves(Self::ROOT, &mut leaves);
        leaves
    }

    fn collect_leaves(&self, dir: NodeId, out: &mut Vec<NodeId>) {
        for &child in self.children(dir) {
            match &self.node(child).kind {
                NodeKind::File(_) => out.push(child),
                NodeKind::Directory { .. } => self.collect_leaves(child, out),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(name: &str, size: u64) -> LeafData {
        let stem = name.strip_suffix(".jpg").unwrap_or(name).to_string();
        LeafData {
            source_dir: 0,
            relative_source: PathBuf::from(name),
            original_name: name.to_string(),
            extension: ".jpg".to_string(),
            kind: FileKind::Image,
            metadata: FileMetadata {
                kind: FileKind::Image,
                prefix: String::new(),
                number: String::new(),
                year: "2020".to_string(),
                month: "07".to_string(),
                day: "11".to_string(),
                hour: "20".to_string(),
                minute: "28".to_string(),
                second: "50".to_string(),
                model: String::new(),
                original_stem: stem,
                extension: ".jpg".to_string(),
                file_size: size,
            },
        }
    }

    fn dir_path(components: &[&str]) -> String {
        components.join(&MAIN_SEPARATOR.to_string())
    }

    #[test]
    fn insert_builds_directories_and_counts() {
        let mut tree = FileTree::new();
        tree.insert(&dir_path(&["2020", "07"]), "a.jpg", leaf("a.jpg", 10));
        tree.insert(&dir_path(&["2020", "07"]), "b.jpg", leaf("b.jpg", 20));
        tree.insert(&dir_path(&["2020", "08"]), "c.jpg", leaf("c.jpg", 30));

        let summary = tree.check_duplicates(FileTree::ROOT, true).unwrap();
        assert_eq!(summary.files, 3);
        assert_eq!(summary.duplicates, 0);
        assert_eq!(summary.bytes, 60);

        // one "2020" directory, not three
        assert_eq!(tree.children(FileTree::ROOT).len(), 1);
        let year = tree.children(FileTree::ROOT)[0];
        assert_eq!(tree.display_name(year), "2020");
        assert_eq!(tree.children(year).len(), 2);
    }

    #[test]
    fn children_stay_sorted_by_name() {
        let mut tree = FileTree::new();
        tree.insert("", "c.jpg", leaf("c.jpg", 1));
        tree.insert("", "a.jpg", leaf("a.jpg", 1));
        tree.insert("", "b.jpg", leaf("b.jpg", 1));
        let names: Vec<&str> = tree
            .children(FileTree::ROOT)
            .iter()
            .map(|&id| tree.display_name(id))
            .collect();
        assert_eq!(names, ["a.jpg", "b.jpg", "c.jpg"]);
    }

    #[test]
    fn duplicate_flags_only_the_second_of_a_pair() {
        let mut tree = FileTree::new();
        let first = tree.insert("", "same.jpg", leaf("same.jpg", 1));
        let second = tree.insert("", "same.jpg", leaf("same.jpg", 1));

        let summary = tree.check_duplicates(FileTree::ROOT, false).unwrap();
        assert_eq!(summary.duplicates, 1);
        let flagged: Vec<bool> = tree
            .children(FileTree::ROOT)
            .iter()
            .map(|&id| tree.is_duplicate(id))
            .collect();
        assert_eq!(flagged, [false, true]);

        // removing either one clears the duplicate state of the rest
        let flagged_id = if tree.is_duplicate(second) { second } else { first };
        tree.remove(flagged_id).unwrap();
        let summary = tree.check_duplicates(FileTree::ROOT, false).unwrap();
        assert_eq!(summary.duplicates, 0);
        assert!(!tree.is_duplicate(first));
    }

    #[test]
    fn duplicate_run_flags_all_but_the_first() {
        let mut tree = FileTree::new();
        for _ in 0..3 {
            tree.insert("", "x.jpg", leaf("x.jpg", 1));
        }
        let summary = tree.check_duplicates(FileTree::ROOT, false).unwrap();
        assert_eq!(summary.files, 3);
        assert_eq!(summary.duplicates, 2);
    }

    #[test]
    fn directory_and_file_may_not_share_a_name() {
        let mut tree = FileTree::new();
        tree.insert("shared", "inner.jpg", leaf("inner.jpg", 1));
        let file = tree.insert("", "shared", leaf("shared", 1));
        tree.check_duplicates(FileTree::ROOT, true).unwrap();
        // sorted adjacency puts the file next to the directory
        assert!(tree.is_duplicate(file) || {
            let dir = tree
                .children(FileTree::ROOT)
                .iter()
                .copied()
                .find(|&id| tree.is_directory(id))
                .unwrap();
            tree.is_duplicate(dir)
        });
    }

    #[test]
    fn recursive_check_propagates_to_ancestors() {
        let mut tree = FileTree::new();
        tree.insert(&dir_path(&["2020", "07"]), "a.jpg", leaf("a.jpg", 1));
        tree.insert(&dir_path(&["2020", "07"]), "a.jpg", leaf("a.jpg", 1));
        tree.check_duplicates(FileTree::ROOT, true).unwrap();

        let year = tree.children(FileTree::ROOT)[0];
        let month = tree.children(year)[0];
        assert!(tree.contains_duplicate(month));
        assert!(tree.contains_duplicate(year));
        assert!(tree.contains_duplicate(FileTree::ROOT));
        // the directory's own name does not clash
        assert!(!tree.is_duplicate(year));
    }

    #[test]
    fn rename_forces_extension_and_reflags() {
        let mut tree = FileTree::new();
        let a = tree.insert("", "a.jpg", leaf("a.jpg", 1));
        let b = tree.insert("", "b.jpg", leaf("b.jpg", 1));
        tree.check_duplicates(FileTree::ROOT, false).unwrap();

        tree.rename(b, "a.png").unwrap();
        assert_eq!(tree.display_name(b), "a.jpg");
        assert!(tree.is_duplicate(a) || tree.is_duplicate(b));

        tree.rename(b, "c").unwrap();
        assert_eq!(tree.display_name(b), "c.jpg");
        assert!(!tree.is_duplicate(a));
        assert!(!tree.is_duplicate(b));
    }

    #[test]
    fn revert_restores_original_name() {
        let mut tree = FileTree::new();
        let id = tree.insert("", "renamed.jpg", leaf("IMG_0042.jpg", 1));
        tree.rename(id, "whatever").unwrap();
        tree.revert_to_original(id).unwrap();
        assert_eq!(tree.display_name(id), "IMG_0042.jpg");
    }

    #[test]
    fn remove_prunes_empty_ancestors() {
        let mut tree = FileTree::new();
        let id = tree.insert(&dir_path(&["2020", "07"]), "a.jpg", leaf("a.jpg", 1));
        let keep = tree.insert("", "keep.jpg", leaf("keep.jpg", 1));
        tree.remove(id).unwrap();

        assert_eq!(tree.children(FileTree::ROOT).len(), 1);
        assert_eq!(tree.children(FileTree::ROOT)[0], keep);
    }

    #[test]
    fn operations_on_removed_nodes_are_stale() {
        let mut tree = FileTree::new();
        let id = tree.insert("", "a.jpg", leaf("a.jpg", 1));
        tree.remove(id).unwrap();
        assert_eq!(tree.rename(id, "x"), Err(TreeError::Stale));
        assert_eq!(tree.remove(id), Err(TreeError::Stale));
        assert_eq!(tree.revert_to_original(id), Err(TreeError::Stale));
    }

    #[test]
    fn directory_operations_reject_file_targets() {
        let mut tree = FileTree::new();
        let file = tree.insert("", "a.jpg", leaf("a.jpg", 1));
        let other = tree.insert("", "b.jpg", leaf("b.jpg", 1));
        assert_eq!(tree.new_directory(file, "sub"), Err(TreeError::NotADirectory));
        assert_eq!(tree.move_node(other, file), Err(TreeError::NotADirectory));
        assert_eq!(
            tree.check_duplicates(file, false),
            Err(TreeError::NotADirectory)
        );
    }

    #[test]
    fn moving_a_directory_into_its_own_subtree_is_rejected() {
        let mut tree = FileTree::new();
        tree.insert(&dir_path(&["outer", "inner"]), "a.jpg", leaf("a.jpg", 1));
        let outer = tree.children(FileTree::ROOT)[0];
        let inner = tree.children(outer)[0];

        assert_eq!(tree.move_node(outer, inner), Err(TreeError::IntoOwnSubtree));
        assert_eq!(tree.move_node(outer, outer), Err(TreeError::IntoOwnSubtree));

        // the refused move must leave the tree fully intact
        assert_eq!(tree.children(FileTree::ROOT), [outer]);
        let leaves = tree.leaves_in_order();
        assert_eq!(leaves.len(), 1);
        let expected: PathBuf = ["outer", "inner", "a.jpg"].iter().collect();
        assert_eq!(tree.full_path(leaves[0]), expected);
    }

    #[test]
    fn move_node_reparents_and_reflags() {
        let mut tree = FileTree::new();
        let id = tree.insert(&dir_path(&["a"]), "x.jpg", leaf("x.jpg", 1));
        tree.insert(&dir_path(&["b"]), "x.jpg", leaf("x.jpg", 1));
        let target = tree
            .children(FileTree::ROOT)
            .iter()
            .copied()
            .find(|&d| tree.display_name(d) == "b")
            .unwrap();
        tree.move_node(id, target).unwrap();

        assert_eq!(tree.children(target).len(), 2);
        let summary = tree.check_duplicates(FileTree::ROOT, true).unwrap();
        assert_eq!(summary.duplicates, 1);
        // "a" was left empty but not pruned: pruning is remove-only
        assert!(tree
            .children(FileTree::ROOT)
            .iter()
            .any(|&d| tree.display_name(d) == "a"));
    }

    #[test]
    fn full_path_reconstructs_ancestry() {
        let mut tree = FileTree::new();
        let id = tree.insert(&dir_path(&["2020", "07"]), "a.jpg", leaf("a.jpg", 1));
        let expected: PathBuf = ["2020", "07", "a.jpg"].iter().collect();
        assert_eq!(tree.full_path(id), expected);
    }

    #[test]
    fn leaves_in_display_order() {
        let mut tree = FileTree::new();
        tree.insert(&dir_path(&["b"]), "2.jpg", leaf("2.jpg", 1));
        tree.insert(&dir_path(&["a"]), "1.jpg", leaf("1.jpg", 1));
        tree.insert("", "0.jpg", leaf("0.jpg", 1));
        let names: Vec<String> = tree
            .leaves_in_order()
            .iter()
            .map(|&id| tree.full_path(id).to_string_lossy().into_owned())
            .collect();
        let sep = MAIN_SEPARATOR;
        assert_eq!(
            names,
            ["0.jpg".to_string(), format!("a{sep}1.jpg"), format!("b{sep}2.jpg")]
        );
    }
}
