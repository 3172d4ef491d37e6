//! Insertion-ordered multi-way tree used to snapshot folder hierarchies
//!
//! Nodes live in a flat arena and refer to each other by index: every node
//! knows its next sibling and the head of its child chain. Sibling order is
//! the order in which elements were added and is never sorted. Two trees are
//! equal when their elements, subtrees and sibling chains match position by
//! position, which is the only change detection the hierarchy watcher uses.

use std::fmt;

use crate::error::{AsgardError, AsgardResult};

#[derive(Debug, Clone)]
struct Node<T> {
    element: T,
    next: Option<usize>,
    subtree: Option<usize>,
}

/// Where a node is linked from
#[derive(Debug, Clone, Copy)]
enum Link {
    Head,
    Subtree(usize),
    Next(usize),
}

/// Ordered forest of `T` with structural equality
#[derive(Debug, Clone)]
pub struct OrderedTree<T> {
    nodes: Vec<Node<T>>,
    head: Option<usize>,
}

impl<T> Default for OrderedTree<T> {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            head: None,
        }
    }
}

impl<T> OrderedTree<T> {
    /// Create an empty tree
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if the tree holds no elements
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Number of elements at every depth
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// First element at the root level
    pub fn root(&self) -> Option<&T> {
        self.head.map(|idx| &self.nodes[idx].element)
    }

    /// Elements of the root sibling chain, in order
    pub fn roots(&self) -> impl Iterator<Item = &T> + '_ {
        self.chain(self.head).map(move |idx| &self.nodes[idx].element)
    }

    /// Depth-first pre-order walk yielding `(depth, element)`
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            tree: self,
            stack: self.head.map(|idx| vec![(idx, 0)]).unwrap_or_default(),
        }
    }

    /// Tree of the same shape with every element passed through `f`
    pub fn map<U>(&self, mut f: impl FnMut(&T) -> U) -> OrderedTree<U> {
        OrderedTree {
            nodes: self
                .nodes
                .iter()
                .map(|node| Node {
                    element: f(&node.element),
                    next: node.next,
                    subtree: node.subtree,
                })
                .collect(),
            head: self.head,
        }
    }

    /// Append `element` as the last sibling at the root level
    pub fn add(&mut self, element: T) {
        let idx = self.push_node(element);
        match self.head {
            Some(first) => self.append_to_chain(first, idx),
            None => self.head = Some(idx),
        }
    }

    fn push_node(&mut self, element: T) -> usize {
        self.nodes.push(Node {
            element,
            next: None,
            subtree: None,
        });
        self.nodes.len() - 1
    }

    fn append_to_chain(&mut self, first: usize, idx: usize) {
        let mut last = first;
        while let Some(next) = self.nodes[last].next {
            last = next;
        }
        self.nodes[last].next = Some(idx);
    }

    fn chain(&self, first: Option<usize>) -> impl Iterator<Item = usize> + '_ {
        std::iter::successors(first, move |&idx| self.nodes[idx].next)
    }

    /// Rebuild the arena so that it holds exactly the reachable nodes
    fn compact(&mut self) {
        let order: Vec<usize> = self.iter_indices().collect();
        let mut remap = vec![usize::MAX; self.nodes.len()];
        for (new_idx, &old_idx) in order.iter().enumerate() {
            remap[old_idx] = new_idx;
        }

        let mut slots: Vec<Option<Node<T>>> =
            std::mem::take(&mut self.nodes).into_iter().map(Some).collect();
        for &old_idx in &order {
            if let Some(mut node) = slots[old_idx].take() {
                node.next = node.next.map(|i| remap[i]);
                node.subtree = node.subtree.map(|i| remap[i]);
                self.nodes.push(node);
            }
        }
        self.head = self.head.map(|i| remap[i]);
    }

    fn iter_indices(&self) -> impl Iterator<Item = usize> + '_ {
        let mut stack: Vec<usize> = self.head.into_iter().collect();
        std::iter::from_fn(move || {
            let idx = stack.pop()?;
            let node = &self.nodes[idx];
            if let Some(next) = node.next {
                stack.push(next);
            }
            if let Some(sub) = node.subtree {
                stack.push(sub);
            }
            Some(idx)
        })
    }

    fn chains_equal(&self, a: Option<usize>, other: &Self, b: Option<usize>) -> bool
    where
        T: PartialEq,
    {
        let (mut a, mut b) = (a, b);
        loop {
            match (a, b) {
                (None, None) => return true,
                (Some(x), Some(y)) => {
                    let (left, right) = (&self.nodes[x], &other.nodes[y]);
                    if left.element != right.element {
                        return false;
                    }
                    if !self.chains_equal(left.subtree, other, right.subtree) {
                        return false;
                    }
                    a = left.next;
                    b = right.next;
                }
                _ => return false,
            }
        }
    }
}

impl<T: PartialEq + fmt::Debug> OrderedTree<T> {
    /// Depth-first search, subtree before sibling
    fn find(&self, element: &T) -> Option<(usize, Link)> {
        let mut stack: Vec<(usize, Link)> = self.head.map(|idx| (idx, Link::Head)).into_iter().collect();
        while let Some((idx, link)) = stack.pop() {
            let node = &self.nodes[idx];
            if node.element == *element {
                return Some((idx, link));
            }
            if let Some(next) = node.next {
                stack.push((next, Link::Next(idx)));
            }
            if let Some(sub) = node.subtree {
                stack.push((sub, Link::Subtree(idx)));
            }
        }
        None
    }

    fn locate(&self, element: &T) -> AsgardResult<usize> {
        self.find(element)
            .map(|(idx, _)| idx)
            .ok_or_else(|| AsgardError::not_found(format!("{:?}", element)))
    }

    /// Check if `element` appears anywhere in the tree
    pub fn contains(&self, element: &T) -> bool {
        self.find(element).is_some()
    }

    /// Attach `element` under `parent`, after any existing children
    pub fn add_child(&mut self, element: T, parent: &T) -> AsgardResult<()> {
        let parent_idx = self.locate(parent)?;
        let idx = self.push_node(element);
        match self.nodes[parent_idx].subtree {
            Some(first) => self.append_to_chain(first, idx),
            None => self.nodes[parent_idx].subtree = Some(idx),
        }
        Ok(())
    }

    /// Attach a whole tree as the subtree of `parent`
    ///
    /// Fails with `StructuralConflict` when `parent` already owns a subtree.
    pub fn add_subtree(&mut self, tree: OrderedTree<T>, parent: &T) -> AsgardResult<()> {
        let parent_idx = self.locate(parent)?;
        if self.nodes[parent_idx].subtree.is_some() {
            return Err(AsgardError::structural_conflict(format!(
                "{:?} already has a subtree",
                parent
            )));
        }

        let Some(sub_head) = tree.head else {
            return Ok(());
        };
        let offset = self.nodes.len();
        self.nodes.extend(tree.nodes.into_iter().map(|node| Node {
            element: node.element,
            next: node.next.map(|i| i + offset),
            subtree: node.subtree.map(|i| i + offset),
        }));
        self.nodes[parent_idx].subtree = Some(sub_head + offset);
        Ok(())
    }

    /// Remove `element` together with its whole subtree
    ///
    /// Removing a root promotes its next sibling; removing any other node
    /// splices it out of its sibling chain.
    pub fn remove(&mut self, element: &T) -> AsgardResult<()> {
        let (idx, link) = self
            .find(element)
            .ok_or_else(|| AsgardError::not_found(format!("{:?}", element)))?;
        let next = self.nodes[idx].next;
        match link {
            Link::Head => self.head = next,
            Link::Subtree(parent) => self.nodes[parent].subtree = next,
            Link::Next(prev) => self.nodes[prev].next = next,
        }
        self.compact();
        Ok(())
    }

    /// Check if `element` has a following sibling
    pub fn has_next(&self, element: &T) -> AsgardResult<bool> {
        Ok(self.nodes[self.locate(element)?].next.is_some())
    }

    /// Sibling following `element`
    pub fn next(&self, element: &T) -> AsgardResult<Option<&T>> {
        let idx = self.locate(element)?;
        Ok(self.nodes[idx].next.map(|n| &self.nodes[n].element))
    }

    /// Check if `element` owns a subtree
    pub fn has_subtree(&self, element: &T) -> AsgardResult<bool> {
        Ok(self.nodes[self.locate(element)?].subtree.is_some())
    }

    /// Direct children of `element`, in order
    pub fn children(&self, element: &T) -> AsgardResult<Vec<&T>> {
        let idx = self.locate(element)?;
        Ok(self
            .chain(self.nodes[idx].subtree)
            .map(|i| &self.nodes[i].element)
            .collect())
    }

    /// Chain of ancestors from the root level down to `element` inclusive
    pub fn path_to(&self, element: &T) -> Option<Vec<&T>> {
        let mut path = Vec::new();
        if self.path_in_chain(self.head, element, &mut path) {
            Some(path.into_iter().map(|i| &self.nodes[i].element).collect())
        } else {
            None
        }
    }

    fn path_in_chain(&self, first: Option<usize>, element: &T, path: &mut Vec<usize>) -> bool {
        for idx in self.chain(first) {
            path.push(idx);
            let node = &self.nodes[idx];
            if node.element == *element || self.path_in_chain(node.subtree, element, path) {
                return true;
            }
            path.pop();
        }
        false
    }
}

impl<T: PartialEq + Clone + fmt::Debug> OrderedTree<T> {
    /// Copy of the subtree owned by `element`, if any
    pub fn get_subtree(&self, element: &T) -> AsgardResult<Option<OrderedTree<T>>> {
        let idx = self.locate(element)?;
        Ok(self.nodes[idx].subtree.map(|sub| self.copy_chain(sub)))
    }

    fn copy_chain(&self, first: usize) -> OrderedTree<T> {
        let mut copy = OrderedTree::new();
        copy.head = Some(self.copy_into(&mut copy.nodes, first));
        copy
    }

    fn copy_into(&self, nodes: &mut Vec<Node<T>>, first: usize) -> usize {
        let mut head = None;
        let mut prev: Option<usize> = None;
        for idx in self.chain(Some(first)) {
            let node = &self.nodes[idx];
            nodes.push(Node {
                element: node.element.clone(),
                next: None,
                subtree: None,
            });
            let new_idx = nodes.len() - 1;
            if let Some(sub) = node.subtree {
                nodes[new_idx].subtree = Some(self.copy_into(nodes, sub));
            }
            match prev {
                Some(p) => nodes[p].next = Some(new_idx),
                None => head = Some(new_idx),
            }
            prev = Some(new_idx);
        }
        head.unwrap_or(0)
    }
}

impl<T: PartialEq> PartialEq for OrderedTree<T> {
    fn eq(&self, other: &Self) -> bool {
        self.chains_equal(self.head, other, other.head)
    }
}

impl<T: Eq> Eq for OrderedTree<T> {}

/// Pre-order iterator over an [`OrderedTree`]
pub struct Iter<'a, T> {
    tree: &'a OrderedTree<T>,
    stack: Vec<(usize, usize)>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = (usize, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        let (idx, depth) = self.stack.pop()?;
        let node = &self.tree.nodes[idx];
        if let Some(next) = node.next {
            self.stack.push((next, depth));
        }
        if let Some(sub) = node.subtree {
            self.stack.push((sub, depth + 1));
        }
        Some((depth, &node.element))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> OrderedTree<&'static str> {
        let mut tree = OrderedTree::new();
        tree.add("INBOX");
        tree.add("Work");
        tree.add("Archive");
        tree.add_child("Work/Reports", &"Work").unwrap();
        tree.add_child("Work/Clients", &"Work").unwrap();
        tree.add_child("Work/Clients/Acme", &"Work/Clients").unwrap();
        tree
    }

    #[test]
    fn test_equality_is_reflexive_and_symmetric() {
        let a = sample();
        let b = sample();
        assert_eq!(a, a);
        assert_eq!(a, b);
        assert_eq!(b, a);
    }

    #[test]
    fn test_equality_is_order_sensitive() {
        let mut a = OrderedTree::new();
        a.add("INBOX");
        a.add("Sent");
        let mut b = OrderedTree::new();
        b.add("Sent");
        b.add("INBOX");
        assert_ne!(a, b);
    }

    #[test]
    fn test_equality_checks_subtree_presence_and_chain_length() {
        let mut a = OrderedTree::new();
        a.add("Work");
        let mut b = a.clone();
        b.add_child("Work/Reports", &"Work").unwrap();
        assert_ne!(a, b);
        assert_ne!(b, a);

        a.add("Archive");
        let mut c = OrderedTree::new();
        c.add("Work");
        assert_ne!(a, c);
        assert_ne!(OrderedTree::<&str>::new(), c);
        assert_eq!(OrderedTree::<&str>::new(), OrderedTree::new());
    }

    #[test]
    fn test_add_then_remove_restores_tree() {
        let original = sample();
        let mut tree = original.clone();
        tree.add("Drafts");
        assert_ne!(tree, original);
        tree.remove(&"Drafts").unwrap();
        assert_eq!(tree, original);
        assert_eq!(tree.len(), original.len());
    }

    #[test]
    fn test_add_child_to_missing_parent() {
        let mut tree = sample();
        let err = tree.add_child("Lost/Child", &"Lost").unwrap_err();
        assert!(matches!(err, AsgardError::NotFound(_)));
        assert_eq!(tree, sample());
    }

    #[test]
    fn test_add_subtree_rejects_second_subtree() {
        let mut tree = sample();
        let mut extra = OrderedTree::new();
        extra.add("Work/Misc");

        let err = tree.add_subtree(extra.clone(), &"Work").unwrap_err();
        assert!(matches!(err, AsgardError::StructuralConflict(_)));

        tree.add_subtree(extra, &"Archive").unwrap();
        assert_eq!(tree.children(&"Archive").unwrap(), vec![&"Work/Misc"]);

        let err = tree
            .add_subtree(OrderedTree::new(), &"Nowhere")
            .unwrap_err();
        assert!(matches!(err, AsgardError::NotFound(_)));
    }

    #[test]
    fn test_remove_root_promotes_next_sibling() {
        let mut tree = sample();
        tree.remove(&"INBOX").unwrap();
        assert_eq!(tree.root(), Some(&"Work"));
        assert_eq!(tree.roots().collect::<Vec<_>>(), vec![&"Work", &"Archive"]);
    }

    #[test]
    fn test_remove_discards_subtree() {
        let mut tree = sample();
        tree.remove(&"Work").unwrap();
        assert!(!tree.contains(&"Work/Clients/Acme"));
        assert_eq!(tree.len(), 2);
        assert_eq!(tree.next(&"INBOX").unwrap(), Some(&"Archive"));
    }

    #[test]
    fn test_remove_first_child_keeps_siblings() {
        let mut tree = sample();
        tree.remove(&"Work/Reports").unwrap();
        assert_eq!(tree.children(&"Work").unwrap(), vec![&"Work/Clients"]);
        tree.remove(&"Work/Clients").unwrap();
        assert!(!tree.has_subtree(&"Work").unwrap());
        assert!(matches!(tree.remove(&"Work/Clients"), Err(AsgardError::NotFound(_))));
    }

    #[test]
    fn test_traversal_helpers() {
        let tree = sample();
        assert!(tree.has_next(&"INBOX").unwrap());
        assert!(!tree.has_next(&"Archive").unwrap());
        assert!(tree.has_subtree(&"Work").unwrap());
        assert!(!tree.has_subtree(&"INBOX").unwrap());

        let sub = tree.get_subtree(&"Work").unwrap().unwrap();
        let mut expected = OrderedTree::new();
        expected.add("Work/Reports");
        expected.add("Work/Clients");
        expected.add_child("Work/Clients/Acme", &"Work/Clients").unwrap();
        assert_eq!(sub, expected);
        assert!(tree.get_subtree(&"INBOX").unwrap().is_none());
        assert!(tree.has_next(&"Missing").is_err());
    }

    #[test]
    fn test_path_and_preorder_walk() {
        let tree = sample();
        assert_eq!(
            tree.path_to(&"Work/Clients/Acme").unwrap(),
            vec![&"Work", &"Work/Clients", &"Work/Clients/Acme"]
        );
        assert!(tree.path_to(&"Missing").is_none());

        let walk: Vec<_> = tree.iter().map(|(depth, e)| (depth, *e)).collect();
        assert_eq!(
            walk,
            vec![
                (0, "INBOX"),
                (0, "Work"),
                (1, "Work/Reports"),
                (1, "Work/Clients"),
                (2, "Work/Clients/Acme"),
                (0, "Archive"),
            ]
        );
    }
}
