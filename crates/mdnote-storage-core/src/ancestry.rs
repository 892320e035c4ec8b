//! Parent-chain reachability.
//!
//! Neither backend can ask "is X below folder B" directly, so recursive
//! listings walk each candidate's parents upward until the target folder is
//! found or the chain runs out. One walker is created per logical call and
//! memoises both outcomes per visited ancestor, so each ancestor is looked up
//! at most once no matter how many candidates share it. Cyclic parent graphs
//! are tolerated; negatives that depend on an open cycle are not memoised.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use futures::future::BoxFuture;
use tracing::{debug, warn};

use crate::error::StorageError;
use crate::model::{is_root_parent, ROOT_FOLDER_ID};

/// Source of parent links for a single item.
#[async_trait]
pub trait ParentLookup: Send + Sync {
    /// Parents of `id`, or `None` if the item is unknown.
    async fn parents_of(&self, id: &str) -> Result<Option<Vec<String>>, StorageError>;
}

#[async_trait]
impl ParentLookup for HashMap<String, Vec<String>> {
    async fn parents_of(&self, id: &str) -> Result<Option<Vec<String>>, StorageError> {
        Ok(self.get(id).cloned())
    }
}

/// Memoising descendant check against a fixed target folder.
pub struct AncestryWalker<'a, L: ParentLookup + ?Sized> {
    lookup: &'a L,
    target: String,
    memo: HashMap<String, bool>,
    in_progress: HashSet<String>,
    lookups: usize,
}

impl<'a, L: ParentLookup + ?Sized> AncestryWalker<'a, L> {
    pub fn new(lookup: &'a L, target: impl Into<String>) -> Self {
        Self {
            lookup,
            target: target.into(),
            memo: HashMap::new(),
            in_progress: HashSet::new(),
            lookups: 0,
        }
    }

    /// Number of parent lookups issued so far.
    pub fn lookups(&self) -> usize {
        self.lookups
    }

    /// Whether an item with `parents` sits below the target folder.
    ///
    /// The root is an ancestor of everything, so a root target always matches.
    pub async fn is_descendant(&mut self, parents: &[String]) -> bool {
        if self.target == ROOT_FOLDER_ID {
            return true;
        }
        for parent in parents {
            if self.walk(parent).await.0 {
                return true;
            }
        }
        false
    }

    /// Returns the outcome and whether a negative outcome leaned on an
    /// ancestor still being walked. Such negatives are only final once the
    /// walk has unwound to the top.
    fn walk<'s>(&'s mut self, id: &'s str) -> BoxFuture<'s, (bool, bool)> {
        Box::pin(async move {
            if id == self.target {
                return (true, false);
            }
            if is_root_parent(id) {
                return (false, false);
            }
            if let Some(&hit) = self.memo.get(id) {
                return (hit, false);
            }
            // Already on the current path: the graph has a cycle.
            if !self.in_progress.insert(id.to_string()) {
                debug!(ancestor = id, "Parent cycle detected, treating branch as no match");
                return (false, true);
            }

            self.lookups += 1;
            let parents = match self.lookup.parents_of(id).await {
                Ok(Some(parents)) => parents,
                Ok(None) => Vec::new(),
                Err(e) => {
                    warn!(
                        ancestor = id,
                        error = %e,
                        "Ancestor lookup failed, treating branch as no match"
                    );
                    Vec::new()
                }
            };

            let mut found = false;
            let mut provisional = false;
            for parent in &parents {
                let (hit, partial) = self.walk(parent).await;
                if hit {
                    found = true;
                    break;
                }
                provisional |= partial;
            }

            self.in_progress.remove(id);
            let settled = found || !provisional || self.in_progress.is_empty();
            if settled {
                self.memo.insert(id.to_string(), found);
            }
            (found, !settled)
        })
    }
}
