//! The decoded grant and its matching rules.
//!
//! A payload carries two canonical Huffman codes: one over the word
//! dictionary (path segments, `$variables`, and the empty terminator word)
//! and one over the anonymous path nodes themselves. The node section is,
//! for each node in order starting at the root, a run of
//! `(word code, path-node code)` edge pairs closed by the empty word's
//! code. Node references are free-form: parents may share a child, and a
//! hostile payload may even form a cycle, so traversal is always bounded
//! by the request path and enumeration carries a cycle guard and an
//! output cap.

use rayon::prelude::*;

use crate::bitstream::BitReader;
use crate::header;
use crate::huffman::CodeTable;
use crate::DecodeError;

/// An index listing file is authorized directly beneath any reachable
/// node, modeled or not.
const LISTING: &str = "listing";

/// Batches below this run sequentially in [`PathTree::match_paths`].
const PARALLEL_BATCH_MIN: usize = 2;

/// Upper bound on paths emitted by [`PathTree::paths`]. Shared children
/// multiply path counts, so a few dozen nodes can describe far more
/// concrete paths than any real grant carries.
pub const MAX_ENUMERATED_PATHS: usize = 65_536;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct PathNode {
    /// Edge words in insertion order; a word can fan out to several
    /// children.
    edges: Vec<(String, Vec<usize>)>,
    terminal: bool,
}

/// Immutable trie decoded from one content-access grant. Safe to share
/// across threads for concurrent matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTree {
    /// Node 0 is the root.
    nodes: Vec<PathNode>,
}

impl PathTree {
    /// Decodes a grant payload as extracted from the certificate
    /// extension. The resulting tree is immutable; all failures are
    /// reported, never mapped onto a default tree.
    pub fn try_from_payload(payload: &[u8]) -> Result<Self, DecodeError> {
        if payload.is_empty() {
            return Err(DecodeError::EmptyPayload);
        }

        let (words, dict_len) = header::decode_dictionary(payload)?;
        let mut bits = BitReader::new(&payload[dict_len..]);
        let node_count = header::read_node_count(&mut bits)?;

        // the root carries no code, so a decodable tree needs at least one
        // coded path node; every node also costs at least its one-bit
        // terminator in the stream
        if node_count < 2 {
            return Err(DecodeError::MalformedHeader("node count too small"));
        }
        if node_count > bits.remaining_bits() as u64 {
            return Err(DecodeError::MalformedHeader("node count exceeds payload"));
        }
        let node_count = node_count as usize;

        let word_table = CodeTable::build(
            words
                .iter()
                .enumerate()
                .map(|(i, w)| (i as u64 + 1, w.as_str())),
        )?;
        let path_table = CodeTable::build((1..node_count).map(|i| (i as u64, i)))?;

        let mut nodes = vec![PathNode::default(); node_count];
        let mut edge_total = 0usize;
        for i in 0..node_count {
            loop {
                let word = match word_table.decode_next(&mut bits)? {
                    Some(w) if !w.is_empty() => *w,
                    // empty word closes this node; end of stream closes
                    // every remaining node
                    _ => break,
                };
                let child = match path_table.decode_next(&mut bits)? {
                    Some(&c) => c,
                    None => return Err(DecodeError::TruncatedInput),
                };
                let node = &mut nodes[i];
                match node.edges.iter_mut().find(|(w, _)| w.as_str() == word) {
                    Some((_, children)) => children.push(child),
                    None => node.edges.push((word.to_owned(), vec![child])),
                }
                edge_total += 1;
            }
        }
        for node in &mut nodes {
            node.terminal = node.edges.is_empty();
        }

        tracing::debug!(
            words = words.len(),
            node_count,
            edges = edge_total,
            "decoded content-path grant"
        );
        Ok(PathTree { nodes })
    }

    /// Authorization verdict for one candidate path. Fail-closed: any
    /// path a malformed or empty tree cannot place is denied, and this
    /// never errors.
    pub fn match_path(&self, path: &str) -> bool {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        self.matches(0, &segments)
    }

    /// Bulk verdicts; larger batches are evaluated in parallel.
    pub fn match_paths(&self, paths: &[&str]) -> Vec<bool> {
        if paths.len() >= PARALLEL_BATCH_MIN {
            paths.par_iter().map(|p| self.match_path(p)).collect()
        } else {
            paths.iter().map(|p| self.match_path(p)).collect()
        }
    }

    fn matches(&self, idx: usize, segments: &[&str]) -> bool {
        let node = &self.nodes[idx];
        if node.terminal {
            // everything beneath a terminal node is granted
            return true;
        }
        let Some((segment, rest)) = segments.split_first() else {
            return false;
        };
        if *segment == LISTING && rest.is_empty() {
            return true;
        }
        for (word, children) in &node.edges {
            let applies = word.as_str() == *segment || word.starts_with('$');
            if applies && children.iter().any(|&c| self.matches(c, rest)) {
                return true;
            }
        }
        false
    }

    /// Enumerates the concrete paths this grant authorizes, in decode
    /// order. Variable segments are reported verbatim. Cyclic node
    /// references (possible only in hostile payloads) are skipped rather
    /// than followed, and enumeration stops after
    /// [`MAX_ENUMERATED_PATHS`] entries so a payload whose nodes share
    /// children combinatorially cannot exhaust memory.
    pub fn paths(&self) -> Vec<String> {
        let mut out = Vec::new();
        let mut prefix: Vec<&str> = Vec::new();
        let mut on_stack = vec![false; self.nodes.len()];
        self.collect_paths(0, &mut prefix, &mut on_stack, &mut out);
        if out.len() >= MAX_ENUMERATED_PATHS {
            tracing::warn!(limit = MAX_ENUMERATED_PATHS, "path enumeration truncated");
        }
        out
    }

    fn collect_paths<'a>(
        &'a self,
        idx: usize,
        prefix: &mut Vec<&'a str>,
        on_stack: &mut [bool],
        out: &mut Vec<String>,
    ) {
        if on_stack[idx] || out.len() >= MAX_ENUMERATED_PATHS {
            return;
        }
        let node = &self.nodes[idx];
        if node.terminal {
            out.push(format!("/{}", prefix.join("/")));
            return;
        }
        on_stack[idx] = true;
        for (word, children) in &node.edges {
            prefix.push(word.as_str());
            for &child in children {
                self.collect_paths(child, prefix, on_stack, out);
            }
            prefix.pop();
        }
        on_stack[idx] = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    // Builds a tree from the JSON shape used throughout these tests:
    // object keys are edge words, values are arrays of child objects, and
    // an empty object is a terminal node.
    fn tree(v: Value) -> PathTree {
        fn add(v: &Value, nodes: &mut Vec<PathNode>) -> usize {
            let obj = v.as_object().expect("node must be an object");
            let idx = nodes.len();
            nodes.push(PathNode {
                edges: Vec::new(),
                terminal: obj.is_empty(),
            });
            for (word, children) in obj {
                let ids: Vec<usize> = children
                    .as_array()
                    .expect("children must be an array")
                    .iter()
                    .map(|c| add(c, nodes))
                    .collect();
                nodes[idx].edges.push((word.clone(), ids));
            }
            idx
        }
        let mut nodes = Vec::new();
        add(&v, &mut nodes);
        PathTree { nodes }
    }

    #[test]
    fn literal_matching() {
        let t = tree(json!({"foo": [{"path": [{"bar": [{}]}]}]}));
        assert!(t.match_path("/foo/path/bar"));
        assert!(t.match_path("/foo/path/bar/"));
        assert!(t.match_path("/foo/path/bar/a/b/c"));
        assert!(!t.match_path("/foo/path/alfred"));
        assert!(!t.match_path("/foo/path"));
        assert!(!t.match_path("/foo"));
        assert!(!t.match_path("/"));
    }

    #[test]
    fn listing_rule() {
        let t = tree(json!({"foo": [{"path": [{"bar": [{}]}]}]}));
        assert!(t.match_path("/foo/path/bar/listing"));
        assert!(t.match_path("/foo/path/listing"));
        assert!(t.match_path("/foo/listing"));
        assert!(t.match_path("/listing"));
        assert!(!t.match_path("/foo/path/listing/for/alfred"));
    }

    #[test]
    fn variable_matching() {
        let t = tree(json!({"foo": [{"$releasever": [{"bar": [{}]}]}]}));
        assert!(t.match_path("/foo/path/bar"));
        assert!(!t.match_path("/foo/path/abc"));
    }

    #[test]
    fn leading_variable() {
        let t = tree(json!({"$anything": [{"$releasever": [{"bar": [{}]}]}]}));
        assert!(t.match_path("/foo/path/bar"));
        assert!(!t.match_path("/foo/path/abc"));
    }

    #[test]
    fn trailing_variable() {
        let t = tree(json!({"foo": [{"$releasever": [{"$bar": [{}]}]}]}));
        assert!(t.match_path("/foo/path/bar"));
        assert!(t.match_path("/foo/path/abc"));
        assert!(!t.match_path("/boo/path/abc"));
    }

    #[test]
    fn variable_and_literal_siblings() {
        // a variable sibling can match the literal text of another branch,
        // so authorization holds through either; key order and sibling
        // grouping must not matter
        let arrangements = [
            json!({"foo": [{"$releasever": [{"bar": [{}]}],
                            "jarjar": [{"binks": [{}]}]}]}),
            json!({"foo": [{"jarjar": [{"binks": [{}]}],
                            "$releasever": [{"bar": [{}]}]}]}),
            json!({"foo": [{"$releasever": [{"bar": [{}]}]},
                           {"jarjar": [{"binks": [{}]}]}]}),
            json!({"foo": [{"jarjar": [{"binks": [{}]}]},
                           {"$releasever": [{"bar": [{}]}]}]}),
        ];
        for shape in arrangements {
            let t = tree(shape);
            assert!(t.match_path("/foo/path/bar"));
            assert!(!t.match_path("/foo/path/abc"));
            assert!(t.match_path("/foo/jarjar/binks"));
            assert!(t.match_path("/foo/jarjar/bar"));
            assert!(!t.match_path("/foo/jarjar/notbinks"));
        }
    }

    #[test]
    fn terminal_root_grants_everything() {
        let t = tree(json!({}));
        assert!(t.match_path("/"));
        assert!(t.match_path("/anything/at/all"));
    }

    #[test]
    fn empty_tree_fails_closed() {
        // a non-terminal node with no matching edges denies every path
        let t = PathTree {
            nodes: vec![PathNode {
                edges: vec![("foo".to_owned(), vec![0])],
                terminal: false,
            }],
        };
        assert!(!t.match_path("/bar"));
        assert!(!t.match_path("/"));
    }

    #[test]
    fn slashes_are_normalized() {
        let t = tree(json!({"foo": [{"bar": [{}]}]}));
        assert!(t.match_path("//foo///bar//"));
        assert!(t.match_path("foo/bar"));
    }

    #[test]
    fn paths_enumeration() {
        let t = tree(json!({"foo": [{"path": [{"bar": [{}], "baz": [{}]}]}]}));
        assert_eq!(t.paths(), vec!["/foo/path/bar", "/foo/path/baz"]);
        assert_eq!(tree(json!({})).paths(), vec!["/"]);
    }

    #[test]
    fn paths_enumeration_is_capped() {
        // a chain of nodes whose two edges share the next node doubles
        // the path count at every level; enumeration must stop at the
        // cap instead of materializing 2^20 strings
        let depth = 20;
        let mut nodes: Vec<PathNode> = (0..depth)
            .map(|i| PathNode {
                edges: vec![
                    ("a".to_owned(), vec![i + 1]),
                    ("b".to_owned(), vec![i + 1]),
                ],
                terminal: false,
            })
            .collect();
        nodes.push(PathNode {
            edges: Vec::new(),
            terminal: true,
        });
        let t = PathTree { nodes };
        assert_eq!(t.paths().len(), MAX_ENUMERATED_PATHS);
        // matching stays exact past the cap
        assert!(t.match_path("/a/b/a/b/a/b/a/b/a/b/a/b/a/b/a/b/a/b/a/b"));
    }

    #[test]
    fn match_paths_bulk() {
        let t = tree(json!({"foo": [{"bar": [{}]}]}));
        let verdicts = t.match_paths(&["/foo/bar", "/foo/baz", "/foo/bar/deep", "/listing"]);
        assert_eq!(verdicts, vec![true, false, true, true]);
    }
}
