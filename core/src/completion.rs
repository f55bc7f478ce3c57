//! Property completion over the script runtime's object graph.
//!
//! The engine is reached only through [`ObjectGraph`], so completion works
//! the same for any runtime that can answer "what is at this property",
//! "what properties does this object have" and "can this be called".

use std::collections::BTreeSet;
use tracing::trace;

/// Appended to candidates whose value is callable.
pub const CALLABLE_MARKER: char = '(';

/// Read-only view of a runtime's values.
pub trait ObjectGraph {
    type Value: Clone;

    /// The global scope object.
    fn global(&self) -> Self::Value;

    /// Looks up an own or inherited property.
    fn get_property(&self, object: &Self::Value, name: &str) -> Option<Self::Value>;

    fn own_properties(&self, object: &Self::Value) -> Vec<String>;

    /// Members reachable through the value's type rather than stored on it.
    fn inherited_properties(&self, _object: &Self::Value) -> Vec<String> {
        Vec::new()
    }

    /// Whether the value can have its properties walked.
    fn is_object(&self, value: &Self::Value) -> bool;

    fn is_callable(&self, value: &Self::Value) -> bool;
}

/// Completes a partial dotted expression such as `config.serv`.
///
/// Everything before the last `.` is resolved from the global scope; the
/// rest filters the resolved object's property names. Callable members get
/// [`CALLABLE_MARKER`]. The result is sorted and de-duplicated. Any
/// unresolvable segment yields an empty list.
pub fn complete<G: ObjectGraph + ?Sized>(graph: &G, partial: &str) -> Vec<String> {
    let (path, prefix) = match partial.rfind('.') {
        Some(dot) => (&partial[..dot], &partial[dot + 1..]),
        None => ("", partial),
    };

    let Some(target) = resolve(graph, path) else {
        trace!(path, "Completion path did not resolve");
        return Vec::new();
    };

    let mut names = graph.own_properties(&target);
    names.extend(graph.inherited_properties(&target));

    let candidates: BTreeSet<String> = names
        .into_iter()
        .filter(|name| name.starts_with(prefix))
        .map(|name| {
            let callable = graph
                .get_property(&target, &name)
                .is_some_and(|value| graph.is_callable(&value));
            if callable {
                format!("{name}{CALLABLE_MARKER}")
            } else {
                name
            }
        })
        .collect();

    candidates.into_iter().collect()
}

/// Walks one segment per dot in `path`, so the walk is bounded by the input
/// even when the graph has cycles.
fn resolve<G: ObjectGraph + ?Sized>(graph: &G, path: &str) -> Option<G::Value> {
    let mut current = graph.global();
    if path.is_empty() {
        return Some(current);
    }
    for segment in path.split('.') {
        if segment.is_empty() {
            return None;
        }
        let next = graph.get_property(&current, segment)?;
        if !graph.is_object(&next) {
            return None;
        }
        current = next;
    }
    Some(current)
}

/// Finds the dotted expression ending at `cursor`.
///
/// Returns the byte offset where the expression starts and the expression
/// itself. The offset where the replacement goes is just past the last `.`.
#[must_use]
pub fn expression_at(line: &str, cursor: usize) -> (usize, &str) {
    let cursor = cursor.min(line.len());
    let head = &line[..cursor];
    let start = head
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_alphanumeric() || *c == '_' || *c == '.')
        .last()
        .map_or(cursor, |(i, _)| i);
    (start, &head[start..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    /// A small in-memory graph. `Link` names another top-level binding so
    /// cycles can be expressed.
    #[derive(Clone, Debug)]
    enum Node {
        Object(BTreeMap<String, Node>),
        Link(&'static str),
        Function,
        Number,
        Null,
    }

    struct FakeGraph {
        globals: BTreeMap<String, Node>,
        methods: Vec<&'static str>,
    }

    impl FakeGraph {
        fn deref(&self, node: &Node) -> Node {
            match node {
                Node::Link(name) => self.globals.get(*name).cloned().unwrap_or(Node::Null),
                other => other.clone(),
            }
        }
    }

    impl ObjectGraph for FakeGraph {
        type Value = Node;

        fn global(&self) -> Node {
            Node::Object(self.globals.clone())
        }

        fn get_property(&self, object: &Node, name: &str) -> Option<Node> {
            match object {
                Node::Object(map) => map
                    .get(name)
                    .map(|n| self.deref(n))
                    .or_else(|| self.methods.contains(&name).then_some(Node::Function)),
                _ => None,
            }
        }

        fn own_properties(&self, object: &Node) -> Vec<String> {
            match object {
                Node::Object(map) => map.keys().cloned().collect(),
                _ => Vec::new(),
            }
        }

        fn inherited_properties(&self, object: &Node) -> Vec<String> {
            match object {
                Node::Object(_) => self.methods.iter().map(ToString::to_string).collect(),
                _ => Vec::new(),
            }
        }

        fn is_object(&self, value: &Node) -> bool {
            matches!(value, Node::Object(_))
        }

        fn is_callable(&self, value: &Node) -> bool {
            matches!(value, Node::Function)
        }
    }

    fn object(entries: &[(&str, Node)]) -> Node {
        Node::Object(
            entries
                .iter()
                .map(|(k, v)| ((*k).to_string(), v.clone()))
                .collect(),
        )
    }

    fn graph() -> FakeGraph {
        let mut globals = BTreeMap::new();
        globals.insert(
            "obj".to_string(),
            object(&[
                ("apple", Node::Number),
                ("apricot", Node::Number),
                ("banana", Node::Number),
                ("me", Node::Link("obj")),
            ]),
        );
        globals.insert(
            "tools".to_string(),
            object(&[("run", Node::Function), ("rate", Node::Number)]),
        );
        globals.insert("nothing".to_string(), Node::Null);
        globals.insert("print".to_string(), Node::Function);
        FakeGraph {
            globals,
            methods: Vec::new(),
        }
    }

    #[test]
    fn filters_by_prefix() {
        assert_eq!(complete(&graph(), "obj.ap"), vec!["apple", "apricot"]);
    }

    #[test]
    fn trailing_dot_lists_everything() {
        assert_eq!(
            complete(&graph(), "obj."),
            vec!["apple", "apricot", "banana", "me"]
        );
    }

    #[test]
    fn callables_are_marked() {
        assert_eq!(complete(&graph(), "tools.r"), vec!["rate", "run("]);
        assert_eq!(complete(&graph(), "pr"), vec!["print("]);
    }

    #[test]
    fn empty_input_lists_globals() {
        assert_eq!(
            complete(&graph(), ""),
            vec!["nothing", "obj", "print(", "tools"]
        );
    }

    #[test]
    fn missing_path_is_empty() {
        assert!(complete(&graph(), "nonexistent.deep.path.").is_empty());
        assert!(complete(&graph(), "obj.apple.x").is_empty());
    }

    #[test]
    fn null_intermediate_is_empty() {
        assert!(complete(&graph(), "nothing.").is_empty());
    }

    #[test]
    fn empty_segment_is_empty() {
        assert!(complete(&graph(), "obj..a").is_empty());
    }

    #[test]
    fn cycles_terminate() {
        let depth = format!("obj.me{}.a", ".me".repeat(200));
        assert_eq!(complete(&graph(), &depth), vec!["apple", "apricot"]);
    }

    #[test]
    fn inherited_members_are_merged_and_deduplicated() {
        let mut g = graph();
        g.methods = vec!["append", "apple"];
        assert_eq!(
            complete(&g, "obj.ap"),
            vec!["append(", "apple", "apricot"]
        );
    }

    #[test]
    fn expression_at_cursor() {
        assert_eq!(expression_at("let x = obj.ap", 14), (8, "obj.ap"));
        assert_eq!(expression_at("&tools.", 7), (1, "tools."));
        assert_eq!(expression_at("print(a", 7), (6, "a"));
        assert_eq!(expression_at("x ", 2), (2, ""));
        assert_eq!(expression_at("abc", 99), (0, "abc"));
    }
}
