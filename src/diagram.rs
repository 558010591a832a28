use std::fmt::Write;

use crate::trace::HeapStoreMapping;

/// Where a node sits relative to the ones drawn before it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// First node of its row with nothing to hang off.
    Anchor,
    RightOf(String),
    Below(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub label: String,
    pub value: String,
    pub placement: Placement,
}

/// Pointer from a variable to the heap cell its value names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagram {
    pub variables: Vec<Node>,
    pub cells: Vec<Node>,
    pub edges: Vec<Edge>,
}

fn chain<'a>(
    entries: impl Iterator<Item = (&'a str, &'a str)>,
    anchor: Option<&str>,
) -> Vec<Node> {
    let mut nodes: Vec<Node> = Vec::new();
    for (label, value) in entries {
        let placement = match (nodes.last(), anchor) {
            (Some(previous), _) => Placement::RightOf(previous.label.clone()),
            (None, Some(above)) => Placement::Below(above.to_owned()),
            (None, None) => Placement::Anchor,
        };
        nodes.push(Node {
            label: label.to_owned(),
            value: value.to_owned(),
            placement,
        });
    }
    nodes
}

/// Lays the store out as one row and the heap as a second row under the first
/// variable, then links every variable whose value is a heap address.
pub fn build(heap: &HeapStoreMapping, store: &HeapStoreMapping) -> Diagram {
    let variables = chain(store.iter(), None);
    let first_var = variables.first().map(|node| node.label.as_str());
    let cells = chain(heap.iter(), first_var);

    let mut edges = Vec::new();
    for (var, value) in store.iter() {
        for (address, _) in heap.iter() {
            if value == address {
                edges.push(Edge {
                    from: var.to_owned(),
                    to: address.to_owned(),
                });
            }
        }
    }

    Diagram {
        variables,
        cells,
        edges,
    }
}

impl Placement {
    fn tikz(&self) -> String {
        match self {
            Placement::Anchor => String::new(),
            Placement::RightOf(node) => format!("[right of={node}]"),
            Placement::Below(node) => format!("[below of={node}]"),
        }
    }
}

impl Diagram {
    /// TikZ picture using the `var` and `hea` node styles from the slide preamble.
    pub fn to_tikz(&self) -> String {
        let mut out = String::from("\\begin{tikzpicture}");
        out.push_str("[->,>=triangle 45,auto,semithick,node distance=2.0cm]\n");
        for node in &self.variables {
            let _ = writeln!(
                out,
                "  \\node[var] ({}) {} {{\\il{{{}}} \\nodepart{{lower}} {}}};",
                node.label,
                node.placement.tikz(),
                node.label,
                node.value
            );
        }
        for node in &self.cells {
            let _ = writeln!(
                out,
                "  \\node[hea] ({}) {} {{\\il{{{}}} \\nodepart{{second}} {}}};",
                node.label,
                node.placement.tikz(),
                node.label,
                node.value
            );
        }
        for Edge { from, to } in &self.edges {
            let _ = writeln!(out, "  \\path ({from}) edge node {{}} ({to});");
        }
        out.push_str("\\end{tikzpicture}\n");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(pairs: &[(&str, &str)]) -> HeapStoreMapping {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_single_pointer() {
        let diagram = build(&mapping(&[("a1", "5")]), &mapping(&[("x", "a1")]));
        assert_eq!(
            diagram.edges,
            [Edge {
                from: "x".into(),
                to: "a1".into()
            }]
        );
    }

    #[test]
    fn test_layout() {
        let store = mapping(&[("x", "1"), ("y", "2"), ("z", "1")]);
        let heap = mapping(&[("1", "7"), ("2", "8")]);
        let diagram = build(&heap, &store);

        let placements = diagram
            .variables
            .iter()
            .map(|n| n.placement.clone())
            .collect::<Vec<_>>();
        assert_eq!(
            placements,
            [
                Placement::Anchor,
                Placement::RightOf("x".into()),
                Placement::RightOf("y".into())
            ]
        );
        assert_eq!(diagram.cells[0].placement, Placement::Below("x".into()));
        assert_eq!(diagram.cells[1].placement, Placement::RightOf("1".into()));

        let edges = diagram
            .edges
            .iter()
            .map(|e| (e.from.as_str(), e.to.as_str()))
            .collect::<Vec<_>>();
        assert_eq!(edges, [("x", "1"), ("y", "2"), ("z", "1")]);
    }

    #[test]
    fn test_heap_without_store() {
        let diagram = build(&mapping(&[("4", "0")]), &HeapStoreMapping::new());
        assert!(diagram.variables.is_empty());
        assert_eq!(diagram.cells[0].placement, Placement::Anchor);
        assert!(diagram.edges.is_empty());
    }

    #[test]
    fn test_tikz_markup() {
        let diagram = build(&mapping(&[("a1", "5")]), &mapping(&[("x", "a1")]));
        let expected = "\\begin{tikzpicture}[->,>=triangle 45,auto,semithick,node distance=2.0cm]\n\
                        \x20 \\node[var] (x)  {\\il{x} \\nodepart{lower} a1};\n\
                        \x20 \\node[hea] (a1) [below of=x] {\\il{a1} \\nodepart{second} 5};\n\
                        \x20 \\path (x) edge node {} (a1);\n\
                        \\end{tikzpicture}\n";
        assert_eq!(diagram.to_tikz(), expected);
    }
}
