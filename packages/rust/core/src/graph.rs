//! Static description of the pipeline flow.
//!
//! The flow is fixed; this module exists so the CLI can print it and so the
//! step names used in logs come from one place.

use crate::state::Route;

/// A step of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Node {
    Start,
    CallSearch,
    FetchLocalDocument,
    GenerateAnswer,
    ForwardToUser,
    ForwardToAttendant,
    End,
}

impl Node {
    pub const ALL: [Node; 7] = [
        Node::Start,
        Node::CallSearch,
        Node::FetchLocalDocument,
        Node::GenerateAnswer,
        Node::ForwardToUser,
        Node::ForwardToAttendant,
        Node::End,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Start => "__start__",
            Self::CallSearch => "call_search",
            Self::FetchLocalDocument => "fetch_local_document",
            Self::GenerateAnswer => "generate_answer",
            Self::ForwardToUser => "forward_to_user",
            Self::ForwardToAttendant => "forward_to_attendant",
            Self::End => "__end__",
        }
    }

    /// Human label used in progress output and diagrams.
    pub fn label(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::CallSearch => "Searching index",
            Self::FetchLocalDocument => "Loading local document",
            Self::GenerateAnswer => "Generating answer",
            Self::ForwardToUser => "Forward to user",
            Self::ForwardToAttendant => "Forward to attendant",
            Self::End => "end",
        }
    }
}

impl From<Route> for Node {
    fn from(route: Route) -> Self {
        match route {
            Route::ForwardToUser => Node::ForwardToUser,
            Route::ForwardToAttendant => Node::ForwardToAttendant,
        }
    }
}

/// A directed edge; `condition` labels the two branches after synthesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub from: Node,
    pub to: Node,
    pub condition: Option<&'static str>,
}

const fn edge(from: Node, to: Node) -> Edge {
    Edge {
        from,
        to,
        condition: None,
    }
}

/// Every edge of the flow, in execution order.
pub const EDGES: [Edge; 7] = [
    edge(Node::Start, Node::CallSearch),
    edge(Node::CallSearch, Node::FetchLocalDocument),
    edge(Node::FetchLocalDocument, Node::GenerateAnswer),
    Edge {
        from: Node::GenerateAnswer,
        to: Node::ForwardToUser,
        condition: Some("relevant"),
    },
    Edge {
        from: Node::GenerateAnswer,
        to: Node::ForwardToAttendant,
        condition: Some("not relevant"),
    },
    edge(Node::ForwardToUser, Node::End),
    edge(Node::ForwardToAttendant, Node::End),
];

/// Render the flow as a Mermaid flowchart.
pub fn mermaid() -> String {
    let mut out = String::from("flowchart TD\n");

    for node in Node::ALL {
        let line = match node {
            Node::Start | Node::End => format!("    {}([{}])\n", node.name(), node.label()),
            Node::GenerateAnswer => format!("    {}{{{}}}\n", node.name(), node.label()),
            _ => format!("    {}[{}]\n", node.name(), node.label()),
        };
        out.push_str(&line);
    }

    for e in EDGES {
        let line = match e.condition {
            Some(cond) => format!("    {} -. {} .-> {}\n", e.from.name(), cond, e.to.name()),
            None => format!("    {} --> {}\n", e.from.name(), e.to.name()),
        };
        out.push_str(&line);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mermaid_lists_every_edge() {
        let chart = mermaid();
        assert!(chart.starts_with("flowchart TD\n"));
        assert!(chart.contains("__start__ --> call_search"));
        assert!(chart.contains("call_search --> fetch_local_document"));
        assert!(chart.contains("fetch_local_document --> generate_answer"));
        assert!(chart.contains("generate_answer -. relevant .-> forward_to_user"));
        assert!(chart.contains("generate_answer -. not relevant .-> forward_to_attendant"));
        assert!(chart.contains("forward_to_attendant --> __end__"));
        assert!(chart.contains("generate_answer{Generating answer}"));
    }

    #[test]
    fn only_synthesis_branches() {
        let branching: Vec<_> = EDGES.iter().filter(|e| e.condition.is_some()).collect();
        assert_eq!(branching.len(), 2);
        assert!(branching.iter().all(|e| e.from == Node::GenerateAnswer));
    }

    #[test]
    fn routes_map_to_terminal_nodes() {
        assert_eq!(Node::from(Route::ForwardToUser).name(), Route::ForwardToUser.as_str());
        assert_eq!(
            Node::from(Route::ForwardToAttendant).name(),
            Route::ForwardToAttendant.as_str()
        );
    }
}
