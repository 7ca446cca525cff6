use crate::config::{FaultTreeConfig, GateType};
use crate::state::StateMap;
use crate::TreeError;
use std::collections::HashMap;

pub type NodeId = usize;

/// Runtime event node. Nodes live in an [`EventArena`] and refer to their
/// children by index, which keeps DAG sharing (one node under several
/// parents) free of reference-counted graph shapes.
#[derive(Debug)]
pub struct EventNode {
    pub event_id: String,
    pub name: String,
    pub description: String,
    pub gate: GateType,
    pub fault_code: Option<String>,
    pub alert_id: Option<String>,
    pub is_basic: bool,
    pub children: Vec<NodeId>,
    /// State cache written by the last evaluation pass; read by the
    /// trigger-path collection.
    pub(crate) state: bool,
}

/// Flat node storage plus the index structures built from one config.
#[derive(Debug)]
pub struct EventArena {
    nodes: Vec<EventNode>,
}

#[derive(Debug)]
pub struct BuiltTree {
    pub arena: EventArena,
    /// Top events in config declaration order.
    pub top_events: Vec<NodeId>,
    /// `alert_id` → basic-event node.
    pub alert_bindings: HashMap<String, NodeId>,
}

impl EventArena {
    pub fn node(&self, id: NodeId) -> &EventNode {
        &self.nodes[id]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn push(&mut self, node: EventNode) -> NodeId {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    /// Materialize the runtime tree: basic nodes first, then intermediate
    /// and top nodes, then child wiring. A `NOT-` prefixed child reference
    /// allocates a fresh single-child NOT node around the referenced event.
    pub fn build(config: &FaultTreeConfig) -> Result<BuiltTree, TreeError> {
        let mut arena = EventArena { nodes: Vec::new() };
        let mut by_id: HashMap<String, NodeId> = HashMap::new();
        let mut alert_bindings = HashMap::new();

        for basic in &config.basic_events {
            let id = arena.push(EventNode {
                event_id: basic.event_id.clone(),
                name: basic.name.clone(),
                description: basic.description.clone(),
                gate: GateType::Basic,
                fault_code: None,
                alert_id: Some(basic.alert_id.clone()),
                is_basic: true,
                children: Vec::new(),
                state: false,
            });
            by_id.insert(basic.event_id.clone(), id);
            alert_bindings.insert(basic.alert_id.clone(), id);
        }

        for event in &config.intermediate_events {
            let id = arena.push(EventNode {
                event_id: event.event_id.clone(),
                name: event.name.clone(),
                description: event.description.clone(),
                gate: event.gate_type,
                fault_code: None,
                alert_id: None,
                is_basic: false,
                children: Vec::new(),
                state: false,
            });
            by_id.insert(event.event_id.clone(), id);
        }

        let mut top_events = Vec::with_capacity(config.top_events.len());
        for event in &config.top_events {
            let id = arena.push(EventNode {
                event_id: event.event_id.clone(),
                name: event.name.clone(),
                description: event.description.clone(),
                gate: event.gate_type,
                fault_code: Some(event.fault_code.clone()),
                alert_id: None,
                is_basic: false,
                children: Vec::new(),
                state: false,
            });
            by_id.insert(event.event_id.clone(), id);
            top_events.push(id);
        }

        for event in config.intermediate_events.iter().chain(&config.top_events) {
            let parent = by_id[&event.event_id];
            for child_ref in &event.children {
                let child = Self::resolve_child(&mut arena, &by_id, &event.event_id, child_ref)?;
                arena.nodes[parent].children.push(child);
            }
        }

        for &top in &top_events {
            arena.check_acyclic(top)?;
        }

        Ok(BuiltTree {
            arena,
            top_events,
            alert_bindings,
        })
    }

    fn resolve_child(
        arena: &mut EventArena,
        by_id: &HashMap<String, NodeId>,
        parent_id: &str,
        child_ref: &str,
    ) -> Result<NodeId, TreeError> {
        let (wrapped, target) = match child_ref.strip_prefix("NOT-") {
            Some(target) if !target.is_empty() => (true, target),
            _ => (false, child_ref),
        };

        let &child = by_id.get(target).ok_or_else(|| TreeError::MissingChild {
            parent: parent_id.to_string(),
            child: target.to_string(),
        })?;

        if !wrapped {
            return Ok(child);
        }

        let name = format!("NOT {}", arena.nodes[child].name);
        Ok(arena.push(EventNode {
            event_id: format!("NOT-{target}"),
            name,
            description: String::new(),
            gate: GateType::Not,
            fault_code: None,
            alert_id: None,
            is_basic: false,
            children: vec![child],
            state: false,
        }))
    }

    /// DFS cycle detection from one root. The config declares a DAG and the
    /// recursive evaluator depends on it.
    fn check_acyclic(&self, root: NodeId) -> Result<(), TreeError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            White,
            Gray,
            Black,
        }

        fn visit(arena: &EventArena, id: NodeId, marks: &mut [Mark]) -> Result<(), TreeError> {
            match marks[id] {
                Mark::Black => return Ok(()),
                Mark::Gray => {
                    return Err(TreeError::CycleDetected(arena.nodes[id].event_id.clone()))
                }
                Mark::White => {}
            }
            marks[id] = Mark::Gray;
            for i in 0..arena.nodes[id].children.len() {
                visit(arena, arena.nodes[id].children[i], marks)?;
            }
            marks[id] = Mark::Black;
            Ok(())
        }

        let mut marks = vec![Mark::White; self.nodes.len()];
        visit(self, root, &mut marks)
    }

    /// Recursive post-order evaluation with short-circuiting. Writes every
    /// visited node's state cache; basic nodes read from the state map.
    ///
    /// A node without children evaluates to `false` for every gate type —
    /// including AND, which diverges from classical Boolean logic on
    /// purpose: a childless gate has no evidence and must not fire.
    pub fn evaluate(&mut self, states: &StateMap, id: NodeId) -> bool {
        if self.nodes[id].is_basic {
            let state = states.get(&self.nodes[id].event_id);
            self.nodes[id].state = state;
            return state;
        }

        if self.nodes[id].children.is_empty() {
            self.nodes[id].state = false;
            return false;
        }

        let result = match self.nodes[id].gate {
            GateType::And => {
                let mut all = true;
                for i in 0..self.nodes[id].children.len() {
                    let child = self.nodes[id].children[i];
                    if !self.evaluate(states, child) {
                        all = false;
                        break;
                    }
                }
                all
            }
            GateType::Or => {
                let mut any = false;
                for i in 0..self.nodes[id].children.len() {
                    let child = self.nodes[id].children[i];
                    if self.evaluate(states, child) {
                        any = true;
                        break;
                    }
                }
                any
            }
            // NOT and BASIC gates consider only their first child.
            GateType::Not => {
                let child = self.nodes[id].children[0];
                !self.evaluate(states, child)
            }
            GateType::Basic => {
                let child = self.nodes[id].children[0];
                self.evaluate(states, child)
            }
        };

        self.nodes[id].state = result;
        result
    }

    /// Pre-order walk appending every node whose cached state is true,
    /// recursing into its children. For a firing top event this yields the
    /// full trigger path down to the responsible basic events.
    pub fn collect_trigger_path(&self, id: NodeId, path: &mut Vec<String>) {
        let node = &self.nodes[id];
        if !node.state {
            return;
        }
        path.push(node.event_id.clone());
        for &child in &node.children {
            self.collect_trigger_path(child, path);
        }
    }

    /// Basic-event subset of the trigger path.
    pub fn collect_basic_events(&self, id: NodeId, out: &mut Vec<String>) {
        let node = &self.nodes[id];
        if !node.state {
            return;
        }
        if node.is_basic {
            out.push(node.event_id.clone());
            return;
        }
        for &child in &node.children {
            self.collect_basic_events(child, out);
        }
    }
}
