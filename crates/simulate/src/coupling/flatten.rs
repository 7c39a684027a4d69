//! Resolves a nested [`SystemDescriptor`] into flat slots and an ordered
//! list of connections.
//!
//! Every connector in the tree becomes a slot addressed by its dotted path
//! (`sub.comp.y`, `sub.u`, `u`). Connections become slot pairs, sorted so
//! that a connection reading a slot runs after every connection writing it.

use std::collections::{HashMap, HashSet};

use petgraph::{algo::toposort, graph::DiGraph};
use tandem_core::{Value, ValueKind};

use super::{
    descriptor::{
        ComponentElement, Connection, ConnectorKind, Element, LinearTransformation, SystemDescriptor,
    },
    error::SystemError,
};

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Slot {
    pub path: String,
    pub value_kind: ValueKind,
    pub connector: ConnectorKind,
    /// Index of the owning component, or `None` for a system connector.
    pub component: Option<usize>,
    /// Connector name within its owner.
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FlatComponent {
    pub path: String,
    pub element: ComponentElement,
    /// Nesting depth of the enclosing system, zero at the top.
    pub depth: usize,
    pub slots: Vec<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct FlatConnection {
    pub from: usize,
    pub to: usize,
    pub transformation: Option<LinearTransformation>,
}

impl FlatConnection {
    /// Value written to the end slot for `value` at the start slot.
    pub fn carry(&self, value: &Value) -> Value {
        match (self.transformation, value) {
            (Some(transformation), Value::Real(x)) => Value::Real(transformation.apply(*x)),
            _ => value.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Binding {
    Slot { slot: usize, value: Value },
    Variable { component: usize, name: String, value: Value },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct FlatSystem {
    pub name: String,
    /// Components in declaration order.
    pub components: Vec<FlatComponent>,
    pub slots: Vec<Slot>,
    /// Connections in propagation order.
    pub connections: Vec<FlatConnection>,
    /// Bindings in application order, inner systems first.
    pub bindings: Vec<Binding>,
    /// Input connectors of the top-level system.
    pub inputs: HashMap<String, usize>,
}

impl FlatSystem {
    /// Component indices with the most deeply nested first.
    pub fn instantiation_order(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.components.len()).collect();
        order.sort_by_key(|&i| std::cmp::Reverse(self.components[i].depth));
        order
    }
}

/// Flattens `descriptor`.
///
/// # Errors
///
/// Returns the first structural problem found.
pub(crate) fn flatten(descriptor: &SystemDescriptor) -> Result<FlatSystem, SystemError> {
    let mut flat = FlatSystem {
        name: descriptor.name.clone(),
        ..FlatSystem::default()
    };
    let mut connections = Vec::new();
    let scope = flat.add_system(descriptor, "", 0, &mut connections)?;

    flat.inputs = scope
        .connectors
        .iter()
        .filter(|&(_, &slot)| flat.slots[slot].connector == ConnectorKind::Input)
        .map(|(name, &slot)| (name.clone(), slot))
        .collect();
    flat.connections = flat.order(connections)?;
    Ok(flat)
}

struct Scope {
    path: String,
    connectors: HashMap<String, usize>,
    elements: HashMap<String, Member>,
}

enum Member {
    Component {
        index: usize,
        connectors: HashMap<String, usize>,
    },
    System(Scope),
}

impl Member {
    fn connector(&self, name: &str) -> Option<usize> {
        match self {
            Self::Component { connectors, .. } => connectors.get(name).copied(),
            Self::System(scope) => scope.connectors.get(name).copied(),
        }
    }
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_owned()
    } else {
        format!("{prefix}.{name}")
    }
}

impl FlatSystem {
    fn add_system(
        &mut self,
        system: &SystemDescriptor,
        prefix: &str,
        depth: usize,
        connections: &mut Vec<FlatConnection>,
    ) -> Result<Scope, SystemError> {
        let mut scope = Scope {
            path: if prefix.is_empty() {
                system.name.clone()
            } else {
                prefix.to_owned()
            },
            connectors: HashMap::new(),
            elements: HashMap::new(),
        };

        for connector in &system.connectors {
            let slot = self.slots.len();
            if scope.connectors.insert(connector.name.clone(), slot).is_some() {
                return Err(SystemError::DuplicateElement {
                    system: scope.path.clone(),
                    name: connector.name.clone(),
                });
            }
            self.slots.push(Slot {
                path: join(prefix, &connector.name),
                value_kind: connector.value_kind,
                connector: connector.kind,
                component: None,
                name: connector.name.clone(),
            });
        }

        for element in &system.elements {
            let name = element.name();
            if scope.elements.contains_key(name) {
                return Err(SystemError::DuplicateElement {
                    system: scope.path.clone(),
                    name: name.to_owned(),
                });
            }
            let path = join(prefix, name);
            let member = match element {
                Element::Component(component) => self.add_component(component, path, depth)?,
                Element::System(inner) => {
                    Member::System(self.add_system(inner, &path, depth + 1, connections)?)
                }
            };
            scope.elements.insert(name.to_owned(), member);
        }

        for connection in &system.connections {
            connections.push(self.resolve_connection(&scope, connection)?);
        }

        for binding in &system.parameter_bindings {
            let resolved = match resolve_binding(&scope, &binding.name)? {
                Target::Slot(slot) => Binding::Slot {
                    slot,
                    value: binding.value.clone(),
                },
                Target::Variable(component, name) => Binding::Variable {
                    component,
                    name,
                    value: binding.value.clone(),
                },
            };
            self.bindings.push(resolved);
        }

        Ok(scope)
    }

    fn add_component(
        &mut self,
        component: &ComponentElement,
        path: String,
        depth: usize,
    ) -> Result<Member, SystemError> {
        let index = self.components.len();
        let mut connectors = HashMap::new();
        let mut slots = Vec::with_capacity(component.connectors.len());

        for connector in &component.connectors {
            let slot = self.slots.len();
            if connectors.insert(connector.name.clone(), slot).is_some() {
                return Err(SystemError::DuplicateElement {
                    system: path,
                    name: connector.name.clone(),
                });
            }
            self.slots.push(Slot {
                path: join(&path, &connector.name),
                value_kind: connector.value_kind,
                connector: connector.kind,
                component: Some(index),
                name: connector.name.clone(),
            });
            slots.push(slot);
        }

        self.bindings
            .extend(component.parameter_bindings.iter().map(|binding| Binding::Variable {
                component: index,
                name: binding.name.clone(),
                value: binding.value.clone(),
            }));
        self.components.push(FlatComponent {
            path,
            element: component.clone(),
            depth,
            slots,
        });

        Ok(Member::Component { index, connectors })
    }

    /// Resolves one endpoint to its slot and whether it can be read from
    /// inside `scope`.
    fn endpoint(
        &self,
        scope: &Scope,
        element: Option<&str>,
        connector: &str,
    ) -> Result<(usize, bool), SystemError> {
        match element {
            None => {
                let slot = *scope
                    .connectors
                    .get(connector)
                    .ok_or_else(|| SystemError::UnknownConnector {
                        element: scope.path.clone(),
                        connector: connector.to_owned(),
                    })?;
                let readable = matches!(
                    self.slots[slot].connector,
                    ConnectorKind::Input | ConnectorKind::Parameter
                );
                Ok((slot, readable))
            }
            Some(element) => {
                let member = scope
                    .elements
                    .get(element)
                    .ok_or_else(|| SystemError::UnknownElement {
                        system: scope.path.clone(),
                        element: element.to_owned(),
                    })?;
                let slot = member
                    .connector(connector)
                    .ok_or_else(|| SystemError::UnknownConnector {
                        element: join(&scope.path, element),
                        connector: connector.to_owned(),
                    })?;
                let readable = matches!(
                    self.slots[slot].connector,
                    ConnectorKind::Output | ConnectorKind::CalculatedParameter
                );
                Ok((slot, readable))
            }
        }
    }

    fn resolve_connection(
        &self,
        scope: &Scope,
        connection: &Connection,
    ) -> Result<FlatConnection, SystemError> {
        let (from, readable) = self.endpoint(
            scope,
            connection.start_element.as_deref(),
            &connection.start_connector,
        )?;
        let (to, writes_back) = self.endpoint(
            scope,
            connection.end_element.as_deref(),
            &connection.end_connector,
        )?;
        let (start, end) = (&self.slots[from], &self.slots[to]);

        if !readable || writes_back {
            return Err(SystemError::ConnectionDirection {
                from: start.path.clone(),
                to: end.path.clone(),
            });
        }
        if start.value_kind != end.value_kind {
            return Err(SystemError::ConnectionTypeMismatch {
                from: start.path.clone(),
                from_kind: start.value_kind,
                to: end.path.clone(),
                to_kind: end.value_kind,
            });
        }
        if connection.transformation.is_some() && start.value_kind != ValueKind::Real {
            return Err(SystemError::InvalidTransform {
                from: start.path.clone(),
                to: end.path.clone(),
                kind: start.value_kind,
            });
        }

        Ok(FlatConnection {
            from,
            to,
            transformation: connection.transformation,
        })
    }

    /// Sorts connections by the depth of their start slot in the connector
    /// graph, keeping declaration order among equals.
    fn order(&self, mut connections: Vec<FlatConnection>) -> Result<Vec<FlatConnection>, SystemError> {
        let mut ends = HashSet::new();
        for connection in &connections {
            if !ends.insert(connection.to) {
                return Err(SystemError::MultipleSources {
                    connector: self.slots[connection.to].path.clone(),
                });
            }
        }

        let mut graph = DiGraph::<usize, ()>::with_capacity(self.slots.len(), connections.len());
        let nodes: Vec<_> = (0..self.slots.len()).map(|slot| graph.add_node(slot)).collect();
        for connection in &connections {
            graph.add_edge(nodes[connection.from], nodes[connection.to], ());
        }

        let sorted = toposort(&graph, None).map_err(|cycle| SystemError::ConnectionCycle {
            connector: self.slots[graph[cycle.node_id()]].path.clone(),
        })?;

        let mut depth = vec![0_usize; self.slots.len()];
        for node in sorted {
            let from = graph[node];
            for next in graph.neighbors(node) {
                let to = graph[next];
                depth[to] = depth[to].max(depth[from] + 1);
            }
        }

        connections.sort_by_key(|connection| depth[connection.from]);
        Ok(connections)
    }
}

enum Target {
    Slot(usize),
    Variable(usize, String),
}

fn resolve_binding(scope: &Scope, name: &str) -> Result<Target, SystemError> {
    if let Some(&slot) = scope.connectors.get(name) {
        return Ok(Target::Slot(slot));
    }
    let Some((head, rest)) = name.split_once('.') else {
        return Err(SystemError::UnknownConnector {
            element: scope.path.clone(),
            connector: name.to_owned(),
        });
    };
    match scope.elements.get(head) {
        None => Err(SystemError::UnknownElement {
            system: scope.path.clone(),
            element: head.to_owned(),
        }),
        Some(Member::Component { index, .. }) => Ok(Target::Variable(*index, rest.to_owned())),
        Some(Member::System(inner)) => resolve_binding(inner, rest),
    }
}
