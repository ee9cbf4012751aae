//! Patch Graph
//!
//! Wires module outputs to module inputs and runs every module once per sample
//! in dependency order. Cables into the same input are summed (or, for gate
//! style inputs, the highest voltage wins); inputs without a cable carry their
//! declared default and are flagged as unpatched so modules can fall back to
//! their normalling.
//!
//! All per-node buffers are allocated by [`Patch::compile`]; [`Patch::tick`]
//! does not allocate.

use crate::port::{GraphModule, ParamId, PortId, PortSpec, PortValues};
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use slotmap::{DefaultKey, SlotMap};
use std::collections::{HashMap, VecDeque};

/// Unique identifier for a node in the patch graph
pub type NodeId = DefaultKey;

/// Unique identifier for a cable connection
pub type CableId = usize;

/// Reference to a specific port on a specific node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortRef {
    pub node: NodeId,
    pub port: PortId,
}

/// A cable connecting two ports
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cable {
    pub from: PortRef,
    pub to: PortRef,
    /// Optional gain applied to the source (0.0–1.0)
    pub attenuation: Option<f64>,
}

/// Compiled view of one cable arriving at a node
#[derive(Debug, Clone, Copy)]
struct Incoming {
    from: PortRef,
    port: PortId,
    gain: f64,
    summable: bool,
}

struct Node {
    module: Box<dyn GraphModule>,
    name: String,
    outputs: PortValues,
    incoming: Vec<Incoming>,
}

/// Error types for patch operations
#[derive(Debug, Clone, PartialEq)]
pub enum PatchError {
    InvalidNode,
    InvalidPort,
    InvalidCable,
    CycleDetected { nodes: Vec<NodeId> },
    UnknownModuleType(String),
    UnknownModule(String),
    DuplicateModule(String),
    InvalidConfig(String),
    UnknownPort { module: String, port: String },
    BadPortRef(String),
    State { module: String, message: String },
}

impl std::fmt::Display for PatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PatchError::InvalidNode => write!(f, "Invalid node"),
            PatchError::InvalidPort => write!(f, "Invalid port"),
            PatchError::InvalidCable => write!(f, "Invalid cable"),
            PatchError::CycleDetected { nodes } => {
                write!(f, "Cycle detected involving {} nodes", nodes.len())
            }
            PatchError::UnknownModuleType(t) => write!(f, "Unknown module type: {}", t),
            PatchError::UnknownModule(name) => write!(f, "Unknown module: {}", name),
            PatchError::DuplicateModule(name) => write!(f, "Duplicate module name: {}", name),
            PatchError::InvalidConfig(msg) => write!(f, "Invalid patch configuration: {}", msg),
            PatchError::UnknownPort { module, port } => {
                write!(f, "Module {} has no port named {}", module, port)
            }
            PatchError::BadPortRef(s) => write!(f, "Invalid port reference: {}", s),
            PatchError::State { module, message } => {
                write!(f, "Could not restore state of {}: {}", module, message)
            }
        }
    }
}

impl std::error::Error for PatchError {}

/// Handle to a node for ergonomic port references
#[derive(Clone)]
pub struct NodeHandle {
    id: NodeId,
    name: String,
    spec: PortSpec,
}

impl NodeHandle {
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Reference an output port by name
    pub fn out(&self, name: &str) -> Result<PortRef, PatchError> {
        let port = self.spec.output_by_name(name).ok_or_else(|| self.unknown(name))?;
        Ok(PortRef {
            node: self.id,
            port: port.id,
        })
    }

    /// Reference an input port by name
    pub fn in_(&self, name: &str) -> Result<PortRef, PatchError> {
        let port = self.spec.input_by_name(name).ok_or_else(|| self.unknown(name))?;
        Ok(PortRef {
            node: self.id,
            port: port.id,
        })
    }

    fn unknown(&self, port: &str) -> PatchError {
        PatchError::UnknownPort {
            module: self.name.clone(),
            port: port.to_string(),
        }
    }

    /// Get the port specification
    pub fn spec(&self) -> &PortSpec {
        &self.spec
    }
}

/// The main patch graph containing modules and connections
pub struct Patch {
    nodes: SlotMap<NodeId, Node>,
    cables: Vec<Cable>,
    execution_order: Vec<NodeId>,
    scratch: PortValues,
    sample_rate: f64,
    output: Option<(PortRef, PortRef)>,
}

impl Patch {
    /// Create a new empty patch
    pub fn new(sample_rate: f64) -> Self {
        Self {
            nodes: SlotMap::new(),
            cables: Vec::new(),
            execution_order: Vec::new(),
            scratch: PortValues::new(),
            sample_rate,
            output: None,
        }
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Change the sample rate of every module
    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        for node in self.nodes.values_mut() {
            node.module.set_sample_rate(sample_rate);
        }
    }

    /// Add a module to the patch
    pub fn add<M: GraphModule + 'static>(&mut self, name: impl Into<String>, module: M) -> NodeHandle {
        self.add_boxed(name, Box::new(module))
    }

    /// Add a boxed module to the patch
    pub fn add_boxed(
        &mut self,
        name: impl Into<String>,
        mut module: Box<dyn GraphModule>,
    ) -> NodeHandle {
        module.set_sample_rate(self.sample_rate);
        let spec = module.port_spec().clone();
        let name = name.into();
        let id = self.nodes.insert(Node {
            module,
            name: name.clone(),
            outputs: PortValues::new(),
            incoming: Vec::new(),
        });
        self.invalidate();
        NodeHandle { id, name, spec }
    }

    /// Remove a module and every cable touching it
    pub fn remove(&mut self, node: NodeId) -> Result<(), PatchError> {
        if self.nodes.remove(node).is_none() {
            return Err(PatchError::InvalidNode);
        }
        self.cables
            .retain(|cable| cable.from.node != node && cable.to.node != node);
        if self.output.is_some_and(|(l, _)| l.node == node) {
            self.output = None;
        }
        self.invalidate();
        Ok(())
    }

    /// Connect an output port to an input port
    pub fn connect(&mut self, from: PortRef, to: PortRef) -> Result<CableId, PatchError> {
        self.add_cable(from, to, None)
    }

    /// Connect with attenuation
    pub fn connect_attenuated(
        &mut self,
        from: PortRef,
        to: PortRef,
        attenuation: f64,
    ) -> Result<CableId, PatchError> {
        self.add_cable(from, to, Some(attenuation.clamp(0.0, 1.0)))
    }

    fn add_cable(
        &mut self,
        from: PortRef,
        to: PortRef,
        attenuation: Option<f64>,
    ) -> Result<CableId, PatchError> {
        self.validate_output_port(from)?;
        self.validate_input_port(to)?;
        trace!(
            "connect {}:{} -> {}:{}",
            self.get_name(from.node).unwrap_or("?"),
            from.port,
            self.get_name(to.node).unwrap_or("?"),
            to.port
        );
        self.cables.push(Cable {
            from,
            to,
            attenuation,
        });
        self.invalidate();
        Ok(self.cables.len() - 1)
    }

    /// Connect one output to multiple inputs (mult)
    pub fn mult(&mut self, from: PortRef, to: &[PortRef]) -> Result<Vec<CableId>, PatchError> {
        to.iter().map(|&dest| self.connect(from, dest)).collect()
    }

    /// Disconnect a cable by ID
    pub fn disconnect(&mut self, cable_id: CableId) -> Result<(), PatchError> {
        if cable_id >= self.cables.len() {
            return Err(PatchError::InvalidCable);
        }
        self.cables.remove(cable_id);
        self.invalidate();
        Ok(())
    }

    /// Route a node's `left`/`right` outputs to [`Patch::tick`]'s return value.
    ///
    /// A node without those names uses its first output for both sides; a node
    /// with only `left` duplicates it to the right.
    pub fn set_output(&mut self, node: NodeId) -> Result<(), PatchError> {
        let spec = self
            .nodes
            .get(node)
            .ok_or(PatchError::InvalidNode)?
            .module
            .port_spec();
        let first = spec.outputs.first().ok_or(PatchError::InvalidPort)?;
        let left = spec.output_by_name("left").unwrap_or(first).id;
        let right = spec.output_by_name("right").map_or(left, |p| p.id);
        self.output = Some((
            PortRef { node, port: left },
            PortRef { node, port: right },
        ));
        Ok(())
    }

    pub fn set_param(&mut self, node: NodeId, param: ParamId, value: f64) {
        if let Some(n) = self.nodes.get_mut(node) {
            n.module.set_param(param, value);
        }
    }

    pub fn get_param(&self, node: NodeId, param: ParamId) -> Option<f64> {
        self.nodes.get(node).and_then(|n| n.module.get_param(param))
    }

    pub fn get_name(&self, node: NodeId) -> Option<&str> {
        self.nodes.get(node).map(|n| n.name.as_str())
    }

    /// Look up a node by instance name
    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.nodes
            .iter()
            .find(|(_, n)| n.name == name)
            .map(|(id, _)| id)
    }

    pub fn module(&self, node: NodeId) -> Option<&dyn GraphModule> {
        self.nodes.get(node).map(|n| n.module.as_ref())
    }

    pub fn module_mut(&mut self, node: NodeId) -> Option<&mut (dyn GraphModule + 'static)> {
        self.nodes.get_mut(node).map(|n| n.module.as_mut())
    }

    /// Last value written to an output port
    pub fn output_value(&self, port: PortRef) -> Option<f64> {
        self.nodes.get(port.node).and_then(|n| n.outputs.get(port.port))
    }

    /// Whether any cable feeds the given input
    pub fn is_input_connected(&self, port: PortRef) -> bool {
        self.cables.iter().any(|c| c.to == port)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn cable_count(&self) -> usize {
        self.cables.len()
    }

    pub fn cables(&self) -> &[Cable] {
        &self.cables
    }

    /// Execution order (empty until compiled)
    pub fn execution_order(&self) -> &[NodeId] {
        &self.execution_order
    }

    pub fn is_compiled(&self) -> bool {
        !self.execution_order.is_empty() || self.nodes.is_empty()
    }

    fn invalidate(&mut self) {
        self.execution_order.clear();
    }

    fn validate_output_port(&self, port_ref: PortRef) -> Result<(), PatchError> {
        let node = self.nodes.get(port_ref.node).ok_or(PatchError::InvalidNode)?;
        node.module
            .port_spec()
            .output_by_id(port_ref.port)
            .ok_or(PatchError::InvalidPort)?;
        Ok(())
    }

    fn validate_input_port(&self, port_ref: PortRef) -> Result<(), PatchError> {
        let node = self.nodes.get(port_ref.node).ok_or(PatchError::InvalidNode)?;
        node.module
            .port_spec()
            .input_by_id(port_ref.port)
            .ok_or(PatchError::InvalidPort)?;
        Ok(())
    }

    /// Sort the graph and build the per-node cable tables
    pub fn compile(&mut self) -> Result<(), PatchError> {
        let order = self.topological_sort()?;

        for node in self.nodes.values_mut() {
            node.incoming.clear();
            node.outputs.clear();
        }
        for cable in &self.cables {
            let Some(node) = self.nodes.get_mut(cable.to.node) else {
                continue;
            };
            let summable = node
                .module
                .port_spec()
                .input_by_id(cable.to.port)
                .map_or(true, |p| p.kind.is_summable());
            node.incoming.push(Incoming {
                from: cable.from,
                port: cable.to.port,
                gain: cable.attenuation.unwrap_or(1.0),
                summable,
            });
        }

        debug!(
            "compiled patch: {} modules, {} cables",
            order.len(),
            self.cables.len()
        );
        self.execution_order = order;
        Ok(())
    }

    fn topological_sort(&self) -> Result<Vec<NodeId>, PatchError> {
        let mut in_degree: HashMap<NodeId, usize> = self.nodes.keys().map(|k| (k, 0)).collect();
        let mut successors: HashMap<NodeId, Vec<NodeId>> =
            self.nodes.keys().map(|k| (k, vec![])).collect();

        for cable in &self.cables {
            *in_degree.entry(cable.to.node).or_insert(0) += 1;
            successors
                .entry(cable.from.node)
                .or_default()
                .push(cable.to.node);
        }

        // Kahn's algorithm, seeded in insertion order for a stable result
        let mut queue: VecDeque<NodeId> = self
            .nodes
            .keys()
            .filter(|k| in_degree.get(k) == Some(&0))
            .collect();

        let mut result = Vec::with_capacity(self.nodes.len());
        while let Some(node) = queue.pop_front() {
            result.push(node);
            for succ in successors.get(&node).into_iter().flatten() {
                if let Some(deg) = in_degree.get_mut(succ) {
                    *deg -= 1;
                    if *deg == 0 {
                        queue.push_back(*succ);
                    }
                }
            }
        }

        if result.len() != self.nodes.len() {
            let in_cycle: Vec<NodeId> = in_degree
                .into_iter()
                .filter(|(_, deg)| *deg > 0)
                .map(|(id, _)| id)
                .collect();
            return Err(PatchError::CycleDetected { nodes: in_cycle });
        }

        Ok(result)
    }

    /// Process a single sample, returning the stereo output
    pub fn tick(&mut self) -> (f64, f64) {
        for i in 0..self.execution_order.len() {
            let node_id = self.execution_order[i];
            self.gather_inputs(node_id);
            if let Some(node) = self.nodes.get_mut(node_id) {
                node.outputs.clear();
                node.module.tick(&self.scratch, &mut node.outputs);
            }
        }
        self.read_output()
    }

    fn gather_inputs(&mut self, node_id: NodeId) {
        self.scratch.clear();
        let Some(node) = self.nodes.get(node_id) else {
            return;
        };

        for cable in &node.incoming {
            let value = self
                .nodes
                .get(cable.from.node)
                .and_then(|n| n.outputs.get(cable.from.port))
                .unwrap_or(0.0)
                * cable.gain;
            if !self.scratch.is_connected(cable.port) {
                self.scratch.patch(cable.port, value);
            } else if cable.summable {
                self.scratch.accumulate(cable.port, value);
            } else {
                let current = self.scratch.get_or(cable.port, value);
                self.scratch.set(cable.port, current.max(value));
            }
        }

        for input in &node.module.port_spec().inputs {
            if !self.scratch.is_connected(input.id) {
                self.scratch.set(input.id, input.default);
            }
        }
    }

    fn read_output(&self) -> (f64, f64) {
        match self.output {
            Some((left, right)) => {
                let l = self.output_value(left).unwrap_or(0.0);
                let r = self.output_value(right).unwrap_or(l);
                (l, r)
            }
            None => (0.0, 0.0),
        }
    }

    /// Reset all modules in the patch
    pub fn reset(&mut self) {
        for node in self.nodes.values_mut() {
            node.module.reset();
            node.outputs.clear();
        }
    }

    /// Iterate over all nodes
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &str, &dyn GraphModule)> {
        self.nodes
            .iter()
            .map(|(id, node)| (id, node.name.as_str(), node.module.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::{PortDef, SignalKind};

    /// Copies its input to its output and reports whether the input is patched
    struct Passthrough {
        spec: PortSpec,
    }

    impl Passthrough {
        fn new() -> Self {
            Self {
                spec: PortSpec {
                    inputs: vec![
                        PortDef::new(0, "in", SignalKind::Audio),
                        PortDef::new(1, "gate", SignalKind::Gate),
                    ],
                    outputs: vec![
                        PortDef::new(10, "out", SignalKind::Audio),
                        PortDef::new(11, "patched", SignalKind::Gate),
                        PortDef::new(12, "gate_out", SignalKind::Gate),
                    ],
                },
            }
        }
    }

    impl GraphModule for Passthrough {
        fn port_spec(&self) -> &PortSpec {
            &self.spec
        }

        fn tick(&mut self, inputs: &PortValues, outputs: &mut PortValues) {
            outputs.set(10, inputs.get_or(0, 0.0));
            outputs.set(11, if inputs.is_connected(0) { 10.0 } else { 0.0 });
            outputs.set(12, inputs.get_or(1, 0.0));
        }

        fn reset(&mut self) {}

        fn set_sample_rate(&mut self, _: f64) {}
    }

    /// Emits a fixed voltage
    struct Source {
        value: f64,
        spec: PortSpec,
    }

    impl Source {
        fn new(value: f64) -> Self {
            Self {
                value,
                spec: PortSpec {
                    inputs: vec![],
                    outputs: vec![PortDef::new(10, "out", SignalKind::Audio)],
                },
            }
        }
    }

    impl GraphModule for Source {
        fn port_spec(&self) -> &PortSpec {
            &self.spec
        }

        fn tick(&mut self, _: &PortValues, outputs: &mut PortValues) {
            outputs.set(10, self.value);
        }

        fn reset(&mut self) {}

        fn set_sample_rate(&mut self, _: f64) {}
    }

    #[test]
    fn test_add_module() {
        let mut patch = Patch::new(44100.0);
        let handle = patch.add("test", Passthrough::new());
        assert_eq!(patch.node_count(), 1);
        assert_eq!(patch.get_name(handle.id()), Some("test"));
        assert_eq!(patch.find("test"), Some(handle.id()));
    }

    #[test]
    fn test_unknown_port_name_is_an_error() {
        let mut patch = Patch::new(44100.0);
        let a = patch.add("a", Passthrough::new());
        assert!(matches!(a.out("nope"), Err(PatchError::UnknownPort { .. })));
        assert!(a.in_("in").is_ok());
    }

    #[test]
    fn test_connect_validates_direction() {
        let mut patch = Patch::new(44100.0);
        let a = patch.add("a", Passthrough::new());
        let b = patch.add("b", Passthrough::new());
        assert!(patch.connect(a.out("out").unwrap(), b.in_("in").unwrap()).is_ok());
        assert_eq!(
            patch.connect(a.in_("in").unwrap(), b.in_("in").unwrap()),
            Err(PatchError::InvalidPort)
        );
        assert_eq!(patch.cable_count(), 1);
    }

    #[test]
    fn test_topological_sort() {
        let mut patch = Patch::new(44100.0);
        let c = patch.add("c", Passthrough::new());
        let b = patch.add("b", Passthrough::new());
        let a = patch.add("a", Passthrough::new());

        patch.connect(a.out("out").unwrap(), b.in_("in").unwrap()).unwrap();
        patch.connect(b.out("out").unwrap(), c.in_("in").unwrap()).unwrap();
        patch.compile().unwrap();

        let order = patch.execution_order();
        let pos = |id| order.iter().position(|&x| x == id).unwrap();
        assert!(pos(a.id()) < pos(b.id()));
        assert!(pos(b.id()) < pos(c.id()));
    }

    #[test]
    fn test_cycle_detection() {
        let mut patch = Patch::new(44100.0);
        let a = patch.add("a", Passthrough::new());
        let b = patch.add("b", Passthrough::new());
        patch.connect(a.out("out").unwrap(), b.in_("in").unwrap()).unwrap();
        patch.connect(b.out("out").unwrap(), a.in_("in").unwrap()).unwrap();
        assert!(matches!(patch.compile(), Err(PatchError::CycleDetected { .. })));
    }

    #[test]
    fn test_signal_flow_and_connected_flag() {
        let mut patch = Patch::new(44100.0);
        let src = patch.add("src", Source::new(2.5));
        let a = patch.add("a", Passthrough::new());
        let b = patch.add("b", Passthrough::new());
        patch.connect(src.out("out").unwrap(), a.in_("in").unwrap()).unwrap();
        patch.compile().unwrap();
        patch.tick();

        let value = |port| patch.output_value(port);
        assert_eq!(value(a.out("out").unwrap()), Some(2.5));
        assert_eq!(value(a.out("patched").unwrap()), Some(10.0));
        assert_eq!(value(b.out("patched").unwrap()), Some(0.0));
        assert!(patch.is_input_connected(a.in_("in").unwrap()));
        assert!(!patch.is_input_connected(b.in_("in").unwrap()));
    }

    #[test]
    fn test_summing_and_attenuation() {
        let mut patch = Patch::new(44100.0);
        let x = patch.add("x", Source::new(1.0));
        let y = patch.add("y", Source::new(3.0));
        let sink = patch.add("sink", Passthrough::new());
        patch.connect(x.out("out").unwrap(), sink.in_("in").unwrap()).unwrap();
        patch
            .connect_attenuated(y.out("out").unwrap(), sink.in_("in").unwrap(), 0.5)
            .unwrap();
        // gates take the highest voltage instead of summing
        patch.connect(x.out("out").unwrap(), sink.in_("gate").unwrap()).unwrap();
        patch.connect(y.out("out").unwrap(), sink.in_("gate").unwrap()).unwrap();
        patch.set_output(sink.id()).unwrap();
        patch.compile().unwrap();

        let (l, r) = patch.tick();
        assert_eq!(l, 2.5);
        assert_eq!(r, 2.5);
        assert_eq!(patch.output_value(sink.out("gate_out").unwrap()), Some(3.0));
    }

    #[test]
    fn test_mult() {
        let mut patch = Patch::new(44100.0);
        let a = patch.add("a", Passthrough::new());
        let b = patch.add("b", Passthrough::new());
        let c = patch.add("c", Passthrough::new());
        let result = patch.mult(
            a.out("out").unwrap(),
            &[b.in_("in").unwrap(), c.in_("in").unwrap()],
        );
        assert!(result.is_ok());
        assert_eq!(patch.cable_count(), 2);
    }

    #[test]
    fn test_disconnect() {
        let mut patch = Patch::new(44100.0);
        let a = patch.add("a", Passthrough::new());
        let b = patch.add("b", Passthrough::new());
        let cable_id = patch.connect(a.out("out").unwrap(), b.in_("in").unwrap()).unwrap();
        patch.disconnect(cable_id).unwrap();
        assert_eq!(patch.cable_count(), 0);
        assert_eq!(patch.disconnect(cable_id), Err(PatchError::InvalidCable));
    }

    #[test]
    fn test_remove_module() {
        let mut patch = Patch::new(44100.0);
        let a = patch.add("a", Passthrough::new());
        let b = patch.add("b", Passthrough::new());
        patch.connect(a.out("out").unwrap(), b.in_("in").unwrap()).unwrap();
        patch.remove(a.id()).unwrap();
        assert_eq!(patch.node_count(), 1);
        assert_eq!(patch.cable_count(), 0);
        assert_eq!(patch.remove(a.id()), Err(PatchError::InvalidNode));
    }

    #[test]
    fn test_uncompiled_patch_is_silent() {
        let mut patch = Patch::new(44100.0);
        let src = patch.add("src", Source::new(1.0));
        patch.set_output(src.id()).unwrap();
        assert!(!patch.is_compiled());
        assert_eq!(patch.tick(), (0.0, 0.0));
        patch.compile().unwrap();
        assert_eq!(patch.tick(), (1.0, 1.0));
    }
}
